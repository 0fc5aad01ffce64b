//! Capability gate consumed by the upload session.
//!
//! The session never evaluates roles itself; it asks a configured list of
//! evaluators and passes if ANY of them grants. Who the principal is and how
//! it was authenticated is the transport layer's problem.

/// The operation a request is asking for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    Create,
    Update,
    Delete,
    Read,
}

impl Action {
    pub fn is_read_only(&self) -> bool {
        matches!(self, Action::Read)
    }
}

/// An authenticated caller.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Principal {
    pub id: String,
    pub superuser: bool,
    pub staff: bool,
}

/// Per-request context handed to every evaluator.
#[derive(Debug, Clone)]
pub struct RequestContext {
    pub principal: Option<Principal>,
    pub action: Action,
}

impl RequestContext {
    pub fn anonymous(action: Action) -> Self {
        Self {
            principal: None,
            action,
        }
    }

    pub fn authenticated(id: &str, action: Action) -> Self {
        Self {
            principal: Some(Principal {
                id: id.to_string(),
                ..Principal::default()
            }),
            action,
        }
    }

    pub fn is_authenticated(&self) -> bool {
        self.principal.is_some()
    }

    pub fn is_superuser(&self) -> bool {
        self.principal.as_ref().is_some_and(|p| p.superuser)
    }

    pub fn is_staff(&self) -> bool {
        self.principal.as_ref().is_some_and(|p| p.staff)
    }

    /// The key identifying the owner of an upload; None for anonymous.
    pub fn user_key(&self) -> Option<&str> {
        self.principal.as_ref().map(|p| p.id.as_str())
    }
}

pub trait Permission: Send + Sync {
    fn has_permission(&self, ctx: &RequestContext) -> bool;
}

pub struct AllowAny;

impl Permission for AllowAny {
    fn has_permission(&self, _ctx: &RequestContext) -> bool {
        true
    }
}

pub struct IsAuthenticated;

impl Permission for IsAuthenticated {
    fn has_permission(&self, ctx: &RequestContext) -> bool {
        ctx.is_authenticated()
    }
}

pub struct IsSuperUser;

impl Permission for IsSuperUser {
    fn has_permission(&self, ctx: &RequestContext) -> bool {
        ctx.is_superuser()
    }
}

pub struct IsAdminUser;

impl Permission for IsAdminUser {
    fn has_permission(&self, ctx: &RequestContext) -> bool {
        ctx.is_staff() || ctx.is_superuser()
    }
}

pub struct IsAuthenticatedOrReadOnly;

impl Permission for IsAuthenticatedOrReadOnly {
    fn has_permission(&self, ctx: &RequestContext) -> bool {
        ctx.is_authenticated() || ctx.action.is_read_only()
    }
}

/// The gate passes if any configured evaluator grants.
pub fn gate(evaluators: &[Box<dyn Permission>], ctx: &RequestContext) -> bool {
    evaluators.iter().any(|p| p.has_permission(ctx))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_any_evaluator_grants() {
        let evaluators: Vec<Box<dyn Permission>> =
            vec![Box::new(IsSuperUser), Box::new(IsAuthenticated)];
        let ctx = RequestContext::authenticated("alice", Action::Create);
        assert!(gate(&evaluators, &ctx));

        let anon = RequestContext::anonymous(Action::Create);
        assert!(!gate(&evaluators, &anon));
    }

    #[test]
    fn test_empty_evaluator_list_denies() {
        let ctx = RequestContext::authenticated("alice", Action::Create);
        assert!(!gate(&[], &ctx));
    }

    #[test]
    fn test_admin_user_accepts_staff_and_superuser() {
        let mut ctx = RequestContext::authenticated("ops", Action::Delete);
        assert!(!IsAdminUser.has_permission(&ctx));
        ctx.principal.as_mut().unwrap().staff = true;
        assert!(IsAdminUser.has_permission(&ctx));
        ctx.principal = Some(Principal {
            id: "root".to_string(),
            superuser: true,
            staff: false,
        });
        assert!(IsAdminUser.has_permission(&ctx));
    }

    #[test]
    fn test_authenticated_or_read_only() {
        let anon_read = RequestContext::anonymous(Action::Read);
        assert!(IsAuthenticatedOrReadOnly.has_permission(&anon_read));
        let anon_write = RequestContext::anonymous(Action::Create);
        assert!(!IsAuthenticatedOrReadOnly.has_permission(&anon_write));
    }
}
