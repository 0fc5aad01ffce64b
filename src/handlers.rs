//! HTTP surface of the upload service.
//!
//! The handlers only translate between the wire and the session: headers
//! become `ChunkMetadata` and a `RequestContext`, the body becomes the chunk
//! payload, and the session's outcome becomes the JSON reply.

use actix_web::http::header::HeaderMap;
use actix_web::{web, Error, HttpRequest, HttpResponse};
use bytes::BytesMut;
use futures::StreamExt;
use log::{debug, error};
use serde::Deserialize;

use crate::app_state::AppState;
use crate::metadata::ChunkMetadata;
use crate::permissions::{Action, Principal, RequestContext};
use crate::session::ChunkOutcome;

#[derive(Debug, Deserialize)]
pub struct UploadQuery {
    action: Option<String>,
}

/// Identify the caller from the `x-user` / `x-user-role` headers. The
/// deployment fronts this service with its own authentication layer; the
/// headers are trusted here.
fn principal_from_headers(headers: &HeaderMap) -> Option<Principal> {
    let id = headers.get("x-user")?.to_str().ok()?.trim();
    if id.is_empty() {
        return None;
    }
    let role = headers
        .get("x-user-role")
        .and_then(|v| v.to_str().ok())
        .unwrap_or("");
    Some(Principal {
        id: id.to_string(),
        superuser: role.eq_ignore_ascii_case("superuser"),
        staff: role.eq_ignore_ascii_case("staff"),
    })
}

fn request_context(req: &HttpRequest, action: Action) -> RequestContext {
    let principal = principal_from_headers(req.headers());
    match &principal {
        Some(p) => log_mdc::insert("user", p.id.clone()),
        None => log_mdc::insert("user", "anonymous"),
    };
    RequestContext { principal, action }
}

fn to_response(outcome: ChunkOutcome) -> HttpResponse {
    HttpResponse::build(outcome.status).json(outcome.body)
}

/// POST /upload. Lands one chunk; `?action=update` re-opens an existing
/// upload instead of creating one.
pub async fn upload_chunk(
    req: HttpRequest,
    query: web::Query<UploadQuery>,
    mut payload: web::Payload,
    state: web::Data<AppState>,
) -> Result<HttpResponse, Error> {
    let action = match query.action.as_deref() {
        Some("update") => Action::Update,
        _ => Action::Create,
    };
    let ctx = request_context(&req, action);
    let meta = ChunkMetadata::from_headers(req.headers());

    let limit = state.config.server.max_payload_size;
    let mut body = BytesMut::new();
    while let Some(chunk) = payload.next().await {
        let chunk = chunk?;
        if body.len() + chunk.len() > limit {
            error!("Chunk payload exceeds the {} byte limit", limit);
            return Ok(HttpResponse::PayloadTooLarge().finish());
        }
        body.extend_from_slice(&chunk);
    }
    debug!(
        "Chunk request: name={:?} checksum={} eof={} bytes={}",
        meta.name,
        meta.checksum,
        meta.eof,
        body.len()
    );

    Ok(to_response(state.session.handle_chunk(&ctx, &meta, &body)))
}

/// GET /upload. Public representation of an upload record.
pub async fn read_upload(
    req: HttpRequest,
    state: web::Data<AppState>,
) -> Result<HttpResponse, Error> {
    let ctx = request_context(&req, Action::Read);
    let meta = ChunkMetadata::from_headers(req.headers());
    Ok(to_response(state.session.handle_read(&ctx, &meta)))
}

/// DELETE /upload. Drops an upload record and its artifact.
pub async fn delete_upload(
    req: HttpRequest,
    state: web::Data<AppState>,
) -> Result<HttpResponse, Error> {
    let ctx = request_context(&req, Action::Delete);
    let meta = ChunkMetadata::from_headers(req.headers());
    Ok(to_response(state.session.handle_delete(&ctx, &meta)))
}

pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::resource("/upload")
            .route(web::post().to(upload_chunk))
            .route(web::get().to(read_upload))
            .route(web::delete().to(delete_upload)),
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use actix_web::http::StatusCode;
    use actix_web::test;

    #[actix_web::test]
    async fn test_principal_parsed_from_headers() {
        let req = test::TestRequest::default()
            .insert_header(("x-user", "alice"))
            .insert_header(("x-user-role", "superuser"))
            .to_http_request();
        let principal = principal_from_headers(req.headers()).unwrap();
        assert_eq!(principal.id, "alice");
        assert!(principal.superuser);
        assert!(!principal.staff);

        let anon = test::TestRequest::default().to_http_request();
        assert!(principal_from_headers(anon.headers()).is_none());
    }

    #[actix_web::test]
    async fn test_upload_without_checksum_is_rejected() {
        let state = web::Data::new(AppState::new_for_testing());
        let app =
            test::init_service(actix_web::App::new().app_data(state).configure(configure)).await;

        let req = test::TestRequest::post()
            .uri("/upload")
            .insert_header(("x-file-name", "a.bin"))
            .set_payload("bytes")
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    }

    #[actix_web::test]
    async fn test_read_unknown_upload_is_not_found() {
        let state = web::Data::new(AppState::new_for_testing());
        let app =
            test::init_service(actix_web::App::new().app_data(state).configure(configure)).await;

        let req = test::TestRequest::get()
            .uri("/upload")
            .insert_header(("x-file-checksum", "nosuch"))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    }
}
