//! Logical path construction for uploaded artifacts.
//!
//! Artifacts are partitioned into time-bucketed directories (the configured
//! strftime pattern, e.g. `%Y/%m/%d`) which gives natural write locality and
//! lets retention jobs clean up whole directories. Logical paths always use
//! forward slashes and never include the storage root; the file store maps
//! them onto physical paths.

use chrono::Utc;

/// Expand the configured upload-directory pattern against the current time.
pub fn upload_bucket(pattern: &str) -> String {
    Utc::now().format(pattern).to_string()
}

/// Join a file name into its bucket, yielding the path persisted on the
/// record and served back to clients.
pub fn logical_path(filename: &str, bucket: &str) -> String {
    let bucket = bucket.trim_matches('/');
    if bucket.is_empty() {
        filename.to_string()
    } else {
        format!("{}/{}", bucket, filename)
    }
}

/// The final component of a client-supplied file name. Strips any directory
/// parts so a hostile name cannot escape the upload bucket.
pub fn base_name(name: &str) -> &str {
    name.rsplit(['/', '\\']).next().unwrap_or(name)
}

/// The extension of a file name, dot included, lowercased. Empty when the
/// name has no extension.
pub fn file_extension(name: &str) -> String {
    let name = base_name(name);
    match name.rfind('.') {
        Some(idx) if idx > 0 => name[idx..].to_ascii_lowercase(),
        _ => String::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_upload_bucket_expands_pattern() {
        let bucket = upload_bucket("%Y/%m/%d");
        let parts: Vec<&str> = bucket.split('/').collect();
        assert_eq!(parts.len(), 3);
        assert_eq!(parts[0].len(), 4);
        assert!(parts.iter().all(|p| p.chars().all(|c| c.is_ascii_digit())));
    }

    #[test]
    fn test_upload_bucket_literal_pattern() {
        assert_eq!(upload_bucket("uploads"), "uploads");
    }

    #[test]
    fn test_logical_path() {
        assert_eq!(logical_path("a.png", "2026/08/25"), "2026/08/25/a.png");
        assert_eq!(logical_path("a.png", ""), "a.png");
        assert_eq!(logical_path("a.png", "/2026/"), "2026/a.png");
    }

    #[test]
    fn test_base_name_strips_directories() {
        assert_eq!(base_name("dir/sub/file.txt"), "file.txt");
        assert_eq!(base_name("..\\evil.txt"), "evil.txt");
        assert_eq!(base_name("plain.txt"), "plain.txt");
    }

    #[test]
    fn test_file_extension() {
        assert_eq!(file_extension("photo.JPG"), ".jpg");
        assert_eq!(file_extension("archive.tar.gz"), ".gz");
        assert_eq!(file_extension("noext"), "");
        assert_eq!(file_extension(".bashrc"), "");
    }
}
