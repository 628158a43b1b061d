//! File storage collaborator
//!
//! The object store itself is external; the core only issues upload/download
//! URLs and enforces the owning request's file policy. `LocalFileStore`
//! maps object names under a base directory and URL — alternative backends
//! plug in behind the trait without touching callers.

use async_trait::async_trait;
use std::path::PathBuf;
use std::time::Duration;

use shared::error::{AppError, AppResult, ErrorCode};

/// Pre-signed URL pair for a named upload
#[derive(Debug, Clone, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SignedUrls {
    pub put_url: String,
    pub get_url: String,
}

/// Pre-signed URL issuance
#[async_trait]
pub trait FileStore: Send + Sync {
    async fn presign_put(
        &self,
        object_name: &str,
        content_type: &str,
        expires_in: Duration,
    ) -> AppResult<String>;

    async fn presign_get(&self, object_name: &str, expires_in: Duration) -> AppResult<String>;
}

/// Local-filesystem presigner: URLs point back at the broker's own
/// `/files/` path under the configured base URL
pub struct LocalFileStore {
    #[allow(dead_code)]
    base_dir: PathBuf,
    base_url: String,
}

impl LocalFileStore {
    pub fn new(base_dir: impl Into<PathBuf>, base_url: impl Into<String>) -> AppResult<Self> {
        let base_dir = base_dir.into();
        std::fs::create_dir_all(&base_dir).map_err(|e| {
            AppError::with_message(
                ErrorCode::FileStorageFailed,
                format!("failed to create storage directory: {e}"),
            )
        })?;
        Ok(Self {
            base_dir,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }
}

#[async_trait]
impl FileStore for LocalFileStore {
    async fn presign_put(
        &self,
        object_name: &str,
        _content_type: &str,
        _expires_in: Duration,
    ) -> AppResult<String> {
        validate_object_name(object_name)?;
        Ok(format!("{}/files/{object_name}", self.base_url))
    }

    async fn presign_get(&self, object_name: &str, _expires_in: Duration) -> AppResult<String> {
        validate_object_name(object_name)?;
        Ok(format!("{}/files/{object_name}", self.base_url))
    }
}

/// Object names must not escape the storage root
fn validate_object_name(name: &str) -> AppResult<()> {
    if name.is_empty() || name.starts_with('/') || name.split('/').any(|seg| seg == "..") {
        return Err(AppError::with_message(
            ErrorCode::FileMetadataInvalid,
            format!("invalid object name: {name}"),
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn presign_builds_urls_under_base() {
        let dir = tempfile::tempdir().unwrap();
        let store = LocalFileStore::new(dir.path(), "http://localhost:8080/").unwrap();

        let put = store
            .presign_put("scan.pdf", "application/pdf", Duration::from_secs(900))
            .await
            .unwrap();
        assert_eq!(put, "http://localhost:8080/files/scan.pdf");

        let get = store
            .presign_get("scan.pdf", Duration::from_secs(86400))
            .await
            .unwrap();
        assert_eq!(get, "http://localhost:8080/files/scan.pdf");
    }

    #[tokio::test]
    async fn traversal_names_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let store = LocalFileStore::new(dir.path(), "http://localhost:8080").unwrap();

        for bad in ["../etc/passwd", "/abs", "a/../../b", ""] {
            assert!(
                store
                    .presign_put(bad, "text/plain", Duration::from_secs(60))
                    .await
                    .is_err(),
                "{bad} should be rejected"
            );
        }
    }
}
