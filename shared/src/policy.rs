//! File policy and file descriptor validation
//!
//! Requests may carry an upload policy; the `/files/sign` endpoint and
//! response submission both validate against it. MIME patterns support a
//! trailing `/*`; extensions are case-insensitive and stored without a
//! leading dot.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{AppError, AppResult};

/// File descriptor stored with a response:
/// `{name, url, size (bytes), mime, sha256?}`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileDescriptor {
    pub name: String,
    pub url: String,
    pub size: i64,
    pub mime: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sha256: Option<String>,
}

/// Upload policy attached to a request
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FilePolicy {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_total_mb: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_file_mb: Option<f64>,
    /// Allowed MIME patterns, e.g. `["image/*", "application/pdf"]`
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub mime: Vec<String>,
    /// Allowed extensions, e.g. `["pdf", "png"]`
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub extensions: Vec<String>,
}

impl FilePolicy {
    /// Parse a policy from the request's opaque `filesPolicy` value.
    ///
    /// Extensions are normalised on parse: lowercased, leading dot removed.
    pub fn parse(value: &Value) -> AppResult<Self> {
        let mut policy: FilePolicy = serde_json::from_value(value.clone())
            .map_err(|e| AppError::invalid_request(format!("invalid files policy: {e}")))?;
        policy.extensions = policy
            .extensions
            .iter()
            .map(|e| e.trim_start_matches('.').to_ascii_lowercase())
            .collect();
        Ok(policy)
    }

    /// Validate one file against the policy
    pub fn validate_file(&self, name: &str, mime: &str, size_bytes: i64) -> AppResult<()> {
        if let Some(max_mb) = self.max_file_mb {
            let max_bytes = (max_mb * 1024.0 * 1024.0) as i64;
            if size_bytes > max_bytes {
                return Err(AppError::file_policy(format!(
                    "file size {size_bytes} bytes exceeds maximum {max_mb} MB"
                ))
                .with_detail("file", name)
                .with_detail("maxFileMB", max_mb));
            }
        }

        if !self.mime.is_empty() && !self.matches_mime(mime) {
            return Err(AppError::file_policy(format!(
                "content type {mime} is not allowed"
            ))
            .with_detail("file", name)
            .with_detail("allowed", self.mime.clone()));
        }

        if !self.extensions.is_empty() && !self.matches_extension(name) {
            return Err(
                AppError::file_policy("file extension is not allowed".to_string())
                    .with_detail("file", name)
                    .with_detail("allowed", self.extensions.clone()),
            );
        }

        Ok(())
    }

    /// Validate a full descriptor set, including the total-size cap
    pub fn validate_files(&self, files: &[FileDescriptor]) -> AppResult<()> {
        for f in files {
            self.validate_file(&f.name, &f.mime, f.size)?;
        }
        if let Some(max_total_mb) = self.max_total_mb {
            let total: i64 = files.iter().map(|f| f.size).sum();
            let max_bytes = (max_total_mb * 1024.0 * 1024.0) as i64;
            if total > max_bytes {
                return Err(AppError::file_policy(format!(
                    "total upload size {total} bytes exceeds maximum {max_total_mb} MB"
                )));
            }
        }
        Ok(())
    }

    fn matches_mime(&self, mime: &str) -> bool {
        // Strip parameters ("image/png; charset=utf-8")
        let media_type = mime.split(';').next().unwrap_or(mime).trim();
        self.mime.iter().any(|allowed| {
            if let Some(prefix) = allowed.strip_suffix("/*") {
                media_type
                    .strip_prefix(prefix)
                    .map(|rest| rest.starts_with('/'))
                    .unwrap_or(false)
            } else {
                media_type == allowed
            }
        })
    }

    fn matches_extension(&self, name: &str) -> bool {
        match file_extension(name) {
            Some(ext) => self.extensions.iter().any(|allowed| *allowed == ext),
            None => false,
        }
    }
}

fn file_extension(name: &str) -> Option<String> {
    let ext = name.rsplit('.').next()?;
    if ext == name || ext.is_empty() {
        return None;
    }
    Some(ext.to_ascii_lowercase())
}

/// Infer a MIME type from the file name extension.
///
/// Small fixed table covering the formats the form renderer produces;
/// everything else is `application/octet-stream`.
pub fn infer_mime(name: &str) -> &'static str {
    match file_extension(name).as_deref() {
        Some("pdf") => "application/pdf",
        Some("png") => "image/png",
        Some("jpg") | Some("jpeg") => "image/jpeg",
        Some("gif") => "image/gif",
        Some("webp") => "image/webp",
        Some("svg") => "image/svg+xml",
        Some("txt") => "text/plain",
        Some("csv") => "text/csv",
        Some("json") => "application/json",
        Some("zip") => "application/zip",
        _ => "application/octet-stream",
    }
}

/// Normalise raw file metadata values into descriptors.
///
/// `name` and `url` are required, `size` must be non-negative, MIME is
/// inferred from the name when absent, `sha256` must be 64 hex chars when
/// present.
pub fn normalize_files(raw: &[Value]) -> AppResult<Vec<FileDescriptor>> {
    let mut out = Vec::with_capacity(raw.len());
    for value in raw {
        let name = value
            .get("name")
            .and_then(Value::as_str)
            .filter(|s| !s.is_empty())
            .ok_or_else(|| {
                AppError::with_message(
                    crate::error::ErrorCode::FileMetadataInvalid,
                    "file name is required",
                )
            })?;
        let url = value
            .get("url")
            .and_then(Value::as_str)
            .filter(|s| !s.is_empty())
            .ok_or_else(|| {
                AppError::with_message(
                    crate::error::ErrorCode::FileMetadataInvalid,
                    "file url is required",
                )
            })?;
        let size = value.get("size").and_then(Value::as_i64).unwrap_or(0);
        if size < 0 {
            return Err(AppError::with_message(
                crate::error::ErrorCode::FileMetadataInvalid,
                "file size must be non-negative",
            ));
        }
        let mime = value
            .get("mime")
            .or_else(|| value.get("contentType"))
            .and_then(Value::as_str)
            .map(str::to_string)
            .unwrap_or_else(|| infer_mime(name).to_string());
        let sha256 = value
            .get("sha256")
            .and_then(Value::as_str)
            .map(str::to_string);
        if let Some(ref h) = sha256 {
            if h.len() != 64 || !h.bytes().all(|b| b.is_ascii_hexdigit()) {
                return Err(AppError::with_message(
                    crate::error::ErrorCode::FileMetadataInvalid,
                    "sha256 must be 64 hex characters",
                ));
            }
        }

        out.push(FileDescriptor {
            name: name.to_string(),
            url: url.to_string(),
            size,
            mime,
            sha256,
        });
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorCode;
    use serde_json::json;

    fn policy(value: Value) -> FilePolicy {
        FilePolicy::parse(&value).unwrap()
    }

    #[test]
    fn parse_normalizes_extensions() {
        let p = policy(json!({"extensions": [".PDF", "Png"]}));
        assert_eq!(p.extensions, vec!["pdf", "png"]);
    }

    #[test]
    fn size_limit_enforced() {
        let p = policy(json!({"maxFileMB": 1.0}));
        assert!(p.validate_file("a.pdf", "application/pdf", 500_000).is_ok());
        let err = p
            .validate_file("a.pdf", "application/pdf", 2 * 1024 * 1024)
            .unwrap_err();
        assert_eq!(err.code, ErrorCode::FilePolicyViolation);
    }

    #[test]
    fn mime_wildcard_patterns() {
        let p = policy(json!({"mime": ["image/*", "application/pdf"]}));
        assert!(p.validate_file("a.png", "image/png", 10).is_ok());
        assert!(p.validate_file("a.pdf", "application/pdf", 10).is_ok());
        // parameters are stripped before matching
        assert!(
            p.validate_file("a.png", "image/png; charset=binary", 10)
                .is_ok()
        );
        assert!(p.validate_file("a.mp4", "video/mp4", 10).is_err());
        // "image/*" must not match "imagex/png"
        assert!(p.validate_file("a.x", "imagex/png", 10).is_err());
    }

    #[test]
    fn extension_matching_case_insensitive() {
        let p = policy(json!({"extensions": ["pdf", "png"]}));
        assert!(p.validate_file("scan.PDF", "application/pdf", 10).is_ok());
        assert!(p.validate_file("scan.exe", "application/pdf", 10).is_err());
        assert!(p.validate_file("noextension", "application/pdf", 10).is_err());
    }

    #[test]
    fn total_size_cap() {
        let p = policy(json!({"maxTotalMB": 1.0}));
        let file = |size| FileDescriptor {
            name: "a.bin".into(),
            url: "http://x/a.bin".into(),
            size,
            mime: "application/octet-stream".into(),
            sha256: None,
        };
        assert!(p.validate_files(&[file(400_000), file(400_000)]).is_ok());
        assert!(p.validate_files(&[file(700_000), file(700_000)]).is_err());
    }

    #[test]
    fn normalize_requires_name_and_url() {
        assert!(normalize_files(&[json!({"url": "http://x/a"})]).is_err());
        assert!(normalize_files(&[json!({"name": "a"})]).is_err());

        let files =
            normalize_files(&[json!({"name": "a.png", "url": "http://x/a.png", "size": 42})])
                .unwrap();
        assert_eq!(files[0].mime, "image/png");
        assert_eq!(files[0].size, 42);
    }

    #[test]
    fn normalize_rejects_bad_sha256() {
        let err = normalize_files(&[json!({
            "name": "a.png", "url": "http://x/a.png", "sha256": "deadbeef"
        })])
        .unwrap_err();
        assert_eq!(err.code, ErrorCode::FileMetadataInvalid);

        let ok = normalize_files(&[json!({
            "name": "a.png", "url": "http://x/a.png",
            "sha256": "a".repeat(64)
        })]);
        assert!(ok.is_ok());
    }

    #[test]
    fn normalize_accepts_content_type_alias() {
        let files = normalize_files(&[json!({
            "name": "a.bin", "url": "http://x/a.bin", "contentType": "application/x-foo"
        })])
        .unwrap();
        assert_eq!(files[0].mime, "application/x-foo");
    }

    #[test]
    fn infer_mime_table() {
        assert_eq!(infer_mime("report.pdf"), "application/pdf");
        assert_eq!(infer_mime("photo.JPEG"), "image/jpeg");
        assert_eq!(infer_mime("blob"), "application/octet-stream");
    }
}
