//! Response model — a validated answer to a request

use crate::policy::FileDescriptor;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// A schema-validated payload answering an inquiry.
///
/// At most one response exists per request in the normal path; the payload
/// satisfied the request's compiled schema at acceptance time.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Response {
    pub id: String,
    pub request_id: String,
    pub answered_by: String,
    pub payload: Map<String, Value>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub files: Vec<FileDescriptor>,
    pub answered_at: DateTime<Utc>,
    /// Detached signature slot; kept for wire compatibility, never written
    #[serde(skip_serializing_if = "Option::is_none")]
    pub signature_jws: Option<String>,
}
