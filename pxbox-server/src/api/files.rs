//! File-upload ticket issuance

use axum::extract::{Query, State};
use axum::Json;
use serde::Deserialize;
use std::time::Duration;

use shared::error::{AppError, AppResult};
use shared::policy::{infer_mime, FilePolicy};

use crate::files::SignedUrls;
use crate::state::AppState;

const PUT_EXPIRY: Duration = Duration::from_secs(15 * 60);
const GET_EXPIRY: Duration = Duration::from_secs(24 * 60 * 60);

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SignQuery {
    name: String,
    content_type: Option<String>,
    /// When set, the named upload validates against this request's policy
    request_id: Option<String>,
    /// File size in bytes, for size-limit validation
    size: Option<i64>,
}

/// POST /v1/files/sign — `{putUrl, getUrl}` for a named upload
pub async fn sign_file(
    State(state): State<AppState>,
    Query(query): Query<SignQuery>,
) -> AppResult<Json<SignedUrls>> {
    if query.name.is_empty() {
        return Err(AppError::invalid_request("name parameter required"));
    }
    let content_type = query
        .content_type
        .clone()
        .unwrap_or_else(|| infer_mime(&query.name).to_string());

    if let Some(ref request_id) = query.request_id {
        let request = state.request_svc.get(request_id).await?;
        if let Some(ref policy_value) = request.files_policy {
            let policy = FilePolicy::parse(policy_value)?;
            policy.validate_file(&query.name, &content_type, query.size.unwrap_or(0))?;
        }
    }

    let put_url = state
        .file_store
        .presign_put(&query.name, &content_type, PUT_EXPIRY)
        .await?;
    let get_url = state.file_store.presign_get(&query.name, GET_EXPIRY).await?;

    Ok(Json(SignedUrls { put_url, get_url }))
}
