//! Inquiry (inbox) endpoints

use axum::extract::{Path, Query, State};
use axum::{Extension, Json};
use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::{json, Value};

use shared::error::{AppError, AppResult};
use shared::model::RequestStatus;

use crate::auth::Identity;
use crate::db::requests::SortBy;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListQuery {
    entity_id: Option<String>,
    status: Option<RequestStatus>,
    /// `created` (default) or `deadline`
    #[serde(default)]
    sort_by: Option<String>,
    #[serde(default = "default_limit")]
    limit: i64,
    #[serde(default)]
    offset: i64,
}

fn default_limit() -> i64 {
    50
}

/// GET /v1/inquiries
pub async fn list_inquiries(
    State(state): State<AppState>,
    Query(query): Query<ListQuery>,
) -> AppResult<Json<Value>> {
    let sort_by = SortBy::parse(query.sort_by.as_deref().unwrap_or("created"));
    let items = state
        .request_svc
        .list_inquiries(
            query.entity_id.as_deref(),
            query.status,
            sort_by,
            query.limit,
            query.offset,
        )
        .await?;
    Ok(Json(json!({
        "items": items,
        "total": items.len(),
    })))
}

/// POST /v1/inquiries/{id}/markRead
pub async fn mark_read(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> AppResult<Json<Value>> {
    state.request_svc.mark_read(&id).await?;
    Ok(Json(json!({"status": "read"})))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SnoozeBody {
    remind_at: DateTime<Utc>,
}

/// POST /v1/inquiries/{id}/snooze
pub async fn snooze(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    Path(id): Path<String>,
    Json(body): Json<SnoozeBody>,
) -> AppResult<Json<Value>> {
    let entity_id = identity
        .entity_id
        .as_deref()
        .ok_or_else(AppError::unauthorized)?;

    let reminder_id = state
        .request_svc
        .snooze(&id, entity_id, body.remind_at)
        .await?;
    Ok(Json(json!({
        "status": "snoozed",
        "reminderId": reminder_id,
        "remindAt": body.remind_at,
    })))
}

/// POST /v1/inquiries/{id}/cancel
pub async fn cancel_inquiry(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> AppResult<Json<Value>> {
    state.request_svc.cancel(&id).await?;
    Ok(Json(json!({"status": RequestStatus::Cancelled})))
}

/// DELETE /v1/inquiries/{id} — soft delete
pub async fn delete_inquiry(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> AppResult<Json<Value>> {
    state.request_svc.soft_delete(&id).await?;
    Ok(Json(json!({"status": "deleted"})))
}
