//! Request endpoints

use axum::extract::{Path, State};
use axum::{Extension, Json};
use http::StatusCode;
use serde::Deserialize;
use serde_json::{json, Map, Value};

use shared::error::AppResult;
use shared::model::{Request, RequestStatus, Response};

use crate::auth::Identity;
use crate::service::CreateRequestInput;
use crate::state::AppState;

/// POST /v1/requests
pub async fn create_request(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    Json(mut input): Json<CreateRequestInput>,
) -> AppResult<(StatusCode, Json<Value>)> {
    input.created_by = identity.subject.clone();
    input.flow_id = None;

    let request = state.request_svc.create(input).await?;
    Ok((
        StatusCode::CREATED,
        Json(json!({
            "requestId": request.id,
            "status": request.status,
        })),
    ))
}

/// GET /v1/requests/{id}
pub async fn get_request(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> AppResult<Json<Request>> {
    Ok(Json(state.request_svc.get(&id).await?))
}

/// POST /v1/requests/{id}/claim
pub async fn claim_request(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> AppResult<Json<Value>> {
    state.request_svc.claim(&id).await?;
    Ok(Json(json!({"status": RequestStatus::Claimed})))
}

#[derive(Debug, Deserialize)]
pub struct PostResponseBody {
    pub payload: Map<String, Value>,
    #[serde(default)]
    pub files: Vec<Value>,
}

/// POST /v1/requests/{id}/response
pub async fn post_response(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    Path(id): Path<String>,
    Json(body): Json<PostResponseBody>,
) -> AppResult<(StatusCode, Json<Value>)> {
    let response = state
        .request_svc
        .post_response(&id, identity.entity_id.as_deref(), body.payload, &body.files)
        .await?;

    Ok((
        StatusCode::CREATED,
        Json(json!({
            "responseId": response.id,
            "status": RequestStatus::Answered,
        })),
    ))
}

/// GET /v1/requests/{id}/response
pub async fn get_response(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> AppResult<Json<Response>> {
    Ok(Json(state.request_svc.get_response(&id).await?))
}

/// POST /v1/requests/{id}/cancel
pub async fn cancel_request(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> AppResult<Json<Value>> {
    state.request_svc.cancel(&id).await?;
    Ok(Json(json!({"status": RequestStatus::Cancelled})))
}
