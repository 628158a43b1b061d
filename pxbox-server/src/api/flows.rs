//! Flow endpoints

use axum::extract::{Path, State};
use axum::Json;
use http::StatusCode;
use serde::Deserialize;
use serde_json::{json, Map, Value};

use shared::error::AppResult;
use shared::model::{Flow, FlowStatus};

use crate::state::AppState;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateFlowBody {
    pub kind: String,
    pub owner_entity: String,
    #[serde(default)]
    pub cursor: Map<String, Value>,
}

/// POST /v1/flows
pub async fn create_flow(
    State(state): State<AppState>,
    Json(body): Json<CreateFlowBody>,
) -> AppResult<(StatusCode, Json<Flow>)> {
    let flow = state
        .flow_svc
        .create(&body.kind, &body.owner_entity, body.cursor)
        .await?;
    Ok((StatusCode::CREATED, Json(flow)))
}

/// GET /v1/flows/{id}
pub async fn get_flow(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> AppResult<Json<Flow>> {
    Ok(Json(state.flow_svc.get(&id).await?))
}

#[derive(Debug, Deserialize)]
pub struct ResumeFlowBody {
    pub event: String,
    #[serde(default)]
    pub data: Map<String, Value>,
}

/// POST /v1/flows/{id}/resume
pub async fn resume_flow(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(body): Json<ResumeFlowBody>,
) -> AppResult<Json<Value>> {
    state.flow_svc.resume(&id, &body.event, body.data).await?;
    Ok(Json(json!({"status": FlowStatus::Running})))
}

/// POST /v1/flows/{id}/cancel
pub async fn cancel_flow(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> AppResult<Json<Value>> {
    state.flow_svc.cancel(&id).await?;
    Ok(Json(json!({"status": FlowStatus::Cancelled})))
}
