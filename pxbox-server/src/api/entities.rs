//! Entity endpoints

use axum::extract::{Path, Query, State};
use axum::Json;
use http::StatusCode;
use serde::Deserialize;
use serde_json::{json, Value};

use shared::error::AppResult;
use shared::model::{Entity, EntityCreate, RequestStatus};

use crate::state::AppState;

/// POST /v1/entities
pub async fn create_entity(
    State(state): State<AppState>,
    Json(body): Json<EntityCreate>,
) -> AppResult<(StatusCode, Json<Entity>)> {
    let entity = state
        .entity_svc
        .create(body.kind, body.handle, body.meta)
        .await?;
    Ok((StatusCode::CREATED, Json(entity)))
}

/// GET /v1/entities/{id}
pub async fn get_entity(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> AppResult<Json<Entity>> {
    Ok(Json(state.entity_svc.get(&id).await?))
}

#[derive(Debug, Deserialize)]
pub struct QueueQuery {
    status: Option<RequestStatus>,
    #[serde(default = "default_limit")]
    limit: i64,
    #[serde(default)]
    offset: i64,
}

fn default_limit() -> i64 {
    50
}

/// GET /v1/entities/{id}/queue — the entity's inbox
pub async fn entity_queue(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Query(query): Query<QueueQuery>,
) -> AppResult<Json<Value>> {
    let items = state
        .request_svc
        .entity_queue(&id, query.status, query.limit, query.offset)
        .await?;
    Ok(Json(json!({ "items": items })))
}
