//! Session command dispatch
//!
//! `cmd` frames mirror the service contracts; each `op` parses its `data`
//! object, calls the service, and returns the response payload. Errors
//! become error frames with the stable code and message.

use serde_json::{json, Map, Value};

use shared::error::{AppError, AppResult};
use shared::model::{FlowStatus, RequestStatus};

use crate::auth::Identity;
use crate::service::CreateRequestInput;
use crate::state::AppState;

/// Execute one session command
pub async fn dispatch_command(
    state: &AppState,
    identity: &Identity,
    op: &str,
    data: Value,
) -> AppResult<Value> {
    match op {
        "createRequest" => create_request(state, identity, data).await,
        "getRequest" => get_request(state, data).await,
        "claimRequest" => claim_request(state, data).await,
        "postResponse" => post_response(state, identity, data).await,
        "cancelRequest" => cancel_request(state, data).await,
        "createFlow" => create_flow(state, data).await,
        "resumeFlow" => resume_flow(state, data).await,
        "cancelFlow" => cancel_flow(state, data).await,
        other => Err(AppError::invalid_request(format!("unknown command: {other}"))),
    }
}

fn require_str(data: &Value, field: &str) -> AppResult<String> {
    data.get(field)
        .and_then(Value::as_str)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .ok_or_else(|| AppError::invalid_request(format!("{field} required")))
}

fn object(data: &Value, field: &str) -> Map<String, Value> {
    data.get(field)
        .and_then(Value::as_object)
        .cloned()
        .unwrap_or_default()
}

async fn create_request(state: &AppState, identity: &Identity, data: Value) -> AppResult<Value> {
    let mut input: CreateRequestInput = serde_json::from_value(data)
        .map_err(|e| AppError::invalid_request(format!("invalid createRequest data: {e}")))?;
    if input.entity.id.is_none() && input.entity.handle.is_none() {
        return Err(AppError::invalid_request("entity.id or entity.handle required"));
    }
    if input.schema.is_null() {
        return Err(AppError::invalid_request("schema required"));
    }
    input.created_by = identity.subject.clone();
    input.flow_id = None;

    let request = state.request_svc.create(input).await?;
    Ok(json!({
        "requestId": request.id,
        "status": request.status,
        "entityId": request.entity_id,
    }))
}

async fn get_request(state: &AppState, data: Value) -> AppResult<Value> {
    let request_id = require_str(&data, "requestId")?;
    let request = state.request_svc.get(&request_id).await?;
    serde_json::to_value(&request).map_err(|e| AppError::internal(e.to_string()))
}

async fn claim_request(state: &AppState, data: Value) -> AppResult<Value> {
    let request_id = require_str(&data, "requestId")?;
    state.request_svc.claim(&request_id).await?;
    Ok(json!({"status": RequestStatus::Claimed}))
}

async fn post_response(state: &AppState, identity: &Identity, data: Value) -> AppResult<Value> {
    let request_id = require_str(&data, "requestId")?;
    let payload = data
        .get("payload")
        .and_then(Value::as_object)
        .cloned()
        .ok_or_else(|| AppError::invalid_request("payload required"))?;
    let files: Vec<Value> = data
        .get("files")
        .and_then(Value::as_array)
        .cloned()
        .unwrap_or_default();

    let answered_by = identity.entity_id.as_deref();
    let response = state
        .request_svc
        .post_response(&request_id, answered_by, payload, &files)
        .await?;

    Ok(json!({
        "responseId": response.id,
        "status": RequestStatus::Answered,
    }))
}

async fn cancel_request(state: &AppState, data: Value) -> AppResult<Value> {
    let request_id = require_str(&data, "requestId")?;
    state.request_svc.cancel(&request_id).await?;
    Ok(json!({"status": RequestStatus::Cancelled}))
}

async fn create_flow(state: &AppState, data: Value) -> AppResult<Value> {
    let kind = require_str(&data, "kind")?;
    let owner_entity = require_str(&data, "ownerEntity")?;
    let cursor = object(&data, "cursor");

    let flow = state.flow_svc.create(&kind, &owner_entity, cursor).await?;
    serde_json::to_value(&flow).map_err(|e| AppError::internal(e.to_string()))
}

async fn resume_flow(state: &AppState, data: Value) -> AppResult<Value> {
    let flow_id = require_str(&data, "flowId")?;
    let event = require_str(&data, "event")?;
    let event_data = object(&data, "data");

    state.flow_svc.resume(&flow_id, &event, event_data).await?;
    Ok(json!({"status": FlowStatus::Running}))
}

async fn cancel_flow(state: &AppState, data: Value) -> AppResult<Value> {
    let flow_id = require_str(&data, "flowId")?;
    state.flow_svc.cancel(&flow_id).await?;
    Ok(json!({"status": FlowStatus::Cancelled}))
}
