//! Flow crash recovery
//!
//! At startup, every non-terminal flow is inspected against the current
//! request rows and either resumed, ticked, or left suspended. The loop is
//! idempotent: running it twice over the same state produces the same
//! terminal or suspended configuration.

use serde_json::{Map, Value};
use std::sync::Arc;

use shared::error::AppResult;
use shared::model::{cursor, FlowStatus, RequestStatus};

use crate::events::kinds;

use super::flow::FlowService;
use super::request::RequestService;

/// Recover suspended and running flows after a restart
pub async fn recover_flows(
    flow_svc: &Arc<FlowService>,
    request_svc: &Arc<RequestService>,
) -> AppResult<()> {
    let flows = flow_svc.list_recoverable().await?;

    tracing::info!(count = flows.len(), "Recovering flows");

    for flow in flows {
        let result = match flow.status {
            FlowStatus::Suspended | FlowStatus::WaitingInput => {
                recover_suspended(flow_svc, request_svc, &flow).await
            }
            FlowStatus::Running => {
                if cursor::pending(&flow.cursor).is_empty() {
                    flow_svc.tick(&flow.id).await
                } else {
                    Ok(())
                }
            }
            _ => Ok(()),
        };

        if let Err(e) = result {
            tracing::error!(flow_id = %flow.id, error = %e, "Flow recovery step failed");
        }
    }

    Ok(())
}

async fn recover_suspended(
    flow_svc: &Arc<FlowService>,
    request_svc: &Arc<RequestService>,
    flow: &shared::model::Flow,
) -> AppResult<()> {
    // Read the current status of every pending entry once
    let mut statuses = Vec::new();
    for entry in cursor::pending(&flow.cursor) {
        match request_svc.get(&entry.request_id).await {
            Ok(r) => statuses.push((entry.request_id, r.status)),
            Err(e) => {
                tracing::warn!(
                    flow_id = %flow.id,
                    request_id = %entry.request_id,
                    error = %e,
                    "Pending request unreadable during recovery"
                );
            }
        }
    }

    // An answered input outranks lost ones regardless of cursor order: the
    // timeout branch fires only when no entry was answered
    let resolved = statuses
        .iter()
        .find(|(_, status)| *status == RequestStatus::Answered)
        .or_else(|| {
            statuses.iter().find(|(_, status)| {
                matches!(status, RequestStatus::Cancelled | RequestStatus::Expired)
            })
        });

    let Some((request_id, status)) = resolved else {
        // All referenced requests are still open: keep waiting
        tracing::debug!(flow_id = %flow.id, "Flow left suspended");
        return Ok(());
    };

    let event = match status {
        RequestStatus::Answered => kinds::REQUEST_ANSWERED,
        RequestStatus::Cancelled => kinds::REQUEST_CANCELLED,
        _ => kinds::REQUEST_EXPIRED,
    };

    let mut data = Map::new();
    data.insert("requestId".into(), Value::String(request_id.clone()));
    // One resume per recovery pass; further pending entries are picked up
    // by the runner or the next pass
    flow_svc.resume(&flow.id, event, data).await?;
    tracing::info!(
        flow_id = %flow.id,
        request_id = %request_id,
        event,
        "Flow resumed during recovery"
    );
    Ok(())
}
