//! Flow service — the durable workflow engine
//!
//! Flows checkpoint their cursor to storage after every observable
//! transition; a restart resumes from the last committed cursor (see
//! [`super::recovery`]). Concurrent `resume`/`tick` calls for the same
//! flow are serialised through a per-flow lock; distinct flows run fully
//! parallel.

use dashmap::DashMap;
use serde_json::{json, Map, Value};
use sqlx::SqlitePool;
use std::sync::Arc;
use tokio::sync::Mutex;

use shared::error::{AppError, AppResult, ErrorCode};
use shared::model::{cursor, Flow, FlowStatus};

use crate::db;
use crate::events::{kinds, EventBus};

use super::entity::EntityService;
use super::request::RequestService;
use super::runner::{BasicRunner, FlowRunner, RunnerContext, StepResult};

/// Flow engine: create/resume/tick/cancel plus runner dispatch
pub struct FlowService {
    pool: SqlitePool,
    bus: EventBus,
    entity_svc: EntityService,
    request_svc: Arc<RequestService>,
    /// kind → runner; unknown kinds fall back to the basic runner
    runners: DashMap<String, Arc<dyn FlowRunner>>,
    basic: Arc<dyn FlowRunner>,
    /// Per-flow mutual exclusion for runner invocations
    locks: DashMap<String, Arc<Mutex<()>>>,
}

impl FlowService {
    pub fn new(
        pool: SqlitePool,
        bus: EventBus,
        entity_svc: EntityService,
        request_svc: Arc<RequestService>,
    ) -> Self {
        Self {
            pool,
            bus,
            entity_svc,
            request_svc,
            runners: DashMap::new(),
            basic: Arc::new(BasicRunner),
            locks: DashMap::new(),
        }
    }

    /// Register a runner for a flow kind (startup wiring)
    pub fn register_runner(&self, kind: impl Into<String>, runner: Arc<dyn FlowRunner>) {
        self.runners.insert(kind.into(), runner);
    }

    fn runner_for(&self, kind: &str) -> Arc<dyn FlowRunner> {
        self.runners
            .get(kind)
            .map(|r| r.value().clone())
            .unwrap_or_else(|| self.basic.clone())
    }

    fn lock_for(&self, flow_id: &str) -> Arc<Mutex<()>> {
        self.locks
            .entry(flow_id.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    fn runner_ctx(&self) -> RunnerContext {
        RunnerContext::new(self.request_svc.clone())
    }

    pub async fn create(
        &self,
        kind: &str,
        owner_entity: &str,
        initial_cursor: Map<String, Value>,
    ) -> AppResult<Flow> {
        // The owner must be routable before anything suspends on it
        self.entity_svc.get(owner_entity).await?;

        let id = super::new_id();
        let flow = db::flows::create(&self.pool, &id, kind, owner_entity, &initial_cursor).await?;

        self.bus
            .publish_entity(
                owner_entity,
                json!({"type": kinds::FLOW_CREATED, "flowId": id}),
            )
            .await;

        tracing::info!(flow_id = %id, kind, "Flow created");
        Ok(flow)
    }

    pub async fn get(&self, id: &str) -> AppResult<Flow> {
        db::flows::get_by_id(&self.pool, id).await
    }

    /// Non-terminal flows, oldest first (recovery enumeration)
    pub async fn list_recoverable(&self) -> AppResult<Vec<Flow>> {
        db::flows::list_by_status(
            &self.pool,
            &[
                FlowStatus::Running,
                FlowStatus::Suspended,
                FlowStatus::WaitingInput,
            ],
        )
        .await
    }

    /// Resume with an external event: persist `lastEvent` into the cursor,
    /// set RUNNING, then invoke the runner exactly once.
    pub async fn resume(
        &self,
        flow_id: &str,
        event: &str,
        data: Map<String, Value>,
    ) -> AppResult<()> {
        let lock = self.lock_for(flow_id);
        let _guard = lock.lock().await;

        let mut flow = db::flows::get_by_id(&self.pool, flow_id).await?;
        if flow.status.is_terminal() {
            return Err(AppError::new(ErrorCode::FlowTerminal)
                .with_detail("flowId", flow_id)
                .with_detail("status", flow.status.as_str()));
        }

        // The resolved event is no longer pending; dropping its entry here
        // keeps recovery idempotent
        if let Some(request_id) = data.get("requestId").and_then(Value::as_str) {
            remove_pending(&mut flow.cursor, request_id);
        }
        cursor::set_last_event(&mut flow.cursor, event, data);

        db::flows::update_cursor(&self.pool, flow_id, &flow.cursor).await?;
        db::flows::update_status(&self.pool, flow_id, FlowStatus::Running).await?;
        flow.status = FlowStatus::Running;

        let result = self.runner_for(&flow.kind).run(&flow, &self.runner_ctx()).await;
        self.apply_step(&flow, result, true).await
    }

    /// Re-invoke the runner without injecting an event (scheduler and
    /// recovery path). Terminal flows are left untouched.
    pub async fn tick(&self, flow_id: &str) -> AppResult<()> {
        let lock = self.lock_for(flow_id);
        let _guard = lock.lock().await;

        let flow = db::flows::get_by_id(&self.pool, flow_id).await?;
        if flow.status.is_terminal() {
            return Ok(());
        }

        let result = self.runner_for(&flow.kind).run(&flow, &self.runner_ctx()).await;
        self.apply_step(&flow, result, false).await
    }

    /// Interpret one runner result: checkpoint the cursor, transition the
    /// flow, emit the matching event.
    async fn apply_step(&self, flow: &Flow, result: StepResult, emit_updated: bool) -> AppResult<()> {
        db::flows::update_cursor(&self.pool, &flow.id, &result.cursor).await?;

        if let Some(suspend) = result.suspend {
            // Waiting specifically for a request answer is its own status
            let status = if suspend.event == kinds::REQUEST_ANSWERED && suspend.request_id.is_some()
            {
                FlowStatus::WaitingInput
            } else {
                FlowStatus::Suspended
            };
            db::flows::update_status(&self.pool, &flow.id, status).await?;
            self.bus
                .publish_entity(
                    &flow.owner_entity,
                    json!({
                        "type": kinds::FLOW_SUSPENDED,
                        "flowId": flow.id,
                        "event": suspend.event,
                        "requestId": suspend.request_id,
                    }),
                )
                .await;
            tracing::debug!(flow_id = %flow.id, event = %suspend.event, "Flow suspended");
            return Ok(());
        }

        if result.done {
            db::flows::update_status(&self.pool, &flow.id, FlowStatus::Completed).await?;
            self.bus
                .publish_entity(
                    &flow.owner_entity,
                    json!({"type": kinds::FLOW_COMPLETED, "flowId": flow.id}),
                )
                .await;
            tracing::info!(flow_id = %flow.id, "Flow completed");
            return Ok(());
        }

        if let Some(error) = result.error {
            db::flows::update_status(&self.pool, &flow.id, FlowStatus::Failed).await?;
            self.bus
                .publish_entity(
                    &flow.owner_entity,
                    json!({
                        "type": kinds::FLOW_FAILED,
                        "flowId": flow.id,
                        "error": error,
                    }),
                )
                .await;
            tracing::warn!(flow_id = %flow.id, error = %error, "Flow failed");
            return Ok(());
        }

        // Plain continue: the flow stays RUNNING awaiting tick/resume
        if emit_updated {
            self.bus
                .publish_entity(
                    &flow.owner_entity,
                    json!({
                        "type": kinds::FLOW_UPDATED,
                        "flowId": flow.id,
                        "status": FlowStatus::Running.as_str(),
                    }),
                )
                .await;
        }
        Ok(())
    }

    /// Cancel the flow and cascade to every non-terminal request it owns.
    ///
    /// Soft-deleted requests are still cancelled: a hidden PENDING row is
    /// live for the state machine, only invisible in inboxes.
    pub async fn cancel(&self, flow_id: &str) -> AppResult<()> {
        let lock = self.lock_for(flow_id);
        let _guard = lock.lock().await;

        let flow = db::flows::get_by_id(&self.pool, flow_id).await?;
        if !db::flows::transition_if_active(&self.pool, flow_id, FlowStatus::Cancelled).await? {
            return Err(AppError::new(ErrorCode::FlowTerminal)
                .with_detail("flowId", flow_id)
                .with_detail("status", flow.status.as_str()));
        }

        let mut cancelled = 0usize;
        for request in db::requests::list_by_flow(&self.pool, flow_id).await? {
            if request.status.is_terminal() {
                continue;
            }
            match self.request_svc.cancel_for_flow(&request.id).await {
                Ok(()) => cancelled += 1,
                Err(e) => {
                    tracing::warn!(
                        flow_id,
                        request_id = %request.id,
                        error = %e,
                        "Cascade cancel failed for request"
                    );
                }
            }
        }

        self.bus
            .publish_entity(
                &flow.owner_entity,
                json!({
                    "type": kinds::FLOW_UPDATED,
                    "flowId": flow_id,
                    "status": FlowStatus::Cancelled.as_str(),
                }),
            )
            .await;

        tracing::info!(flow_id, cancelled, "Flow cancelled");
        Ok(())
    }
}

/// Drop one request's entry from `cursor.pending`
fn remove_pending(cursor_map: &mut Map<String, Value>, request_id: &str) {
    if let Some(Value::Array(items)) = cursor_map.get_mut("pending") {
        items.retain(|item| {
            item.get("requestId").and_then(Value::as_str) != Some(request_id)
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn remove_pending_drops_only_matching_entry() {
        let mut cursor: Map<String, Value> = serde_json::from_str(
            r#"{"pending":[
                {"requestId":"a","type":"input","status":"PENDING"},
                {"requestId":"b","type":"input","status":"PENDING"}
            ]}"#,
        )
        .unwrap();
        remove_pending(&mut cursor, "a");
        let pending = cursor["pending"].as_array().unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0]["requestId"], "b");
    }
}
