//! Request service — the inquiry lifecycle engine
//!
//! ```text
//!             claim (conditional, at-most-one)
//!             └─► CLAIMED
//! PENDING ───┤   postResponse (validated)
//!             ├─► ANSWERED  (terminal)
//!             ├─► CANCELLED (terminal)
//!             └─► EXPIRED   (terminal, scheduler-driven)
//! ```
//!
//! Every transition is a conditional storage update; replaying a
//! terminal-producing action on an already-terminal row returns
//! `invalid_transition` without side effects.

use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::{json, Map, Value};
use sqlx::SqlitePool;
use std::sync::{Arc, OnceLock};

use shared::error::{AppError, AppResult};
use shared::model::{EntityRef, Request, RequestStatus, Response, SchemaKind};
use shared::policy::{normalize_files, FilePolicy};

use crate::db;
use crate::db::requests::{NewRequest, SortBy};
use crate::events::{kinds, EventBus};
use crate::sched::{Scheduler, Task, TaskKind};
use crate::schema::SchemaCompiler;

use super::entity::EntityService;
use super::flow::FlowService;
use super::new_id;

/// Inbound payload for request creation
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateRequestInput {
    #[serde(default)]
    pub entity: EntityRef,
    pub schema: Value,
    #[serde(default)]
    pub ui_hints: Map<String, Value>,
    #[serde(default)]
    pub prefill: Map<String, Value>,
    #[serde(default)]
    pub expires_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub deadline_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub attention_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub autocancel_grace_secs: Option<i64>,
    #[serde(default)]
    pub callback_url: Option<String>,
    #[serde(default)]
    pub callback_secret: Option<String>,
    #[serde(default)]
    pub files_policy: Option<Value>,
    /// Issuer identity; filled from the authenticated context, never the body
    #[serde(skip)]
    pub created_by: String,
    /// Owning flow; set by the flow engine's await-input helper
    #[serde(skip)]
    pub flow_id: Option<String>,
}

/// Request lifecycle service
pub struct RequestService {
    pool: SqlitePool,
    compiler: Arc<SchemaCompiler>,
    entity_svc: EntityService,
    bus: EventBus,
    scheduler: Scheduler,
    warning_window_secs: i64,
    /// Late-bound to break the construction cycle with the flow engine
    flow_svc: OnceLock<Arc<FlowService>>,
}

impl RequestService {
    pub fn new(
        pool: SqlitePool,
        compiler: Arc<SchemaCompiler>,
        entity_svc: EntityService,
        bus: EventBus,
        scheduler: Scheduler,
        warning_window_secs: i64,
    ) -> Self {
        Self {
            pool,
            compiler,
            entity_svc,
            bus,
            scheduler,
            warning_window_secs,
            flow_svc: OnceLock::new(),
        }
    }

    /// Wire the flow engine in after construction
    pub fn bind_flow_service(&self, svc: Arc<FlowService>) {
        let _ = self.flow_svc.set(svc);
    }

    /// Create an inquiry: resolve the target, prepare the schema, persist
    /// PENDING, emit `request.created`, arm the timed milestones.
    pub async fn create(&self, input: CreateRequestInput) -> AppResult<Request> {
        let entity = self.entity_svc.resolve(&input.entity).await?;

        let schema_kind = SchemaKind::detect(&input.schema);
        if schema_kind.validates() {
            self.compiler.prepare(&input.schema)?;
        }

        if let Some(ref policy) = input.files_policy {
            // Fail fast on unparseable policies; responses rely on it later
            FilePolicy::parse(policy)?;
        }

        let id = new_id();
        let request = db::requests::create(
            &self.pool,
            NewRequest {
                id: &id,
                created_by: &input.created_by,
                entity_id: &entity.id,
                schema_kind,
                schema_payload: &input.schema,
                ui_hints: &input.ui_hints,
                prefill: &input.prefill,
                expires_at: input.expires_at.map(|t| t.timestamp_millis()),
                deadline_at: input.deadline_at.map(|t| t.timestamp_millis()),
                attention_at: input.attention_at.map(|t| t.timestamp_millis()),
                autocancel_grace: input.autocancel_grace_secs,
                callback_url: input.callback_url.as_deref(),
                callback_secret: input.callback_secret.as_deref(),
                files_policy: input.files_policy.as_ref(),
                flow_id: input.flow_id.as_deref(),
            },
        )
        .await?;

        self.bus
            .publish_entity(
                &entity.id,
                json!({
                    "type": kinds::REQUEST_CREATED,
                    "requestId": id,
                    "entityId": entity.id,
                }),
            )
            .await;
        self.bus
            .publish_requestor(
                &input.created_by,
                json!({
                    "type": kinds::REQUEST_CREATED,
                    "requestId": id,
                }),
            )
            .await;

        self.arm_timers(&request);

        tracing::info!(
            request_id = %id,
            entity_id = %entity.id,
            schema_kind = schema_kind.as_str(),
            "Request created"
        );
        Ok(request)
    }

    fn arm_timers(&self, request: &Request) {
        if let Some(deadline) = request.deadline_at {
            let deadline_ms = deadline.timestamp_millis();
            self.scheduler.schedule(Task {
                kind: TaskKind::DeadlineNotify,
                target_id: request.id.clone(),
                due_at: deadline_ms - self.warning_window_secs * 1000,
            });
            self.scheduler.schedule(Task {
                kind: TaskKind::DeadlineExpire,
                target_id: request.id.clone(),
                due_at: deadline_ms,
            });
            if let Some(grace) = request.autocancel_grace_secs {
                if grace > 0 {
                    self.scheduler.schedule(Task {
                        kind: TaskKind::AutoCancel,
                        target_id: request.id.clone(),
                        due_at: deadline_ms + grace * 1000,
                    });
                }
            }
        }
        if let Some(attention) = request.attention_at {
            self.scheduler.schedule(Task {
                kind: TaskKind::Attention,
                target_id: request.id.clone(),
                due_at: attention.timestamp_millis(),
            });
        }
    }

    pub async fn get(&self, id: &str) -> AppResult<Request> {
        db::requests::get_by_id(&self.pool, id).await
    }

    pub async fn get_response(&self, request_id: &str) -> AppResult<Response> {
        db::responses::get_by_request_id(&self.pool, request_id).await
    }

    /// Claim: conditional `PENDING → CLAIMED`. At most one of N concurrent
    /// claimers succeeds; the rest observe `claim_conflict`.
    pub async fn claim(&self, id: &str) -> AppResult<Request> {
        if !db::requests::claim(&self.pool, id).await? {
            // Distinguish missing rows from lost races
            let request = db::requests::get_by_id(&self.pool, id).await?;
            return Err(AppError::claim_conflict(id)
                .with_detail("status", request.status.as_str()));
        }

        let request = db::requests::get_by_id(&self.pool, id).await?;
        self.bus
            .publish_request(
                id,
                json!({"type": kinds::REQUEST_CLAIMED, "requestId": id}),
            )
            .await;
        self.bus
            .publish_entity(
                &request.entity_id,
                json!({"type": kinds::REQUEST_CLAIMED, "requestId": id}),
            )
            .await;

        tracing::info!(request_id = %id, "Request claimed");
        Ok(request)
    }

    /// Post a response: validate, persist response + ANSWERED atomically,
    /// emit `request.answered`, resume the owning flow if any.
    pub async fn post_response(
        &self,
        request_id: &str,
        answered_by: Option<&str>,
        payload: Map<String, Value>,
        files: &[Value],
    ) -> AppResult<Response> {
        let request = db::requests::get_by_id(&self.pool, request_id).await?;

        // The target entity answers unless the caller says otherwise
        let answered_by = match answered_by {
            Some(id) if !id.is_empty() => id.to_string(),
            _ => request.entity_id.clone(),
        };
        if !db::entities::exists(&self.pool, &answered_by).await? {
            return Err(AppError::entity_not_found(&answered_by));
        }

        if request.schema_kind.validates() {
            self.compiler.validate(
                request.schema_kind,
                &request.schema_payload,
                &Value::Object(payload.clone()),
            )?;
        }

        let files = normalize_files(files)?;
        if let Some(ref policy_value) = request.files_policy {
            FilePolicy::parse(policy_value)?.validate_files(&files)?;
        }

        let response_id = new_id();
        let response = db::responses::answer(
            &self.pool,
            &response_id,
            request_id,
            &answered_by,
            &payload,
            &files,
        )
        .await?
        .ok_or_else(|| {
            AppError::invalid_transition(request.status.as_str(), RequestStatus::Answered.as_str())
        })?;

        db::reminders::delete_by_request(&self.pool, request_id).await?;

        self.bus
            .publish_request(
                request_id,
                json!({"type": kinds::REQUEST_ANSWERED, "requestId": request_id}),
            )
            .await;
        self.bus
            .publish_entity(
                &request.entity_id,
                json!({"type": kinds::REQUEST_ANSWERED, "requestId": request_id}),
            )
            .await;
        self.bus
            .publish_requestor(
                &request.created_by,
                json!({
                    "type": kinds::REQUEST_ANSWERED,
                    "requestId": request_id,
                    "payload": response.payload,
                    "files": response.files,
                }),
            )
            .await;

        tracing::info!(request_id, answered_by = %answered_by, "Response accepted");

        if let Some(ref flow_id) = request.flow_id {
            self.notify_flow(flow_id, kinds::REQUEST_ANSWERED, request_id)
                .await;
        }

        Ok(response)
    }

    /// Cancel from PENDING or CLAIMED; a request bound to a flow never
    /// cancels without the flow hearing about it.
    pub async fn cancel(&self, id: &str) -> AppResult<()> {
        self.cancel_inner(id, &[RequestStatus::Pending, RequestStatus::Claimed], true)
            .await
    }

    /// Scheduler edge: cancel only when still PENDING
    pub async fn auto_cancel(&self, id: &str) -> AppResult<()> {
        match self
            .cancel_inner(id, &[RequestStatus::Pending], true)
            .await
        {
            Ok(()) => Ok(()),
            // Someone claimed or answered before the timer fired — fine
            Err(e) if e.code == shared::error::ErrorCode::InvalidTransition => Ok(()),
            Err(e) => Err(e),
        }
    }

    /// Flow-cascade cancel: skips the flow notification to avoid
    /// re-entering the flow that is being cancelled
    pub(crate) async fn cancel_for_flow(&self, id: &str) -> AppResult<()> {
        self.cancel_inner(id, &[RequestStatus::Pending, RequestStatus::Claimed], false)
            .await
    }

    async fn cancel_inner(
        &self,
        id: &str,
        allowed_from: &[RequestStatus],
        notify_flow: bool,
    ) -> AppResult<()> {
        let request = db::requests::get_by_id(&self.pool, id).await?;
        if !db::requests::transition(&self.pool, id, RequestStatus::Cancelled, allowed_from).await?
        {
            return Err(AppError::invalid_transition(
                request.status.as_str(),
                RequestStatus::Cancelled.as_str(),
            ));
        }

        db::reminders::delete_by_request(&self.pool, id).await?;

        self.bus
            .publish_request(
                id,
                json!({"type": kinds::REQUEST_CANCELLED, "requestId": id}),
            )
            .await;
        self.bus
            .publish_entity(
                &request.entity_id,
                json!({"type": kinds::REQUEST_CANCELLED, "requestId": id}),
            )
            .await;

        tracing::info!(request_id = %id, "Request cancelled");

        if notify_flow {
            if let Some(ref flow_id) = request.flow_id {
                self.notify_flow(flow_id, kinds::REQUEST_CANCELLED, id).await;
            }
        }
        Ok(())
    }

    /// Scheduler edge: expire only when still PENDING. Quietly a no-op
    /// when the request progressed before the deadline fired.
    pub async fn expire(&self, id: &str) -> AppResult<()> {
        let request = match db::requests::get_by_id(&self.pool, id).await {
            Ok(r) => r,
            Err(_) => return Ok(()),
        };
        if !db::requests::transition(
            &self.pool,
            id,
            RequestStatus::Expired,
            &[RequestStatus::Pending],
        )
        .await?
        {
            return Ok(());
        }

        db::reminders::delete_by_request(&self.pool, id).await?;

        self.bus
            .publish_request(
                id,
                json!({"type": kinds::REQUEST_EXPIRED, "requestId": id}),
            )
            .await;
        self.bus
            .publish_entity(
                &request.entity_id,
                json!({"type": kinds::REQUEST_EXPIRED, "requestId": id}),
            )
            .await;

        tracing::info!(request_id = %id, "Request expired");

        if let Some(ref flow_id) = request.flow_id {
            self.notify_flow(flow_id, kinds::REQUEST_EXPIRED, id).await;
        }
        Ok(())
    }

    /// Resume the owning flow; failures log — the flow recovery loop is
    /// the safety net, not this call
    async fn notify_flow(&self, flow_id: &str, event: &str, request_id: &str) {
        let Some(flow_svc) = self.flow_svc.get() else {
            return;
        };
        let mut data = Map::new();
        data.insert("requestId".into(), Value::String(request_id.into()));
        if let Err(e) = flow_svc.resume(flow_id, event, data).await {
            tracing::warn!(flow_id, request_id, event, error = %e, "Flow notification failed");
        }
    }

    // ==================== Inbox operations ====================

    pub async fn entity_queue(
        &self,
        entity_id: &str,
        status: Option<RequestStatus>,
        limit: i64,
        offset: i64,
    ) -> AppResult<Vec<Request>> {
        db::requests::entity_queue(&self.pool, entity_id, status, limit, offset).await
    }

    pub async fn list_inquiries(
        &self,
        entity_id: Option<&str>,
        status: Option<RequestStatus>,
        sort_by: SortBy,
        limit: i64,
        offset: i64,
    ) -> AppResult<Vec<Request>> {
        db::requests::list_inquiries(&self.pool, entity_id, status, sort_by, limit, offset).await
    }

    pub async fn mark_read(&self, id: &str) -> AppResult<()> {
        if !db::requests::mark_read(&self.pool, id).await? {
            return Err(AppError::request_not_found(id));
        }
        Ok(())
    }

    /// Soft delete: hides the row from inboxes, keeps it for audit and
    /// flow reference integrity
    pub async fn soft_delete(&self, id: &str) -> AppResult<()> {
        if !db::requests::soft_delete(&self.pool, id).await? {
            return Err(AppError::request_not_found(id));
        }
        Ok(())
    }

    /// Snooze: persist a reminder and arm its timer
    pub async fn snooze(
        &self,
        id: &str,
        entity_id: &str,
        remind_at: DateTime<Utc>,
    ) -> AppResult<String> {
        let request = db::requests::get_by_id(&self.pool, id).await?;
        if request.status.is_terminal() {
            return Err(AppError::invalid_transition(
                request.status.as_str(),
                "snoozed",
            ));
        }

        let reminder_id = new_id();
        db::reminders::create(
            &self.pool,
            &reminder_id,
            id,
            entity_id,
            remind_at.timestamp_millis(),
        )
        .await?;
        self.scheduler.schedule(Task {
            kind: TaskKind::Reminder,
            target_id: reminder_id.clone(),
            due_at: remind_at.timestamp_millis(),
        });
        Ok(reminder_id)
    }
}
