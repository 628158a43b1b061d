//! Scheduler — clock-driven side effects
//!
//! Tasks are timers keyed to wall-clock times: deadline warning, expiry,
//! auto-cancel, attention, snooze reminders. Timers live in memory; the
//! persistence story is the startup rescan in [`Scheduler::rearm`], which
//! restores every outstanding obligation from the `requests` and
//! `reminders` rows. Every handler re-checks the row status before acting,
//! so firing twice (or after a crash replay) is harmless.

use sqlx::SqlitePool;
use std::sync::{Arc, OnceLock};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use shared::error::AppResult;
use shared::model::RequestStatus;
use shared::util::now_millis;

use crate::db;
use crate::events::{kinds, EventBus};
use crate::service::RequestService;

/// What a fired task does
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskKind {
    /// Emit `request.deadline_approaching` if still PENDING
    DeadlineNotify,
    /// Transition PENDING → EXPIRED and emit `request.expired`
    DeadlineExpire,
    /// Transition PENDING → CANCELLED and emit `request.cancelled`
    AutoCancel,
    /// Emit `request.needs_attention` if still PENDING
    Attention,
    /// Emit `request.reminder` and delete the reminder row
    Reminder,
}

impl TaskKind {
    /// Notifications are skipped when already past due at arm time;
    /// state transitions run immediately instead
    fn is_notification(&self) -> bool {
        matches!(
            self,
            TaskKind::DeadlineNotify | TaskKind::Attention | TaskKind::Reminder
        )
    }
}

/// A deferred task: fire `kind` against `target_id` at `due_at` (ms)
#[derive(Debug, Clone)]
pub struct Task {
    pub kind: TaskKind,
    pub target_id: String,
    pub due_at: i64,
}

const MAX_ATTEMPTS: u32 = 3;
const BACKOFF_BASE: Duration = Duration::from_millis(500);

/// Timer scheduler over the storage rows
#[derive(Clone)]
pub struct Scheduler {
    tx: mpsc::UnboundedSender<Task>,
    inner: Arc<Inner>,
}

struct Inner {
    pool: SqlitePool,
    bus: EventBus,
    /// Late-bound: the request service is constructed after the scheduler
    request_svc: OnceLock<Arc<RequestService>>,
}

impl Scheduler {
    /// Create the scheduler and spawn its dispatch loop
    pub fn start(pool: SqlitePool, bus: EventBus, shutdown: CancellationToken) -> Self {
        let (tx, mut rx) = mpsc::unbounded_channel::<Task>();
        let inner = Arc::new(Inner {
            pool,
            bus,
            request_svc: OnceLock::new(),
        });

        let dispatch_inner = inner.clone();
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    task = rx.recv() => {
                        let Some(task) = task else { break };
                        let inner = dispatch_inner.clone();
                        tokio::spawn(async move {
                            let wait = task.due_at.saturating_sub(now_millis());
                            if wait > 0 {
                                tokio::time::sleep(Duration::from_millis(wait as u64)).await;
                            }
                            fire_with_retry(&inner, &task).await;
                        });
                    }
                    _ = shutdown.cancelled() => {
                        tracing::info!("Scheduler stopped");
                        break;
                    }
                }
            }
        });

        Self { tx, inner }
    }

    /// Bind the request service (wiring happens after construction)
    pub fn bind_request_service(&self, svc: Arc<RequestService>) {
        let _ = self.inner.request_svc.set(svc);
    }

    /// Arm a task. Past-due notifications are dropped; past-due state
    /// transitions fire as soon as the dispatcher picks them up.
    pub fn schedule(&self, task: Task) {
        if task.due_at <= now_millis() && task.kind.is_notification() {
            tracing::debug!(?task.kind, target = %task.target_id, "Skipping past-due notification");
            return;
        }
        if self.tx.send(task).is_err() {
            tracing::warn!("Scheduler dispatch loop is gone, task dropped");
        }
    }

    /// Execute a task immediately (timer path and tests)
    pub async fn fire(&self, task: &Task) -> AppResult<()> {
        execute(&self.inner, task).await
    }

    /// Re-arm every outstanding obligation from storage.
    ///
    /// Called at startup; safe to call repeatedly — handlers check row
    /// status before acting.
    pub async fn rearm(&self, warning_window: Duration) -> AppResult<()> {
        let mut armed = 0usize;

        for request in db::requests::list_pending_with_timers(&self.inner.pool).await? {
            if let Some(deadline) = request.deadline_at {
                let deadline_ms = deadline.timestamp_millis();
                self.schedule(Task {
                    kind: TaskKind::DeadlineNotify,
                    target_id: request.id.clone(),
                    due_at: deadline_ms - warning_window.as_millis() as i64,
                });
                self.schedule(Task {
                    kind: TaskKind::DeadlineExpire,
                    target_id: request.id.clone(),
                    due_at: deadline_ms,
                });
                if let Some(grace) = request.autocancel_grace_secs {
                    if grace > 0 {
                        self.schedule(Task {
                            kind: TaskKind::AutoCancel,
                            target_id: request.id.clone(),
                            due_at: deadline_ms + grace * 1000,
                        });
                    }
                }
                armed += 1;
            }
            if let Some(attention) = request.attention_at {
                self.schedule(Task {
                    kind: TaskKind::Attention,
                    target_id: request.id.clone(),
                    due_at: attention.timestamp_millis(),
                });
                armed += 1;
            }
        }

        for reminder in db::reminders::list_all(&self.inner.pool).await? {
            self.schedule(Task {
                kind: TaskKind::Reminder,
                target_id: reminder.id.clone(),
                due_at: reminder.remind_at,
            });
            armed += 1;
        }

        tracing::info!(armed, "Scheduler re-armed from storage");
        Ok(())
    }
}

async fn fire_with_retry(inner: &Arc<Inner>, task: &Task) {
    let mut attempt = 0;
    loop {
        match execute(inner, task).await {
            Ok(()) => return,
            Err(e) => {
                attempt += 1;
                if attempt >= MAX_ATTEMPTS {
                    // Abandon: the row's state machine keeps the system
                    // correct, a later read can still transition on demand
                    tracing::error!(
                        ?task.kind,
                        target = %task.target_id,
                        error = %e,
                        "Scheduled task abandoned after retries"
                    );
                    return;
                }
                tracing::warn!(
                    ?task.kind,
                    target = %task.target_id,
                    attempt,
                    error = %e,
                    "Scheduled task failed, retrying"
                );
                tokio::time::sleep(BACKOFF_BASE * 2u32.pow(attempt - 1)).await;
            }
        }
    }
}

async fn execute(inner: &Inner, task: &Task) -> AppResult<()> {
    match task.kind {
        TaskKind::DeadlineNotify => deadline_notify(inner, &task.target_id).await,
        TaskKind::DeadlineExpire => {
            if let Some(svc) = inner.request_svc.get() {
                svc.expire(&task.target_id).await
            } else {
                Ok(())
            }
        }
        TaskKind::AutoCancel => {
            if let Some(svc) = inner.request_svc.get() {
                svc.auto_cancel(&task.target_id).await
            } else {
                Ok(())
            }
        }
        TaskKind::Attention => attention(inner, &task.target_id).await,
        TaskKind::Reminder => reminder(inner, &task.target_id).await,
    }
}

async fn deadline_notify(inner: &Inner, request_id: &str) -> AppResult<()> {
    let request = match db::requests::get_by_id(&inner.pool, request_id).await {
        Ok(r) => r,
        // Row gone: nothing to notify about
        Err(_) => return Ok(()),
    };
    if request.status != RequestStatus::Pending {
        return Ok(());
    }

    inner
        .bus
        .publish_entity(
            &request.entity_id,
            serde_json::json!({
                "type": kinds::REQUEST_DEADLINE_APPROACHING,
                "requestId": request_id,
                "deadlineAt": request.deadline_at,
            }),
        )
        .await;
    tracing::info!(request_id, "Deadline notification sent");
    Ok(())
}

async fn attention(inner: &Inner, request_id: &str) -> AppResult<()> {
    let request = match db::requests::get_by_id(&inner.pool, request_id).await {
        Ok(r) => r,
        Err(_) => return Ok(()),
    };
    if request.status != RequestStatus::Pending {
        return Ok(());
    }

    inner
        .bus
        .publish_entity(
            &request.entity_id,
            serde_json::json!({
                "type": kinds::REQUEST_NEEDS_ATTENTION,
                "requestId": request_id,
                "attentionAt": request.attention_at,
            }),
        )
        .await;
    tracing::info!(request_id, "Attention notification sent");
    Ok(())
}

async fn reminder(inner: &Inner, reminder_id: &str) -> AppResult<()> {
    let reminder = match db::reminders::get_by_id(&inner.pool, reminder_id).await {
        Ok(r) => r,
        // Already fired or the request left PENDING/CLAIMED
        Err(_) => return Ok(()),
    };

    inner
        .bus
        .publish_entity(
            &reminder.entity_id,
            serde_json::json!({
                "type": kinds::REQUEST_REMINDER,
                "requestId": reminder.request_id,
                "reminderId": reminder_id,
            }),
        )
        .await;
    db::reminders::delete(&inner.pool, reminder_id).await?;
    tracing::info!(reminder_id, request_id = %reminder.request_id, "Reminder sent");
    Ok(())
}
