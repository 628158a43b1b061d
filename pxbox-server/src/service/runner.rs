//! Flow runners
//!
//! Different flow kinds need different step logic; the engine resolves a
//! runner from its registry by `flow.kind` and invokes it once per
//! resume/tick. A runner returns exactly one of: continue (cursor only),
//! suspend, done, or error.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::{Map, Value};
use std::sync::Arc;

use shared::error::AppResult;
use shared::model::{cursor, Flow, PendingInput, Request, RequestStatus};

use crate::events::kinds;

use super::request::{CreateRequestInput, RequestService};

/// A flow suspension point
#[derive(Debug, Clone)]
pub struct Suspend {
    /// Event kind to wait for (e.g. `request.answered`)
    pub event: String,
    /// Specific request to wait for
    pub request_id: Option<String>,
    /// Optional deadline; the request's own timers drive the timeout
    pub deadline_at: Option<DateTime<Utc>>,
    /// Label for the runner's timeout branch
    pub on_timeout: Option<String>,
}

/// The outcome of one runner invocation
pub struct StepResult {
    /// Cursor to persist
    pub cursor: Map<String, Value>,
    /// Present: the flow suspends awaiting an external event
    pub suspend: Option<Suspend>,
    /// The flow completed
    pub done: bool,
    /// The flow failed with this error string
    pub error: Option<String>,
}

impl StepResult {
    /// Keep running: persist the cursor, stay RUNNING
    pub fn running(cursor: Map<String, Value>) -> Self {
        Self {
            cursor,
            suspend: None,
            done: false,
            error: None,
        }
    }

    pub fn suspended(cursor: Map<String, Value>, suspend: Suspend) -> Self {
        Self {
            cursor,
            suspend: Some(suspend),
            done: false,
            error: None,
        }
    }

    pub fn completed(cursor: Map<String, Value>) -> Self {
        Self {
            cursor,
            suspend: None,
            done: true,
            error: None,
        }
    }

    pub fn failed(cursor: Map<String, Value>, error: impl Into<String>) -> Self {
        Self {
            cursor,
            suspend: None,
            done: false,
            error: Some(error.into()),
        }
    }
}

/// Collaborators a runner may use during a step
pub struct RunnerContext {
    request_svc: Arc<RequestService>,
}

impl RunnerContext {
    pub fn new(request_svc: Arc<RequestService>) -> Self {
        Self { request_svc }
    }

    /// Create an inquiry owned by the flow and return the suspend
    /// descriptor waiting for its answer.
    ///
    /// Appends `{requestId, type: "input", status: "PENDING"}` to
    /// `cursor.pending` so crash recovery can find the outstanding input.
    pub async fn await_input(
        &self,
        flow: &Flow,
        cursor: &mut Map<String, Value>,
        mut input: CreateRequestInput,
    ) -> AppResult<(Request, Suspend)> {
        input.flow_id = Some(flow.id.clone());
        let deadline_at = input.deadline_at;
        let request = self.request_svc.create(input).await?;

        cursor::push_pending(
            cursor,
            &PendingInput {
                request_id: request.id.clone(),
                kind: "input".into(),
                status: RequestStatus::Pending.as_str().into(),
            },
        );

        let suspend = Suspend {
            event: kinds::REQUEST_ANSWERED.into(),
            request_id: Some(request.id.clone()),
            deadline_at,
            on_timeout: deadline_at.map(|_| "timeout".to_string()),
        };
        Ok((request, suspend))
    }
}

/// Step logic for one flow kind
#[async_trait]
pub trait FlowRunner: Send + Sync {
    async fn run(&self, flow: &Flow, ctx: &RunnerContext) -> StepResult;
}

/// Built-in runner for the trivial `init → complete` flow
pub struct BasicRunner;

#[async_trait]
impl FlowRunner for BasicRunner {
    async fn run(&self, flow: &Flow, _ctx: &RunnerContext) -> StepResult {
        let mut next = flow.cursor.clone();
        match cursor::step(&next).unwrap_or("init") {
            "init" => {
                cursor::set_step(&mut next, "complete");
                StepResult::completed(next)
            }
            "complete" => StepResult::completed(next),
            // Unknown steps keep the cursor and wait for an external tick
            _ => StepResult::running(next),
        }
    }
}
