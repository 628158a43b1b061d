//! Event fabric
//!
//! Two layers:
//! - a durable, per-channel, strictly ordered append-only log ([`log`])
//! - an in-process fan-out hub with bounded per-subscriber queues ([`hub`])
//!
//! [`bus::EventBus`] composes the two: publishing assigns the next sequence,
//! persists the entry, then fans out — all under one append guard so
//! delivery order equals sequence order.

pub mod bus;
pub mod hub;
pub mod log;

pub use bus::EventBus;
pub use hub::{Hub, SessionEvent};
pub use log::{EventLog, EventRecord, SqliteEventLog};

/// Channel name constructors
pub fn entity_channel(entity_id: &str) -> String {
    format!("entity:{entity_id}")
}

pub fn request_channel(request_id: &str) -> String {
    format!("request:{request_id}")
}

pub fn requestor_channel(client_id: &str) -> String {
    format!("requestor:{client_id}")
}

/// Event kind strings
pub mod kinds {
    pub const REQUEST_CREATED: &str = "request.created";
    pub const REQUEST_CLAIMED: &str = "request.claimed";
    pub const REQUEST_ANSWERED: &str = "request.answered";
    pub const REQUEST_CANCELLED: &str = "request.cancelled";
    pub const REQUEST_EXPIRED: &str = "request.expired";
    pub const REQUEST_DEADLINE_APPROACHING: &str = "request.deadline_approaching";
    pub const REQUEST_NEEDS_ATTENTION: &str = "request.needs_attention";
    pub const REQUEST_REMINDER: &str = "request.reminder";
    pub const FLOW_CREATED: &str = "flow.created";
    pub const FLOW_SUSPENDED: &str = "flow.suspended";
    pub const FLOW_UPDATED: &str = "flow.updated";
    pub const FLOW_COMPLETED: &str = "flow.completed";
    pub const FLOW_FAILED: &str = "flow.failed";
}
