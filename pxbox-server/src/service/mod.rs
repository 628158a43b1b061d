//! Service layer
//!
//! Transports call in here; services mutate storage, validate via the
//! schema compiler, emit into the event bus and arm scheduler tasks.
//! Services never partially commit: validation happens before any write,
//! and coupled writes go through conditional or transactional storage
//! operations.

pub mod entity;
pub mod flow;
pub mod recovery;
pub mod request;
pub mod runner;

pub use entity::EntityService;
pub use flow::FlowService;
pub use request::{CreateRequestInput, RequestService};
pub use runner::{BasicRunner, FlowRunner, RunnerContext, StepResult, Suspend};

/// Time-sortable opaque ID (lexicographically increasing)
pub fn new_id() -> String {
    ulid::Ulid::new().to_string()
}
