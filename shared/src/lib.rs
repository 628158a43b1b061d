//! Shared types for PxBox
//!
//! Common types used by both the broker server and clients: the unified
//! error system, the session message envelope, the data models and the
//! file-policy validation helpers.

pub mod envelope;
pub mod error;
pub mod model;
pub mod policy;
pub mod util;

// Re-exports
pub use http;
pub use serde::{Deserialize, Serialize};

pub use envelope::{Envelope, MessageType};
pub use error::{ApiResponse, AppError, AppResult, ErrorCategory, ErrorCode};
pub use model::{
    Entity, EntityKind, Flow, FlowStatus, Request, RequestStatus, Response, SchemaKind,
};
pub use policy::{FileDescriptor, FilePolicy};
