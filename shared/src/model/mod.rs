//! Data models (API DTOs)
//!
//! These types are used in REST/session request and response bodies and can
//! be consumed by clients directly. All ID fields are strings, decoupled
//! from the database implementation; timestamps serialize as RFC3339 UTC.

pub mod entity;
pub mod flow;
pub mod request;
pub mod response;

// Re-exports
pub use entity::*;
pub use flow::*;
pub use request::*;
pub use response::*;
