//! PxBox broker server
//!
//! A data-entry broker mediating structured inquiries between requestors
//! and responders:
//!
//! - **Request lifecycle** (`service::request`): PENDING → CLAIMED /
//!   ANSWERED / CANCELLED / EXPIRED, schema-validated responses
//! - **Flow engine** (`service::flow`): durable workflows that suspend on
//!   outstanding inquiries and survive restarts (`service::recovery`)
//! - **Event fabric** (`events`): per-channel monotonic sequences, durable
//!   replay log, in-process fan-out with bounded queues
//! - **Dual transports**: WebSocket sessions (`ws`) and a stateless HTTP
//!   surface (`api`) over the same services
//! - **Scheduler** (`sched`): deadline warning, expiry, auto-cancel,
//!   attention, snooze reminders
//!
//! # Module structure
//!
//! ```text
//! pxbox-server/src/
//! ├── config.rs      # env configuration
//! ├── state.rs       # AppState wiring
//! ├── db/            # storage adapter (sqlx/SQLite)
//! ├── schema/        # JSON-Schema compiler + cache + $ref allowlist
//! ├── events/        # event log, hub, bus
//! ├── service/       # entity, request, flow, runner, recovery
//! ├── sched/         # timed side effects
//! ├── ws/            # session transport
//! ├── api/           # request/response transport
//! ├── auth/          # bearer verification, identity context
//! └── files/         # pre-signed URL collaborator
//! ```

pub mod api;
pub mod auth;
pub mod config;
pub mod db;
pub mod events;
pub mod files;
pub mod sched;
pub mod schema;
pub mod service;
pub mod state;
pub mod ws;

pub use config::Config;
pub use state::AppState;
