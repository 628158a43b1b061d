//! Session transport
//!
//! One long-lived WebSocket per client. The session owns its subscribed
//! channels, a bounded outbound queue fed by the hub, and the caller
//! identity fixed at handshake. Events for a given channel always leave
//! the session in strictly increasing sequence order — live fan-out and
//! replay both feed the same ordered queue.

mod commands;
mod session;

pub use commands::dispatch_command;
pub use session::handle_ws;
