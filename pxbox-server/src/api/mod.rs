//! Request/response transport
//!
//! Stateless HTTP surface over the same service layer, mounted under
//! `/v1`. Per-request timeouts apply everywhere except the WebSocket
//! upgrade; errors render as the unified `{error, code, message}` body.

pub mod entities;
pub mod files;
pub mod flows;
pub mod health;
pub mod inquiries;
pub mod requests;

use axum::routing::{delete, get, post};
use axum::{middleware, Router};
use std::time::Duration;
use tower_http::cors::CorsLayer;
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;

use crate::auth::auth_middleware;
use crate::state::AppState;
use crate::ws;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(60);

/// Build the full router
pub fn create_router(state: AppState) -> Router {
    let api = Router::new()
        // Request endpoints
        .route("/requests", post(requests::create_request))
        .route("/requests/{id}", get(requests::get_request))
        .route("/requests/{id}/claim", post(requests::claim_request))
        .route(
            "/requests/{id}/response",
            post(requests::post_response).get(requests::get_response),
        )
        .route("/requests/{id}/cancel", post(requests::cancel_request))
        // Entity endpoints
        .route("/entities", post(entities::create_entity))
        .route("/entities/{id}", get(entities::get_entity))
        .route("/entities/{id}/queue", get(entities::entity_queue))
        // Inquiry (inbox) endpoints
        .route("/inquiries", get(inquiries::list_inquiries))
        .route("/inquiries/{id}/markRead", post(inquiries::mark_read))
        .route("/inquiries/{id}/snooze", post(inquiries::snooze))
        .route("/inquiries/{id}/cancel", post(inquiries::cancel_inquiry))
        .route("/inquiries/{id}", delete(inquiries::delete_inquiry))
        // Flow endpoints
        .route("/flows", post(flows::create_flow))
        .route("/flows/{id}", get(flows::get_flow))
        .route("/flows/{id}/resume", post(flows::resume_flow))
        .route("/flows/{id}/cancel", post(flows::cancel_flow))
        // File signing
        .route("/files/sign", post(files::sign_file))
        // No blanket timeout on the long-lived session upgrade, so the
        // timeout layer wraps only the routes above
        .layer(TimeoutLayer::new(REQUEST_TIMEOUT))
        .route("/ws", get(ws::handle_ws))
        .layer(middleware::from_fn_with_state(
            state.clone(),
            auth_middleware,
        ));

    Router::new()
        .nest("/v1", api)
        .route("/healthz", get(health::health_check))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}
