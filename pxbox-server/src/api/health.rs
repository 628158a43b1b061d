//! Liveness endpoint

use axum::extract::State;
use http::StatusCode;

use crate::state::AppState;

/// GET /healthz
pub async fn health_check(State(state): State<AppState>) -> (StatusCode, &'static str) {
    // Liveness includes the storage pool being reachable
    match sqlx::query_scalar::<_, i64>("SELECT 1")
        .fetch_one(&state.pool)
        .await
    {
        Ok(_) => (StatusCode::OK, "OK"),
        Err(_) => (StatusCode::INTERNAL_SERVER_ERROR, "storage unavailable"),
    }
}
