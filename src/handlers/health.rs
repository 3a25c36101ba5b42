//! Health check handler

use axum::{extract::State, http::StatusCode, Json};
use serde_json::{json, Value};

use crate::db;
use crate::state::AppState;

/// Liveness and database connectivity check
pub async fn health_check(State(app_state): State<AppState>) -> (StatusCode, Json<Value>) {
    match db::check_health(&app_state.db_pool).await {
        Ok(()) => (
            StatusCode::OK,
            Json(json!({ "status": "ok", "database": "up" })),
        ),
        Err(e) => {
            tracing::error!("Health check failed: {}", e);
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(json!({ "status": "degraded", "database": "down" })),
            )
        }
    }
}
