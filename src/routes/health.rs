//! Health route definitions

use axum::Router;

use crate::handlers::health_check;
use crate::state::AppState;

pub fn health_routes() -> Router<AppState> {
    Router::new().route("/health", axum::routing::get(health_check))
}
