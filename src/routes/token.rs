//! Exchange token route definitions

use axum::Router;

use crate::handlers::*;
use crate::state::AppState;

pub fn token_routes() -> Router<AppState> {
    Router::new().route("/api/tokens/:token", axum::routing::patch(redeem_token))
}
