//! Reservation route definitions

use axum::Router;

use crate::handlers::*;
use crate::state::AppState;

pub fn reservation_routes() -> Router<AppState> {
    Router::new()
        .route(
            "/api/reservations",
            axum::routing::get(list_reservations).post(create_reservation),
        )
        .route(
            "/api/reservations/:id",
            axum::routing::get(get_reservation)
                .patch(update_reservation)
                .delete(delete_reservation),
        )
        .route(
            "/api/reservations/:id/tokens",
            axum::routing::post(generate_token),
        )
}
