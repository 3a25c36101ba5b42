//! Reservation API handlers

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use chrono::Utc;
use uuid::Uuid;
use validator::Validate;

use crate::error::ApiResult;
use crate::middleware::AuthenticatedUser;
use crate::reservation::{
    CreateReservationRequest, ListReservationsQuery, Reservation, ReservationAction,
    ReservationResponse,
};
use crate::state::AppState;

/// Create a new reservation
pub async fn create_reservation(
    State(app_state): State<AppState>,
    user: AuthenticatedUser,
    Json(request): Json<CreateReservationRequest>,
) -> ApiResult<(StatusCode, Json<ReservationResponse>)> {
    request.validate()?;

    let reservation = app_state
        .reservation_service
        .create(user.user_id, request)
        .await?;

    Ok((
        StatusCode::CREATED,
        Json(with_status(&app_state, reservation)),
    ))
}

/// List reservations where the caller is requester or lender
pub async fn list_reservations(
    State(app_state): State<AppState>,
    user: AuthenticatedUser,
    Query(query): Query<ListReservationsQuery>,
) -> ApiResult<Json<Vec<ReservationResponse>>> {
    let reservations = app_state
        .reservation_service
        .list(user.user_id, query)
        .await?;

    Ok(Json(
        reservations
            .into_iter()
            .map(|r| with_status(&app_state, r))
            .collect(),
    ))
}

/// Get a single reservation
pub async fn get_reservation(
    State(app_state): State<AppState>,
    user: AuthenticatedUser,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<ReservationResponse>> {
    let reservation = app_state.reservation_service.get(user.user_id, id).await?;
    Ok(Json(with_status(&app_state, reservation)))
}

/// Generic action dispatch for reservation transitions
pub async fn update_reservation(
    State(app_state): State<AppState>,
    user: AuthenticatedUser,
    Path(id): Path<Uuid>,
    Json(action): Json<ReservationAction>,
) -> ApiResult<Json<ReservationResponse>> {
    let service = &app_state.reservation_service;

    let reservation = match action {
        ReservationAction::Confirm { proposed_pickups } => {
            service.confirm(user.user_id, id, proposed_pickups).await?
        }
        ReservationAction::Propose { proposed_pickups } => {
            service
                .propose_new(user.user_id, id, proposed_pickups)
                .await?
        }
        ReservationAction::SelectPickup { chosen } => {
            service.select_pickup(user.user_id, id, chosen).await?
        }
        ReservationAction::Pickup => service.record_pickup(user.user_id, id).await?,
        ReservationAction::Return => service.record_return(user.user_id, id).await?,
    };

    Ok(Json(with_status(&app_state, reservation)))
}

/// Reject (lender) or cancel (requester) a reservation
pub async fn delete_reservation(
    State(app_state): State<AppState>,
    user: AuthenticatedUser,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<ReservationResponse>> {
    let reservation = app_state
        .reservation_service
        .cancel(user.user_id, id)
        .await?;
    Ok(Json(with_status(&app_state, reservation)))
}

fn with_status(app_state: &AppState, reservation: Reservation) -> ReservationResponse {
    let status = app_state
        .reservation_service
        .status_of(&reservation, Utc::now());
    ReservationResponse {
        reservation,
        status,
    }
}
