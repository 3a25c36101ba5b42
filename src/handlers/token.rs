//! Exchange token API handlers

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use chrono::Utc;
use serde::Serialize;
use uuid::Uuid;

use crate::error::ApiResult;
use crate::middleware::AuthenticatedUser;
use crate::reservation::ReservationResponse;
use crate::state::AppState;
use crate::token::GenerateTokenResponse;

/// Generated token plus the catalog context the lender shows alongside the
/// code (or embeds in a QR payload).
#[derive(Debug, Serialize)]
pub struct TokenWithContext {
    #[serde(flatten)]
    pub token: GenerateTokenResponse,
    pub item: String,
}

/// Issue an exchange token for a reservation. The kind is derived from the
/// current reservation status.
pub async fn generate_token(
    State(app_state): State<AppState>,
    user: AuthenticatedUser,
    Path(reservation_id): Path<Uuid>,
) -> ApiResult<(StatusCode, Json<TokenWithContext>)> {
    let response = app_state
        .token_service
        .generate(user.user_id, reservation_id)
        .await?;

    let reservation = app_state
        .reservation_service
        .get(user.user_id, reservation_id)
        .await?;
    let item = app_state
        .catalog_service
        .get_item(reservation.item_id)
        .await?;

    Ok((
        StatusCode::CREATED,
        Json(TokenWithContext {
            token: response,
            item: item.name,
        }),
    ))
}

/// Redeem an exchange token, confirming the pickup or return it stands for
pub async fn redeem_token(
    State(app_state): State<AppState>,
    user: AuthenticatedUser,
    Path(token): Path<String>,
) -> ApiResult<Json<ReservationResponse>> {
    let reservation = app_state.token_service.redeem(user.user_id, &token).await?;

    let status = app_state
        .reservation_service
        .status_of(&reservation, Utc::now());

    Ok(Json(ReservationResponse {
        reservation,
        status,
    }))
}
