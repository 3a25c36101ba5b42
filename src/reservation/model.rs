//! Reservation models for gearbook

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

/// Logical reservation status, always derived from timestamps via
/// [`super::calculate_status`]. The persisted `cached_status` column mirrors
/// this for querying but is never read for decisions.
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ReservationStatus {
    Pending,
    Confirmed,
    PickedUp,
    Returned,
    Rejected,
    Cancelled,
    Expired,
}

impl ReservationStatus {
    /// Terminal states are never reopened.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            ReservationStatus::Returned
                | ReservationStatus::Rejected
                | ReservationStatus::Cancelled
                | ReservationStatus::Expired
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ReservationStatus::Pending => "pending",
            ReservationStatus::Confirmed => "confirmed",
            ReservationStatus::PickedUp => "picked_up",
            ReservationStatus::Returned => "returned",
            ReservationStatus::Rejected => "rejected",
            ReservationStatus::Cancelled => "cancelled",
            ReservationStatus::Expired => "expired",
        }
    }
}

impl std::fmt::Display for ReservationStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Why a reservation was soft-deleted. Stored next to `deleted_at` so the
/// intent (user rejection, user/timeout cancellation, pickup expiry) is not
/// inferred from context.
#[derive(Debug, Serialize, Deserialize, sqlx::Type, Clone, Copy, PartialEq, Eq)]
#[sqlx(type_name = "reservation_cancel_reason", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum CancelReason {
    Rejected,
    Cancelled,
    AutoExpired,
}

impl CancelReason {
    /// The status a soft-deleted reservation reads as.
    pub fn status(&self) -> ReservationStatus {
        match self {
            CancelReason::Rejected => ReservationStatus::Rejected,
            CancelReason::Cancelled => ReservationStatus::Cancelled,
            CancelReason::AutoExpired => ReservationStatus::Expired,
        }
    }
}

/// Reservation model
#[derive(Debug, Serialize, Deserialize, sqlx::FromRow, Clone)]
pub struct Reservation {
    pub id: Uuid,
    pub requester_id: Uuid,
    pub lender_id: Uuid,
    pub item_id: Uuid,
    pub group_id: Option<Uuid>,
    pub starts_at: DateTime<Utc>,
    pub ends_at: DateTime<Utc>,
    pub message: Option<String>,
    pub proposed_pickups: Vec<DateTime<Utc>>,
    pub proposed_by_id: Option<Uuid>,
    pub confirmed_pickup: Option<DateTime<Utc>>,
    pub distribution_date: Option<DateTime<Utc>>,
    pub return_date: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub deleted_at: Option<DateTime<Utc>>,
    pub cancel_reason: Option<CancelReason>,
    pub cached_status: String,
    pub due_soon_notified_on: Option<chrono::NaiveDate>,
    pub overdue_notified_on: Option<chrono::NaiveDate>,
}

/// Request to create a new reservation
#[derive(Debug, Deserialize, Validate)]
pub struct CreateReservationRequest {
    pub item_id: Uuid,
    pub starts_at: DateTime<Utc>,
    pub ends_at: DateTime<Utc>,
    pub group_id: Option<Uuid>,
    #[validate(length(max = 2000))]
    pub message: Option<String>,
}

/// Action dispatch body for `PATCH /api/reservations/:id`
#[derive(Debug, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum ReservationAction {
    /// Lender accepts the request and proposes candidate pickup times.
    Confirm {
        proposed_pickups: Vec<DateTime<Utc>>,
    },
    /// Either party counter-proposes candidate pickup times.
    Propose {
        proposed_pickups: Vec<DateTime<Utc>>,
    },
    /// Either party locks in one of the proposed candidates.
    SelectPickup { chosen: DateTime<Utc> },
    /// Record the physical handoff (normally via token redemption).
    Pickup,
    /// Record the physical return (normally via token redemption).
    Return,
}

/// Query for listing reservations
#[derive(Debug, Deserialize)]
pub struct ListReservationsQuery {
    pub item_id: Option<Uuid>,
    pub status: Option<ReservationStatus>,
    pub page: Option<u32>,
    pub limit: Option<u32>,
}

/// Reservation response with the freshly derived status attached
#[derive(Debug, Serialize)]
pub struct ReservationResponse {
    #[serde(flatten)]
    pub reservation: Reservation,
    pub status: ReservationStatus,
}
