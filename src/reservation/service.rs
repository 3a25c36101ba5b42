//! Reservation service layer - lifecycle transitions for reservations
//!
//! Every guarded transition re-derives the logical status from a freshly
//! loaded row before acting, and performs its write as a conditional UPDATE
//! that re-checks the timestamp precondition. Whichever concurrent writer
//! commits first wins; the loser observes zero affected rows and reports an
//! `InvalidState` conflict instead of corrupting the record.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde_json::json;
use sqlx::{PgConnection, PgPool};
use uuid::Uuid;

use crate::catalog;
use crate::config::LifecycleConfig;
use crate::error::{ApiError, ApiResult};
use crate::notify::{notify_best_effort, NotificationKind, NotificationPort};

use super::availability::has_overlap;
use super::{
    calculate_status, CancelReason, CreateReservationRequest, ListReservationsQuery, Reservation,
    ReservationStatus,
};

// Postgres SQLSTATE for a serialization failure under SERIALIZABLE.
const SERIALIZATION_FAILURE: &str = "40001";

/// Reservation service for managing the reservation lifecycle
pub struct ReservationService {
    db_pool: PgPool,
    lifecycle: LifecycleConfig,
    notifier: Arc<dyn NotificationPort>,
}

impl ReservationService {
    /// Create a new reservation service instance
    pub fn new(
        db_pool: PgPool,
        lifecycle: LifecycleConfig,
        notifier: Arc<dyn NotificationPort>,
    ) -> Self {
        Self {
            db_pool,
            lifecycle,
            notifier,
        }
    }

    pub fn lifecycle(&self) -> &LifecycleConfig {
        &self.lifecycle
    }

    /// Derive the current logical status of a reservation.
    pub fn status_of(&self, reservation: &Reservation, now: DateTime<Utc>) -> ReservationStatus {
        calculate_status(reservation, &self.lifecycle, now)
    }

    /// Create a reservation after an availability check.
    ///
    /// Check and insert run in one SERIALIZABLE transaction against the
    /// item: of two concurrent requests for overlapping windows exactly one
    /// commits, the other fails the overlap check or the serialization
    /// conflict and surfaces a validation error either way.
    pub async fn create(
        &self,
        actor: Uuid,
        request: CreateReservationRequest,
    ) -> ApiResult<Reservation> {
        if request.starts_at > request.ends_at {
            return Err(ApiError::Validation(
                "Reservation window end must not precede its start".to_string(),
            ));
        }

        let mut tx = self.db_pool.begin().await?;
        sqlx::query("SET TRANSACTION ISOLATION LEVEL SERIALIZABLE")
            .execute(&mut *tx)
            .await?;

        let item = catalog::get_item_on(&mut tx, request.item_id).await?;
        if !item.is_active {
            return Err(ApiError::Validation(format!(
                "Item {} is not available for lending",
                item.id
            )));
        }

        if let Some(group_id) = request.group_id {
            if !catalog::is_group_member_on(&mut tx, group_id, actor).await? {
                return Err(ApiError::Unauthorized(
                    "Requester is not a member of the given group".to_string(),
                ));
            }
        }

        if has_overlap(&mut tx, request.item_id, request.starts_at, request.ends_at).await? {
            return Err(ApiError::Validation(format!(
                "Item {} is already reserved for an overlapping window",
                request.item_id
            )));
        }

        let now = Utc::now();
        let reservation = sqlx::query_as::<_, Reservation>(
            r#"
            INSERT INTO reservations (
                id, requester_id, lender_id, item_id, group_id,
                starts_at, ends_at, message, created_at, cached_status
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            RETURNING *
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(actor)
        .bind(item.owned_by)
        .bind(request.item_id)
        .bind(request.group_id)
        .bind(request.starts_at)
        .bind(request.ends_at)
        .bind(&request.message)
        .bind(now)
        .bind(ReservationStatus::Pending.as_str())
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await.map_err(|e| {
            if is_serialization_failure(&e) {
                ApiError::Validation(format!(
                    "Item {} is already reserved for an overlapping window",
                    request.item_id
                ))
            } else {
                ApiError::from(e)
            }
        })?;

        tracing::info!(
            reservation = %reservation.id,
            item = %reservation.item_id,
            requester = %actor,
            "Reservation created"
        );

        notify_best_effort(
            self.notifier.clone(),
            reservation.lender_id,
            Some(reservation.requester_id),
            format!("New reservation request for {}", item.name),
            NotificationKind::ReservationRequested,
            json!({
                "reservation_id": reservation.id,
                "item": item.name,
                "starts_at": reservation.starts_at,
                "ends_at": reservation.ends_at,
            }),
        );

        Ok(reservation)
    }

    /// Get a reservation visible to `actor` (requester, lender, or group
    /// member).
    pub async fn get(&self, actor: Uuid, id: Uuid) -> ApiResult<Reservation> {
        let mut conn = self.db_pool.acquire().await?;
        let reservation = fetch(&mut conn, id).await?;

        if !self.is_party(&mut conn, &reservation, actor).await? {
            // Hidden, not forbidden: outsiders cannot probe for existence.
            return Err(ApiError::NotFound(format!(
                "Reservation {} does not exist",
                id
            )));
        }

        Ok(reservation)
    }

    /// List reservations where `actor` is requester or lender.
    pub async fn list(
        &self,
        actor: Uuid,
        query: ListReservationsQuery,
    ) -> ApiResult<Vec<Reservation>> {
        let (limit, offset) = page_window(query.page, query.limit);

        let mut query_builder: sqlx::QueryBuilder<sqlx::Postgres> = sqlx::QueryBuilder::new(
            "SELECT * FROM reservations WHERE (requester_id = ",
        );
        query_builder.push_bind(actor);
        query_builder.push(" OR lender_id = ");
        query_builder.push_bind(actor);
        query_builder.push(")");

        if let Some(item_id) = query.item_id {
            query_builder.push(" AND item_id = ");
            query_builder.push_bind(item_id);
        }
        if let Some(status) = query.status {
            // Filtering is the one legitimate use of the cached column.
            query_builder.push(" AND cached_status = ");
            query_builder.push_bind(status.as_str());
        }

        query_builder.push(" ORDER BY created_at DESC LIMIT ");
        query_builder.push_bind(limit);
        query_builder.push(" OFFSET ");
        query_builder.push_bind(offset);

        let reservations = query_builder
            .build_query_as::<Reservation>()
            .fetch_all(&self.db_pool)
            .await?;

        Ok(reservations)
    }

    /// Lender accepts a pending request and proposes candidate pickup times.
    pub async fn confirm(
        &self,
        actor: Uuid,
        id: Uuid,
        proposed_pickups: Vec<DateTime<Utc>>,
    ) -> ApiResult<Reservation> {
        if proposed_pickups.is_empty() {
            return Err(ApiError::Validation(
                "At least one proposed pickup time is required".to_string(),
            ));
        }

        let now = Utc::now();
        let mut conn = self.db_pool.acquire().await?;
        let reservation = fetch(&mut conn, id).await?;

        if reservation.lender_id != actor {
            return Err(ApiError::Unauthorized(
                "Only the lender may confirm a reservation".to_string(),
            ));
        }

        let status = self.status_of(&reservation, now);
        if status != ReservationStatus::Pending {
            return Err(ApiError::invalid_state(status, "confirm requires pending"));
        }

        let updated = sqlx::query_as::<_, Reservation>(
            r#"
            UPDATE reservations
            SET proposed_pickups = $1, proposed_by_id = $2
            WHERE id = $3
              AND deleted_at IS NULL
              AND return_date IS NULL
              AND distribution_date IS NULL
              AND confirmed_pickup IS NULL
              AND created_at >= $4
            RETURNING *
            "#,
        )
        .bind(&proposed_pickups)
        .bind(actor)
        .bind(id)
        .bind(now - self.lifecycle.pending_ttl())
        .fetch_optional(&mut *conn)
        .await?;

        let reservation =
            self.require_transitioned(&mut conn, id, updated, now, "confirm requires pending")
                .await?;

        notify_best_effort(
            self.notifier.clone(),
            reservation.requester_id,
            Some(reservation.lender_id),
            "Your reservation request was accepted".to_string(),
            NotificationKind::ReservationConfirmed,
            json!({
                "reservation_id": reservation.id,
                "proposed_pickups": reservation.proposed_pickups,
            }),
        );

        Ok(reservation)
    }

    /// Either party proposes new candidate pickup times. Allowed any time
    /// before the handoff is recorded.
    pub async fn propose_new(
        &self,
        actor: Uuid,
        id: Uuid,
        proposed_pickups: Vec<DateTime<Utc>>,
    ) -> ApiResult<Reservation> {
        if proposed_pickups.is_empty() {
            return Err(ApiError::Validation(
                "At least one proposed pickup time is required".to_string(),
            ));
        }

        let now = Utc::now();
        let mut conn = self.db_pool.acquire().await?;
        let reservation = fetch(&mut conn, id).await?;

        require_party(&reservation, actor)?;

        let status = self.status_of(&reservation, now);
        if status.is_terminal() || status == ReservationStatus::PickedUp {
            return Err(ApiError::invalid_state(
                status,
                "pickup times can only be proposed before the handoff",
            ));
        }

        let updated = sqlx::query_as::<_, Reservation>(
            r#"
            UPDATE reservations
            SET proposed_pickups = $1, proposed_by_id = $2
            WHERE id = $3
              AND deleted_at IS NULL
              AND return_date IS NULL
              AND distribution_date IS NULL
            RETURNING *
            "#,
        )
        .bind(&proposed_pickups)
        .bind(actor)
        .bind(id)
        .fetch_optional(&mut *conn)
        .await?;

        self.require_transitioned(
            &mut conn,
            id,
            updated,
            now,
            "pickup times can only be proposed before the handoff",
        )
        .await
    }

    /// Lock in one of the proposed candidates as the agreed pickup instant.
    pub async fn select_pickup(
        &self,
        actor: Uuid,
        id: Uuid,
        chosen: DateTime<Utc>,
    ) -> ApiResult<Reservation> {
        let now = Utc::now();
        let mut conn = self.db_pool.acquire().await?;
        let reservation = fetch(&mut conn, id).await?;

        require_party(&reservation, actor)?;

        let status = self.status_of(&reservation, now);
        if status.is_terminal() || status == ReservationStatus::PickedUp {
            return Err(ApiError::invalid_state(
                status,
                "pickup selection requires an open reservation",
            ));
        }
        if reservation.confirmed_pickup.is_some() {
            return Err(ApiError::invalid_state(
                status,
                "a pickup time is already locked in",
            ));
        }
        if !reservation.proposed_pickups.contains(&chosen) {
            return Err(ApiError::Validation(
                "Chosen pickup time is not among the proposed candidates".to_string(),
            ));
        }

        let updated = sqlx::query_as::<_, Reservation>(
            r#"
            UPDATE reservations
            SET confirmed_pickup = $1, cached_status = $2
            WHERE id = $3
              AND deleted_at IS NULL
              AND return_date IS NULL
              AND distribution_date IS NULL
              AND confirmed_pickup IS NULL
              AND $1 = ANY(proposed_pickups)
            RETURNING *
            "#,
        )
        .bind(chosen)
        .bind(ReservationStatus::Confirmed.as_str())
        .bind(id)
        .fetch_optional(&mut *conn)
        .await?;

        self.require_transitioned(
            &mut conn,
            id,
            updated,
            now,
            "pickup selection requires an open reservation",
        )
        .await
    }

    /// Record the physical handoff. Requires derived status CONFIRMED.
    pub async fn record_pickup(&self, actor: Uuid, id: Uuid) -> ApiResult<Reservation> {
        let mut conn = self.db_pool.acquire().await?;
        let reservation = fetch(&mut conn, id).await?;
        require_party(&reservation, actor)?;
        self.record_pickup_on(&mut conn, id, Utc::now()).await
    }

    /// Record the physical return. Requires derived status PICKED_UP.
    pub async fn record_return(&self, actor: Uuid, id: Uuid) -> ApiResult<Reservation> {
        let mut conn = self.db_pool.acquire().await?;
        let reservation = fetch(&mut conn, id).await?;
        require_party(&reservation, actor)?;
        self.record_return_on(&mut conn, id, Utc::now()).await
    }

    /// Soft-delete a reservation with a tagged reason. Forbidden once the
    /// handoff happened: an active loan must be returned, not cancelled.
    pub async fn cancel(&self, actor: Uuid, id: Uuid) -> ApiResult<Reservation> {
        let now = Utc::now();
        let mut conn = self.db_pool.acquire().await?;
        let reservation = fetch(&mut conn, id).await?;

        require_party(&reservation, actor)?;

        // Lender declining is a rejection; the requester withdrawing is a
        // cancellation.
        let reason = if actor == reservation.lender_id {
            CancelReason::Rejected
        } else {
            CancelReason::Cancelled
        };

        let status = self.status_of(&reservation, now);
        if status.is_terminal() {
            return Err(ApiError::invalid_state(
                status,
                "reservation is already closed",
            ));
        }
        if status == ReservationStatus::PickedUp {
            return Err(ApiError::invalid_state(
                status,
                "an active loan cannot be cancelled; it must be returned",
            ));
        }

        let updated = cancel_on(&mut conn, id, reason, now).await?;
        self.require_transitioned(&mut conn, id, updated, now, "reservation is already closed")
            .await
    }

    // ===== Transition primitives shared with the token service and sweeps =====

    /// Handoff transition on an existing connection, so token redemption can
    /// run it inside its own transaction.
    pub(crate) async fn record_pickup_on(
        &self,
        conn: &mut PgConnection,
        id: Uuid,
        now: DateTime<Utc>,
    ) -> ApiResult<Reservation> {
        let updated = sqlx::query_as::<_, Reservation>(
            r#"
            UPDATE reservations
            SET distribution_date = $1, cached_status = $2
            WHERE id = $3
              AND deleted_at IS NULL
              AND return_date IS NULL
              AND distribution_date IS NULL
              AND confirmed_pickup IS NOT NULL
              AND confirmed_pickup >= $4
            RETURNING *
            "#,
        )
        .bind(now)
        .bind(ReservationStatus::PickedUp.as_str())
        .bind(id)
        .bind(now - self.lifecycle.confirmed_ttl())
        .fetch_optional(&mut *conn)
        .await?;

        self.require_transitioned(conn, id, updated, now, "pickup requires confirmed")
            .await
    }

    /// Return transition on an existing connection.
    pub(crate) async fn record_return_on(
        &self,
        conn: &mut PgConnection,
        id: Uuid,
        now: DateTime<Utc>,
    ) -> ApiResult<Reservation> {
        let updated = sqlx::query_as::<_, Reservation>(
            r#"
            UPDATE reservations
            SET return_date = $1, cached_status = $2
            WHERE id = $3
              AND deleted_at IS NULL
              AND return_date IS NULL
              AND distribution_date IS NOT NULL
            RETURNING *
            "#,
        )
        .bind(now)
        .bind(ReservationStatus::Returned.as_str())
        .bind(id)
        .fetch_optional(&mut *conn)
        .await?;

        self.require_transitioned(conn, id, updated, now, "return requires picked up")
            .await
    }

    /// Resolve a conditional update that affected no row into a precise
    /// `InvalidState` conflict carrying the observed status.
    async fn require_transitioned(
        &self,
        conn: &mut PgConnection,
        id: Uuid,
        updated: Option<Reservation>,
        now: DateTime<Utc>,
        message: &str,
    ) -> ApiResult<Reservation> {
        match updated {
            Some(reservation) => Ok(reservation),
            None => {
                let current = fetch(conn, id).await?;
                let observed = self.status_of(&current, now);
                Err(ApiError::invalid_state(observed, message))
            }
        }
    }

    async fn is_party(
        &self,
        conn: &mut PgConnection,
        reservation: &Reservation,
        actor: Uuid,
    ) -> ApiResult<bool> {
        if reservation.requester_id == actor || reservation.lender_id == actor {
            return Ok(true);
        }
        if let Some(group_id) = reservation.group_id {
            return catalog::is_group_member_on(conn, group_id, actor).await;
        }
        Ok(false)
    }
}

/// Load a reservation row or fail with `NotFound`.
async fn fetch(conn: &mut PgConnection, id: Uuid) -> ApiResult<Reservation> {
    let reservation =
        sqlx::query_as::<_, Reservation>("SELECT * FROM reservations WHERE id = $1")
            .bind(id)
            .fetch_optional(&mut *conn)
            .await?;

    reservation.ok_or_else(|| ApiError::NotFound(format!("Reservation {} does not exist", id)))
}

/// Soft-delete with a tagged reason, guarded so it never touches a returned
/// or handed-out reservation.
async fn cancel_on(
    conn: &mut PgConnection,
    id: Uuid,
    reason: CancelReason,
    now: DateTime<Utc>,
) -> ApiResult<Option<Reservation>> {
    let updated = sqlx::query_as::<_, Reservation>(
        r#"
        UPDATE reservations
        SET deleted_at = $1, cancel_reason = $2, cached_status = $3
        WHERE id = $4
          AND deleted_at IS NULL
          AND return_date IS NULL
          AND distribution_date IS NULL
        RETURNING *
        "#,
    )
    .bind(now)
    .bind(reason)
    .bind(reason.status().as_str())
    .bind(id)
    .fetch_optional(&mut *conn)
    .await?;

    Ok(updated)
}

fn require_party(reservation: &Reservation, actor: Uuid) -> ApiResult<()> {
    if reservation.requester_id != actor && reservation.lender_id != actor {
        return Err(ApiError::Unauthorized(
            "Caller is not a party to this reservation".to_string(),
        ));
    }
    Ok(())
}

fn is_serialization_failure(err: &sqlx::Error) -> bool {
    err.as_database_error()
        .and_then(|db| db.code())
        .map(|code| code == SERIALIZATION_FAILURE)
        .unwrap_or(false)
}

/// Clamp paging input into a `(limit, offset)` row window. Computed in
/// `i64`: any `u32` page number must produce a finite offset, never an
/// overflow.
fn page_window(page: Option<u32>, limit: Option<u32>) -> (i64, i64) {
    let page = i64::from(page.unwrap_or(1).max(1));
    let limit = i64::from(limit.unwrap_or(20).clamp(1, 100));
    (limit, (page - 1) * limit)
}

#[cfg(test)]
mod tests {
    use super::page_window;

    #[test]
    fn page_window_defaults_and_clamps() {
        assert_eq!(page_window(None, None), (20, 0));
        assert_eq!(page_window(Some(0), Some(500)), (100, 0));
        assert_eq!(page_window(Some(3), Some(10)), (10, 20));
    }

    #[test]
    fn page_window_survives_maximum_page_number() {
        let (limit, offset) = page_window(Some(u32::MAX), Some(100));
        assert_eq!(limit, 100);
        assert_eq!(offset, (i64::from(u32::MAX) - 1) * 100);
    }
}
