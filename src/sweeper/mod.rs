//! Periodic expiry sweeps over reservations
//!
//! Two hourly sweeps force terminal states onto stale reservations:
//! auto-cancel for requests the lender never answered, auto-expire for
//! confirmed pickups that never happened. A third, daily sweep classifies
//! active loans as due-soon or overdue and hands them to the notification
//! port, at most once per calendar day.
//!
//! Every sweep takes `now` as a parameter so boundary conditions are
//! testable without wall-clock sleeps; the background loops pass the real
//! clock. All writes are conditional updates that re-check their own
//! precondition, so redundant concurrent sweeper instances are safe: an
//! already-swept reservation is simply not matched again.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde_json::json;
use sqlx::PgPool;
use uuid::Uuid;

use crate::config::LifecycleConfig;
use crate::error::ApiResult;
use crate::notify::{NotificationKind, NotificationPort};
use crate::reservation::{CancelReason, Reservation, ReservationStatus};

/// Periodic sweeper over stale reservations
pub struct ExpirySweeper {
    db_pool: PgPool,
    lifecycle: LifecycleConfig,
    notifier: Arc<dyn NotificationPort>,
}

impl ExpirySweeper {
    /// Create a new sweeper instance
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

    /// Auto-cancel reservations that sat in PENDING past the pending TTL.
    pub async fn sweep_pending(&self, now: DateTime<Utc>) -> ApiResult<Vec<Uuid>> {
        let cancelled: Vec<(Uuid,)> = sqlx::query_as(
            r#"
            UPDATE reservations
            SET deleted_at = $1, cancel_reason = $2, cached_status = $3
            WHERE deleted_at IS NULL
              AND return_date IS NULL
              AND distribution_date IS NULL
              AND confirmed_pickup IS NULL
              AND created_at < $4
            RETURNING id
            "#,
        )
        .bind(now)
        .bind(CancelReason::Cancelled)
        .bind(ReservationStatus::Cancelled.as_str())
        .bind(now - self.lifecycle.pending_ttl())
        .fetch_all(&self.db_pool)
        .await?;

        let ids: Vec<Uuid> = cancelled.into_iter().map(|(id,)| id).collect();
        for id in &ids {
            tracing::info!(reservation = %id, "Auto-cancelled unanswered reservation");
        }
        Ok(ids)
    }

    /// Auto-expire confirmed reservations whose pickup never happened
    /// within the confirmed TTL.
    pub async fn sweep_confirmed(&self, now: DateTime<Utc>) -> ApiResult<Vec<Uuid>> {
        let expired: Vec<(Uuid,)> = sqlx::query_as(
            r#"
            UPDATE reservations
            SET deleted_at = $1, cancel_reason = $2, cached_status = $3
            WHERE deleted_at IS NULL
              AND return_date IS NULL
              AND distribution_date IS NULL
              AND confirmed_pickup IS NOT NULL
              AND confirmed_pickup < $4
            RETURNING id
            "#,
        )
        .bind(now)
        .bind(CancelReason::AutoExpired)
        .bind(ReservationStatus::Expired.as_str())
        .bind(now - self.lifecycle.confirmed_ttl())
        .fetch_all(&self.db_pool)
        .await?;

        let ids: Vec<Uuid> = expired.into_iter().map(|(id,)| id).collect();
        for id in &ids {
            tracing::info!(reservation = %id, "Auto-expired uncollected reservation");
        }
        Ok(ids)
    }

    /// Notify borrowers of loans due soon or overdue, at most once per
    /// calendar day per reservation.
    ///
    /// The `*_notified_on` date columns make the sweep idempotent per day
    /// boundary: claiming the day and reading the qualifying row is one
    /// conditional update, so concurrent sweeper instances never notify the
    /// same reservation twice.
    pub async fn sweep_due(&self, now: DateTime<Utc>) -> ApiResult<()> {
        let today = now.date_naive();

        let due_soon: Vec<Reservation> = sqlx::query_as(
            r#"
            UPDATE reservations
            SET due_soon_notified_on = $1
            WHERE deleted_at IS NULL
              AND return_date IS NULL
              AND distribution_date IS NOT NULL
              AND ends_at >= $2
              AND ends_at <= $3
              AND (due_soon_notified_on IS NULL OR due_soon_notified_on < $1)
            RETURNING *
            "#,
        )
        .bind(today)
        .bind(now)
        .bind(now + chrono::Duration::days(self.lifecycle.due_soon_days))
        .fetch_all(&self.db_pool)
        .await?;

        for reservation in due_soon {
            self.notify_loan(&reservation, NotificationKind::ReturnDueSoon)
                .await;
        }

        let overdue: Vec<Reservation> = sqlx::query_as(
            r#"
            UPDATE reservations
            SET overdue_notified_on = $1
            WHERE deleted_at IS NULL
              AND return_date IS NULL
              AND distribution_date IS NOT NULL
              AND ends_at < $2
              AND (overdue_notified_on IS NULL OR overdue_notified_on < $1)
            RETURNING *
            "#,
        )
        .bind(today)
        .bind(now)
        .fetch_all(&self.db_pool)
        .await?;

        for reservation in overdue {
            self.notify_loan(&reservation, NotificationKind::ReturnOverdue)
                .await;
        }

        Ok(())
    }

    /// Hand one loan to the notification port. Failures are logged and
    /// isolated per record; they never abort the rest of the sweep.
    async fn notify_loan(&self, reservation: &Reservation, kind: NotificationKind) {
        let subject = match kind {
            NotificationKind::ReturnDueSoon => "Your loan is due soon",
            NotificationKind::ReturnOverdue => "Your loan is overdue",
            _ => "Loan update",
        };

        let result = self
            .notifier
            .notify(
                reservation.requester_id,
                Some(reservation.lender_id),
                subject,
                kind,
                json!({
                    "reservation_id": reservation.id,
                    "item_id": reservation.item_id,
                    "ends_at": reservation.ends_at,
                }),
            )
            .await;

        if let Err(e) = result {
            tracing::warn!(
                reservation = %reservation.id,
                kind = kind.as_str(),
                error = %e,
                "Loan notification failed"
            );
        }
    }
}

/// Background job running the hourly auto-cancel and auto-expire sweeps.
pub async fn run_expiry_sweeps(sweeper: Arc<ExpirySweeper>, interval_secs: u64) {
    tracing::info!(interval_secs, "Starting expiry sweeper");

    loop {
        tokio::time::sleep(Duration::from_secs(interval_secs)).await;

        let now = Utc::now();
        match sweeper.sweep_pending(now).await {
            Ok(ids) if !ids.is_empty() => {
                tracing::info!(count = ids.len(), "Auto-cancel sweep finished");
            }
            Ok(_) => {}
            Err(e) => tracing::error!("Auto-cancel sweep failed: {}", e),
        }

        match sweeper.sweep_confirmed(now).await {
            Ok(ids) if !ids.is_empty() => {
                tracing::info!(count = ids.len(), "Auto-expire sweep finished");
            }
            Ok(_) => {}
            Err(e) => tracing::error!("Auto-expire sweep failed: {}", e),
        }
    }
}

/// Background job running the daily due-soon / overdue classification.
pub async fn run_due_sweeps(sweeper: Arc<ExpirySweeper>, interval_secs: u64) {
    tracing::info!(interval_secs, "Starting due-date sweeper");

    loop {
        tokio::time::sleep(Duration::from_secs(interval_secs)).await;

        if let Err(e) = sweeper.sweep_due(Utc::now()).await {
            tracing::error!("Due-date sweep failed: {}", e);
        }
    }
}
