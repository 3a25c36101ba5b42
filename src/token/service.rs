//! Exchange token service layer
//!
//! Issues and redeems the single-use codes that confirm a physical handoff
//! or return. Redemption is the load-bearing atomic unit of the whole
//! exchange mechanism: lookup, validation, the lifecycle transition and the
//! used-marker all commit together, and the token row is locked for the
//! duration so a token can be redeemed at most once even under concurrent
//! attempts.

use std::sync::Arc;

use chrono::Utc;
use sqlx::{Acquire, PgConnection, PgPool};
use uuid::Uuid;

use crate::catalog;
use crate::config::LifecycleConfig;
use crate::error::{ApiError, ApiResult};
use crate::reservation::{Reservation, ReservationService, ReservationStatus};

use super::code::generate_code;
use super::{ExchangeToken, GenerateTokenResponse, TokenKind};

// Postgres SQLSTATE for a unique constraint violation.
const UNIQUE_VIOLATION: &str = "23505";

/// Exchange token service
pub struct ExchangeTokenService {
    db_pool: PgPool,
    lifecycle: LifecycleConfig,
    reservations: Arc<ReservationService>,
}

impl ExchangeTokenService {
    /// Create a new exchange token service instance
    pub fn new(
        db_pool: PgPool,
        lifecycle: LifecycleConfig,
        reservations: Arc<ReservationService>,
    ) -> Self {
        Self {
            db_pool,
            lifecycle,
            reservations,
        }
    }

    /// Issue a fresh token for a reservation. The kind is derived from the
    /// current status: a confirmed reservation gets a pickup token, an
    /// active loan a return token.
    ///
    /// The reservation row is locked while prior tokens are superseded and
    /// the new one inserted, so concurrent generation calls for the same
    /// reservation converge on a single currently-valid token per kind.
    pub async fn generate(
        &self,
        actor: Uuid,
        reservation_id: Uuid,
    ) -> ApiResult<GenerateTokenResponse> {
        let now = Utc::now();
        let mut tx = self.db_pool.begin().await?;

        let reservation = fetch_reservation_for_update(&mut tx, reservation_id).await?;

        if reservation.lender_id != actor {
            return Err(ApiError::Unauthorized(
                "Only the lender may issue exchange tokens".to_string(),
            ));
        }

        let status = self.reservations.status_of(&reservation, now);
        let kind = match status {
            ReservationStatus::Confirmed => TokenKind::Pickup,
            ReservationStatus::PickedUp => TokenKind::Return,
            other => {
                return Err(ApiError::invalid_state(
                    other,
                    "tokens require a confirmed reservation or an active loan",
                ))
            }
        };

        // Supersede any still-valid token of the same kind before issuing a
        // new one; at most one valid token exists per (reservation, kind).
        sqlx::query(
            r#"
            UPDATE exchange_tokens
            SET deleted_at = $1
            WHERE reservation_id = $2
              AND kind = $3
              AND used_at IS NULL
              AND deleted_at IS NULL
            "#,
        )
        .bind(now)
        .bind(reservation_id)
        .bind(kind)
        .execute(&mut *tx)
        .await?;

        let expires_at = now + self.lifecycle.token_ttl();
        let mut token: Option<ExchangeToken> = None;

        // Each attempt runs in a savepoint so a unique collision does not
        // poison the outer transaction.
        for _ in 0..self.lifecycle.token_max_generation_attempts {
            let candidate = generate_code();
            let mut savepoint = tx.begin().await?;

            let inserted = sqlx::query_as::<_, ExchangeToken>(
                r#"
                INSERT INTO exchange_tokens (
                    id, reservation_id, token, kind, created_by_id,
                    expires_at, created_at
                )
                VALUES ($1, $2, $3, $4, $5, $6, $7)
                RETURNING *
                "#,
            )
            .bind(Uuid::new_v4())
            .bind(reservation_id)
            .bind(&candidate)
            .bind(kind)
            .bind(actor)
            .bind(expires_at)
            .bind(now)
            .fetch_one(&mut *savepoint)
            .await;

            match inserted {
                Ok(t) => {
                    savepoint.commit().await?;
                    token = Some(t);
                    break;
                }
                Err(e) if is_unique_violation(&e) => {
                    savepoint.rollback().await?;
                    tracing::debug!(code = %candidate, "Token code collision, retrying");
                }
                Err(e) => return Err(e.into()),
            }
        }

        let token = token.ok_or_else(|| {
            ApiError::ResourceExhausted(format!(
                "No free token code found after {} attempts",
                self.lifecycle.token_max_generation_attempts
            ))
        })?;

        tx.commit().await?;

        tracing::info!(
            reservation = %reservation_id,
            kind = kind.as_str(),
            expires_at = %token.expires_at,
            "Exchange token issued"
        );

        Ok(GenerateTokenResponse {
            token: token.token,
            kind: token.kind,
            expires_at: token.expires_at,
        })
    }

    /// Redeem a token, confirming the physical event it stands for.
    ///
    /// The caller must be the reservation's borrower or a member of its
    /// group (evaluated at redemption time). Every step commits atomically;
    /// a losing concurrent redeemer observes `TokenAlreadyUsed`.
    pub async fn redeem(&self, actor: Uuid, token_str: &str) -> ApiResult<Reservation> {
        let now = Utc::now();
        let mut tx = self.db_pool.begin().await?;

        let token = sqlx::query_as::<_, ExchangeToken>(
            "SELECT * FROM exchange_tokens WHERE token = $1 FOR UPDATE",
        )
        .bind(token_str.trim().to_uppercase())
        .fetch_optional(&mut *tx)
        .await?
        .ok_or_else(|| ApiError::NotFound("Unknown exchange token".to_string()))?;

        // A superseded token behaves as if it never existed; used and
        // expired are reported distinctly for caller feedback.
        if token.deleted_at.is_some() {
            return Err(ApiError::NotFound("Unknown exchange token".to_string()));
        }
        if token.used_at.is_some() {
            return Err(ApiError::TokenAlreadyUsed);
        }
        if now >= token.expires_at {
            return Err(ApiError::TokenExpired);
        }

        let reservation = fetch_reservation_for_update(&mut tx, token.reservation_id).await?;

        let authorized = reservation.requester_id == actor
            || match reservation.group_id {
                Some(group_id) => catalog::is_group_member_on(&mut tx, group_id, actor).await?,
                None => false,
            };
        if !authorized {
            return Err(ApiError::Unauthorized(
                "Only the borrower or a group member may redeem this token".to_string(),
            ));
        }

        // The reservation may have moved since the token was minted; the
        // transition below re-checks its own precondition atomically with
        // the write and reports the observed status on conflict.
        let updated = match token.kind {
            TokenKind::Pickup => {
                self.reservations
                    .record_pickup_on(&mut tx, token.reservation_id, now)
                    .await?
            }
            TokenKind::Return => {
                self.reservations
                    .record_return_on(&mut tx, token.reservation_id, now)
                    .await?
            }
        };

        let marked = sqlx::query(
            "UPDATE exchange_tokens SET used_at = $1 WHERE id = $2 AND used_at IS NULL",
        )
        .bind(now)
        .bind(token.id)
        .execute(&mut *tx)
        .await?;

        if marked.rows_affected() != 1 {
            return Err(ApiError::TokenAlreadyUsed);
        }

        tx.commit().await?;

        tracing::info!(
            reservation = %updated.id,
            kind = token.kind.as_str(),
            "Exchange token redeemed"
        );

        Ok(updated)
    }
}

async fn fetch_reservation_for_update(
    conn: &mut PgConnection,
    id: Uuid,
) -> ApiResult<Reservation> {
    let reservation =
        sqlx::query_as::<_, Reservation>("SELECT * FROM reservations WHERE id = $1 FOR UPDATE")
            .bind(id)
            .fetch_optional(&mut *conn)
            .await?;

    reservation.ok_or_else(|| ApiError::NotFound(format!("Reservation {} does not exist", id)))
}

fn is_unique_violation(err: &sqlx::Error) -> bool {
    err.as_database_error()
        .and_then(|db| db.code())
        .map(|code| code == UNIQUE_VIOLATION)
        .unwrap_or(false)
}
