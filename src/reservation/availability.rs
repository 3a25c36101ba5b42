//! Availability checking for items
//!
//! A reservation window conflicts with an existing one when both touch the
//! same item, the existing reservation is still active (not soft-deleted,
//! not returned) and the windows intersect inclusively.

use chrono::{DateTime, Utc};
use sqlx::PgConnection;
use uuid::Uuid;

use crate::error::ApiResult;

/// Check whether an active reservation on `item_id` overlaps `[starts_at,
/// ends_at]`.
///
/// Inclusive interval overlap: `starts_at <= existing.ends_at AND
/// existing.starts_at <= ends_at`. Runs on the caller's connection so the
/// creation path can execute check and insert inside one SERIALIZABLE
/// transaction.
pub async fn has_overlap(
    conn: &mut PgConnection,
    item_id: Uuid,
    starts_at: DateTime<Utc>,
    ends_at: DateTime<Utc>,
) -> ApiResult<bool> {
    let conflict: Option<(Uuid,)> = sqlx::query_as(
        r#"
        SELECT id
        FROM reservations
        WHERE item_id = $1
          AND deleted_at IS NULL
          AND return_date IS NULL
          AND starts_at <= $3
          AND $2 <= ends_at
        LIMIT 1
        "#,
    )
    .bind(item_id)
    .bind(starts_at)
    .bind(ends_at)
    .fetch_optional(&mut *conn)
    .await?;

    Ok(conflict.is_some())
}
