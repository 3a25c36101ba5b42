//! Read-only catalog lookups
//!
//! The catalog itself (products, categories, locations) is managed
//! elsewhere; the lifecycle engine only needs to resolve an item to its
//! lender and to answer group membership questions.

use sqlx::{PgConnection, PgPool};
use uuid::Uuid;

use crate::error::{ApiError, ApiResult};

/// Catalog item as the lifecycle engine sees it
#[derive(Debug, Clone, sqlx::FromRow, serde::Serialize)]
pub struct Item {
    pub id: Uuid,
    pub name: String,
    pub owned_by: Uuid,
    pub is_active: bool,
}

/// Read-only catalog service
#[derive(Clone)]
pub struct CatalogService {
    db_pool: PgPool,
}

impl CatalogService {
    pub fn new(db_pool: PgPool) -> Self {
        Self { db_pool }
    }

    /// Look up an item, failing with `NotFound` when absent.
    pub async fn get_item(&self, item_id: Uuid) -> ApiResult<Item> {
        get_item_on(&mut *self.db_pool.acquire().await?, item_id).await
    }
}

/// Item lookup on an existing connection, so reservation creation can read
/// the item inside its serializable transaction.
pub(crate) async fn get_item_on(conn: &mut PgConnection, item_id: Uuid) -> ApiResult<Item> {
    let item: Option<Item> =
        sqlx::query_as("SELECT id, name, owned_by, is_active FROM items WHERE id = $1")
            .bind(item_id)
            .fetch_optional(&mut *conn)
            .await?;

    item.ok_or_else(|| ApiError::NotFound(format!("Item {} does not exist", item_id)))
}

/// Whether `user_id` currently belongs to `group_id`.
///
/// Membership is evaluated live, at the moment of the call; a member
/// removed after a token was issued can no longer redeem it.
pub(crate) async fn is_group_member_on(
    conn: &mut PgConnection,
    group_id: Uuid,
    user_id: Uuid,
) -> ApiResult<bool> {
    let row: Option<(Uuid,)> = sqlx::query_as(
        "SELECT user_id FROM borrow_group_members WHERE group_id = $1 AND user_id = $2",
    )
    .bind(group_id)
    .bind(user_id)
    .fetch_optional(&mut *conn)
    .await?;

    Ok(row.is_some())
}
