//! Cart repository for database operations.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use sqlx::types::Json;

use tee_studio_core::{CartItemId, DesignId, Placement, UserId};

use super::{CartStore, RepositoryError, quantity_from_db, quantity_to_db};
use crate::models::{CartItem, NewCartItem};

/// Repository for cart database operations.
#[derive(Clone)]
pub struct CartRepository {
    pool: PgPool,
}

impl CartRepository {
    /// Create a new cart repository.
    #[must_use]
    pub const fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[derive(sqlx::FromRow)]
pub(super) struct CartItemRow {
    pub(super) id: i32,
    pub(super) user_id: i32,
    pub(super) design_id: i32,
    pub(super) quantity: i32,
    pub(super) size: String,
    pub(super) color: String,
    pub(super) design_config: Option<Json<Placement>>,
    pub(super) created_at: DateTime<Utc>,
}

impl TryFrom<CartItemRow> for CartItem {
    type Error = RepositoryError;

    fn try_from(row: CartItemRow) -> Result<Self, Self::Error> {
        Ok(Self {
            id: CartItemId::new(row.id),
            user_id: UserId::new(row.user_id),
            design_id: DesignId::new(row.design_id),
            quantity: quantity_from_db(row.quantity)?,
            size: row.size,
            color: row.color,
            design_config: row.design_config.map(|Json(placement)| placement),
            created_at: row.created_at,
        })
    }
}

pub(super) const CART_COLUMNS: &str =
    "id, user_id, design_id, quantity, size, color, design_config, created_at";

#[async_trait]
impl CartStore for CartRepository {
    async fn list(&self, user_id: UserId) -> Result<Vec<CartItem>, RepositoryError> {
        let sql = format!("SELECT {CART_COLUMNS} FROM cart_items WHERE user_id = $1 ORDER BY id");
        let rows = sqlx::query_as::<_, CartItemRow>(&sql)
            .bind(user_id)
            .fetch_all(&self.pool)
            .await?;

        rows.into_iter().map(CartItem::try_from).collect()
    }

    async fn insert(&self, item: NewCartItem) -> Result<CartItem, RepositoryError> {
        let sql = format!(
            "INSERT INTO cart_items (user_id, design_id, quantity, size, color, design_config)
             VALUES ($1, $2, $3, $4, $5, $6)
             RETURNING {CART_COLUMNS}"
        );
        let row = sqlx::query_as::<_, CartItemRow>(&sql)
            .bind(item.user_id)
            .bind(item.design_id)
            .bind(quantity_to_db(item.quantity)?)
            .bind(&item.size)
            .bind(&item.color)
            .bind(item.design_config.map(Json))
            .fetch_one(&self.pool)
            .await?;

        row.try_into()
    }

    async fn update_quantity(
        &self,
        user_id: UserId,
        id: CartItemId,
        quantity: u32,
    ) -> Result<Option<CartItem>, RepositoryError> {
        let sql = format!(
            "UPDATE cart_items SET quantity = $3
             WHERE id = $1 AND user_id = $2
             RETURNING {CART_COLUMNS}"
        );
        let row = sqlx::query_as::<_, CartItemRow>(&sql)
            .bind(id)
            .bind(user_id)
            .bind(quantity_to_db(quantity)?)
            .fetch_optional(&self.pool)
            .await?;

        row.map(CartItem::try_from).transpose()
    }

    async fn delete(&self, user_id: UserId, id: CartItemId) -> Result<bool, RepositoryError> {
        let result = sqlx::query("DELETE FROM cart_items WHERE id = $1 AND user_id = $2")
            .bind(id)
            .bind(user_id)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }
}
