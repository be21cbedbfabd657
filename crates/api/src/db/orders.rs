//! Order repository for database operations.
//!
//! Checkout runs entirely inside [`OrderStore::place_order`]: the user's cart
//! rows are locked with `SELECT ... FOR UPDATE`, compared with the snapshot
//! the caller priced, and only then turned into an order. Two concurrent
//! checkouts of the same cart serialize on those row locks; the loser sees
//! an empty or different cart and writes nothing.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::types::Json;
use sqlx::{PgPool, Postgres, Transaction};
use tracing::instrument;

use tee_studio_core::{
    Amount, Currency, DesignId, OrderId, OrderItemId, OrderStatus, ShippingAddress, UserId,
};

use super::cart::{CART_COLUMNS, CartItemRow};
use super::{OrderStore, RepositoryError, quantity_from_db, quantity_to_db};
use crate::models::{Order, OrderItem, OrderLine, PlaceOrder, PlaceOrderOutcome};

/// Repository for order database operations.
#[derive(Clone)]
pub struct OrderRepository {
    pool: PgPool,
}

impl OrderRepository {
    /// Create a new order repository.
    #[must_use]
    pub const fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

// =============================================================================
// Rows
// =============================================================================

#[derive(sqlx::FromRow)]
struct OrderRow {
    id: i32,
    user_id: i32,
    status: String,
    total_amount: i64,
    currency: String,
    payment_intent_id: String,
    shipping_address: Json<ShippingAddress>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

#[derive(sqlx::FromRow)]
struct OrderItemRow {
    id: i32,
    order_id: i32,
    design_id: i32,
    quantity: i32,
    size: String,
    color: String,
    unit_price: i64,
}

const ORDER_COLUMNS: &str = "id, user_id, status, total_amount, currency, payment_intent_id, \
                             shipping_address, created_at, updated_at";

const ORDER_ITEM_COLUMNS: &str = "id, order_id, design_id, quantity, size, color, unit_price";

impl TryFrom<OrderItemRow> for OrderItem {
    type Error = RepositoryError;

    fn try_from(row: OrderItemRow) -> Result<Self, Self::Error> {
        Ok(Self {
            id: OrderItemId::new(row.id),
            design_id: DesignId::new(row.design_id),
            quantity: quantity_from_db(row.quantity)?,
            size: row.size,
            color: row.color,
            unit_price: Amount::from_minor(row.unit_price),
        })
    }
}

fn order_from_row(row: OrderRow, items: Vec<OrderItem>) -> Result<Order, RepositoryError> {
    let status = row.status.parse::<OrderStatus>().map_err(|e| {
        RepositoryError::DataCorruption(format!("order {}: {e}", row.id))
    })?;
    let currency = row.currency.parse::<Currency>().map_err(|e| {
        RepositoryError::DataCorruption(format!("order {}: {e}", row.id))
    })?;

    Ok(Order {
        id: OrderId::new(row.id),
        user_id: UserId::new(row.user_id),
        status,
        total_amount: Amount::from_minor(row.total_amount),
        currency,
        payment_intent_id: row.payment_intent_id,
        shipping_address: row.shipping_address.0,
        items,
        created_at: row.created_at,
        updated_at: row.updated_at,
    })
}

/// Whether the locked cart rows are exactly the lines the caller priced.
fn cart_matches(locked: &[CartItemRow], lines: &[OrderLine]) -> bool {
    locked.len() == lines.len()
        && locked.iter().zip(lines).all(|(row, line)| {
            row.id == line.cart_item_id.as_i32()
                && row.design_id == line.design_id.as_i32()
                && quantity_from_db(row.quantity).is_ok_and(|q| q == line.quantity)
                && row.size == line.size
                && row.color == line.color
        })
}

// =============================================================================
// Queries
// =============================================================================

impl OrderRepository {
    /// Attach items to a batch of order rows, preserving row order.
    async fn with_items(&self, rows: Vec<OrderRow>) -> Result<Vec<Order>, RepositoryError> {
        if rows.is_empty() {
            return Ok(Vec::new());
        }

        let ids: Vec<i32> = rows.iter().map(|r| r.id).collect();
        let sql = format!(
            "SELECT {ORDER_ITEM_COLUMNS} FROM order_items WHERE order_id = ANY($1) ORDER BY id"
        );
        let item_rows = sqlx::query_as::<_, OrderItemRow>(&sql)
            .bind(&ids)
            .fetch_all(&self.pool)
            .await?;

        let mut by_order: HashMap<i32, Vec<OrderItem>> = HashMap::new();
        for row in item_rows {
            let order_id = row.order_id;
            by_order
                .entry(order_id)
                .or_default()
                .push(OrderItem::try_from(row)?);
        }

        rows.into_iter()
            .map(|row| {
                let items = by_order.remove(&row.id).unwrap_or_default();
                order_from_row(row, items)
            })
            .collect()
    }

    async fn with_items_one(&self, row: Option<OrderRow>) -> Result<Option<Order>, RepositoryError> {
        match row {
            Some(row) => Ok(self.with_items(vec![row]).await?.pop()),
            None => Ok(None),
        }
    }

    /// Insert the order row and its items. Returns `None` on a duplicate intent.
    async fn insert_order(
        tx: &mut Transaction<'_, Postgres>,
        order: &PlaceOrder,
    ) -> Result<Option<Order>, RepositoryError> {
        let sql = format!(
            "INSERT INTO orders
                (user_id, status, total_amount, currency, payment_intent_id, shipping_address)
             VALUES ($1, $2, $3, $4, $5, $6)
             RETURNING {ORDER_COLUMNS}"
        );
        let inserted = sqlx::query_as::<_, OrderRow>(&sql)
            .bind(order.user_id)
            .bind(OrderStatus::Processing.as_str())
            .bind(order.total.minor())
            .bind(order.currency.code())
            .bind(&order.payment_intent_id)
            .bind(Json(&order.shipping_address))
            .fetch_one(&mut **tx)
            .await;

        let row = match inserted {
            Ok(row) => row,
            Err(sqlx::Error::Database(ref db_err)) if db_err.is_unique_violation() => {
                return Ok(None);
            }
            Err(e) => return Err(e.into()),
        };

        let item_sql = format!(
            "INSERT INTO order_items (order_id, design_id, quantity, size, color, unit_price)
             VALUES ($1, $2, $3, $4, $5, $6)
             RETURNING {ORDER_ITEM_COLUMNS}"
        );
        let mut items = Vec::with_capacity(order.lines.len());
        for line in &order.lines {
            let item = sqlx::query_as::<_, OrderItemRow>(&item_sql)
                .bind(row.id)
                .bind(line.design_id)
                .bind(quantity_to_db(line.quantity)?)
                .bind(&line.size)
                .bind(&line.color)
                .bind(line.unit_price.minor())
                .fetch_one(&mut **tx)
                .await?;
            items.push(OrderItem::try_from(item)?);
        }

        order_from_row(row, items).map(Some)
    }
}

#[async_trait]
impl OrderStore for OrderRepository {
    #[instrument(skip(self, order), fields(user_id = %order.user_id, lines = order.lines.len()))]
    async fn place_order(&self, order: PlaceOrder) -> Result<PlaceOrderOutcome, RepositoryError> {
        let mut tx = self.pool.begin().await?;

        let lock_sql = format!(
            "SELECT {CART_COLUMNS} FROM cart_items WHERE user_id = $1 ORDER BY id FOR UPDATE"
        );
        let locked = sqlx::query_as::<_, CartItemRow>(&lock_sql)
            .bind(order.user_id)
            .fetch_all(&mut *tx)
            .await?;

        if !cart_matches(&locked, &order.lines) {
            tx.rollback().await?;
            return Ok(PlaceOrderOutcome::CartChanged);
        }

        let Some(created) = Self::insert_order(&mut tx, &order).await? else {
            tx.rollback().await?;
            return Ok(PlaceOrderOutcome::DuplicatePayment);
        };

        let consumed: Vec<i32> = order
            .lines
            .iter()
            .map(|line| line.cart_item_id.as_i32())
            .collect();
        let deleted = sqlx::query("DELETE FROM cart_items WHERE user_id = $1 AND id = ANY($2)")
            .bind(order.user_id)
            .bind(&consumed)
            .execute(&mut *tx)
            .await?;

        if usize::try_from(deleted.rows_affected()).ok() != Some(consumed.len()) {
            tx.rollback().await?;
            return Ok(PlaceOrderOutcome::CartChanged);
        }

        tx.commit().await?;
        Ok(PlaceOrderOutcome::Created(created))
    }

    async fn get(&self, id: OrderId) -> Result<Option<Order>, RepositoryError> {
        let sql = format!("SELECT {ORDER_COLUMNS} FROM orders WHERE id = $1");
        let row = sqlx::query_as::<_, OrderRow>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        self.with_items_one(row).await
    }

    async fn find_by_payment_intent(
        &self,
        payment_intent_id: &str,
    ) -> Result<Option<Order>, RepositoryError> {
        let sql = format!("SELECT {ORDER_COLUMNS} FROM orders WHERE payment_intent_id = $1");
        let row = sqlx::query_as::<_, OrderRow>(&sql)
            .bind(payment_intent_id)
            .fetch_optional(&self.pool)
            .await?;

        self.with_items_one(row).await
    }

    async fn list_for_user(&self, user_id: UserId) -> Result<Vec<Order>, RepositoryError> {
        let sql = format!(
            "SELECT {ORDER_COLUMNS} FROM orders
             WHERE user_id = $1
             ORDER BY created_at DESC, id DESC"
        );
        let rows = sqlx::query_as::<_, OrderRow>(&sql)
            .bind(user_id)
            .fetch_all(&self.pool)
            .await?;

        self.with_items(rows).await
    }

    #[instrument(skip(self), fields(order_id = %id, from = %from, to = %to))]
    async fn update_status(
        &self,
        id: OrderId,
        from: OrderStatus,
        to: OrderStatus,
    ) -> Result<Option<Order>, RepositoryError> {
        let sql = format!(
            "UPDATE orders SET status = $3, updated_at = NOW()
             WHERE id = $1 AND status = $2
             RETURNING {ORDER_COLUMNS}"
        );
        let row = sqlx::query_as::<_, OrderRow>(&sql)
            .bind(id)
            .bind(from.as_str())
            .bind(to.as_str())
            .fetch_optional(&self.pool)
            .await?;

        self.with_items_one(row).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tee_studio_core::CartItemId;

    fn row(id: i32, quantity: i32) -> CartItemRow {
        CartItemRow {
            id,
            user_id: 1,
            design_id: 7,
            quantity,
            size: "M".to_string(),
            color: "White".to_string(),
            design_config: None,
            created_at: Utc::now(),
        }
    }

    fn line(id: i32, quantity: u32) -> OrderLine {
        OrderLine {
            cart_item_id: CartItemId::new(id),
            design_id: DesignId::new(7),
            quantity,
            size: "M".to_string(),
            color: "White".to_string(),
            unit_price: Amount::from_minor(3000),
        }
    }

    #[test]
    fn test_cart_matches_identical_snapshot() {
        assert!(cart_matches(&[row(1, 2), row(2, 1)], &[line(1, 2), line(2, 1)]));
    }

    #[test]
    fn test_cart_mismatch_on_quantity_or_extra_row() {
        assert!(!cart_matches(&[row(1, 3)], &[line(1, 2)]));
        assert!(!cart_matches(&[row(1, 2), row(2, 1)], &[line(1, 2)]));
        assert!(!cart_matches(&[], &[line(1, 2)]));
    }
}
