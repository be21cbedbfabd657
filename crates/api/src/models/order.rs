//! Order domain types.
//!
//! An order's items are a point-in-time copy of the cart taken inside the
//! checkout transaction. Nothing here ever refers back to a cart item once
//! the order exists.

use chrono::{DateTime, Utc};
use serde::Serialize;

use tee_studio_core::{
    Amount, CartItemId, Currency, DesignId, OrderId, OrderItemId, OrderStatus, ShippingAddress,
    UserId,
};

/// A placed order with its item snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Order {
    pub id: OrderId,
    pub user_id: UserId,
    pub status: OrderStatus,
    /// Always the sum of `unit_price × quantity` over `items`.
    pub total_amount: Amount,
    pub currency: Currency,
    pub payment_intent_id: String,
    pub shipping_address: ShippingAddress,
    pub items: Vec<OrderItem>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// An immutable snapshot of one cart line.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OrderItem {
    pub id: OrderItemId,
    pub design_id: DesignId,
    pub quantity: u32,
    pub size: String,
    pub color: String,
    pub unit_price: Amount,
}

impl OrderItem {
    /// `unit_price × quantity`, or `None` on overflow.
    #[must_use]
    pub const fn subtotal(&self) -> Option<Amount> {
        self.unit_price.checked_times(self.quantity)
    }
}

/// A priced cart line the checkout expects to find, unchanged, under lock.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrderLine {
    /// Cart row this line was read from.
    pub cart_item_id: CartItemId,
    pub design_id: DesignId,
    pub quantity: u32,
    pub size: String,
    pub color: String,
    pub unit_price: Amount,
}

/// Everything needed to materialize an order in one transaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlaceOrder {
    pub user_id: UserId,
    pub payment_intent_id: String,
    pub shipping_address: ShippingAddress,
    pub currency: Currency,
    /// Cart snapshot taken before the transaction began.
    pub lines: Vec<OrderLine>,
    pub total: Amount,
}

/// Result of attempting to materialize an order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlaceOrderOutcome {
    /// Order and items inserted and the consumed cart rows deleted.
    Created(Order),
    /// The locked cart no longer matches the snapshot; nothing was written.
    CartChanged,
    /// Another request already created an order for this payment intent.
    DuplicatePayment,
}
