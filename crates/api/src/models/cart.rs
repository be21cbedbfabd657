//! Cart domain types.

use chrono::{DateTime, Utc};
use serde::Serialize;

use tee_studio_core::{CartItemId, DesignId, Placement, UserId};

/// One line in a user's cart.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CartItem {
    pub id: CartItemId,
    pub user_id: UserId,
    pub design_id: DesignId,
    pub quantity: u32,
    pub size: String,
    pub color: String,
    /// Per-line placement override, if the user adjusted it.
    pub design_config: Option<Placement>,
    pub created_at: DateTime<Utc>,
}

/// A validated cart line ready to insert.
#[derive(Debug, Clone, PartialEq)]
pub struct NewCartItem {
    pub user_id: UserId,
    pub design_id: DesignId,
    pub quantity: u32,
    pub size: String,
    pub color: String,
    pub design_config: Option<Placement>,
}
