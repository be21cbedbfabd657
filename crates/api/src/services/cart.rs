//! Cart service.
//!
//! Prices are never stored on cart rows. Every read prices the cart with
//! [`tee_studio_core::pricing`], and [`price_cart`] is the one place that
//! turns cart rows into priced order lines for checkout.

use serde::Serialize;
use thiserror::Error;
use tracing::instrument;

use tee_studio_core::pricing::{self, CATALOG_CURRENCY, MAX_LINE_QUANTITY, PricedLine};
use tee_studio_core::{Amount, CartItemId, Currency, DesignId, Placement, UserId};

use crate::db::{CartStore, DesignStore, RepositoryError};
use crate::models::{CartItem, NewCartItem, OrderLine};

/// Longest accepted size or color label.
const MAX_OPTION_LENGTH: usize = 32;

/// Errors that can occur during cart operations.
#[derive(Debug, Error)]
pub enum CartError {
    /// Request failed validation.
    #[error("{0}")]
    Validation(String),

    /// The design does not exist or belongs to someone else.
    #[error("design not found")]
    DesignNotFound,

    /// The cart line does not exist or belongs to someone else.
    #[error("cart item not found")]
    ItemNotFound,

    /// Line total exceeds the representable amount.
    #[error("cart total overflow")]
    Overflow,

    #[error("database error: {0}")]
    Repository(#[from] RepositoryError),
}

/// A request to add a garment to the cart.
#[derive(Debug, Clone, PartialEq)]
pub struct AddToCart {
    pub design_id: DesignId,
    pub quantity: u32,
    pub size: String,
    pub color: String,
    pub design_config: Option<Placement>,
}

/// A cart line with its canonical price.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CartLineView {
    #[serde(flatten)]
    pub item: CartItem,
    pub unit_price: Amount,
    pub subtotal: Amount,
}

/// The whole cart, priced.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CartView {
    pub items: Vec<CartLineView>,
    pub total: Amount,
    pub currency: Currency,
}

/// Price every cart line with the canonical rule.
///
/// Returns the order lines in cart order and their total, or `None` if the
/// total overflows.
#[must_use]
pub fn price_cart(items: &[CartItem]) -> Option<(Vec<OrderLine>, Amount)> {
    let priced: Vec<PricedLine> = items
        .iter()
        .map(|item| PricedLine::new(&item.size, &item.color, item.quantity))
        .collect();
    let total = pricing::total(&priced)?;

    let lines = items
        .iter()
        .zip(&priced)
        .map(|(item, priced)| OrderLine {
            cart_item_id: item.id,
            design_id: item.design_id,
            quantity: item.quantity,
            size: item.size.clone(),
            color: item.color.clone(),
            unit_price: priced.unit_price,
        })
        .collect();

    Some((lines, total))
}

/// Cart service.
pub struct CartService<'a> {
    carts: &'a dyn CartStore,
    designs: &'a dyn DesignStore,
}

impl<'a> CartService<'a> {
    /// Create a new cart service.
    #[must_use]
    pub const fn new(carts: &'a dyn CartStore, designs: &'a dyn DesignStore) -> Self {
        Self { carts, designs }
    }

    /// The user's cart with canonical prices.
    ///
    /// # Errors
    ///
    /// Returns `CartError::Repository` if the cart cannot be read.
    pub async fn view(&self, user_id: UserId) -> Result<CartView, CartError> {
        let items = self.carts.list(user_id).await?;
        let (_, total) = price_cart(&items).ok_or(CartError::Overflow)?;

        let items = items
            .into_iter()
            .map(|item| {
                let priced = PricedLine::new(&item.size, &item.color, item.quantity);
                let subtotal = priced.subtotal().ok_or(CartError::Overflow)?;
                Ok(CartLineView {
                    item,
                    unit_price: priced.unit_price,
                    subtotal,
                })
            })
            .collect::<Result<Vec<_>, CartError>>()?;

        Ok(CartView {
            items,
            total,
            currency: CATALOG_CURRENCY,
        })
    }

    /// Add a line for one of the user's own designs.
    ///
    /// # Errors
    ///
    /// Returns `CartError::Validation` for bad quantity, size, color, or placement.
    /// Returns `CartError::DesignNotFound` if the design is missing or not the user's.
    #[instrument(skip(self, request), fields(design_id = %request.design_id))]
    pub async fn add(&self, user_id: UserId, request: AddToCart) -> Result<CartItem, CartError> {
        validate_quantity(request.quantity)?;
        let size = validate_option("size", &request.size)?;
        let color = validate_option("color", &request.color)?;
        let design_config = request
            .design_config
            .map(Placement::validated)
            .transpose()
            .map_err(|e| CartError::Validation(e.to_string()))?;

        let design = self
            .designs
            .get(request.design_id)
            .await?
            .ok_or(CartError::DesignNotFound)?;
        if design.user_id != user_id {
            return Err(CartError::DesignNotFound);
        }

        let item = self
            .carts
            .insert(NewCartItem {
                user_id,
                design_id: design.id,
                quantity: request.quantity,
                size,
                color,
                design_config,
            })
            .await?;

        tracing::info!(cart_item_id = %item.id, "Added to cart");
        Ok(item)
    }

    /// Change the quantity of one of the user's lines.
    ///
    /// # Errors
    ///
    /// Returns `CartError::Validation` for an out-of-range quantity.
    /// Returns `CartError::ItemNotFound` if the line is missing or not the user's.
    pub async fn update_quantity(
        &self,
        user_id: UserId,
        id: CartItemId,
        quantity: u32,
    ) -> Result<CartItem, CartError> {
        validate_quantity(quantity)?;
        self.carts
            .update_quantity(user_id, id, quantity)
            .await?
            .ok_or(CartError::ItemNotFound)
    }

    /// Remove one of the user's lines.
    ///
    /// # Errors
    ///
    /// Returns `CartError::ItemNotFound` if the line is missing or not the user's.
    pub async fn remove(&self, user_id: UserId, id: CartItemId) -> Result<(), CartError> {
        if self.carts.delete(user_id, id).await? {
            Ok(())
        } else {
            Err(CartError::ItemNotFound)
        }
    }
}

fn validate_quantity(quantity: u32) -> Result<(), CartError> {
    if (1..=MAX_LINE_QUANTITY).contains(&quantity) {
        Ok(())
    } else {
        Err(CartError::Validation(format!(
            "quantity must be between 1 and {MAX_LINE_QUANTITY}"
        )))
    }
}

fn validate_option(field: &str, value: &str) -> Result<String, CartError> {
    let value = value.trim();
    if value.is_empty() {
        return Err(CartError::Validation(format!("{field} is required")));
    }
    if value.chars().count() > MAX_OPTION_LENGTH {
        return Err(CartError::Validation(format!("{field} is too long")));
    }
    Ok(value.to_owned())
}
