//! Database operations for the API `PostgreSQL`.
//!
//! ## Tables
//!
//! - `users` - Site accounts and password hashes
//! - `designs` - Generated artwork and placement
//! - `cart_items` - Lines waiting for checkout
//! - `orders` - Placed orders (one per payment intent)
//! - `order_items` - Immutable cart snapshots per order
//!
//! # Migrations
//!
//! Migrations are stored in `crates/api/migrations/` and run via:
//! ```bash
//! cargo run -p tee-studio-cli -- migrate
//! ```
//!
//! Each table is reached through a store trait so services can run against
//! the in-memory store in tests. The `PostgreSQL` repositories below are the
//! production implementations.

pub mod cart;
pub mod designs;
pub mod orders;
pub mod users;

use std::time::Duration;

use async_trait::async_trait;
use secrecy::ExposeSecret;
use sqlx::PgPool;
use sqlx::postgres::PgPoolOptions;
use thiserror::Error;

use tee_studio_core::{CartItemId, DesignId, Email, OrderId, OrderStatus, UserId};

use crate::models::{
    CartItem, Design, NewCartItem, NewDesign, Order, PlaceOrder, PlaceOrderOutcome, User,
    UserCredentials,
};

pub use cart::CartRepository;
pub use designs::DesignRepository;
pub use orders::OrderRepository;
pub use users::UserRepository;

/// Errors that can occur during repository operations.
#[derive(Debug, Error)]
pub enum RepositoryError {
    /// Database error from sqlx.
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Data in the database is corrupted or invalid.
    #[error("data corruption: {0}")]
    DataCorruption(String),

    /// Requested entity was not found.
    #[error("not found")]
    NotFound,

    /// Constraint violation (e.g., unique email).
    #[error("constraint violation: {0}")]
    Conflict(String),
}

/// Map a unique-constraint violation onto `Conflict`, anything else onto `Database`.
pub(crate) fn conflict_on_unique(e: sqlx::Error, message: &str) -> RepositoryError {
    if let sqlx::Error::Database(ref db_err) = e
        && db_err.is_unique_violation()
    {
        return RepositoryError::Conflict(message.to_owned());
    }
    RepositoryError::Database(e)
}

/// Convert a stored `INTEGER` quantity into the domain's `u32`.
pub(crate) fn quantity_from_db(value: i32) -> Result<u32, RepositoryError> {
    u32::try_from(value)
        .map_err(|_| RepositoryError::DataCorruption(format!("negative quantity: {value}")))
}

/// Convert a domain quantity into an `INTEGER` bind value.
pub(crate) fn quantity_to_db(value: u32) -> Result<i32, RepositoryError> {
    i32::try_from(value)
        .map_err(|_| RepositoryError::DataCorruption(format!("quantity out of range: {value}")))
}

/// Create a `PostgreSQL` connection pool with sensible defaults.
///
/// # Arguments
///
/// * `database_url` - `PostgreSQL` connection string (wrapped in `SecretString`)
///
/// # Errors
///
/// Returns `sqlx::Error` if the connection cannot be established.
pub async fn create_pool(database_url: &secrecy::SecretString) -> Result<PgPool, sqlx::Error> {
    PgPoolOptions::new()
        .max_connections(10)
        .min_connections(2)
        .acquire_timeout(Duration::from_secs(10))
        .connect(database_url.expose_secret())
        .await
}

// =============================================================================
// Store traits
// =============================================================================

/// Site accounts.
#[async_trait]
pub trait UserStore: Send + Sync {
    /// Create a user with an already-hashed password.
    ///
    /// Returns `RepositoryError::Conflict` if the email is taken.
    async fn create(&self, email: &Email, password_hash: &str) -> Result<User, RepositoryError>;

    async fn get_by_id(&self, id: UserId) -> Result<Option<User>, RepositoryError>;

    /// Look up a user and their password hash for login.
    async fn get_credentials(
        &self,
        email: &Email,
    ) -> Result<Option<UserCredentials>, RepositoryError>;

    /// Grant or revoke admin rights.
    ///
    /// Returns `RepositoryError::NotFound` if no such user exists.
    async fn set_admin(&self, email: &Email, is_admin: bool) -> Result<User, RepositoryError>;

    /// Cheap round trip used by the readiness probe.
    async fn ping(&self) -> Result<(), RepositoryError>;
}

/// Generated designs.
#[async_trait]
pub trait DesignStore: Send + Sync {
    async fn insert(&self, design: NewDesign) -> Result<Design, RepositoryError>;

    async fn get(&self, id: DesignId) -> Result<Option<Design>, RepositoryError>;

    /// A user's designs, newest first.
    async fn list_for_user(&self, user_id: UserId) -> Result<Vec<Design>, RepositoryError>;
}

/// Cart lines.
#[async_trait]
pub trait CartStore: Send + Sync {
    /// A user's cart in insertion order.
    async fn list(&self, user_id: UserId) -> Result<Vec<CartItem>, RepositoryError>;

    async fn insert(&self, item: NewCartItem) -> Result<CartItem, RepositoryError>;

    /// Change a line's quantity. `None` if the line is absent or not the user's.
    async fn update_quantity(
        &self,
        user_id: UserId,
        id: CartItemId,
        quantity: u32,
    ) -> Result<Option<CartItem>, RepositoryError>;

    /// Remove a line. `false` if the line is absent or not the user's.
    async fn delete(&self, user_id: UserId, id: CartItemId) -> Result<bool, RepositoryError>;
}

/// Orders and their item snapshots.
#[async_trait]
pub trait OrderStore: Send + Sync {
    /// Atomically insert an order with its items and delete the consumed cart rows.
    ///
    /// The user's cart rows are locked and compared against `order.lines`
    /// before anything is written; any difference yields
    /// [`PlaceOrderOutcome::CartChanged`] and a rollback.
    async fn place_order(&self, order: PlaceOrder) -> Result<PlaceOrderOutcome, RepositoryError>;

    async fn get(&self, id: OrderId) -> Result<Option<Order>, RepositoryError>;

    async fn find_by_payment_intent(
        &self,
        payment_intent_id: &str,
    ) -> Result<Option<Order>, RepositoryError>;

    /// A user's orders, newest first.
    async fn list_for_user(&self, user_id: UserId) -> Result<Vec<Order>, RepositoryError>;

    /// Move an order from `from` to `to`.
    ///
    /// Returns `None` if the order is absent or its status is no longer `from`.
    async fn update_status(
        &self,
        id: OrderId,
        from: OrderStatus,
        to: OrderStatus,
    ) -> Result<Option<Order>, RepositoryError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_quantity_conversions() {
        assert_eq!(quantity_from_db(3).ok(), Some(3));
        assert!(matches!(
            quantity_from_db(-1),
            Err(RepositoryError::DataCorruption(_))
        ));
        assert_eq!(quantity_to_db(99).ok(), Some(99));
        assert!(quantity_to_db(u32::MAX).is_err());
    }
}
