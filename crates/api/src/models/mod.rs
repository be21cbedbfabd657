//! Domain models for the API.
//!
//! These are validated domain objects, separate from the database row types
//! in [`crate::db`]. All of them serialize straight into JSON responses.

pub mod cart;
pub mod design;
pub mod order;
pub mod user;

pub use cart::{CartItem, NewCartItem};
pub use design::{Design, NewDesign};
pub use order::{Order, OrderItem, OrderLine, PlaceOrder, PlaceOrderOutcome};
pub use user::{User, UserCredentials};
