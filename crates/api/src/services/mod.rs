//! Business logic services.
//!
//! # Services
//!
//! - `auth` - Signup, login, bearer tokens
//! - `designs` - Prompt translation, image generation, artifact storage
//! - `cart` - Cart lines and canonical pricing
//! - `checkout` - Payment intents and order placement
//! - `orders` - Order history and the status lifecycle
//! - `notifications` - Admin-forwarded order emails
//!
//! Services borrow their stores and clients for the duration of a request.
//! They are built from [`crate::state::AppState`] in handlers and from the
//! in-memory fakes in tests.

pub mod auth;
pub mod cart;
pub mod checkout;
pub mod designs;
pub mod notifications;
pub mod orders;
