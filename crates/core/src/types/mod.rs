//! Core types for Tee Studio.
//!
//! Type-safe wrappers for ids, money, statuses, and the value objects that
//! are validated once at the edge and trusted everywhere else.

pub mod email;
pub mod id;
pub mod money;
pub mod placement;
pub mod shipping;
pub mod status;

pub use email::{Email, EmailError};
pub use id::*;
pub use money::{Amount, Currency};
pub use placement::{Placement, PlacementError};
pub use shipping::{ShippingAddress, ShippingAddressError};
pub use status::*;
