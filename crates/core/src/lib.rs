//! Tee Studio Core - Shared domain types.
//!
//! This crate provides the types used across all Tee Studio components:
//! - `api` - JSON backend for the design studio and checkout
//! - `cli` - Command-line tools for migrations and admin users
//!
//! # Architecture
//!
//! The core crate contains only types and pure functions - no I/O, no
//! database access, no HTTP clients.
//!
//! # Modules
//!
//! - [`types`] - Newtype ids, money, emails, placements, addresses, statuses
//! - [`pricing`] - The single canonical price rule

#![cfg_attr(not(test), forbid(unsafe_code))]

pub mod pricing;
pub mod types;

pub use types::*;
