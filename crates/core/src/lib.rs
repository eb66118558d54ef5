//! Stitchery Core - Shared domain types.
//!
//! This crate provides the types used across all Stitchery components:
//! - `storefront` - JSON REST backend (catalog, cart, orders, auth)
//! - `cli` - Command-line tools for migrations, seeding and admin users
//!
//! # Architecture
//!
//! The core crate contains only types and pure rules - no I/O, no database
//! access, no HTTP. This keeps it lightweight and allows it to be used anywhere.
//!
//! # Modules
//!
//! - [`types`] - Typed IDs, prices, quantities, emails, cart ownership and
//!   the order status state machine

#![cfg_attr(not(test), forbid(unsafe_code))]

pub mod types;

pub use types::*;
