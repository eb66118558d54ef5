//! Core types for Stitchery.
//!
//! This module provides type-safe wrappers for common domain concepts.

pub mod email;
pub mod id;
pub mod owner;
pub mod price;
pub mod quantity;
pub mod status;

pub use email::{Email, EmailError};
pub use id::*;
pub use owner::{CartOwner, SessionId, SessionIdError};
pub use price::{Price, PriceError};
pub use quantity::{Quantity, QuantityError};
pub use status::*;
