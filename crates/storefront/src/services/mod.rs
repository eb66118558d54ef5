//! Business logic services for the storefront.
//!
//! # Services
//!
//! - `auth` - Registration, password login, access tokens
//! - `users` - User administration
//! - `catalog` - Categories and products
//! - `cart` - User and guest carts, guest cart merge
//! - `orders` - Checkout, status changes, order statistics
//!
//! Every service borrows a [`Store`](crate::db::Store) for the duration of
//! a request and holds no state of its own.

pub mod auth;
pub mod cart;
pub mod catalog;
mod error;
pub mod orders;
pub mod users;

pub use auth::{AuthError, AuthService};
pub use cart::CartService;
pub use catalog::{CategoryService, ProductService};
pub use error::CommerceError;
pub use orders::OrderService;
pub use users::UserService;
