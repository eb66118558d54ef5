//! Storage for the storefront.
//!
//! Services talk to storage only through the [`Store`] trait and the
//! [`UnitOfWork`] it hands out for multi-statement writes. Two
//! implementations exist:
//!
//! - [`PgStore`] - `PostgreSQL` via sqlx, used by the server binary
//! - [`MemoryStore`] - in-process maps, used by tests and local demos
//!
//! # Tables
//!
//! - `users` - accounts (argon2 password hashes, admin flag)
//! - `categories` - product categories, unique by name
//! - `products` - catalog with authoritative `stock`
//! - `carts` - exactly one of `user_id` / `session_id`
//! - `cart_items` - unique per `(cart_id, product_id)`
//! - `orders` / `order_items` - immutable purchase snapshots
//!
//! # Migrations
//!
//! Migrations are stored in `crates/storefront/migrations/` and run via:
//! ```bash
//! cargo run -p stitchery-cli -- migrate
//! ```

pub mod memory;
pub mod postgres;

use std::time::Duration;

use async_trait::async_trait;
use secrecy::ExposeSecret;
use sqlx::PgPool;
use sqlx::postgres::PgPoolOptions;
use thiserror::Error;

use stitchery_core::{
    CartId, CartItemId, CartOwner, CategoryId, Email, OrderId, OrderStatus, Price, ProductId,
    Quantity, UserId,
};

use crate::models::{
    Cart, CartDetails, CartItem, Category, CategoryPatch, NewCategory, NewOrder, NewProduct,
    NewUser, Order, OrderDetails, OrderItem, Product, ProductFilter, ProductPatch,
    ProductWithCategory, StatusTotal, User, UserChanges,
};

pub use memory::MemoryStore;
pub use postgres::PgStore;

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

    /// Constraint violation (unique name, insufficient stock on a
    /// conditional decrement, ...).
    #[error("constraint violation: {0}")]
    Conflict(String),
}

/// Map a unique-violation into `Conflict`, everything else into `Database`.
pub(crate) fn conflict_on_unique(err: sqlx::Error, what: &str) -> RepositoryError {
    if let sqlx::Error::Database(ref db_err) = err
        && db_err.is_unique_violation()
    {
        return RepositoryError::Conflict(format!("{what} already exists"));
    }
    RepositoryError::Database(err)
}

/// Storage collaborator.
///
/// Single-statement reads and writes go straight through the store. Anything
/// that must be all-or-nothing goes through [`Store::begin`].
#[async_trait]
pub trait Store: Send + Sync {
    /// Check that the backing storage is reachable.
    async fn ping(&self) -> Result<(), RepositoryError>;

    /// Start a unit of work. Dropping it without `commit` rolls back.
    async fn begin(&self) -> Result<Box<dyn UnitOfWork>, RepositoryError>;

    // Users

    async fn create_user(&self, user: NewUser) -> Result<User, RepositoryError>;
    async fn get_user(&self, id: UserId) -> Result<Option<User>, RepositoryError>;
    async fn get_user_by_email(&self, email: &Email) -> Result<Option<User>, RepositoryError>;
    /// The user and their password hash, for login.
    async fn get_password_hash(
        &self,
        email: &Email,
    ) -> Result<Option<(User, String)>, RepositoryError>;
    async fn list_users(&self) -> Result<Vec<User>, RepositoryError>;
    async fn update_user(&self, id: UserId, changes: UserChanges)
    -> Result<User, RepositoryError>;
    async fn delete_user(&self, id: UserId) -> Result<bool, RepositoryError>;

    // Categories

    async fn create_category(&self, category: NewCategory) -> Result<Category, RepositoryError>;
    async fn get_category(&self, id: CategoryId) -> Result<Option<Category>, RepositoryError>;
    /// All categories ordered by name.
    async fn list_categories(&self) -> Result<Vec<Category>, RepositoryError>;
    async fn count_category_products(&self, id: CategoryId) -> Result<i64, RepositoryError>;
    async fn update_category(
        &self,
        id: CategoryId,
        patch: CategoryPatch,
    ) -> Result<Category, RepositoryError>;
    async fn delete_category(&self, id: CategoryId) -> Result<bool, RepositoryError>;

    // Products

    async fn create_product(&self, product: NewProduct) -> Result<Product, RepositoryError>;
    async fn get_product(&self, id: ProductId) -> Result<Option<Product>, RepositoryError>;
    async fn get_product_with_category(
        &self,
        id: ProductId,
    ) -> Result<Option<ProductWithCategory>, RepositoryError>;
    /// One page of matching products, newest first, plus the total match count.
    async fn search_products(
        &self,
        filter: &ProductFilter,
        offset: i64,
        limit: i64,
    ) -> Result<(Vec<ProductWithCategory>, i64), RepositoryError>;
    async fn update_product(
        &self,
        id: ProductId,
        patch: ProductPatch,
    ) -> Result<Product, RepositoryError>;
    /// Whether any cart line or order line references the product.
    async fn product_is_referenced(&self, id: ProductId) -> Result<bool, RepositoryError>;
    async fn delete_product(&self, id: ProductId) -> Result<bool, RepositoryError>;
    /// Relative stock change. `Conflict` if the result would be negative,
    /// `NotFound` if the product is missing.
    async fn adjust_stock(&self, id: ProductId, delta: i32) -> Result<Product, RepositoryError>;

    // Carts

    async fn find_cart(&self, owner: &CartOwner) -> Result<Option<Cart>, RepositoryError>;
    /// Find the owner's cart, creating it if needed.
    async fn get_or_create_cart(&self, owner: &CartOwner) -> Result<Cart, RepositoryError>;
    /// The cart with lines, products and categories attached.
    async fn cart_details(&self, id: CartId) -> Result<Option<CartDetails>, RepositoryError>;
    async fn find_cart_item(
        &self,
        cart_id: CartId,
        product_id: ProductId,
    ) -> Result<Option<CartItem>, RepositoryError>;
    /// A cart line together with the cart that holds it.
    async fn get_cart_item(
        &self,
        id: CartItemId,
    ) -> Result<Option<(CartItem, Cart)>, RepositoryError>;
    async fn insert_cart_item(
        &self,
        cart_id: CartId,
        product_id: ProductId,
        quantity: Quantity,
    ) -> Result<CartItem, RepositoryError>;
    async fn set_cart_item_quantity(
        &self,
        id: CartItemId,
        quantity: Quantity,
    ) -> Result<(), RepositoryError>;
    async fn delete_cart_item(&self, id: CartItemId) -> Result<bool, RepositoryError>;
    async fn clear_cart(&self, id: CartId) -> Result<u64, RepositoryError>;

    // Orders

    async fn get_order(&self, id: OrderId) -> Result<Option<Order>, RepositoryError>;
    async fn order_details(&self, id: OrderId) -> Result<Option<OrderDetails>, RepositoryError>;
    /// Populated orders, newest first, optionally for one user.
    async fn list_order_details(
        &self,
        user_id: Option<UserId>,
    ) -> Result<Vec<OrderDetails>, RepositoryError>;
    /// Per-status order count and summed totals, optionally for one user.
    async fn order_status_totals(
        &self,
        user_id: Option<UserId>,
    ) -> Result<Vec<StatusTotal>, RepositoryError>;
}

/// An open transaction.
///
/// All writes become visible together on [`commit`](UnitOfWork::commit).
/// Stock is only ever changed relative to the stored value.
#[async_trait]
pub trait UnitOfWork: Send {
    // Carts

    async fn find_cart(&mut self, owner: &CartOwner) -> Result<Option<Cart>, RepositoryError>;
    async fn get_or_create_cart(&mut self, owner: &CartOwner) -> Result<Cart, RepositoryError>;
    /// Lines of a cart, locked until the unit of work ends.
    async fn cart_items(&mut self, cart_id: CartId) -> Result<Vec<CartItem>, RepositoryError>;
    /// Add `quantity` to the cart's line for `product_id`, inserting it if
    /// absent. `Conflict` if the summed quantity would overflow.
    async fn merge_cart_item(
        &mut self,
        cart_id: CartId,
        product_id: ProductId,
        quantity: Quantity,
    ) -> Result<(), RepositoryError>;
    async fn delete_cart_item(&mut self, id: CartItemId) -> Result<bool, RepositoryError>;
    /// Delete a cart and its lines.
    async fn delete_cart(&mut self, cart_id: CartId) -> Result<(), RepositoryError>;

    // Orders

    async fn create_order(&mut self, order: NewOrder) -> Result<Order, RepositoryError>;
    async fn add_order_item(
        &mut self,
        order_id: OrderId,
        product_id: ProductId,
        quantity: Quantity,
        price: Price,
    ) -> Result<OrderItem, RepositoryError>;
    /// Load an order and lock it against concurrent status changes.
    async fn lock_order(&mut self, id: OrderId) -> Result<Option<Order>, RepositoryError>;
    async fn order_items(&mut self, order_id: OrderId) -> Result<Vec<OrderItem>, RepositoryError>;
    async fn set_order_status(
        &mut self,
        id: OrderId,
        status: OrderStatus,
    ) -> Result<(), RepositoryError>;

    // Stock

    /// Load a product and lock it against concurrent stock changes.
    async fn lock_product(&mut self, id: ProductId) -> Result<Option<Product>, RepositoryError>;
    /// `stock = stock - quantity` only if `stock >= quantity`; otherwise
    /// `Conflict` and nothing changes.
    async fn decrement_stock(
        &mut self,
        product_id: ProductId,
        quantity: Quantity,
    ) -> Result<(), RepositoryError>;
    async fn increment_stock(
        &mut self,
        product_id: ProductId,
        quantity: Quantity,
    ) -> Result<(), RepositoryError>;

    async fn commit(self: Box<Self>) -> Result<(), RepositoryError>;
    async fn rollback(self: Box<Self>) -> Result<(), RepositoryError>;
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
