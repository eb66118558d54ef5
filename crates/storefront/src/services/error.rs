//! Commerce error types.

use thiserror::Error;

use stitchery_core::{
    CartItemId, CategoryId, InvalidTransition, OrderId, OrderStatus, PriceError, ProductId,
    QuantityError,
};

use crate::db::RepositoryError;

/// Errors from the catalog, cart and order services.
#[derive(Debug, Error)]
pub enum CommerceError {
    /// Neither a user nor a guest session was supplied.
    #[error("a user id or session id is required")]
    InvalidIdentity,

    /// Product is missing or inactive at cart time.
    #[error("product {product_id} not found")]
    ProductNotFound { product_id: ProductId },

    /// Product is missing or inactive at order time.
    #[error("product {product_id} is no longer available")]
    ProductUnavailable { product_id: ProductId },

    #[error(
        "insufficient stock for product {product_id}: requested {requested}, available {available}"
    )]
    InsufficientStock {
        product_id: ProductId,
        requested: u64,
        available: i64,
    },

    #[error("cart item {item_id} not found")]
    CartItemNotFound { item_id: CartItemId },

    /// The cart item belongs to someone else's cart.
    #[error("cart item does not belong to this cart")]
    Unauthorized,

    #[error("cart is empty")]
    EmptyCart,

    #[error("order {order_id} not found")]
    OrderNotFound { order_id: OrderId },

    #[error("cannot move order from {from} to {to}")]
    InvalidStatusTransition { from: OrderStatus, to: OrderStatus },

    #[error("category {category_id} not found")]
    CategoryNotFound { category_id: CategoryId },

    #[error("category '{name}' already exists")]
    CategoryNameTaken { name: String },

    #[error("cannot delete category with {product_count} existing products")]
    CategoryInUse {
        category_id: CategoryId,
        product_count: i64,
    },

    /// Malformed input.
    #[error("{0}")]
    Validation(String),

    /// Repository/database error.
    #[error("database error: {0}")]
    Repository(#[from] RepositoryError),
}

impl From<InvalidTransition> for CommerceError {
    fn from(err: InvalidTransition) -> Self {
        Self::InvalidStatusTransition {
            from: err.from,
            to: err.to,
        }
    }
}

impl From<PriceError> for CommerceError {
    fn from(err: PriceError) -> Self {
        Self::Validation(format!("price: {err}"))
    }
}

impl From<QuantityError> for CommerceError {
    fn from(err: QuantityError) -> Self {
        Self::Validation(format!("quantity: {err}"))
    }
}
