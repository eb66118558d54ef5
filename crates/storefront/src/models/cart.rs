//! Cart domain types.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Serialize;

use stitchery_core::{CartId, CartItemId, CartOwner, ProductId, Quantity, SessionId, UserId};

use super::catalog::ProductWithCategory;

/// A shopping cart owned by a user or a guest session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Cart {
    pub id: CartId,
    pub user_id: Option<UserId>,
    pub session_id: Option<SessionId>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Cart {
    /// Build a fresh cart for `owner`.
    #[must_use]
    pub fn new(owner: &CartOwner) -> Self {
        let now = Utc::now();
        Self {
            id: CartId::generate(),
            user_id: owner.user_id(),
            session_id: owner.session_id().cloned(),
            created_at: now,
            updated_at: now,
        }
    }

    /// Whether this cart belongs to `owner`.
    #[must_use]
    pub fn is_owned_by(&self, owner: &CartOwner) -> bool {
        match owner {
            CartOwner::User(id) => self.user_id == Some(*id),
            CartOwner::Session(id) => self.session_id.as_ref() == Some(id),
        }
    }
}

/// One product line in a cart. Unique per `(cart_id, product_id)`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct CartItem {
    pub id: CartItemId,
    pub cart_id: CartId,
    pub product_id: ProductId,
    pub quantity: Quantity,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// A cart line with its product and category attached.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CartLine {
    #[serde(flatten)]
    pub item: CartItem,
    pub product: ProductWithCategory,
}

/// A cart with every line populated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CartDetails {
    #[serde(flatten)]
    pub cart: Cart,
    pub items: Vec<CartLine>,
}

impl CartDetails {
    /// Sum of current price times quantity over all lines.
    #[must_use]
    pub fn subtotal(&self) -> Decimal {
        self.items
            .iter()
            .map(|line| line.product.product.price.line_total(line.item.quantity.get()))
            .sum()
    }

    /// Total number of units across all lines.
    #[must_use]
    pub fn unit_count(&self) -> u64 {
        self.items
            .iter()
            .map(|line| u64::from(line.item.quantity.get()))
            .sum()
    }

    /// Find the line for a product.
    #[must_use]
    pub fn line_for(&self, product_id: ProductId) -> Option<&CartLine> {
        self.items
            .iter()
            .find(|line| line.item.product_id == product_id)
    }
}
