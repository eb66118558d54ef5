//! Order domain types.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Serialize;

use stitchery_core::{OrderId, OrderItemId, OrderStatus, Price, ProductId, Quantity, UserId};

use super::catalog::ProductWithCategory;
use super::user::UserSummary;

/// An order header. `total_amount` never changes after creation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Order {
    pub id: OrderId,
    pub user_id: UserId,
    pub status: OrderStatus,
    pub total_amount: Decimal,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// A purchased line. Price and quantity are frozen at order time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct OrderItem {
    pub id: OrderItemId,
    pub order_id: OrderId,
    pub product_id: ProductId,
    pub quantity: Quantity,
    pub price: Price,
    pub created_at: DateTime<Utc>,
}

impl OrderItem {
    /// Frozen price times quantity.
    #[must_use]
    pub fn line_total(&self) -> Decimal {
        self.price.line_total(self.quantity.get())
    }
}

/// An order line with its product and category attached.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OrderLine {
    #[serde(flatten)]
    pub item: OrderItem,
    pub product: ProductWithCategory,
}

/// An order with its buyer and lines populated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OrderDetails {
    #[serde(flatten)]
    pub order: Order,
    pub user: UserSummary,
    pub items: Vec<OrderLine>,
}

/// Insert payload for an order header.
#[derive(Debug, Clone)]
pub struct NewOrder {
    pub user_id: UserId,
    pub total_amount: Decimal,
}

/// Aggregate row: order count and summed totals for one status.
#[derive(Debug, Clone, PartialEq, Eq, sqlx::FromRow)]
pub struct StatusTotal {
    pub status: OrderStatus,
    pub count: i64,
    pub revenue: Decimal,
}

/// Per-status entry of [`OrderStats::status_breakdown`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct StatusTally {
    pub count: i64,
    pub revenue: Decimal,
}

/// Order counts and revenue.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderStats {
    /// Number of orders in any status.
    pub total_orders: i64,
    /// Sum of totals over revenue-bearing statuses only.
    pub total_revenue: Decimal,
    pub status_breakdown: BTreeMap<OrderStatus, StatusTally>,
}

impl OrderStats {
    /// Fold per-status aggregates into stats.
    #[must_use]
    pub fn from_totals(totals: impl IntoIterator<Item = StatusTotal>) -> Self {
        let mut stats = Self {
            total_orders: 0,
            total_revenue: Decimal::ZERO,
            status_breakdown: BTreeMap::new(),
        };

        for total in totals {
            stats.total_orders += total.count;
            if total.status.counts_as_revenue() {
                stats.total_revenue += total.revenue;
            }
            let tally = stats.status_breakdown.entry(total.status).or_insert(StatusTally {
                count: 0,
                revenue: Decimal::ZERO,
            });
            tally.count += total.count;
            tally.revenue += total.revenue;
        }

        stats
    }
}
