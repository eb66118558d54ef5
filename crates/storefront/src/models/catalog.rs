//! Catalog domain types: categories and products.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Serialize;

use stitchery_core::{CategoryId, Price, ProductId};

/// A product category.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Category {
    pub id: CategoryId,
    pub name: String,
    pub description: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// A category with the number of products it owns.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CategoryWithCount {
    #[serde(flatten)]
    pub category: Category,
    pub product_count: i64,
}

/// Insert payload for a category.
#[derive(Debug, Clone)]
pub struct NewCategory {
    pub name: String,
    pub description: Option<String>,
}

/// Partial update for a category.
#[derive(Debug, Clone, Default)]
pub struct CategoryPatch {
    pub name: Option<String>,
    pub description: Option<String>,
}

/// A sellable product.
///
/// `stock` is the authoritative count of units on hand. It is only ever
/// changed relative to its stored value (increment or conditional
/// decrement), never overwritten from application memory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Product {
    pub id: ProductId,
    pub name: String,
    pub description: Option<String>,
    pub price: Price,
    pub image_url: Option<String>,
    pub stock: i32,
    pub is_active: bool,
    pub category_id: CategoryId,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Product {
    /// Whether the product can be put in a cart or ordered.
    #[must_use]
    pub const fn is_purchasable(&self) -> bool {
        self.is_active
    }
}

/// A product with its category attached.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProductWithCategory {
    #[serde(flatten)]
    pub product: Product,
    pub category: Category,
}

/// Insert payload for a product.
#[derive(Debug, Clone)]
pub struct NewProduct {
    pub name: String,
    pub description: Option<String>,
    pub price: Price,
    pub image_url: Option<String>,
    pub stock: i32,
    pub is_active: bool,
    pub category_id: CategoryId,
}

/// Partial update for a product. Stock is changed through
/// `adjust_stock`, never through a patch.
#[derive(Debug, Clone, Default)]
pub struct ProductPatch {
    pub name: Option<String>,
    pub description: Option<String>,
    pub price: Option<Price>,
    pub image_url: Option<String>,
    pub is_active: Option<bool>,
    pub category_id: Option<CategoryId>,
}

/// Validated product search filter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProductFilter {
    pub category_id: Option<CategoryId>,
    /// Case-insensitive substring of name or description.
    pub search: Option<String>,
    pub min_price: Option<Decimal>,
    pub max_price: Option<Decimal>,
    pub is_active: bool,
}

impl Default for ProductFilter {
    fn default() -> Self {
        Self {
            category_id: None,
            search: None,
            min_price: None,
            max_price: None,
            is_active: true,
        }
    }
}

impl ProductFilter {
    /// Whether a product passes every filter criterion.
    #[must_use]
    pub fn matches(&self, product: &Product) -> bool {
        if product.is_active != self.is_active {
            return false;
        }
        if self.category_id.is_some_and(|id| id != product.category_id) {
            return false;
        }
        if self.min_price.is_some_and(|min| product.price.amount() < min) {
            return false;
        }
        if self.max_price.is_some_and(|max| product.price.amount() > max) {
            return false;
        }
        if let Some(needle) = &self.search {
            let needle = needle.to_lowercase();
            let in_name = product.name.to_lowercase().contains(&needle);
            let in_description = product
                .description
                .as_deref()
                .is_some_and(|d| d.to_lowercase().contains(&needle));
            if !in_name && !in_description {
                return false;
            }
        }
        true
    }
}

/// One page of product search results.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProductPage {
    pub products: Vec<ProductWithCategory>,
    pub total: i64,
    pub page: u32,
    pub limit: u32,
    pub total_pages: i64,
}

/// Outcome of removing a product.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "camelCase")]
pub enum Removal {
    /// Referenced by a cart or order line; marked inactive instead.
    Deactivated { product: Product },
    /// Unreferenced; the row is gone.
    Deleted { id: ProductId },
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn product(name: &str, description: Option<&str>, price: i64, active: bool) -> Product {
        Product {
            id: ProductId::generate(),
            name: name.to_owned(),
            description: description.map(str::to_owned),
            price: Price::new(Decimal::new(price, 2)).unwrap(),
            image_url: None,
            stock: 10,
            is_active: active,
            category_id: CategoryId::generate(),
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn test_filter_defaults_to_active_only() {
        let filter = ProductFilter::default();
        assert!(filter.matches(&product("Hoop", None, 899, true)));
        assert!(!filter.matches(&product("Hoop", None, 899, false)));
    }

    #[test]
    fn test_filter_search_is_case_insensitive_over_description() {
        let filter = ProductFilter {
            search: Some("FLOSS".to_owned()),
            ..ProductFilter::default()
        };
        assert!(filter.matches(&product(
            "Thread set",
            Some("Cotton floss, 24 colours"),
            2999,
            true
        )));
        assert!(!filter.matches(&product("Bamboo hoop", None, 899, true)));
    }

    #[test]
    fn test_filter_price_bounds_are_inclusive() {
        let filter = ProductFilter {
            min_price: Some(Decimal::new(1000, 2)),
            max_price: Some(Decimal::new(2000, 2)),
            ..ProductFilter::default()
        };
        assert!(filter.matches(&product("a", None, 1000, true)));
        assert!(filter.matches(&product("b", None, 2000, true)));
        assert!(!filter.matches(&product("c", None, 999, true)));
        assert!(!filter.matches(&product("d", None, 2001, true)));
    }
}
