//! Product service.

use rust_decimal::Decimal;
use serde::Deserialize;
use tracing::instrument;

use stitchery_core::{CategoryId, Price, ProductId, Quantity};

use super::{image_url, optional_text, text};
use crate::db::{RepositoryError, Store};
use crate::models::{
    NewProduct, ProductFilter, ProductPage, ProductPatch, ProductWithCategory, Removal,
};
use crate::services::CommerceError;

const NAME_MIN: usize = 2;
const NAME_MAX: usize = 100;
const DESCRIPTION_MAX: usize = 500;

/// Default page size for product listings.
pub const DEFAULT_LIMIT: u32 = 12;
/// Largest page size a client may request.
pub const MAX_LIMIT: u32 = 100;

/// Body of a create-product request.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProductInput {
    pub name: String,
    pub description: Option<String>,
    pub price: Decimal,
    pub image_url: Option<String>,
    pub stock: i32,
    pub is_active: Option<bool>,
    pub category_id: CategoryId,
}

/// Body of an update-product request. Stock has its own endpoint.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProductUpdate {
    pub name: Option<String>,
    pub description: Option<String>,
    pub price: Option<Decimal>,
    pub image_url: Option<String>,
    pub is_active: Option<bool>,
    pub category_id: Option<CategoryId>,
}

/// Query string of a product listing.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProductQuery {
    pub category_id: Option<CategoryId>,
    pub search: Option<String>,
    pub min_price: Option<Decimal>,
    pub max_price: Option<Decimal>,
    pub is_active: Option<bool>,
    pub page: Option<u32>,
    pub limit: Option<u32>,
}

impl ProductQuery {
    /// Validated filter plus page number and page size.
    fn into_parts(self) -> Result<(ProductFilter, u32, u32), CommerceError> {
        let page = self.page.unwrap_or(1);
        if page == 0 {
            return Err(CommerceError::Validation("page must be at least 1".to_owned()));
        }
        let limit = self.limit.unwrap_or(DEFAULT_LIMIT);
        if !(1..=MAX_LIMIT).contains(&limit) {
            return Err(CommerceError::Validation(format!(
                "limit must be between 1 and {MAX_LIMIT}"
            )));
        }
        if self.min_price.is_some_and(|p| p < Decimal::ZERO)
            || self.max_price.is_some_and(|p| p < Decimal::ZERO)
        {
            return Err(CommerceError::Validation(
                "price bounds cannot be negative".to_owned(),
            ));
        }

        let filter = ProductFilter {
            category_id: self.category_id,
            search: self
                .search
                .map(|s| s.trim().to_owned())
                .filter(|s| !s.is_empty()),
            min_price: self.min_price,
            max_price: self.max_price,
            is_active: self.is_active.unwrap_or(true),
        };
        Ok((filter, page, limit))
    }
}

/// Product operations for one storage backend.
pub struct ProductService<'a> {
    store: &'a dyn Store,
}

impl<'a> ProductService<'a> {
    /// Create a new product service.
    #[must_use]
    pub const fn new(store: &'a dyn Store) -> Self {
        Self { store }
    }

    /// Create a product.
    ///
    /// # Errors
    ///
    /// Returns `CommerceError::Validation` for malformed input and
    /// `CommerceError::CategoryNotFound` for an unknown category.
    #[instrument(skip(self))]
    pub async fn create(&self, input: ProductInput) -> Result<ProductWithCategory, CommerceError> {
        if input.stock < 0 {
            return Err(CommerceError::Validation("stock cannot be negative".to_owned()));
        }
        let product = NewProduct {
            name: text("name", &input.name, NAME_MIN, NAME_MAX)?,
            description: optional_text(
                "description",
                input.description.as_deref(),
                DESCRIPTION_MAX,
            )?,
            price: Price::new(input.price)?,
            image_url: image_url(input.image_url.as_deref())?,
            stock: input.stock,
            is_active: input.is_active.unwrap_or(true),
            category_id: input.category_id,
        };
        self.ensure_category(product.category_id).await?;

        let product = self.store.create_product(product).await.map_err(|e| match e {
            RepositoryError::NotFound => CommerceError::CategoryNotFound {
                category_id: input.category_id,
            },
            other => other.into(),
        })?;
        tracing::info!(product_id = %product.id, name = %product.name, "Product created");
        self.with_category(product.id).await
    }

    /// One page of products, newest first.
    ///
    /// # Errors
    ///
    /// Returns `CommerceError::Validation` for out-of-range paging.
    pub async fn find_all(&self, query: ProductQuery) -> Result<ProductPage, CommerceError> {
        let (filter, page, limit) = query.into_parts()?;
        let offset = i64::from(page - 1) * i64::from(limit);

        let (products, total) = self
            .store
            .search_products(&filter, offset, i64::from(limit))
            .await?;

        Ok(ProductPage {
            products,
            total,
            page,
            limit,
            total_pages: total_pages(total, limit),
        })
    }

    /// A product with its category.
    ///
    /// # Errors
    ///
    /// Returns `CommerceError::Repository` if storage fails.
    pub async fn find_one(
        &self,
        id: ProductId,
    ) -> Result<Option<ProductWithCategory>, CommerceError> {
        Ok(self.store.get_product_with_category(id).await?)
    }

    /// Apply a partial update.
    ///
    /// # Errors
    ///
    /// Returns `CommerceError::ProductNotFound` or
    /// `CommerceError::CategoryNotFound`.
    #[instrument(skip(self))]
    pub async fn update(
        &self,
        id: ProductId,
        input: ProductUpdate,
    ) -> Result<ProductWithCategory, CommerceError> {
        let patch = ProductPatch {
            name: input
                .name
                .as_deref()
                .map(|n| text("name", n, NAME_MIN, NAME_MAX))
                .transpose()?,
            description: optional_text(
                "description",
                input.description.as_deref(),
                DESCRIPTION_MAX,
            )?,
            price: input.price.map(Price::new).transpose()?,
            image_url: image_url(input.image_url.as_deref())?,
            is_active: input.is_active,
            category_id: input.category_id,
        };
        if let Some(category_id) = patch.category_id {
            self.ensure_category(category_id).await?;
        }

        self.store.update_product(id, patch).await.map_err(|e| match e {
            RepositoryError::NotFound => CommerceError::ProductNotFound { product_id: id },
            other => other.into(),
        })?;
        self.with_category(id).await
    }

    /// Remove a product.
    ///
    /// A product that any cart or order line still references is only
    /// deactivated; otherwise it is deleted.
    ///
    /// # Errors
    ///
    /// Returns `CommerceError::ProductNotFound` if the product does not exist.
    #[instrument(skip(self))]
    pub async fn remove(&self, id: ProductId) -> Result<Removal, CommerceError> {
        if self.store.get_product(id).await?.is_none() {
            return Err(CommerceError::ProductNotFound { product_id: id });
        }

        if !self.store.product_is_referenced(id).await? {
            match self.store.delete_product(id).await {
                Ok(true) => {
                    tracing::info!(product_id = %id, "Product deleted");
                    return Ok(Removal::Deleted { id });
                }
                Ok(false) => return Err(CommerceError::ProductNotFound { product_id: id }),
                // Referenced after the check, fall through to deactivation
                Err(RepositoryError::Conflict(_)) => {}
                Err(e) => return Err(e.into()),
            }
        }

        let product = self
            .store
            .update_product(
                id,
                ProductPatch {
                    is_active: Some(false),
                    ..ProductPatch::default()
                },
            )
            .await?;
        tracing::info!(product_id = %id, "Product deactivated");
        Ok(Removal::Deactivated { product })
    }

    /// Add `delta` units to stock. Negative deltas are allowed as long as
    /// stock stays at or above zero.
    ///
    /// # Errors
    ///
    /// Returns `CommerceError::ProductNotFound` or
    /// `CommerceError::InsufficientStock`.
    #[instrument(skip(self))]
    pub async fn adjust_stock(
        &self,
        id: ProductId,
        delta: i32,
    ) -> Result<ProductWithCategory, CommerceError> {
        match self.store.adjust_stock(id, delta).await {
            Ok(_) => self.with_category(id).await,
            Err(RepositoryError::NotFound) => {
                Err(CommerceError::ProductNotFound { product_id: id })
            }
            Err(RepositoryError::Conflict(_)) => {
                let available = self
                    .store
                    .get_product(id)
                    .await?
                    .map_or(0, |p| i64::from(p.stock));
                Err(CommerceError::InsufficientStock {
                    product_id: id,
                    requested: u64::from(delta.unsigned_abs()),
                    available,
                })
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Whether `quantity` units can currently be bought. Missing and
    /// inactive products are never available.
    ///
    /// # Errors
    ///
    /// Returns `CommerceError::Repository` if storage fails.
    pub async fn check_stock(
        &self,
        id: ProductId,
        quantity: Quantity,
    ) -> Result<bool, CommerceError> {
        Ok(self
            .store
            .get_product(id)
            .await?
            .is_some_and(|p| p.is_purchasable() && quantity.fits_within(p.stock)))
    }

    async fn ensure_category(&self, category_id: CategoryId) -> Result<(), CommerceError> {
        if self.store.get_category(category_id).await?.is_none() {
            return Err(CommerceError::CategoryNotFound { category_id });
        }
        Ok(())
    }

    async fn with_category(&self, id: ProductId) -> Result<ProductWithCategory, CommerceError> {
        self.store
            .get_product_with_category(id)
            .await?
            .ok_or(CommerceError::ProductNotFound { product_id: id })
    }
}

fn total_pages(total: i64, limit: u32) -> i64 {
    let limit = i64::from(limit.max(1));
    (total + limit - 1) / limit
}
