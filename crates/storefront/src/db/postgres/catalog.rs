//! Category and product repositories.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use sqlx::{PgConnection, PgPool};

use stitchery_core::{CategoryId, ProductId, Quantity};

use super::referenced;
use crate::db::{RepositoryError, conflict_on_unique};
use crate::models::{
    Category, CategoryPatch, NewCategory, NewProduct, Product, ProductFilter, ProductPatch,
    ProductWithCategory,
};

const CATEGORY_COLUMNS: &str = "id, name, description, created_at, updated_at";

const PRODUCT_COLUMNS: &str = "id, name, description, price, image_url, stock, is_active, \
                               category_id, created_at, updated_at";

/// Product joined with its category, columns prefixed to avoid clashes.
const PRODUCT_WITH_CATEGORY_SELECT: &str = "
    SELECT p.id, p.name, p.description, p.price, p.image_url, p.stock, p.is_active,
           p.category_id, p.created_at, p.updated_at,
           c.name AS category_name, c.description AS category_description,
           c.created_at AS category_created_at, c.updated_at AS category_updated_at
    FROM products p
    JOIN categories c ON c.id = p.category_id";

/// Shared search predicate. `$1` active flag, `$2` category, `$3` ILIKE
/// pattern, `$4`/`$5` price bounds.
const PRODUCT_FILTER: &str = "
    WHERE p.is_active = $1
      AND ($2::uuid IS NULL OR p.category_id = $2)
      AND ($3::text IS NULL OR p.name ILIKE $3 OR p.description ILIKE $3)
      AND ($4::numeric IS NULL OR p.price >= $4)
      AND ($5::numeric IS NULL OR p.price <= $5)";

#[derive(sqlx::FromRow)]
struct ProductCategoryRow {
    #[sqlx(flatten)]
    product: Product,
    category_name: String,
    category_description: Option<String>,
    category_created_at: DateTime<Utc>,
    category_updated_at: DateTime<Utc>,
}

impl From<ProductCategoryRow> for ProductWithCategory {
    fn from(row: ProductCategoryRow) -> Self {
        let category = Category {
            id: row.product.category_id,
            name: row.category_name,
            description: row.category_description,
            created_at: row.category_created_at,
            updated_at: row.category_updated_at,
        };
        Self {
            product: row.product,
            category,
        }
    }
}

/// Escape `LIKE` wildcards and wrap in `%...%`.
fn like_pattern(search: &str) -> String {
    let escaped = search
        .replace('\\', "\\\\")
        .replace('%', "\\%")
        .replace('_', "\\_");
    format!("%{escaped}%")
}

/// Repository for category database operations.
pub struct CategoryRepository<'a> {
    pool: &'a PgPool,
}

impl<'a> CategoryRepository<'a> {
    /// Create a new category repository.
    #[must_use]
    pub const fn new(pool: &'a PgPool) -> Self {
        Self { pool }
    }

    /// Insert a category.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Conflict` if the name is taken.
    pub async fn create(&self, category: NewCategory) -> Result<Category, RepositoryError> {
        sqlx::query_as::<_, Category>(&format!(
            "INSERT INTO categories (id, name, description)
             VALUES ($1, $2, $3)
             RETURNING {CATEGORY_COLUMNS}"
        ))
        .bind(CategoryId::generate())
        .bind(&category.name)
        .bind(&category.description)
        .fetch_one(self.pool)
        .await
        .map_err(|e| conflict_on_unique(e, "category"))
    }

    /// Get a category by ID.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn get(&self, id: CategoryId) -> Result<Option<Category>, RepositoryError> {
        let category = sqlx::query_as::<_, Category>(&format!(
            "SELECT {CATEGORY_COLUMNS} FROM categories WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(self.pool)
        .await?;
        Ok(category)
    }

    /// All categories ordered by name.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn list(&self) -> Result<Vec<Category>, RepositoryError> {
        let categories = sqlx::query_as::<_, Category>(&format!(
            "SELECT {CATEGORY_COLUMNS} FROM categories ORDER BY name ASC"
        ))
        .fetch_all(self.pool)
        .await?;
        Ok(categories)
    }

    /// Number of products in a category, active or not.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn count_products(&self, id: CategoryId) -> Result<i64, RepositoryError> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM products WHERE category_id = $1")
            .bind(id)
            .fetch_one(self.pool)
            .await?;
        Ok(count)
    }

    /// Apply a partial update.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::NotFound` if the category does not exist.
    /// Returns `RepositoryError::Conflict` if the new name is taken.
    pub async fn update(
        &self,
        id: CategoryId,
        patch: CategoryPatch,
    ) -> Result<Category, RepositoryError> {
        sqlx::query_as::<_, Category>(&format!(
            "UPDATE categories
             SET name = COALESCE($2, name),
                 description = COALESCE($3, description),
                 updated_at = NOW()
             WHERE id = $1
             RETURNING {CATEGORY_COLUMNS}"
        ))
        .bind(id)
        .bind(patch.name.as_deref())
        .bind(patch.description.as_deref())
        .fetch_optional(self.pool)
        .await
        .map_err(|e| conflict_on_unique(e, "category"))?
        .ok_or(RepositoryError::NotFound)
    }

    /// Delete a category.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Conflict` if products still reference it.
    pub async fn delete(&self, id: CategoryId) -> Result<bool, RepositoryError> {
        let result = sqlx::query("DELETE FROM categories WHERE id = $1")
            .bind(id)
            .execute(self.pool)
            .await
            .map_err(|e| referenced(e, "category has products"))?;
        Ok(result.rows_affected() > 0)
    }
}

/// Repository for product database operations.
pub struct ProductRepository<'a> {
    pool: &'a PgPool,
}

impl<'a> ProductRepository<'a> {
    /// Create a new product repository.
    #[must_use]
    pub const fn new(pool: &'a PgPool) -> Self {
        Self { pool }
    }

    /// Insert a product.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::NotFound` if the category does not exist.
    pub async fn create(&self, product: NewProduct) -> Result<Product, RepositoryError> {
        sqlx::query_as::<_, Product>(&format!(
            "INSERT INTO products
                 (id, name, description, price, image_url, stock, is_active, category_id)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
             RETURNING {PRODUCT_COLUMNS}"
        ))
        .bind(ProductId::generate())
        .bind(&product.name)
        .bind(&product.description)
        .bind(product.price)
        .bind(&product.image_url)
        .bind(product.stock)
        .bind(product.is_active)
        .bind(product.category_id)
        .fetch_one(self.pool)
        .await
        .map_err(missing_category)
    }

    /// Get a product by ID.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn get(&self, id: ProductId) -> Result<Option<Product>, RepositoryError> {
        let product = sqlx::query_as::<_, Product>(&format!(
            "SELECT {PRODUCT_COLUMNS} FROM products WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(self.pool)
        .await?;
        Ok(product)
    }

    /// Get a product with its category.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn get_with_category(
        &self,
        id: ProductId,
    ) -> Result<Option<ProductWithCategory>, RepositoryError> {
        let row = sqlx::query_as::<_, ProductCategoryRow>(&format!(
            "{PRODUCT_WITH_CATEGORY_SELECT} WHERE p.id = $1"
        ))
        .bind(id)
        .fetch_optional(self.pool)
        .await?;
        Ok(row.map(Into::into))
    }

    /// One page of matching products, newest first, and the total match count.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if either query fails.
    pub async fn search(
        &self,
        filter: &ProductFilter,
        offset: i64,
        limit: i64,
    ) -> Result<(Vec<ProductWithCategory>, i64), RepositoryError> {
        let pattern = filter.search.as_deref().map(like_pattern);

        let total: i64 = sqlx::query_scalar(&format!(
            "SELECT COUNT(*) FROM products p {PRODUCT_FILTER}"
        ))
        .bind(filter.is_active)
        .bind(filter.category_id)
        .bind(pattern.as_deref())
        .bind(filter.min_price)
        .bind(filter.max_price)
        .fetch_one(self.pool)
        .await?;

        let rows = sqlx::query_as::<_, ProductCategoryRow>(&format!(
            "{PRODUCT_WITH_CATEGORY_SELECT} {PRODUCT_FILTER}
             ORDER BY p.created_at DESC, p.id
             OFFSET $6 LIMIT $7"
        ))
        .bind(filter.is_active)
        .bind(filter.category_id)
        .bind(pattern.as_deref())
        .bind(filter.min_price)
        .bind(filter.max_price)
        .bind(offset)
        .bind(limit)
        .fetch_all(self.pool)
        .await?;

        Ok((rows.into_iter().map(Into::into).collect(), total))
    }

    /// Apply a partial update. Stock is untouched.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::NotFound` if the product or the new
    /// category does not exist.
    pub async fn update(
        &self,
        id: ProductId,
        patch: ProductPatch,
    ) -> Result<Product, RepositoryError> {
        sqlx::query_as::<_, Product>(&format!(
            "UPDATE products
             SET name = COALESCE($2, name),
                 description = COALESCE($3, description),
                 price = COALESCE($4, price),
                 image_url = COALESCE($5, image_url),
                 is_active = COALESCE($6, is_active),
                 category_id = COALESCE($7, category_id),
                 updated_at = NOW()
             WHERE id = $1
             RETURNING {PRODUCT_COLUMNS}"
        ))
        .bind(id)
        .bind(patch.name.as_deref())
        .bind(patch.description.as_deref())
        .bind(patch.price)
        .bind(patch.image_url.as_deref())
        .bind(patch.is_active)
        .bind(patch.category_id)
        .fetch_optional(self.pool)
        .await
        .map_err(missing_category)?
        .ok_or(RepositoryError::NotFound)
    }

    /// Whether any cart line or order line references the product.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn is_referenced(&self, id: ProductId) -> Result<bool, RepositoryError> {
        let referenced: bool = sqlx::query_scalar(
            "SELECT EXISTS (SELECT 1 FROM cart_items WHERE product_id = $1)
                 OR EXISTS (SELECT 1 FROM order_items WHERE product_id = $1)",
        )
        .bind(id)
        .fetch_one(self.pool)
        .await?;
        Ok(referenced)
    }

    /// Hard-delete a product.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Conflict` if a line still references it.
    pub async fn delete(&self, id: ProductId) -> Result<bool, RepositoryError> {
        let result = sqlx::query("DELETE FROM products WHERE id = $1")
            .bind(id)
            .execute(self.pool)
            .await
            .map_err(|e| referenced(e, "product is referenced"))?;
        Ok(result.rows_affected() > 0)
    }

    /// Relative stock change that never goes below zero.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::NotFound` if the product does not exist.
    /// Returns `RepositoryError::Conflict` if the result would be negative.
    pub async fn adjust_stock(
        &self,
        id: ProductId,
        delta: i32,
    ) -> Result<Product, RepositoryError> {
        let updated = sqlx::query_as::<_, Product>(&format!(
            "UPDATE products
             SET stock = stock + $2, updated_at = NOW()
             WHERE id = $1 AND stock + $2 >= 0
             RETURNING {PRODUCT_COLUMNS}"
        ))
        .bind(id)
        .bind(delta)
        .fetch_optional(self.pool)
        .await?;

        if let Some(product) = updated {
            return Ok(product);
        }
        match self.get(id).await? {
            Some(_) => Err(RepositoryError::Conflict(format!(
                "stock for product {id} cannot go below zero"
            ))),
            None => Err(RepositoryError::NotFound),
        }
    }
}

/// Products with categories for a set of IDs, keyed by product ID.
pub(super) async fn products_by_ids(
    conn: &mut PgConnection,
    ids: &[ProductId],
) -> Result<HashMap<ProductId, ProductWithCategory>, RepositoryError> {
    if ids.is_empty() {
        return Ok(HashMap::new());
    }
    let rows = sqlx::query_as::<_, ProductCategoryRow>(&format!(
        "{PRODUCT_WITH_CATEGORY_SELECT} WHERE p.id = ANY($1)"
    ))
    .bind(ids)
    .fetch_all(conn)
    .await?;

    Ok(rows
        .into_iter()
        .map(|row| (row.product.id, ProductWithCategory::from(row)))
        .collect())
}

pub(super) async fn lock_product(
    conn: &mut PgConnection,
    id: ProductId,
) -> Result<Option<Product>, RepositoryError> {
    let product = sqlx::query_as::<_, Product>(&format!(
        "SELECT {PRODUCT_COLUMNS} FROM products WHERE id = $1 FOR UPDATE"
    ))
    .bind(id)
    .fetch_optional(conn)
    .await?;
    Ok(product)
}

/// Conditional decrement: changes nothing unless enough stock is on hand.
pub(super) async fn decrement_stock(
    conn: &mut PgConnection,
    id: ProductId,
    quantity: Quantity,
) -> Result<(), RepositoryError> {
    let result = sqlx::query(
        "UPDATE products
         SET stock = stock - $2, updated_at = NOW()
         WHERE id = $1 AND stock >= $2",
    )
    .bind(id)
    .bind(quantity)
    .execute(conn)
    .await?;

    if result.rows_affected() == 0 {
        return Err(RepositoryError::Conflict(format!(
            "insufficient stock for product {id}"
        )));
    }
    Ok(())
}

pub(super) async fn increment_stock(
    conn: &mut PgConnection,
    id: ProductId,
    quantity: Quantity,
) -> Result<(), RepositoryError> {
    let result = sqlx::query(
        "UPDATE products SET stock = stock + $2, updated_at = NOW() WHERE id = $1",
    )
    .bind(id)
    .bind(quantity)
    .execute(conn)
    .await?;

    if result.rows_affected() == 0 {
        return Err(RepositoryError::NotFound);
    }
    Ok(())
}

fn missing_category(err: sqlx::Error) -> RepositoryError {
    if let sqlx::Error::Database(ref db_err) = err
        && db_err.is_foreign_key_violation()
    {
        return RepositoryError::NotFound;
    }
    RepositoryError::Database(err)
}
