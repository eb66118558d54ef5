//! Seed the catalog from a YAML file.
//!
//! Re-running is safe: categories are matched by name and products by name
//! within their category, so existing rows are left alone.
//!
//! ```yaml
//! categories:
//!   - name: Embroidery Hoops
//!     description: Hoops for every project
//!     products:
//!       - name: Bamboo Embroidery Hoop - 6 inch
//!         price: "12.99"
//!         stock: 75
//! ```

use std::path::Path;

use rust_decimal::Decimal;
use serde::Deserialize;
use tracing::info;

use stitchery_storefront::db::{PgStore, Store};
use stitchery_storefront::models::Category;
use stitchery_storefront::services::catalog::{CategoryInput, ProductInput, ProductQuery};
use stitchery_storefront::services::{CategoryService, CommerceError, ProductService};

use super::connect;

/// Top-level shape of the seed file.
#[derive(Debug, Deserialize)]
pub struct CatalogSeed {
    pub categories: Vec<CategorySeed>,
}

#[derive(Debug, Deserialize)]
pub struct CategorySeed {
    pub name: String,
    pub description: Option<String>,
    #[serde(default)]
    pub products: Vec<ProductSeed>,
}

#[derive(Debug, Deserialize)]
pub struct ProductSeed {
    pub name: String,
    pub description: Option<String>,
    pub price: Decimal,
    pub stock: i32,
    pub image_url: Option<String>,
}

/// What a seeding run changed.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct SeedReport {
    pub categories_created: usize,
    pub products_created: usize,
    pub products_skipped: usize,
}

/// Seed the catalog from `file_path` into the configured database.
///
/// # Errors
///
/// Returns an error if the file cannot be read or parsed, the database is
/// unreachable, or an entry fails validation.
pub async fn catalog(file_path: &str) -> Result<(), Box<dyn std::error::Error>> {
    let path = Path::new(file_path);
    if !path.exists() {
        return Err(format!("File not found: {file_path}").into());
    }

    info!(path = %file_path, "Loading catalog seed");

    // Parse before connecting to the database
    let content = tokio::fs::read_to_string(path).await?;
    let seed: CatalogSeed = serde_yaml::from_str(&content)?;
    info!(categories = seed.categories.len(), "Parsed seed file");

    let store = PgStore::new(connect().await?);
    let report = apply(&store, seed).await?;

    info!("Seeding complete!");
    info!("  Categories created: {}", report.categories_created);
    info!("  Products created: {}", report.products_created);
    info!("  Products skipped (already exist): {}", report.products_skipped);
    Ok(())
}

/// Insert everything in `seed` that does not exist yet.
///
/// # Errors
///
/// Returns the first validation or storage error; earlier inserts stay.
pub async fn apply(store: &dyn Store, seed: CatalogSeed) -> Result<SeedReport, CommerceError> {
    let categories = CategoryService::new(store);
    let products = ProductService::new(store);
    let mut report = SeedReport::default();

    for entry in seed.categories {
        let category = match categories
            .create(CategoryInput {
                name: entry.name.clone(),
                description: entry.description,
            })
            .await
        {
            Ok(category) => {
                report.categories_created += 1;
                category
            }
            Err(CommerceError::CategoryNameTaken { name }) => {
                existing_category(store, &name).await?
            }
            Err(e) => return Err(e),
        };

        for product in entry.products {
            if product_exists(&products, &category, &product.name).await? {
                report.products_skipped += 1;
                continue;
            }
            products
                .create(ProductInput {
                    name: product.name,
                    description: product.description,
                    price: product.price,
                    image_url: product.image_url,
                    stock: product.stock,
                    is_active: Some(true),
                    category_id: category.id,
                })
                .await?;
            report.products_created += 1;
        }
    }

    Ok(report)
}

async fn existing_category(store: &dyn Store, name: &str) -> Result<Category, CommerceError> {
    store
        .list_categories()
        .await?
        .into_iter()
        .find(|c| c.name == name)
        .ok_or_else(|| {
            CommerceError::Validation(format!("category '{name}' vanished during seeding"))
        })
}

async fn product_exists(
    products: &ProductService<'_>,
    category: &Category,
    name: &str,
) -> Result<bool, CommerceError> {
    for is_active in [true, false] {
        let page = products
            .find_all(ProductQuery {
                category_id: Some(category.id),
                search: Some(name.to_owned()),
                is_active: Some(is_active),
                limit: Some(100),
                ..ProductQuery::default()
            })
            .await?;
        if page.products.iter().any(|p| p.product.name == name) {
            return Ok(true);
        }
    }
    Ok(false)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use stitchery_storefront::db::MemoryStore;

    const SEED: &str = r#"
categories:
  - name: Embroidery Hoops
    description: High-quality hoops for all your embroidery projects
    products:
      - name: Bamboo Embroidery Hoop - 6 inch
        price: "12.99"
        stock: 75
      - name: Professional Wooden Hoop Set
        description: Set of 3 wooden hoops
        price: "34.99"
        stock: 40
  - name: Fabric & Canvas
"#;

    #[tokio::test]
    async fn test_seeding_twice_creates_nothing_new() {
        let store = MemoryStore::new();

        let first = apply(&store, serde_yaml::from_str(SEED).unwrap())
            .await
            .unwrap();
        assert_eq!(
            first,
            SeedReport {
                categories_created: 2,
                products_created: 2,
                products_skipped: 0,
            }
        );

        let second = apply(&store, serde_yaml::from_str(SEED).unwrap())
            .await
            .unwrap();
        assert_eq!(
            second,
            SeedReport {
                categories_created: 0,
                products_created: 0,
                products_skipped: 2,
            }
        );
        assert_eq!(store.list_categories().await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_invalid_product_is_reported() {
        let store = MemoryStore::new();
        let seed: CatalogSeed = serde_yaml::from_str(
            r#"
categories:
  - name: Tools
    products:
      - name: Free scissors
        price: "0"
        stock: 1
"#,
        )
        .unwrap();

        let err = apply(&store, seed).await.unwrap_err();
        assert!(matches!(err, CommerceError::Validation(_)));
    }

    #[test]
    fn test_bundled_seed_file_parses() {
        let content = include_str!("../../../../seed/catalog.yaml");
        let seed: CatalogSeed = serde_yaml::from_str(content).unwrap();
        assert_eq!(seed.categories.len(), 4);
        assert_eq!(
            seed.categories.iter().map(|c| c.products.len()).sum::<usize>(),
            11
        );
    }
}
