//! Category service.

use serde::Deserialize;
use tracing::instrument;

use stitchery_core::CategoryId;

use super::{optional_text, text};
use crate::db::{RepositoryError, Store};
use crate::models::{Category, CategoryPatch, CategoryWithCount, NewCategory};
use crate::services::CommerceError;

const NAME_MIN: usize = 2;
const NAME_MAX: usize = 50;
const DESCRIPTION_MAX: usize = 200;

/// Body of a create-category request.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CategoryInput {
    pub name: String,
    pub description: Option<String>,
}

/// Body of an update-category request.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CategoryUpdate {
    pub name: Option<String>,
    pub description: Option<String>,
}

/// Category operations for one storage backend.
pub struct CategoryService<'a> {
    store: &'a dyn Store,
}

impl<'a> CategoryService<'a> {
    /// Create a new category service.
    #[must_use]
    pub const fn new(store: &'a dyn Store) -> Self {
        Self { store }
    }

    /// Create a category.
    ///
    /// # Errors
    ///
    /// Returns `CommerceError::Validation` for malformed input and
    /// `CommerceError::CategoryNameTaken` on a duplicate name.
    #[instrument(skip(self))]
    pub async fn create(&self, input: CategoryInput) -> Result<Category, CommerceError> {
        let name = text("name", &input.name, NAME_MIN, NAME_MAX)?;
        let description =
            optional_text("description", input.description.as_deref(), DESCRIPTION_MAX)?;

        self.store
            .create_category(NewCategory {
                name: name.clone(),
                description,
            })
            .await
            .map_err(|e| name_taken(e, name))
    }

    /// All categories ordered by name.
    ///
    /// # Errors
    ///
    /// Returns `CommerceError::Repository` if storage fails.
    pub async fn find_all(&self) -> Result<Vec<Category>, CommerceError> {
        Ok(self.store.list_categories().await?)
    }

    /// A category with its product count.
    ///
    /// # Errors
    ///
    /// Returns `CommerceError::Repository` if storage fails.
    pub async fn find_one(
        &self,
        id: CategoryId,
    ) -> Result<Option<CategoryWithCount>, CommerceError> {
        let Some(category) = self.store.get_category(id).await? else {
            return Ok(None);
        };
        let product_count = self.store.count_category_products(id).await?;
        Ok(Some(CategoryWithCount {
            category,
            product_count,
        }))
    }

    /// Apply a partial update.
    ///
    /// # Errors
    ///
    /// Returns `CommerceError::CategoryNotFound` or
    /// `CommerceError::CategoryNameTaken`.
    #[instrument(skip(self))]
    pub async fn update(
        &self,
        id: CategoryId,
        input: CategoryUpdate,
    ) -> Result<Category, CommerceError> {
        let name = input
            .name
            .as_deref()
            .map(|n| text("name", n, NAME_MIN, NAME_MAX))
            .transpose()?;
        let description =
            optional_text("description", input.description.as_deref(), DESCRIPTION_MAX)?;

        self.store
            .update_category(
                id,
                CategoryPatch {
                    name: name.clone(),
                    description,
                },
            )
            .await
            .map_err(|e| match e {
                RepositoryError::NotFound => CommerceError::CategoryNotFound { category_id: id },
                other => name_taken(other, name.unwrap_or_default()),
            })
    }

    /// Delete a category that owns no products.
    ///
    /// # Errors
    ///
    /// Returns `CommerceError::CategoryNotFound`, or
    /// `CommerceError::CategoryInUse` while products still reference it.
    #[instrument(skip(self))]
    pub async fn remove(&self, id: CategoryId) -> Result<Category, CommerceError> {
        let category = self
            .store
            .get_category(id)
            .await?
            .ok_or(CommerceError::CategoryNotFound { category_id: id })?;

        let product_count = self.store.count_category_products(id).await?;
        if product_count > 0 {
            return Err(CommerceError::CategoryInUse {
                category_id: id,
                product_count,
            });
        }

        match self.store.delete_category(id).await {
            Ok(true) => Ok(category),
            Ok(false) => Err(CommerceError::CategoryNotFound { category_id: id }),
            // A product was added after the count
            Err(RepositoryError::Conflict(_)) => Err(CommerceError::CategoryInUse {
                category_id: id,
                product_count: self.store.count_category_products(id).await?,
            }),
            Err(e) => Err(e.into()),
        }
    }
}

fn name_taken(err: RepositoryError, name: String) -> CommerceError {
    match err {
        RepositoryError::Conflict(_) => CommerceError::CategoryNameTaken { name },
        other => other.into(),
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::db::MemoryStore;
    use crate::services::cart::tests::product;

    fn input(name: &str) -> CategoryInput {
        CategoryInput {
            name: name.to_owned(),
            description: Some("Needles, hoops and frames".to_owned()),
        }
    }

    #[tokio::test]
    async fn test_duplicate_name_is_rejected() {
        let store = MemoryStore::new();
        let service = CategoryService::new(&store);

        service.create(input("Tools")).await.unwrap();
        let err = service.create(input("Tools")).await.unwrap_err();
        assert!(matches!(err, CommerceError::CategoryNameTaken { name } if name == "Tools"));
    }

    #[tokio::test]
    async fn test_find_all_is_ordered_by_name() {
        let store = MemoryStore::new();
        let service = CategoryService::new(&store);
        for name in ["Threads", "Fabric", "Patterns"] {
            service.create(input(name)).await.unwrap();
        }

        let names: Vec<String> = service
            .find_all()
            .await
            .unwrap()
            .into_iter()
            .map(|c| c.name)
            .collect();
        assert_eq!(names, ["Fabric", "Patterns", "Threads"]);
    }

    #[tokio::test]
    async fn test_short_name_is_invalid() {
        let store = MemoryStore::new();
        let err = CategoryService::new(&store)
            .create(input("T"))
            .await
            .unwrap_err();
        assert!(matches!(err, CommerceError::Validation(_)));
    }

    #[tokio::test]
    async fn test_category_with_products_cannot_be_removed() {
        let store = MemoryStore::new();
        let product = product(&store, 100, 1).await;
        let service = CategoryService::new(&store);

        let err = service.remove(product.category_id).await.unwrap_err();
        assert!(matches!(
            err,
            CommerceError::CategoryInUse {
                product_count: 1,
                ..
            }
        ));

        let found = service.find_one(product.category_id).await.unwrap().unwrap();
        assert_eq!(found.product_count, 1);
    }

    #[tokio::test]
    async fn test_update_and_remove_unknown_category() {
        let store = MemoryStore::new();
        let service = CategoryService::new(&store);
        let id = CategoryId::generate();

        assert!(matches!(
            service.update(id, CategoryUpdate::default()).await,
            Err(CommerceError::CategoryNotFound { .. })
        ));
        assert!(matches!(
            service.remove(id).await,
            Err(CommerceError::CategoryNotFound { .. })
        ));
    }
}
