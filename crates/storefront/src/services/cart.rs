//! Cart service.
//!
//! Carts are keyed by a [`CartOwner`]: an authenticated user or a guest
//! session. Stock is checked when lines are added or changed but never
//! reserved; the order service re-validates at checkout.

use tracing::instrument;

use stitchery_core::{CartId, CartItemId, CartOwner, ProductId, Quantity, SessionId, UserId};

use super::CommerceError;
use crate::db::{RepositoryError, Store};
use crate::models::{Cart, CartDetails, CartItem, Product};

/// Resolve the cart owner from the identities present on a request.
///
/// # Errors
///
/// Returns `CommerceError::InvalidIdentity` if neither is present.
pub fn resolve_owner(
    user_id: Option<UserId>,
    session_id: Option<SessionId>,
) -> Result<CartOwner, CommerceError> {
    CartOwner::resolve(user_id, session_id).ok_or(CommerceError::InvalidIdentity)
}

/// Cart operations for one storage backend.
pub struct CartService<'a> {
    store: &'a dyn Store,
}

impl<'a> CartService<'a> {
    /// Create a new cart service.
    #[must_use]
    pub const fn new(store: &'a dyn Store) -> Self {
        Self { store }
    }

    /// The owner's cart, if one exists. Never creates.
    ///
    /// # Errors
    ///
    /// Returns `CommerceError::Repository` if storage fails.
    pub async fn get_cart(&self, owner: &CartOwner) -> Result<Option<CartDetails>, CommerceError> {
        match self.store.find_cart(owner).await? {
            Some(cart) => Ok(self.store.cart_details(cart.id).await?),
            None => Ok(None),
        }
    }

    /// The owner's cart, created empty if needed.
    ///
    /// # Errors
    ///
    /// Returns `CommerceError::Repository` if storage fails.
    pub async fn get_or_create_cart(
        &self,
        owner: &CartOwner,
    ) -> Result<CartDetails, CommerceError> {
        let cart = self.store.get_or_create_cart(owner).await?;
        self.details(cart.id).await
    }

    /// Add units of a product to the owner's cart.
    ///
    /// # Errors
    ///
    /// Returns `CommerceError::ProductNotFound` if the product is missing or
    /// inactive, `CommerceError::InsufficientStock` if the cart would hold
    /// more units than are in stock.
    #[instrument(skip(self, owner), fields(owner = %owner))]
    pub async fn add_to_cart(
        &self,
        owner: &CartOwner,
        product_id: ProductId,
        quantity: Quantity,
    ) -> Result<CartDetails, CommerceError> {
        let product = self.purchasable(product_id).await?;
        ensure_stock(&product, u64::from(quantity.get()))?;

        let cart = self.store.get_or_create_cart(owner).await?;

        match self.store.find_cart_item(cart.id, product_id).await? {
            Some(existing) => {
                let wanted = u64::from(existing.quantity.get()) + u64::from(quantity.get());
                ensure_stock(&product, wanted)?;
                let merged = existing.quantity.checked_add(quantity)?;
                self.store
                    .set_cart_item_quantity(existing.id, merged)
                    .await?;
            }
            None => {
                self.store
                    .insert_cart_item(cart.id, product_id, quantity)
                    .await?;
            }
        }

        tracing::debug!(
            cart_id = %cart.id,
            %product_id,
            quantity = quantity.get(),
            "Added to cart"
        );
        self.details(cart.id).await
    }

    /// Set the quantity of a line in the owner's cart.
    ///
    /// # Errors
    ///
    /// Returns `CommerceError::CartItemNotFound` if the line does not exist,
    /// `CommerceError::Unauthorized` if it is in another cart, and
    /// `CommerceError::InsufficientStock` if `quantity` exceeds stock.
    #[instrument(skip(self, owner), fields(owner = %owner))]
    pub async fn update_cart_item(
        &self,
        owner: &CartOwner,
        item_id: CartItemId,
        quantity: Quantity,
    ) -> Result<CartDetails, CommerceError> {
        let (item, cart) = self.owned_item(owner, item_id).await?;

        let product = self
            .store
            .get_product(item.product_id)
            .await?
            .ok_or(CommerceError::ProductNotFound {
                product_id: item.product_id,
            })?;
        ensure_stock(&product, u64::from(quantity.get()))?;

        self.store.set_cart_item_quantity(item.id, quantity).await?;
        self.details(cart.id).await
    }

    /// Remove a line from the owner's cart.
    ///
    /// # Errors
    ///
    /// Returns `CommerceError::CartItemNotFound` if the line does not exist,
    /// `CommerceError::Unauthorized` if it is in another cart.
    #[instrument(skip(self, owner), fields(owner = %owner))]
    pub async fn remove_from_cart(
        &self,
        owner: &CartOwner,
        item_id: CartItemId,
    ) -> Result<CartDetails, CommerceError> {
        let (item, cart) = self.owned_item(owner, item_id).await?;
        self.store.delete_cart_item(item.id).await?;
        self.details(cart.id).await
    }

    /// Delete every line in the owner's cart. The cart itself remains.
    ///
    /// # Errors
    ///
    /// Returns `CommerceError::Repository` if storage fails.
    pub async fn clear_cart(&self, owner: &CartOwner) -> Result<u64, CommerceError> {
        match self.store.find_cart(owner).await? {
            Some(cart) => Ok(self.store.clear_cart(cart.id).await?),
            None => Ok(0),
        }
    }

    /// Fold a guest cart into the user's cart.
    ///
    /// Quantities for products present in both carts are summed. The guest
    /// cart is deleted afterwards. A missing or empty guest cart leaves the
    /// user's cart as it was. All changes are applied together or not at
    /// all.
    ///
    /// # Errors
    ///
    /// Returns `CommerceError::Repository` if storage fails; nothing is
    /// merged in that case.
    #[instrument(skip(self, session_id))]
    pub async fn merge_guest_cart(
        &self,
        user_id: UserId,
        session_id: SessionId,
    ) -> Result<CartDetails, CommerceError> {
        let mut uow = self.store.begin().await?;

        let user_cart = uow.get_or_create_cart(&CartOwner::User(user_id)).await?;
        let mut merged = 0_usize;
        if let Some(guest_cart) = uow.find_cart(&CartOwner::Session(session_id)).await? {
            let items = uow.cart_items(guest_cart.id).await?;
            if !items.is_empty() {
                for item in &items {
                    uow.merge_cart_item(user_cart.id, item.product_id, item.quantity)
                        .await?;
                }
                uow.delete_cart(guest_cart.id).await?;
                merged = items.len();
            }
        }
        uow.commit().await?;

        if merged > 0 {
            tracing::info!(%user_id, lines = merged, "Merged guest cart");
        }
        self.details(user_cart.id).await
    }

    async fn purchasable(&self, product_id: ProductId) -> Result<Product, CommerceError> {
        self.store
            .get_product(product_id)
            .await?
            .filter(Product::is_purchasable)
            .ok_or(CommerceError::ProductNotFound { product_id })
    }

    async fn owned_item(
        &self,
        owner: &CartOwner,
        item_id: CartItemId,
    ) -> Result<(CartItem, Cart), CommerceError> {
        let (item, cart) = self
            .store
            .get_cart_item(item_id)
            .await?
            .ok_or(CommerceError::CartItemNotFound { item_id })?;
        if !cart.is_owned_by(owner) {
            return Err(CommerceError::Unauthorized);
        }
        Ok((item, cart))
    }

    async fn details(&self, cart_id: CartId) -> Result<CartDetails, CommerceError> {
        self.store
            .cart_details(cart_id)
            .await?
            .ok_or(CommerceError::Repository(RepositoryError::NotFound))
    }
}

fn ensure_stock(product: &Product, requested: u64) -> Result<(), CommerceError> {
    let available = i64::from(product.stock);
    if !i64::try_from(requested).is_ok_and(|requested| requested <= available) {
        return Err(CommerceError::InsufficientStock {
            product_id: product.id,
            requested,
            available,
        });
    }
    Ok(())
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
pub(crate) mod tests {
    use rust_decimal::Decimal;

    use super::*;
    use crate::db::MemoryStore;
    use crate::models::{NewCategory, NewProduct};
    use stitchery_core::{CategoryId, Price};

    pub(crate) async fn category(store: &MemoryStore) -> CategoryId {
        store
            .create_category(NewCategory {
                name: format!("Category {}", CategoryId::generate()),
                description: None,
            })
            .await
            .unwrap()
            .id
    }

    pub(crate) async fn product(store: &MemoryStore, price_cents: i64, stock: i32) -> Product {
        let category_id = category(store).await;
        store
            .create_product(NewProduct {
                name: "Cross-stitch kit".to_owned(),
                description: None,
                price: Price::new(Decimal::new(price_cents, 2)).unwrap(),
                image_url: None,
                stock,
                is_active: true,
                category_id,
            })
            .await
            .unwrap()
    }

    pub(crate) fn qty(n: u32) -> Quantity {
        Quantity::new(n).unwrap()
    }

    fn guest(id: &str) -> CartOwner {
        CartOwner::Session(SessionId::parse(id).unwrap())
    }

    #[test]
    fn test_resolve_owner_requires_an_identity() {
        assert!(matches!(
            resolve_owner(None, None),
            Err(CommerceError::InvalidIdentity)
        ));
        let user = UserId::generate();
        let owner = resolve_owner(Some(user), Some(SessionId::parse("s").unwrap())).unwrap();
        assert_eq!(owner, CartOwner::User(user));
    }

    #[tokio::test]
    async fn test_add_within_stock_succeeds() {
        let store = MemoryStore::new();
        let product = product(&store, 1000, 5).await;
        let service = CartService::new(&store);

        let cart = service
            .add_to_cart(&guest("g1"), product.id, qty(5))
            .await
            .unwrap();

        assert_eq!(cart.items.len(), 1);
        assert_eq!(cart.items[0].item.quantity.get(), 5);
        assert_eq!(cart.subtotal(), Decimal::new(5000, 2));
    }

    #[tokio::test]
    async fn test_add_beyond_stock_fails_and_changes_nothing() {
        let store = MemoryStore::new();
        let product = product(&store, 1000, 5).await;
        let service = CartService::new(&store);
        let owner = guest("g1");

        let err = service
            .add_to_cart(&owner, product.id, qty(6))
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            CommerceError::InsufficientStock {
                requested: 6,
                available: 5,
                ..
            }
        ));
        assert!(service.get_cart(&owner).await.unwrap().is_none());
        assert_eq!(store.get_product(product.id).await.unwrap().unwrap().stock, 5);
    }

    #[tokio::test]
    async fn test_adding_same_product_twice_sums_into_one_line() {
        let store = MemoryStore::new();
        let product = product(&store, 250, 10).await;
        let service = CartService::new(&store);
        let owner = guest("g1");

        service.add_to_cart(&owner, product.id, qty(2)).await.unwrap();
        let cart = service.add_to_cart(&owner, product.id, qty(3)).await.unwrap();

        assert_eq!(cart.items.len(), 1);
        assert_eq!(cart.items[0].item.quantity.get(), 5);
    }

    #[tokio::test]
    async fn test_existing_line_counts_against_stock() {
        let store = MemoryStore::new();
        let product = product(&store, 250, 4).await;
        let service = CartService::new(&store);
        let owner = guest("g1");

        service.add_to_cart(&owner, product.id, qty(3)).await.unwrap();
        let err = service
            .add_to_cart(&owner, product.id, qty(2))
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            CommerceError::InsufficientStock { requested: 5, .. }
        ));
        let cart = service.get_cart(&owner).await.unwrap().unwrap();
        assert_eq!(cart.items[0].item.quantity.get(), 3);
    }

    #[tokio::test]
    async fn test_inactive_product_cannot_be_added() {
        let store = MemoryStore::new();
        let product = product(&store, 250, 4).await;
        store
            .update_product(
                product.id,
                crate::models::ProductPatch {
                    is_active: Some(false),
                    ..Default::default()
                },
            )
            .await
            .unwrap();

        let err = CartService::new(&store)
            .add_to_cart(&guest("g1"), product.id, qty(1))
            .await
            .unwrap_err();
        assert!(matches!(err, CommerceError::ProductNotFound { .. }));
    }

    #[tokio::test]
    async fn test_update_checks_ownership_and_stock() {
        let store = MemoryStore::new();
        let product = product(&store, 250, 4).await;
        let service = CartService::new(&store);
        let owner = guest("g1");

        let cart = service.add_to_cart(&owner, product.id, qty(1)).await.unwrap();
        let item_id = cart.items[0].item.id;

        let err = service
            .update_cart_item(&guest("intruder"), item_id, qty(2))
            .await
            .unwrap_err();
        assert!(matches!(err, CommerceError::Unauthorized));

        let err = service
            .update_cart_item(&owner, item_id, qty(5))
            .await
            .unwrap_err();
        assert!(matches!(err, CommerceError::InsufficientStock { .. }));

        let cart = service.update_cart_item(&owner, item_id, qty(4)).await.unwrap();
        assert_eq!(cart.items[0].item.quantity.get(), 4);
    }

    #[tokio::test]
    async fn test_remove_unknown_item_is_not_found() {
        let store = MemoryStore::new();
        let err = CartService::new(&store)
            .remove_from_cart(&guest("g1"), CartItemId::generate())
            .await
            .unwrap_err();
        assert!(matches!(err, CommerceError::CartItemNotFound { .. }));
    }

    #[tokio::test]
    async fn test_clear_keeps_cart() {
        let store = MemoryStore::new();
        let product = product(&store, 250, 4).await;
        let service = CartService::new(&store);
        let owner = guest("g1");

        service.add_to_cart(&owner, product.id, qty(2)).await.unwrap();
        assert_eq!(service.clear_cart(&owner).await.unwrap(), 1);

        let cart = service.get_cart(&owner).await.unwrap().unwrap();
        assert!(cart.items.is_empty());
    }

    #[tokio::test]
    async fn test_merge_sums_overlapping_lines_and_deletes_guest_cart() {
        let store = MemoryStore::new();
        let a = product(&store, 1000, 50).await;
        let b = product(&store, 500, 50).await;
        let service = CartService::new(&store);
        let user_id = UserId::generate();
        let user = CartOwner::User(user_id);
        let session = SessionId::parse("guest-1").unwrap();
        let guest_owner = CartOwner::Session(session.clone());

        service.add_to_cart(&user, a.id, qty(1)).await.unwrap();
        service.add_to_cart(&guest_owner, a.id, qty(2)).await.unwrap();
        service.add_to_cart(&guest_owner, b.id, qty(1)).await.unwrap();

        let cart = service.merge_guest_cart(user_id, session).await.unwrap();

        assert_eq!(cart.items.len(), 2);
        assert_eq!(cart.line_for(a.id).unwrap().item.quantity.get(), 3);
        assert_eq!(cart.line_for(b.id).unwrap().item.quantity.get(), 1);
        assert!(service.get_cart(&guest_owner).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_merge_without_guest_cart_leaves_user_cart_alone() {
        let store = MemoryStore::new();
        let a = product(&store, 1000, 50).await;
        let service = CartService::new(&store);
        let user_id = UserId::generate();

        service
            .add_to_cart(&CartOwner::User(user_id), a.id, qty(2))
            .await
            .unwrap();
        let cart = service
            .merge_guest_cart(user_id, SessionId::parse("nobody").unwrap())
            .await
            .unwrap();

        assert_eq!(cart.items.len(), 1);
        assert_eq!(cart.items[0].item.quantity.get(), 2);
    }

    #[tokio::test]
    async fn test_merge_past_quantity_limit_conflicts_and_keeps_both_carts() {
        let store = MemoryStore::new();
        let a = product(&store, 100, i32::MAX).await;
        let service = CartService::new(&store);
        let user_id = UserId::generate();
        let user = CartOwner::User(user_id);
        let session = SessionId::parse("guest-big").unwrap();
        let guest_owner = CartOwner::Session(session.clone());

        service
            .add_to_cart(&user, a.id, qty(Quantity::MAX))
            .await
            .unwrap();
        service.add_to_cart(&guest_owner, a.id, qty(1)).await.unwrap();

        let err = service.merge_guest_cart(user_id, session).await.unwrap_err();
        assert!(matches!(
            err,
            CommerceError::Repository(RepositoryError::Conflict(_))
        ));

        let mine = service.get_cart(&user).await.unwrap().unwrap();
        assert_eq!(mine.items[0].item.quantity.get(), Quantity::MAX);
        let guest = service.get_cart(&guest_owner).await.unwrap().unwrap();
        assert_eq!(guest.items.len(), 1);
        assert_eq!(guest.items[0].item.quantity.get(), 1);
    }
}
