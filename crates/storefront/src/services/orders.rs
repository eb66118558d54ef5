//! Order service.
//!
//! Turns a user's cart into an immutable order and manages its status.
//! Both checkout and cancellation run as a single unit of work; stock is
//! only ever moved relative to the stored value.

use rust_decimal::Decimal;
use tracing::instrument;

use stitchery_core::{CartOwner, OrderId, OrderStatus, SessionId, Transition, UserId};

use super::{CartService, CommerceError};
use crate::db::{RepositoryError, Store};
use crate::models::{NewOrder, OrderDetails, OrderStats, Product};

/// Order operations for one storage backend.
pub struct OrderService<'a> {
    store: &'a dyn Store,
}

impl<'a> OrderService<'a> {
    /// Create a new order service.
    #[must_use]
    pub const fn new(store: &'a dyn Store) -> Self {
        Self { store }
    }

    /// Place an order for everything in the user's cart.
    ///
    /// When `session_id` is given the guest cart is merged in first. The
    /// cart lines and their products are then read and locked inside one
    /// unit of work, so prices and availability are current. Order, lines,
    /// stock decrements and removal of the ordered cart lines commit
    /// together. Lines added to the cart while this runs are left in place.
    ///
    /// # Errors
    ///
    /// - `CommerceError::EmptyCart` if the cart has no lines
    /// - `CommerceError::ProductUnavailable` if a product is missing or was
    ///   deactivated
    /// - `CommerceError::InsufficientStock` if a line exceeds current stock;
    ///   nothing is written
    #[instrument(skip(self, session_id))]
    pub async fn create_order(
        &self,
        user_id: UserId,
        session_id: Option<SessionId>,
    ) -> Result<OrderDetails, CommerceError> {
        if let Some(session_id) = session_id {
            CartService::new(self.store)
                .merge_guest_cart(user_id, session_id)
                .await?;
        }

        // Early returns drop the unit of work, which rolls it back
        let mut uow = self.store.begin().await?;
        let cart = uow
            .find_cart(&CartOwner::User(user_id))
            .await?
            .ok_or(CommerceError::EmptyCart)?;
        let mut items = uow.cart_items(cart.id).await?;
        if items.is_empty() {
            return Err(CommerceError::EmptyCart);
        }
        // One lock order for every checkout
        items.sort_by_key(|item| item.product_id);

        let mut lines = Vec::with_capacity(items.len());
        for item in items {
            let product = uow
                .lock_product(item.product_id)
                .await?
                .filter(Product::is_purchasable)
                .ok_or(CommerceError::ProductUnavailable {
                    product_id: item.product_id,
                })?;
            lines.push((item, product));
        }

        let total_amount: Decimal = lines
            .iter()
            .map(|(item, product)| product.price.line_total(item.quantity.get()))
            .sum();

        let order = uow
            .create_order(NewOrder {
                user_id,
                total_amount,
            })
            .await?;

        for (item, product) in &lines {
            match uow.decrement_stock(product.id, item.quantity).await {
                Ok(()) => {}
                Err(RepositoryError::Conflict(_)) => {
                    uow.rollback().await?;
                    tracing::warn!(
                        %user_id,
                        product_id = %product.id,
                        "Insufficient stock at checkout, order rolled back"
                    );
                    return Err(CommerceError::InsufficientStock {
                        product_id: product.id,
                        requested: u64::from(item.quantity.get()),
                        available: i64::from(product.stock),
                    });
                }
                Err(e) => return Err(e.into()),
            }
            uow.add_order_item(order.id, product.id, item.quantity, product.price)
                .await?;
            uow.delete_cart_item(item.id).await?;
        }

        uow.commit().await?;

        tracing::info!(
            order_id = %order.id,
            %user_id,
            lines = lines.len(),
            %total_amount,
            "Order placed"
        );

        self.find_one(order.id)
            .await?
            .ok_or(CommerceError::OrderNotFound { order_id: order.id })
    }

    /// Move an order to `status`.
    ///
    /// Cancelling returns every purchased unit to stock in the same unit of
    /// work. Re-applying the current status changes nothing, so an order is
    /// never restocked twice.
    ///
    /// # Errors
    ///
    /// Returns `CommerceError::OrderNotFound` if the order does not exist,
    /// `CommerceError::InvalidStatusTransition` if the move is not allowed.
    #[instrument(skip(self))]
    pub async fn update_status(
        &self,
        order_id: OrderId,
        status: OrderStatus,
    ) -> Result<OrderDetails, CommerceError> {
        let mut uow = self.store.begin().await?;
        let order = uow
            .lock_order(order_id)
            .await?
            .ok_or(CommerceError::OrderNotFound { order_id })?;

        match order.status.transition_to(status)? {
            Transition::Unchanged => {
                uow.rollback().await?;
            }
            Transition::Advance => {
                uow.set_order_status(order_id, status).await?;
                uow.commit().await?;
                tracing::info!(
                    %order_id,
                    from = %order.status,
                    to = %status,
                    "Order status changed"
                );
            }
            Transition::Cancel => {
                let items = uow.order_items(order_id).await?;
                for item in &items {
                    uow.increment_stock(item.product_id, item.quantity).await?;
                }
                uow.set_order_status(order_id, status).await?;
                uow.commit().await?;
                tracing::info!(%order_id, restocked_lines = items.len(), "Order cancelled");
            }
        }

        self.find_one(order_id)
            .await?
            .ok_or(CommerceError::OrderNotFound { order_id })
    }

    /// A populated order, if it exists.
    ///
    /// # Errors
    ///
    /// Returns `CommerceError::Repository` if storage fails.
    pub async fn find_one(&self, order_id: OrderId) -> Result<Option<OrderDetails>, CommerceError> {
        Ok(self.store.order_details(order_id).await?)
    }

    /// The user's orders, newest first.
    ///
    /// # Errors
    ///
    /// Returns `CommerceError::Repository` if storage fails.
    pub async fn find_by_user(&self, user_id: UserId) -> Result<Vec<OrderDetails>, CommerceError> {
        Ok(self.store.list_order_details(Some(user_id)).await?)
    }

    /// Every order, newest first.
    ///
    /// # Errors
    ///
    /// Returns `CommerceError::Repository` if storage fails.
    pub async fn find_all(&self) -> Result<Vec<OrderDetails>, CommerceError> {
        Ok(self.store.list_order_details(None).await?)
    }

    /// Order counts and revenue, for one user or for the whole shop.
    ///
    /// # Errors
    ///
    /// Returns `CommerceError::Repository` if storage fails.
    pub async fn stats(&self, user_id: Option<UserId>) -> Result<OrderStats, CommerceError> {
        let totals = self.store.order_status_totals(user_id).await?;
        Ok(OrderStats::from_totals(totals))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use stitchery_core::{CartId, CartItemId, CategoryId, Email, ProductId, Quantity};

    use super::*;
    use crate::db::MemoryStore;
    use crate::models::{
        Cart, CartDetails, CartItem, Category, CategoryPatch, NewCategory, NewProduct, NewUser,
        Order, ProductFilter, ProductPatch, ProductWithCategory, StatusTotal, User, UserChanges,
    };
    use crate::services::cart::tests::{product, qty};

    async fn user(store: &MemoryStore) -> UserId {
        store
            .create_user(NewUser {
                email: Email::parse(&format!("{}@example.com", UserId::generate())).unwrap(),
                name: None,
                password_hash: "hash".to_owned(),
                is_admin: false,
            })
            .await
            .unwrap()
            .id
    }

    async fn stock(store: &MemoryStore, id: ProductId) -> i32 {
        store.get_product(id).await.unwrap().unwrap().stock
    }

    async fn add(store: &MemoryStore, user_id: UserId, product_id: ProductId, n: u32) {
        CartService::new(store)
            .add_to_cart(&CartOwner::User(user_id), product_id, qty(n))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_create_order_snapshots_cart_and_decrements_stock() {
        let store = MemoryStore::new();
        let user_id = user(&store).await;
        let a = product(&store, 1250, 10).await;
        let b = product(&store, 399, 3).await;
        add(&store, user_id, a.id, 2).await;
        add(&store, user_id, b.id, 3).await;

        let order = OrderService::new(&store)
            .create_order(user_id, None)
            .await
            .unwrap();

        assert_eq!(order.order.status, OrderStatus::Pending);
        assert_eq!(order.items.len(), 2);
        assert_eq!(order.order.total_amount, Decimal::new(3697, 2));
        let line_sum: Decimal = order.items.iter().map(|l| l.item.line_total()).sum();
        assert_eq!(line_sum, order.order.total_amount);
        assert_eq!(stock(&store, a.id).await, 8);
        assert_eq!(stock(&store, b.id).await, 0);

        let cart = CartService::new(&store)
            .get_cart(&CartOwner::User(user_id))
            .await
            .unwrap()
            .unwrap();
        assert!(cart.items.is_empty());
    }

    #[tokio::test]
    async fn test_order_prices_are_frozen() {
        let store = MemoryStore::new();
        let user_id = user(&store).await;
        let a = product(&store, 1000, 10).await;
        add(&store, user_id, a.id, 1).await;

        let service = OrderService::new(&store);
        let order = service.create_order(user_id, None).await.unwrap();

        store
            .update_product(
                a.id,
                ProductPatch {
                    price: Some(stitchery_core::Price::new(Decimal::new(9999, 2)).unwrap()),
                    ..Default::default()
                },
            )
            .await
            .unwrap();

        let reloaded = service.find_one(order.order.id).await.unwrap().unwrap();
        assert_eq!(reloaded.items[0].item.price.amount(), Decimal::new(1000, 2));
        assert_eq!(reloaded.order.total_amount, Decimal::new(1000, 2));
    }

    #[tokio::test]
    async fn test_empty_cart_is_rejected() {
        let store = MemoryStore::new();
        let user_id = user(&store).await;

        let err = OrderService::new(&store)
            .create_order(user_id, None)
            .await
            .unwrap_err();
        assert!(matches!(err, CommerceError::EmptyCart));
    }

    #[tokio::test]
    async fn test_stock_drop_after_add_fails_without_writes() {
        let store = MemoryStore::new();
        let user_id = user(&store).await;
        let a = product(&store, 1000, 5).await;
        add(&store, user_id, a.id, 4).await;
        store.adjust_stock(a.id, -3).await.unwrap();

        let err = OrderService::new(&store)
            .create_order(user_id, None)
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            CommerceError::InsufficientStock {
                requested: 4,
                available: 2,
                ..
            }
        ));
        assert_eq!(stock(&store, a.id).await, 2);
        assert!(store.list_order_details(None).await.unwrap().is_empty());
        let cart = store
            .find_cart(&CartOwner::User(user_id))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(store.cart_details(cart.id).await.unwrap().unwrap().items.len(), 1);
    }

    #[tokio::test]
    async fn test_deactivated_product_is_unavailable() {
        let store = MemoryStore::new();
        let user_id = user(&store).await;
        let a = product(&store, 1000, 5).await;
        add(&store, user_id, a.id, 1).await;
        store
            .update_product(
                a.id,
                ProductPatch {
                    is_active: Some(false),
                    ..Default::default()
                },
            )
            .await
            .unwrap();

        let err = OrderService::new(&store)
            .create_order(user_id, None)
            .await
            .unwrap_err();
        assert!(matches!(err, CommerceError::ProductUnavailable { .. }));
    }

    #[tokio::test]
    async fn test_exact_stock_then_second_order_fails() {
        let store = MemoryStore::new();
        let first = user(&store).await;
        let second = user(&store).await;
        let a = product(&store, 1000, 5).await;
        add(&store, first, a.id, 5).await;
        add(&store, second, a.id, 1).await;

        let service = OrderService::new(&store);
        service.create_order(first, None).await.unwrap();
        assert_eq!(stock(&store, a.id).await, 0);

        let err = service.create_order(second, None).await.unwrap_err();
        assert!(matches!(err, CommerceError::InsufficientStock { .. }));
        assert_eq!(stock(&store, a.id).await, 0);
    }

    #[tokio::test]
    async fn test_create_order_merges_guest_cart_first() {
        let store = MemoryStore::new();
        let user_id = user(&store).await;
        let a = product(&store, 1000, 5).await;
        let session = SessionId::parse("guest-7").unwrap();
        CartService::new(&store)
            .add_to_cart(&CartOwner::Session(session.clone()), a.id, qty(2))
            .await
            .unwrap();

        let order = OrderService::new(&store)
            .create_order(user_id, Some(session.clone()))
            .await
            .unwrap();

        assert_eq!(order.items[0].item.quantity, Quantity::new(2).unwrap());
        assert!(
            store
                .find_cart(&CartOwner::Session(session))
                .await
                .unwrap()
                .is_none()
        );
    }

    #[tokio::test]
    async fn test_cancel_restores_stock_exactly_once() {
        let store = MemoryStore::new();
        let user_id = user(&store).await;
        let a = product(&store, 1000, 5).await;
        add(&store, user_id, a.id, 3).await;
        let service = OrderService::new(&store);
        let order = service.create_order(user_id, None).await.unwrap();
        assert_eq!(stock(&store, a.id).await, 2);

        let cancelled = service
            .update_status(order.order.id, OrderStatus::Cancelled)
            .await
            .unwrap();
        assert_eq!(cancelled.order.status, OrderStatus::Cancelled);
        assert_eq!(stock(&store, a.id).await, 5);

        service
            .update_status(order.order.id, OrderStatus::Cancelled)
            .await
            .unwrap();
        assert_eq!(stock(&store, a.id).await, 5);
    }

    #[tokio::test]
    async fn test_invalid_transitions_are_rejected() {
        let store = MemoryStore::new();
        let user_id = user(&store).await;
        let a = product(&store, 1000, 5).await;
        add(&store, user_id, a.id, 1).await;
        let service = OrderService::new(&store);
        let order = service.create_order(user_id, None).await.unwrap();

        service
            .update_status(order.order.id, OrderStatus::Shipped)
            .await
            .unwrap();

        let err = service
            .update_status(order.order.id, OrderStatus::Cancelled)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            CommerceError::InvalidStatusTransition {
                from: OrderStatus::Shipped,
                to: OrderStatus::Cancelled
            }
        ));
        assert_eq!(stock(&store, a.id).await, 4);
    }

    #[tokio::test]
    async fn test_update_unknown_order_is_not_found() {
        let store = MemoryStore::new();
        let err = OrderService::new(&store)
            .update_status(OrderId::generate(), OrderStatus::Confirmed)
            .await
            .unwrap_err();
        assert!(matches!(err, CommerceError::OrderNotFound { .. }));
    }

    #[tokio::test]
    async fn test_stats_count_revenue_only_for_confirmed_onwards() {
        let store = MemoryStore::new();
        let user_id = user(&store).await;
        let a = product(&store, 1000, 50).await;
        let service = OrderService::new(&store);

        let mut ids = Vec::new();
        for n in [1, 2, 3] {
            add(&store, user_id, a.id, n).await;
            ids.push(service.create_order(user_id, None).await.unwrap().order.id);
        }
        service
            .update_status(ids[1], OrderStatus::Delivered)
            .await
            .unwrap();
        service
            .update_status(ids[2], OrderStatus::Cancelled)
            .await
            .unwrap();

        let stats = service.stats(Some(user_id)).await.unwrap();
        assert_eq!(stats.total_orders, 3);
        assert_eq!(stats.total_revenue, Decimal::new(2000, 2));
        assert_eq!(stats.status_breakdown[&OrderStatus::Pending].count, 1);

        let mine = service.find_by_user(user_id).await.unwrap();
        assert_eq!(mine.len(), 3);
        assert_eq!(mine[0].order.id, ids[2]);
    }

    #[tokio::test]
    async fn test_failed_later_line_rolls_back_earlier_decrements() {
        let store = MemoryStore::new();
        let user_id = user(&store).await;
        let a = product(&store, 1000, 10).await;
        let b = product(&store, 500, 10).await;
        // Lines are decremented in product-id order; starve the last one
        let (first, last) = if a.id < b.id { (a, b) } else { (b, a) };
        add(&store, user_id, first.id, 2).await;
        add(&store, user_id, last.id, 3).await;
        store.adjust_stock(last.id, -8).await.unwrap();

        let err = OrderService::new(&store)
            .create_order(user_id, None)
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            CommerceError::InsufficientStock {
                requested: 3,
                available: 2,
                ..
            }
        ));
        if let CommerceError::InsufficientStock { product_id, .. } = err {
            assert_eq!(product_id, last.id);
        }
        assert_eq!(stock(&store, first.id).await, 10);
        assert_eq!(stock(&store, last.id).await, 2);
        assert!(store.list_order_details(None).await.unwrap().is_empty());
        let cart = store
            .find_cart(&CartOwner::User(user_id))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(store.cart_details(cart.id).await.unwrap().unwrap().items.len(), 2);
    }

    /// Adds a cart line through the inner store right before each unit of
    /// work starts, the way a second request could between reads.
    struct LateLineStore {
        inner: MemoryStore,
        owner: CartOwner,
        product_id: ProductId,
    }

    #[async_trait::async_trait]
    impl Store for LateLineStore {
        async fn ping(&self) -> Result<(), RepositoryError> {
            self.inner.ping().await
        }
        async fn begin(&self) -> Result<Box<dyn crate::db::UnitOfWork>, RepositoryError> {
            let cart = self.inner.get_or_create_cart(&self.owner).await?;
            if self.inner.find_cart_item(cart.id, self.product_id).await?.is_none() {
                self.inner
                    .insert_cart_item(cart.id, self.product_id, Quantity::new(1).unwrap())
                    .await?;
            }
            self.inner.begin().await
        }
        async fn create_user(&self, user: NewUser) -> Result<User, RepositoryError> {
            self.inner.create_user(user).await
        }
        async fn get_user(&self, id: UserId) -> Result<Option<User>, RepositoryError> {
            self.inner.get_user(id).await
        }
        async fn get_user_by_email(&self, email: &Email) -> Result<Option<User>, RepositoryError> {
            self.inner.get_user_by_email(email).await
        }
        async fn get_password_hash(
            &self,
            email: &Email,
        ) -> Result<Option<(User, String)>, RepositoryError> {
            self.inner.get_password_hash(email).await
        }
        async fn list_users(&self) -> Result<Vec<User>, RepositoryError> {
            self.inner.list_users().await
        }
        async fn update_user(
            &self,
            id: UserId,
            changes: UserChanges,
        ) -> Result<User, RepositoryError> {
            self.inner.update_user(id, changes).await
        }
        async fn delete_user(&self, id: UserId) -> Result<bool, RepositoryError> {
            self.inner.delete_user(id).await
        }
        async fn create_category(
            &self,
            category: NewCategory,
        ) -> Result<Category, RepositoryError> {
            self.inner.create_category(category).await
        }
        async fn get_category(&self, id: CategoryId) -> Result<Option<Category>, RepositoryError> {
            self.inner.get_category(id).await
        }
        async fn list_categories(&self) -> Result<Vec<Category>, RepositoryError> {
            self.inner.list_categories().await
        }
        async fn count_category_products(&self, id: CategoryId) -> Result<i64, RepositoryError> {
            self.inner.count_category_products(id).await
        }
        async fn update_category(
            &self,
            id: CategoryId,
            patch: CategoryPatch,
        ) -> Result<Category, RepositoryError> {
            self.inner.update_category(id, patch).await
        }
        async fn delete_category(&self, id: CategoryId) -> Result<bool, RepositoryError> {
            self.inner.delete_category(id).await
        }
        async fn create_product(&self, product: NewProduct) -> Result<Product, RepositoryError> {
            self.inner.create_product(product).await
        }
        async fn get_product(&self, id: ProductId) -> Result<Option<Product>, RepositoryError> {
            self.inner.get_product(id).await
        }
        async fn get_product_with_category(
            &self,
            id: ProductId,
        ) -> Result<Option<ProductWithCategory>, RepositoryError> {
            self.inner.get_product_with_category(id).await
        }
        async fn search_products(
            &self,
            filter: &ProductFilter,
            offset: i64,
            limit: i64,
        ) -> Result<(Vec<ProductWithCategory>, i64), RepositoryError> {
            self.inner.search_products(filter, offset, limit).await
        }
        async fn update_product(
            &self,
            id: ProductId,
            patch: ProductPatch,
        ) -> Result<Product, RepositoryError> {
            self.inner.update_product(id, patch).await
        }
        async fn product_is_referenced(&self, id: ProductId) -> Result<bool, RepositoryError> {
            self.inner.product_is_referenced(id).await
        }
        async fn delete_product(&self, id: ProductId) -> Result<bool, RepositoryError> {
            self.inner.delete_product(id).await
        }
        async fn adjust_stock(
            &self,
            id: ProductId,
            delta: i32,
        ) -> Result<Product, RepositoryError> {
            self.inner.adjust_stock(id, delta).await
        }
        async fn find_cart(&self, owner: &CartOwner) -> Result<Option<Cart>, RepositoryError> {
            self.inner.find_cart(owner).await
        }
        async fn get_or_create_cart(&self, owner: &CartOwner) -> Result<Cart, RepositoryError> {
            self.inner.get_or_create_cart(owner).await
        }
        async fn cart_details(&self, id: CartId) -> Result<Option<CartDetails>, RepositoryError> {
            self.inner.cart_details(id).await
        }
        async fn find_cart_item(
            &self,
            cart_id: CartId,
            product_id: ProductId,
        ) -> Result<Option<CartItem>, RepositoryError> {
            self.inner.find_cart_item(cart_id, product_id).await
        }
        async fn get_cart_item(
            &self,
            id: CartItemId,
        ) -> Result<Option<(CartItem, Cart)>, RepositoryError> {
            self.inner.get_cart_item(id).await
        }
        async fn insert_cart_item(
            &self,
            cart_id: CartId,
            product_id: ProductId,
            quantity: Quantity,
        ) -> Result<CartItem, RepositoryError> {
            self.inner
                .insert_cart_item(cart_id, product_id, quantity)
                .await
        }
        async fn set_cart_item_quantity(
            &self,
            id: CartItemId,
            quantity: Quantity,
        ) -> Result<(), RepositoryError> {
            self.inner.set_cart_item_quantity(id, quantity).await
        }
        async fn delete_cart_item(&self, id: CartItemId) -> Result<bool, RepositoryError> {
            self.inner.delete_cart_item(id).await
        }
        async fn clear_cart(&self, id: CartId) -> Result<u64, RepositoryError> {
            self.inner.clear_cart(id).await
        }
        async fn get_order(&self, id: OrderId) -> Result<Option<Order>, RepositoryError> {
            self.inner.get_order(id).await
        }
        async fn order_details(
            &self,
            id: OrderId,
        ) -> Result<Option<OrderDetails>, RepositoryError> {
            self.inner.order_details(id).await
        }
        async fn list_order_details(
            &self,
            user_id: Option<UserId>,
        ) -> Result<Vec<OrderDetails>, RepositoryError> {
            self.inner.list_order_details(user_id).await
        }
        async fn order_status_totals(
            &self,
            user_id: Option<UserId>,
        ) -> Result<Vec<StatusTotal>, RepositoryError> {
            self.inner.order_status_totals(user_id).await
        }
    }

    #[tokio::test]
    async fn test_line_added_before_checkout_is_ordered_not_dropped() {
        let inner = MemoryStore::new();
        let user_id = user(&inner).await;
        let a = product(&inner, 1000, 10).await;
        let late = product(&inner, 250, 10).await;
        add(&inner, user_id, a.id, 2).await;

        let store = LateLineStore {
            inner: inner.clone(),
            owner: CartOwner::User(user_id),
            product_id: late.id,
        };
        let order = OrderService::new(&store)
            .create_order(user_id, None)
            .await
            .unwrap();

        assert_eq!(order.items.len(), 2);
        assert!(order.items.iter().any(|l| l.item.product_id == late.id));
        assert_eq!(order.order.total_amount, Decimal::new(2250, 2));
        assert_eq!(stock(&inner, a.id).await, 8);
        assert_eq!(stock(&inner, late.id).await, 9);
        let cart = inner
            .find_cart(&CartOwner::User(user_id))
            .await
            .unwrap()
            .unwrap();
        assert!(inner.cart_details(cart.id).await.unwrap().unwrap().items.is_empty());
    }
}
