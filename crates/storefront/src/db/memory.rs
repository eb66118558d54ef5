//! In-memory [`Store`] implementation.
//!
//! All data lives in one [`MemoryState`] behind a `tokio` mutex. Plain store
//! calls lock it for the duration of a single operation. A unit of work
//! holds the lock for its whole lifetime and writes into a staged copy that
//! replaces the shared state only on commit, so units of work are
//! serialized and a dropped one leaves no trace.
//!
//! Because an open unit of work holds the lock, callers must not use the
//! store itself until the unit of work is committed or rolled back.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use tokio::sync::{Mutex, OwnedMutexGuard};

use stitchery_core::{
    CartId, CartItemId, CartOwner, CategoryId, Email, OrderId, OrderItemId, OrderStatus, Price,
    ProductId, Quantity, UserId,
};

use super::{RepositoryError, Store, UnitOfWork};
use crate::models::{
    Cart, CartDetails, CartItem, CartLine, Category, CategoryPatch, NewCategory, NewOrder,
    NewProduct, NewUser, Order, OrderDetails, OrderItem, OrderLine, Product, ProductFilter,
    ProductPatch, ProductWithCategory, StatusTotal, User, UserChanges, UserSummary,
};

/// In-process store for tests and demos.
#[derive(Clone, Default)]
pub struct MemoryStore {
    state: Arc<Mutex<MemoryState>>,
}

impl MemoryStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

/// Everything the memory store holds.
#[derive(Debug, Clone, Default)]
struct MemoryState {
    users: HashMap<UserId, (User, String)>,
    categories: HashMap<CategoryId, Category>,
    products: HashMap<ProductId, Product>,
    carts: HashMap<CartId, Cart>,
    cart_items: HashMap<CartItemId, CartItem>,
    orders: HashMap<OrderId, Order>,
    order_items: HashMap<OrderItemId, OrderItem>,
    /// Last timestamp handed out; keeps `created_at` strictly increasing.
    clock: Option<DateTime<Utc>>,
}

impl MemoryState {
    fn now(&mut self) -> DateTime<Utc> {
        let now = Utc::now();
        let next = match self.clock {
            Some(last) if now <= last => last + Duration::microseconds(1),
            _ => now,
        };
        self.clock = Some(next);
        next
    }

    // =========================================================================
    // Users
    // =========================================================================

    fn email_taken(&self, email: &Email, except: Option<UserId>) -> bool {
        self.users
            .values()
            .any(|(user, _)| &user.email == email && Some(user.id) != except)
    }

    fn create_user(&mut self, new: NewUser) -> Result<User, RepositoryError> {
        if self.email_taken(&new.email, None) {
            return Err(RepositoryError::Conflict("email already exists".to_owned()));
        }
        let now = self.now();
        let user = User {
            id: UserId::generate(),
            email: new.email,
            name: new.name,
            is_admin: new.is_admin,
            created_at: now,
            updated_at: now,
        };
        self.users.insert(user.id, (user.clone(), new.password_hash));
        Ok(user)
    }

    fn user_by_email(&self, email: &Email) -> Option<&(User, String)> {
        self.users.values().find(|(user, _)| &user.email == email)
    }

    fn update_user(&mut self, id: UserId, changes: UserChanges) -> Result<User, RepositoryError> {
        if let Some(email) = &changes.email
            && self.email_taken(email, Some(id))
        {
            return Err(RepositoryError::Conflict("email already exists".to_owned()));
        }
        let now = self.now();
        let (user, hash) = self.users.get_mut(&id).ok_or(RepositoryError::NotFound)?;
        if let Some(email) = changes.email {
            user.email = email;
        }
        if let Some(name) = changes.name {
            user.name = Some(name);
        }
        if let Some(password_hash) = changes.password_hash {
            *hash = password_hash;
        }
        user.updated_at = now;
        Ok(user.clone())
    }

    fn delete_user(&mut self, id: UserId) -> Result<bool, RepositoryError> {
        if self.orders.values().any(|order| order.user_id == id) {
            return Err(RepositoryError::Conflict("user has orders".to_owned()));
        }
        if self.users.remove(&id).is_none() {
            return Ok(false);
        }
        let carts: Vec<CartId> = self
            .carts
            .values()
            .filter(|cart| cart.user_id == Some(id))
            .map(|cart| cart.id)
            .collect();
        for cart_id in carts {
            self.remove_cart(cart_id);
        }
        Ok(true)
    }

    // =========================================================================
    // Categories
    // =========================================================================

    fn category_name_taken(&self, name: &str, except: Option<CategoryId>) -> bool {
        self.categories
            .values()
            .any(|c| c.name == name && Some(c.id) != except)
    }

    fn create_category(&mut self, new: NewCategory) -> Result<Category, RepositoryError> {
        if self.category_name_taken(&new.name, None) {
            return Err(RepositoryError::Conflict("category already exists".to_owned()));
        }
        let now = self.now();
        let category = Category {
            id: CategoryId::generate(),
            name: new.name,
            description: new.description,
            created_at: now,
            updated_at: now,
        };
        self.categories.insert(category.id, category.clone());
        Ok(category)
    }

    fn update_category(
        &mut self,
        id: CategoryId,
        patch: CategoryPatch,
    ) -> Result<Category, RepositoryError> {
        if let Some(name) = &patch.name
            && self.category_name_taken(name, Some(id))
        {
            return Err(RepositoryError::Conflict("category already exists".to_owned()));
        }
        let now = self.now();
        let category = self
            .categories
            .get_mut(&id)
            .ok_or(RepositoryError::NotFound)?;
        if let Some(name) = patch.name {
            category.name = name;
        }
        if let Some(description) = patch.description {
            category.description = Some(description);
        }
        category.updated_at = now;
        Ok(category.clone())
    }

    fn count_category_products(&self, id: CategoryId) -> i64 {
        let count = self
            .products
            .values()
            .filter(|p| p.category_id == id)
            .count();
        i64::try_from(count).unwrap_or(i64::MAX)
    }

    fn delete_category(&mut self, id: CategoryId) -> Result<bool, RepositoryError> {
        if self.count_category_products(id) > 0 {
            return Err(RepositoryError::Conflict("category has products".to_owned()));
        }
        Ok(self.categories.remove(&id).is_some())
    }

    // =========================================================================
    // Products
    // =========================================================================

    fn create_product(&mut self, new: NewProduct) -> Result<Product, RepositoryError> {
        if !self.categories.contains_key(&new.category_id) {
            return Err(RepositoryError::NotFound);
        }
        let now = self.now();
        let product = Product {
            id: ProductId::generate(),
            name: new.name,
            description: new.description,
            price: new.price,
            image_url: new.image_url,
            stock: new.stock,
            is_active: new.is_active,
            category_id: new.category_id,
            created_at: now,
            updated_at: now,
        };
        self.products.insert(product.id, product.clone());
        Ok(product)
    }

    fn with_category(&self, product: &Product) -> Result<ProductWithCategory, RepositoryError> {
        let category = self
            .categories
            .get(&product.category_id)
            .ok_or_else(|| {
                RepositoryError::DataCorruption(format!(
                    "product {} references missing category {}",
                    product.id, product.category_id
                ))
            })?;
        Ok(ProductWithCategory {
            product: product.clone(),
            category: category.clone(),
        })
    }

    fn product_with_category(
        &self,
        id: ProductId,
    ) -> Result<ProductWithCategory, RepositoryError> {
        let product = self.products.get(&id).ok_or_else(|| {
            RepositoryError::DataCorruption(format!("line references missing product {id}"))
        })?;
        self.with_category(product)
    }

    fn search_products(
        &self,
        filter: &ProductFilter,
        offset: i64,
        limit: i64,
    ) -> Result<(Vec<ProductWithCategory>, i64), RepositoryError> {
        let mut matches: Vec<&Product> = self
            .products
            .values()
            .filter(|p| filter.matches(p))
            .collect();
        matches.sort_by(|a, b| b.created_at.cmp(&a.created_at));

        let total = i64::try_from(matches.len()).unwrap_or(i64::MAX);
        let offset = usize::try_from(offset).unwrap_or(0);
        let limit = usize::try_from(limit).unwrap_or(0);

        let page = matches
            .into_iter()
            .skip(offset)
            .take(limit)
            .map(|p| self.with_category(p))
            .collect::<Result<Vec<_>, _>>()?;
        Ok((page, total))
    }

    fn update_product(
        &mut self,
        id: ProductId,
        patch: ProductPatch,
    ) -> Result<Product, RepositoryError> {
        if let Some(category_id) = patch.category_id
            && !self.categories.contains_key(&category_id)
        {
            return Err(RepositoryError::NotFound);
        }
        let now = self.now();
        let product = self.products.get_mut(&id).ok_or(RepositoryError::NotFound)?;
        if let Some(name) = patch.name {
            product.name = name;
        }
        if let Some(description) = patch.description {
            product.description = Some(description);
        }
        if let Some(price) = patch.price {
            product.price = price;
        }
        if let Some(image_url) = patch.image_url {
            product.image_url = Some(image_url);
        }
        if let Some(is_active) = patch.is_active {
            product.is_active = is_active;
        }
        if let Some(category_id) = patch.category_id {
            product.category_id = category_id;
        }
        product.updated_at = now;
        Ok(product.clone())
    }

    fn product_is_referenced(&self, id: ProductId) -> bool {
        self.cart_items.values().any(|item| item.product_id == id)
            || self.order_items.values().any(|item| item.product_id == id)
    }

    fn adjust_stock(&mut self, id: ProductId, delta: i32) -> Result<Product, RepositoryError> {
        let now = self.now();
        let product = self.products.get_mut(&id).ok_or(RepositoryError::NotFound)?;
        let stock = product
            .stock
            .checked_add(delta)
            .filter(|stock| *stock >= 0)
            .ok_or_else(|| {
                RepositoryError::Conflict(format!("stock for product {id} cannot go below zero"))
            })?;
        product.stock = stock;
        product.updated_at = now;
        Ok(product.clone())
    }

    fn decrement_stock(
        &mut self,
        id: ProductId,
        quantity: Quantity,
    ) -> Result<(), RepositoryError> {
        let now = self.now();
        let product = self.products.get_mut(&id).ok_or(RepositoryError::NotFound)?;
        if !quantity.fits_within(product.stock) {
            return Err(RepositoryError::Conflict(format!(
                "insufficient stock for product {id}"
            )));
        }
        product.stock -= quantity.as_i32();
        product.updated_at = now;
        Ok(())
    }

    fn increment_stock(
        &mut self,
        id: ProductId,
        quantity: Quantity,
    ) -> Result<(), RepositoryError> {
        let now = self.now();
        let product = self.products.get_mut(&id).ok_or(RepositoryError::NotFound)?;
        product.stock = product
            .stock
            .checked_add(quantity.as_i32())
            .ok_or_else(|| RepositoryError::Conflict(format!("stock overflow for product {id}")))?;
        product.updated_at = now;
        Ok(())
    }

    // =========================================================================
    // Carts
    // =========================================================================

    fn find_cart(&self, owner: &CartOwner) -> Option<Cart> {
        self.carts.values().find(|c| c.is_owned_by(owner)).cloned()
    }

    fn get_or_create_cart(&mut self, owner: &CartOwner) -> Cart {
        if let Some(cart) = self.find_cart(owner) {
            return cart;
        }
        let mut cart = Cart::new(owner);
        let now = self.now();
        cart.created_at = now;
        cart.updated_at = now;
        self.carts.insert(cart.id, cart.clone());
        cart
    }

    fn cart_items(&self, cart_id: CartId) -> Vec<CartItem> {
        let mut items: Vec<CartItem> = self
            .cart_items
            .values()
            .filter(|item| item.cart_id == cart_id)
            .cloned()
            .collect();
        items.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        items
    }

    fn cart_details(&self, id: CartId) -> Result<Option<CartDetails>, RepositoryError> {
        let Some(cart) = self.carts.get(&id) else {
            return Ok(None);
        };
        let items = self
            .cart_items(id)
            .into_iter()
            .map(|item| {
                let product = self.product_with_category(item.product_id)?;
                Ok(CartLine { item, product })
            })
            .collect::<Result<Vec<_>, RepositoryError>>()?;
        Ok(Some(CartDetails {
            cart: cart.clone(),
            items,
        }))
    }

    fn find_cart_item(&self, cart_id: CartId, product_id: ProductId) -> Option<CartItem> {
        self.cart_items
            .values()
            .find(|item| item.cart_id == cart_id && item.product_id == product_id)
            .cloned()
    }

    fn insert_cart_item(
        &mut self,
        cart_id: CartId,
        product_id: ProductId,
        quantity: Quantity,
    ) -> Result<CartItem, RepositoryError> {
        if !self.carts.contains_key(&cart_id) || !self.products.contains_key(&product_id) {
            return Err(RepositoryError::NotFound);
        }
        if self.find_cart_item(cart_id, product_id).is_some() {
            return Err(RepositoryError::Conflict("cart line already exists".to_owned()));
        }
        let now = self.now();
        let item = CartItem {
            id: CartItemId::generate(),
            cart_id,
            product_id,
            quantity,
            created_at: now,
            updated_at: now,
        };
        self.cart_items.insert(item.id, item.clone());
        Ok(item)
    }

    fn set_cart_item_quantity(
        &mut self,
        id: CartItemId,
        quantity: Quantity,
    ) -> Result<(), RepositoryError> {
        let now = self.now();
        let item = self.cart_items.get_mut(&id).ok_or(RepositoryError::NotFound)?;
        item.quantity = quantity;
        item.updated_at = now;
        Ok(())
    }

    fn merge_cart_item(
        &mut self,
        cart_id: CartId,
        product_id: ProductId,
        quantity: Quantity,
    ) -> Result<(), RepositoryError> {
        match self.find_cart_item(cart_id, product_id) {
            Some(existing) => {
                let merged = existing
                    .quantity
                    .checked_add(quantity)
                    .map_err(|e| RepositoryError::Conflict(e.to_string()))?;
                self.set_cart_item_quantity(existing.id, merged)
            }
            None => self
                .insert_cart_item(cart_id, product_id, quantity)
                .map(|_| ()),
        }
    }

    fn clear_cart(&mut self, cart_id: CartId) -> u64 {
        let before = self.cart_items.len();
        self.cart_items.retain(|_, item| item.cart_id != cart_id);
        (before - self.cart_items.len()) as u64
    }

    fn remove_cart(&mut self, cart_id: CartId) {
        self.clear_cart(cart_id);
        self.carts.remove(&cart_id);
    }

    // =========================================================================
    // Orders
    // =========================================================================

    fn create_order(&mut self, new: NewOrder) -> Result<Order, RepositoryError> {
        if !self.users.contains_key(&new.user_id) {
            return Err(RepositoryError::NotFound);
        }
        let now = self.now();
        let order = Order {
            id: OrderId::generate(),
            user_id: new.user_id,
            status: OrderStatus::Pending,
            total_amount: new.total_amount,
            created_at: now,
            updated_at: now,
        };
        self.orders.insert(order.id, order.clone());
        Ok(order)
    }

    fn add_order_item(
        &mut self,
        order_id: OrderId,
        product_id: ProductId,
        quantity: Quantity,
        price: Price,
    ) -> Result<OrderItem, RepositoryError> {
        if !self.orders.contains_key(&order_id) || !self.products.contains_key(&product_id) {
            return Err(RepositoryError::NotFound);
        }
        let now = self.now();
        let item = OrderItem {
            id: OrderItemId::generate(),
            order_id,
            product_id,
            quantity,
            price,
            created_at: now,
        };
        self.order_items.insert(item.id, item.clone());
        Ok(item)
    }

    fn order_items(&self, order_id: OrderId) -> Vec<OrderItem> {
        let mut items: Vec<OrderItem> = self
            .order_items
            .values()
            .filter(|item| item.order_id == order_id)
            .cloned()
            .collect();
        items.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        items
    }

    fn set_order_status(
        &mut self,
        id: OrderId,
        status: OrderStatus,
    ) -> Result<(), RepositoryError> {
        let now = self.now();
        let order = self.orders.get_mut(&id).ok_or(RepositoryError::NotFound)?;
        order.status = status;
        order.updated_at = now;
        Ok(())
    }

    fn populate_order(&self, order: &Order) -> Result<OrderDetails, RepositoryError> {
        let (user, _) = self.users.get(&order.user_id).ok_or_else(|| {
            RepositoryError::DataCorruption(format!(
                "order {} references missing user {}",
                order.id, order.user_id
            ))
        })?;
        let items = self
            .order_items(order.id)
            .into_iter()
            .map(|item| {
                let product = self.product_with_category(item.product_id)?;
                Ok(OrderLine { item, product })
            })
            .collect::<Result<Vec<_>, RepositoryError>>()?;
        Ok(OrderDetails {
            order: order.clone(),
            user: UserSummary::from(user),
            items,
        })
    }

    fn list_order_details(
        &self,
        user_id: Option<UserId>,
    ) -> Result<Vec<OrderDetails>, RepositoryError> {
        let mut orders: Vec<&Order> = self
            .orders
            .values()
            .filter(|order| user_id.is_none_or(|id| order.user_id == id))
            .collect();
        orders.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        orders.into_iter().map(|o| self.populate_order(o)).collect()
    }

    fn order_status_totals(&self, user_id: Option<UserId>) -> Vec<StatusTotal> {
        let mut totals: Vec<StatusTotal> = Vec::new();
        for order in self
            .orders
            .values()
            .filter(|order| user_id.is_none_or(|id| order.user_id == id))
        {
            match totals.iter_mut().find(|t| t.status == order.status) {
                Some(total) => {
                    total.count += 1;
                    total.revenue += order.total_amount;
                }
                None => totals.push(StatusTotal {
                    status: order.status,
                    count: 1,
                    revenue: order.total_amount,
                }),
            }
        }
        totals.sort_by_key(|t| t.status);
        totals
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn ping(&self) -> Result<(), RepositoryError> {
        Ok(())
    }

    async fn begin(&self) -> Result<Box<dyn UnitOfWork>, RepositoryError> {
        let guard = Arc::clone(&self.state).lock_owned().await;
        let staged = guard.clone();
        Ok(Box::new(MemoryUnitOfWork { guard, staged }))
    }

    async fn create_user(&self, user: NewUser) -> Result<User, RepositoryError> {
        self.state.lock().await.create_user(user)
    }

    async fn get_user(&self, id: UserId) -> Result<Option<User>, RepositoryError> {
        Ok(self.state.lock().await.users.get(&id).map(|(u, _)| u.clone()))
    }

    async fn get_user_by_email(&self, email: &Email) -> Result<Option<User>, RepositoryError> {
        Ok(self
            .state
            .lock()
            .await
            .user_by_email(email)
            .map(|(u, _)| u.clone()))
    }

    async fn get_password_hash(
        &self,
        email: &Email,
    ) -> Result<Option<(User, String)>, RepositoryError> {
        Ok(self.state.lock().await.user_by_email(email).cloned())
    }

    async fn list_users(&self) -> Result<Vec<User>, RepositoryError> {
        let state = self.state.lock().await;
        let mut users: Vec<User> = state.users.values().map(|(u, _)| u.clone()).collect();
        users.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        Ok(users)
    }

    async fn update_user(
        &self,
        id: UserId,
        changes: UserChanges,
    ) -> Result<User, RepositoryError> {
        self.state.lock().await.update_user(id, changes)
    }

    async fn delete_user(&self, id: UserId) -> Result<bool, RepositoryError> {
        self.state.lock().await.delete_user(id)
    }

    async fn create_category(&self, category: NewCategory) -> Result<Category, RepositoryError> {
        self.state.lock().await.create_category(category)
    }

    async fn get_category(&self, id: CategoryId) -> Result<Option<Category>, RepositoryError> {
        Ok(self.state.lock().await.categories.get(&id).cloned())
    }

    async fn list_categories(&self) -> Result<Vec<Category>, RepositoryError> {
        let state = self.state.lock().await;
        let mut categories: Vec<Category> = state.categories.values().cloned().collect();
        categories.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(categories)
    }

    async fn count_category_products(&self, id: CategoryId) -> Result<i64, RepositoryError> {
        Ok(self.state.lock().await.count_category_products(id))
    }

    async fn update_category(
        &self,
        id: CategoryId,
        patch: CategoryPatch,
    ) -> Result<Category, RepositoryError> {
        self.state.lock().await.update_category(id, patch)
    }

    async fn delete_category(&self, id: CategoryId) -> Result<bool, RepositoryError> {
        self.state.lock().await.delete_category(id)
    }

    async fn create_product(&self, product: NewProduct) -> Result<Product, RepositoryError> {
        self.state.lock().await.create_product(product)
    }

    async fn get_product(&self, id: ProductId) -> Result<Option<Product>, RepositoryError> {
        Ok(self.state.lock().await.products.get(&id).cloned())
    }

    async fn get_product_with_category(
        &self,
        id: ProductId,
    ) -> Result<Option<ProductWithCategory>, RepositoryError> {
        let state = self.state.lock().await;
        state
            .products
            .get(&id)
            .map(|p| state.with_category(p))
            .transpose()
    }

    async fn search_products(
        &self,
        filter: &ProductFilter,
        offset: i64,
        limit: i64,
    ) -> Result<(Vec<ProductWithCategory>, i64), RepositoryError> {
        self.state
            .lock()
            .await
            .search_products(filter, offset, limit)
    }

    async fn update_product(
        &self,
        id: ProductId,
        patch: ProductPatch,
    ) -> Result<Product, RepositoryError> {
        self.state.lock().await.update_product(id, patch)
    }

    async fn product_is_referenced(&self, id: ProductId) -> Result<bool, RepositoryError> {
        Ok(self.state.lock().await.product_is_referenced(id))
    }

    async fn delete_product(&self, id: ProductId) -> Result<bool, RepositoryError> {
        let mut state = self.state.lock().await;
        if state.product_is_referenced(id) {
            return Err(RepositoryError::Conflict("product is referenced".to_owned()));
        }
        Ok(state.products.remove(&id).is_some())
    }

    async fn adjust_stock(&self, id: ProductId, delta: i32) -> Result<Product, RepositoryError> {
        self.state.lock().await.adjust_stock(id, delta)
    }

    async fn find_cart(&self, owner: &CartOwner) -> Result<Option<Cart>, RepositoryError> {
        Ok(self.state.lock().await.find_cart(owner))
    }

    async fn get_or_create_cart(&self, owner: &CartOwner) -> Result<Cart, RepositoryError> {
        Ok(self.state.lock().await.get_or_create_cart(owner))
    }

    async fn cart_details(&self, id: CartId) -> Result<Option<CartDetails>, RepositoryError> {
        self.state.lock().await.cart_details(id)
    }

    async fn find_cart_item(
        &self,
        cart_id: CartId,
        product_id: ProductId,
    ) -> Result<Option<CartItem>, RepositoryError> {
        Ok(self.state.lock().await.find_cart_item(cart_id, product_id))
    }

    async fn get_cart_item(
        &self,
        id: CartItemId,
    ) -> Result<Option<(CartItem, Cart)>, RepositoryError> {
        let state = self.state.lock().await;
        let Some(item) = state.cart_items.get(&id) else {
            return Ok(None);
        };
        let cart = state.carts.get(&item.cart_id).ok_or_else(|| {
            RepositoryError::DataCorruption(format!("cart item {id} has no cart"))
        })?;
        Ok(Some((item.clone(), cart.clone())))
    }

    async fn insert_cart_item(
        &self,
        cart_id: CartId,
        product_id: ProductId,
        quantity: Quantity,
    ) -> Result<CartItem, RepositoryError> {
        self.state
            .lock()
            .await
            .insert_cart_item(cart_id, product_id, quantity)
    }

    async fn set_cart_item_quantity(
        &self,
        id: CartItemId,
        quantity: Quantity,
    ) -> Result<(), RepositoryError> {
        self.state.lock().await.set_cart_item_quantity(id, quantity)
    }

    async fn delete_cart_item(&self, id: CartItemId) -> Result<bool, RepositoryError> {
        Ok(self.state.lock().await.cart_items.remove(&id).is_some())
    }

    async fn clear_cart(&self, id: CartId) -> Result<u64, RepositoryError> {
        Ok(self.state.lock().await.clear_cart(id))
    }

    async fn get_order(&self, id: OrderId) -> Result<Option<Order>, RepositoryError> {
        Ok(self.state.lock().await.orders.get(&id).cloned())
    }

    async fn order_details(&self, id: OrderId) -> Result<Option<OrderDetails>, RepositoryError> {
        let state = self.state.lock().await;
        state
            .orders
            .get(&id)
            .map(|order| state.populate_order(order))
            .transpose()
    }

    async fn list_order_details(
        &self,
        user_id: Option<UserId>,
    ) -> Result<Vec<OrderDetails>, RepositoryError> {
        self.state.lock().await.list_order_details(user_id)
    }

    async fn order_status_totals(
        &self,
        user_id: Option<UserId>,
    ) -> Result<Vec<StatusTotal>, RepositoryError> {
        Ok(self.state.lock().await.order_status_totals(user_id))
    }
}

/// Unit of work over a staged copy of the memory state.
struct MemoryUnitOfWork {
    guard: OwnedMutexGuard<MemoryState>,
    staged: MemoryState,
}

#[async_trait]
impl UnitOfWork for MemoryUnitOfWork {
    async fn find_cart(&mut self, owner: &CartOwner) -> Result<Option<Cart>, RepositoryError> {
        Ok(self.staged.find_cart(owner))
    }

    async fn get_or_create_cart(&mut self, owner: &CartOwner) -> Result<Cart, RepositoryError> {
        Ok(self.staged.get_or_create_cart(owner))
    }

    async fn cart_items(&mut self, cart_id: CartId) -> Result<Vec<CartItem>, RepositoryError> {
        Ok(self.staged.cart_items(cart_id))
    }

    async fn merge_cart_item(
        &mut self,
        cart_id: CartId,
        product_id: ProductId,
        quantity: Quantity,
    ) -> Result<(), RepositoryError> {
        self.staged.merge_cart_item(cart_id, product_id, quantity)
    }

    async fn delete_cart_item(&mut self, id: CartItemId) -> Result<bool, RepositoryError> {
        Ok(self.staged.cart_items.remove(&id).is_some())
    }

    async fn delete_cart(&mut self, cart_id: CartId) -> Result<(), RepositoryError> {
        self.staged.remove_cart(cart_id);
        Ok(())
    }

    async fn create_order(&mut self, order: NewOrder) -> Result<Order, RepositoryError> {
        self.staged.create_order(order)
    }

    async fn add_order_item(
        &mut self,
        order_id: OrderId,
        product_id: ProductId,
        quantity: Quantity,
        price: Price,
    ) -> Result<OrderItem, RepositoryError> {
        self.staged
            .add_order_item(order_id, product_id, quantity, price)
    }

    async fn lock_order(&mut self, id: OrderId) -> Result<Option<Order>, RepositoryError> {
        // The whole state is already locked
        Ok(self.staged.orders.get(&id).cloned())
    }

    async fn order_items(&mut self, order_id: OrderId) -> Result<Vec<OrderItem>, RepositoryError> {
        Ok(self.staged.order_items(order_id))
    }

    async fn set_order_status(
        &mut self,
        id: OrderId,
        status: OrderStatus,
    ) -> Result<(), RepositoryError> {
        self.staged.set_order_status(id, status)
    }

    async fn lock_product(&mut self, id: ProductId) -> Result<Option<Product>, RepositoryError> {
        Ok(self.staged.products.get(&id).cloned())
    }

    async fn decrement_stock(
        &mut self,
        product_id: ProductId,
        quantity: Quantity,
    ) -> Result<(), RepositoryError> {
        self.staged.decrement_stock(product_id, quantity)
    }

    async fn increment_stock(
        &mut self,
        product_id: ProductId,
        quantity: Quantity,
    ) -> Result<(), RepositoryError> {
        self.staged.increment_stock(product_id, quantity)
    }

    async fn commit(self: Box<Self>) -> Result<(), RepositoryError> {
        let Self { mut guard, staged } = *self;
        *guard = staged;
        Ok(())
    }

    async fn rollback(self: Box<Self>) -> Result<(), RepositoryError> {
        Ok(())
    }
}
