//! `PostgreSQL` implementation of [`Store`].

mod carts;
mod catalog;
mod orders;
mod users;

use async_trait::async_trait;
use sqlx::{PgPool, Postgres, Transaction};

use stitchery_core::{
    CartId, CartItemId, CartOwner, CategoryId, Email, OrderId, OrderStatus, Price, ProductId,
    Quantity, UserId,
};

pub use catalog::{CategoryRepository, ProductRepository};
pub use users::UserRepository;

use super::{RepositoryError, Store, UnitOfWork};
use crate::models::{
    Cart, CartDetails, CartItem, Category, CategoryPatch, NewCategory, NewOrder, NewProduct,
    NewUser, Order, OrderDetails, OrderItem, Product, ProductFilter, ProductPatch,
    ProductWithCategory, StatusTotal, User, UserChanges,
};

/// Embedded schema migrations.
pub static MIGRATOR: sqlx::migrate::Migrator = sqlx::migrate!("./migrations");

/// Map a foreign-key violation into `Conflict`, everything else into `Database`.
fn referenced(err: sqlx::Error, message: &str) -> RepositoryError {
    if let sqlx::Error::Database(ref db_err) = err
        && db_err.is_foreign_key_violation()
    {
        return RepositoryError::Conflict(message.to_owned());
    }
    RepositoryError::Database(err)
}

/// Store backed by a `PostgreSQL` pool.
#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    #[must_use]
    pub const fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl Store for PgStore {
    async fn ping(&self) -> Result<(), RepositoryError> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }

    async fn begin(&self) -> Result<Box<dyn UnitOfWork>, RepositoryError> {
        let tx = self.pool.begin().await?;
        Ok(Box::new(PgUnitOfWork { tx }))
    }

    async fn create_user(&self, user: NewUser) -> Result<User, RepositoryError> {
        UserRepository::new(&self.pool).create(user).await
    }

    async fn get_user(&self, id: UserId) -> Result<Option<User>, RepositoryError> {
        UserRepository::new(&self.pool).get_by_id(id).await
    }

    async fn get_user_by_email(&self, email: &Email) -> Result<Option<User>, RepositoryError> {
        UserRepository::new(&self.pool).get_by_email(email).await
    }

    async fn get_password_hash(
        &self,
        email: &Email,
    ) -> Result<Option<(User, String)>, RepositoryError> {
        UserRepository::new(&self.pool)
            .get_with_password_hash(email)
            .await
    }

    async fn list_users(&self) -> Result<Vec<User>, RepositoryError> {
        UserRepository::new(&self.pool).list().await
    }

    async fn update_user(
        &self,
        id: UserId,
        changes: UserChanges,
    ) -> Result<User, RepositoryError> {
        UserRepository::new(&self.pool).update(id, changes).await
    }

    async fn delete_user(&self, id: UserId) -> Result<bool, RepositoryError> {
        UserRepository::new(&self.pool).delete(id).await
    }

    async fn create_category(&self, category: NewCategory) -> Result<Category, RepositoryError> {
        CategoryRepository::new(&self.pool).create(category).await
    }

    async fn get_category(&self, id: CategoryId) -> Result<Option<Category>, RepositoryError> {
        CategoryRepository::new(&self.pool).get(id).await
    }

    async fn list_categories(&self) -> Result<Vec<Category>, RepositoryError> {
        CategoryRepository::new(&self.pool).list().await
    }

    async fn count_category_products(&self, id: CategoryId) -> Result<i64, RepositoryError> {
        CategoryRepository::new(&self.pool).count_products(id).await
    }

    async fn update_category(
        &self,
        id: CategoryId,
        patch: CategoryPatch,
    ) -> Result<Category, RepositoryError> {
        CategoryRepository::new(&self.pool).update(id, patch).await
    }

    async fn delete_category(&self, id: CategoryId) -> Result<bool, RepositoryError> {
        CategoryRepository::new(&self.pool).delete(id).await
    }

    async fn create_product(&self, product: NewProduct) -> Result<Product, RepositoryError> {
        ProductRepository::new(&self.pool).create(product).await
    }

    async fn get_product(&self, id: ProductId) -> Result<Option<Product>, RepositoryError> {
        ProductRepository::new(&self.pool).get(id).await
    }

    async fn get_product_with_category(
        &self,
        id: ProductId,
    ) -> Result<Option<ProductWithCategory>, RepositoryError> {
        ProductRepository::new(&self.pool).get_with_category(id).await
    }

    async fn search_products(
        &self,
        filter: &ProductFilter,
        offset: i64,
        limit: i64,
    ) -> Result<(Vec<ProductWithCategory>, i64), RepositoryError> {
        ProductRepository::new(&self.pool)
            .search(filter, offset, limit)
            .await
    }

    async fn update_product(
        &self,
        id: ProductId,
        patch: ProductPatch,
    ) -> Result<Product, RepositoryError> {
        ProductRepository::new(&self.pool).update(id, patch).await
    }

    async fn product_is_referenced(&self, id: ProductId) -> Result<bool, RepositoryError> {
        ProductRepository::new(&self.pool).is_referenced(id).await
    }

    async fn delete_product(&self, id: ProductId) -> Result<bool, RepositoryError> {
        ProductRepository::new(&self.pool).delete(id).await
    }

    async fn adjust_stock(&self, id: ProductId, delta: i32) -> Result<Product, RepositoryError> {
        ProductRepository::new(&self.pool)
            .adjust_stock(id, delta)
            .await
    }

    async fn find_cart(&self, owner: &CartOwner) -> Result<Option<Cart>, RepositoryError> {
        let mut conn = self.pool.acquire().await?;
        carts::find_cart(&mut conn, owner).await
    }

    async fn get_or_create_cart(&self, owner: &CartOwner) -> Result<Cart, RepositoryError> {
        let mut conn = self.pool.acquire().await?;
        carts::get_or_create_cart(&mut conn, owner).await
    }

    async fn cart_details(&self, id: CartId) -> Result<Option<CartDetails>, RepositoryError> {
        let mut conn = self.pool.acquire().await?;
        carts::cart_details(&mut conn, id).await
    }

    async fn find_cart_item(
        &self,
        cart_id: CartId,
        product_id: ProductId,
    ) -> Result<Option<CartItem>, RepositoryError> {
        let mut conn = self.pool.acquire().await?;
        carts::find_cart_item(&mut conn, cart_id, product_id).await
    }

    async fn get_cart_item(
        &self,
        id: CartItemId,
    ) -> Result<Option<(CartItem, Cart)>, RepositoryError> {
        let mut conn = self.pool.acquire().await?;
        carts::get_cart_item(&mut conn, id).await
    }

    async fn insert_cart_item(
        &self,
        cart_id: CartId,
        product_id: ProductId,
        quantity: Quantity,
    ) -> Result<CartItem, RepositoryError> {
        let mut conn = self.pool.acquire().await?;
        carts::insert_cart_item(&mut conn, cart_id, product_id, quantity).await
    }

    async fn set_cart_item_quantity(
        &self,
        id: CartItemId,
        quantity: Quantity,
    ) -> Result<(), RepositoryError> {
        let mut conn = self.pool.acquire().await?;
        carts::set_cart_item_quantity(&mut conn, id, quantity).await
    }

    async fn delete_cart_item(&self, id: CartItemId) -> Result<bool, RepositoryError> {
        let mut conn = self.pool.acquire().await?;
        carts::delete_cart_item(&mut conn, id).await
    }

    async fn clear_cart(&self, id: CartId) -> Result<u64, RepositoryError> {
        let mut conn = self.pool.acquire().await?;
        carts::clear_cart(&mut conn, id).await
    }

    async fn get_order(&self, id: OrderId) -> Result<Option<Order>, RepositoryError> {
        let mut conn = self.pool.acquire().await?;
        orders::get_order(&mut conn, id).await
    }

    async fn order_details(&self, id: OrderId) -> Result<Option<OrderDetails>, RepositoryError> {
        let mut conn = self.pool.acquire().await?;
        let mut details = orders::list_order_details(&mut conn, None, Some(id)).await?;
        Ok(details.pop())
    }

    async fn list_order_details(
        &self,
        user_id: Option<UserId>,
    ) -> Result<Vec<OrderDetails>, RepositoryError> {
        let mut conn = self.pool.acquire().await?;
        orders::list_order_details(&mut conn, user_id, None).await
    }

    async fn order_status_totals(
        &self,
        user_id: Option<UserId>,
    ) -> Result<Vec<StatusTotal>, RepositoryError> {
        let mut conn = self.pool.acquire().await?;
        orders::order_status_totals(&mut conn, user_id).await
    }
}

/// Unit of work over a database transaction. Dropping it rolls back.
struct PgUnitOfWork {
    tx: Transaction<'static, Postgres>,
}

#[async_trait]
impl UnitOfWork for PgUnitOfWork {
    async fn find_cart(&mut self, owner: &CartOwner) -> Result<Option<Cart>, RepositoryError> {
        carts::find_cart(&mut self.tx, owner).await
    }

    async fn get_or_create_cart(&mut self, owner: &CartOwner) -> Result<Cart, RepositoryError> {
        carts::get_or_create_cart(&mut self.tx, owner).await
    }

    async fn cart_items(&mut self, cart_id: CartId) -> Result<Vec<CartItem>, RepositoryError> {
        carts::lock_cart_items(&mut self.tx, cart_id).await
    }

    async fn merge_cart_item(
        &mut self,
        cart_id: CartId,
        product_id: ProductId,
        quantity: Quantity,
    ) -> Result<(), RepositoryError> {
        carts::merge_cart_item(&mut self.tx, cart_id, product_id, quantity).await
    }

    async fn delete_cart_item(&mut self, id: CartItemId) -> Result<bool, RepositoryError> {
        carts::delete_cart_item(&mut self.tx, id).await
    }

    async fn delete_cart(&mut self, cart_id: CartId) -> Result<(), RepositoryError> {
        carts::delete_cart(&mut self.tx, cart_id).await
    }

    async fn create_order(&mut self, order: NewOrder) -> Result<Order, RepositoryError> {
        orders::create_order(&mut self.tx, order).await
    }

    async fn add_order_item(
        &mut self,
        order_id: OrderId,
        product_id: ProductId,
        quantity: Quantity,
        price: Price,
    ) -> Result<OrderItem, RepositoryError> {
        orders::add_order_item(&mut self.tx, order_id, product_id, quantity, price).await
    }

    async fn lock_order(&mut self, id: OrderId) -> Result<Option<Order>, RepositoryError> {
        orders::lock_order(&mut self.tx, id).await
    }

    async fn order_items(&mut self, order_id: OrderId) -> Result<Vec<OrderItem>, RepositoryError> {
        orders::order_items(&mut self.tx, order_id).await
    }

    async fn set_order_status(
        &mut self,
        id: OrderId,
        status: OrderStatus,
    ) -> Result<(), RepositoryError> {
        orders::set_order_status(&mut self.tx, id, status).await
    }

    async fn lock_product(&mut self, id: ProductId) -> Result<Option<Product>, RepositoryError> {
        catalog::lock_product(&mut self.tx, id).await
    }

    async fn decrement_stock(
        &mut self,
        product_id: ProductId,
        quantity: Quantity,
    ) -> Result<(), RepositoryError> {
        catalog::decrement_stock(&mut self.tx, product_id, quantity).await
    }

    async fn increment_stock(
        &mut self,
        product_id: ProductId,
        quantity: Quantity,
    ) -> Result<(), RepositoryError> {
        catalog::increment_stock(&mut self.tx, product_id, quantity).await
    }

    async fn commit(self: Box<Self>) -> Result<(), RepositoryError> {
        self.tx.commit().await?;
        Ok(())
    }

    async fn rollback(self: Box<Self>) -> Result<(), RepositoryError> {
        self.tx.rollback().await?;
        Ok(())
    }
}
