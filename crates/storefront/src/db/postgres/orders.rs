//! Order queries.

use std::collections::HashMap;

use sqlx::PgConnection;

use stitchery_core::{OrderId, OrderItemId, OrderStatus, Price, ProductId, Quantity, UserId};

use super::catalog::products_by_ids;
use crate::db::RepositoryError;
use crate::models::{
    NewOrder, Order, OrderDetails, OrderItem, OrderLine, StatusTotal, User, UserSummary,
};

const ORDER_COLUMNS: &str = "id, user_id, status, total_amount, created_at, updated_at";

const ORDER_ITEM_COLUMNS: &str = "id, order_id, product_id, quantity, price, created_at";

pub(super) async fn get_order(
    conn: &mut PgConnection,
    id: OrderId,
) -> Result<Option<Order>, RepositoryError> {
    let order = sqlx::query_as::<_, Order>(&format!(
        "SELECT {ORDER_COLUMNS} FROM orders WHERE id = $1"
    ))
    .bind(id)
    .fetch_optional(conn)
    .await?;
    Ok(order)
}

/// Row lock held until the surrounding transaction ends.
pub(super) async fn lock_order(
    conn: &mut PgConnection,
    id: OrderId,
) -> Result<Option<Order>, RepositoryError> {
    let order = sqlx::query_as::<_, Order>(&format!(
        "SELECT {ORDER_COLUMNS} FROM orders WHERE id = $1 FOR UPDATE"
    ))
    .bind(id)
    .fetch_optional(conn)
    .await?;
    Ok(order)
}

pub(super) async fn create_order(
    conn: &mut PgConnection,
    order: NewOrder,
) -> Result<Order, RepositoryError> {
    let order = sqlx::query_as::<_, Order>(&format!(
        "INSERT INTO orders (id, user_id, status, total_amount)
         VALUES ($1, $2, $3, $4)
         RETURNING {ORDER_COLUMNS}"
    ))
    .bind(OrderId::generate())
    .bind(order.user_id)
    .bind(OrderStatus::Pending)
    .bind(order.total_amount)
    .fetch_one(conn)
    .await?;
    Ok(order)
}

pub(super) async fn add_order_item(
    conn: &mut PgConnection,
    order_id: OrderId,
    product_id: ProductId,
    quantity: Quantity,
    price: Price,
) -> Result<OrderItem, RepositoryError> {
    let item = sqlx::query_as::<_, OrderItem>(&format!(
        "INSERT INTO order_items (id, order_id, product_id, quantity, price)
         VALUES ($1, $2, $3, $4, $5)
         RETURNING {ORDER_ITEM_COLUMNS}"
    ))
    .bind(OrderItemId::generate())
    .bind(order_id)
    .bind(product_id)
    .bind(quantity)
    .bind(price)
    .fetch_one(conn)
    .await?;
    Ok(item)
}

pub(super) async fn order_items(
    conn: &mut PgConnection,
    order_id: OrderId,
) -> Result<Vec<OrderItem>, RepositoryError> {
    let items = sqlx::query_as::<_, OrderItem>(&format!(
        "SELECT {ORDER_ITEM_COLUMNS} FROM order_items WHERE order_id = $1 ORDER BY created_at, id"
    ))
    .bind(order_id)
    .fetch_all(conn)
    .await?;
    Ok(items)
}

pub(super) async fn set_order_status(
    conn: &mut PgConnection,
    id: OrderId,
    status: OrderStatus,
) -> Result<(), RepositoryError> {
    let result = sqlx::query("UPDATE orders SET status = $2, updated_at = NOW() WHERE id = $1")
        .bind(id)
        .bind(status)
        .execute(conn)
        .await?;
    if result.rows_affected() == 0 {
        return Err(RepositoryError::NotFound);
    }
    Ok(())
}

/// Populated orders, newest first. Lines, products and buyers are loaded
/// with one query each rather than per order.
pub(super) async fn list_order_details(
    conn: &mut PgConnection,
    user_id: Option<UserId>,
    order_id: Option<OrderId>,
) -> Result<Vec<OrderDetails>, RepositoryError> {
    let orders = sqlx::query_as::<_, Order>(&format!(
        "SELECT {ORDER_COLUMNS} FROM orders
         WHERE ($1::uuid IS NULL OR user_id = $1)
           AND ($2::uuid IS NULL OR id = $2)
         ORDER BY created_at DESC, id"
    ))
    .bind(user_id)
    .bind(order_id)
    .fetch_all(&mut *conn)
    .await?;
    if orders.is_empty() {
        return Ok(Vec::new());
    }

    let order_ids: Vec<OrderId> = orders.iter().map(|o| o.id).collect();
    let items = sqlx::query_as::<_, OrderItem>(&format!(
        "SELECT {ORDER_ITEM_COLUMNS} FROM order_items
         WHERE order_id = ANY($1)
         ORDER BY created_at, id"
    ))
    .bind(&order_ids)
    .fetch_all(&mut *conn)
    .await?;

    let mut user_ids: Vec<UserId> = orders.iter().map(|o| o.user_id).collect();
    user_ids.sort_unstable();
    user_ids.dedup();
    let users: HashMap<UserId, UserSummary> = sqlx::query_as::<_, User>(
        "SELECT id, email, name, is_admin, created_at, updated_at FROM users WHERE id = ANY($1)",
    )
    .bind(&user_ids)
    .fetch_all(&mut *conn)
    .await?
    .iter()
    .map(|user| (user.id, UserSummary::from(user)))
    .collect();

    let mut product_ids: Vec<ProductId> = items.iter().map(|i| i.product_id).collect();
    product_ids.sort_unstable();
    product_ids.dedup();
    let products = products_by_ids(conn, &product_ids).await?;

    let mut lines: HashMap<OrderId, Vec<OrderLine>> = HashMap::new();
    for item in items {
        let product = products.get(&item.product_id).cloned().ok_or_else(|| {
            RepositoryError::DataCorruption(format!(
                "order item {} references missing product {}",
                item.id, item.product_id
            ))
        })?;
        lines
            .entry(item.order_id)
            .or_default()
            .push(OrderLine { item, product });
    }

    orders
        .into_iter()
        .map(|order| {
            let user = users.get(&order.user_id).cloned().ok_or_else(|| {
                RepositoryError::DataCorruption(format!(
                    "order {} references missing user {}",
                    order.id, order.user_id
                ))
            })?;
            let items = lines.remove(&order.id).unwrap_or_default();
            Ok(OrderDetails { order, user, items })
        })
        .collect()
}

pub(super) async fn order_status_totals(
    conn: &mut PgConnection,
    user_id: Option<UserId>,
) -> Result<Vec<StatusTotal>, RepositoryError> {
    let totals = sqlx::query_as::<_, StatusTotal>(
        "SELECT status, COUNT(*) AS count, COALESCE(SUM(total_amount), 0) AS revenue
         FROM orders
         WHERE ($1::uuid IS NULL OR user_id = $1)
         GROUP BY status
         ORDER BY status",
    )
    .bind(user_id)
    .fetch_all(conn)
    .await?;
    Ok(totals)
}
