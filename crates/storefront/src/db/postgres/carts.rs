//! Cart queries.
//!
//! Everything here runs on a bare connection so the same statements serve
//! both the pool-backed store and an open transaction.

use chrono::{DateTime, Utc};
use sqlx::PgConnection;

use stitchery_core::{CartId, CartItemId, CartOwner, ProductId, Quantity, SessionId, UserId};

use super::catalog::products_by_ids;
use crate::db::{RepositoryError, conflict_on_unique};
use crate::models::{Cart, CartDetails, CartItem, CartLine};

const CART_COLUMNS: &str = "id, user_id, session_id, created_at, updated_at";

const CART_ITEM_COLUMNS: &str = "id, cart_id, product_id, quantity, created_at, updated_at";

#[derive(sqlx::FromRow)]
struct CartRow {
    id: CartId,
    user_id: Option<UserId>,
    session_id: Option<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<CartRow> for Cart {
    type Error = RepositoryError;

    fn try_from(row: CartRow) -> Result<Self, Self::Error> {
        let session_id = row
            .session_id
            .as_deref()
            .map(SessionId::parse)
            .transpose()
            .map_err(|e| {
                RepositoryError::DataCorruption(format!("invalid session id in database: {e}"))
            })?;
        Ok(Self {
            id: row.id,
            user_id: row.user_id,
            session_id,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

pub(super) async fn find_cart(
    conn: &mut PgConnection,
    owner: &CartOwner,
) -> Result<Option<Cart>, RepositoryError> {
    let row = match owner {
        CartOwner::User(id) => {
            sqlx::query_as::<_, CartRow>(&format!(
                "SELECT {CART_COLUMNS} FROM carts WHERE user_id = $1"
            ))
            .bind(*id)
            .fetch_optional(&mut *conn)
            .await?
        }
        CartOwner::Session(id) => {
            sqlx::query_as::<_, CartRow>(&format!(
                "SELECT {CART_COLUMNS} FROM carts WHERE session_id = $1"
            ))
            .bind(id.as_str())
            .fetch_optional(&mut *conn)
            .await?
        }
    };
    row.map(Cart::try_from).transpose()
}

/// Insert-if-absent, then read back. Safe against two requests creating
/// the same owner's cart at once.
pub(super) async fn get_or_create_cart(
    conn: &mut PgConnection,
    owner: &CartOwner,
) -> Result<Cart, RepositoryError> {
    sqlx::query(
        "INSERT INTO carts (id, user_id, session_id)
         VALUES ($1, $2, $3)
         ON CONFLICT DO NOTHING",
    )
    .bind(CartId::generate())
    .bind(owner.user_id())
    .bind(owner.session_id().map(SessionId::as_str))
    .execute(&mut *conn)
    .await?;

    find_cart(conn, owner).await?.ok_or_else(|| {
        RepositoryError::DataCorruption(format!("cart for {owner} vanished after insert"))
    })
}

pub(super) async fn cart_items(
    conn: &mut PgConnection,
    cart_id: CartId,
) -> Result<Vec<CartItem>, RepositoryError> {
    let items = sqlx::query_as::<_, CartItem>(&format!(
        "SELECT {CART_ITEM_COLUMNS} FROM cart_items WHERE cart_id = $1 ORDER BY created_at, id"
    ))
    .bind(cart_id)
    .fetch_all(conn)
    .await?;
    Ok(items)
}

/// Cart lines with their rows locked `FOR UPDATE`.
pub(super) async fn lock_cart_items(
    conn: &mut PgConnection,
    cart_id: CartId,
) -> Result<Vec<CartItem>, RepositoryError> {
    let items = sqlx::query_as::<_, CartItem>(&format!(
        "SELECT {CART_ITEM_COLUMNS} FROM cart_items WHERE cart_id = $1
         ORDER BY created_at, id FOR UPDATE"
    ))
    .bind(cart_id)
    .fetch_all(conn)
    .await?;
    Ok(items)
}

pub(super) async fn cart_details(
    conn: &mut PgConnection,
    id: CartId,
) -> Result<Option<CartDetails>, RepositoryError> {
    let cart = sqlx::query_as::<_, CartRow>(&format!(
        "SELECT {CART_COLUMNS} FROM carts WHERE id = $1"
    ))
    .bind(id)
    .fetch_optional(&mut *conn)
    .await?;
    let Some(cart) = cart else {
        return Ok(None);
    };
    let cart = Cart::try_from(cart)?;

    let items = cart_items(conn, id).await?;
    let ids: Vec<ProductId> = items.iter().map(|item| item.product_id).collect();
    let mut products = products_by_ids(conn, &ids).await?;

    let items = items
        .into_iter()
        .map(|item| {
            let product = products.remove(&item.product_id).ok_or_else(|| {
                RepositoryError::DataCorruption(format!(
                    "cart item {} references missing product {}",
                    item.id, item.product_id
                ))
            })?;
            Ok(CartLine { item, product })
        })
        .collect::<Result<Vec<_>, RepositoryError>>()?;

    Ok(Some(CartDetails { cart, items }))
}

pub(super) async fn find_cart_item(
    conn: &mut PgConnection,
    cart_id: CartId,
    product_id: ProductId,
) -> Result<Option<CartItem>, RepositoryError> {
    let item = sqlx::query_as::<_, CartItem>(&format!(
        "SELECT {CART_ITEM_COLUMNS} FROM cart_items WHERE cart_id = $1 AND product_id = $2"
    ))
    .bind(cart_id)
    .bind(product_id)
    .fetch_optional(conn)
    .await?;
    Ok(item)
}

pub(super) async fn get_cart_item(
    conn: &mut PgConnection,
    id: CartItemId,
) -> Result<Option<(CartItem, Cart)>, RepositoryError> {
    let item = sqlx::query_as::<_, CartItem>(&format!(
        "SELECT {CART_ITEM_COLUMNS} FROM cart_items WHERE id = $1"
    ))
    .bind(id)
    .fetch_optional(&mut *conn)
    .await?;
    let Some(item) = item else {
        return Ok(None);
    };

    let cart = sqlx::query_as::<_, CartRow>(&format!(
        "SELECT {CART_COLUMNS} FROM carts WHERE id = $1"
    ))
    .bind(item.cart_id)
    .fetch_one(conn)
    .await?;
    Ok(Some((item, Cart::try_from(cart)?)))
}

pub(super) async fn insert_cart_item(
    conn: &mut PgConnection,
    cart_id: CartId,
    product_id: ProductId,
    quantity: Quantity,
) -> Result<CartItem, RepositoryError> {
    sqlx::query_as::<_, CartItem>(&format!(
        "INSERT INTO cart_items (id, cart_id, product_id, quantity)
         VALUES ($1, $2, $3, $4)
         RETURNING {CART_ITEM_COLUMNS}"
    ))
    .bind(CartItemId::generate())
    .bind(cart_id)
    .bind(product_id)
    .bind(quantity)
    .fetch_one(conn)
    .await
    .map_err(|e| conflict_on_unique(e, "cart line"))
}

pub(super) async fn set_cart_item_quantity(
    conn: &mut PgConnection,
    id: CartItemId,
    quantity: Quantity,
) -> Result<(), RepositoryError> {
    let result =
        sqlx::query("UPDATE cart_items SET quantity = $2, updated_at = NOW() WHERE id = $1")
            .bind(id)
            .bind(quantity)
            .execute(conn)
            .await?;
    if result.rows_affected() == 0 {
        return Err(RepositoryError::NotFound);
    }
    Ok(())
}

/// Add to an existing line or insert a new one in a single statement.
///
/// The sum is computed in `BIGINT`; a result past [`Quantity::MAX`] leaves
/// the line untouched and reports `Conflict`.
pub(super) async fn merge_cart_item(
    conn: &mut PgConnection,
    cart_id: CartId,
    product_id: ProductId,
    quantity: Quantity,
) -> Result<(), RepositoryError> {
    let result = sqlx::query(
        "INSERT INTO cart_items (id, cart_id, product_id, quantity)
         VALUES ($1, $2, $3, $4)
         ON CONFLICT (cart_id, product_id)
         DO UPDATE SET quantity = cart_items.quantity + EXCLUDED.quantity,
                       updated_at = NOW()
         WHERE cart_items.quantity::BIGINT + EXCLUDED.quantity <= $5",
    )
    .bind(CartItemId::generate())
    .bind(cart_id)
    .bind(product_id)
    .bind(quantity)
    .bind(i64::from(Quantity::MAX))
    .execute(conn)
    .await?;

    if result.rows_affected() == 0 {
        return Err(RepositoryError::Conflict(format!(
            "cart line quantity for product {product_id} would exceed {}",
            Quantity::MAX
        )));
    }
    Ok(())
}

pub(super) async fn delete_cart_item(
    conn: &mut PgConnection,
    id: CartItemId,
) -> Result<bool, RepositoryError> {
    let result = sqlx::query("DELETE FROM cart_items WHERE id = $1")
        .bind(id)
        .execute(conn)
        .await?;
    Ok(result.rows_affected() > 0)
}

pub(super) async fn clear_cart(
    conn: &mut PgConnection,
    cart_id: CartId,
) -> Result<u64, RepositoryError> {
    let result = sqlx::query("DELETE FROM cart_items WHERE cart_id = $1")
        .bind(cart_id)
        .execute(conn)
        .await?;
    Ok(result.rows_affected())
}

/// Lines cascade with the cart.
pub(super) async fn delete_cart(
    conn: &mut PgConnection,
    cart_id: CartId,
) -> Result<(), RepositoryError> {
    sqlx::query("DELETE FROM carts WHERE id = $1")
        .bind(cart_id)
        .execute(conn)
        .await?;
    Ok(())
}
