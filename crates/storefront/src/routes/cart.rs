//! Cart endpoints.
//!
//! Every route works for a signed-in user or a guest carrying an
//! `X-Session-Id` header. The user's cart wins when both are present.

use axum::{
    Json,
    extract::{Path, State},
    response::{IntoResponse, Response},
};
use serde::Deserialize;
use serde_json::json;
use tracing::instrument;

use stitchery_core::{CartItemId, ProductId, Quantity, SessionId};

use crate::error::Result;
use crate::middleware::{Identity, RequireUser};
use crate::models::CartDetails;
use crate::routes::Message;
use crate::services::{CartService, CommerceError};
use crate::state::AppState;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AddToCart {
    pub product_id: ProductId,
    pub quantity: u32,
    /// Used only when no `X-Session-Id` header is sent.
    pub session_id: Option<SessionId>,
}

#[derive(Debug, Deserialize)]
pub struct UpdateCartItem {
    pub quantity: u32,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MergeCart {
    pub session_id: SessionId,
}

fn quantity(value: u32) -> Result<Quantity> {
    Ok(Quantity::new(value).map_err(CommerceError::from)?)
}

/// The caller's cart, or an empty item list when none exists yet.
#[instrument(skip_all)]
pub async fn show(State(state): State<AppState>, identity: Identity) -> Result<Response> {
    let owner = identity.owner(None)?;
    let response = match CartService::new(state.store()).get_cart(&owner).await? {
        Some(cart) => Json(cart).into_response(),
        None => Json(json!({ "items": [] })).into_response(),
    };
    Ok(response)
}

#[instrument(skip_all, fields(product_id = %body.product_id, quantity = body.quantity))]
pub async fn add(
    State(state): State<AppState>,
    identity: Identity,
    Json(body): Json<AddToCart>,
) -> Result<Json<CartDetails>> {
    let owner = identity.owner(body.session_id)?;
    let cart = CartService::new(state.store())
        .add_to_cart(&owner, body.product_id, quantity(body.quantity)?)
        .await?;
    Ok(Json(cart))
}

#[instrument(skip(state, identity, body))]
pub async fn update_item(
    State(state): State<AppState>,
    identity: Identity,
    Path(id): Path<CartItemId>,
    Json(body): Json<UpdateCartItem>,
) -> Result<Json<CartDetails>> {
    let owner = identity.owner(None)?;
    let cart = CartService::new(state.store())
        .update_cart_item(&owner, id, quantity(body.quantity)?)
        .await?;
    Ok(Json(cart))
}

#[instrument(skip(state, identity))]
pub async fn remove_item(
    State(state): State<AppState>,
    identity: Identity,
    Path(id): Path<CartItemId>,
) -> Result<Json<CartDetails>> {
    let owner = identity.owner(None)?;
    let cart = CartService::new(state.store())
        .remove_from_cart(&owner, id)
        .await?;
    Ok(Json(cart))
}

#[instrument(skip_all)]
pub async fn clear(State(state): State<AppState>, identity: Identity) -> Result<Json<Message>> {
    let owner = identity.owner(None)?;
    CartService::new(state.store()).clear_cart(&owner).await?;
    Ok(Json(Message {
        message: "Cart cleared successfully".to_string(),
    }))
}

/// Fold a guest cart into the signed-in user's cart.
#[instrument(skip_all, fields(user_id = %user.id))]
pub async fn merge(
    State(state): State<AppState>,
    RequireUser(user): RequireUser,
    Json(body): Json<MergeCart>,
) -> Result<Json<CartDetails>> {
    let cart = CartService::new(state.store())
        .merge_guest_cart(user.id, body.session_id)
        .await?;
    Ok(Json(cart))
}
