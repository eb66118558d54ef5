//! Order endpoints.

use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
};
use serde::Deserialize;
use tracing::instrument;

use stitchery_core::{OrderId, OrderStatus, SessionId};

use crate::error::{AppError, Result};
use crate::middleware::{RequireAdmin, RequireUser};
use crate::models::{OrderDetails, OrderStats};
use crate::services::{CommerceError, OrderService};
use crate::state::AppState;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateOrder {
    /// Guest cart to merge in before checkout.
    pub session_id: Option<SessionId>,
}

#[derive(Debug, Deserialize)]
pub struct UpdateStatus {
    pub status: OrderStatus,
}

/// Turn the caller's cart into an order. The body is optional.
#[instrument(skip_all, fields(user_id = %user.id))]
pub async fn create(
    State(state): State<AppState>,
    RequireUser(user): RequireUser,
    body: Option<Json<CreateOrder>>,
) -> Result<(StatusCode, Json<OrderDetails>)> {
    let session_id = body.and_then(|Json(body)| body.session_id);
    let order = OrderService::new(state.store())
        .create_order(user.id, session_id)
        .await?;
    Ok((StatusCode::CREATED, Json(order)))
}

pub async fn index(
    State(state): State<AppState>,
    _admin: RequireAdmin,
) -> Result<Json<Vec<OrderDetails>>> {
    Ok(Json(OrderService::new(state.store()).find_all().await?))
}

pub async fn mine(
    State(state): State<AppState>,
    RequireUser(user): RequireUser,
) -> Result<Json<Vec<OrderDetails>>> {
    Ok(Json(
        OrderService::new(state.store()).find_by_user(user.id).await?,
    ))
}

pub async fn stats(
    State(state): State<AppState>,
    _admin: RequireAdmin,
) -> Result<Json<OrderStats>> {
    Ok(Json(OrderService::new(state.store()).stats(None).await?))
}

pub async fn my_stats(
    State(state): State<AppState>,
    RequireUser(user): RequireUser,
) -> Result<Json<OrderStats>> {
    Ok(Json(
        OrderService::new(state.store()).stats(Some(user.id)).await?,
    ))
}

/// One order, for its buyer or an admin.
pub async fn show(
    State(state): State<AppState>,
    RequireUser(user): RequireUser,
    Path(id): Path<OrderId>,
) -> Result<Json<OrderDetails>> {
    let order = OrderService::new(state.store())
        .find_one(id)
        .await?
        .ok_or(CommerceError::OrderNotFound { order_id: id })?;

    if !user.can_access(order.order.user_id) {
        return Err(AppError::Forbidden(
            "You can only view your own orders".to_string(),
        ));
    }
    Ok(Json(order))
}

#[instrument(skip(state, _admin, body), fields(status = %body.status))]
pub async fn update_status(
    State(state): State<AppState>,
    _admin: RequireAdmin,
    Path(id): Path<OrderId>,
    Json(body): Json<UpdateStatus>,
) -> Result<Json<OrderDetails>> {
    Ok(Json(
        OrderService::new(state.store())
            .update_status(id, body.status)
            .await?,
    ))
}
