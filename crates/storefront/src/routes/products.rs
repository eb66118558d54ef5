//! Product endpoints.
//!
//! Listing, detail and stock checks are public. Everything that changes the
//! catalog needs an admin.

use axum::{
    Json,
    extract::{Path, Query, State},
    http::StatusCode,
};
use serde::{Deserialize, Serialize};
use tracing::instrument;

use stitchery_core::{ProductId, Quantity};

use crate::error::Result;
use crate::middleware::RequireAdmin;
use crate::models::{ProductPage, ProductWithCategory, Removal};
use crate::services::catalog::{ProductInput, ProductQuery, ProductUpdate};
use crate::services::{CommerceError, ProductService};
use crate::state::AppState;

/// Body of a stock adjustment. `quantity` is a signed delta.
#[derive(Debug, Deserialize)]
pub struct StockAdjustment {
    pub quantity: i32,
}

#[derive(Debug, Deserialize)]
pub struct CheckStockQuery {
    pub quantity: u32,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StockCheck {
    pub available: bool,
    pub product_id: ProductId,
    pub requested_quantity: u32,
}

#[instrument(skip(state, _admin, input))]
pub async fn create(
    State(state): State<AppState>,
    _admin: RequireAdmin,
    Json(input): Json<ProductInput>,
) -> Result<(StatusCode, Json<ProductWithCategory>)> {
    let product = ProductService::new(state.store()).create(input).await?;
    Ok((StatusCode::CREATED, Json(product)))
}

#[instrument(skip(state))]
pub async fn index(
    State(state): State<AppState>,
    Query(query): Query<ProductQuery>,
) -> Result<Json<ProductPage>> {
    Ok(Json(ProductService::new(state.store()).find_all(query).await?))
}

pub async fn show(
    State(state): State<AppState>,
    Path(id): Path<ProductId>,
) -> Result<Json<ProductWithCategory>> {
    let product = ProductService::new(state.store())
        .find_one(id)
        .await?
        .ok_or(CommerceError::ProductNotFound { product_id: id })?;
    Ok(Json(product))
}

#[instrument(skip(state, _admin, input))]
pub async fn update(
    State(state): State<AppState>,
    _admin: RequireAdmin,
    Path(id): Path<ProductId>,
    Json(input): Json<ProductUpdate>,
) -> Result<Json<ProductWithCategory>> {
    Ok(Json(
        ProductService::new(state.store()).update(id, input).await?,
    ))
}

/// Delete a product, or deactivate it when orders or carts still hold it.
#[instrument(skip(state, _admin))]
pub async fn delete(
    State(state): State<AppState>,
    _admin: RequireAdmin,
    Path(id): Path<ProductId>,
) -> Result<Json<Removal>> {
    Ok(Json(ProductService::new(state.store()).remove(id).await?))
}

#[instrument(skip(state, _admin))]
pub async fn adjust_stock(
    State(state): State<AppState>,
    _admin: RequireAdmin,
    Path(id): Path<ProductId>,
    Json(body): Json<StockAdjustment>,
) -> Result<Json<ProductWithCategory>> {
    Ok(Json(
        ProductService::new(state.store())
            .adjust_stock(id, body.quantity)
            .await?,
    ))
}

pub async fn check_stock(
    State(state): State<AppState>,
    Path(id): Path<ProductId>,
    Query(query): Query<CheckStockQuery>,
) -> Result<Json<StockCheck>> {
    let quantity = Quantity::new(query.quantity).map_err(CommerceError::from)?;
    let available = ProductService::new(state.store())
        .check_stock(id, quantity)
        .await?;
    Ok(Json(StockCheck {
        available,
        product_id: id,
        requested_quantity: query.quantity,
    }))
}
