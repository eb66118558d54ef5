//! Category endpoints. Reads are public, writes need an admin.

use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
};
use tracing::instrument;

use stitchery_core::CategoryId;

use crate::error::Result;
use crate::middleware::RequireAdmin;
use crate::models::{Category, CategoryWithCount};
use crate::services::catalog::{CategoryInput, CategoryUpdate};
use crate::services::{CategoryService, CommerceError};
use crate::state::AppState;

#[instrument(skip(state, _admin, input))]
pub async fn create(
    State(state): State<AppState>,
    _admin: RequireAdmin,
    Json(input): Json<CategoryInput>,
) -> Result<(StatusCode, Json<Category>)> {
    let category = CategoryService::new(state.store()).create(input).await?;
    Ok((StatusCode::CREATED, Json(category)))
}

pub async fn index(State(state): State<AppState>) -> Result<Json<Vec<Category>>> {
    Ok(Json(CategoryService::new(state.store()).find_all().await?))
}

pub async fn show(
    State(state): State<AppState>,
    Path(id): Path<CategoryId>,
) -> Result<Json<CategoryWithCount>> {
    let category = CategoryService::new(state.store())
        .find_one(id)
        .await?
        .ok_or(CommerceError::CategoryNotFound { category_id: id })?;
    Ok(Json(category))
}

#[instrument(skip(state, _admin, input))]
pub async fn update(
    State(state): State<AppState>,
    _admin: RequireAdmin,
    Path(id): Path<CategoryId>,
    Json(input): Json<CategoryUpdate>,
) -> Result<Json<Category>> {
    Ok(Json(
        CategoryService::new(state.store()).update(id, input).await?,
    ))
}

#[instrument(skip(state, _admin))]
pub async fn delete(
    State(state): State<AppState>,
    _admin: RequireAdmin,
    Path(id): Path<CategoryId>,
) -> Result<Json<Category>> {
    Ok(Json(CategoryService::new(state.store()).remove(id).await?))
}
