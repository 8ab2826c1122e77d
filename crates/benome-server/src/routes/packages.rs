use std::sync::Arc;

use axum::{
    extract::{Path, State},
    response::IntoResponse,
    Json,
};
use serde_json::json;

use crate::{error::AppError, state::AppState};

/// `GET /api/packages`: purchasable packages, cheapest first.
#[tracing::instrument(skip(state))]
pub async fn list_packages(
    State(state): State<Arc<AppState>>,
) -> Result<impl IntoResponse, AppError> {
    let packages = state.engine.catalog().list_packages().await?;
    Ok(Json(json!({ "data": packages })))
}

/// `GET /api/packages/{id}`
#[tracing::instrument(skip(state))]
pub async fn get_package(
    State(state): State<Arc<AppState>>,
    Path(package_id): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    let package = state.engine.catalog().get_package(&package_id).await?;
    Ok(Json(json!({ "data": package })))
}
