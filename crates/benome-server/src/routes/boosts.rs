use std::sync::Arc;

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    Extension, Json,
};
use serde::Deserialize;
use serde_json::json;

use benome_core::caller::Caller;

use crate::{error::AppError, state::AppState};

#[derive(Debug, Deserialize)]
pub struct PurchaseRequest {
    pub listing_id: String,
    pub package_id: String,
}

/// `POST /api/boosts`: open a boost purchase for one of the caller's
/// listings. Responds with the pending boost, its payment and the checkout
/// URL to redirect the buyer to.
#[tracing::instrument(skip(state))]
pub async fn purchase(
    State(state): State<Arc<AppState>>,
    Extension(caller): Extension<Caller>,
    Json(req): Json<PurchaseRequest>,
) -> Result<impl IntoResponse, AppError> {
    if req.listing_id.trim().is_empty() {
        return Err(AppError::BadRequest("listing_id is required".to_string()));
    }
    if req.package_id.trim().is_empty() {
        return Err(AppError::BadRequest("package_id is required".to_string()));
    }

    let receipt = state
        .engine
        .purchase(req.listing_id.trim(), req.package_id.trim(), &caller)
        .await?;
    Ok((StatusCode::CREATED, Json(json!({ "data": receipt }))))
}

/// `GET /api/boosts/{id}`: owner or admin only.
#[tracing::instrument(skip(state))]
pub async fn get_boost(
    State(state): State<Arc<AppState>>,
    Extension(caller): Extension<Caller>,
    Path(boost_id): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    let boost = state.engine.get_boost(&boost_id, &caller).await?;
    Ok(Json(json!({ "data": boost })))
}

/// `POST /api/boosts/{id}/renew` and `POST /api/admin/boosts/{id}/renew`.
#[tracing::instrument(skip(state))]
pub async fn renew(
    State(state): State<Arc<AppState>>,
    Extension(caller): Extension<Caller>,
    Path(boost_id): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    let receipt = state.engine.renew(&boost_id, &caller).await?;
    Ok((StatusCode::CREATED, Json(json!({ "data": receipt }))))
}

/// `POST /api/boosts/{id}/cancel` and `POST /api/admin/boosts/{id}/cancel`.
/// No refund is issued.
#[tracing::instrument(skip(state))]
pub async fn cancel(
    State(state): State<Arc<AppState>>,
    Extension(caller): Extension<Caller>,
    Path(boost_id): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    let boost = state.engine.cancel(&boost_id, &caller).await?;
    Ok(Json(json!({ "data": boost })))
}

/// `GET /api/listings/{id}/boost`: current boost status of a listing.
#[tracing::instrument(skip(state))]
pub async fn listing_status(
    State(state): State<Arc<AppState>>,
    Path(listing_id): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    let view = state.engine.get_status(&listing_id).await?;
    Ok(Json(json!({ "data": view })))
}
