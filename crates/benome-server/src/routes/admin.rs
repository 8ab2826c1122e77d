use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    Extension, Json,
};
use serde::Deserialize;
use serde_json::json;

use benome_core::{
    boost::BoostStatus,
    caller::Caller,
    ledger::BoostFilter,
    listing::ListingCategory,
    package::{NewPackage, PackageUpdate},
};

use crate::{error::AppError, scheduler, state::AppState};

const DEFAULT_PAGE: i64 = 50;

#[derive(Debug, Deserialize)]
pub struct ListBoostsQuery {
    pub status: Option<String>,
    pub title: Option<String>,
    pub user_id: Option<String>,
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

/// `GET /api/admin/boosts`
#[tracing::instrument(skip(state))]
pub async fn list_boosts(
    State(state): State<Arc<AppState>>,
    Extension(caller): Extension<Caller>,
    Query(query): Query<ListBoostsQuery>,
) -> Result<impl IntoResponse, AppError> {
    let status = match query.status.as_deref().filter(|s| !s.trim().is_empty()) {
        Some(raw) => Some(BoostStatus::parse(raw).map_err(|e| AppError::BadRequest(e.to_string()))?),
        None => None,
    };
    let filter = BoostFilter {
        status,
        title: query.title.filter(|t| !t.trim().is_empty()),
        user_id: query.user_id.filter(|u| !u.trim().is_empty()),
        limit: query.limit.unwrap_or(DEFAULT_PAGE).clamp(1, 200),
        offset: query.offset.unwrap_or(0).max(0),
    };

    let (boosts, total) = state.engine.list_boosts(&caller, &filter).await?;
    Ok(Json(json!({
        "data": boosts,
        "pagination": {
            "total": total,
            "limit": filter.limit,
            "offset": filter.offset,
        }
    })))
}

/// `POST /api/admin/sweep`: run the expiry and stale-payment sweeps now
/// instead of waiting for the next tick.
#[tracing::instrument(skip(state))]
pub async fn sweep(State(state): State<Arc<AppState>>) -> Result<impl IntoResponse, AppError> {
    let report = scheduler::process_once(&state).await?;
    Ok(Json(json!({ "data": report })))
}

/// `GET /api/admin/packages`: includes deactivated packages.
#[tracing::instrument(skip(state))]
pub async fn list_packages(
    State(state): State<Arc<AppState>>,
) -> Result<impl IntoResponse, AppError> {
    let packages = state.engine.catalog().list_all_packages().await?;
    Ok(Json(json!({ "data": packages })))
}

/// `POST /api/admin/packages`
#[tracing::instrument(skip(state))]
pub async fn create_package(
    State(state): State<Arc<AppState>>,
    Json(req): Json<NewPackage>,
) -> Result<impl IntoResponse, AppError> {
    let package = state.engine.catalog().create_package(req).await?;
    Ok((StatusCode::CREATED, Json(json!({ "data": package }))))
}

/// `PUT /api/admin/packages/{id}`: partial update. Price and duration are
/// frozen once a boost references the package.
#[tracing::instrument(skip(state))]
pub async fn update_package(
    State(state): State<Arc<AppState>>,
    Path(package_id): Path<String>,
    Json(req): Json<PackageUpdate>,
) -> Result<impl IntoResponse, AppError> {
    let package = state.engine.catalog().update_package(&package_id, req).await?;
    Ok(Json(json!({ "data": package })))
}

#[derive(Debug, Deserialize)]
pub struct UpsertListingRequest {
    pub user_id: String,
    #[serde(default)]
    pub title: String,
    pub category: String,
}

/// `PUT /api/admin/listings/{id}`: mirror a marketplace listing.
#[tracing::instrument(skip(state))]
pub async fn upsert_listing(
    State(state): State<Arc<AppState>>,
    Extension(caller): Extension<Caller>,
    Path(listing_id): Path<String>,
    Json(req): Json<UpsertListingRequest>,
) -> Result<impl IntoResponse, AppError> {
    let category =
        ListingCategory::parse(&req.category).map_err(|e| AppError::BadRequest(e.to_string()))?;
    let listing = state
        .engine
        .register_listing(&caller, &listing_id, &req.user_id, &req.title, category)
        .await?;
    Ok(Json(json!({ "data": listing })))
}
