use std::sync::Arc;

use axum::{extract::State, response::IntoResponse, Json};
use serde::Deserialize;
use serde_json::json;

use crate::{error::AppError, state::AppState};

/// Largest result page the listing search asks for.
const MAX_LISTINGS: usize = 200;

#[derive(Debug, Deserialize)]
pub struct VisibilityRequest {
    pub listing_ids: Vec<String>,
}

/// `POST /api/visibility`: ranking inputs for a page of listings, boosted
/// listings first.
#[tracing::instrument(skip_all)]
pub async fn project(
    State(state): State<Arc<AppState>>,
    Json(req): Json<VisibilityRequest>,
) -> Result<impl IntoResponse, AppError> {
    if req.listing_ids.len() > MAX_LISTINGS {
        return Err(AppError::BadRequest(format!(
            "at most {MAX_LISTINGS} listing_ids per request"
        )));
    }
    let mut listing_ids: Vec<String> = Vec::with_capacity(req.listing_ids.len());
    for id in req.listing_ids {
        let id = id.trim().to_string();
        if !id.is_empty() && !listing_ids.contains(&id) {
            listing_ids.push(id);
        }
    }

    let projected = state.engine.project_visibility(&listing_ids).await?;
    Ok(Json(json!({ "data": projected })))
}
