use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    response::IntoResponse,
    Json,
};
use serde::Deserialize;
use serde_json::json;

use benome_core::payment::PaymentStatus;

use crate::{error::AppError, state::AppState};

#[derive(Debug, Deserialize)]
pub struct CheckoutQuery {
    /// `completed` (default) or `failed`.
    pub status: Option<String>,
}

/// `GET /sandbox/checkout/{transaction_id}`: stand-in for the hosted
/// checkout page when `BENOME_GATEWAY=sandbox`. Settles the transaction and
/// delivers the callback the way a real gateway would.
#[tracing::instrument(skip(state))]
pub async fn checkout(
    State(state): State<Arc<AppState>>,
    Path(transaction_id): Path<String>,
    Query(query): Query<CheckoutQuery>,
) -> Result<impl IntoResponse, AppError> {
    let Some(sandbox) = state.sandbox.as_ref() else {
        return Err(AppError::NotFound("sandbox gateway is disabled".to_string()));
    };

    let status = match query.status.as_deref().unwrap_or("completed") {
        "completed" => PaymentStatus::Completed,
        "failed" => PaymentStatus::Failed,
        other => {
            return Err(AppError::BadRequest(format!(
                "invalid sandbox status '{other}': expected completed or failed"
            )))
        }
    };

    sandbox
        .settle(&transaction_id, status)
        .await
        .map_err(|e| AppError::NotFound(e.to_string()))?;
    let outcome = state
        .engine
        .handle_gateway_callback(&transaction_id, Some(status.as_str()))
        .await?;
    Ok(Json(json!({ "data": outcome })))
}
