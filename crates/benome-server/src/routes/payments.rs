use std::sync::Arc;

use axum::{
    extract::{Query, State},
    response::IntoResponse,
    Json,
};
use serde::Deserialize;
use serde_json::json;

use benome_core::BoostError;

use crate::{error::AppError, state::AppState};

/// Query string of the gateway redirect/callback.
///
/// FedaPay sends `id` and `status`; other providers send `transaction_id`
/// and sometimes a `reference` echoing our payment id.
#[derive(Debug, Deserialize)]
pub struct CallbackQuery {
    pub transaction_id: Option<String>,
    pub id: Option<String>,
    pub status: Option<String>,
    pub reference: Option<String>,
}

/// `GET /api/payments/callback`
///
/// Known outcomes answer 200 so the gateway stops retrying, including
/// payments that can no longer activate their boost. Unknown transactions
/// answer 404; gateway failures answer 502 so the delivery is retried.
#[tracing::instrument(skip(state))]
pub async fn callback(
    State(state): State<Arc<AppState>>,
    Query(query): Query<CallbackQuery>,
) -> Result<impl IntoResponse, AppError> {
    let transaction_id = query
        .transaction_id
        .as_deref()
        .or(query.id.as_deref())
        .map(str::trim)
        .filter(|id| !id.is_empty())
        .ok_or_else(|| AppError::BadRequest("transaction_id is required".to_string()))?;

    match state
        .engine
        .handle_gateway_callback(transaction_id, query.status.as_deref())
        .await
    {
        Ok(outcome) => Ok(Json(json!({ "data": outcome }))),
        Err(err @ (BoostError::InvalidState(_) | BoostError::Precondition(_))) => {
            tracing::warn!(
                transaction_id,
                reference = ?query.reference,
                error = %err,
                "Gateway callback rejected"
            );
            Ok(Json(json!({
                "data": {
                    "outcome": "rejected",
                    "reason": err.to_string(),
                }
            })))
        }
        Err(err) => Err(err.into()),
    }
}
