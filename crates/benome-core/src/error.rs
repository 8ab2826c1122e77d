use thiserror::Error;

/// Failure taxonomy surfaced by the boost lifecycle engine.
///
/// Every variant carries a human-readable message; the HTTP layer maps them
/// onto 4xx/5xx responses without rewording.
#[derive(Debug, Error)]
pub enum BoostError {
    #[error("listing {listing_id} already has a pending or active boost")]
    Conflict { listing_id: String },

    #[error("{0}")]
    Precondition(String),

    #[error("{0}")]
    InvalidState(String),

    #[error("{0}")]
    Authorization(String),

    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    Validation(String),

    #[error("payment gateway error: {0}")]
    Gateway(String),

    #[error("storage error: {0}")]
    Storage(#[from] anyhow::Error),
}

pub type BoostResult<T> = Result<T, BoostError>;

impl BoostError {
    pub fn not_found(kind: &str, id: &str) -> Self {
        BoostError::NotFound(format!("{kind} {id} not found"))
    }
}
