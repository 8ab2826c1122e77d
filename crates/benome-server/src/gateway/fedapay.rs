//! FedaPay REST client.
//!
//! Authenticates with the account secret key as a bearer token. A checkout is
//! opened in two calls: create the transaction, then request its payment
//! token, whose `url` is where the buyer is redirected.

use std::time::Duration;

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};
use thiserror::Error;
use url::Url;

use benome_core::{
    gateway::{GatewayCheckout, GatewayVerification, PaymentGateway, PaymentIntent},
    payment::{PaymentMethod, PaymentStatus},
};

pub const SANDBOX_API_BASE: &str = "https://sandbox-api.fedapay.com/";
pub const LIVE_API_BASE: &str = "https://api.fedapay.com/";

const HTTP_TIMEOUT_SECONDS: u64 = 15;

#[derive(Debug, Error)]
pub enum FedaPayError {
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("fedapay api error status={status} body={body}")]
    Api { status: u16, body: String },

    #[error("invalid response: {0}")]
    InvalidResponse(String),
}

/// The fields of a FedaPay transaction the engine relies on.
#[derive(Debug, Clone, PartialEq)]
pub struct FedaPayTransaction {
    pub id: String,
    pub status: String,
    pub amount: Option<i64>,
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    url: String,
}

pub struct FedaPayGateway {
    client: reqwest::Client,
    base_url: Url,
    secret_key: String,
}

impl FedaPayGateway {
    pub fn new(secret_key: &str, live: bool) -> Result<Self> {
        let base = if live { LIVE_API_BASE } else { SANDBOX_API_BASE };
        Self::with_base_url(secret_key, base)
    }

    pub fn with_base_url(secret_key: &str, base_url: &str) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(HTTP_TIMEOUT_SECONDS))
            .build()?;
        Ok(Self {
            client,
            base_url: Url::parse(base_url)?,
            secret_key: secret_key.to_string(),
        })
    }

    fn endpoint(&self, path: &str) -> Result<Url> {
        self.base_url
            .join(path)
            .map_err(|e| anyhow!("invalid FedaPay endpoint {path}: {e}"))
    }

    async fn send(&self, request: reqwest::RequestBuilder) -> Result<Value, FedaPayError> {
        let resp = request.bearer_auth(&self.secret_key).send().await?;
        let status = resp.status();
        let body = resp.text().await?;
        if !status.is_success() {
            return Err(FedaPayError::Api {
                status: status.as_u16(),
                body,
            });
        }
        serde_json::from_str(&body)
            .map_err(|e| FedaPayError::InvalidResponse(format!("{e}; body={body}")))
    }
}

/// Extract the transaction object from a FedaPay response.
///
/// Single-resource responses wrap the object under `"v1/transaction"`.
pub fn parse_transaction(body: &Value) -> Result<FedaPayTransaction, FedaPayError> {
    let tx = body.get("v1/transaction").unwrap_or(body);
    let id = match tx.get("id") {
        Some(Value::Number(n)) => n.to_string(),
        Some(Value::String(s)) if !s.is_empty() => s.clone(),
        _ => {
            return Err(FedaPayError::InvalidResponse(
                "transaction id missing".to_string(),
            ))
        }
    };
    let status = tx
        .get("status")
        .and_then(Value::as_str)
        .ok_or_else(|| FedaPayError::InvalidResponse("transaction status missing".to_string()))?
        .to_string();
    let amount = tx.get("amount").and_then(Value::as_i64);
    Ok(FedaPayTransaction { id, status, amount })
}

#[async_trait]
impl PaymentGateway for FedaPayGateway {
    fn method(&self) -> PaymentMethod {
        PaymentMethod::Fedapay
    }

    async fn initialize_payment(&self, intent: &PaymentIntent) -> Result<GatewayCheckout> {
        let body = json!({
            "description": intent.description,
            "amount": intent.amount,
            "currency": { "iso": intent.currency },
            "callback_url": intent.callback_url,
            "merchant_reference": intent.payment_id,
            "custom_metadata": intent.metadata,
        });
        let created = self
            .send(self.client.post(self.endpoint("v1/transactions")?).json(&body))
            .await?;
        let tx = parse_transaction(&created)?;

        let token: TokenResponse = serde_json::from_value(
            self.send(
                self.client
                    .post(self.endpoint(&format!("v1/transactions/{}/token", tx.id))?),
            )
            .await?,
        )
        .map_err(|e| FedaPayError::InvalidResponse(e.to_string()))?;

        tracing::debug!(
            payment_id = %intent.payment_id,
            transaction_id = %tx.id,
            "FedaPay checkout opened"
        );
        Ok(GatewayCheckout {
            payment_url: token.url,
            transaction_id: tx.id,
        })
    }

    async fn verify_payment(&self, transaction_id: &str) -> Result<GatewayVerification> {
        let raw = self
            .send(
                self.client
                    .get(self.endpoint(&format!("v1/transactions/{transaction_id}"))?),
            )
            .await?;
        let tx = parse_transaction(&raw)?;
        let status = PaymentStatus::from_gateway(&tx.status).ok_or_else(|| {
            anyhow!(
                "unrecognised FedaPay status '{}' for transaction {transaction_id}",
                tx.status
            )
        })?;
        Ok(GatewayVerification {
            status,
            amount: tx.amount,
            raw,
        })
    }
}
