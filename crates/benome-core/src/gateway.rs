//! Payment gateway seam.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};

use anyhow::{anyhow, bail, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tokio::sync::Mutex;

use crate::payment::{PaymentMetadata, PaymentMethod, PaymentStatus};

/// What the engine asks a gateway to collect.
#[derive(Debug, Clone, Serialize)]
pub struct PaymentIntent {
    pub payment_id: String,
    pub amount: i64,
    pub currency: String,
    pub description: String,
    pub callback_url: String,
    pub metadata: PaymentMetadata,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GatewayCheckout {
    pub payment_url: String,
    pub transaction_id: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct GatewayVerification {
    pub status: PaymentStatus,
    pub amount: Option<i64>,
    pub raw: serde_json::Value,
}

#[async_trait]
pub trait PaymentGateway: Send + Sync + 'static {
    fn method(&self) -> PaymentMethod;

    async fn initialize_payment(&self, intent: &PaymentIntent) -> Result<GatewayCheckout>;

    /// Ask the gateway for the authoritative status of a transaction.
    async fn verify_payment(&self, transaction_id: &str) -> Result<GatewayVerification>;
}

/// In-process gateway for development and tests.
///
/// Checkouts are settled by calling [`SandboxGateway::settle`]; until then
/// verification reports `pending`.
pub struct SandboxGateway {
    base_url: String,
    transactions: Mutex<HashMap<String, SandboxTransaction>>,
    unavailable: AtomicBool,
}

#[derive(Debug, Clone)]
struct SandboxTransaction {
    amount: i64,
    status: PaymentStatus,
}

impl SandboxGateway {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            transactions: Mutex::new(HashMap::new()),
            unavailable: AtomicBool::new(false),
        }
    }

    /// Simulate a gateway outage: every call fails until reset.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    pub async fn settle(&self, transaction_id: &str, status: PaymentStatus) -> Result<()> {
        let mut transactions = self.transactions.lock().await;
        let tx = transactions
            .get_mut(transaction_id)
            .ok_or_else(|| anyhow!("unknown sandbox transaction {transaction_id}"))?;
        tx.status = status;
        Ok(())
    }

    fn check_available(&self) -> Result<()> {
        if self.unavailable.load(Ordering::SeqCst) {
            bail!("sandbox gateway unavailable");
        }
        Ok(())
    }
}

#[async_trait]
impl PaymentGateway for SandboxGateway {
    fn method(&self) -> PaymentMethod {
        PaymentMethod::Sandbox
    }

    async fn initialize_payment(&self, intent: &PaymentIntent) -> Result<GatewayCheckout> {
        self.check_available()?;
        let transaction_id = format!("sbx_{}", intent.payment_id);
        self.transactions.lock().await.insert(
            transaction_id.clone(),
            SandboxTransaction {
                amount: intent.amount,
                status: PaymentStatus::Pending,
            },
        );
        Ok(GatewayCheckout {
            payment_url: format!("{}/sandbox/checkout/{}", self.base_url, transaction_id),
            transaction_id,
        })
    }

    async fn verify_payment(&self, transaction_id: &str) -> Result<GatewayVerification> {
        self.check_available()?;
        let transactions = self.transactions.lock().await;
        let tx = transactions
            .get(transaction_id)
            .ok_or_else(|| anyhow!("unknown sandbox transaction {transaction_id}"))?;
        Ok(GatewayVerification {
            status: tx.status,
            amount: Some(tx.amount),
            raw: json!({
                "id": transaction_id,
                "status": tx.status.as_str(),
                "amount": tx.amount,
            }),
        })
    }
}
