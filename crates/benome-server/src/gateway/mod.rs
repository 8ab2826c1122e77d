use std::sync::Arc;

use anyhow::Result;
use tracing::info;

use benome_core::gateway::{PaymentGateway, SandboxGateway};

use crate::config::{Config, GatewayMode};

pub mod fedapay;

use fedapay::FedaPayGateway;

/// Build the gateway selected by `BENOME_GATEWAY`.
///
/// The sandbox handle is returned separately so the sandbox checkout route
/// can settle its transactions.
pub fn build_gateway(
    config: &Config,
) -> Result<(Arc<dyn PaymentGateway>, Option<Arc<SandboxGateway>>)> {
    match &config.gateway {
        GatewayMode::FedaPay { secret_key, live } => {
            info!(live = *live, "FedaPay gateway enabled");
            let gateway = FedaPayGateway::new(secret_key, *live)?;
            Ok((Arc::new(gateway), None))
        }
        GatewayMode::Sandbox => {
            let sandbox = Arc::new(SandboxGateway::new(config.public_url.clone()));
            let gateway: Arc<dyn PaymentGateway> = sandbox.clone();
            Ok((gateway, Some(sandbox)))
        }
    }
}
