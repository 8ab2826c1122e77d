use std::sync::Arc;

use anyhow::Result;

use benome_core::{
    catalog::PackageCatalog,
    clock::{Clock, SystemClock},
    engine::{BoostEngine, EngineSettings},
    gateway::SandboxGateway,
};
use benome_duckdb::DuckDbBackend;

use crate::{config::Config, gateway::build_gateway};

/// Shared application state injected into every Axum handler via
/// [`axum::extract::State`].
pub struct AppState {
    /// The DuckDB backend. Internally uses `Arc<tokio::sync::Mutex<Connection>>`
    /// so it is already cheap to clone and async-safe.
    pub db: Arc<DuckDbBackend>,

    /// Parsed configuration, loaded once at startup from environment variables.
    pub config: Arc<Config>,

    /// Lifecycle engine; owns the package catalog and the payment gateway.
    pub engine: Arc<BoostEngine>,

    /// Set when `BENOME_GATEWAY=sandbox`: the in-process gateway behind the
    /// engine, exposed so the sandbox checkout page can settle transactions.
    pub sandbox: Option<Arc<SandboxGateway>>,
}

impl AppState {
    /// Construct a new `AppState` wrapping the given backend and config.
    pub fn new(db: DuckDbBackend, config: Config) -> Result<Self> {
        Self::with_clock(db, config, Arc::new(SystemClock))
    }

    /// Same as [`AppState::new`] with an explicit clock; tests pass a
    /// `ManualClock` to move through boost windows.
    pub fn with_clock(db: DuckDbBackend, config: Config, clock: Arc<dyn Clock>) -> Result<Self> {
        let db = Arc::new(db);
        let (gateway, sandbox) = build_gateway(&config)?;

        let catalog = Arc::new(PackageCatalog::new(
            db.clone(),
            Arc::clone(&clock),
            config.package_cache_ttl(),
        ));
        let settings = EngineSettings {
            currency: config.currency.clone(),
            payment_ttl: config.payment_ttl(),
            callback_url: config.callback_url(),
            ..EngineSettings::default()
        };
        let engine = Arc::new(BoostEngine::new(
            db.clone(),
            catalog,
            gateway,
            clock,
            settings,
        ));

        Ok(Self {
            db,
            config: Arc::new(config),
            engine,
            sandbox,
        })
    }
}
