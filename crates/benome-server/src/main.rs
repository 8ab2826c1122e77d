use std::sync::Arc;

use anyhow::Result;
use tracing::info;

use benome_server::config::{AuthMode, Config, GatewayMode};
use benome_server::{app::build_app, scheduler, state::AppState};

/// `benome health`: liveness probe for Docker HEALTHCHECK.
///
/// Calls `GET http://localhost:$BENOME_PORT/health`.
/// Exits 0 if the server responds with HTTP 200, exits 1 otherwise.
fn run_health_check() -> ! {
    let port = std::env::var("BENOME_PORT").unwrap_or_else(|_| "3000".to_string());
    let url = format!("http://localhost:{}/health", port);
    match ureq::get(&url).call() {
        Ok(resp) if resp.status() == 200 => std::process::exit(0),
        _ => std::process::exit(1),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args: Vec<String> = std::env::args().collect();
    if args.get(1).map(|s| s.as_str()) == Some("health") {
        run_health_check();
    }
    // Structured JSON logging. Level controlled via RUST_LOG.
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("benome=info".parse()?),
        )
        .json()
        .init();

    let cfg = Config::from_env().map_err(|e| anyhow::anyhow!(e))?;

    std::fs::create_dir_all(&cfg.data_dir)?;
    let db_path = format!("{}/benome.db", cfg.data_dir);

    // Initialises the schema and seeds the default packages.
    let db = benome_duckdb::DuckDbBackend::open(&db_path, &cfg.duckdb_memory_limit)?;

    match &cfg.auth_mode {
        AuthMode::Jwt(_) => info!("Auth enabled (Supabase JWT)"),
        AuthMode::None => tracing::warn!(
            "Auth disabled (BENOME_AUTH=none): callers are identified by x-user-id headers"
        ),
    }
    match &cfg.gateway {
        GatewayMode::FedaPay { live, .. } => info!(live = *live, "Payment gateway: FedaPay"),
        GatewayMode::Sandbox => {
            tracing::warn!("Payment gateway: sandbox. Payments settle via /sandbox/checkout")
        }
    }

    let state = Arc::new(AppState::new(db, cfg.clone())?);

    {
        let state = Arc::clone(&state);
        tokio::spawn(async move {
            scheduler::run_sweep_loop(state).await;
        });
    }

    let addr = format!("0.0.0.0:{}", cfg.port);
    let app = build_app(Arc::clone(&state));

    info!(port = cfg.port, currency = %cfg.currency, "Benome boost service listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            tokio::signal::ctrl_c().await.ok();
        })
        .await?;

    Ok(())
}
