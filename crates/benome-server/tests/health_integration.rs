use std::sync::Arc;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use http_body_util::BodyExt;
use serde_json::Value;
use tower::ServiceExt;

use benome_core::config::{AuthMode, Config, GatewayMode};
use benome_duckdb::DuckDbBackend;
use benome_server::app::build_app;
use benome_server::state::AppState;

fn test_config() -> Config {
    Config {
        port: 0,
        data_dir: "/tmp/benome-test".to_string(),
        duckdb_memory_limit: "256MB".to_string(),
        auth_mode: AuthMode::None,
        gateway: GatewayMode::Sandbox,
        public_url: "http://localhost:3000".to_string(),
        currency: "XOF".to_string(),
        payment_ttl_minutes: 30,
        package_cache_ttl_seconds: 300,
        sweep_interval_seconds: 60,
        cors_origins: vec![],
    }
}

async fn json_body(response: axum::http::Response<Body>) -> Value {
    let bytes = response
        .into_body()
        .collect()
        .await
        .expect("read body")
        .to_bytes();
    serde_json::from_slice(&bytes).expect("parse JSON")
}

#[tokio::test]
async fn test_health_returns_200_when_db_reachable() {
    let db = DuckDbBackend::open_in_memory().expect("in-memory DuckDB");
    let state = Arc::new(AppState::new(db, test_config()).expect("state"));
    let app = build_app(state);

    let request = Request::builder()
        .method("GET")
        .uri("/health")
        .body(Body::empty())
        .expect("build request");

    let response = app.oneshot(request).await.expect("request");
    assert_eq!(response.status(), StatusCode::OK);

    let json = json_body(response).await;
    assert_eq!(json["status"], "ok");
    assert_eq!(json["version"], env!("CARGO_PKG_VERSION"));
    assert_eq!(json["gateway"], "sandbox");
}

#[tokio::test]
async fn test_sandbox_checkout_not_mounted_for_fedapay() {
    let db = DuckDbBackend::open_in_memory().expect("in-memory DuckDB");
    let mut config = test_config();
    config.gateway = GatewayMode::FedaPay {
        secret_key: "sk_sandbox_test".to_string(),
        live: false,
    };
    let state = Arc::new(AppState::new(db, config).expect("state"));
    assert!(state.sandbox.is_none());
    let app = build_app(state);

    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .uri("/sandbox/checkout/sbx_pay_1")
                .body(Body::empty())
                .expect("build request"),
        )
        .await
        .expect("request");
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    let response = app
        .oneshot(
            Request::builder()
                .uri("/health")
                .body(Body::empty())
                .expect("build request"),
        )
        .await
        .expect("request");
    let json = json_body(response).await;
    assert_eq!(json["gateway"], "fedapay");
}
