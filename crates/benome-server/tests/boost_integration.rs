use std::sync::Arc;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use chrono::Utc;
use http_body_util::BodyExt;
use serde_json::{json, Value};
use tower::ServiceExt;

use benome_core::config::{AuthMode, Config, GatewayMode};
use benome_core::ledger::ListingDirectory;
use benome_core::listing::{Listing, ListingCategory};
use benome_duckdb::DuckDbBackend;
use benome_server::app::build_app;
use benome_server::state::AppState;

/// Build a test Config with AuthMode::None (callers identified by headers).
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

/// Fresh in-memory backend + state + app with two mirrored listings.
async fn setup() -> (Arc<AppState>, axum::Router) {
    let db = DuckDbBackend::open_in_memory().expect("in-memory DuckDB");
    for (id, owner, title, category) in [
        ("lst_villa", "usr_ama", "Villa 4 pièces à Cotonou", ListingCategory::RealEstate),
        ("lst_corolla", "usr_kofi", "Toyota Corolla 2015", ListingCategory::Automobile),
    ] {
        db.upsert_listing(&Listing {
            id: id.to_string(),
            user_id: owner.to_string(),
            title: title.to_string(),
            category,
            created_at: Utc::now(),
        })
        .await
        .expect("seed listing");
    }
    let state = Arc::new(AppState::new(db, test_config()).expect("state"));
    let app = build_app(Arc::clone(&state));
    (state, app)
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

fn request(method: &str, uri: &str, user: Option<&str>, body: Option<Value>) -> Request<Body> {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(user) = user {
        builder = builder.header("x-user-id", user);
    }
    match body {
        Some(body) => builder
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .expect("build request"),
        None => builder.body(Body::empty()).expect("build request"),
    }
}

async fn send(app: &axum::Router, req: Request<Body>) -> (StatusCode, Value) {
    let response = app.clone().oneshot(req).await.expect("request");
    let status = response.status();
    (status, json_body(response).await)
}

async fn purchase(app: &axum::Router, listing_id: &str, package_id: &str, user: &str) -> (StatusCode, Value) {
    send(
        app,
        request(
            "POST",
            "/api/boosts",
            Some(user),
            Some(json!({ "listing_id": listing_id, "package_id": package_id })),
        ),
    )
    .await
}

/// Purchase and settle through the sandbox checkout page.
async fn buy_and_pay(app: &axum::Router, listing_id: &str, package_id: &str, user: &str) -> Value {
    let (status, body) = purchase(app, listing_id, package_id, user).await;
    assert_eq!(status, StatusCode::CREATED, "purchase failed: {body}");
    let tx = body["data"]["payment"]["transaction_id"]
        .as_str()
        .expect("transaction id")
        .to_string();
    let (status, paid) = send(
        app,
        request("GET", &format!("/sandbox/checkout/{tx}"), None, None),
    )
    .await;
    assert_eq!(status, StatusCode::OK, "checkout failed: {paid}");
    assert_eq!(paid["data"]["outcome"], "activated");
    body
}

#[tokio::test]
async fn test_public_catalog_lists_seeded_packages_by_price() {
    let (_state, app) = setup().await;

    let (status, body) = send(&app, request("GET", "/api/packages", None, None)).await;
    assert_eq!(status, StatusCode::OK);
    let ids: Vec<&str> = body["data"]
        .as_array()
        .expect("array")
        .iter()
        .map(|p| p["id"].as_str().expect("id"))
        .collect();
    assert_eq!(ids, vec!["pkg_boost3", "pkg_boost7", "pkg_boost30"]);

    let (status, body) = send(&app, request("GET", "/api/packages/pkg_boost7", None, None)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["price"], 5000);
    assert_eq!(body["data"]["duration_days"], 7);

    let (status, body) = send(&app, request("GET", "/api/packages/pkg_nope", None, None)).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"]["code"], "not_found");
}

#[tokio::test]
async fn test_purchase_requires_identity() {
    let (_state, app) = setup().await;

    let (status, body) = send(
        &app,
        request(
            "POST",
            "/api/boosts",
            None,
            Some(json!({ "listing_id": "lst_villa", "package_id": "pkg_boost7" })),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["error"]["code"], "unauthorized");
}

#[tokio::test]
async fn test_purchase_opens_pending_boost_with_checkout_url() {
    let (_state, app) = setup().await;

    let (status, body) = purchase(&app, "lst_villa", "pkg_boost7", "usr_ama").await;
    assert_eq!(status, StatusCode::CREATED);
    let data = &body["data"];
    assert_eq!(data["boost"]["status"], "pending");
    assert_eq!(data["boost"]["listing_id"], "lst_villa");
    assert!(data["boost"]["start_date"].is_null());
    assert_eq!(data["payment"]["status"], "pending");
    assert_eq!(data["payment"]["amount"], 5000);
    assert_eq!(data["payment"]["currency"], "XOF");
    let tx = data["payment"]["transaction_id"].as_str().expect("tx");
    assert_eq!(
        data["payment_url"],
        format!("http://localhost:3000/sandbox/checkout/{tx}")
    );

    // Pending boosts do not count as boosted yet.
    let (status, view) = send(&app, request("GET", "/api/listings/lst_villa/boost", None, None)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(view["data"]["has_active_boost"], false);
    assert_eq!(view["data"]["current_boost"]["status"], "pending");
}

#[tokio::test]
async fn test_purchase_rejects_bad_input_and_strangers() {
    let (_state, app) = setup().await;

    let (status, body) = purchase(&app, "  ", "pkg_boost7", "usr_ama").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["code"], "validation_error");

    let (status, _) = purchase(&app, "lst_villa", "pkg_boost7", "usr_kofi").await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, _) = purchase(&app, "lst_missing", "pkg_boost7", "usr_ama").await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, _) = purchase(&app, "lst_villa", "pkg_missing", "usr_ama").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_second_purchase_conflicts_while_boost_open() {
    let (_state, app) = setup().await;

    let (status, _) = purchase(&app, "lst_villa", "pkg_boost3", "usr_ama").await;
    assert_eq!(status, StatusCode::CREATED);

    let (status, body) = purchase(&app, "lst_villa", "pkg_boost30", "usr_ama").await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["error"]["code"], "conflict");

    // Other listings are unaffected.
    let (status, _) = purchase(&app, "lst_corolla", "pkg_boost3", "usr_kofi").await;
    assert_eq!(status, StatusCode::CREATED);
}

#[tokio::test]
async fn test_checkout_activates_boost_and_boosts_visibility() {
    let (_state, app) = setup().await;

    let bought = buy_and_pay(&app, "lst_villa", "pkg_boost7", "usr_ama").await;
    let boost_id = bought["data"]["boost"]["id"].as_str().expect("boost id");

    let (status, view) = send(&app, request("GET", "/api/listings/lst_villa/boost", None, None)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(view["data"]["has_active_boost"], true);
    assert_eq!(view["data"]["current_boost"]["id"], boost_id);
    assert_eq!(view["data"]["current_boost"]["status"], "active");
    assert!(view["data"]["current_boost"]["end_date"].is_string());

    let (status, ranked) = send(
        &app,
        request(
            "POST",
            "/api/visibility",
            None,
            Some(json!({ "listing_ids": ["lst_corolla", "lst_villa", "lst_unknown"] })),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let ranked = ranked["data"].as_array().expect("array");
    assert_eq!(ranked.len(), 3);
    assert_eq!(ranked[0]["listing_id"], "lst_villa");
    assert_eq!(ranked[0]["badge"], "premium");
    assert_eq!(ranked[0]["boost_id"], boost_id);
    assert_eq!(ranked[1]["listing_id"], "lst_corolla");
    assert_eq!(ranked[1]["badge"], "none");
    assert!(ranked[0]["rank_factor"].as_f64() > ranked[1]["rank_factor"].as_f64());
}

#[tokio::test]
async fn test_visibility_rejects_oversized_batches() {
    let (_state, app) = setup().await;

    let ids: Vec<String> = (0..201).map(|i| format!("lst_{i}")).collect();
    let (status, body) = send(
        &app,
        request("POST", "/api/visibility", None, Some(json!({ "listing_ids": ids }))),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["code"], "validation_error");
}

#[tokio::test]
async fn test_duplicate_callbacks_are_idempotent() {
    let (_state, app) = setup().await;

    let bought = buy_and_pay(&app, "lst_villa", "pkg_boost3", "usr_ama").await;
    let tx = bought["data"]["payment"]["transaction_id"].as_str().expect("tx");
    let boost_id = bought["data"]["boost"]["id"].as_str().expect("boost id");

    let (_, before) = send(&app, request("GET", &format!("/api/boosts/{boost_id}"), Some("usr_ama"), None)).await;

    for _ in 0..3 {
        let (status, body) = send(
            &app,
            request(
                "GET",
                &format!("/api/payments/callback?id={tx}&status=approved"),
                None,
                None,
            ),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"]["outcome"], "already_processed");
        assert_eq!(body["data"]["payment_status"], "completed");
    }

    let (_, after) = send(&app, request("GET", &format!("/api/boosts/{boost_id}"), Some("usr_ama"), None)).await;
    assert_eq!(before["data"]["end_date"], after["data"]["end_date"]);
    assert_eq!(after["data"]["status"], "active");
}

#[tokio::test]
async fn test_callback_before_settlement_reports_pending() {
    let (_state, app) = setup().await;

    let (_, bought) = purchase(&app, "lst_villa", "pkg_boost3", "usr_ama").await;
    let tx = bought["data"]["payment"]["transaction_id"].as_str().expect("tx");

    let (status, body) = send(
        &app,
        request(
            "GET",
            &format!("/api/payments/callback?transaction_id={tx}&status=approved"),
            None,
            None,
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["outcome"], "pending");

    let (_, view) = send(&app, request("GET", "/api/listings/lst_villa/boost", None, None)).await;
    assert_eq!(view["data"]["current_boost"]["status"], "pending");
}

#[tokio::test]
async fn test_callback_errors() {
    let (_state, app) = setup().await;

    let (status, body) = send(&app, request("GET", "/api/payments/callback", None, None)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["code"], "validation_error");

    let (status, body) = send(
        &app,
        request("GET", "/api/payments/callback?id=sbx_unknown", None, None),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"]["code"], "not_found");
}

#[tokio::test]
async fn test_failed_checkout_cancels_boost_and_frees_listing() {
    let (_state, app) = setup().await;

    let (_, bought) = purchase(&app, "lst_villa", "pkg_boost7", "usr_ama").await;
    let tx = bought["data"]["payment"]["transaction_id"].as_str().expect("tx");

    let (status, body) = send(
        &app,
        request("GET", &format!("/sandbox/checkout/{tx}?status=failed"), None, None),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["outcome"], "payment_failed");
    assert_eq!(body["data"]["boost_cancelled"], true);

    let (status, _) = purchase(&app, "lst_villa", "pkg_boost7", "usr_ama").await;
    assert_eq!(status, StatusCode::CREATED);
}

#[tokio::test]
async fn test_sandbox_checkout_rejects_unknown_status() {
    let (_state, app) = setup().await;

    let (_, bought) = purchase(&app, "lst_villa", "pkg_boost7", "usr_ama").await;
    let tx = bought["data"]["payment"]["transaction_id"].as_str().expect("tx");

    let (status, _) = send(
        &app,
        request("GET", &format!("/sandbox/checkout/{tx}?status=refunded"), None, None),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_cancel_rules() {
    let (_state, app) = setup().await;

    let bought = buy_and_pay(&app, "lst_villa", "pkg_boost7", "usr_ama").await;
    let boost_id = bought["data"]["boost"]["id"].as_str().expect("boost id");
    let uri = format!("/api/boosts/{boost_id}/cancel");

    let (status, _) = send(&app, request("POST", &uri, Some("usr_kofi"), None)).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, body) = send(&app, request("POST", &uri, Some("usr_ama"), None)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["status"], "cancelled");
    assert_eq!(body["data"]["cancelled_by"], "usr_ama");

    let (status, body) = send(&app, request("POST", &uri, Some("usr_ama"), None)).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["error"]["code"], "invalid_state");

    let (_, view) = send(&app, request("GET", "/api/listings/lst_villa/boost", None, None)).await;
    assert_eq!(view["data"]["has_active_boost"], false);
}

#[tokio::test]
async fn test_payment_after_cancel_is_rejected_without_retry() {
    let (state, app) = setup().await;

    let (_, bought) = purchase(&app, "lst_villa", "pkg_boost7", "usr_ama").await;
    let boost_id = bought["data"]["boost"]["id"].as_str().expect("boost id");
    let tx = bought["data"]["payment"]["transaction_id"].as_str().expect("tx");

    let (status, _) = send(
        &app,
        request("POST", &format!("/api/boosts/{boost_id}/cancel"), Some("usr_ama"), None),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    // Settle at the gateway only, then deliver the callback.
    state
        .sandbox
        .as_ref()
        .expect("sandbox gateway")
        .settle(tx, benome_core::payment::PaymentStatus::Completed)
        .await
        .expect("settle");
    let (status, body) = send(
        &app,
        request("GET", &format!("/api/payments/callback?id={tx}"), None, None),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["outcome"], "rejected");

    let (_, boost) = send(&app, request("GET", &format!("/api/boosts/{boost_id}"), Some("usr_ama"), None)).await;
    assert_eq!(boost["data"]["status"], "cancelled");
}

#[tokio::test]
async fn test_renew_rules() {
    let (_state, app) = setup().await;

    let (_, bought) = purchase(&app, "lst_corolla", "pkg_boost3", "usr_kofi").await;
    let boost_id = bought["data"]["boost"]["id"].as_str().expect("boost id");
    let tx = bought["data"]["payment"]["transaction_id"].as_str().expect("tx");
    let uri = format!("/api/boosts/{boost_id}/renew");

    // Pending boosts are not renewable.
    let (status, body) = send(&app, request("POST", &uri, Some("usr_kofi"), None)).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["error"]["code"], "invalid_state");

    let (status, _) = send(
        &app,
        request("GET", &format!("/sandbox/checkout/{tx}"), None, None),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    // Still running: the listing already holds an open boost.
    let (status, body) = send(&app, request("POST", &uri, Some("usr_kofi"), None)).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["error"]["code"], "conflict");

    let (status, _) = send(&app, request("POST", &uri, Some("usr_ama"), None)).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn test_get_boost_is_owner_only() {
    let (_state, app) = setup().await;

    let (_, bought) = purchase(&app, "lst_villa", "pkg_boost3", "usr_ama").await;
    let boost_id = bought["data"]["boost"]["id"].as_str().expect("boost id");
    let uri = format!("/api/boosts/{boost_id}");

    let (status, body) = send(&app, request("GET", &uri, Some("usr_ama"), None)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["id"], boost_id);

    let (status, _) = send(&app, request("GET", &uri, Some("usr_kofi"), None)).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, _) = send(&app, request("GET", "/api/boosts/bst_missing", Some("usr_ama"), None)).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}
