use std::sync::Arc;

use axum::{
    http::HeaderValue,
    middleware::{from_fn, from_fn_with_state},
    routing::{get, post, put},
    Router,
};
use tower_http::{
    compression::CompressionLayer,
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};

use crate::{
    auth::middleware::{require_admin, require_auth},
    routes,
    state::AppState,
};

/// Construct the Axum [`Router`] with all routes and middleware attached.
///
/// Three route groups share one state:
///
/// - public: health, package catalog, listing boost status, visibility and
///   the gateway callback;
/// - authenticated: purchase, renew and cancel on the caller's own boosts;
/// - admin: everything under `/api/admin`, behind `require_auth` then
///   `require_admin`.
///
/// The sandbox checkout page is only mounted when the sandbox gateway is in
/// use.
pub fn build_app(state: Arc<AppState>) -> Router {
    let public = Router::new()
        .route("/health", get(routes::health::health))
        .route("/api/packages", get(routes::packages::list_packages))
        .route("/api/packages/{id}", get(routes::packages::get_package))
        .route(
            "/api/listings/{id}/boost",
            get(routes::boosts::listing_status),
        )
        .route("/api/visibility", post(routes::visibility::project))
        .route("/api/payments/callback", get(routes::payments::callback));

    let authed = Router::new()
        .route("/api/boosts", post(routes::boosts::purchase))
        .route("/api/boosts/{id}", get(routes::boosts::get_boost))
        .route("/api/boosts/{id}/renew", post(routes::boosts::renew))
        .route("/api/boosts/{id}/cancel", post(routes::boosts::cancel))
        .route_layer(from_fn_with_state(Arc::clone(&state), require_auth));

    let admin = Router::new()
        .route("/api/admin/boosts", get(routes::admin::list_boosts))
        .route("/api/admin/boosts/{id}/renew", post(routes::boosts::renew))
        .route("/api/admin/boosts/{id}/cancel", post(routes::boosts::cancel))
        .route("/api/admin/sweep", post(routes::admin::sweep))
        .route(
            "/api/admin/packages",
            get(routes::admin::list_packages).post(routes::admin::create_package),
        )
        .route(
            "/api/admin/packages/{id}",
            put(routes::admin::update_package),
        )
        .route(
            "/api/admin/listings/{id}",
            put(routes::admin::upsert_listing),
        )
        .route_layer(from_fn(require_admin))
        .route_layer(from_fn_with_state(Arc::clone(&state), require_auth));

    let mut router = Router::new().merge(public).merge(authed).merge(admin);
    if state.sandbox.is_some() {
        router = router.route(
            "/sandbox/checkout/{transaction_id}",
            get(routes::sandbox::checkout),
        );
    }

    let cors = cors_layer(&state.config.cors_origins);
    router
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .layer(CompressionLayer::new())
        .with_state(state)
}

/// Any origin when none are configured; otherwise only the listed ones.
/// Origins that are not valid header values are skipped.
fn cors_layer(origins: &[String]) -> CorsLayer {
    let base = CorsLayer::new().allow_methods(Any).allow_headers(Any);
    if origins.is_empty() {
        return base.allow_origin(Any);
    }
    let allowed: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|origin| match HeaderValue::from_str(origin.trim()) {
            Ok(value) => Some(value),
            Err(_) => {
                tracing::warn!(origin = %origin, "Ignoring invalid CORS origin");
                None
            }
        })
        .collect();
    base.allow_origin(allowed)
}
