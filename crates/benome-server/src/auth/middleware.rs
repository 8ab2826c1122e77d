use std::sync::Arc;

use axum::{
    extract::{Request, State},
    http::{header, HeaderMap},
    middleware::Next,
    response::{IntoResponse, Response},
};

use benome_core::caller::{Caller, CallerRole};

use crate::{config::AuthMode, error::AppError, state::AppState};

use super::jwt::decode_jwt;

/// Resolve the caller and insert it as a request extension.
///
/// `BENOME_AUTH=jwt` requires a valid `Authorization: Bearer` token;
/// `BENOME_AUTH=none` trusts the `x-user-id` and `x-user-role` headers.
pub async fn require_auth(
    State(state): State<Arc<AppState>>,
    mut request: Request,
    next: Next,
) -> Response {
    let caller = match &state.config.auth_mode {
        AuthMode::Jwt(secret) => caller_from_bearer(request.headers(), secret),
        AuthMode::None => caller_from_headers(request.headers()),
    };
    match caller {
        Some(caller) => {
            request.extensions_mut().insert(caller);
            next.run(request).await
        }
        None => AppError::Unauthorized.into_response(),
    }
}

/// Reject callers without the admin role. Must run after [`require_auth`].
pub async fn require_admin(request: Request, next: Next) -> Response {
    match request.extensions().get::<Caller>() {
        Some(caller) if caller.is_admin() => next.run(request).await,
        Some(caller) => {
            tracing::warn!(user_id = %caller.user_id, path = %request.uri().path(), "Admin route refused");
            AppError::Forbidden("administrator privileges required".to_string()).into_response()
        }
        None => AppError::Unauthorized.into_response(),
    }
}

fn caller_from_bearer(headers: &HeaderMap, secret: &str) -> Option<Caller> {
    let token = headers
        .get(header::AUTHORIZATION)?
        .to_str()
        .ok()?
        .strip_prefix("Bearer ")?;
    match decode_jwt(token.trim(), secret) {
        Ok(claims) => Some(claims.into_caller()),
        Err(e) => {
            tracing::debug!(error = %e, "Bearer token rejected");
            None
        }
    }
}

fn caller_from_headers(headers: &HeaderMap) -> Option<Caller> {
    let user_id = headers
        .get("x-user-id")?
        .to_str()
        .ok()
        .map(str::trim)
        .filter(|v| !v.is_empty())?;
    let role = match headers.get("x-user-role").and_then(|v| v.to_str().ok()) {
        Some("admin") => CallerRole::Admin,
        _ => CallerRole::User,
    };
    Some(Caller {
        user_id: user_id.to_string(),
        role,
    })
}
