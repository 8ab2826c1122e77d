use anyhow::{anyhow, Result};
use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};

use benome_core::caller::{Caller, CallerRole};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppMetadata {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
}

/// Supabase access-token claims. Supabase sets `role` to `authenticated`;
/// administrators carry `app_metadata.role = "admin"`.
#[derive(Debug, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String,
    pub exp: i64,
    #[serde(default)]
    pub iat: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
    #[serde(default)]
    pub app_metadata: AppMetadata,
}

impl Claims {
    pub fn is_admin(&self) -> bool {
        self.app_metadata.role.as_deref() == Some("admin") || self.role.as_deref() == Some("admin")
    }

    pub fn into_caller(self) -> Caller {
        let role = if self.is_admin() {
            CallerRole::Admin
        } else {
            CallerRole::User
        };
        Caller {
            user_id: self.sub,
            role,
        }
    }
}

/// Encode an HS256 token for `user_id`, valid for `ttl`.
///
/// Used by operator tooling and tests; production tokens come from Supabase.
pub fn encode_jwt(secret: &str, user_id: &str, admin: bool, ttl: Duration) -> Result<String> {
    let now = Utc::now();
    let claims = Claims {
        sub: user_id.to_string(),
        exp: (now + ttl).timestamp(),
        iat: now.timestamp(),
        role: Some("authenticated".to_string()),
        app_metadata: AppMetadata {
            role: admin.then(|| "admin".to_string()),
        },
    };
    encode(
        &Header::new(Algorithm::HS256),
        &claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )
    .map_err(|e| anyhow!("encode_jwt: {}", e))
}

/// Decode and validate an HS256 token. Expiry is enforced; audience is not.
pub fn decode_jwt(token: &str, secret: &str) -> Result<Claims> {
    let mut validation = Validation::new(Algorithm::HS256);
    validation.validate_aud = false;
    let data = decode::<Claims>(token, &DecodingKey::from_secret(secret.as_bytes()), &validation)
        .map_err(|e| anyhow!("decode_jwt: {}", e))?;
    if data.claims.sub.is_empty() {
        return Err(anyhow!("decode_jwt: empty subject"));
    }
    Ok(data.claims)
}
