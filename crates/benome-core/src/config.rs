use std::time::Duration;

#[derive(Debug, Clone)]
pub struct Config {
    pub port: u16,
    pub data_dir: String,
    pub duckdb_memory_limit: String,
    pub auth_mode: AuthMode,
    pub gateway: GatewayMode,
    /// Base URL this service is reachable at; the payment callback URL is
    /// derived from it.
    pub public_url: String,
    pub currency: String,
    pub payment_ttl_minutes: i64,
    pub package_cache_ttl_seconds: u64,
    pub sweep_interval_seconds: u64,
    pub cors_origins: Vec<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum AuthMode {
    /// Caller identity is taken from `x-user-id` / `x-user-role` headers.
    /// Development and tests only.
    None,
    /// HS256 bearer tokens signed with the Supabase JWT secret.
    Jwt(String),
}

#[derive(Debug, Clone, PartialEq)]
pub enum GatewayMode {
    Sandbox,
    FedaPay { secret_key: String, live: bool },
}

impl Config {
    pub fn from_env() -> Result<Self, String> {
        Ok(Self {
            port: std::env::var("BENOME_PORT")
                .unwrap_or_else(|_| "3000".to_string())
                .parse()
                .map_err(|e| format!("invalid port: {e}"))?,
            data_dir: std::env::var("BENOME_DATA_DIR").unwrap_or_else(|_| "./data".to_string()),
            duckdb_memory_limit: std::env::var("BENOME_DUCKDB_MEMORY")
                .unwrap_or_else(|_| "1GB".to_string()),
            auth_mode: {
                let raw = std::env::var("BENOME_AUTH").unwrap_or_else(|_| "jwt".to_string());
                match raw.as_str() {
                    "none" => AuthMode::None,
                    _ => {
                        let secret = std::env::var("BENOME_JWT_SECRET").map_err(|_| {
                            "BENOME_JWT_SECRET required when BENOME_AUTH=jwt".to_string()
                        })?;
                        AuthMode::Jwt(secret)
                    }
                }
            },
            gateway: {
                let raw =
                    std::env::var("BENOME_GATEWAY").unwrap_or_else(|_| "sandbox".to_string());
                match raw.as_str() {
                    "fedapay" => {
                        let secret_key = std::env::var("BENOME_FEDAPAY_SECRET_KEY").map_err(|_| {
                            "BENOME_FEDAPAY_SECRET_KEY required when BENOME_GATEWAY=fedapay"
                                .to_string()
                        })?;
                        let live = std::env::var("BENOME_FEDAPAY_ENV")
                            .map(|v| v == "live")
                            .unwrap_or(false);
                        GatewayMode::FedaPay { secret_key, live }
                    }
                    _ => GatewayMode::Sandbox,
                }
            },
            public_url: std::env::var("BENOME_PUBLIC_URL")
                .unwrap_or_else(|_| "http://localhost:3000".to_string()),
            currency: std::env::var("BENOME_CURRENCY").unwrap_or_else(|_| "XOF".to_string()),
            payment_ttl_minutes: std::env::var("BENOME_PAYMENT_TTL_MINUTES")
                .ok()
                .and_then(|v| v.parse::<i64>().ok())
                .map(|v| v.clamp(5, 24 * 60))
                .unwrap_or(30),
            package_cache_ttl_seconds: std::env::var("BENOME_PACKAGE_CACHE_TTL_SECONDS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(300),
            sweep_interval_seconds: std::env::var("BENOME_SWEEP_INTERVAL_SECONDS")
                .ok()
                .and_then(|v| v.parse::<u64>().ok())
                .map(|v| v.clamp(10, 3600))
                .unwrap_or(60),
            cors_origins: std::env::var("BENOME_CORS_ORIGINS")
                .map(|v| v.split(',').map(str::to_string).collect())
                .unwrap_or_default(),
        })
    }

    pub fn package_cache_ttl(&self) -> Duration {
        Duration::from_secs(self.package_cache_ttl_seconds)
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_seconds)
    }

    pub fn payment_ttl(&self) -> chrono::Duration {
        chrono::Duration::minutes(self.payment_ttl_minutes)
    }

    pub fn callback_url(&self) -> String {
        format!(
            "{}/api/payments/callback",
            self.public_url.trim_end_matches('/')
        )
    }
}
