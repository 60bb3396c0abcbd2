use anyhow::{Context, Result};
use rand::Rng;
use std::env;
use std::str::FromStr;

pub const DEFAULT_CORS_ORIGINS: &[&str] = &[
    "http://localhost",
    "http://localhost:3000",
    "http://127.0.0.1",
    "http://127.0.0.1:3000",
];

#[derive(Debug, Clone)]
pub struct ServerConfig {
    // Server
    pub host: String,
    pub port: u16,
    pub debug: bool,

    // Database
    pub database_url: String,

    // Auth
    pub secret_key: String,
    pub access_token_expire_minutes: i64, // 30
    pub auth_max_failures: u32,           // lockout after 5 failures
    pub auth_failure_window_secs: u64,    // within 5 minutes
    pub auth_lockout_secs: u64,           // for 15 minutes

    // Market data
    pub finnhub_api_key: Option<String>,
    pub finnhub_rate_limit: usize,        // requests per minute
    pub quote_cache_ttl_secs: i64,        // 600
    pub quote_cache_capacity: usize,
    pub market_update_interval_secs: u64, // 5
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8000,
            debug: true,
            database_url: "sqlite:financial_dashboard.db".to_string(),
            secret_key: String::new(),
            access_token_expire_minutes: 30,
            auth_max_failures: 5,
            auth_failure_window_secs: 300,
            auth_lockout_secs: 900,
            finnhub_api_key: None,
            finnhub_rate_limit: 60,
            quote_cache_ttl_secs: market_service::cache::DEFAULT_TTL_SECS,
            quote_cache_capacity: market_service::cache::DEFAULT_CAPACITY,
            market_update_interval_secs: 5,
        }
    }
}

impl ServerConfig {
    /// Load `.env` (if present) and read settings from the environment.
    /// Unset values fall back to defaults; unparsable ones are errors.
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok();
        let defaults = Self::default();

        let secret_key = match env::var("SECRET_KEY") {
            Ok(key) if !key.trim().is_empty() => key,
            _ => {
                tracing::warn!("SECRET_KEY not set; issued tokens will not survive a restart");
                random_secret()
            }
        };

        let config = Self {
            host: env::var("HOST").unwrap_or(defaults.host),
            port: parse_var("PORT", defaults.port)?,
            debug: parse_var("DEBUG", defaults.debug)?,
            database_url: env::var("DATABASE_URL").unwrap_or(defaults.database_url),
            secret_key,
            access_token_expire_minutes: parse_var(
                "ACCESS_TOKEN_EXPIRE_MINUTES",
                defaults.access_token_expire_minutes,
            )?,
            auth_max_failures: parse_var("AUTH_MAX_FAILURES", defaults.auth_max_failures)?,
            auth_failure_window_secs: parse_var(
                "AUTH_FAILURE_WINDOW_SECS",
                defaults.auth_failure_window_secs,
            )?,
            auth_lockout_secs: parse_var("AUTH_LOCKOUT_SECS", defaults.auth_lockout_secs)?,
            finnhub_api_key: env::var("FINNHUB_API_KEY").ok().filter(|k| !k.trim().is_empty()),
            finnhub_rate_limit: parse_var("FINNHUB_RATE_LIMIT", defaults.finnhub_rate_limit)?,
            quote_cache_ttl_secs: parse_var("QUOTE_CACHE_TTL_SECS", defaults.quote_cache_ttl_secs)?,
            quote_cache_capacity: parse_var("QUOTE_CACHE_CAPACITY", defaults.quote_cache_capacity)?,
            market_update_interval_secs: parse_var(
                "MARKET_UPDATE_INTERVAL_SECS",
                defaults.market_update_interval_secs,
            )?,
        };

        Ok(config)
    }

    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

fn parse_var<T>(key: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match env::var(key) {
        Ok(raw) => raw
            .trim()
            .parse()
            .with_context(|| format!("invalid value for {}: {:?}", key, raw)),
        Err(_) => Ok(default),
    }
}

fn random_secret() -> String {
    let bytes: [u8; 32] = rand::thread_rng().gen();
    hex::encode(bytes)
}
