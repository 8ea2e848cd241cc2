//! Configuration module - environment variable parsing

use std::env;
use std::net::SocketAddr;

/// Application configuration loaded from environment variables
#[derive(Clone, Debug)]
pub struct Config {
    /// Server binding address
    pub server_addr: SocketAddr,
    /// Log level (trace, debug, info, warn, error)
    pub log_level: String,
    /// Emit JSON log lines instead of the human-readable format
    pub log_json: bool,

    /// Supabase project URL
    pub supabase_url: String,
    /// Supabase service role key (bypasses RLS - server only!)
    pub supabase_service_role_key: String,
    /// Supabase JWT secret for session token verification
    pub supabase_jwt_secret: String,

    /// Shared secret presented by the scheduler on cron endpoints
    pub cron_secret: String,
    /// Allowed client origins for CORS (comma-separated)
    pub client_origin: String,

    /// eBay application credentials used for OAuth token refresh
    pub ebay_client_id: String,
    pub ebay_client_secret: String,
    /// eBay API root, overridable for the sandbox
    pub ebay_api_base: String,
    pub ebay_marketplace_id: String,
    /// Outbound eBay call budget
    pub ebay_requests_per_second: u32,

    /// Chat-completions endpoint used to write listing copy
    pub content_api_url: String,
    pub content_api_key: String,
    pub content_model: String,

    /// How far back the order sync looks, in days
    pub order_sync_days: i64,
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        // Hosting platforms provide PORT, fall back to SERVER_ADDR or default
        let server_addr = if let Ok(port) = env::var("PORT") {
            format!("0.0.0.0:{}", port)
        } else {
            env::var("SERVER_ADDR").unwrap_or_else(|_| "0.0.0.0:8080".to_string())
        };

        Ok(Self {
            server_addr: server_addr
                .parse()
                .map_err(|_| ConfigError::InvalidAddress)?,

            log_level: env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string()),
            log_json: env::var("LOG_FORMAT")
                .map(|v| v.eq_ignore_ascii_case("json"))
                .unwrap_or(false),

            supabase_url: required("SUPABASE_URL")?,
            supabase_service_role_key: required("SUPABASE_SERVICE_ROLE_KEY")?,
            supabase_jwt_secret: required("SUPABASE_JWT_SECRET")?,

            cron_secret: required("CRON_SECRET")?,
            client_origin: required("CLIENT_ORIGIN")?,

            ebay_client_id: required("EBAY_CLIENT_ID")?,
            ebay_client_secret: required("EBAY_CLIENT_SECRET")?,
            ebay_api_base: env::var("EBAY_API_BASE")
                .unwrap_or_else(|_| "https://api.ebay.com".to_string()),
            ebay_marketplace_id: env::var("EBAY_MARKETPLACE_ID")
                .unwrap_or_else(|_| "EBAY_GB".to_string()),
            ebay_requests_per_second: parsed_or("EBAY_REQUESTS_PER_SECOND", 5)?,

            content_api_url: required("CONTENT_API_URL")?,
            content_api_key: required("CONTENT_API_KEY")?,
            content_model: env::var("CONTENT_MODEL").unwrap_or_else(|_| "gpt-4o-mini".to_string()),

            order_sync_days: parsed_or("ORDER_SYNC_DAYS", 7)?,
        })
    }
}

fn required(key: &'static str) -> Result<String, ConfigError> {
    env::var(key).map_err(|_| ConfigError::Missing(key))
}

fn parsed_or<T: std::str::FromStr>(key: &'static str, default: T) -> Result<T, ConfigError> {
    match env::var(key) {
        Ok(raw) => raw.trim().parse().map_err(|_| ConfigError::Invalid(key)),
        Err(_) => Ok(default),
    }
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    Missing(&'static str),

    #[error("Invalid value for environment variable: {0}")]
    Invalid(&'static str),

    #[error("Invalid server address format")]
    InvalidAddress,
}
