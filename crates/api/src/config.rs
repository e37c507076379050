//! Application configuration loaded from environment variables.

use std::time::Duration;

use saga::{ClientConfig, SagaConfig};

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

/// Server configuration with sensible defaults.
///
/// Reads from environment variables:
/// - `HOST` / `PORT`: bind address (default `0.0.0.0:8003`)
/// - `DATABASE_URL`: Postgres connection string; in-memory store when unset
/// - `REDIS_URL`: Redis connection string; caching disabled when unset
/// - `USER_SERVICE_URL`, `PRODUCT_SERVICE_URL`, `INVENTORY_SERVICE_URL`,
///   `PAYMENT_SERVICE_URL`: base URLs of the collaborating services
/// - `HTTP_TIMEOUT_SECS`: per-call timeout for outbound requests (default 10)
/// - `SAGA_DEADLINE_SECS`: overall order-creation deadline (default 30, 0 disables)
/// - `ORDER_CURRENCY` (default `TRY`), `PAYMENT_METHOD` (default `CREDIT_CARD`)
/// - `RUST_LOG`: tracing filter directive (default `info`)
/// - `LOG_FORMAT`: `json` for JSON logs, anything else for text
#[derive(Debug, Clone)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub log_level: String,
    pub log_format: LogFormat,
    pub database_url: Option<String>,
    pub database_max_connections: u32,
    pub redis_url: Option<String>,
    pub user_service_url: String,
    pub product_service_url: String,
    pub inventory_service_url: String,
    pub payment_service_url: String,
    pub http_timeout: Duration,
    pub saga_deadline: Option<Duration>,
    pub currency: String,
    pub payment_method: String,
}

impl Config {
    /// Loads configuration from environment variables, falling back to defaults.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Loads configuration from an arbitrary key lookup.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();
        let non_empty = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        let secs = |key: &str| non_empty(key).and_then(|v| v.trim().parse::<u64>().ok());

        Self {
            host: non_empty("HOST").unwrap_or(defaults.host),
            port: non_empty("PORT")
                .and_then(|p| p.parse().ok())
                .unwrap_or(defaults.port),
            log_level: non_empty("RUST_LOG").unwrap_or(defaults.log_level),
            log_format: match non_empty("LOG_FORMAT").as_deref() {
                Some(f) if f.eq_ignore_ascii_case("json") => LogFormat::Json,
                _ => LogFormat::Text,
            },
            database_url: non_empty("DATABASE_URL"),
            database_max_connections: non_empty("DATABASE_MAX_CONNECTIONS")
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.database_max_connections),
            redis_url: non_empty("REDIS_URL"),
            user_service_url: non_empty("USER_SERVICE_URL").unwrap_or(defaults.user_service_url),
            product_service_url: non_empty("PRODUCT_SERVICE_URL")
                .unwrap_or(defaults.product_service_url),
            inventory_service_url: non_empty("INVENTORY_SERVICE_URL")
                .unwrap_or(defaults.inventory_service_url),
            payment_service_url: non_empty("PAYMENT_SERVICE_URL")
                .unwrap_or(defaults.payment_service_url),
            http_timeout: secs("HTTP_TIMEOUT_SECS")
                .filter(|s| *s > 0)
                .map(Duration::from_secs)
                .unwrap_or(defaults.http_timeout),
            saga_deadline: match secs("SAGA_DEADLINE_SECS") {
                Some(0) => None,
                Some(s) => Some(Duration::from_secs(s)),
                None => defaults.saga_deadline,
            },
            currency: non_empty("ORDER_CURRENCY").unwrap_or(defaults.currency),
            payment_method: non_empty("PAYMENT_METHOD").unwrap_or(defaults.payment_method),
        }
    }

    /// Returns the `"host:port"` bind address string.
    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Client settings for a collaborating service.
    pub fn client(&self, base_url: &str) -> ClientConfig {
        ClientConfig::new(base_url).with_timeout(self.http_timeout)
    }

    pub fn saga(&self) -> SagaConfig {
        SagaConfig {
            currency: self.currency.clone(),
            payment_method: self.payment_method.clone(),
            deadline: self.saga_deadline,
            ..SagaConfig::default()
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8003,
            log_level: "info".to_string(),
            log_format: LogFormat::Text,
            database_url: None,
            database_max_connections: 10,
            redis_url: None,
            user_service_url: "http://localhost:8001".to_string(),
            product_service_url: "http://localhost:8000".to_string(),
            inventory_service_url: "http://localhost:8002".to_string(),
            payment_service_url: "http://localhost:8085".to_string(),
            http_timeout: ClientConfig::DEFAULT_TIMEOUT,
            saga_deadline: Some(Duration::from_secs(30)),
            currency: "TRY".to_string(),
            payment_method: "CREDIT_CARD".to_string(),
        }
    }
}
