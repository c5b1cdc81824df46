//! Application configuration loaded from environment variables.

use std::time::Duration;

use domain::FulfillmentPolicy;
use fulfillment::{CoordinatorConfig, MERCADO_PAGO_BASE_URL};
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Invalid FULFILLMENT_POLICY: {0}")]
    InvalidPolicy(String),
}

/// Server configuration with sensible defaults.
///
/// Reads from environment variables:
/// - `HOST`, `PORT`: bind address (default `0.0.0.0:3000`)
/// - `RUST_LOG`: tracing filter directive (default `info`)
/// - `DATABASE_URL`: PostgreSQL connection string; when unset the server
///   runs on in-memory storage seeded with a demo customer and products
/// - `MERCADO_PAGO_ACCESS_TOKEN`, `MERCADO_PAGO_BASE_URL`: payment provider;
///   an in-memory provider is used when the token is unset
/// - `DISCORD_WEBHOOK_URL`: order notification sink; disabled when unset
/// - `FULFILLMENT_POLICY`: `best_effort` (default) or `all_or_nothing`
/// - `PIX_EXPIRATION_MINUTES` (default 30), `EXPIRY_SWEEP_INTERVAL_SECS`
///   (default 60), `CACHE_TTL_SECS` (default 30), `FULFILLMENT_LEASE_SECS`
///   (default 120)
#[derive(Debug, Clone)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub log_level: String,
    pub database_url: Option<String>,
    pub mercado_pago_access_token: Option<String>,
    pub mercado_pago_base_url: String,
    pub discord_webhook_url: Option<String>,
    pub fulfillment_policy: FulfillmentPolicy,
    pub pix_expiration_minutes: u32,
    pub expiry_sweep_interval_secs: u64,
    pub cache_ttl_secs: u64,
    pub fulfillment_lease_secs: u32,
}

impl Config {
    /// Loads configuration from environment variables, falling back to defaults.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds the configuration from any key lookup. Empty values count as unset.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let get = |key: &str| lookup(key).filter(|value| !value.trim().is_empty());
        let defaults = Self::default();

        let fulfillment_policy = match get("FULFILLMENT_POLICY") {
            Some(raw) => raw.trim().parse().map_err(ConfigError::InvalidPolicy)?,
            None => defaults.fulfillment_policy,
        };

        Ok(Self {
            host: get("HOST").unwrap_or(defaults.host),
            port: parse_or(get("PORT"), defaults.port),
            log_level: get("RUST_LOG").unwrap_or(defaults.log_level),
            database_url: get("DATABASE_URL"),
            mercado_pago_access_token: get("MERCADO_PAGO_ACCESS_TOKEN"),
            mercado_pago_base_url: get("MERCADO_PAGO_BASE_URL")
                .unwrap_or(defaults.mercado_pago_base_url),
            discord_webhook_url: get("DISCORD_WEBHOOK_URL"),
            fulfillment_policy,
            pix_expiration_minutes: parse_or(
                get("PIX_EXPIRATION_MINUTES"),
                defaults.pix_expiration_minutes,
            ),
            expiry_sweep_interval_secs: parse_or(
                get("EXPIRY_SWEEP_INTERVAL_SECS"),
                defaults.expiry_sweep_interval_secs,
            ),
            cache_ttl_secs: parse_or(get("CACHE_TTL_SECS"), defaults.cache_ttl_secs),
            fulfillment_lease_secs: parse_or(
                get("FULFILLMENT_LEASE_SECS"),
                defaults.fulfillment_lease_secs,
            ),
        })
    }

    /// Returns the `"host:port"` bind address string.
    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn coordinator_config(&self) -> CoordinatorConfig {
        CoordinatorConfig {
            policy: self.fulfillment_policy,
            lease_ttl: chrono::Duration::seconds(i64::from(self.fulfillment_lease_secs)),
            pix_expiration: chrono::Duration::minutes(i64::from(self.pix_expiration_minutes)),
        }
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.expiry_sweep_interval_secs.max(1))
    }

    pub fn cache_ttl(&self) -> Duration {
        Duration::from_secs(self.cache_ttl_secs)
    }
}

fn parse_or<T: std::str::FromStr>(value: Option<String>, default: T) -> T {
    value
        .and_then(|raw| raw.trim().parse().ok())
        .unwrap_or(default)
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 3000,
            log_level: "info".to_string(),
            database_url: None,
            mercado_pago_access_token: None,
            mercado_pago_base_url: MERCADO_PAGO_BASE_URL.to_string(),
            discord_webhook_url: None,
            fulfillment_policy: FulfillmentPolicy::BestEffort,
            pix_expiration_minutes: 30,
            expiry_sweep_interval_secs: 60,
            cache_ttl_secs: 30,
            fulfillment_lease_secs: 120,
        }
    }
}
