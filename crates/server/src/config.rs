//! Server configuration loaded from environment variables.
//!
//! # Environment Variables
//!
//! ## Required
//! - `MOBIMARKET_DATABASE_URL` - `PostgreSQL` connection string
//!   (falls back to `DATABASE_URL`)
//!
//! ## Optional
//! - `MOBIMARKET_HOST` - Bind address (default: 127.0.0.1)
//! - `MOBIMARKET_PORT` - Listen port (default: 5000)
//! - `PRODUCTS_PER_PAGE` - Page size of the product search (default: 9)
//! - `LATEST_PRODUCTS_LIMIT` - Size of the latest products view (default: 12)
//! - `CORS_ALLOWED_ORIGINS` - Comma-separated list of allowed origins
//!   (default: the production frontend and the local dev server)
//! - `SENTRY_DSN` - Sentry error tracking DSN
//! - `SENTRY_ENVIRONMENT` - Sentry environment name
//! - `SENTRY_SAMPLE_RATE` - Error sample rate, 0.0-1.0 (default: 1.0)
//! - `SENTRY_TRACES_SAMPLE_RATE` - Trace sample rate, 0.0-1.0 (default: 0.0)

use std::net::{IpAddr, SocketAddr};
use std::str::FromStr;

use secrecy::SecretString;
use thiserror::Error;

const DEFAULT_CORS_ORIGINS: &str = "https://mobimarketplace.vercel.app,http://localhost:5173";

/// Configuration errors that can occur during loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing environment variable: {0}")]
    MissingEnvVar(String),
    #[error("Invalid environment variable {0}: {1}")]
    InvalidEnvVar(String, String),
}

/// Server application configuration.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Holds the database password.
    pub database_url: SecretString,
    pub host: IpAddr,
    pub port: u16,
    pub catalog: CatalogSettings,
    /// Exact origins, without trailing slashes.
    pub cors_allowed_origins: Vec<String>,
    pub sentry_dsn: Option<String>,
    pub sentry_environment: Option<String>,
    /// Fraction of errors reported.
    pub sentry_sample_rate: f32,
    /// Fraction of requests traced.
    pub sentry_traces_sample_rate: f32,
}

/// Sizes of the catalog read views.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CatalogSettings {
    /// Page size of `GET /product/all`.
    pub products_per_page: u32,
    /// Number of products in the latest products view.
    pub latest_limit: u32,
}

impl Default for CatalogSettings {
    fn default() -> Self {
        Self {
            products_per_page: 9,
            latest_limit: 12,
        }
    }
}

impl ServerConfig {
    /// Read the environment, after loading `.env` when one exists.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` when the database URL is unset or a value
    /// does not parse.
    pub fn from_env() -> Result<Self, ConfigError> {
        let _ = dotenvy::dotenv();

        let database_url = get_database_url("MOBIMARKET_DATABASE_URL")?;
        let host = parse_env_or_default::<IpAddr>("MOBIMARKET_HOST", "127.0.0.1")?;
        let port = parse_env_or_default::<u16>("MOBIMARKET_PORT", "5000")?;

        let catalog = CatalogSettings {
            products_per_page: parse_positive("PRODUCTS_PER_PAGE", "9")?,
            latest_limit: parse_positive("LATEST_PRODUCTS_LIMIT", "12")?,
        };

        let cors_allowed_origins = parse_origins(&get_env_or_default(
            "CORS_ALLOWED_ORIGINS",
            DEFAULT_CORS_ORIGINS,
        ));

        Ok(Self {
            database_url,
            host,
            port,
            catalog,
            cors_allowed_origins,
            sentry_dsn: get_optional_env("SENTRY_DSN"),
            sentry_environment: get_optional_env("SENTRY_ENVIRONMENT"),
            sentry_sample_rate: parse_rate("SENTRY_SAMPLE_RATE", "1.0")?,
            sentry_traces_sample_rate: parse_rate("SENTRY_TRACES_SAMPLE_RATE", "0.0")?,
        })
    }

    /// Configuration with every optional setting at its default.
    ///
    /// Used by the CLI and by tests that never touch the network.
    #[must_use]
    pub fn with_defaults(database_url: SecretString) -> Self {
        Self {
            database_url,
            host: IpAddr::from([127, 0, 0, 1]),
            port: 5000,
            catalog: CatalogSettings::default(),
            cors_allowed_origins: parse_origins(DEFAULT_CORS_ORIGINS),
            sentry_dsn: None,
            sentry_environment: None,
            sentry_sample_rate: 1.0,
            sentry_traces_sample_rate: 0.0,
        }
    }

    #[must_use]
    pub const fn socket_addr(&self) -> SocketAddr {
        SocketAddr::new(self.host, self.port)
    }
}

// =============================================================================
// Environment lookups
// =============================================================================

/// First non-blank value among `keys`.
fn lookup(keys: &[&str]) -> Option<String> {
    keys.iter()
        .filter_map(|key| std::env::var(key).ok())
        .find(|value| !value.trim().is_empty())
}

fn get_database_url(primary_key: &str) -> Result<SecretString, ConfigError> {
    lookup(&[primary_key, "DATABASE_URL"])
        .map(SecretString::from)
        .ok_or_else(|| ConfigError::MissingEnvVar(primary_key.to_string()))
}

fn get_optional_env(key: &str) -> Option<String> {
    lookup(&[key])
}

fn get_env_or_default(key: &str, default: &str) -> String {
    lookup(&[key]).unwrap_or_else(|| default.to_string())
}

fn parse_value<T>(key: &str, raw: &str) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    raw.trim()
        .parse::<T>()
        .map_err(|e| ConfigError::InvalidEnvVar(key.to_string(), e.to_string()))
}

fn parse_env_or_default<T>(key: &str, default: &str) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    parse_value(key, &get_env_or_default(key, default))
}

fn parse_positive(key: &str, default: &str) -> Result<u32, ConfigError> {
    match parse_env_or_default::<u32>(key, default)? {
        0 => Err(ConfigError::InvalidEnvVar(
            key.to_string(),
            "must be greater than zero".to_string(),
        )),
        value => Ok(value),
    }
}

fn parse_rate(key: &str, default: &str) -> Result<f32, ConfigError> {
    check_rate(key, parse_env_or_default::<f32>(key, default)?)
}

fn check_rate(key: &str, rate: f32) -> Result<f32, ConfigError> {
    if (0.0..=1.0).contains(&rate) {
        Ok(rate)
    } else {
        Err(ConfigError::InvalidEnvVar(
            key.to_string(),
            format!("must be between 0.0 and 1.0 (got {rate})"),
        ))
    }
}

/// Split a comma-separated origin list, dropping blanks and trailing slashes.
fn parse_origins(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(|origin| origin.trim().trim_end_matches('/'))
        .filter(|origin| !origin.is_empty())
        .map(str::to_string)
        .collect()
}
