//! Application configuration management.
//!
//! This module handles loading configuration from environment variables.
//! It uses the `envy` crate to automatically deserialize environment variables into a type-safe struct.

use serde::Deserialize;

use crate::models::order::DEFAULT_CURRENCY;

/// Application configuration loaded from environment variables.
///
/// # Environment Variables
///
/// - `DATABASE_URL` (required): PostgreSQL connection string
/// - `JWT_SECRET` (required): secret used to sign access tokens (HS256)
/// - `SERVER_PORT` (optional): HTTP server port, defaults to 3000
/// - `COOKIE_SECURE` (optional): set the `Secure` flag on the refresh cookie, defaults to false
/// - `CORS_ORIGINS` (optional): comma-separated list of allowed origins
/// - `ACCESS_TOKEN_TTL_SECS`, `GUEST_TOKEN_TTL_SECS`, `REFRESH_TOKEN_TTL_DAYS` (optional): credential lifetimes
/// - `AUTH_RATE_LIMIT_PER_MINUTE`, `STATS_RATE_LIMIT_PER_MINUTE` (optional): per-IP limits
/// - `REQUEST_TIMEOUT_SECS` (optional): overall per-request deadline
/// - `DEFAULT_CURRENCY` (optional): currency used when no catalog line declares one
/// - `DB_MAX_CONNECTIONS` (optional): connection pool size
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub database_url: String,

    pub jwt_secret: String,

    #[serde(default = "default_port")]
    pub server_port: u16,

    #[serde(default)]
    pub cookie_secure: bool,

    #[serde(default = "default_cors_origins")]
    pub cors_origins: Vec<String>,

    #[serde(default = "default_access_ttl")]
    pub access_token_ttl_secs: i64,

    #[serde(default = "default_guest_ttl")]
    pub guest_token_ttl_secs: i64,

    #[serde(default = "default_refresh_ttl_days")]
    pub refresh_token_ttl_days: i64,

    #[serde(default = "default_auth_rate_limit")]
    pub auth_rate_limit_per_minute: u32,

    #[serde(default = "default_stats_rate_limit")]
    pub stats_rate_limit_per_minute: u32,

    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,

    #[serde(default = "default_currency")]
    pub default_currency: String,

    #[serde(default = "default_max_connections")]
    pub db_max_connections: u32,
}

/// Default port if SERVER_PORT environment variable is not set.
fn default_port() -> u16 {
    3000
}

fn default_cors_origins() -> Vec<String> {
    vec!["http://localhost:3000".to_string()]
}

/// 15 minutes for registered users.
fn default_access_ttl() -> i64 {
    15 * 60
}

/// Guests have no refresh chain, so their access credential lives longer.
fn default_guest_ttl() -> i64 {
    12 * 60 * 60
}

fn default_refresh_ttl_days() -> i64 {
    30
}

fn default_auth_rate_limit() -> u32 {
    20
}

fn default_stats_rate_limit() -> u32 {
    60
}

fn default_request_timeout() -> u64 {
    30
}

fn default_currency() -> String {
    DEFAULT_CURRENCY.to_string()
}

fn default_max_connections() -> u32 {
    10
}

/// Reasons a loaded configuration is unusable.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error(transparent)]
    Env(#[from] envy::Error),

    #[error("{0} must not be empty")]
    Empty(&'static str),
}

impl Config {
    /// Load configuration from environment variables.
    ///
    /// This method first attempts to load a `.env` file (which is optional),
    /// then reads environment variables and deserializes them into a Config struct.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - Required environment variables are missing (e.g., DATABASE_URL, JWT_SECRET)
    /// - Environment variable values cannot be parsed into expected types
    /// - `DATABASE_URL` or `JWT_SECRET` is set but blank
    pub fn from_env() -> Result<Self, ConfigError> {
        // Try to load .env file if it exists (does nothing if not found)
        dotenvy::dotenv().ok();

        // Field names are automatically converted: jwt_secret -> JWT_SECRET
        let config = envy::from_env::<Config>()?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.database_url.trim().is_empty() {
            return Err(ConfigError::Empty("DATABASE_URL"));
        }
        if self.jwt_secret.trim().is_empty() {
            return Err(ConfigError::Empty("JWT_SECRET"));
        }
        Ok(())
    }

    /// Allowed CORS origins with blanks removed.
    pub fn allowed_origins(&self) -> Vec<String> {
        self.cors_origins
            .iter()
            .map(|origin| origin.trim().to_string())
            .filter(|origin| !origin.is_empty())
            .collect()
    }
}
