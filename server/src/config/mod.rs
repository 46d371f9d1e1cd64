use std::env;
use std::str::FromStr;

use thiserror::Error;

pub mod cors;
pub mod security;

pub use cors::create_cors_layer;
pub use security::create_security_headers_layer;

const DEFAULT_MAX_CONNECTIONS: u32 = 5;
const DEFAULT_PORT: u16 = 3001;
const DEFAULT_JWT_TTL_MINUTES: i64 = 60;
const DEFAULT_FINISH_URL: &str = "http://localhost:5173/profile";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("{0} must be set")]
    Missing(&'static str),

    #[error("{name} has an invalid value: {value}")]
    Invalid { name: &'static str, value: String },
}

#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub database_max_connections: u32,
    pub port: u16,
    pub jwt_secret: String,
    pub jwt_ttl_minutes: i64,
    pub firebase_project_id: String,
    pub midtrans_server_key: String,
    pub midtrans_is_production: bool,
    pub midtrans_finish_url: String,
    /// Enables HSTS.
    pub is_production: bool,
    /// Comma-separated origin list; `None` falls back to the local dev origins.
    pub cors_allowed_origins: Option<String>,
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Ok(Self {
            database_url: required("DATABASE_URL")?,
            database_max_connections: parsed("DATABASE_MAX_CONNECTIONS", DEFAULT_MAX_CONNECTIONS)?,
            port: parsed("PORT", DEFAULT_PORT)?,
            jwt_secret: required("JWT_SECRET")?,
            jwt_ttl_minutes: parsed("JWT_TTL_MINUTES", DEFAULT_JWT_TTL_MINUTES)?,
            firebase_project_id: required("FIREBASE_PROJECT_ID")?,
            midtrans_server_key: required("MIDTRANS_SERVER_KEY")?,
            midtrans_is_production: parsed("MIDTRANS_IS_PRODUCTION", false)?,
            midtrans_finish_url: env::var("MIDTRANS_FINISH_URL")
                .unwrap_or_else(|_| DEFAULT_FINISH_URL.to_string()),
            is_production: env::var("RUST_ENV")
                .map(|v| v.eq_ignore_ascii_case("production"))
                .unwrap_or(false),
            cors_allowed_origins: env::var("CORS_ALLOWED_ORIGINS").ok(),
        })
    }
}

fn required(name: &'static str) -> Result<String, ConfigError> {
    match env::var(name) {
        Ok(value) if !value.trim().is_empty() => Ok(value),
        _ => Err(ConfigError::Missing(name)),
    }
}

fn parsed<T: FromStr>(name: &'static str, default: T) -> Result<T, ConfigError> {
    match env::var(name) {
        Ok(value) => value
            .trim()
            .parse()
            .map_err(|_| ConfigError::Invalid { name, value }),
        Err(_) => Ok(default),
    }
}
