// src/config.rs

use std::env;
use std::str::FromStr;
use dotenvy::dotenv;

/// Trailing window used to count integrity violations.
pub const DEFAULT_VIOLATION_WINDOW_SECS: i64 = 5 * 60;
/// Violations inside one window that produce a warning.
pub const DEFAULT_WARN_THRESHOLD: usize = 2;
/// Warnings after which the student is disqualified.
pub const DEFAULT_MAX_WARNINGS: u32 = 3;

#[derive(Debug, Clone)]
pub struct Config {
    /// PostgreSQL connection string. `None` runs the service on the in-memory store.
    pub database_url: Option<String>,
    pub jwt_secret: String,
    pub jwt_expiration: u64,
    pub rust_log: String,
    pub bind_addr: String,
    pub violation_window_secs: i64,
    pub warn_threshold: usize,
    pub max_warnings: u32,
    pub sweep_interval_secs: u64,
}

impl Config {
    pub fn from_env() -> Self {
        dotenv().ok();

        let database_url = env::var("DATABASE_URL").ok().filter(|url| !url.is_empty());

        let jwt_secret = env::var("JWT_SECRET")
            .expect("JWT_SECRET must be set");

        let rust_log = env::var("RUST_LOG")
            .unwrap_or_else(|_| "info".to_string());

        let bind_addr = env::var("BIND_ADDR")
            .unwrap_or_else(|_| "0.0.0.0:3000".to_string());

        Self {
            database_url,
            jwt_secret,
            jwt_expiration: env_or("JWT_EXPIRATION", 3600),
            rust_log,
            bind_addr,
            violation_window_secs: env_or("VIOLATION_WINDOW_SECS", DEFAULT_VIOLATION_WINDOW_SECS),
            warn_threshold: env_or("VIOLATION_WARN_THRESHOLD", DEFAULT_WARN_THRESHOLD),
            max_warnings: env_or("VIOLATION_MAX_WARNINGS", DEFAULT_MAX_WARNINGS),
            sweep_interval_secs: env_or("SWEEP_INTERVAL_SECS", 60),
        }
    }
}

fn env_or<T: FromStr>(key: &str, default: T) -> T {
    match env::var(key) {
        Ok(raw) => raw.parse().unwrap_or_else(|_| {
            tracing::warn!("Ignoring unparsable {}={:?}, using default", key, raw);
            default
        }),
        Err(_) => default,
    }
}
