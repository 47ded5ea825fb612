//! Global application configuration manager.
//!
//! `AppConfig` is a lazily initialized, globally accessible singleton containing
//! runtime configuration values loaded from environment variables (and an optional
//! `.env` file). It provides thread-safe access and mutation for testing or
//! overrides in runtime environments.

use std::env;
use std::str::FromStr;
use std::sync::{OnceLock, RwLock};

/// Represents the complete application configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub env: String,
    pub project_name: String,
    pub log_level: String,
    pub log_file: String,
    pub log_to_stdout: bool,
    pub database_path: String,
    /// How many times an idempotent read is attempted before giving up.
    pub read_retry_attempts: u32,
    /// How many times a write that lost a race is re-run from a fresh read.
    pub write_retry_attempts: u32,
    /// Default page size for check-in and penalty history.
    pub history_limit: u64,
}

/// Lazily-initialized, thread-safe singleton instance of `AppConfig`.
static CONFIG_INSTANCE: OnceLock<RwLock<AppConfig>> = OnceLock::new();

fn parsed_or<T: FromStr>(key: &str, default: T) -> T {
    env::var(key)
        .ok()
        .and_then(|v| v.trim().parse().ok())
        .unwrap_or(default)
}

impl AppConfig {
    /// Loads the configuration from `.env` and environment variables.
    ///
    /// Missing or malformed values fall back to their defaults.
    pub fn from_env() -> Self {
        dotenvy::dotenv().ok();

        Self {
            env: env::var("APP_ENV").unwrap_or_else(|_| "development".into()),
            project_name: env::var("PROJECT_NAME").unwrap_or_else(|_| "qr-checkin".into()),
            log_level: env::var("LOG_LEVEL").unwrap_or_else(|_| "info".into()),
            log_file: env::var("LOG_FILE").unwrap_or_else(|_| "checkin.log".into()),
            log_to_stdout: env::var("LOG_TO_STDOUT").unwrap_or_else(|_| "false".into()) == "true",
            database_path: env::var("DATABASE_PATH").unwrap_or_else(|_| "data/checkin.db".into()),
            read_retry_attempts: parsed_or("READ_RETRY_ATTEMPTS", 3),
            write_retry_attempts: parsed_or("WRITE_RETRY_ATTEMPTS", 3),
            history_limit: parsed_or("HISTORY_LIMIT", 10),
        }
    }

    /// Returns a snapshot of the global configuration.
    pub fn global() -> AppConfig {
        let lock = CONFIG_INSTANCE.get_or_init(|| RwLock::new(AppConfig::from_env()));
        match lock.read() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    /// Resets the configuration by reloading from environment variables.
    ///
    /// Useful in tests to clear overrides.
    pub fn reset() {
        AppConfig::set_field(|cfg| *cfg = AppConfig::from_env());
    }

    fn set_field<F>(setter: F)
    where
        F: FnOnce(&mut AppConfig),
    {
        let lock = CONFIG_INSTANCE.get_or_init(|| RwLock::new(AppConfig::from_env()));
        let mut guard = match lock.write() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        setter(&mut guard);
    }

    // --- Per-field setters below ---

    pub fn set_env(value: impl Into<String>) {
        AppConfig::set_field(|cfg| cfg.env = value.into());
    }

    pub fn set_log_level(value: impl Into<String>) {
        AppConfig::set_field(|cfg| cfg.log_level = value.into());
    }

    pub fn set_log_file(value: impl Into<String>) {
        AppConfig::set_field(|cfg| cfg.log_file = value.into());
    }

    pub fn set_log_to_stdout(value: bool) {
        AppConfig::set_field(|cfg| cfg.log_to_stdout = value);
    }

    pub fn set_database_path(value: impl Into<String>) {
        AppConfig::set_field(|cfg| cfg.database_path = value.into());
    }

    pub fn set_read_retry_attempts(value: u32) {
        AppConfig::set_field(|cfg| cfg.read_retry_attempts = value);
    }

    pub fn set_write_retry_attempts(value: u32) {
        AppConfig::set_field(|cfg| cfg.write_retry_attempts = value);
    }

    pub fn set_history_limit(value: u64) {
        AppConfig::set_field(|cfg| cfg.history_limit = value);
    }
}

pub fn env() -> String {
    AppConfig::global().env
}

pub fn project_name() -> String {
    AppConfig::global().project_name
}

pub fn log_level() -> String {
    AppConfig::global().log_level
}

pub fn log_file() -> String {
    AppConfig::global().log_file
}

pub fn log_to_stdout() -> bool {
    AppConfig::global().log_to_stdout
}

pub fn database_path() -> String {
    AppConfig::global().database_path
}

pub fn read_retry_attempts() -> u32 {
    AppConfig::global().read_retry_attempts
}

pub fn write_retry_attempts() -> u32 {
    AppConfig::global().write_retry_attempts
}

pub fn history_limit() -> u64 {
    AppConfig::global().history_limit
}
