//! Configuration module
//!
//! Loads configuration from environment variables.

use std::env;
use std::str::FromStr;
use std::time::Duration;

use crate::handlers::{LedgerSettings, DEFAULT_ACCOUNT_NUMBER_ATTEMPTS};
use crate::lock::LockSettings;

/// Application configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// Database connection URL; without one the server runs on the in-memory store
    pub database_url: Option<String>,

    /// Maximum database connections in pool
    pub database_max_connections: u32,

    /// Server host
    pub host: String,

    /// Server port
    pub port: u16,

    /// Environment (development, production)
    pub environment: String,

    /// How long a request waits for a busy lock
    pub lock_wait: Duration,

    /// How long an unreleased lock survives
    pub lock_lease: Duration,

    pub max_accounts_per_user: u32,

    /// Fixed seed for account numbers (tests and demos)
    pub account_number_seed: Option<u64>,

    /// Interval for purging expired lock rows
    pub lock_cleanup_interval: Duration,
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| env::var(name).ok())
    }

    /// Load configuration through an arbitrary variable lookup
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let database_url = lookup("DATABASE_URL").filter(|url| !url.trim().is_empty());
        let database_max_connections = parse_or(&lookup, "DATABASE_MAX_CONNECTIONS", 10)?;
        let host = lookup("HOST").unwrap_or_else(|| "127.0.0.1".to_string());
        let port = parse_or(&lookup, "PORT", 3000)?;
        let environment = lookup("ENVIRONMENT").unwrap_or_else(|| "development".to_string());

        let lock_wait = Duration::from_millis(parse_or(&lookup, "LOCK_WAIT_MS", 2000)?);
        let lock_lease = Duration::from_millis(parse_or(&lookup, "LOCK_LEASE_MS", 15_000)?);
        if lock_lease.is_zero() {
            return Err(ConfigError::InvalidValue("LOCK_LEASE_MS"));
        }

        let max_accounts_per_user: u32 = parse_or(&lookup, "MAX_ACCOUNTS_PER_USER", 10)?;
        if max_accounts_per_user == 0 {
            return Err(ConfigError::InvalidValue("MAX_ACCOUNTS_PER_USER"));
        }

        let account_number_seed = lookup("ACCOUNT_NUMBER_SEED")
            .map(|raw| raw.parse())
            .transpose()
            .map_err(|_| ConfigError::InvalidValue("ACCOUNT_NUMBER_SEED"))?;

        let lock_cleanup_interval =
            Duration::from_secs(parse_or(&lookup, "LOCK_CLEANUP_INTERVAL_SECS", 60)?);
        if lock_cleanup_interval.is_zero() {
            return Err(ConfigError::InvalidValue("LOCK_CLEANUP_INTERVAL_SECS"));
        }

        Ok(Self {
            database_url,
            database_max_connections,
            host,
            port,
            environment,
            lock_wait,
            lock_lease,
            max_accounts_per_user,
            account_number_seed,
            lock_cleanup_interval,
        })
    }

    /// Check if running in production
    pub fn is_production(&self) -> bool {
        self.environment == "production"
    }

    pub fn ledger_settings(&self) -> LedgerSettings {
        LedgerSettings {
            lock: LockSettings {
                wait: self.lock_wait,
                lease: self.lock_lease,
            },
            max_accounts_per_user: self.max_accounts_per_user,
            account_number_attempts: DEFAULT_ACCOUNT_NUMBER_ATTEMPTS,
        }
    }
}

fn parse_or<F, T>(lookup: &F, name: &'static str, default: T) -> Result<T, ConfigError>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
{
    match lookup(name) {
        Some(raw) => raw.trim().parse().map_err(|_| ConfigError::InvalidValue(name)),
        None => Ok(default),
    }
}

/// Configuration error types
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid value for environment variable: {0}")]
    InvalidValue(&'static str),
}
