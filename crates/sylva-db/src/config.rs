//! Database configuration from the environment.

use std::str::FromStr;
use std::time::Duration;

use tracing::debug;

use sylva_core::defaults::{
    ENV_DATABASE_URL, ENV_DB_CONNECT_TIMEOUT_SECS, ENV_DB_IDLE_TIMEOUT_SECS,
    ENV_DB_MAX_CONNECTIONS, ENV_DB_MIN_CONNECTIONS,
};
use sylva_core::{Error, Result};

use crate::pool::PoolConfig;

/// Where to connect and how to size the pool.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DatabaseConfig {
    pub url: String,
    pub pool: PoolConfig,
}

impl DatabaseConfig {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            pool: PoolConfig::default(),
        }
    }

    /// Read the configuration from process environment, loading a `.env`
    /// file first when one exists.
    pub fn from_env() -> Result<Self> {
        if let Ok(path) = dotenvy::dotenv() {
            debug!(
                subsystem = "db",
                component = "config",
                path = %path.display(),
                "Loaded .env file"
            );
        }
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build the configuration from an arbitrary key lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let url = lookup(ENV_DATABASE_URL)
            .filter(|v| !v.trim().is_empty())
            .ok_or_else(|| Error::Config(format!("{} is not set", ENV_DATABASE_URL)))?;

        let mut pool = PoolConfig::default();
        if let Some(n) = parse_var::<u32>(&lookup, ENV_DB_MAX_CONNECTIONS)? {
            pool = pool.max_connections(n);
        }
        if let Some(n) = parse_var::<u32>(&lookup, ENV_DB_MIN_CONNECTIONS)? {
            pool = pool.min_connections(n);
        }
        if let Some(secs) = parse_var::<u64>(&lookup, ENV_DB_CONNECT_TIMEOUT_SECS)? {
            pool = pool.acquire_timeout(Duration::from_secs(secs));
        }
        if let Some(secs) = parse_var::<u64>(&lookup, ENV_DB_IDLE_TIMEOUT_SECS)? {
            pool = pool.idle_timeout(Duration::from_secs(secs));
        }

        pool.validate()?;

        Ok(Self { url, pool })
    }
}

fn parse_var<T>(lookup: &impl Fn(&str) -> Option<String>, key: &str) -> Result<Option<T>>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match lookup(key) {
        None => Ok(None),
        Some(raw) => raw
            .trim()
            .parse::<T>()
            .map(Some)
            .map_err(|e| Error::Config(format!("invalid {} '{}': {}", key, raw, e))),
    }
}
