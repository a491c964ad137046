//! Connection pool construction.
//!
//! Every [`PgFieldRepository`](crate::PgFieldRepository) call holds one
//! connection for the length of its transaction, so `max_connections` bounds
//! how many field operations run at once.

use std::time::{Duration, Instant};

use sqlx::postgres::{PgPool, PgPoolOptions};
use tracing::info;

use sylva_core::defaults::{
    DB_CONNECT_TIMEOUT_SECS, DB_IDLE_TIMEOUT_SECS, DB_MAX_CONNECTIONS, DB_MAX_LIFETIME_SECS,
    DB_MIN_CONNECTIONS,
};
use sylva_core::{Error, Result};

/// Pool sizing and timeouts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PoolConfig {
    /// Upper bound on concurrent field transactions.
    pub max_connections: u32,
    /// Connections kept open while idle.
    pub min_connections: u32,
    /// How long a caller waits for a free connection before failing.
    pub acquire_timeout: Duration,
    pub idle_timeout: Duration,
    /// `None` keeps connections until they fail or go idle.
    pub max_lifetime: Option<Duration>,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            max_connections: DB_MAX_CONNECTIONS,
            min_connections: DB_MIN_CONNECTIONS,
            acquire_timeout: Duration::from_secs(DB_CONNECT_TIMEOUT_SECS),
            idle_timeout: Duration::from_secs(DB_IDLE_TIMEOUT_SECS),
            max_lifetime: Some(Duration::from_secs(DB_MAX_LIFETIME_SECS)),
        }
    }
}

impl PoolConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the maximum number of pooled connections.
    pub fn max_connections(mut self, n: u32) -> Self {
        self.max_connections = n;
        self
    }

    /// Set the number of connections held open while idle.
    pub fn min_connections(mut self, n: u32) -> Self {
        self.min_connections = n;
        self
    }

    /// Set how long to wait for a connection.
    pub fn acquire_timeout(mut self, timeout: Duration) -> Self {
        self.acquire_timeout = timeout;
        self
    }

    /// Set how long an unused connection stays open.
    pub fn idle_timeout(mut self, timeout: Duration) -> Self {
        self.idle_timeout = timeout;
        self
    }

    /// Set the maximum age of a connection.
    pub fn max_lifetime(mut self, lifetime: Option<Duration>) -> Self {
        self.max_lifetime = lifetime;
        self
    }

    /// Reject sizes the pool could never satisfy.
    pub fn validate(&self) -> Result<()> {
        if self.max_connections == 0 {
            return Err(Error::Config("max_connections must be at least 1".into()));
        }
        if self.min_connections > self.max_connections {
            return Err(Error::Config(format!(
                "min_connections ({}) exceeds max_connections ({})",
                self.min_connections, self.max_connections
            )));
        }
        Ok(())
    }

    /// sqlx pool options carrying these settings.
    pub fn pg_options(&self) -> PgPoolOptions {
        PgPoolOptions::new()
            .max_connections(self.max_connections)
            .min_connections(self.min_connections)
            .acquire_timeout(self.acquire_timeout)
            .idle_timeout(self.idle_timeout)
            .max_lifetime(self.max_lifetime)
    }
}

/// Connect with the default pool settings.
pub async fn create_pool(database_url: &str) -> Result<PgPool> {
    create_pool_with_config(database_url, PoolConfig::default()).await
}

/// Validate `config`, then connect.
pub async fn create_pool_with_config(database_url: &str, config: PoolConfig) -> Result<PgPool> {
    config.validate()?;
    let start = Instant::now();

    info!(
        subsystem = "db",
        component = "pool",
        op = "create",
        max_connections = config.max_connections,
        min_connections = config.min_connections,
        acquire_timeout_secs = config.acquire_timeout.as_secs(),
        idle_timeout_secs = config.idle_timeout.as_secs(),
        "Creating field store connection pool"
    );

    let pool = config
        .pg_options()
        .connect(database_url)
        .await
        .map_err(Error::Database)?;

    info!(
        subsystem = "db",
        component = "pool",
        op = "established",
        pool_size = pool.size(),
        pool_idle = pool.num_idle(),
        duration_ms = start.elapsed().as_millis() as u64,
        "Field store connection pool established"
    );
    Ok(pool)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_pool_config_uses_crate_defaults() {
        let config = PoolConfig::default();
        assert_eq!(config.max_connections, DB_MAX_CONNECTIONS);
        assert_eq!(config.min_connections, DB_MIN_CONNECTIONS);
        assert_eq!(config.acquire_timeout, Duration::from_secs(DB_CONNECT_TIMEOUT_SECS));
        assert_eq!(config.max_lifetime, Some(Duration::from_secs(DB_MAX_LIFETIME_SECS)));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_pg_options_carry_the_config() {
        let config = PoolConfig::new()
            .max_connections(20)
            .min_connections(5)
            .acquire_timeout(Duration::from_secs(60))
            .idle_timeout(Duration::from_secs(90))
            .max_lifetime(None);

        let options = config.pg_options();
        assert_eq!(options.get_max_connections(), 20);
        assert_eq!(options.get_min_connections(), 5);
        assert_eq!(options.get_acquire_timeout(), Duration::from_secs(60));
        assert_eq!(options.get_idle_timeout(), Some(Duration::from_secs(90)));
        assert_eq!(options.get_max_lifetime(), None);
    }

    #[test]
    fn test_validate_rejects_unsatisfiable_sizes() {
        let err = PoolConfig::new().max_connections(0).min_connections(0).validate();
        assert!(matches!(err, Err(Error::Config(_))));

        let err = PoolConfig::new().max_connections(2).min_connections(3).validate();
        assert!(matches!(err, Err(Error::Config(ref m)) if m.contains("min_connections (3)")));
    }

    #[tokio::test]
    async fn test_invalid_config_fails_before_connecting() {
        let config = PoolConfig::new().max_connections(0);
        let err = create_pool_with_config("postgres://unreachable.invalid/sylva", config)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }
}
