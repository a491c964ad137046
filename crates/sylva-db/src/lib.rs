//! # sylva-db
//!
//! PostgreSQL storage for the sylva custom field engine.
//!
//! This crate provides:
//! - Connection pool management and environment configuration
//! - [`PgFieldStore`], a [`FieldStore`] bound to a caller-owned transaction
//! - [`PgFieldRepository`], one transaction per call for simple callers
//! - SQL migrations (feature `migrations`)
//!
//! ## Example
//!
//! ```rust,ignore
//! use sylva_db::{Database, FieldEngine, FieldValueInput, OwnerKind, PgFieldStore};
//!
//! let db = Database::from_env().await?;
//!
//! // Write the owner row and its custom fields in one transaction
//! let mut tx = db.pool().begin().await?;
//! sqlx::query("INSERT INTO plant (id, project_id) VALUES ($1, $2)")
//!     .bind(plant_id)
//!     .bind(project_id)
//!     .execute(&mut *tx)
//!     .await?;
//! let mut store = PgFieldStore::new(&mut tx);
//! FieldEngine::new(&mut store, OwnerKind::Plant)
//!     .apply_values(plant_id, Some(project_id), &[FieldValueInput::new(height_id, 120_i64)])
//!     .await?;
//! tx.commit().await?;
//! ```

pub mod bindings;
pub mod config;
pub mod fields;
pub mod pool;
pub mod store;

// Test fixtures for integration tests
// Note: Always compiled so integration tests (in tests/) can use DEFAULT_TEST_DATABASE_URL
pub mod test_fixtures;

// Re-export core types
pub use sylva_core::*;

pub use bindings::{binding, TableBinding};
pub use config::DatabaseConfig;
pub use fields::PgFieldRepository;
pub use pool::{create_pool, create_pool_with_config, PoolConfig};
pub use store::PgFieldStore;

/// Combined database context.
#[derive(Clone)]
pub struct Database {
    /// The underlying connection pool.
    pub pool: sqlx::Pool<sqlx::Postgres>,
    /// Custom field definitions and values for every owner kind.
    pub fields: PgFieldRepository,
}

impl Database {
    pub fn new(pool: sqlx::Pool<sqlx::Postgres>) -> Self {
        Self {
            fields: PgFieldRepository::new(pool.clone()),
            pool,
        }
    }

    /// Connect with default pool settings.
    pub async fn connect(url: &str) -> Result<Self> {
        let pool = create_pool(url).await?;
        Ok(Self::new(pool))
    }

    pub async fn connect_with_config(url: &str, config: PoolConfig) -> Result<Self> {
        let pool = create_pool_with_config(url, config).await?;
        Ok(Self::new(pool))
    }

    /// Connect using [`DatabaseConfig::from_env`].
    pub async fn from_env() -> Result<Self> {
        let config = DatabaseConfig::from_env()?;
        Self::connect_with_config(&config.url, config.pool).await
    }

    /// Run pending migrations.
    #[cfg(feature = "migrations")]
    pub async fn migrate(&self) -> Result<()> {
        sqlx::migrate!("../../migrations")
            .run(&self.pool)
            .await
            .map_err(|e| Error::Database(sqlx::Error::Migrate(Box::new(e))))?;
        Ok(())
    }

    /// Get the underlying connection pool.
    pub fn pool(&self) -> &sqlx::Pool<sqlx::Postgres> {
        &self.pool
    }
}
