//! PostgreSQL implementation of the key-value store.

use std::time::Duration;

use async_trait::async_trait;
use sqlx::PgPool;
use sqlx::postgres::PgPoolOptions;

use super::KeyValueStore;
use crate::config::AcademyConfig;
use crate::error::LoyaltyError;

/// PostgreSQL-backed [`KeyValueStore`] using `sqlx::PgPool`.
///
/// Values live in a single `kv_store` table keyed by store key.
#[derive(Debug, Clone)]
pub struct PostgresStore {
    pool: PgPool,
}

impl PostgresStore {
    /// Creates a store over an existing connection pool.
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Opens a connection pool sized by `config` and creates the table.
    ///
    /// # Errors
    ///
    /// Returns [`LoyaltyError::PersistenceFailure`] if the database is
    /// unreachable or the table cannot be created.
    pub async fn connect(config: &AcademyConfig) -> Result<Self, LoyaltyError> {
        let pool = PgPoolOptions::new()
            .max_connections(config.database_max_connections)
            .min_connections(config.database_min_connections)
            .acquire_timeout(Duration::from_secs(config.database_connect_timeout_secs))
            .connect(&config.database_url)
            .await
            .map_err(|e| LoyaltyError::PersistenceFailure(e.to_string()))?;

        let store = Self::new(pool);
        store.init().await?;
        tracing::info!(
            max_connections = config.database_max_connections,
            "postgres key-value store ready"
        );
        Ok(store)
    }

    /// Creates the `kv_store` table if it does not exist.
    ///
    /// # Errors
    ///
    /// Returns [`LoyaltyError::PersistenceFailure`] on database failure.
    pub async fn init(&self) -> Result<(), LoyaltyError> {
        sqlx::query(
            "CREATE TABLE IF NOT EXISTS kv_store (\
                 key TEXT PRIMARY KEY, \
                 value TEXT NOT NULL, \
                 updated_at TIMESTAMPTZ NOT NULL DEFAULT now()\
             )",
        )
        .execute(&self.pool)
        .await
        .map_err(|e| LoyaltyError::PersistenceFailure(e.to_string()))?;
        Ok(())
    }
}

#[async_trait]
impl KeyValueStore for PostgresStore {
    async fn get(&self, key: &str) -> Result<Option<String>, LoyaltyError> {
        sqlx::query_scalar::<_, String>("SELECT value FROM kv_store WHERE key = $1")
            .bind(key)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| LoyaltyError::PersistenceFailure(e.to_string()))
    }

    async fn set(&self, key: &str, value: String) -> Result<(), LoyaltyError> {
        sqlx::query(
            "INSERT INTO kv_store (key, value, updated_at) VALUES ($1, $2, now()) \
             ON CONFLICT (key) DO UPDATE SET value = EXCLUDED.value, updated_at = now()",
        )
        .bind(key)
        .bind(value)
        .execute(&self.pool)
        .await
        .map_err(|e| LoyaltyError::PersistenceFailure(e.to_string()))?;
        Ok(())
    }
}
