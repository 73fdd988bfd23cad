//! Persistence layer: the key-value store port and its adapters.
//!
//! The services never touch a backend directly. They go through the
//! [`LedgerRepository`] and [`ProfileRepository`], which serialize domain
//! values to JSON strings and hand them to a [`KeyValueStore`]:
//!
//! - [`MemoryStore`]: process-local map, optional byte quota.
//! - [`PostgresStore`]: one `kv_store` table accessed through `sqlx::PgPool`.

pub mod memory;
pub mod postgres;
pub mod repository;

use async_trait::async_trait;

use crate::error::LoyaltyError;

pub use memory::MemoryStore;
pub use postgres::PostgresStore;
pub use repository::{LedgerRepository, ProfileRepository};

/// Store key of the serialized transaction list.
pub const LEDGER_KEY: &str = "metsel.loyalty.transactions";

/// Store key of the serialized profile list.
pub const PROFILES_KEY: &str = "metsel.users.profiles";

/// String-to-string store the core reads and writes through.
///
/// Writes replace the whole value. There is no cross-writer coordination:
/// the last `set` for a key wins.
#[async_trait]
pub trait KeyValueStore: Send + Sync + std::fmt::Debug {
    /// Reads the value stored under `key`.
    ///
    /// # Errors
    ///
    /// Returns [`LoyaltyError::PersistenceFailure`] if the backend is
    /// unavailable.
    async fn get(&self, key: &str) -> Result<Option<String>, LoyaltyError>;

    /// Stores `value` under `key`, replacing any previous value.
    ///
    /// # Errors
    ///
    /// Returns [`LoyaltyError::PersistenceFailure`] if the backend rejects
    /// the write (unavailable, quota exceeded).
    async fn set(&self, key: &str, value: String) -> Result<(), LoyaltyError>;
}

/// Joins an optional namespace prefix and a base key.
#[must_use]
pub fn scoped_key(prefix: &str, key: &str) -> String {
    if prefix.is_empty() {
        key.to_string()
    } else {
        format!("{prefix}:{key}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scoped_key_without_prefix_is_base_key() {
        assert_eq!(scoped_key("", LEDGER_KEY), LEDGER_KEY);
    }

    #[test]
    fn scoped_key_joins_with_colon() {
        assert_eq!(
            scoped_key("tenant-a", PROFILES_KEY),
            "tenant-a:metsel.users.profiles"
        );
    }
}
