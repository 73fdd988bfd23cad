//! Serialization boundary between domain values and the key-value store.
//!
//! Stored values that fail to decode are logged and read as empty: a
//! corrupted entry must not lock users out of their balance or profile.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde::de::DeserializeOwned;
use tokio::sync::Mutex;

use super::{KeyValueStore, LEDGER_KEY, PROFILES_KEY, scoped_key};
use crate::domain::{Ledger, UserId, UserProfile};
use crate::error::LoyaltyError;

/// Loads and saves the global point ledger.
#[derive(Debug, Clone)]
pub struct LedgerRepository {
    store: Arc<dyn KeyValueStore>,
    key: String,
}

impl LedgerRepository {
    /// Creates a repository writing under `prefix`-scoped [`LEDGER_KEY`].
    #[must_use]
    pub fn new(store: Arc<dyn KeyValueStore>, prefix: &str) -> Self {
        Self {
            store,
            key: scoped_key(prefix, LEDGER_KEY),
        }
    }

    /// Reads the ledger; missing or malformed data yields an empty ledger.
    ///
    /// # Errors
    ///
    /// Returns [`LoyaltyError::PersistenceFailure`] if the store read fails.
    pub async fn load(&self) -> Result<Ledger, LoyaltyError> {
        load_or_default(self.store.as_ref(), &self.key).await
    }

    /// Replaces the stored ledger.
    ///
    /// # Errors
    ///
    /// Returns [`LoyaltyError::PersistenceFailure`] if the store write fails.
    pub async fn save(&self, ledger: &Ledger) -> Result<(), LoyaltyError> {
        save(self.store.as_ref(), &self.key, ledger).await
    }
}

/// Loads and saves the user profile list.
///
/// All profiles live under one key, so every update rewrites the whole
/// list. Clones share one write lock; updates through them never drop each
/// other's entries.
#[derive(Debug, Clone)]
pub struct ProfileRepository {
    store: Arc<dyn KeyValueStore>,
    key: String,
    write_lock: Arc<Mutex<()>>,
}

impl ProfileRepository {
    /// Creates a repository writing under `prefix`-scoped [`PROFILES_KEY`].
    #[must_use]
    pub fn new(store: Arc<dyn KeyValueStore>, prefix: &str) -> Self {
        Self {
            store,
            key: scoped_key(prefix, PROFILES_KEY),
            write_lock: Arc::new(Mutex::new(())),
        }
    }

    /// Reads every stored profile.
    ///
    /// # Errors
    ///
    /// Returns [`LoyaltyError::PersistenceFailure`] if the store read fails.
    pub async fn load_all(&self) -> Result<Vec<UserProfile>, LoyaltyError> {
        load_or_default(self.store.as_ref(), &self.key).await
    }

    /// Reads one user's profile.
    ///
    /// # Errors
    ///
    /// Returns [`LoyaltyError::PersistenceFailure`] if the store read fails.
    pub async fn load(&self, user_id: &UserId) -> Result<Option<UserProfile>, LoyaltyError> {
        Ok(self
            .load_all()
            .await?
            .into_iter()
            .find(|p| &p.user_id == user_id))
    }

    /// Writes a user's session total, replacing their entry or appending a
    /// new one.
    ///
    /// # Errors
    ///
    /// Returns [`LoyaltyError::PersistenceFailure`] if the store read or
    /// write fails.
    pub async fn record_session_total(
        &self,
        user_id: &UserId,
        total_session_time: u64,
        at: DateTime<Utc>,
    ) -> Result<UserProfile, LoyaltyError> {
        let _guard = self.write_lock.lock().await;
        let mut profiles = self.load_all().await?;
        let updated = match profiles.iter_mut().find(|p| &p.user_id == user_id) {
            Some(profile) => {
                profile.total_session_time = total_session_time;
                profile.last_active_at = Some(at);
                profile.clone()
            }
            None => {
                let profile = UserProfile {
                    total_session_time,
                    last_active_at: Some(at),
                    ..UserProfile::new(user_id.clone())
                };
                profiles.push(profile.clone());
                profile
            }
        };
        save(self.store.as_ref(), &self.key, &profiles).await?;
        Ok(updated)
    }
}

/// Decodes a stored JSON value.
///
/// # Errors
///
/// Returns [`LoyaltyError::MalformedStoredData`] if `raw` is not valid JSON
/// for `T`.
pub fn decode<T: DeserializeOwned>(key: &str, raw: &str) -> Result<T, LoyaltyError> {
    serde_json::from_str(raw).map_err(|e| LoyaltyError::MalformedStoredData {
        key: key.to_string(),
        reason: e.to_string(),
    })
}

async fn load_or_default<T: DeserializeOwned + Default>(
    store: &dyn KeyValueStore,
    key: &str,
) -> Result<T, LoyaltyError> {
    let Some(raw) = store.get(key).await? else {
        return Ok(T::default());
    };
    match decode(key, &raw) {
        Ok(value) => Ok(value),
        Err(err) => {
            tracing::warn!(error = %err, "ignoring malformed stored data");
            Ok(T::default())
        }
    }
}

async fn save<T: Serialize + ?Sized>(
    store: &dyn KeyValueStore,
    key: &str,
    value: &T,
) -> Result<(), LoyaltyError> {
    let raw = serde_json::to_string(value).map_err(|e| LoyaltyError::Internal(e.to_string()))?;
    store.set(key, raw).await.inspect_err(|err| {
        tracing::error!(key, error = %err, "store write failed");
    })
}
