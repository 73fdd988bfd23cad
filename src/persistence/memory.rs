//! In-process key-value store.

use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::RwLock;

use super::KeyValueStore;
use crate::error::LoyaltyError;

/// `HashMap`-backed [`KeyValueStore`].
///
/// An optional byte quota mimics browser storage limits: a write that
/// would push the summed key and value lengths over the quota fails and
/// leaves the previous value in place.
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: RwLock<HashMap<String, String>>,
    quota_bytes: Option<usize>,
}

impl MemoryStore {
    /// Creates an empty store without a quota.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates an empty store that rejects writes beyond `quota_bytes`.
    #[must_use]
    pub fn with_quota(quota_bytes: usize) -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            quota_bytes: Some(quota_bytes),
        }
    }

    /// Bytes currently used by keys and values.
    pub async fn used_bytes(&self) -> usize {
        self.entries
            .read()
            .await
            .iter()
            .map(|(k, v)| k.len().saturating_add(v.len()))
            .sum()
    }
}

#[async_trait]
impl KeyValueStore for MemoryStore {
    async fn get(&self, key: &str) -> Result<Option<String>, LoyaltyError> {
        Ok(self.entries.read().await.get(key).cloned())
    }

    async fn set(&self, key: &str, value: String) -> Result<(), LoyaltyError> {
        let mut entries = self.entries.write().await;
        if let Some(quota) = self.quota_bytes {
            let others: usize = entries
                .iter()
                .filter(|(k, _)| k.as_str() != key)
                .map(|(k, v)| k.len().saturating_add(v.len()))
                .sum();
            let needed = others
                .saturating_add(key.len())
                .saturating_add(value.len());
            if needed > quota {
                return Err(LoyaltyError::PersistenceFailure(format!(
                    "quota exceeded writing {key}: {needed} of {quota} bytes"
                )));
            }
        }
        entries.insert(key.to_string(), value);
        Ok(())
    }
}

/// Test doubles built on [`MemoryStore`].
#[cfg(test)]
pub(crate) mod testing {
    use std::time::Duration;

    use async_trait::async_trait;

    use super::MemoryStore;
    use crate::error::LoyaltyError;
    use crate::persistence::KeyValueStore;

    /// Store whose reads sleep before returning, widening the window
    /// between a read and the following write.
    #[derive(Debug, Default)]
    pub(crate) struct YieldingStore {
        inner: MemoryStore,
    }

    #[async_trait]
    impl KeyValueStore for YieldingStore {
        async fn get(&self, key: &str) -> Result<Option<String>, LoyaltyError> {
            let value = self.inner.get(key).await;
            tokio::time::sleep(Duration::from_millis(20)).await;
            value
        }

        async fn set(&self, key: &str, value: String) -> Result<(), LoyaltyError> {
            self.inner.set(key, value).await
        }
    }
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn get_missing_key_is_none() {
        let store = MemoryStore::new();
        let Ok(value) = store.get("nothing").await else {
            panic!("memory get failed");
        };
        assert!(value.is_none());
    }

    #[tokio::test]
    async fn set_replaces_value() {
        let store = MemoryStore::new();
        let _ = store.set("k", "one".to_string()).await;
        let _ = store.set("k", "two".to_string()).await;
        let Ok(value) = store.get("k").await else {
            panic!("memory get failed");
        };
        assert_eq!(value.as_deref(), Some("two"));
        assert_eq!(store.used_bytes().await, 4);
    }

    #[tokio::test]
    async fn quota_rejects_oversized_write_and_keeps_old_value() {
        let store = MemoryStore::with_quota(8);
        tokio_test::assert_ok!(store.set("k", "1234".to_string()).await);
        let result = store.set("k", "123456789".to_string()).await;
        assert!(matches!(result, Err(LoyaltyError::PersistenceFailure(_))));
        let Ok(value) = store.get("k").await else {
            panic!("memory get failed");
        };
        assert_eq!(value.as_deref(), Some("1234"));
    }

    #[tokio::test]
    async fn quota_counts_replaced_value_once() {
        let store = MemoryStore::with_quota(6);
        tokio_test::assert_ok!(store.set("k", "12345".to_string()).await);
        tokio_test::assert_ok!(store.set("k", "54321".to_string()).await);
    }
}
