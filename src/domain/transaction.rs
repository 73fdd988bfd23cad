//! Immutable point transactions.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

use super::UserId;

/// A single ledger line: a signed change to one user's point balance.
///
/// Positive `amount` is a credit, negative a debit. Once appended to a
/// [`super::Ledger`] a transaction is never edited or removed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct PointTransaction {
    /// Unique transaction identifier (UUID v4).
    pub id: Uuid,
    /// User whose balance changes.
    pub user_id: UserId,
    /// Signed point delta.
    pub amount: i64,
    /// Human-readable reason, informational only.
    pub reason: String,
    /// Optional external reference (e.g. the completed course id).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reference: Option<String>,
    /// When the transaction was recorded.
    pub timestamp: DateTime<Utc>,
}

impl PointTransaction {
    /// Creates a credit of `amount` points.
    #[must_use]
    pub fn credit(user_id: UserId, amount: i64, reason: &str, timestamp: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4(),
            user_id,
            amount,
            reason: reason.to_string(),
            reference: None,
            timestamp,
        }
    }

    /// Creates a debit of `amount` points, stored as `-amount`.
    #[must_use]
    pub fn debit(user_id: UserId, amount: i64, reason: &str, timestamp: DateTime<Utc>) -> Self {
        Self {
            amount: amount.saturating_neg(),
            ..Self::credit(user_id, 0, reason, timestamp)
        }
    }

    /// Attaches an external reference.
    #[must_use]
    pub fn with_reference(mut self, reference: impl Into<String>) -> Self {
        self.reference = Some(reference.into());
        self
    }

    /// Returns `true` if this transaction adds points.
    #[must_use]
    pub const fn is_credit(&self) -> bool {
        self.amount > 0
    }
}
