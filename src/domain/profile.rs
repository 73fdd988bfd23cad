//! Persisted per-user profile carrying the accumulated session time.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use super::UserId;

/// Stored user profile record.
///
/// Profiles live together in one serialized list; a fold replaces the
/// entry with the matching `user_id`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct UserProfile {
    /// Owner of the profile.
    pub user_id: UserId,
    /// Accumulated session time in milliseconds.
    #[serde(default)]
    pub total_session_time: u64,
    /// Instant of the last persisted fold.
    #[serde(default)]
    pub last_active_at: Option<DateTime<Utc>>,
}

impl UserProfile {
    /// Creates a profile with no accrued time.
    #[must_use]
    pub fn new(user_id: UserId) -> Self {
        Self {
            user_id,
            total_session_time: 0,
            last_active_at: None,
        }
    }
}
