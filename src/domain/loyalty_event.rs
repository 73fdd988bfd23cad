//! Domain events reflecting loyalty and session state changes.
//!
//! Every successful mutation emits a [`LoyaltyEvent`] through the
//! [`super::EventBus`]. Events are forwarded to WebSocket subscribers.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::UserId;

/// Coarse event category a WebSocket client can filter on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventTopic {
    /// Credits and debits.
    Points,
    /// Level transitions.
    Levels,
    /// Session start, fold and stop.
    Sessions,
}

impl EventTopic {
    /// Every topic, in declaration order.
    pub const ALL: [Self; 3] = [Self::Points, Self::Levels, Self::Sessions];
}

/// Domain event emitted after every state mutation.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event_type", rename_all = "snake_case")]
pub enum LoyaltyEvent {
    /// Points were credited.
    PointsAdded {
        /// Credited user.
        user_id: UserId,
        /// Credited amount.
        amount: i64,
        /// Transaction reason.
        reason: String,
        /// Balance after the credit.
        new_balance: i64,
        /// Transaction timestamp.
        timestamp: DateTime<Utc>,
    },

    /// Points were debited.
    PointsRemoved {
        /// Debited user.
        user_id: UserId,
        /// Debited amount, as a positive number.
        amount: i64,
        /// Transaction reason.
        reason: String,
        /// Balance after the debit.
        new_balance: i64,
        /// Transaction timestamp.
        timestamp: DateTime<Utc>,
    },

    /// A mutation moved the user to a different level.
    LevelChanged {
        /// Affected user.
        user_id: UserId,
        /// Level key before the mutation.
        old_level: String,
        /// Level key after the mutation.
        new_level: String,
        /// Timestamp of the mutation.
        timestamp: DateTime<Utc>,
    },

    /// A session segment was opened.
    SessionStarted {
        /// Tracked user.
        user_id: UserId,
        /// Segment start.
        timestamp: DateTime<Utc>,
    },

    /// Elapsed time was folded into the running total.
    SessionFolded {
        /// Tracked user.
        user_id: UserId,
        /// Milliseconds added by this fold.
        elapsed_ms: u64,
        /// Running total after the fold.
        total_ms: u64,
        /// Fold instant.
        timestamp: DateTime<Utc>,
    },

    /// Tracking stopped.
    SessionStopped {
        /// Tracked user.
        user_id: UserId,
        /// Running total at stop.
        total_ms: u64,
        /// Stop instant.
        timestamp: DateTime<Utc>,
    },
}

impl LoyaltyEvent {
    /// Returns the user this event concerns.
    #[must_use]
    pub fn user_id(&self) -> &UserId {
        match self {
            Self::PointsAdded { user_id, .. }
            | Self::PointsRemoved { user_id, .. }
            | Self::LevelChanged { user_id, .. }
            | Self::SessionStarted { user_id, .. }
            | Self::SessionFolded { user_id, .. }
            | Self::SessionStopped { user_id, .. } => user_id,
        }
    }

    /// Returns the category of this event.
    #[must_use]
    pub const fn topic(&self) -> EventTopic {
        match self {
            Self::PointsAdded { .. } | Self::PointsRemoved { .. } => EventTopic::Points,
            Self::LevelChanged { .. } => EventTopic::Levels,
            Self::SessionStarted { .. } | Self::SessionFolded { .. } | Self::SessionStopped { .. } => {
                EventTopic::Sessions
            }
        }
    }

    /// Returns the event type as a static string slice.
    #[must_use]
    pub const fn event_type_str(&self) -> &'static str {
        match self {
            Self::PointsAdded { .. } => "points_added",
            Self::PointsRemoved { .. } => "points_removed",
            Self::LevelChanged { .. } => "level_changed",
            Self::SessionStarted { .. } => "session_started",
            Self::SessionFolded { .. } => "session_folded",
            Self::SessionStopped { .. } => "session_stopped",
        }
    }
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use super::*;

    fn uid() -> UserId {
        let Ok(id) = UserId::new("u1") else {
            panic!("valid id");
        };
        id
    }

    #[test]
    fn level_changed_serializes_with_tag() {
        let event = LoyaltyEvent::LevelChanged {
            user_id: uid(),
            old_level: "bronze".to_string(),
            new_level: "silver".to_string(),
            timestamp: Utc::now(),
        };
        let json = serde_json::to_string(&event).unwrap_or_default();
        assert!(json.contains("\"event_type\":\"level_changed\""));
        assert!(json.contains("\"new_level\":\"silver\""));
        assert_eq!(event.event_type_str(), "level_changed");
    }

    #[test]
    fn events_map_to_topics() {
        let folded = LoyaltyEvent::SessionFolded {
            user_id: uid(),
            elapsed_ms: 10,
            total_ms: 10,
            timestamp: Utc::now(),
        };
        let removed = LoyaltyEvent::PointsRemoved {
            user_id: uid(),
            amount: 5,
            reason: "coupon".to_string(),
            new_balance: -5,
            timestamp: Utc::now(),
        };
        assert_eq!(folded.topic(), EventTopic::Sessions);
        assert_eq!(removed.topic(), EventTopic::Points);
    }

    #[test]
    fn topic_parses_from_snake_case() {
        let topic: Result<EventTopic, _> = serde_json::from_str("\"levels\"");
        assert_eq!(topic.ok(), Some(EventTopic::Levels));
    }

    #[test]
    fn user_id_accessor() {
        let event = LoyaltyEvent::SessionStopped {
            user_id: uid(),
            total_ms: 1,
            timestamp: Utc::now(),
        };
        assert_eq!(event.user_id(), &uid());
    }
}
