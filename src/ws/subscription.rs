//! Per-connection event filter.
//!
//! A client follows users (or everyone, via `"*"`) per [`EventTopic`]: a
//! dashboard may want every level change but only one student's session
//! folds. Subscribing without topics means all topics.

use std::collections::{BTreeSet, HashMap};

use crate::domain::{EventTopic, LoyaltyEvent, UserId};

/// Which events one WebSocket connection receives.
#[derive(Debug, Default)]
pub struct SubscriptionManager {
    per_user: HashMap<UserId, BTreeSet<EventTopic>>,
    everyone: BTreeSet<EventTopic>,
}

fn topic_set(topics: &[EventTopic]) -> BTreeSet<EventTopic> {
    if topics.is_empty() {
        EventTopic::ALL.into_iter().collect()
    } else {
        topics.iter().copied().collect()
    }
}

impl SubscriptionManager {
    /// Creates a filter that forwards nothing.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Follows `topics` (all when empty) for `ids`, and for every user
    /// when `wildcard` is set.
    pub fn subscribe(&mut self, ids: &[UserId], wildcard: bool, topics: &[EventTopic]) {
        let topics = topic_set(topics);
        if wildcard {
            self.everyone.extend(topics.iter().copied());
        }
        for id in ids {
            self.per_user
                .entry(id.clone())
                .or_default()
                .extend(topics.iter().copied());
        }
    }

    /// Drops `topics` (all when empty) for `ids`, and from the wildcard
    /// when `wildcard` is set. Users left without topics are forgotten.
    pub fn unsubscribe(&mut self, ids: &[UserId], wildcard: bool, topics: &[EventTopic]) {
        let topics = topic_set(topics);
        if wildcard {
            self.everyone.retain(|t| !topics.contains(t));
        }
        for id in ids {
            if let Some(followed) = self.per_user.get_mut(id) {
                followed.retain(|t| !topics.contains(t));
                if followed.is_empty() {
                    self.per_user.remove(id);
                }
            }
        }
    }

    /// Returns `true` if `event` should be forwarded to this client.
    #[must_use]
    pub fn matches(&self, event: &LoyaltyEvent) -> bool {
        let topic = event.topic();
        self.everyone.contains(&topic)
            || self
                .per_user
                .get(event.user_id())
                .is_some_and(|followed| followed.contains(&topic))
    }

    /// Number of individually followed users.
    #[must_use]
    pub fn count(&self) -> usize {
        self.per_user.len()
    }

    /// Topics followed for every user.
    #[must_use]
    pub fn wildcard_topics(&self) -> Vec<EventTopic> {
        self.everyone.iter().copied().collect()
    }

    /// Returns `true` if any topic is followed for every user.
    #[must_use]
    pub fn is_subscribed_all(&self) -> bool {
        !self.everyone.is_empty()
    }
}
