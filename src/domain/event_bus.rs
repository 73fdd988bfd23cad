//! In-process fan-out of loyalty and session events.
//!
//! A ledger write can produce more than one event (a credit that crosses a
//! level threshold yields `points_added` followed by `level_changed`).
//! [`EventBus::publish_batch`] sends such groups back to back so every
//! receiver observes them in mutation order.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use tokio::sync::broadcast;

use super::LoyaltyEvent;

/// Broadcast bus for [`LoyaltyEvent`]s.
///
/// Lagging receivers lose the oldest events once `capacity` is exceeded;
/// the WebSocket layer logs the gap and keeps going.
#[derive(Debug, Clone)]
pub struct EventBus {
    sender: broadcast::Sender<LoyaltyEvent>,
    published: Arc<AtomicU64>,
}

impl EventBus {
    /// Creates a bus holding at most `capacity` undelivered events.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self {
            sender,
            published: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Publishes one event. Returns the number of receivers reached; with
    /// nobody listening the event is counted and dropped.
    pub fn publish(&self, event: LoyaltyEvent) -> usize {
        self.published.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(
            event_type = event.event_type_str(),
            user_id = %event.user_id(),
            "event published"
        );
        self.sender.send(event).unwrap_or(0)
    }

    /// Publishes the events of one mutation in order. Returns how many
    /// events were published.
    pub fn publish_batch(&self, events: impl IntoIterator<Item = LoyaltyEvent>) -> usize {
        events
            .into_iter()
            .map(|event| self.publish(event))
            .count()
    }

    /// Creates a receiver for all future events.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<LoyaltyEvent> {
        self.sender.subscribe()
    }

    /// Number of live receivers (open WebSocket connections).
    #[must_use]
    pub fn receiver_count(&self) -> usize {
        self.sender.receiver_count()
    }

    /// Total events published since start-up, delivered or not.
    #[must_use]
    pub fn published_count(&self) -> u64 {
        self.published.load(Ordering::Relaxed)
    }
}
