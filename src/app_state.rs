//! Shared application state injected into all Axum handlers.

use std::sync::Arc;

use crate::config::AcademyConfig;
use crate::domain::{Clock, EventBus, LevelTable};
use crate::persistence::{KeyValueStore, LedgerRepository, ProfileRepository};
use crate::service::{LoyaltyService, SessionService};

/// Shared application state available to all handlers via Axum's
/// `State` extractor.
#[derive(Debug, Clone)]
pub struct AppState {
    /// Point ledger and level queries.
    pub loyalty_service: Arc<LoyaltyService>,
    /// Session accrual.
    pub session_service: Arc<SessionService>,
    /// Event bus for WebSocket subscriptions.
    pub event_bus: EventBus,
}

impl AppState {
    /// Wires both services over one store, clock and event bus.
    #[must_use]
    pub fn build(
        store: Arc<dyn KeyValueStore>,
        clock: Arc<dyn Clock>,
        levels: LevelTable,
        config: &AcademyConfig,
    ) -> Self {
        let event_bus = EventBus::new(config.event_bus_capacity);

        let loyalty_service = Arc::new(LoyaltyService::new(
            LedgerRepository::new(Arc::clone(&store), &config.key_prefix),
            levels,
            config.points_policy(),
            Arc::clone(&clock),
            event_bus.clone(),
        ));
        let session_service = Arc::new(SessionService::new(
            ProfileRepository::new(store, &config.key_prefix),
            clock,
            event_bus.clone(),
        ));

        Self {
            loyalty_service,
            session_service,
            event_bus,
        }
    }
}
