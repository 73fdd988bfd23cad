//! Service layer: business logic orchestration.
//!
//! [`LoyaltyService`] owns point ledger mutations and balance/level queries;
//! [`SessionService`] drives the session accrual state machine. Both persist
//! through the repositories in [`crate::persistence`] and emit events
//! through the [`crate::domain::EventBus`].

pub mod loyalty_service;
pub mod session_service;

pub use loyalty_service::{LoyaltyService, NegativeBalancePolicy, PointsPolicy, PointsUpdate};
pub use session_service::{SessionService, SessionSnapshot, TickReport, TickerHandle};
