//! Domain layer: identifiers, ledger arithmetic, levels, the session state
//! machine and the event system.
//!
//! Nothing in this module performs I/O. Balances, levels and session folds
//! are computed from plain values so they can be tested without a store.

pub mod clock;
pub mod event_bus;
pub mod ledger;
pub mod level;
pub mod loyalty_event;
pub mod profile;
pub mod session;
pub mod transaction;
pub mod user_id;

pub use clock::{Clock, ManualClock, SystemClock};
pub use event_bus::EventBus;
pub use ledger::{Ledger, UserLoyaltyRecord};
pub use level::{LevelDefinition, LevelProgress, LevelTable};
pub use loyalty_event::{EventTopic, LoyaltyEvent};
pub use profile::UserProfile;
pub use session::{FoldOutcome, SessionState, StartOutcome, TickOutcome, TrackerStatus};
pub use transaction::PointTransaction;
pub use user_id::UserId;
