//! # metsel-loyalty
//!
//! Loyalty ledger, level engine and session-time tracking for MetSel
//! Academy, served over REST and WebSocket.
//!
//! Points are an append-only ledger of signed transactions; balances,
//! totals and levels are always derived from history. Session time is
//! accrued per user by a small state machine folded into a persisted
//! running total on every transition and on a periodic tick.
//!
//! ## Architecture
//!
//! ```text
//! Clients (HTTP, WebSocket)
//!     │
//!     ├── REST Handlers (api/)
//!     ├── WS Handler (ws/)
//!     │
//!     ├── LoyaltyService / SessionService (service/)
//!     ├── EventBus (domain/)
//!     │
//!     ├── Ledger, LevelTable, SessionState (domain/)
//!     │
//!     └── KeyValueStore (persistence/): memory or PostgreSQL
//! ```

pub mod api;
pub mod app_state;
pub mod config;
pub mod domain;
pub mod error;
pub mod persistence;
pub mod service;
pub mod ws;
