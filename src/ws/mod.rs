//! WebSocket layer: connection handling, message routing, subscriptions.
//!
//! The WebSocket endpoint at `/ws` streams [`crate::domain::LoyaltyEvent`]s
//! for the users a client subscribed to, and answers balance queries.

pub mod connection;
pub mod handler;
pub mod messages;
pub mod subscription;
