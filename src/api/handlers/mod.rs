//! REST endpoint handlers organized by resource.

pub mod levels;
pub mod points;
pub mod sessions;
pub mod system;

use axum::Router;

use crate::app_state::AppState;
use crate::domain::UserId;
use crate::error::LoyaltyError;

/// Composes all resource routes under `/api/v1`.
pub fn routes() -> Router<AppState> {
    Router::new()
        .merge(points::routes())
        .merge(levels::routes())
        .merge(sessions::routes())
}

/// Parses a user id path segment.
fn parse_user_id(raw: &str) -> Result<UserId, LoyaltyError> {
    UserId::new(raw)
}
