//! Session tracking DTOs.

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::service::SessionSnapshot;

/// Request body for `POST /users/{id}/session/visibility`.
#[derive(Debug, Deserialize, ToSchema)]
pub struct VisibilityRequest {
    /// `true` when the window became hidden.
    pub hidden: bool,
}

/// Response wrapping a session snapshot.
#[derive(Debug, Serialize, ToSchema)]
pub struct SessionResponse {
    /// Always `true`.
    pub success: bool,
    /// Live session view.
    #[serde(flatten)]
    pub session: SessionSnapshot,
}

impl From<SessionSnapshot> for SessionResponse {
    fn from(session: SessionSnapshot) -> Self {
        Self {
            success: true,
            session,
        }
    }
}
