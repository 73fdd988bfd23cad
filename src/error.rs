//! Loyalty error types with HTTP status code mapping.
//!
//! [`LoyaltyError`] is the central error type of the crate. Core operations
//! return it inside a `Result`; the REST layer renders it as the
//! `{ "success": false, "error": { ... } }` envelope consumers branch on.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Serialize;
use utoipa::ToSchema;

use crate::domain::UserId;

/// Structured JSON failure body.
///
/// All failed operations answer with this shape:
/// ```json
/// {
///   "success": false,
///   "error": {
///     "code": 1001,
///     "message": "invalid amount: 0 (must be positive)"
///   }
/// }
/// ```
#[derive(Debug, Serialize, ToSchema)]
pub struct ErrorResponse {
    /// Always `false` for failures.
    pub success: bool,
    /// Structured error payload.
    pub error: ErrorBody,
}

/// Inner error body with numeric code and human-readable message.
#[derive(Debug, Serialize, ToSchema)]
pub struct ErrorBody {
    /// Numeric error code (see [`LoyaltyError`] code ranges).
    pub code: u32,
    /// Human-readable error message.
    pub message: String,
    /// Optional additional details.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}

/// Crate-wide error enum with HTTP status code mapping.
///
/// # Error Code Ranges
///
/// | Range     | Category        | HTTP Status                  |
/// |-----------|-----------------|------------------------------|
/// | 1000–1999 | Validation      | 400 Bad Request              |
/// | 2000–2999 | State           | 401 Unauthorized / 422       |
/// | 3000–3999 | Server/Storage  | 500 Internal Server Error    |
#[derive(Debug, thiserror::Error)]
pub enum LoyaltyError {
    /// A point amount was zero or negative.
    #[error("invalid amount: {0} (must be positive)")]
    InvalidAmount(i64),

    /// Request validation failed.
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// A debit would drive the balance below zero while the floor is enforced.
    #[error("insufficient points: {available} available, {requested} requested")]
    InsufficientPoints {
        /// Balance before the rejected debit.
        available: i64,
        /// Amount the caller tried to remove.
        requested: i64,
    },

    /// A transaction would push a user's balance or lifetime totals out of
    /// the `i64` range.
    #[error("point totals of user {0} would overflow")]
    BalanceOverflow(UserId),

    /// Session operation attempted for a user that is not logged in.
    #[error("user {0} is not authenticated")]
    NotAuthenticated(UserId),

    /// The key-value store failed to read or write.
    #[error("persistence failure: {0}")]
    PersistenceFailure(String),

    /// A stored value could not be decoded.
    #[error("malformed stored data under {key}: {reason}")]
    MalformedStoredData {
        /// Store key holding the bad value.
        key: String,
        /// Decoder message.
        reason: String,
    },

    /// A level table failed validation.
    #[error("invalid level table: {0}")]
    InvalidLevelTable(String),

    /// Internal error.
    #[error("internal error: {0}")]
    Internal(String),
}

impl LoyaltyError {
    /// Returns the numeric error code for this variant.
    #[must_use]
    pub const fn error_code(&self) -> u32 {
        match self {
            Self::InvalidAmount(_) => 1001,
            Self::InvalidRequest(_) => 1002,
            Self::InvalidLevelTable(_) => 1003,
            Self::NotAuthenticated(_) => 2001,
            Self::InsufficientPoints { .. } => 2002,
            Self::BalanceOverflow(_) => 2003,
            Self::Internal(_) => 3000,
            Self::PersistenceFailure(_) => 3001,
            Self::MalformedStoredData { .. } => 3002,
        }
    }

    /// Returns the HTTP status code for this variant.
    #[must_use]
    pub const fn status_code(&self) -> StatusCode {
        match self {
            Self::InvalidAmount(_) | Self::InvalidRequest(_) | Self::InvalidLevelTable(_) => {
                StatusCode::BAD_REQUEST
            }
            Self::NotAuthenticated(_) => StatusCode::UNAUTHORIZED,
            Self::InsufficientPoints { .. } | Self::BalanceOverflow(_) => {
                StatusCode::UNPROCESSABLE_ENTITY
            }
            Self::PersistenceFailure(_) | Self::MalformedStoredData { .. } | Self::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

impl IntoResponse for LoyaltyError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() {
            tracing::error!(error = %self, "request failed");
        }
        let body = ErrorResponse {
            success: false,
            error: ErrorBody {
                code: self.error_code(),
                message: self.to_string(),
                details: None,
            },
        };
        let mut response = axum::Json(body).into_response();
        *response.status_mut() = status;
        response
    }
}
