//! Opaque user identifier.
//!
//! [`UserId`] wraps whatever string the account system hands out. It is
//! never parsed or interpreted, only compared, hashed and ordered.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::error::LoyaltyError;

/// Unique identifier of an academy user.
///
/// Used as the grouping key of the point ledger, the key of the session
/// registry and the WebSocket subscription target.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, ToSchema)]
#[serde(transparent)]
pub struct UserId(String);

impl UserId {
    /// Creates a `UserId` from a raw string, trimming surrounding whitespace.
    ///
    /// # Errors
    ///
    /// Returns [`LoyaltyError::InvalidRequest`] if the trimmed value is empty.
    pub fn new(raw: impl AsRef<str>) -> Result<Self, LoyaltyError> {
        let trimmed = raw.as_ref().trim();
        if trimmed.is_empty() {
            return Err(LoyaltyError::InvalidRequest(
                "user id must not be empty".to_string(),
            ));
        }
        Ok(Self(trimmed.to_string()))
    }

    /// Returns the identifier as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for UserId {
    type Err = LoyaltyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

impl AsRef<str> for UserId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use super::*;

    #[test]
    fn new_trims_whitespace() {
        let Ok(id) = UserId::new("  alice ") else {
            panic!("valid id rejected");
        };
        assert_eq!(id.as_str(), "alice");
        assert_eq!(format!("{id}"), "alice");
    }

    #[test]
    fn blank_id_is_rejected() {
        assert!(UserId::new("").is_err());
        assert!(UserId::new("   ").is_err());
    }

    #[test]
    fn serializes_as_plain_string() {
        let Ok(id) = "user-42".parse::<UserId>() else {
            panic!("valid id rejected");
        };
        let json = serde_json::to_string(&id).unwrap_or_default();
        assert_eq!(json, "\"user-42\"");
    }

    #[test]
    fn ordering_is_lexicographic() {
        let (Ok(a), Ok(b)) = (UserId::new("a"), UserId::new("b")) else {
            panic!("valid ids rejected");
        };
        assert!(a < b);
    }
}
