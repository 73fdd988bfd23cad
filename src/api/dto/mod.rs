//! Data Transfer Objects for REST request/response serialization.
//!
//! Every successful response carries `"success": true`, mirroring the
//! `"success": false` of [`crate::error::ErrorResponse`].

pub mod common_dto;
pub mod points_dto;
pub mod session_dto;

pub use common_dto::*;
pub use points_dto::*;
pub use session_dto::*;
