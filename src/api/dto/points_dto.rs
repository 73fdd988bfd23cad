//! Points, level and history DTOs.

use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};

use super::common_dto::PaginationMeta;
use crate::domain::{LevelDefinition, LevelProgress, PointTransaction, UserId, UserLoyaltyRecord};

/// Request body for crediting or debiting points.
#[derive(Debug, Deserialize, ToSchema)]
pub struct PointsRequest {
    /// Positive number of points.
    pub amount: i64,
    /// Human-readable reason.
    #[serde(default)]
    pub reason: String,
}

/// Request body for `POST /users/{id}/courses/{course_id}/complete`.
#[derive(Debug, Deserialize, ToSchema)]
pub struct CourseCompletionRequest {
    /// Course title, used in the transaction reason.
    pub course_title: String,
    /// Whether the course is premium.
    #[serde(default)]
    pub is_premium: bool,
}

/// Response wrapping a user's loyalty record.
#[derive(Debug, Serialize, ToSchema)]
pub struct UserPointsResponse {
    /// Always `true`.
    pub success: bool,
    /// The recomputed record.
    #[serde(flatten)]
    pub record: UserLoyaltyRecord,
}

/// Response wrapping a user's current level.
#[derive(Debug, Serialize, ToSchema)]
pub struct LevelResponse {
    /// Always `true`.
    pub success: bool,
    /// Owner of the level.
    pub user_id: UserId,
    /// Full level definition.
    pub level: LevelDefinition,
}

/// Response wrapping level progress.
#[derive(Debug, Serialize, ToSchema)]
pub struct LevelProgressResponse {
    /// Always `true`.
    pub success: bool,
    /// Owner of the progress.
    pub user_id: UserId,
    /// Progress towards the next level.
    #[serde(flatten)]
    pub progress: LevelProgress,
}

/// Query parameters for history listing.
#[derive(Debug, Clone, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct HistoryParams {
    /// Maximum number of transactions (max 500). Defaults to 50.
    #[serde(default = "default_history_limit")]
    pub limit: usize,
}

fn default_history_limit() -> usize {
    50
}

/// Response for `GET /users/{id}/points/history`.
#[derive(Debug, Serialize, ToSchema)]
pub struct HistoryResponse {
    /// Always `true`.
    pub success: bool,
    /// Owner of the history.
    pub user_id: UserId,
    /// Transactions, newest first.
    pub transactions: Vec<PointTransaction>,
}

/// Response for `GET /users`.
#[derive(Debug, Serialize, ToSchema)]
pub struct UserListResponse {
    /// Always `true`.
    pub success: bool,
    /// One record per user with history.
    pub data: Vec<UserLoyaltyRecord>,
    /// Pagination metadata.
    pub pagination: PaginationMeta,
}

/// Response for `GET /levels`.
#[derive(Debug, Serialize, ToSchema)]
pub struct LevelCatalogResponse {
    /// Always `true`.
    pub success: bool,
    /// Levels in ascending threshold order.
    pub levels: Vec<LevelDefinition>,
}
