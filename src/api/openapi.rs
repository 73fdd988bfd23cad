//! OpenAPI document for the REST surface.

use utoipa::OpenApi;

use crate::api::dto::{
    CourseCompletionRequest, HistoryResponse, LevelCatalogResponse, LevelProgressResponse,
    LevelResponse, PaginationMeta, PointsRequest, SessionResponse, UserListResponse,
    UserPointsResponse, VisibilityRequest,
};
use crate::api::handlers::{levels, points, sessions, system};
use crate::domain::{
    LevelDefinition, LevelProgress, PointTransaction, TrackerStatus, UserId, UserLoyaltyRecord,
};
use crate::error::{ErrorBody, ErrorResponse};
use crate::service::{PointsUpdate, SessionSnapshot};

/// Generated OpenAPI document.
#[derive(Debug, OpenApi)]
#[openapi(
    info(
        title = "MetSel Academy loyalty API",
        description = "Loyalty points ledger, membership levels and session time accrual."
    ),
    paths(
        points::add_points,
        points::deduct_points,
        points::get_points,
        points::get_history,
        points::complete_course,
        points::list_users,
        levels::get_level,
        levels::get_level_progress,
        levels::list_levels,
        sessions::login,
        sessions::logout,
        sessions::start,
        sessions::stop,
        sessions::visibility,
        sessions::unload,
        sessions::get_session,
        system::health_handler,
    ),
    components(schemas(
        UserId,
        PointTransaction,
        UserLoyaltyRecord,
        LevelDefinition,
        LevelProgress,
        TrackerStatus,
        PointsUpdate,
        SessionSnapshot,
        PointsRequest,
        CourseCompletionRequest,
        VisibilityRequest,
        UserPointsResponse,
        LevelResponse,
        LevelProgressResponse,
        HistoryResponse,
        UserListResponse,
        LevelCatalogResponse,
        SessionResponse,
        PaginationMeta,
        ErrorResponse,
        ErrorBody,
    )),
    tags(
        (name = "Points", description = "Point ledger"),
        (name = "Levels", description = "Membership levels"),
        (name = "Sessions", description = "Session time accrual"),
        (name = "System", description = "Service status"),
    )
)]
pub struct ApiDoc;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn document_lists_every_route() {
        let doc = ApiDoc::openapi();
        let paths: Vec<&String> = doc.paths.paths.keys().collect();
        assert!(paths.iter().any(|p| p.as_str() == "/api/v1/users/{id}/points"));
        assert!(paths.iter().any(|p| p.as_str() == "/api/v1/users/{id}/session/visibility"));
        assert!(paths.iter().any(|p| p.as_str() == "/health"));
    }
}
