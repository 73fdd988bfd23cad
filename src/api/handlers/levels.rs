//! Level handlers: current level, progress, catalog.

use axum::extract::{Path, State};
use axum::response::IntoResponse;
use axum::routing::get;
use axum::{Json, Router};

use super::parse_user_id;
use crate::api::dto::{LevelCatalogResponse, LevelProgressResponse, LevelResponse};
use crate::app_state::AppState;
use crate::error::LoyaltyError;

/// `GET /users/{id}/level`: Current level.
///
/// # Errors
///
/// Returns [`LoyaltyError::PersistenceFailure`] if the store is unavailable.
#[utoipa::path(
    get,
    path = "/api/v1/users/{id}/level",
    tag = "Levels",
    summary = "Get current level",
    params(("id" = String, Path, description = "User id")),
    responses(
        (status = 200, description = "Current level", body = LevelResponse),
    )
)]
pub async fn get_level(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, LoyaltyError> {
    let user_id = parse_user_id(&id)?;
    let level = state.loyalty_service.get_level_info(&user_id).await?;
    Ok(Json(LevelResponse {
        success: true,
        user_id,
        level,
    }))
}

/// `GET /users/{id}/level/progress`: Progress towards the next level.
///
/// # Errors
///
/// Returns [`LoyaltyError::PersistenceFailure`] if the store is unavailable.
#[utoipa::path(
    get,
    path = "/api/v1/users/{id}/level/progress",
    tag = "Levels",
    summary = "Get level progress",
    description = "Linear progress between the current and the next threshold; 100 at the top level.",
    params(("id" = String, Path, description = "User id")),
    responses(
        (status = 200, description = "Level progress", body = LevelProgressResponse),
    )
)]
pub async fn get_level_progress(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, LoyaltyError> {
    let user_id = parse_user_id(&id)?;
    let progress = state.loyalty_service.get_level_progress(&user_id).await?;
    Ok(Json(LevelProgressResponse {
        success: true,
        user_id,
        progress,
    }))
}

/// `GET /levels`: Level catalog.
#[utoipa::path(
    get,
    path = "/api/v1/levels",
    tag = "Levels",
    summary = "List levels",
    responses(
        (status = 200, description = "Levels in ascending order", body = LevelCatalogResponse),
    )
)]
pub async fn list_levels(State(state): State<AppState>) -> impl IntoResponse {
    Json(LevelCatalogResponse {
        success: true,
        levels: state.loyalty_service.level_table().levels().cloned().collect(),
    })
}

/// Level routes.
pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/levels", get(list_levels))
        .route("/users/{id}/level", get(get_level))
        .route("/users/{id}/level/progress", get(get_level_progress))
}
