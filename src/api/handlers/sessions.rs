//! Session tracking handlers.
//!
//! These endpoints stand in for the browser events the tracker reacts to:
//! login/logout, explicit start/stop, visibility changes and page unload.

use axum::extract::{Path, State};
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};

use super::parse_user_id;
use crate::api::dto::{SessionResponse, VisibilityRequest};
use crate::app_state::AppState;
use crate::error::{ErrorResponse, LoyaltyError};

/// `POST /users/{id}/session/login`: Mark the user authenticated.
///
/// # Errors
///
/// Returns [`LoyaltyError::PersistenceFailure`] if the stored total cannot
/// be read.
#[utoipa::path(
    post,
    path = "/api/v1/users/{id}/session/login",
    tag = "Sessions",
    summary = "Authenticate session user",
    params(("id" = String, Path, description = "User id")),
    responses(
        (status = 200, description = "Session view", body = SessionResponse),
    )
)]
pub async fn login(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, LoyaltyError> {
    let user_id = parse_user_id(&id)?;
    let snapshot = state.session_service.login(&user_id).await?;
    Ok(Json(SessionResponse::from(snapshot)))
}

/// `POST /users/{id}/session/logout`: Clear authentication.
///
/// # Errors
///
/// Returns [`LoyaltyError::NotAuthenticated`] for unknown users.
#[utoipa::path(
    post,
    path = "/api/v1/users/{id}/session/logout",
    tag = "Sessions",
    summary = "Log session user out",
    description = "Tracking stops at the next periodic tick, after a final fold.",
    params(("id" = String, Path, description = "User id")),
    responses(
        (status = 200, description = "Session view", body = SessionResponse),
        (status = 401, description = "Unknown user", body = ErrorResponse),
    )
)]
pub async fn logout(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, LoyaltyError> {
    let user_id = parse_user_id(&id)?;
    let snapshot = state.session_service.logout(&user_id).await?;
    Ok(Json(SessionResponse::from(snapshot)))
}

/// `POST /users/{id}/session/start`: Start tracking.
///
/// # Errors
///
/// Returns [`LoyaltyError::NotAuthenticated`] if the user is not logged in.
#[utoipa::path(
    post,
    path = "/api/v1/users/{id}/session/start",
    tag = "Sessions",
    summary = "Start session tracking",
    params(("id" = String, Path, description = "User id")),
    responses(
        (status = 200, description = "Session view", body = SessionResponse),
        (status = 401, description = "Not authenticated", body = ErrorResponse),
    )
)]
pub async fn start(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, LoyaltyError> {
    let user_id = parse_user_id(&id)?;
    let snapshot = state.session_service.start(&user_id).await?;
    Ok(Json(SessionResponse::from(snapshot)))
}

/// `POST /users/{id}/session/stop`: Fold and stop tracking.
///
/// # Errors
///
/// Returns [`LoyaltyError::NotAuthenticated`] for unknown users or
/// [`LoyaltyError::PersistenceFailure`] if the fold cannot be saved.
#[utoipa::path(
    post,
    path = "/api/v1/users/{id}/session/stop",
    tag = "Sessions",
    summary = "Stop session tracking",
    params(("id" = String, Path, description = "User id")),
    responses(
        (status = 200, description = "Session view", body = SessionResponse),
        (status = 401, description = "Unknown user", body = ErrorResponse),
        (status = 500, description = "Fold not saved", body = ErrorResponse),
    )
)]
pub async fn stop(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, LoyaltyError> {
    let user_id = parse_user_id(&id)?;
    let snapshot = state.session_service.stop(&user_id).await?;
    Ok(Json(SessionResponse::from(snapshot)))
}

/// `POST /users/{id}/session/visibility`: Window hidden or shown.
///
/// # Errors
///
/// Returns [`LoyaltyError::NotAuthenticated`] for unknown users or
/// [`LoyaltyError::PersistenceFailure`] if the fold cannot be saved.
#[utoipa::path(
    post,
    path = "/api/v1/users/{id}/session/visibility",
    tag = "Sessions",
    summary = "Report visibility change",
    params(("id" = String, Path, description = "User id")),
    request_body = VisibilityRequest,
    responses(
        (status = 200, description = "Session view", body = SessionResponse),
        (status = 401, description = "Unknown user", body = ErrorResponse),
    )
)]
pub async fn visibility(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(req): Json<VisibilityRequest>,
) -> Result<impl IntoResponse, LoyaltyError> {
    let user_id = parse_user_id(&id)?;
    let snapshot = state
        .session_service
        .visibility_changed(&user_id, req.hidden)
        .await?;
    Ok(Json(SessionResponse::from(snapshot)))
}

/// `POST /users/{id}/session/unload`: Best-effort final save.
///
/// # Errors
///
/// Returns [`LoyaltyError::NotAuthenticated`] for unknown users or
/// [`LoyaltyError::PersistenceFailure`] if the fold cannot be saved.
#[utoipa::path(
    post,
    path = "/api/v1/users/{id}/session/unload",
    tag = "Sessions",
    summary = "Report page unload",
    params(("id" = String, Path, description = "User id")),
    responses(
        (status = 200, description = "Session view", body = SessionResponse),
        (status = 401, description = "Unknown user", body = ErrorResponse),
    )
)]
pub async fn unload(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, LoyaltyError> {
    let user_id = parse_user_id(&id)?;
    let snapshot = state.session_service.unload(&user_id).await?;
    Ok(Json(SessionResponse::from(snapshot)))
}

/// `GET /users/{id}/session`: Live session view.
///
/// # Errors
///
/// Returns [`LoyaltyError::NotAuthenticated`] for unknown users.
#[utoipa::path(
    get,
    path = "/api/v1/users/{id}/session",
    tag = "Sessions",
    summary = "Get session view",
    params(("id" = String, Path, description = "User id")),
    responses(
        (status = 200, description = "Session view", body = SessionResponse),
        (status = 401, description = "Unknown user", body = ErrorResponse),
    )
)]
pub async fn get_session(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, LoyaltyError> {
    let user_id = parse_user_id(&id)?;
    let snapshot = state.session_service.snapshot(&user_id).await?;
    Ok(Json(SessionResponse::from(snapshot)))
}

/// Session routes.
pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/users/{id}/session", get(get_session))
        .route("/users/{id}/session/login", post(login))
        .route("/users/{id}/session/logout", post(logout))
        .route("/users/{id}/session/start", post(start))
        .route("/users/{id}/session/stop", post(stop))
        .route("/users/{id}/session/visibility", post(visibility))
        .route("/users/{id}/session/unload", post(unload))
}
