//! Point ledger handlers: credit, debit, balance, history, course awards.

use axum::extract::{Path, Query, State};
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};

use super::parse_user_id;
use crate::api::dto::{
    CourseCompletionRequest, HistoryParams, HistoryResponse, PaginationParams, PointsRequest,
    UserListResponse, UserPointsResponse,
};
use crate::app_state::AppState;
use crate::error::{ErrorResponse, LoyaltyError};
use crate::service::PointsUpdate;

/// `POST /users/{id}/points`: Credit points.
///
/// # Errors
///
/// Returns [`LoyaltyError::InvalidAmount`] for non-positive amounts or
/// [`LoyaltyError::BalanceOverflow`] when the balance would leave `i64`.
#[utoipa::path(
    post,
    path = "/api/v1/users/{id}/points",
    tag = "Points",
    summary = "Add points",
    description = "Appends a credit transaction and returns the new balance.",
    params(("id" = String, Path, description = "User id")),
    request_body = PointsRequest,
    responses(
        (status = 200, description = "Points added", body = PointsUpdate),
        (status = 400, description = "Invalid amount", body = ErrorResponse),
        (status = 422, description = "Balance would overflow", body = ErrorResponse),
    )
)]
pub async fn add_points(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(req): Json<PointsRequest>,
) -> Result<impl IntoResponse, LoyaltyError> {
    let user_id = parse_user_id(&id)?;
    let update = state
        .loyalty_service
        .add_points(&user_id, req.amount, &req.reason)
        .await?;
    Ok(Json(update))
}

/// `POST /users/{id}/points/deduct`: Debit points.
///
/// # Errors
///
/// Returns [`LoyaltyError::InvalidAmount`] for non-positive amounts or
/// [`LoyaltyError::InsufficientPoints`] when the balance floor is enforced.
#[utoipa::path(
    post,
    path = "/api/v1/users/{id}/points/deduct",
    tag = "Points",
    summary = "Remove points",
    description = "Appends a debit transaction and returns the new balance.",
    params(("id" = String, Path, description = "User id")),
    request_body = PointsRequest,
    responses(
        (status = 200, description = "Points removed", body = PointsUpdate),
        (status = 400, description = "Invalid amount", body = ErrorResponse),
        (status = 422, description = "Balance floor reached", body = ErrorResponse),
    )
)]
pub async fn deduct_points(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(req): Json<PointsRequest>,
) -> Result<impl IntoResponse, LoyaltyError> {
    let user_id = parse_user_id(&id)?;
    let update = state
        .loyalty_service
        .remove_points(&user_id, req.amount, &req.reason)
        .await?;
    Ok(Json(update))
}

/// `GET /users/{id}/points`: Balance and level.
///
/// # Errors
///
/// Returns [`LoyaltyError::PersistenceFailure`] if the store is unavailable.
#[utoipa::path(
    get,
    path = "/api/v1/users/{id}/points",
    tag = "Points",
    summary = "Get user points",
    description = "Recomputes the balance from history. Unknown users report zero.",
    params(("id" = String, Path, description = "User id")),
    responses(
        (status = 200, description = "Loyalty record", body = UserPointsResponse),
    )
)]
pub async fn get_points(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, LoyaltyError> {
    let user_id = parse_user_id(&id)?;
    let record = state.loyalty_service.get_user_points(&user_id).await?;
    Ok(Json(UserPointsResponse {
        success: true,
        record,
    }))
}

/// `GET /users/{id}/points/history`: Transactions, newest first.
///
/// # Errors
///
/// Returns [`LoyaltyError::PersistenceFailure`] if the store is unavailable.
#[utoipa::path(
    get,
    path = "/api/v1/users/{id}/points/history",
    tag = "Points",
    summary = "Get transaction history",
    params(("id" = String, Path, description = "User id"), HistoryParams),
    responses(
        (status = 200, description = "Transactions", body = HistoryResponse),
    )
)]
pub async fn get_history(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Query(params): Query<HistoryParams>,
) -> Result<impl IntoResponse, LoyaltyError> {
    let user_id = parse_user_id(&id)?;
    let transactions = state
        .loyalty_service
        .get_transaction_history(&user_id, params.limit.min(500))
        .await?;
    Ok(Json(HistoryResponse {
        success: true,
        user_id,
        transactions,
    }))
}

/// `POST /users/{id}/courses/{course_id}/complete`: Course completion award.
///
/// # Errors
///
/// Returns [`LoyaltyError::InvalidRequest`] for a blank course id.
#[utoipa::path(
    post,
    path = "/api/v1/users/{id}/courses/{course_id}/complete",
    tag = "Points",
    summary = "Award course completion points",
    params(
        ("id" = String, Path, description = "User id"),
        ("course_id" = String, Path, description = "Course id"),
    ),
    request_body = CourseCompletionRequest,
    responses(
        (status = 200, description = "Points awarded", body = PointsUpdate),
        (status = 400, description = "Invalid request", body = ErrorResponse),
    )
)]
pub async fn complete_course(
    State(state): State<AppState>,
    Path((id, course_id)): Path<(String, String)>,
    Json(req): Json<CourseCompletionRequest>,
) -> Result<impl IntoResponse, LoyaltyError> {
    let user_id = parse_user_id(&id)?;
    let update = state
        .loyalty_service
        .add_points_for_course_completion(&course_id, &req.course_title, req.is_premium, &user_id)
        .await?;
    Ok(Json(update))
}

/// `GET /users`: All users with point history.
///
/// # Errors
///
/// Returns [`LoyaltyError::PersistenceFailure`] if the store is unavailable.
#[utoipa::path(
    get,
    path = "/api/v1/users",
    tag = "Points",
    summary = "List users with points",
    params(PaginationParams),
    responses(
        (status = 200, description = "Paginated user records", body = UserListResponse),
    )
)]
pub async fn list_users(
    State(state): State<AppState>,
    Query(params): Query<PaginationParams>,
) -> Result<impl IntoResponse, LoyaltyError> {
    let records = state.loyalty_service.get_all_users_with_points().await?;
    let (data, pagination) = params.paginate(records);
    Ok(Json(UserListResponse {
        success: true,
        data,
        pagination,
    }))
}

/// Point ledger routes.
pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/users", get(list_users))
        .route("/users/{id}/points", post(add_points).get(get_points))
        .route("/users/{id}/points/deduct", post(deduct_points))
        .route("/users/{id}/points/history", get(get_history))
        .route("/users/{id}/courses/{course_id}/complete", post(complete_course))
}
