//! Staff-only API endpoints
//!
//! - GET /api/v1/admin/users
//! - PUT /api/v1/admin/users/{id} - Profile, `is_staff` and `is_active`
//! - POST /api/v1/admin/groups, DELETE /api/v1/admin/groups/{id}
//! - GET /api/v1/admin/groups/{id}/members
//! - POST/DELETE /api/v1/admin/groups/{id}/members/{user_id}
//! - GET /api/v1/admin/integrity - Slides that need repair
//!
//! And for every signed-in user:
//! - GET /api/v1/groups?kind=publisher|viewer

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{delete, get, post, put},
    Json, Router,
};
use serde::{Deserialize, Serialize};

use crate::api::middleware::{ApiError, AppState, AuthenticatedUser};
use crate::models::{CreateGroupInput, Group, GroupKind, SlideIntegrityReport, UpdateUserInput, User};

#[derive(Debug, Deserialize)]
pub struct GroupListQuery {
    #[serde(default)]
    pub kind: Option<GroupKind>,
}

/// Response for the integrity report
#[derive(Debug, Serialize)]
pub struct IntegrityResponse {
    pub total: usize,
    pub slides: Vec<SlideIntegrityReport>,
}

/// Build the admin router (mounted behind `require_admin`)
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/users", get(list_users))
        .route("/users/{id}", put(update_user))
        .route("/groups", post(create_group))
        .route("/groups/{id}", delete(delete_group))
        .route("/groups/{id}/members", get(group_members))
        .route(
            "/groups/{id}/members/{user_id}",
            post(add_member).delete(remove_member),
        )
        .route("/integrity", get(integrity_report))
}

/// GET /api/v1/groups - Groups offered when editing lectures
pub async fn list_groups(
    State(state): State<AppState>,
    _user: AuthenticatedUser,
    Query(query): Query<GroupListQuery>,
) -> Result<Json<Vec<Group>>, ApiError> {
    Ok(Json(state.group_service.list(query.kind).await?))
}

async fn list_users(State(state): State<AppState>) -> Result<Json<Vec<User>>, ApiError> {
    Ok(Json(state.user_service.list_users().await?))
}

async fn update_user(
    State(state): State<AppState>,
    AuthenticatedUser(admin): AuthenticatedUser,
    Path(id): Path<i64>,
    Json(body): Json<UpdateUserInput>,
) -> Result<Json<User>, ApiError> {
    let user = state.user_service.update_user(id, body).await?;
    tracing::info!("User '{}' updated by {}", user.username, admin.user.username);
    Ok(Json(user))
}

async fn create_group(
    State(state): State<AppState>,
    Json(body): Json<CreateGroupInput>,
) -> Result<impl IntoResponse, ApiError> {
    let group = state.group_service.create(body).await?;
    Ok((StatusCode::CREATED, Json(group)))
}

async fn delete_group(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<StatusCode, ApiError> {
    state.group_service.delete(id).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn group_members(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<Json<Vec<User>>, ApiError> {
    Ok(Json(state.group_service.members(id).await?))
}

async fn add_member(
    State(state): State<AppState>,
    Path((id, user_id)): Path<(i64, i64)>,
) -> Result<StatusCode, ApiError> {
    state.group_service.add_member(id, user_id).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn remove_member(
    State(state): State<AppState>,
    Path((id, user_id)): Path<(i64, i64)>,
) -> Result<StatusCode, ApiError> {
    state.group_service.remove_member(id, user_id).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn integrity_report(
    State(state): State<AppState>,
) -> Result<Json<IntegrityResponse>, ApiError> {
    let slides = state.slide_service.integrity_all().await?;
    Ok(Json(IntegrityResponse {
        total: slides.len(),
        slides,
    }))
}
