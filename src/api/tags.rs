//! Tag API endpoints
//!
//! Handles HTTP requests for slide tags:
//! - GET /api/v1/tags - Tags with slide counts
//! - POST /api/v1/tags - Create a tag
//! - DELETE /api/v1/tags/{id} - Delete a tag (creator or staff)
//! - GET /api/v1/tags/{id}/slides - Viewable slides with the tag
//! - POST/DELETE /api/v1/tags/{id}/slides/{slide_id} - Attach or detach

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{delete, get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};

use crate::api::middleware::{ApiError, AppState, AuthenticatedUser};
use crate::models::{Slide, TagWithCount};

/// Request body for creating a tag
#[derive(Debug, Deserialize)]
pub struct CreateTagRequest {
    pub name: String,
}

/// Response for tag list
#[derive(Debug, Serialize)]
pub struct TagListResponse {
    pub tags: Vec<TagWithCount>,
}

/// Build the tags router
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(list_tags).post(create_tag))
        .route("/{id}", delete(delete_tag))
        .route("/{id}/slides", get(tag_slides))
        .route(
            "/{id}/slides/{slide_id}",
            post(attach_tag).delete(detach_tag),
        )
}

async fn list_tags(
    State(state): State<AppState>,
    AuthenticatedUser(user): AuthenticatedUser,
) -> Result<Json<TagListResponse>, ApiError> {
    let tags = state.tag_service.list(&user).await?;
    Ok(Json(TagListResponse { tags }))
}

async fn create_tag(
    State(state): State<AppState>,
    AuthenticatedUser(user): AuthenticatedUser,
    Json(body): Json<CreateTagRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let tag = state.tag_service.create(&user, &body.name).await?;
    Ok((StatusCode::CREATED, Json(tag)))
}

async fn delete_tag(
    State(state): State<AppState>,
    AuthenticatedUser(user): AuthenticatedUser,
    Path(id): Path<i64>,
) -> Result<StatusCode, ApiError> {
    state.tag_service.delete(&user, id).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn tag_slides(
    State(state): State<AppState>,
    AuthenticatedUser(user): AuthenticatedUser,
    Path(id): Path<i64>,
) -> Result<Json<Vec<Slide>>, ApiError> {
    Ok(Json(state.tag_service.slides(&user, id).await?))
}

async fn attach_tag(
    State(state): State<AppState>,
    AuthenticatedUser(user): AuthenticatedUser,
    Path((id, slide_id)): Path<(i64, i64)>,
) -> Result<StatusCode, ApiError> {
    state.tag_service.attach(&user, id, slide_id).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn detach_tag(
    State(state): State<AppState>,
    AuthenticatedUser(user): AuthenticatedUser,
    Path((id, slide_id)): Path<(i64, i64)>,
) -> Result<StatusCode, ApiError> {
    state.tag_service.detach(&user, id, slide_id).await?;
    Ok(StatusCode::NO_CONTENT)
}
