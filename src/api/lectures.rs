//! Lecture API endpoints
//!
//! - GET/POST /api/v1/lectures
//! - GET /api/v1/lectures/bulletins - Active lectures for the bulletin board
//! - GET/PUT/DELETE /api/v1/lectures/{id}
//! - GET /api/v1/lectures/{id}/view - Ordered contents with the `editable` flag
//! - GET /api/v1/lectures/{id}/slides - Slide ids of the contents
//! - POST /api/v1/lectures/{id}/toggle-activity

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};

use crate::api::middleware::{ApiError, AppState, AuthenticatedUser};
use crate::models::{
    ActivityToggle, BulletinEntry, CreateLectureInput, Lecture, LectureDetail, UpdateLectureInput,
};
use crate::services::LectureView;

/// Build the lectures router
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(list_lectures).post(create_lecture))
        .route("/bulletins", get(bulletins))
        .route(
            "/{id}",
            get(get_lecture).put(update_lecture).delete(delete_lecture),
        )
        .route("/{id}/view", get(view_lecture))
        .route("/{id}/slides", get(lecture_slides))
        .route("/{id}/toggle-activity", post(toggle_activity))
}

async fn list_lectures(
    State(state): State<AppState>,
    AuthenticatedUser(user): AuthenticatedUser,
) -> Result<Json<Vec<Lecture>>, ApiError> {
    Ok(Json(state.lecture_service.list(&user).await?))
}

async fn bulletins(
    State(state): State<AppState>,
    AuthenticatedUser(user): AuthenticatedUser,
) -> Result<Json<Vec<BulletinEntry>>, ApiError> {
    Ok(Json(state.lecture_service.bulletins(&user).await?))
}

async fn get_lecture(
    State(state): State<AppState>,
    AuthenticatedUser(user): AuthenticatedUser,
    Path(id): Path<i64>,
) -> Result<Json<LectureDetail>, ApiError> {
    Ok(Json(state.lecture_service.detail(&user, id).await?))
}

async fn view_lecture(
    State(state): State<AppState>,
    AuthenticatedUser(user): AuthenticatedUser,
    Path(id): Path<i64>,
) -> Result<Json<LectureView>, ApiError> {
    Ok(Json(state.lecture_service.view(&user, id).await?))
}

async fn lecture_slides(
    State(state): State<AppState>,
    AuthenticatedUser(user): AuthenticatedUser,
    Path(id): Path<i64>,
) -> Result<Json<Vec<i64>>, ApiError> {
    // Same visibility as the contents view
    let lecture = state.lecture_service.view(&user, id).await?;
    Ok(Json(state.lecture_service.slide_ids(lecture.lecture.id).await?))
}

async fn create_lecture(
    State(state): State<AppState>,
    AuthenticatedUser(user): AuthenticatedUser,
    Json(body): Json<CreateLectureInput>,
) -> Result<impl IntoResponse, ApiError> {
    let lecture = state.lecture_service.create(&user, body).await?;
    Ok((StatusCode::CREATED, Json(lecture)))
}

async fn update_lecture(
    State(state): State<AppState>,
    AuthenticatedUser(user): AuthenticatedUser,
    Path(id): Path<i64>,
    Json(body): Json<UpdateLectureInput>,
) -> Result<Json<Lecture>, ApiError> {
    Ok(Json(state.lecture_service.update(&user, id, body).await?))
}

async fn delete_lecture(
    State(state): State<AppState>,
    AuthenticatedUser(user): AuthenticatedUser,
    Path(id): Path<i64>,
) -> Result<StatusCode, ApiError> {
    state.lecture_service.delete(&user, id).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn toggle_activity(
    State(state): State<AppState>,
    AuthenticatedUser(user): AuthenticatedUser,
    Path(id): Path<i64>,
) -> Result<Json<ActivityToggle>, ApiError> {
    Ok(Json(state.lecture_service.toggle_activity(&user, id).await?))
}
