//! Annotation API endpoints
//!
//! - GET/POST /api/v1/annotations
//! - GET/PUT/DELETE /api/v1/annotations/{id}

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    routing::get,
    Json, Router,
};

use crate::api::middleware::{ApiError, AppState, AuthenticatedUser};
use crate::models::{Annotation, CreateAnnotationInput, UpdateAnnotationInput};
use crate::services::AnnotationDetail;

/// Build the annotations router
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(list_annotations).post(create_annotation))
        .route(
            "/{id}",
            get(get_annotation)
                .put(update_annotation)
                .delete(delete_annotation),
        )
}

async fn list_annotations(
    State(state): State<AppState>,
    AuthenticatedUser(user): AuthenticatedUser,
) -> Result<Json<Vec<Annotation>>, ApiError> {
    Ok(Json(state.annotation_service.list(&user).await?))
}

async fn get_annotation(
    State(state): State<AppState>,
    AuthenticatedUser(user): AuthenticatedUser,
    Path(id): Path<i64>,
) -> Result<Json<AnnotationDetail>, ApiError> {
    Ok(Json(state.annotation_service.detail(&user, id).await?))
}

async fn create_annotation(
    State(state): State<AppState>,
    AuthenticatedUser(user): AuthenticatedUser,
    Json(body): Json<CreateAnnotationInput>,
) -> Result<impl IntoResponse, ApiError> {
    let annotation = state.annotation_service.create(&user, body).await?;
    Ok((StatusCode::CREATED, Json(annotation)))
}

async fn update_annotation(
    State(state): State<AppState>,
    AuthenticatedUser(user): AuthenticatedUser,
    Path(id): Path<i64>,
    Json(body): Json<UpdateAnnotationInput>,
) -> Result<Json<Annotation>, ApiError> {
    Ok(Json(state.annotation_service.update(&user, id, body).await?))
}

async fn delete_annotation(
    State(state): State<AppState>,
    AuthenticatedUser(user): AuthenticatedUser,
    Path(id): Path<i64>,
) -> Result<StatusCode, ApiError> {
    state.annotation_service.delete(&user, id).await?;
    Ok(StatusCode::NO_CONTENT)
}
