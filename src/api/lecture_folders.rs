//! Lecture folder API endpoints
//!
//! - GET/POST /api/v1/lecture-folders
//! - GET /api/v1/lecture-folders/tree
//! - GET/PUT/DELETE /api/v1/lecture-folders/{id}
//! - GET /api/v1/lecture-database?folder=ID - Lecture database browser

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    routing::get,
    Json, Router,
};

use crate::api::common::FolderQuery;
use crate::api::middleware::{ApiError, AppState, AuthenticatedUser};
use crate::models::{
    BrowseResult, CreateFolderInput, Folder, FolderTree, LectureFolderDetail, UpdateFolderInput,
};

/// Build the lecture folders router
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(list_folders).post(create_folder))
        .route("/tree", get(folder_tree))
        .route(
            "/{id}",
            get(get_folder).put(update_folder).delete(delete_folder),
        )
}

/// GET /api/v1/lecture-database - Browse lecture folders and lectures
pub async fn browse(
    State(state): State<AppState>,
    AuthenticatedUser(user): AuthenticatedUser,
    Query(query): Query<FolderQuery>,
) -> Result<Json<BrowseResult>, ApiError> {
    Ok(Json(
        state
            .lecture_folder_service
            .browse(&user, query.folder)
            .await?,
    ))
}

async fn list_folders(
    State(state): State<AppState>,
    AuthenticatedUser(user): AuthenticatedUser,
) -> Result<Json<Vec<Folder>>, ApiError> {
    Ok(Json(state.lecture_folder_service.list(&user).await?))
}

async fn folder_tree(
    State(state): State<AppState>,
    AuthenticatedUser(user): AuthenticatedUser,
) -> Result<Json<Vec<FolderTree>>, ApiError> {
    Ok(Json(state.lecture_folder_service.tree(&user).await?))
}

async fn get_folder(
    State(state): State<AppState>,
    _user: AuthenticatedUser,
    Path(id): Path<i64>,
) -> Result<Json<LectureFolderDetail>, ApiError> {
    Ok(Json(state.lecture_folder_service.detail(id).await?))
}

async fn create_folder(
    State(state): State<AppState>,
    AuthenticatedUser(user): AuthenticatedUser,
    Json(body): Json<CreateFolderInput>,
) -> Result<impl IntoResponse, ApiError> {
    let folder = state.lecture_folder_service.create(&user, body).await?;
    Ok((StatusCode::CREATED, Json(folder)))
}

async fn update_folder(
    State(state): State<AppState>,
    AuthenticatedUser(user): AuthenticatedUser,
    Path(id): Path<i64>,
    Json(body): Json<UpdateFolderInput>,
) -> Result<Json<Folder>, ApiError> {
    Ok(Json(
        state.lecture_folder_service.update(&user, id, body).await?,
    ))
}

async fn delete_folder(
    State(state): State<AppState>,
    AuthenticatedUser(user): AuthenticatedUser,
    Path(id): Path<i64>,
) -> Result<StatusCode, ApiError> {
    state.lecture_folder_service.delete(&user, id).await?;
    Ok(StatusCode::NO_CONTENT)
}
