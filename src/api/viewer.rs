//! Slide viewer endpoints
//!
//! - GET /api/v1/viewer/{id}?annotation=ID - Viewer context
//! - GET /api/v1/viewer/{id}.dzi - Deep Zoom descriptor
//! - GET /api/v1/viewer/{id}_files/{level}/{col}_{row}.{fmt} - One tile
//! - POST /api/v1/viewer/{id}/annotations - Save an annotation from the viewer

use axum::{
    extract::{Path, Query, State},
    http::header,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::Deserialize;

use crate::api::middleware::{ApiError, AppState, AuthenticatedUser};
use crate::models::{SaveAnnotationInput, SaveAnnotationOutcome};

static DZI_NAME: Lazy<Regex> = Lazy::new(|| Regex::new(r"^(\d+)\.dzi$").expect("valid regex"));
static FILES_DIR: Lazy<Regex> = Lazy::new(|| Regex::new(r"^(\d+)_files$").expect("valid regex"));
static TILE_NAME: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(\d+)_(\d+)\.([A-Za-z]+)$").expect("valid regex"));

#[derive(Debug, Deserialize)]
pub struct ViewerQuery {
    #[serde(default)]
    pub annotation: Option<i64>,
}

/// Build the viewer router
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/{slide}", get(viewer_or_dzi))
        .route("/{slide}/annotations", post(save_annotation))
        .route("/{slide}/{level}/{tile}", get(tile))
}

/// `{id}` returns the viewer context and `{id}.dzi` the descriptor
async fn viewer_or_dzi(
    State(state): State<AppState>,
    AuthenticatedUser(user): AuthenticatedUser,
    Path(slide): Path<String>,
    Query(query): Query<ViewerQuery>,
) -> Result<Response, ApiError> {
    if let Some(caps) = DZI_NAME.captures(&slide) {
        let id = parse_id(&caps[1])?;
        let bytes = state.slide_service.dzi(&user, id).await?;
        return Ok(([(header::CONTENT_TYPE, "application/xml")], bytes).into_response());
    }

    let id = parse_id(&slide)?;
    let context = state
        .annotation_service
        .viewer_context(&user, id, query.annotation)
        .await?;
    Ok(Json(context).into_response())
}

async fn tile(
    State(state): State<AppState>,
    AuthenticatedUser(user): AuthenticatedUser,
    Path((files, level, tile)): Path<(String, String, String)>,
) -> Result<impl IntoResponse, ApiError> {
    let id = FILES_DIR
        .captures(&files)
        .map(|caps| parse_id(&caps[1]))
        .transpose()?
        .ok_or_else(|| ApiError::not_found("Tile not found"))?;
    let level: usize = level
        .parse()
        .map_err(|_| ApiError::not_found("Tile not found"))?;
    let caps = TILE_NAME
        .captures(&tile)
        .ok_or_else(|| ApiError::not_found("Tile not found"))?;
    let col: u32 = caps[1]
        .parse()
        .map_err(|_| ApiError::not_found("Tile not found"))?;
    let row: u32 = caps[2]
        .parse()
        .map_err(|_| ApiError::not_found("Tile not found"))?;

    let (bytes, format) = state
        .slide_service
        .tile(&user, id, level, col, row, &caps[3])
        .await?;
    Ok(([(header::CONTENT_TYPE, format.content_type())], bytes))
}

async fn save_annotation(
    State(state): State<AppState>,
    AuthenticatedUser(user): AuthenticatedUser,
    Path(slide): Path<i64>,
    Json(body): Json<SaveAnnotationInput>,
) -> Result<Json<SaveAnnotationOutcome>, ApiError> {
    Ok(Json(state.annotation_service.save(&user, slide, body).await?))
}

fn parse_id(raw: &str) -> Result<i64, ApiError> {
    raw.parse()
        .map_err(|_| ApiError::not_found(format!("Slide '{}' not found", raw)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_viewer_path_patterns() {
        assert_eq!(&DZI_NAME.captures("12.dzi").unwrap()[1], "12");
        assert!(DZI_NAME.captures("12").is_none());
        assert_eq!(&FILES_DIR.captures("7_files").unwrap()[1], "7");

        let caps = TILE_NAME.captures("3_14.jpeg").unwrap();
        assert_eq!((&caps[1], &caps[2], &caps[3]), ("3", "14", "jpeg"));
        assert!(TILE_NAME.captures("3-14.jpeg").is_none());
    }
}
