//! Slide API endpoints
//!
//! Handles HTTP requests for slides:
//! - GET /api/v1/slides - Viewable slides
//! - POST /api/v1/slides - Upload a slide (multipart: name, information, folder_id, is_public,
//!   file, plus optional properties, macro and label sidecars)
//! - GET/PUT/DELETE /api/v1/slides/{id}
//! - PUT /api/v1/slides/{id}/file - Replace the slide file and sidecars, regenerating its pyramid
//! - GET /api/v1/slides/{id}/annotations
//! - GET /api/v1/slides/{id}/thumbnail, /associated_image - PNG images
//! - GET /api/v1/slides/{id}/integrity, POST /api/v1/slides/{id}/repair

use axum::{
    extract::{Multipart, Path, State},
    http::{header, StatusCode},
    response::IntoResponse,
    routing::{get, post, put},
    Json, Router,
};

use crate::api::middleware::{ApiError, AppState, AuthenticatedUser};
use crate::models::{Annotation, CreateSlideInput, IntegrityStatus, Slide, SlideDetail, UpdateSlideInput};
use crate::slide::{AssociatedUpload, SlideUpload};

/// Build the slides router
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(list_slides).post(create_slide))
        .route(
            "/{id}",
            get(get_slide).put(update_slide).delete(delete_slide),
        )
        .route("/{id}/file", put(replace_file))
        .route("/{id}/annotations", get(slide_annotations))
        .route("/{id}/thumbnail", get(thumbnail))
        .route("/{id}/associated_image", get(associated_image))
        .route("/{id}/integrity", get(integrity))
        .route("/{id}/repair", post(repair))
}

/// Multipart parts stored as associated images
const ASSOCIATED_FIELDS: [&str; 2] = ["macro", "label"];

/// Slide fields plus the uploaded file and its sidecars
#[derive(Debug, Default)]
struct UploadForm {
    input: CreateSlideInput,
    file: Option<(String, Vec<u8>)>,
    properties: Option<String>,
    associated: Vec<AssociatedUpload>,
}

impl UploadForm {
    fn into_upload(self) -> Result<(CreateSlideInput, SlideUpload), ApiError> {
        let (file_name, data) = self
            .file
            .ok_or_else(|| ApiError::validation_error("No file provided"))?;
        let upload = SlideUpload {
            properties: self.properties,
            associated: self.associated,
            ..SlideUpload::new(file_name, data)
        };
        Ok((self.input, upload))
    }
}

async fn read_upload(mut multipart: Multipart) -> Result<UploadForm, ApiError> {
    let mut form = UploadForm::default();

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ApiError::validation_error(format!("Failed to read multipart: {}", e)))?
    {
        let name = field.name().unwrap_or("").to_string();
        if name == "file" || name == "properties" || ASSOCIATED_FIELDS.contains(&name.as_str()) {
            let file_name = field
                .file_name()
                .map(|s| s.to_string())
                .unwrap_or_else(|| "unknown".to_string());
            let data = field
                .bytes()
                .await
                .map_err(|e| ApiError::validation_error(format!("Failed to read '{}': {}", name, e)))?
                .to_vec();
            match name.as_str() {
                "file" => form.file = Some((file_name, data)),
                "properties" => {
                    let text = String::from_utf8(data).map_err(|_| {
                        ApiError::validation_error("Slide properties must be UTF-8 text")
                    })?;
                    form.properties = Some(text);
                }
                _ => form.associated.push(AssociatedUpload { name, data }),
            }
            continue;
        }

        let value = field
            .text()
            .await
            .map_err(|e| ApiError::validation_error(format!("Failed to read field '{}': {}", name, e)))?;
        match name.as_str() {
            "name" => form.input.name = value,
            "information" => form.input.information = value,
            "folder_id" | "folder" => {
                form.input.folder_id = if value.trim().is_empty() {
                    None
                } else {
                    Some(value.trim().parse().map_err(|_| {
                        ApiError::validation_error(format!("Invalid folder id: {}", value))
                    })?)
                };
            }
            "is_public" => {
                form.input.is_public = matches!(value.trim(), "true" | "1" | "on");
            }
            _ => {}
        }
    }

    Ok(form)
}

async fn list_slides(
    State(state): State<AppState>,
    AuthenticatedUser(user): AuthenticatedUser,
) -> Result<Json<Vec<Slide>>, ApiError> {
    Ok(Json(state.slide_service.list(&user).await?))
}

async fn get_slide(
    State(state): State<AppState>,
    AuthenticatedUser(user): AuthenticatedUser,
    Path(id): Path<i64>,
) -> Result<Json<SlideDetail>, ApiError> {
    Ok(Json(state.slide_service.detail(&user, id).await?))
}

/// POST /api/v1/slides - Upload and process a slide
async fn create_slide(
    State(state): State<AppState>,
    AuthenticatedUser(user): AuthenticatedUser,
    multipart: Multipart,
) -> Result<impl IntoResponse, ApiError> {
    let (input, upload) = read_upload(multipart).await?.into_upload()?;
    let slide = state.slide_service.create(&user, input, upload).await?;
    Ok((StatusCode::CREATED, Json(slide)))
}

async fn replace_file(
    State(state): State<AppState>,
    AuthenticatedUser(user): AuthenticatedUser,
    Path(id): Path<i64>,
    multipart: Multipart,
) -> Result<Json<Slide>, ApiError> {
    let (_, upload) = read_upload(multipart).await?.into_upload()?;
    Ok(Json(state.slide_service.replace_file(&user, id, upload).await?))
}

async fn update_slide(
    State(state): State<AppState>,
    AuthenticatedUser(user): AuthenticatedUser,
    Path(id): Path<i64>,
    Json(body): Json<UpdateSlideInput>,
) -> Result<Json<Slide>, ApiError> {
    Ok(Json(state.slide_service.update(&user, id, body).await?))
}

async fn delete_slide(
    State(state): State<AppState>,
    AuthenticatedUser(user): AuthenticatedUser,
    Path(id): Path<i64>,
) -> Result<StatusCode, ApiError> {
    state.slide_service.delete(&user, id).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn slide_annotations(
    State(state): State<AppState>,
    AuthenticatedUser(user): AuthenticatedUser,
    Path(id): Path<i64>,
) -> Result<Json<Vec<Annotation>>, ApiError> {
    Ok(Json(state.slide_service.annotations(&user, id).await?))
}

async fn thumbnail(
    State(state): State<AppState>,
    AuthenticatedUser(user): AuthenticatedUser,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, ApiError> {
    let bytes = state.slide_service.thumbnail(&user, id).await?;
    Ok(([(header::CONTENT_TYPE, "image/png")], bytes))
}

async fn associated_image(
    State(state): State<AppState>,
    AuthenticatedUser(user): AuthenticatedUser,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, ApiError> {
    let bytes = state.slide_service.associated_image(&user, id).await?;
    Ok(([(header::CONTENT_TYPE, "image/png")], bytes))
}

async fn integrity(
    State(state): State<AppState>,
    AuthenticatedUser(user): AuthenticatedUser,
    Path(id): Path<i64>,
) -> Result<Json<IntegrityStatus>, ApiError> {
    Ok(Json(state.slide_service.integrity(&user, id).await?))
}

async fn repair(
    State(state): State<AppState>,
    AuthenticatedUser(user): AuthenticatedUser,
    Path(id): Path<i64>,
) -> Result<Json<IntegrityStatus>, ApiError> {
    Ok(Json(state.slide_service.repair(&user, id).await?))
}
