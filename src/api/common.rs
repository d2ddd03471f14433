//! Common API utilities and shared types
//!
//! Conversions from service errors into `ApiError`, and query types used by
//! more than one router.

use serde::Deserialize;

use crate::api::middleware::ApiError;
use crate::services::{
    AnnotationServiceError, FolderServiceError, GroupServiceError, LectureFolderServiceError,
    LectureServiceError, SlideServiceError, TagServiceError, UserServiceError,
};

/// `?folder=ID` for the browse endpoints
#[derive(Debug, Default, Deserialize)]
pub struct FolderQuery {
    #[serde(default)]
    pub folder: Option<i64>,
}

// ============================================================================
// Service error conversions
// ============================================================================

impl From<FolderServiceError> for ApiError {
    fn from(e: FolderServiceError) -> Self {
        match e {
            FolderServiceError::NotFound(msg) => ApiError::not_found(msg),
            FolderServiceError::PermissionDenied(msg) => ApiError::forbidden(msg),
            FolderServiceError::ValidationError(msg) => ApiError::validation_error(msg),
            FolderServiceError::Conflict(msg) => ApiError::conflict(msg),
            FolderServiceError::InternalError(e) => ApiError::internal_error(format!("{:#}", e)),
        }
    }
}

impl From<LectureFolderServiceError> for ApiError {
    fn from(e: LectureFolderServiceError) -> Self {
        match e {
            LectureFolderServiceError::NotFound(msg) => ApiError::not_found(msg),
            LectureFolderServiceError::PermissionDenied(msg) => ApiError::forbidden(msg),
            LectureFolderServiceError::ValidationError(msg) => ApiError::validation_error(msg),
            LectureFolderServiceError::Conflict(msg) => ApiError::conflict(msg),
            LectureFolderServiceError::InternalError(e) => {
                ApiError::internal_error(format!("{:#}", e))
            }
        }
    }
}

impl From<SlideServiceError> for ApiError {
    fn from(e: SlideServiceError) -> Self {
        match e {
            SlideServiceError::NotFound(msg) => ApiError::not_found(msg),
            SlideServiceError::PermissionDenied(msg) => ApiError::forbidden(msg),
            SlideServiceError::ValidationError(msg) => ApiError::validation_error(msg),
            SlideServiceError::ProcessingError(msg) => ApiError::new("PROCESSING_ERROR", msg),
            SlideServiceError::InternalError(e) => ApiError::internal_error(format!("{:#}", e)),
        }
    }
}

impl From<TagServiceError> for ApiError {
    fn from(e: TagServiceError) -> Self {
        match e {
            TagServiceError::NotFound(msg) => ApiError::not_found(msg),
            TagServiceError::PermissionDenied(msg) => ApiError::forbidden(msg),
            TagServiceError::ValidationError(msg) => ApiError::validation_error(msg),
            TagServiceError::Conflict(msg) => ApiError::conflict(msg),
            TagServiceError::InternalError(e) => ApiError::internal_error(format!("{:#}", e)),
        }
    }
}

impl From<LectureServiceError> for ApiError {
    fn from(e: LectureServiceError) -> Self {
        match e {
            LectureServiceError::NotFound(msg) => ApiError::not_found(msg),
            LectureServiceError::PermissionDenied(msg) => ApiError::forbidden(msg),
            LectureServiceError::ValidationError(msg) => ApiError::validation_error(msg),
            LectureServiceError::FieldErrors(fields) => ApiError::with_details(
                "VALIDATION_ERROR",
                "Invalid lecture contents",
                serde_json::json!(fields),
            ),
            LectureServiceError::InternalError(e) => ApiError::internal_error(format!("{:#}", e)),
        }
    }
}

impl From<AnnotationServiceError> for ApiError {
    fn from(e: AnnotationServiceError) -> Self {
        match e {
            AnnotationServiceError::NotFound(msg) => ApiError::not_found(msg),
            AnnotationServiceError::PermissionDenied(msg) => ApiError::forbidden(msg),
            AnnotationServiceError::ValidationError(msg) => ApiError::validation_error(msg),
            AnnotationServiceError::Conflict(msg) => ApiError::conflict(msg),
            AnnotationServiceError::InternalError(e) => {
                ApiError::internal_error(format!("{:#}", e))
            }
        }
    }
}

impl From<GroupServiceError> for ApiError {
    fn from(e: GroupServiceError) -> Self {
        match e {
            GroupServiceError::NotFound(msg) => ApiError::not_found(msg),
            GroupServiceError::PermissionDenied(msg) => ApiError::forbidden(msg),
            GroupServiceError::ValidationError(msg) => ApiError::validation_error(msg),
            GroupServiceError::Conflict(msg) => ApiError::conflict(msg),
            GroupServiceError::InternalError(e) => ApiError::internal_error(format!("{:#}", e)),
        }
    }
}

impl From<UserServiceError> for ApiError {
    fn from(e: UserServiceError) -> Self {
        match e {
            UserServiceError::AuthenticationError(msg) => ApiError::unauthorized(msg),
            UserServiceError::ValidationError(msg) => ApiError::validation_error(msg),
            UserServiceError::UserExists(msg) => ApiError::conflict(msg),
            UserServiceError::RegistrationClosed => {
                ApiError::forbidden("Registration is closed")
            }
            UserServiceError::NotFound(msg) => ApiError::not_found(msg),
            UserServiceError::InternalError(e) => ApiError::internal_error(format!("{:#}", e)),
        }
    }
}
