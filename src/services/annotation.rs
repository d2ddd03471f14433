//! Annotation service
//!
//! Viewer annotations: CRUD for the API, the viewer's save endpoint that
//! reports its outcome as a message, and the viewer page context.

use crate::db::repositories::{AnnotationRepository, SlideRepository};
use crate::models::{
    format_timestamp, permissions, Annotation, CreateAnnotationInput, CurrentUser,
    SaveAnnotationInput, SaveAnnotationOutcome, Slide, UpdateAnnotationInput,
};
use crate::services::access::AccessControl;
use anyhow::Context;
use serde::Serialize;
use std::sync::Arc;

const EDIT_DENIED: &str = "You don't have permission to edit this annotation.";
const SLIDE_DENIED: &str = "You don't have permission to view this slide.";

#[derive(Debug, thiserror::Error)]
pub enum AnnotationServiceError {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Permission denied: {0}")]
    PermissionDenied(String),

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Internal error: {0}")]
    InternalError(#[from] anyhow::Error),
}

/// Annotation with display fields
#[derive(Debug, Clone, Serialize)]
pub struct AnnotationDetail {
    #[serde(flatten)]
    pub annotation: Annotation,
    pub slide_name: String,
    pub created_at_formatted: String,
    pub updated_at_formatted: String,
}

/// What the slide viewer page needs
#[derive(Debug, Clone, Serialize)]
pub struct ViewerContext {
    pub slide: Slide,
    pub annotation: Option<Annotation>,
    pub editable: bool,
}

pub struct AnnotationService {
    annotations: Arc<dyn AnnotationRepository>,
    slides: Arc<dyn SlideRepository>,
    access: Arc<AccessControl>,
}

impl AnnotationService {
    pub fn new(
        annotations: Arc<dyn AnnotationRepository>,
        slides: Arc<dyn SlideRepository>,
        access: Arc<AccessControl>,
    ) -> Self {
        Self {
            annotations,
            slides,
            access,
        }
    }

    pub async fn get(&self, id: i64) -> Result<Annotation, AnnotationServiceError> {
        self.annotations
            .get_by_id(id)
            .await
            .context("Failed to get annotation")?
            .ok_or_else(|| {
                AnnotationServiceError::NotFound(format!("Annotation with ID {} not found", id))
            })
    }

    /// Annotations on every slide the user may view
    pub async fn list(&self, user: &CurrentUser) -> Result<Vec<Annotation>, AnnotationServiceError> {
        require(user, permissions::VIEW_ANNOTATION, "You don't have permission to view annotations.")?;

        let mut annotations = Vec::new();
        for slide in self.access.viewable_slides(user).await? {
            annotations.extend(
                self.annotations
                    .list_by_slide(slide.id)
                    .await
                    .context("Failed to list annotations")?,
            );
        }
        annotations.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        Ok(annotations)
    }

    pub async fn detail(&self, user: &CurrentUser, id: i64) -> Result<AnnotationDetail, AnnotationServiceError> {
        require(user, permissions::VIEW_ANNOTATION, "You don't have permission to view annotations.")?;
        let annotation = self.get(id).await?;
        if !self.access.can_view_annotation(user, &annotation).await? {
            return Err(AnnotationServiceError::PermissionDenied(
                "You don't have permission to view this annotation.".to_string(),
            ));
        }

        let slide_name = self
            .slides
            .get_by_id(annotation.slide_id)
            .await
            .context("Failed to get annotated slide")?
            .map_or_else(|| "-".to_string(), |s| s.name);

        Ok(AnnotationDetail {
            slide_name,
            created_at_formatted: format_timestamp(&annotation.created_at),
            updated_at_formatted: format_timestamp(&annotation.updated_at),
            annotation,
        })
    }

    pub async fn create(
        &self,
        user: &CurrentUser,
        input: CreateAnnotationInput,
    ) -> Result<Annotation, AnnotationServiceError> {
        require(user, permissions::ADD_ANNOTATION, "You don't have permission to add annotations.")?;
        let name = validate_name(&input.name)?;
        let slide = self.viewable_slide(user, input.slide_id).await?;
        self.check_unique(&name, user.id(), slide.id, None).await?;

        let mut annotation = Annotation::new(name, user.id(), slide.id, input.data);
        annotation.description = input.description;
        let annotation = self
            .annotations
            .create(&annotation)
            .await
            .context("Failed to create annotation")?;

        tracing::info!("Annotation '{}' created by {}", annotation.name, user.user.username);
        Ok(annotation)
    }

    pub async fn update(
        &self,
        user: &CurrentUser,
        id: i64,
        input: UpdateAnnotationInput,
    ) -> Result<Annotation, AnnotationServiceError> {
        require(user, permissions::CHANGE_ANNOTATION, "You don't have permission to change annotations.")?;
        let mut annotation = self.get(id).await?;
        self.check_edit(user, &annotation)?;

        if let Some(name) = input.name {
            annotation.name = validate_name(&name)?;
            self.check_unique(
                &annotation.name,
                annotation.author_id,
                annotation.slide_id,
                Some(annotation.id),
            )
            .await?;
        }
        if let Some(description) = input.description {
            annotation.description = description;
        }
        if let Some(data) = input.data {
            annotation.data = data;
        }

        let annotation = self
            .annotations
            .update(&annotation)
            .await
            .context("Failed to update annotation")?;

        tracing::info!("Annotation '{}' updated by {}", annotation.name, user.user.username);
        Ok(annotation)
    }

    pub async fn delete(&self, user: &CurrentUser, id: i64) -> Result<(), AnnotationServiceError> {
        require(user, permissions::DELETE_ANNOTATION, "You don't have permission to delete annotations.")?;
        let annotation = self.get(id).await?;
        self.check_edit(user, &annotation)?;

        self.annotations
            .delete(annotation.id)
            .await
            .context("Failed to delete annotation")?;

        tracing::info!("Annotation '{}' deleted by {}", annotation.name, user.user.username);
        Ok(())
    }

    /// Save from the viewer: update when `annotation_id` is given, create
    /// otherwise. Refusals come back as an unsuccessful outcome.
    pub async fn save(
        &self,
        user: &CurrentUser,
        slide_id: i64,
        input: SaveAnnotationInput,
    ) -> Result<SaveAnnotationOutcome, AnnotationServiceError> {
        let slide = self.viewable_slide(user, slide_id).await?;
        let name = validate_name(&input.name)?;

        let Some(annotation_id) = input.annotation_id else {
            self.check_unique(&name, user.id(), slide.id, None).await?;
            let mut annotation = Annotation::new(name, user.id(), slide.id, input.data);
            annotation.description = input.description;
            let annotation = self
                .annotations
                .create(&annotation)
                .await
                .context("Failed to create annotation")?;
            tracing::info!("Annotation '{}' created by {}", annotation.name, user.user.username);
            return Ok(outcome(
                true,
                format!("Annotation \"{}\" created successfully.", annotation.name),
                Some(annotation.id),
            ));
        };

        let Some(mut annotation) = self
            .annotations
            .get_by_id(annotation_id)
            .await
            .context("Failed to get annotation")?
        else {
            return Ok(outcome(false, "Annotation not found.".to_string(), None));
        };
        if !self.access.can_edit_annotation(user, &annotation) {
            return Ok(outcome(
                false,
                "You are not allowed to edit this annotation.".to_string(),
                Some(annotation.id),
            ));
        }

        self.check_unique(&name, annotation.author_id, annotation.slide_id, Some(annotation.id))
            .await?;
        annotation.name = name;
        annotation.description = input.description;
        annotation.data = input.data;
        let annotation = self
            .annotations
            .update(&annotation)
            .await
            .context("Failed to update annotation")?;

        tracing::info!("Annotation '{}' updated by {}", annotation.name, user.user.username);
        Ok(outcome(
            true,
            format!("Annotation \"{}\" updated successfully.", annotation.name),
            Some(annotation.id),
        ))
    }

    /// Slide viewer context; the annotation is dropped unless it belongs to
    /// the slide
    pub async fn viewer_context(
        &self,
        user: &CurrentUser,
        slide_id: i64,
        annotation_id: Option<i64>,
    ) -> Result<ViewerContext, AnnotationServiceError> {
        let slide = self.viewable_slide(user, slide_id).await?;

        let annotation = match annotation_id {
            Some(id) => self
                .annotations
                .get_by_id(id)
                .await
                .context("Failed to get annotation")?
                .filter(|a| a.slide_id == slide.id),
            None => None,
        };
        let editable = self.access.can_edit_slide(user, &slide).await?;

        tracing::debug!(
            "Viewer opened for slide {} with annotation {:?}",
            slide.id,
            annotation.as_ref().map(|a| a.id)
        );
        Ok(ViewerContext {
            slide,
            annotation,
            editable,
        })
    }

    // ========================================================================
    // Private helper methods
    // ========================================================================

    async fn viewable_slide(&self, user: &CurrentUser, slide_id: i64) -> Result<Slide, AnnotationServiceError> {
        require(user, permissions::VIEW_SLIDE, "You don't have permission to view slides.")?;
        let slide = self
            .slides
            .get_by_id(slide_id)
            .await
            .context("Failed to get slide")?
            .ok_or_else(|| AnnotationServiceError::NotFound(format!("Slide with ID {} not found", slide_id)))?;
        if !self.access.can_view_slide(user, &slide).await? {
            return Err(AnnotationServiceError::PermissionDenied(SLIDE_DENIED.to_string()));
        }
        Ok(slide)
    }

    fn check_edit(&self, user: &CurrentUser, annotation: &Annotation) -> Result<(), AnnotationServiceError> {
        if self.access.can_edit_annotation(user, annotation) {
            Ok(())
        } else {
            Err(AnnotationServiceError::PermissionDenied(EDIT_DENIED.to_string()))
        }
    }

    async fn check_unique(
        &self,
        name: &str,
        author_id: i64,
        slide_id: i64,
        exclude_id: Option<i64>,
    ) -> Result<(), AnnotationServiceError> {
        if self
            .annotations
            .exists(name, author_id, slide_id, exclude_id)
            .await
            .context("Failed to check annotation name")?
        {
            return Err(AnnotationServiceError::Conflict(format!(
                "Annotation '{}' already exists on this slide",
                name
            )));
        }
        Ok(())
    }
}

fn outcome(success: bool, message: String, annotation_id: Option<i64>) -> SaveAnnotationOutcome {
    SaveAnnotationOutcome {
        success,
        message,
        annotation_id,
    }
}

fn require(user: &CurrentUser, codename: &str, message: &str) -> Result<(), AnnotationServiceError> {
    if user.has_perm(codename) {
        Ok(())
    } else {
        Err(AnnotationServiceError::PermissionDenied(message.to_string()))
    }
}

fn validate_name(name: &str) -> Result<String, AnnotationServiceError> {
    let name = name.trim();
    if name.is_empty() {
        return Err(AnnotationServiceError::ValidationError(
            "Annotation name cannot be empty".to_string(),
        ));
    }
    if name.chars().count() > 100 {
        return Err(AnnotationServiceError::ValidationError(
            "Annotation name cannot exceed 100 characters".to_string(),
        ));
    }
    Ok(name.to_string())
}
