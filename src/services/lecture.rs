//! Lecture service
//!
//! Lectures are ordered lists of slides (optionally pinned to an
//! annotation) shared with groups. Authors edit their own lectures; group
//! members see them while they are active.

use crate::db::repositories::{
    AnnotationRepository, FolderRepository, FolderScope, GroupRepository, LectureRepository,
    SlideRepository,
};
use crate::models::{
    permissions, ActivityToggle, BulletinEntry, ContentInput, CreateLectureInput, CurrentUser,
    Lecture, LectureContent, LectureDetail, UpdateLectureInput,
};
use crate::services::access::{join_path, AccessControl};
use anyhow::Context;
use serde::Serialize;
use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;

const EDIT_DENIED: &str = "You do not have permission to edit this lecture.";

/// Largest content position a lecture accepts
const MAX_CONTENT_ORDER: i64 = 32767;

#[derive(Debug, thiserror::Error)]
pub enum LectureServiceError {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Permission denied: {0}")]
    PermissionDenied(String),

    #[error("Validation error: {0}")]
    ValidationError(String),

    /// Per-field messages keyed like `contents[2].slide`
    #[error("Invalid lecture contents")]
    FieldErrors(BTreeMap<String, String>),

    #[error("Internal error: {0}")]
    InternalError(#[from] anyhow::Error),
}

/// A lecture opened for presentation
#[derive(Debug, Clone, Serialize)]
pub struct LectureView {
    pub lecture: Lecture,
    pub contents: Vec<LectureContent>,
    pub editable: bool,
}

pub struct LectureService {
    lectures: Arc<dyn LectureRepository>,
    folders: Arc<dyn FolderRepository>,
    slides: Arc<dyn SlideRepository>,
    annotations: Arc<dyn AnnotationRepository>,
    groups: Arc<dyn GroupRepository>,
    access: Arc<AccessControl>,
}

impl LectureService {
    pub fn new(
        lectures: Arc<dyn LectureRepository>,
        folders: Arc<dyn FolderRepository>,
        slides: Arc<dyn SlideRepository>,
        annotations: Arc<dyn AnnotationRepository>,
        groups: Arc<dyn GroupRepository>,
        access: Arc<AccessControl>,
    ) -> Self {
        Self {
            lectures,
            folders,
            slides,
            annotations,
            groups,
            access,
        }
    }

    pub async fn get(&self, id: i64) -> Result<Lecture, LectureServiceError> {
        self.lectures
            .get_by_id(id)
            .await
            .context("Failed to get lecture")?
            .ok_or_else(|| LectureServiceError::NotFound(format!("Lecture with ID {} not found", id)))
    }

    /// Lectures the user may open, including their own inactive ones
    pub async fn list(&self, user: &CurrentUser) -> Result<Vec<Lecture>, LectureServiceError> {
        require_view(user)?;
        Ok(self
            .access
            .viewable_lectures(user, true, FolderScope::Any)
            .await?)
    }

    pub async fn detail(&self, user: &CurrentUser, id: i64) -> Result<LectureDetail, LectureServiceError> {
        let lecture = self.get_viewable(user, id).await?;

        let folder_name = match lecture.folder_id {
            Some(folder_id) => Some(join_path(&self.access.lecture_folder_chain(folder_id).await?)),
            None => None,
        };
        let groups = self
            .lectures
            .groups_for_lecture(lecture.id)
            .await
            .context("Failed to load lecture groups")?;
        let contents = self
            .lectures
            .contents(lecture.id)
            .await
            .context("Failed to load lecture contents")?;

        Ok(LectureDetail::new(lecture, folder_name, groups, contents))
    }

    /// Contents in presentation order with the editable flag
    pub async fn view(&self, user: &CurrentUser, id: i64) -> Result<LectureView, LectureServiceError> {
        let lecture = self.get_viewable(user, id).await?;
        let contents = self
            .lectures
            .contents(lecture.id)
            .await
            .context("Failed to load lecture contents")?;
        let editable = self.access.can_edit_lecture(user, &lecture);
        Ok(LectureView {
            lecture,
            contents,
            editable,
        })
    }

    /// Slide ids referenced by the lecture, in order
    pub async fn slide_ids(&self, id: i64) -> Result<Vec<i64>, LectureServiceError> {
        Ok(self
            .lectures
            .contents(id)
            .await
            .context("Failed to load lecture contents")?
            .into_iter()
            .map(|c| c.slide_id)
            .collect())
    }

    pub async fn create(
        &self,
        user: &CurrentUser,
        input: CreateLectureInput,
    ) -> Result<Lecture, LectureServiceError> {
        if !user.has_perm(permissions::ADD_LECTURE) {
            return Err(LectureServiceError::PermissionDenied(
                "You do not have permission to add lectures.".to_string(),
            ));
        }
        let name = validate_name(&input.name)?;
        if let Some(folder_id) = input.folder_id {
            self.check_folder(user, folder_id).await?;
        }
        self.validate_groups(&input.group_ids).await?;
        self.validate_contents(user, &input.contents).await?;

        let mut lecture = Lecture::new(name, Some(user.id()), input.folder_id);
        lecture.description = input.description;
        lecture.is_active = input.is_active;
        let lecture = self
            .lectures
            .create(&lecture)
            .await
            .context("Failed to create lecture")?;

        self.lectures
            .set_groups(lecture.id, &input.group_ids)
            .await
            .context("Failed to set lecture groups")?;
        self.lectures
            .replace_contents(lecture.id, &input.contents)
            .await
            .context("Failed to save lecture contents")?;

        tracing::info!("Lecture '{}' created by {}", lecture.name, user.user.username);
        Ok(lecture)
    }

    /// Partial update; supplied contents replace every existing content
    pub async fn update(
        &self,
        user: &CurrentUser,
        id: i64,
        input: UpdateLectureInput,
    ) -> Result<Lecture, LectureServiceError> {
        if !user.has_perm(permissions::CHANGE_LECTURE) {
            return Err(LectureServiceError::PermissionDenied(
                "You do not have permission to edit lectures.".to_string(),
            ));
        }
        let mut lecture = self.get(id).await?;
        self.check_edit(user, &lecture)?;

        if let Some(name) = input.name {
            lecture.name = validate_name(&name)?;
        }
        if let Some(description) = input.description {
            lecture.description = description;
        }
        if let Some(folder_id) = input.folder_id {
            if let Some(folder_id) = folder_id {
                self.check_folder(user, folder_id).await?;
            }
            lecture.folder_id = folder_id;
        }
        if let Some(is_active) = input.is_active {
            lecture.is_active = is_active;
        }
        if let Some(group_ids) = &input.group_ids {
            self.validate_groups(group_ids).await?;
        }
        if let Some(contents) = &input.contents {
            self.validate_contents(user, contents).await?;
        }

        let lecture = self
            .lectures
            .update(&lecture)
            .await
            .context("Failed to update lecture")?;
        if let Some(group_ids) = &input.group_ids {
            self.lectures
                .set_groups(lecture.id, group_ids)
                .await
                .context("Failed to set lecture groups")?;
        }
        if let Some(contents) = &input.contents {
            self.lectures
                .replace_contents(lecture.id, contents)
                .await
                .context("Failed to save lecture contents")?;
        }

        tracing::info!("Lecture '{}' updated by {}", lecture.name, user.user.username);
        Ok(lecture)
    }

    pub async fn delete(&self, user: &CurrentUser, id: i64) -> Result<(), LectureServiceError> {
        if !user.has_perm(permissions::DELETE_LECTURE) {
            return Err(LectureServiceError::PermissionDenied(
                "You do not have permission to delete lectures.".to_string(),
            ));
        }
        let lecture = self.get(id).await?;
        self.check_edit(user, &lecture)?;

        self.lectures
            .delete(lecture.id)
            .await
            .context("Failed to delete lecture")?;

        tracing::info!("Lecture '{}' deleted by {}", lecture.name, user.user.username);
        Ok(())
    }

    pub async fn toggle_activity(&self, user: &CurrentUser, id: i64) -> Result<ActivityToggle, LectureServiceError> {
        let mut lecture = self.get_viewable(user, id).await?;
        if !user.has_perm(permissions::CHANGE_LECTURE) {
            return Err(LectureServiceError::PermissionDenied(
                "You do not have permission to edit lectures.".to_string(),
            ));
        }
        self.check_edit(user, &lecture)?;

        lecture.is_active = !lecture.is_active;
        let lecture = self
            .lectures
            .update(&lecture)
            .await
            .context("Failed to toggle lecture activity")?;

        tracing::info!("Lecture '{}' activity toggled by {}", lecture.name, user.user.username);
        Ok(ActivityToggle::from_lecture(&lecture))
    }

    /// Active lectures for the bulletin board, most recently updated first
    pub async fn bulletins(&self, user: &CurrentUser) -> Result<Vec<BulletinEntry>, LectureServiceError> {
        require_view(user)?;

        let mut lectures = if user.is_admin() {
            self.lectures
                .list_all(FolderScope::Any)
                .await
                .context("Failed to list lectures")?
                .into_iter()
                .filter(|l| l.is_active)
                .collect()
        } else {
            let mut lectures = self
                .access
                .viewable_lectures(user, false, FolderScope::Any)
                .await?;
            let seen: HashSet<i64> = lectures.iter().map(|l| l.id).collect();
            let own = self
                .access
                .editable_lectures(user, FolderScope::Any)
                .await?
                .into_iter()
                .filter(|l| l.is_active && !seen.contains(&l.id));
            lectures.extend(own);
            lectures
        };
        lectures.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));

        Ok(lectures
            .into_iter()
            .map(|lecture| BulletinEntry {
                is_editable: self.access.can_edit_lecture(user, &lecture),
                lecture,
            })
            .collect())
    }

    // ========================================================================
    // Private helper methods
    // ========================================================================

    async fn get_viewable(&self, user: &CurrentUser, id: i64) -> Result<Lecture, LectureServiceError> {
        require_view(user)?;
        let lecture = self.get(id).await?;
        if !self.access.can_view_lecture(user, &lecture).await? {
            return Err(LectureServiceError::PermissionDenied(
                "You do not have permission to view this lecture.".to_string(),
            ));
        }
        Ok(lecture)
    }

    fn check_edit(&self, user: &CurrentUser, lecture: &Lecture) -> Result<(), LectureServiceError> {
        if self.access.can_edit_lecture(user, lecture) {
            Ok(())
        } else {
            Err(LectureServiceError::PermissionDenied(EDIT_DENIED.to_string()))
        }
    }

    async fn check_folder(&self, user: &CurrentUser, folder_id: i64) -> Result<(), LectureServiceError> {
        if self
            .folders
            .get_by_id(folder_id)
            .await
            .context("Failed to get lecture folder")?
            .is_none()
        {
            return Err(LectureServiceError::NotFound(format!(
                "Lecture folder with ID {} not found",
                folder_id
            )));
        }
        if !self.access.can_edit_lecture_folder(user, folder_id).await? {
            return Err(LectureServiceError::PermissionDenied(
                "You don't have permission to edit this folder.".to_string(),
            ));
        }
        Ok(())
    }

    async fn validate_groups(&self, group_ids: &[i64]) -> Result<(), LectureServiceError> {
        for group_id in group_ids {
            if self
                .groups
                .get_by_id(*group_id)
                .await
                .context("Failed to get group")?
                .is_none()
            {
                return Err(LectureServiceError::ValidationError(format!(
                    "Group with ID {} does not exist",
                    group_id
                )));
            }
        }
        Ok(())
    }

    /// Every slide and annotation must exist and be viewable, an annotation
    /// must sit on its content's slide and orders must be distinct
    async fn validate_contents(
        &self,
        user: &CurrentUser,
        contents: &[ContentInput],
    ) -> Result<(), LectureServiceError> {
        let mut errors = BTreeMap::new();
        let mut positions = HashSet::new();

        for (index, content) in contents.iter().enumerate() {
            let position = content.position(index);
            if !(0..=MAX_CONTENT_ORDER).contains(&position) {
                errors.insert(
                    format!("contents[{}].order", index),
                    format!("Ensure this value is between 0 and {}.", MAX_CONTENT_ORDER),
                );
            } else if !positions.insert(position) {
                errors.insert(
                    format!("contents[{}].order", index),
                    "Order must be unique within the lecture.".to_string(),
                );
            }

            let slide_key = format!("contents[{}].slide", index);
            let slide = self
                .slides
                .get_by_id(content.slide_id)
                .await
                .context("Failed to get slide")?;
            match slide {
                None => {
                    errors.insert(slide_key, "Slide does not exist.".to_string());
                }
                Some(slide) => {
                    if !self.access.can_view_slide(user, &slide).await? {
                        errors.insert(
                            slide_key,
                            "You don't have permission to view this slide.".to_string(),
                        );
                    }
                }
            }

            let Some(annotation_id) = content.annotation_id else {
                continue;
            };
            let annotation_key = format!("contents[{}].annotation", index);
            let annotation = self
                .annotations
                .get_by_id(annotation_id)
                .await
                .context("Failed to get annotation")?;
            match annotation {
                None => {
                    errors.insert(annotation_key, "Annotation does not exist.".to_string());
                }
                Some(annotation) => {
                    if !self.access.can_view_annotation(user, &annotation).await? {
                        errors.insert(
                            annotation_key,
                            "You don't have permission to view this annotation.".to_string(),
                        );
                    } else if annotation.slide_id != content.slide_id {
                        errors.insert(
                            annotation_key,
                            "Annotation must be on the same slide with the selected slide"
                                .to_string(),
                        );
                    }
                }
            }
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(LectureServiceError::FieldErrors(errors))
        }
    }
}

fn require_view(user: &CurrentUser) -> Result<(), LectureServiceError> {
    if user.has_perm(permissions::VIEW_LECTURE) {
        Ok(())
    } else {
        Err(LectureServiceError::PermissionDenied(
            "You do not have permission to view lectures.".to_string(),
        ))
    }
}

fn validate_name(name: &str) -> Result<String, LectureServiceError> {
    let name = name.trim();
    if name.is_empty() {
        return Err(LectureServiceError::ValidationError(
            "Lecture name cannot be empty".to_string(),
        ));
    }
    if name.chars().count() > 100 {
        return Err(LectureServiceError::ValidationError(
            "Lecture name cannot exceed 100 characters".to_string(),
        ));
    }
    Ok(name.to_string())
}
