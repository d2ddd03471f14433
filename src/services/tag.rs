//! Tag service
//!
//! Implements business logic for slide tags:
//! - Tag listing with slide counts
//! - Creating and deleting tags
//! - Attaching tags to slides and listing the slides behind a tag

use crate::db::repositories::{SlideRepository, TagRepository};
use crate::models::{permissions, CurrentUser, Slide, Tag, TagWithCount};
use crate::services::access::AccessControl;
use anyhow::Context;
use std::sync::Arc;

/// Error types for tag service operations
#[derive(Debug, thiserror::Error)]
pub enum TagServiceError {
    /// Tag or slide not found
    #[error("Not found: {0}")]
    NotFound(String),

    /// The user lacks the permission or ownership required
    #[error("Permission denied: {0}")]
    PermissionDenied(String),

    /// Validation error
    #[error("Validation error: {0}")]
    ValidationError(String),

    /// A tag with the same name exists
    #[error("Conflict: {0}")]
    Conflict(String),

    /// Internal error
    #[error("Internal error: {0}")]
    InternalError(#[from] anyhow::Error),
}

/// Tag service for labelling slides
pub struct TagService {
    repo: Arc<dyn TagRepository>,
    slides: Arc<dyn SlideRepository>,
    access: Arc<AccessControl>,
}

impl TagService {
    /// Create a new tag service
    ///
    /// # Arguments
    /// * `repo` - Tag repository for database operations
    /// * `slides` - Slide repository used to resolve tagged slides
    /// * `access` - Ownership rules for the slides being tagged
    pub fn new(
        repo: Arc<dyn TagRepository>,
        slides: Arc<dyn SlideRepository>,
        access: Arc<AccessControl>,
    ) -> Self {
        Self {
            repo,
            slides,
            access,
        }
    }

    /// Every tag with the number of slides carrying it, ordered by name
    pub async fn list(&self, user: &CurrentUser) -> Result<Vec<TagWithCount>, TagServiceError> {
        require(user, permissions::VIEW_TAG, "You don't have permission to view tags.")?;
        Ok(self
            .repo
            .list_with_counts()
            .await
            .context("Failed to list tags")?)
    }

    /// Get a tag by ID
    pub async fn get(&self, id: i64) -> Result<Tag, TagServiceError> {
        self.repo
            .get_by_id(id)
            .await
            .context("Failed to get tag")?
            .ok_or_else(|| TagServiceError::NotFound(format!("Tag with ID {} not found", id)))
    }

    /// Create a new tag owned by `user`
    ///
    /// # Errors
    /// - `ValidationError` if the name is empty or longer than 100 characters
    /// - `Conflict` if a tag with the same name exists
    pub async fn create(&self, user: &CurrentUser, name: &str) -> Result<Tag, TagServiceError> {
        require(user, permissions::ADD_TAG, "You don't have permission to add tags.")?;

        let name = name.trim();
        if name.is_empty() {
            return Err(TagServiceError::ValidationError(
                "Tag name cannot be empty".to_string(),
            ));
        }
        if name.chars().count() > 100 {
            return Err(TagServiceError::ValidationError(
                "Tag name cannot exceed 100 characters".to_string(),
            ));
        }

        if self
            .repo
            .get_by_name(name)
            .await
            .context("Failed to check tag name")?
            .is_some()
        {
            return Err(TagServiceError::Conflict(format!(
                "Tag '{}' already exists",
                name
            )));
        }

        let tag = self
            .repo
            .create(&Tag::new(name.to_string(), user.id()))
            .await
            .context("Failed to create tag")?;

        tracing::info!("Tag '{}' created by {}", tag.name, user.user.username);
        Ok(tag)
    }

    /// Delete a tag. Only its creator or staff may do so.
    pub async fn delete(&self, user: &CurrentUser, id: i64) -> Result<(), TagServiceError> {
        require(user, permissions::DELETE_TAG, "You don't have permission to delete tags.")?;
        let tag = self.get(id).await?;

        if !user.is_admin() && tag.created_by != user.id() {
            return Err(TagServiceError::PermissionDenied(
                "You don't have permission to delete this tag.".to_string(),
            ));
        }

        self.repo
            .delete(tag.id)
            .await
            .context("Failed to delete tag")?;

        tracing::info!("Tag '{}' deleted by {}", tag.name, user.user.username);
        Ok(())
    }

    /// Attach a tag to a slide the user can edit; attaching twice is a no-op
    pub async fn attach(&self, user: &CurrentUser, tag_id: i64, slide_id: i64) -> Result<(), TagServiceError> {
        let (tag, slide) = self.editable_pair(user, tag_id, slide_id).await?;
        self.repo
            .attach(tag.id, slide.id)
            .await
            .context("Failed to attach tag")?;
        Ok(())
    }

    /// Remove a tag from a slide the user can edit
    pub async fn detach(&self, user: &CurrentUser, tag_id: i64, slide_id: i64) -> Result<(), TagServiceError> {
        let (tag, slide) = self.editable_pair(user, tag_id, slide_id).await?;
        self.repo
            .detach(tag.id, slide.id)
            .await
            .context("Failed to detach tag")?;
        Ok(())
    }

    /// Slides carrying the tag that the user may view
    pub async fn slides(&self, user: &CurrentUser, tag_id: i64) -> Result<Vec<Slide>, TagServiceError> {
        require(user, permissions::VIEW_SLIDE, "You don't have permission to view slides.")?;
        let tag = self.get(tag_id).await?;

        let ids = self
            .repo
            .slide_ids_for_tag(tag.id)
            .await
            .context("Failed to list tagged slides")?;
        let slides = self
            .slides
            .list_by_ids(&ids)
            .await
            .context("Failed to load tagged slides")?;

        let mut viewable = Vec::with_capacity(slides.len());
        for slide in slides {
            if self.access.can_view_slide(user, &slide).await? {
                viewable.push(slide);
            }
        }
        Ok(viewable)
    }

    async fn editable_pair(
        &self,
        user: &CurrentUser,
        tag_id: i64,
        slide_id: i64,
    ) -> Result<(Tag, Slide), TagServiceError> {
        require(user, permissions::CHANGE_SLIDE, "You don't have permission to change slides.")?;
        let tag = self.get(tag_id).await?;
        let slide = self
            .slides
            .get_by_id(slide_id)
            .await
            .context("Failed to get slide")?
            .ok_or_else(|| TagServiceError::NotFound(format!("Slide with ID {} not found", slide_id)))?;

        if !self.access.can_edit_slide(user, &slide).await? {
            return Err(TagServiceError::PermissionDenied(
                "You don't have permission to edit this slide.".to_string(),
            ));
        }
        Ok((tag, slide))
    }
}

fn require(user: &CurrentUser, codename: &str, message: &str) -> Result<(), TagServiceError> {
    if user.has_perm(codename) {
        Ok(())
    } else {
        Err(TagServiceError::PermissionDenied(message.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::test_support::Fixture;

    fn setup_test_service(fx: &Fixture) -> TagService {
        TagService::new(fx.tags.clone(), fx.slides.clone(), fx.access.clone())
    }

    #[tokio::test]
    async fn test_create_validates_and_rejects_duplicates() {
        let fx = Fixture::new().await;
        let service = setup_test_service(&fx);
        let admin = fx.admin().await;

        let tag = service.create(&admin, "  renal ").await.unwrap();
        assert_eq!(tag.name, "renal");
        assert_eq!(tag.created_by, admin.id());

        assert!(matches!(
            service.create(&admin, "renal").await,
            Err(TagServiceError::Conflict(_))
        ));
        assert!(matches!(
            service.create(&admin, "   ").await,
            Err(TagServiceError::ValidationError(_))
        ));
        assert!(matches!(
            service.create(&admin, &"x".repeat(101)).await,
            Err(TagServiceError::ValidationError(_))
        ));
    }

    #[tokio::test]
    async fn test_delete_by_creator_or_admin() {
        let fx = Fixture::new().await;
        let service = setup_test_service(&fx);
        let group = fx.publisher_group("Histo").await;
        let alice = fx.member("alice", &[group.id]).await;
        let bob = fx.member("bob", &[group.id]).await;

        let tag = service.create(&alice, "liver").await.unwrap();
        assert!(matches!(
            service.delete(&bob, tag.id).await,
            Err(TagServiceError::PermissionDenied(_))
        ));
        service.delete(&alice, tag.id).await.unwrap();

        let tag = service.create(&bob, "kidney").await.unwrap();
        service.delete(&fx.admin().await, tag.id).await.unwrap();
        assert!(service.list(&alice).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_attach_requires_slide_edit() {
        let fx = Fixture::new().await;
        let service = setup_test_service(&fx);
        let histo = fx.publisher_group("Histo").await;
        let cyto = fx.publisher_group("Cyto").await;
        let alice = fx.member("alice", &[histo.id]).await;
        let bob = fx.member("bob", &[cyto.id]).await;

        let private = fx.slide("private", histo.base_folder_id, false).await;
        let public = fx.slide("public", histo.base_folder_id, true).await;
        let tag = service.create(&alice, "liver").await.unwrap();

        service.attach(&alice, tag.id, private.id).await.unwrap();
        service.attach(&alice, tag.id, public.id).await.unwrap();
        assert!(matches!(
            service.detach(&bob, tag.id, public.id).await,
            Err(TagServiceError::PermissionDenied(_))
        ));

        let seen: Vec<_> = service
            .slides(&bob, tag.id)
            .await
            .unwrap()
            .into_iter()
            .map(|s| s.name)
            .collect();
        assert_eq!(seen, vec!["public".to_string()]);
        assert_eq!(service.slides(&alice, tag.id).await.unwrap().len(), 2);

        let counts = service.list(&alice).await.unwrap();
        assert_eq!(counts[0].slide_count, 2);

        service.detach(&alice, tag.id, private.id).await.unwrap();
        assert_eq!(service.list(&alice).await.unwrap()[0].slide_count, 1);
    }
}
