//! Folder service
//!
//! Slide folders: the cached folder tree, folder CRUD with ownership checks
//! and the database browser listing.

use crate::cache::{Cache, CacheLayer};
use crate::db::repositories::{FolderRepository, SlideRepository};
use crate::models::{
    permissions, sort_items, Breadcrumb, BrowseItem, BrowseResult, CreateFolderInput,
    CurrentUser, Folder, FolderDetail, FolderTree, Slide, UpdateFolderInput,
};
use crate::services::access::AccessControl;
use anyhow::Context;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;

/// Every folder cache key
pub const CACHE_PATTERN_FOLDERS: &str = "folders:*";
const CACHE_KEY_FOLDER_TREE: &str = "folders:tree";
const FOLDER_CACHE_TTL_SECS: u64 = 3600;

const EDIT_DENIED: &str = "You don't have permission to edit this folder.";

#[derive(Debug, thiserror::Error)]
pub enum FolderServiceError {
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

/// Direct contents of a folder
#[derive(Debug, Clone, Serialize)]
pub struct FolderItems {
    pub subfolders: Vec<Folder>,
    pub slides: Vec<Slide>,
}

pub struct FolderService {
    folders: Arc<dyn FolderRepository>,
    slides: Arc<dyn SlideRepository>,
    access: Arc<AccessControl>,
    cache: Arc<Cache>,
    cache_ttl: Duration,
}

impl FolderService {
    pub fn new(
        folders: Arc<dyn FolderRepository>,
        slides: Arc<dyn SlideRepository>,
        access: Arc<AccessControl>,
        cache: Arc<Cache>,
    ) -> Self {
        Self {
            folders,
            slides,
            access,
            cache,
            cache_ttl: Duration::from_secs(FOLDER_CACHE_TTL_SECS),
        }
    }

    /// Nested tree of every base folder; staff get it wrapped in a `Root`
    /// node
    pub async fn tree(&self, user: &CurrentUser) -> Result<Vec<FolderTree>, FolderServiceError> {
        require(user, &[permissions::VIEW_FOLDER], "You don't have permission to view folders.")?;

        let tree = match self
            .cache
            .get::<Vec<FolderTree>>(CACHE_KEY_FOLDER_TREE)
            .await
            .ok()
            .flatten()
        {
            Some(tree) => tree,
            None => {
                let tree = self
                    .folders
                    .tree(None)
                    .await
                    .context("Failed to build folder tree")?;
                let _ = self.cache.set(CACHE_KEY_FOLDER_TREE, &tree, self.cache_ttl).await;
                tree
            }
        };

        if user.is_admin() {
            Ok(vec![FolderTree::root(tree)])
        } else {
            Ok(tree)
        }
    }

    pub async fn list(&self, user: &CurrentUser) -> Result<Vec<Folder>, FolderServiceError> {
        require(user, &[permissions::VIEW_FOLDER], "You don't have permission to view folders.")?;
        Ok(self.folders.list().await.context("Failed to list folders")?)
    }

    pub async fn get(&self, id: i64) -> Result<Folder, FolderServiceError> {
        self.folders
            .get_by_id(id)
            .await
            .context("Failed to get folder")?
            .ok_or_else(|| FolderServiceError::NotFound(format!("Folder with ID {} not found", id)))
    }

    pub async fn detail(&self, user: &CurrentUser, id: i64) -> Result<FolderDetail, FolderServiceError> {
        require(user, &[permissions::VIEW_FOLDER], "You don't have permission to view folders.")?;
        let folder = self.get(id).await?;

        let parent_path = match folder.parent_id {
            Some(parent_id) => Some(self.access.folder_full_path(parent_id).await?),
            None => None,
        };
        let subfolders = self
            .folders
            .count_children(folder.id)
            .await
            .context("Failed to count subfolders")?;
        let slides = self
            .slides
            .count_in_folders(&[folder.id])
            .await
            .context("Failed to count slides")?;

        Ok(FolderDetail::new(folder, parent_path, subfolders, slides))
    }

    /// Subfolders plus the slides the user may see in the folder
    pub async fn items(&self, user: &CurrentUser, id: i64) -> Result<FolderItems, FolderServiceError> {
        require(
            user,
            &[permissions::VIEW_FOLDER, permissions::VIEW_SLIDE],
            "You don't have permission to view folder items.",
        )?;
        let folder = self.get(id).await?;

        Ok(FolderItems {
            subfolders: self
                .folders
                .children(Some(folder.id))
                .await
                .context("Failed to list subfolders")?,
            slides: self
                .access
                .viewable_slides_by_folder(user, Some(folder.id))
                .await?,
        })
    }

    pub async fn create(
        &self,
        user: &CurrentUser,
        input: CreateFolderInput,
    ) -> Result<Folder, FolderServiceError> {
        require(user, &[permissions::ADD_FOLDER], "You don't have permission to add folders.")?;
        let name = validate_name(&input.name)?;
        self.check_parent(user, input.parent_id).await?;
        self.check_unique(&name, input.parent_id, None).await?;

        let folder = self
            .folders
            .create(&Folder::new(name, input.parent_id, Some(user.id())))
            .await
            .context("Failed to create folder")?;
        self.invalidate_cache().await;

        tracing::info!("Folder '{}' created by {}", folder.name, user.user.username);
        Ok(folder)
    }

    /// Rename or move a folder, then re-check lecture contents of the
    /// slides directly inside it
    pub async fn update(
        &self,
        user: &CurrentUser,
        id: i64,
        input: UpdateFolderInput,
    ) -> Result<Folder, FolderServiceError> {
        require(user, &[permissions::CHANGE_FOLDER], "You don't have permission to change folders.")?;
        let mut folder = self.get(id).await?;
        self.check_edit(user, folder.id).await?;

        if let Some(name) = input.name {
            folder.name = validate_name(&name)?;
        }
        if let Some(parent_id) = input.parent_id {
            if parent_id != folder.parent_id {
                if let Some(new_parent) = parent_id {
                    if new_parent == folder.id
                        || self.access.folder_is_ancestor(folder.id, new_parent).await?
                    {
                        return Err(FolderServiceError::ValidationError(
                            "Cannot move a folder into itself or one of its subfolders."
                                .to_string(),
                        ));
                    }
                }
                self.check_parent(user, parent_id).await?;
                folder.parent_id = parent_id;
            }
        }
        self.check_unique(&folder.name, folder.parent_id, Some(folder.id))
            .await?;

        let updated = self
            .folders
            .update(&folder)
            .await
            .context("Failed to update folder")?;
        self.invalidate_cache().await;

        let slides = self
            .slides
            .list_by_folder(Some(updated.id), false)
            .await
            .context("Failed to list folder slides")?;
        for slide in &slides {
            self.access.update_lectures(slide).await?;
        }

        tracing::info!("Folder '{}' updated by {}", updated.name, user.user.username);
        Ok(updated)
    }

    pub async fn delete(&self, user: &CurrentUser, id: i64) -> Result<(), FolderServiceError> {
        require(user, &[permissions::DELETE_FOLDER], "You don't have permission to delete folders.")?;
        let folder = self.get(id).await?;
        self.check_edit(user, folder.id).await?;

        if !self.access.folder_is_empty(folder.id).await? {
            return Err(FolderServiceError::PermissionDenied(
                "Folder is not empty. Cannot delete.".to_string(),
            ));
        }

        self.folders
            .delete(folder.id)
            .await
            .context("Failed to delete folder")?;
        self.invalidate_cache().await;

        tracing::info!("Folder '{}' deleted by {}", folder.name, user.user.username);
        Ok(())
    }

    /// Database browser: subfolders and visible slides of `folder_id` (the
    /// base folders and root slides when `None`)
    pub async fn browse(
        &self,
        user: &CurrentUser,
        folder_id: Option<i64>,
    ) -> Result<BrowseResult, FolderServiceError> {
        require(
            user,
            &[permissions::VIEW_FOLDER, permissions::VIEW_SLIDE],
            "You don't have permission to view the database.",
        )?;

        let current = match folder_id {
            Some(id) => Some(self.get(id).await?),
            None => None,
        };

        let subfolders = self
            .folders
            .children(folder_id)
            .await
            .context("Failed to list subfolders")?;
        let slides = self.access.viewable_slides_by_folder(user, folder_id).await?;

        let mut items: Vec<BrowseItem> = subfolders.iter().map(BrowseItem::from).collect();
        items.extend(slides.iter().map(BrowseItem::from));
        sort_items(&mut items);

        let mut breadcrumbs = vec![Breadcrumb::root()];
        let editable = match &current {
            Some(folder) => {
                let chain = self.access.folder_chain(folder.id).await?;
                breadcrumbs.extend(chain.iter().map(Breadcrumb::from));
                self.access.can_edit_folder(user, folder.id).await?
            }
            None => user.is_admin(),
        };

        Ok(BrowseResult {
            current_folder: current,
            items,
            breadcrumbs,
            editable,
        })
    }

    // ========================================================================
    // Private helper methods
    // ========================================================================

    async fn check_edit(&self, user: &CurrentUser, folder_id: i64) -> Result<(), FolderServiceError> {
        if self.access.can_edit_folder(user, folder_id).await? {
            Ok(())
        } else {
            Err(FolderServiceError::PermissionDenied(EDIT_DENIED.to_string()))
        }
    }

    /// A parent must exist and be editable; the root needs staff
    async fn check_parent(
        &self,
        user: &CurrentUser,
        parent_id: Option<i64>,
    ) -> Result<(), FolderServiceError> {
        match parent_id {
            Some(parent_id) => {
                let parent = self.get(parent_id).await?;
                self.check_edit(user, parent.id).await
            }
            None if user.is_admin() => Ok(()),
            None => Err(FolderServiceError::PermissionDenied(
                "Only administrators can create base folders.".to_string(),
            )),
        }
    }

    async fn check_unique(
        &self,
        name: &str,
        parent_id: Option<i64>,
        exclude_id: Option<i64>,
    ) -> Result<(), FolderServiceError> {
        if self
            .folders
            .exists_by_name(name, parent_id, exclude_id)
            .await
            .context("Failed to check folder name")?
        {
            return Err(FolderServiceError::Conflict(format!(
                "Folder '{}' already exists here",
                name
            )));
        }
        Ok(())
    }

    async fn invalidate_cache(&self) {
        if let Err(e) = self.cache.delete_pattern(CACHE_PATTERN_FOLDERS).await {
            tracing::warn!("Failed to invalidate folder cache: {}", e);
        }
    }
}

fn require(user: &CurrentUser, codenames: &[&str], message: &str) -> Result<(), FolderServiceError> {
    if user.has_perms(codenames) {
        Ok(())
    } else {
        Err(FolderServiceError::PermissionDenied(message.to_string()))
    }
}

fn validate_name(name: &str) -> Result<String, FolderServiceError> {
    let name = name.trim();
    if name.is_empty() {
        return Err(FolderServiceError::ValidationError(
            "Folder name cannot be empty".to_string(),
        ));
    }
    if name.chars().count() > 100 {
        return Err(FolderServiceError::ValidationError(
            "Folder name cannot exceed 100 characters".to_string(),
        ));
    }
    Ok(name.to_string())
}
