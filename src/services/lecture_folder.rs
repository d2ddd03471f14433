//! Lecture folder service
//!
//! Lecture folders belong to users rather than groups: a folder is editable
//! by the user whose base lecture folder is its root.

use crate::cache::{Cache, CacheLayer};
use crate::db::repositories::{FolderRepository, FolderScope, LectureRepository};
use crate::models::{
    permissions, sort_items, Breadcrumb, BrowseItem, BrowseResult, CreateFolderInput,
    CurrentUser, Folder, FolderTree, LectureFolderDetail, UpdateFolderInput,
};
use crate::services::access::{join_path, AccessControl};
use anyhow::Context;
use std::sync::Arc;
use std::time::Duration;

/// Every lecture folder cache key
pub const CACHE_PATTERN_LECTURE_FOLDERS: &str = "lecture_folders:*";
const LECTURE_FOLDER_CACHE_TTL_SECS: u64 = 3600;

const EDIT_DENIED: &str = "You do not have permission to edit this folder.";
const PARENT_DENIED: &str = "You don't have permission to edit this folder.";

#[derive(Debug, thiserror::Error)]
pub enum LectureFolderServiceError {
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

pub struct LectureFolderService {
    folders: Arc<dyn FolderRepository>,
    lectures: Arc<dyn LectureRepository>,
    access: Arc<AccessControl>,
    cache: Arc<Cache>,
    cache_ttl: Duration,
}

impl LectureFolderService {
    pub fn new(
        folders: Arc<dyn FolderRepository>,
        lectures: Arc<dyn LectureRepository>,
        access: Arc<AccessControl>,
        cache: Arc<Cache>,
    ) -> Self {
        Self {
            folders,
            lectures,
            access,
            cache,
            cache_ttl: Duration::from_secs(LECTURE_FOLDER_CACHE_TTL_SECS),
        }
    }

    /// Staff see every tree, other users only their own base folder's
    pub async fn tree(&self, user: &CurrentUser) -> Result<Vec<FolderTree>, LectureFolderServiceError> {
        if !user.has_perm(permissions::VIEW_LECTUREFOLDER) {
            return Err(LectureFolderServiceError::PermissionDenied(
                "You do not have permission to view folders.".to_string(),
            ));
        }

        let root = if user.is_admin() {
            None
        } else {
            match user.user.base_lecture_folder_id {
                Some(id) => Some(id),
                None => return Ok(Vec::new()),
            }
        };
        let cache_key = match root {
            Some(id) => format!("lecture_folders:tree:{}", id),
            None => "lecture_folders:tree:all".to_string(),
        };

        if let Some(tree) = self
            .cache
            .get::<Vec<FolderTree>>(&cache_key)
            .await
            .ok()
            .flatten()
        {
            return Ok(tree);
        }

        let tree = self
            .folders
            .tree(root)
            .await
            .context("Failed to build lecture folder tree")?;
        let _ = self.cache.set(&cache_key, &tree, self.cache_ttl).await;
        Ok(tree)
    }

    /// Every folder for staff, otherwise the user's base lecture folder tree
    pub async fn list(&self, user: &CurrentUser) -> Result<Vec<Folder>, LectureFolderServiceError> {
        let all = self
            .folders
            .list()
            .await
            .context("Failed to list lecture folders")?;
        if user.is_admin() {
            return Ok(all);
        }

        let owned = match user.user.base_lecture_folder_id {
            Some(base) => self
                .folders
                .descendants(base)
                .await
                .context("Failed to load lecture folder tree")?,
            None => Vec::new(),
        };
        Ok(all.into_iter().filter(|f| owned.contains(&f.id)).collect())
    }

    pub async fn get(&self, id: i64) -> Result<Folder, LectureFolderServiceError> {
        self.folders
            .get_by_id(id)
            .await
            .context("Failed to get lecture folder")?
            .ok_or_else(|| {
                LectureFolderServiceError::NotFound(format!("Lecture folder with ID {} not found", id))
            })
    }

    pub async fn detail(&self, id: i64) -> Result<LectureFolderDetail, LectureFolderServiceError> {
        let folder = self.get(id).await?;

        let parent_name = match folder.parent_id {
            Some(parent_id) => Some(join_path(&self.access.lecture_folder_chain(parent_id).await?)),
            None => None,
        };
        let subfolders = self
            .folders
            .count_children(folder.id)
            .await
            .context("Failed to count subfolders")?;
        let lectures = self
            .lectures
            .count_in_folders(&[folder.id])
            .await
            .context("Failed to count lectures")?;

        Ok(LectureFolderDetail::new(folder, parent_name, subfolders, lectures))
    }

    pub async fn create(
        &self,
        user: &CurrentUser,
        input: CreateFolderInput,
    ) -> Result<Folder, LectureFolderServiceError> {
        require(user, permissions::ADD_LECTUREFOLDER)?;
        let name = validate_name(&input.name)?;
        self.check_parent(user, input.parent_id).await?;
        self.check_unique(&name, input.parent_id, None).await?;

        let folder = self
            .folders
            .create(&Folder::new(name, input.parent_id, Some(user.id())))
            .await
            .context("Failed to create lecture folder")?;
        self.invalidate_cache().await;

        tracing::info!("Lecture folder '{}' created by {}", folder.name, user.user.username);
        Ok(folder)
    }

    pub async fn update(
        &self,
        user: &CurrentUser,
        id: i64,
        input: UpdateFolderInput,
    ) -> Result<Folder, LectureFolderServiceError> {
        require(user, permissions::CHANGE_LECTUREFOLDER)?;
        let mut folder = self.get(id).await?;
        self.check_edit(user, folder.id).await?;

        if let Some(name) = input.name {
            folder.name = validate_name(&name)?;
        }
        if let Some(parent_id) = input.parent_id {
            if parent_id != folder.parent_id {
                if let Some(new_parent) = parent_id {
                    if new_parent == folder.id
                        || self
                            .access
                            .lecture_folder_is_ancestor(folder.id, new_parent)
                            .await?
                    {
                        return Err(LectureFolderServiceError::ValidationError(
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
            .context("Failed to update lecture folder")?;
        self.invalidate_cache().await;

        tracing::info!("Lecture folder '{}' updated by {}", updated.name, user.user.username);
        Ok(updated)
    }

    pub async fn delete(&self, user: &CurrentUser, id: i64) -> Result<(), LectureFolderServiceError> {
        require(user, permissions::DELETE_LECTUREFOLDER)?;
        let folder = self.get(id).await?;
        self.check_edit(user, folder.id).await?;

        if !self.access.lecture_folder_is_empty(folder.id).await? {
            return Err(LectureFolderServiceError::PermissionDenied(
                "Folder is not empty. Cannot delete.".to_string(),
            ));
        }

        self.folders
            .delete(folder.id)
            .await
            .context("Failed to delete lecture folder")?;
        self.invalidate_cache().await;

        tracing::info!("Lecture folder '{}' deleted by {}", folder.name, user.user.username);
        Ok(())
    }

    /// Lecture database listing. Users other than staff start at their base
    /// lecture folder and may only open folders they can edit.
    pub async fn browse(
        &self,
        user: &CurrentUser,
        folder_id: Option<i64>,
    ) -> Result<BrowseResult, LectureFolderServiceError> {
        if !user.has_perms(&[permissions::VIEW_LECTUREFOLDER, permissions::VIEW_LECTURE]) {
            return Err(LectureFolderServiceError::PermissionDenied(
                "You do not have permission to view lectures.".to_string(),
            ));
        }

        let folder_id = match folder_id {
            Some(id) => Some(id),
            None if user.is_admin() => None,
            None => match user.user.base_lecture_folder_id {
                Some(base) => Some(base),
                None => {
                    return Err(LectureFolderServiceError::PermissionDenied(
                        "You do not have a lecture folder.".to_string(),
                    ))
                }
            },
        };

        let current = match folder_id {
            Some(id) => {
                let folder = self.get(id).await?;
                self.check_edit(user, folder.id).await?;
                Some(folder)
            }
            None => None,
        };

        let subfolders = self
            .folders
            .children(folder_id)
            .await
            .context("Failed to list lecture subfolders")?;
        let lectures = self
            .access
            .viewable_lectures(user, true, FolderScope::In(folder_id))
            .await?;

        let mut items: Vec<BrowseItem> = subfolders.iter().map(BrowseItem::from).collect();
        items.extend(lectures.iter().map(|lecture| {
            BrowseItem::from(lecture).with_editable(self.access.can_edit_lecture(user, lecture))
        }));
        sort_items(&mut items);

        let mut breadcrumbs = Vec::new();
        if user.is_admin() {
            breadcrumbs.push(Breadcrumb::root());
        }
        if let Some(folder) = &current {
            let chain = self.access.lecture_folder_chain(folder.id).await?;
            breadcrumbs.extend(chain.iter().map(Breadcrumb::from));
        }

        Ok(BrowseResult {
            current_folder: current,
            items,
            breadcrumbs,
            editable: true,
        })
    }

    // ========================================================================
    // Private helper methods
    // ========================================================================

    async fn check_edit(&self, user: &CurrentUser, folder_id: i64) -> Result<(), LectureFolderServiceError> {
        if self.access.can_edit_lecture_folder(user, folder_id).await? {
            Ok(())
        } else {
            Err(LectureFolderServiceError::PermissionDenied(EDIT_DENIED.to_string()))
        }
    }

    async fn check_parent(
        &self,
        user: &CurrentUser,
        parent_id: Option<i64>,
    ) -> Result<(), LectureFolderServiceError> {
        match parent_id {
            Some(parent_id) => {
                let parent = self.get(parent_id).await?;
                if self.access.can_edit_lecture_folder(user, parent.id).await? {
                    Ok(())
                } else {
                    Err(LectureFolderServiceError::PermissionDenied(PARENT_DENIED.to_string()))
                }
            }
            None if user.is_admin() => Ok(()),
            None => Err(LectureFolderServiceError::PermissionDenied(
                "Only administrators can create base folders.".to_string(),
            )),
        }
    }

    async fn check_unique(
        &self,
        name: &str,
        parent_id: Option<i64>,
        exclude_id: Option<i64>,
    ) -> Result<(), LectureFolderServiceError> {
        if self
            .folders
            .exists_by_name(name, parent_id, exclude_id)
            .await
            .context("Failed to check lecture folder name")?
        {
            return Err(LectureFolderServiceError::Conflict(format!(
                "Folder '{}' already exists here",
                name
            )));
        }
        Ok(())
    }

    async fn invalidate_cache(&self) {
        if let Err(e) = self.cache.delete_pattern(CACHE_PATTERN_LECTURE_FOLDERS).await {
            tracing::warn!("Failed to invalidate lecture folder cache: {}", e);
        }
    }
}

fn require(user: &CurrentUser, codename: &str) -> Result<(), LectureFolderServiceError> {
    if user.has_perm(codename) {
        Ok(())
    } else {
        Err(LectureFolderServiceError::PermissionDenied(
            "You do not have permission to perform this action.".to_string(),
        ))
    }
}

fn validate_name(name: &str) -> Result<String, LectureFolderServiceError> {
    let name = name.trim();
    if name.is_empty() {
        return Err(LectureFolderServiceError::ValidationError(
            "Folder name cannot be empty".to_string(),
        ));
    }
    if name.chars().count() > 250 {
        return Err(LectureFolderServiceError::ValidationError(
            "Folder name cannot exceed 250 characters".to_string(),
        ));
    }
    Ok(name.to_string())
}
