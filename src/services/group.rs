//! Group service
//!
//! Groups come in two kinds. A publisher group owns a base folder named
//! after the group, and its members get a personal lecture folder. A viewer
//! group only grants read permissions.

use crate::cache::{Cache, CacheLayer};
use crate::db::repositories::{FolderRepository, GroupRepository, UserRepository};
use crate::models::{title_case, CreateGroupInput, Folder, Group, GroupKind, User};
use crate::services::access::AccessControl;
use crate::services::folder::CACHE_PATTERN_FOLDERS;
use crate::services::lecture_folder::CACHE_PATTERN_LECTURE_FOLDERS;
use anyhow::Context;
use chrono::Utc;
use std::sync::Arc;

#[derive(Debug, thiserror::Error)]
pub enum GroupServiceError {
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

pub struct GroupService {
    groups: Arc<dyn GroupRepository>,
    users: Arc<dyn UserRepository>,
    folders: Arc<dyn FolderRepository>,
    lecture_folders: Arc<dyn FolderRepository>,
    access: Arc<AccessControl>,
    cache: Arc<Cache>,
}

impl GroupService {
    pub fn new(
        groups: Arc<dyn GroupRepository>,
        users: Arc<dyn UserRepository>,
        folders: Arc<dyn FolderRepository>,
        lecture_folders: Arc<dyn FolderRepository>,
        access: Arc<AccessControl>,
        cache: Arc<Cache>,
    ) -> Self {
        Self {
            groups,
            users,
            folders,
            lecture_folders,
            access,
            cache,
        }
    }

    pub async fn list(&self, kind: Option<GroupKind>) -> Result<Vec<Group>, GroupServiceError> {
        Ok(self.groups.list(kind).await.context("Failed to list groups")?)
    }

    pub async fn get(&self, id: i64) -> Result<Group, GroupServiceError> {
        self.groups
            .get_by_id(id)
            .await
            .context("Failed to get group")?
            .ok_or_else(|| GroupServiceError::NotFound(format!("Group with ID {} not found", id)))
    }

    /// Create a group with its default permissions. Publisher groups also get
    /// a base folder named after the group.
    pub async fn create(&self, input: CreateGroupInput) -> Result<Group, GroupServiceError> {
        let name = input.name.trim().to_string();
        if name.is_empty() {
            return Err(GroupServiceError::ValidationError(
                "Group name cannot be empty".to_string(),
            ));
        }
        if self
            .groups
            .get_by_name(&name)
            .await
            .context("Failed to check group name")?
            .is_some()
        {
            return Err(GroupServiceError::Conflict(format!(
                "Group '{}' already exists",
                name
            )));
        }

        let base_name = title_case(&name);
        if input.kind == GroupKind::Publisher
            && self
                .folders
                .exists_by_name(&base_name, None, None)
                .await
                .context("Failed to check base folder name")?
        {
            return Err(GroupServiceError::Conflict(format!(
                "Folder '{}' already exists",
                base_name
            )));
        }

        let mut group = self
            .groups
            .create(&Group {
                id: 0,
                name,
                kind: input.kind,
                base_folder_id: None,
                created_at: Utc::now(),
            })
            .await
            .context("Failed to create group")?;

        self.groups
            .set_permissions(group.id, input.kind.default_permissions())
            .await
            .context("Failed to assign default permissions")?;

        if input.kind == GroupKind::Publisher {
            let base = self
                .folders
                .create(&Folder::new(base_name, None, None))
                .await
                .context("Failed to create base folder")?;
            self.groups
                .set_base_folder(group.id, Some(base.id))
                .await
                .context("Failed to link base folder")?;
            group.base_folder_id = Some(base.id);
            self.invalidate_folders().await;
        }

        tracing::info!("Group '{}' ({}) created", group.name, group.kind);
        Ok(group)
    }

    /// Delete a group together with its base folder, which must be empty
    pub async fn delete(&self, id: i64) -> Result<(), GroupServiceError> {
        let group = self.get(id).await?;

        if let Some(base_id) = group.base_folder_id {
            if !self.access.folder_is_empty(base_id).await? {
                return Err(GroupServiceError::PermissionDenied(
                    "Folder is not empty. Cannot delete.".to_string(),
                ));
            }
        }

        self.groups
            .delete(group.id)
            .await
            .context("Failed to delete group")?;
        if let Some(base_id) = group.base_folder_id {
            self.folders
                .delete(base_id)
                .await
                .context("Failed to delete base folder")?;
            self.invalidate_folders().await;
        }

        tracing::info!("Group '{}' deleted", group.name);
        Ok(())
    }

    pub async fn members(&self, id: i64) -> Result<Vec<User>, GroupServiceError> {
        let group = self.get(id).await?;
        Ok(self
            .groups
            .list_members(group.id)
            .await
            .context("Failed to list group members")?)
    }

    /// Add a user to a group. Joining a publisher group gives the user a
    /// base lecture folder when they have none.
    pub async fn add_member(&self, group_id: i64, user_id: i64) -> Result<(), GroupServiceError> {
        let group = self.get(group_id).await?;
        let user = self
            .users
            .get_by_id(user_id)
            .await
            .context("Failed to get user")?
            .ok_or_else(|| GroupServiceError::NotFound(format!("User with ID {} not found", user_id)))?;

        // A folder name conflict must leave membership untouched
        if group.kind == GroupKind::Publisher && user.base_lecture_folder_id.is_none() {
            self.create_base_lecture_folder(&user).await?;
        }

        self.groups
            .add_member(group.id, user.id)
            .await
            .context("Failed to add group member")?;

        tracing::info!("User '{}' added to group '{}'", user.username, group.name);
        Ok(())
    }

    pub async fn remove_member(&self, group_id: i64, user_id: i64) -> Result<(), GroupServiceError> {
        let group = self.get(group_id).await?;
        self.groups
            .remove_member(group.id, user_id)
            .await
            .context("Failed to remove group member")?;
        Ok(())
    }

    async fn create_base_lecture_folder(&self, user: &User) -> Result<Folder, GroupServiceError> {
        let name = title_case(&user.username);
        if self
            .lecture_folders
            .exists_by_name(&name, None, None)
            .await
            .context("Failed to check lecture folder name")?
        {
            return Err(GroupServiceError::Conflict(format!(
                "Lecture folder '{}' already exists",
                name
            )));
        }

        let folder = self
            .lecture_folders
            .create(&Folder::new(name, None, Some(user.id)))
            .await
            .context("Failed to create base lecture folder")?;
        self.users
            .set_base_lecture_folder(user.id, Some(folder.id))
            .await
            .context("Failed to link base lecture folder")?;

        if let Err(e) = self.cache.delete_pattern(CACHE_PATTERN_LECTURE_FOLDERS).await {
            tracing::warn!("Failed to invalidate lecture folder cache: {}", e);
        }
        Ok(folder)
    }

    async fn invalidate_folders(&self) {
        if let Err(e) = self.cache.delete_pattern(CACHE_PATTERN_FOLDERS).await {
            tracing::warn!("Failed to invalidate folder cache: {}", e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::permissions;
    use crate::services::test_support::Fixture;

    fn setup_test_service(fx: &Fixture) -> GroupService {
        GroupService::new(
            fx.groups.clone(),
            fx.users.clone(),
            fx.folders.clone(),
            fx.lecture_folders.clone(),
            fx.access.clone(),
            fx.cache.clone(),
        )
    }

    fn input(name: &str, kind: GroupKind) -> CreateGroupInput {
        CreateGroupInput {
            name: name.to_string(),
            kind,
        }
    }

    #[tokio::test]
    async fn test_create_publisher_group() {
        let fx = Fixture::new().await;
        let service = setup_test_service(&fx);

        let group = service
            .create(input("pathology lab", GroupKind::Publisher))
            .await
            .unwrap();

        let base = fx
            .folders
            .get_by_id(group.base_folder_id.unwrap())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(base.name, "Pathology Lab");
        assert!(base.is_base_folder());

        let perms = fx.groups.get_permissions(group.id).await.unwrap();
        assert_eq!(perms.len(), permissions::ALL.len());
    }

    #[tokio::test]
    async fn test_create_viewer_group() {
        let fx = Fixture::new().await;
        let service = setup_test_service(&fx);

        let group = service.create(input("Students", GroupKind::Viewer)).await.unwrap();
        assert!(group.base_folder_id.is_none());

        let mut perms = fx.groups.get_permissions(group.id).await.unwrap();
        perms.sort();
        let mut expected: Vec<String> = permissions::VIEWER_DEFAULTS
            .iter()
            .map(|p| p.to_string())
            .collect();
        expected.sort();
        assert_eq!(perms, expected);
    }

    #[tokio::test]
    async fn test_create_rejects_duplicates() {
        let fx = Fixture::new().await;
        let service = setup_test_service(&fx);
        service.create(input("Histo", GroupKind::Publisher)).await.unwrap();

        assert!(matches!(
            service.create(input("Histo", GroupKind::Viewer)).await,
            Err(GroupServiceError::Conflict(_))
        ));
        assert!(matches!(
            service.create(input("HISTO", GroupKind::Publisher)).await,
            Err(GroupServiceError::Conflict(_))
        ));
        assert!(matches!(
            service.create(input(" ", GroupKind::Viewer)).await,
            Err(GroupServiceError::ValidationError(_))
        ));
    }

    #[tokio::test]
    async fn test_delete_requires_empty_base_folder() {
        let fx = Fixture::new().await;
        let service = setup_test_service(&fx);
        let group = service.create(input("Histo", GroupKind::Publisher)).await.unwrap();
        let base = group.base_folder_id.unwrap();
        let child = fx.folder("Liver", Some(base)).await;
        let slide = fx.slide("liver-1", Some(child.id), false).await;

        let err = service.delete(group.id).await.unwrap_err();
        assert!(matches!(err, GroupServiceError::PermissionDenied(ref m) if m == "Folder is not empty. Cannot delete."));

        fx.slides.delete(slide.id).await.unwrap();
        service.delete(group.id).await.unwrap();
        assert!(fx.groups.get_by_id(group.id).await.unwrap().is_none());
        assert!(fx.folders.get_by_id(base).await.unwrap().is_none());
        assert!(fx.folders.get_by_id(child.id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_joining_publisher_creates_lecture_folder() {
        let fx = Fixture::new().await;
        let service = setup_test_service(&fx);
        let publishers = service.create(input("Histo", GroupKind::Publisher)).await.unwrap();
        let viewers = service.create(input("Students", GroupKind::Viewer)).await.unwrap();
        let alice = fx.member("dr.alice", &[]).await;

        service.add_member(viewers.id, alice.id()).await.unwrap();
        let reloaded = fx.users.get_by_id(alice.id()).await.unwrap().unwrap();
        assert!(reloaded.base_lecture_folder_id.is_none());

        service.add_member(publishers.id, alice.id()).await.unwrap();
        let reloaded = fx.users.get_by_id(alice.id()).await.unwrap().unwrap();
        let folder_id = reloaded.base_lecture_folder_id.unwrap();
        let folder = fx.lecture_folders.get_by_id(folder_id).await.unwrap().unwrap();
        assert_eq!(folder.name, "Dr.Alice");

        // joining again keeps the existing folder
        service.add_member(publishers.id, alice.id()).await.unwrap();
        let again = fx.users.get_by_id(alice.id()).await.unwrap().unwrap();
        assert_eq!(again.base_lecture_folder_id, Some(folder_id));

        let members = service.members(publishers.id).await.unwrap();
        assert_eq!(members.len(), 1);

        service.remove_member(publishers.id, alice.id()).await.unwrap();
        assert!(service.members(publishers.id).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_lecture_folder_conflict_keeps_membership_unchanged() {
        let fx = Fixture::new().await;
        let service = setup_test_service(&fx);
        let publishers = service.create(input("Histo", GroupKind::Publisher)).await.unwrap();
        let bob = fx.member("bob", &[]).await;
        fx.lecture_folder("Bob", None).await;

        let err = service.add_member(publishers.id, bob.id()).await.unwrap_err();
        assert!(matches!(err, GroupServiceError::Conflict(ref m) if m == "Lecture folder 'Bob' already exists"));

        assert!(service.members(publishers.id).await.unwrap().is_empty());
        let reloaded = fx.users.get_by_id(bob.id()).await.unwrap().unwrap();
        assert!(reloaded.base_lecture_folder_id.is_none());
        assert!(!fx.reload(&bob).await.has_perm(permissions::ADD_SLIDE));
    }

    #[tokio::test]
    async fn test_list_by_kind() {
        let fx = Fixture::new().await;
        let service = setup_test_service(&fx);
        service.create(input("Histo", GroupKind::Publisher)).await.unwrap();
        service.create(input("Students", GroupKind::Viewer)).await.unwrap();

        assert_eq!(service.list(None).await.unwrap().len(), 2);
        let viewers = service.list(Some(GroupKind::Viewer)).await.unwrap();
        assert_eq!(viewers.len(), 1);
        assert_eq!(viewers[0].name, "Students");
    }
}
