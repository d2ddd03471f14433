//! Access control
//!
//! Ownership rules for folders, slides, lecture folders, lectures and
//! annotations. Every rule is a walk up parent pointers followed by a
//! membership test; staff users pass every check.
//!
//! - A slide folder is editable by the members of the group whose base
//!   folder is the folder's root.
//! - A lecture folder is editable by the user whose base lecture folder is
//!   the folder's root.
//! - Slides follow their folder; lectures and annotations follow their author.

use anyhow::{Context, Result};
use std::collections::BTreeMap;
use std::sync::Arc;

use crate::db::repositories::{
    FolderRepository, FolderScope, GroupRepository, LectureRepository, SlideRepository,
    UserRepository,
};
use crate::models::{Annotation, CurrentUser, Folder, Group, Lecture, Slide, User};

pub struct AccessControl {
    users: Arc<dyn UserRepository>,
    groups: Arc<dyn GroupRepository>,
    folders: Arc<dyn FolderRepository>,
    lecture_folders: Arc<dyn FolderRepository>,
    slides: Arc<dyn SlideRepository>,
    lectures: Arc<dyn LectureRepository>,
}

impl AccessControl {
    pub fn new(
        users: Arc<dyn UserRepository>,
        groups: Arc<dyn GroupRepository>,
        folders: Arc<dyn FolderRepository>,
        lecture_folders: Arc<dyn FolderRepository>,
        slides: Arc<dyn SlideRepository>,
        lectures: Arc<dyn LectureRepository>,
    ) -> Self {
        Self {
            users,
            groups,
            folders,
            lecture_folders,
            slides,
            lectures,
        }
    }

    // ========================================================================
    // Principals
    // ========================================================================

    /// Attach group memberships and permissions to a user
    pub async fn principal(&self, user: User) -> Result<CurrentUser> {
        let group_ids = self
            .groups
            .groups_for_user(user.id)
            .await
            .context("Failed to load user groups")?
            .into_iter()
            .map(|g| g.id)
            .collect();
        let permissions = self
            .groups
            .permissions_for_user(user.id)
            .await
            .context("Failed to load user permissions")?;
        Ok(CurrentUser::new(user, group_ids, permissions))
    }

    pub async fn principal_by_id(&self, user_id: i64) -> Result<Option<CurrentUser>> {
        match self.users.get_by_id(user_id).await? {
            Some(user) => Ok(Some(self.principal(user).await?)),
            None => Ok(None),
        }
    }

    // ========================================================================
    // Slide folders
    // ========================================================================

    /// Path from the base folder down to `folder_id`
    pub async fn folder_chain(&self, folder_id: i64) -> Result<Vec<Folder>> {
        self.folders.ancestors(folder_id).await
    }

    /// Names from the root joined with `/`
    pub async fn folder_full_path(&self, folder_id: i64) -> Result<String> {
        Ok(join_path(&self.folder_chain(folder_id).await?))
    }

    /// Group owning the folder's root
    pub async fn folder_group(&self, folder_id: i64) -> Result<Option<Group>> {
        match self.folder_chain(folder_id).await?.first() {
            Some(root) => self.groups.get_by_base_folder(root.id).await,
            None => Ok(None),
        }
    }

    pub async fn can_edit_folder(&self, user: &CurrentUser, folder_id: i64) -> Result<bool> {
        if user.is_admin() {
            return Ok(true);
        }
        Ok(self
            .folder_group(folder_id)
            .await?
            .map_or(false, |group| user.in_group(group.id)))
    }

    /// Base folders the user may edit: all for staff, otherwise those of the
    /// user's groups
    pub async fn editable_base_folder_ids(&self, user: &CurrentUser) -> Result<Vec<i64>> {
        if user.is_admin() {
            return Ok(self.folders.children(None).await?.iter().map(|f| f.id).collect());
        }
        Ok(self
            .groups
            .groups_for_user(user.id())
            .await?
            .into_iter()
            .filter_map(|g| g.base_folder_id)
            .collect())
    }

    /// Editable base folders and all of their descendants
    pub async fn editable_folder_ids(&self, user: &CurrentUser) -> Result<Vec<i64>> {
        if user.is_admin() {
            return Ok(self.folders.list().await?.iter().map(|f| f.id).collect());
        }
        let mut ids = Vec::new();
        for base_id in self.editable_base_folder_ids(user).await? {
            ids.extend(self.folders.descendants(base_id).await?);
        }
        ids.sort_unstable();
        ids.dedup();
        Ok(ids)
    }

    /// No slides in the folder or any descendant
    pub async fn folder_is_empty(&self, folder_id: i64) -> Result<bool> {
        let subtree = self.folders.descendants(folder_id).await?;
        Ok(self.slides.count_in_folders(&subtree).await? == 0)
    }

    /// Whether `ancestor_id` is a proper ancestor of `folder_id`
    pub async fn folder_is_ancestor(&self, ancestor_id: i64, folder_id: i64) -> Result<bool> {
        Ok(ancestor_id != folder_id
            && self
                .folder_chain(folder_id)
                .await?
                .iter()
                .any(|f| f.id == ancestor_id))
    }

    // ========================================================================
    // Slides
    // ========================================================================

    pub async fn can_edit_slide(&self, user: &CurrentUser, slide: &Slide) -> Result<bool> {
        if user.is_admin() {
            return Ok(true);
        }
        match slide.folder_id {
            Some(folder_id) => self.can_edit_folder(user, folder_id).await,
            None => Ok(false),
        }
    }

    pub async fn can_view_slide(&self, user: &CurrentUser, slide: &Slide) -> Result<bool> {
        Ok(slide.is_public || self.can_edit_slide(user, slide).await?)
    }

    /// Slides visible when browsing one folder (or the root when `None`)
    pub async fn viewable_slides_by_folder(
        &self,
        user: &CurrentUser,
        folder_id: Option<i64>,
    ) -> Result<Vec<Slide>> {
        let public_only = match folder_id {
            None => !user.is_admin(),
            Some(id) => !self.can_edit_folder(user, id).await?,
        };
        self.slides.list_by_folder(folder_id, public_only).await
    }

    pub async fn viewable_slides(&self, user: &CurrentUser) -> Result<Vec<Slide>> {
        if user.is_admin() {
            return self.slides.list_all().await;
        }
        let folder_ids = self.editable_folder_ids(user).await?;
        self.slides.list_viewable(&folder_ids).await
    }

    pub async fn editable_slides(&self, user: &CurrentUser) -> Result<Vec<Slide>> {
        if user.is_admin() {
            return self.slides.list_all().await;
        }
        let folder_ids = self.editable_folder_ids(user).await?;
        self.slides.list_in_folders(&folder_ids).await
    }

    /// Drop lecture contents referencing `slide` whose lecture author can no
    /// longer view it. Contents of lectures without an author survive only
    /// while the slide is public. Returns the number of contents removed.
    pub async fn update_lectures(&self, slide: &Slide) -> Result<u64> {
        let contents = self
            .lectures
            .contents_for_slide(slide.id)
            .await
            .context("Failed to load lecture contents for slide")?;

        let mut by_lecture: BTreeMap<i64, Vec<i64>> = BTreeMap::new();
        for content in &contents {
            by_lecture
                .entry(content.lecture_id)
                .or_default()
                .push(content.id);
        }

        let mut stale = Vec::new();
        for (lecture_id, content_ids) in by_lecture {
            let author_id = self
                .lectures
                .get_by_id(lecture_id)
                .await?
                .and_then(|l| l.author_id);
            let author = match author_id {
                Some(id) => self.principal_by_id(id).await?,
                None => None,
            };
            let visible = match author {
                Some(author) => self.can_view_slide(&author, slide).await?,
                None => slide.is_public,
            };
            if !visible {
                stale.extend(content_ids);
            }
        }

        if stale.is_empty() {
            return Ok(0);
        }
        let removed = self.lectures.delete_contents(&stale).await?;
        tracing::info!(
            "Removed {} lecture contents no longer visible for slide {}",
            removed,
            slide.id
        );
        Ok(removed)
    }

    // ========================================================================
    // Lecture folders
    // ========================================================================

    pub async fn lecture_folder_chain(&self, folder_id: i64) -> Result<Vec<Folder>> {
        self.lecture_folders.ancestors(folder_id).await
    }

    /// User whose base lecture folder is the folder's root
    pub async fn lecture_folder_owner(&self, folder_id: i64) -> Result<Option<User>> {
        match self.lecture_folder_chain(folder_id).await?.first() {
            Some(root) => self.users.get_by_base_lecture_folder(root.id).await,
            None => Ok(None),
        }
    }

    pub async fn can_edit_lecture_folder(&self, user: &CurrentUser, folder_id: i64) -> Result<bool> {
        if user.is_admin() {
            return Ok(true);
        }
        Ok(self
            .lecture_folder_owner(folder_id)
            .await?
            .map_or(false, |owner| owner.id == user.id()))
    }

    /// No lectures in the folder or any descendant
    pub async fn lecture_folder_is_empty(&self, folder_id: i64) -> Result<bool> {
        let subtree = self.lecture_folders.descendants(folder_id).await?;
        Ok(self.lectures.count_in_folders(&subtree).await? == 0)
    }

    pub async fn lecture_folder_is_ancestor(&self, ancestor_id: i64, folder_id: i64) -> Result<bool> {
        Ok(ancestor_id != folder_id
            && self
                .lecture_folder_chain(folder_id)
                .await?
                .iter()
                .any(|f| f.id == ancestor_id))
    }

    // ========================================================================
    // Lectures
    // ========================================================================

    pub fn can_edit_lecture(&self, user: &CurrentUser, lecture: &Lecture) -> bool {
        user.is_admin() || lecture.author_id == Some(user.id())
    }

    /// The lecture and the user share a group
    pub async fn is_enrolled(&self, user: &CurrentUser, lecture_id: i64) -> Result<bool> {
        Ok(self
            .lectures
            .groups_for_lecture(lecture_id)
            .await?
            .iter()
            .any(|(group_id, _)| user.in_group(*group_id)))
    }

    pub async fn can_view_lecture(&self, user: &CurrentUser, lecture: &Lecture) -> Result<bool> {
        if self.can_edit_lecture(user, lecture) {
            return Ok(true);
        }
        Ok(lecture.is_active && self.is_enrolled(user, lecture.id).await?)
    }

    /// Active lectures in the user's groups, plus the user's own lectures
    /// when `include_editable` is set. Staff see everything.
    pub async fn viewable_lectures(
        &self,
        user: &CurrentUser,
        include_editable: bool,
        scope: FolderScope,
    ) -> Result<Vec<Lecture>> {
        if user.is_admin() {
            return self.lectures.list_all(scope).await;
        }
        let author = include_editable.then(|| user.id());
        self.lectures
            .list_viewable(&user.group_ids, author, scope)
            .await
    }

    pub async fn editable_lectures(&self, user: &CurrentUser, scope: FolderScope) -> Result<Vec<Lecture>> {
        if user.is_admin() {
            return self.lectures.list_all(scope).await;
        }
        self.lectures.list_viewable(&[], Some(user.id()), scope).await
    }

    // ========================================================================
    // Annotations
    // ========================================================================

    pub fn can_edit_annotation(&self, user: &CurrentUser, annotation: &Annotation) -> bool {
        user.is_admin() || annotation.author_id == user.id()
    }

    pub async fn can_view_annotation(&self, user: &CurrentUser, annotation: &Annotation) -> Result<bool> {
        if self.can_edit_annotation(user, annotation) {
            return Ok(true);
        }
        match self.slides.get_by_id(annotation.slide_id).await? {
            Some(slide) => self.can_view_slide(user, &slide).await,
            None => Ok(false),
        }
    }
}

/// Folder names joined with `/`
pub fn join_path(chain: &[Folder]) -> String {
    chain
        .iter()
        .map(|f| f.name.as_str())
        .collect::<Vec<_>>()
        .join("/")
}
