//! Slide service
//!
//! Uploads, metadata edits and deletion of slides, serving of the derived
//! Deep Zoom files, and integrity checks with repair. Image generation runs
//! on the blocking thread pool.

use crate::config::{MediaConfig, TileFormat};
use crate::db::repositories::{AnnotationRepository, SlideRepository, TagRepository};
use crate::models::{
    permissions, Annotation, CreateSlideInput, CurrentUser, IntegrityStatus, Slide, SlideDetail,
    SlideIntegrityReport, SlideMetadata, UpdateSlideInput,
};
use crate::services::access::AccessControl;
use crate::slide::{associated_image_extension, SlideError, SlideResult, SlideStore, SlideUpload};
use anyhow::Context;
use std::path::PathBuf;
use std::sync::Arc;

const VIEW_DENIED: &str = "You don't have permission to view this slide.";
const EDIT_DENIED: &str = "You don't have permission to edit this slide.";
const FOLDER_DENIED: &str = "You don't have permission to edit this folder.";

#[derive(Debug, thiserror::Error)]
pub enum SlideServiceError {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Permission denied: {0}")]
    PermissionDenied(String),

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("{0}")]
    ProcessingError(String),

    #[error("Internal error: {0}")]
    InternalError(#[from] anyhow::Error),
}

pub struct SlideService {
    slides: Arc<dyn SlideRepository>,
    tags: Arc<dyn TagRepository>,
    annotations: Arc<dyn AnnotationRepository>,
    access: Arc<AccessControl>,
    store: SlideStore,
    media: MediaConfig,
}

impl SlideService {
    pub fn new(
        slides: Arc<dyn SlideRepository>,
        tags: Arc<dyn TagRepository>,
        annotations: Arc<dyn AnnotationRepository>,
        access: Arc<AccessControl>,
        store: SlideStore,
        media: MediaConfig,
    ) -> Self {
        Self {
            slides,
            tags,
            annotations,
            access,
            store,
            media,
        }
    }

    // ========================================================================
    // Queries
    // ========================================================================

    pub async fn get(&self, id: i64) -> Result<Slide, SlideServiceError> {
        self.slides
            .get_by_id(id)
            .await
            .context("Failed to get slide")?
            .ok_or_else(|| SlideServiceError::NotFound(format!("Slide with ID {} not found", id)))
    }

    /// Load a slide the user may view
    pub async fn get_viewable(&self, user: &CurrentUser, id: i64) -> Result<Slide, SlideServiceError> {
        if !user.has_perm(permissions::VIEW_SLIDE) {
            return Err(SlideServiceError::PermissionDenied(
                "You don't have permission to view slides.".to_string(),
            ));
        }
        let slide = self.get(id).await?;
        if !self.access.can_view_slide(user, &slide).await? {
            return Err(SlideServiceError::PermissionDenied(VIEW_DENIED.to_string()));
        }
        Ok(slide)
    }

    pub async fn list(&self, user: &CurrentUser) -> Result<Vec<Slide>, SlideServiceError> {
        if !user.has_perm(permissions::VIEW_SLIDE) {
            return Err(SlideServiceError::PermissionDenied(
                "You don't have permission to view slides.".to_string(),
            ));
        }
        Ok(self.access.viewable_slides(user).await?)
    }

    pub async fn detail(&self, user: &CurrentUser, id: i64) -> Result<SlideDetail, SlideServiceError> {
        let slide = self.get_viewable(user, id).await?;

        let folder_path = match slide.folder_id {
            Some(folder_id) => Some(self.access.folder_full_path(folder_id).await?),
            None => None,
        };
        let tags = self
            .tags
            .tags_for_slide(slide.id)
            .await
            .context("Failed to load slide tags")?
            .into_iter()
            .map(|t| t.name)
            .collect();
        let editable = self.access.can_edit_slide(user, &slide).await?;

        Ok(SlideDetail::new(slide, folder_path, tags, editable))
    }

    /// Annotations on a slide the user may view
    pub async fn annotations(&self, user: &CurrentUser, id: i64) -> Result<Vec<Annotation>, SlideServiceError> {
        if !user.has_perm(permissions::VIEW_ANNOTATION) {
            return Err(SlideServiceError::PermissionDenied(
                "You don't have permission to view slide annotations.".to_string(),
            ));
        }
        let slide = self.get_viewable(user, id).await?;
        Ok(self
            .annotations
            .list_by_slide(slide.id)
            .await
            .context("Failed to list slide annotations")?)
    }

    // ========================================================================
    // Writes
    // ========================================================================

    /// Store the upload, insert the row and generate the pyramid. A slide
    /// whose processing fails stays in the database so it can be repaired.
    pub async fn create(
        &self,
        user: &CurrentUser,
        input: CreateSlideInput,
        upload: SlideUpload,
    ) -> Result<Slide, SlideServiceError> {
        require(user, permissions::ADD_SLIDE, "You don't have permission to add slides.")?;
        let name = validate_name(&input.name)?;
        self.validate_upload(&upload)?;
        if let Some(folder_id) = input.folder_id {
            self.check_folder(user, folder_id).await?;
        }

        let file = self.save_upload(upload).await?;

        let mut slide = Slide::new(name, file, Some(user.id()));
        slide.information = input.information;
        slide.folder_id = input.folder_id;
        slide.is_public = input.is_public;
        let mut slide = self
            .slides
            .create(&slide)
            .await
            .context("Failed to create slide")?;
        slide.image_root = Slide::image_root_for(slide.id);
        self.slides
            .set_image_root(slide.id, &slide.image_root)
            .await
            .context("Failed to set slide image root")?;

        tracing::info!("Slide '{}' created by {}", slide.name, user.user.username);

        let slide = self.process(slide).await?;
        self.access.update_lectures(&slide).await?;
        Ok(slide)
    }

    /// Swap the original file and regenerate every derived image
    pub async fn replace_file(
        &self,
        user: &CurrentUser,
        id: i64,
        upload: SlideUpload,
    ) -> Result<Slide, SlideServiceError> {
        require(user, permissions::CHANGE_SLIDE, "You don't have permission to change slides.")?;
        let mut slide = self.get(id).await?;
        self.check_edit(user, &slide).await?;
        self.validate_upload(&upload)?;

        let old = slide.clone();
        self.blocking(move |store| -> SlideResult<()> {
            store.delete_file(&old)?;
            store.delete_images(&old)
        })
        .await?
        .context("Failed to remove previous slide files")?;

        slide.file = self.save_upload(upload).await?;
        self.slides
            .set_file(slide.id, &slide.file)
            .await
            .context("Failed to update slide file")?;
        self.slides
            .set_metadata(slide.id, None)
            .await
            .context("Failed to clear slide metadata")?;

        tracing::info!("Slide '{}' updated by {}", slide.name, user.user.username);

        let slide = self.process(slide).await?;
        self.access.update_lectures(&slide).await?;
        Ok(slide)
    }

    /// Edit name, information, folder or visibility without reprocessing
    pub async fn update(
        &self,
        user: &CurrentUser,
        id: i64,
        input: UpdateSlideInput,
    ) -> Result<Slide, SlideServiceError> {
        require(user, permissions::CHANGE_SLIDE, "You don't have permission to change slides.")?;
        let mut slide = self.get(id).await?;
        self.check_edit(user, &slide).await?;

        if let Some(name) = input.name {
            slide.name = validate_name(&name)?;
        }
        if let Some(information) = input.information {
            slide.information = information;
        }
        if let Some(folder_id) = input.folder_id {
            if let Some(folder_id) = folder_id {
                self.check_folder(user, folder_id).await?;
            }
            slide.folder_id = folder_id;
        }
        if let Some(is_public) = input.is_public {
            slide.is_public = is_public;
        }

        let slide = self
            .slides
            .update(&slide)
            .await
            .context("Failed to update slide")?;
        self.access.update_lectures(&slide).await?;

        tracing::info!("Slide '{}' updated by {}", slide.name, user.user.username);
        Ok(slide)
    }

    pub async fn delete(&self, user: &CurrentUser, id: i64) -> Result<(), SlideServiceError> {
        require(user, permissions::DELETE_SLIDE, "You don't have permission to delete slides.")?;
        let slide = self.get(id).await?;
        self.check_edit(user, &slide).await?;

        let files = slide.clone();
        self.blocking(move |store| -> SlideResult<()> {
            store.delete_file(&files)?;
            store.delete_images(&files)
        })
        .await?
        .context("Failed to remove slide files")?;

        self.slides
            .delete(slide.id)
            .await
            .context("Failed to delete slide")?;

        tracing::info!("Slide '{}' deleted by {}", slide.name, user.user.username);
        Ok(())
    }

    // ========================================================================
    // Derived files
    // ========================================================================

    pub async fn thumbnail(&self, user: &CurrentUser, id: i64) -> Result<Vec<u8>, SlideServiceError> {
        let slide = self.get_viewable(user, id).await?;
        read_served(self.store.thumbnail_path(&slide), "Thumbnail not found.").await
    }

    pub async fn associated_image(&self, user: &CurrentUser, id: i64) -> Result<Vec<u8>, SlideServiceError> {
        let slide = self.get_viewable(user, id).await?;
        read_served(
            self.store.associated_image_path(&slide),
            "Associated image not found.",
        )
        .await
    }

    pub async fn dzi(&self, user: &CurrentUser, id: i64) -> Result<Vec<u8>, SlideServiceError> {
        let slide = self.get_viewable(user, id).await?;
        read_served(self.store.dzi_path(&slide), "DZI file not found").await
    }

    /// One pyramid tile; `extension` must be `jpeg` or `png`
    pub async fn tile(
        &self,
        user: &CurrentUser,
        id: i64,
        level: usize,
        col: u32,
        row: u32,
        extension: &str,
    ) -> Result<(Vec<u8>, TileFormat), SlideServiceError> {
        let format = TileFormat::from_extension(extension)
            .ok_or_else(|| SlideServiceError::ValidationError("Unsupported format".to_string()))?;
        let slide = self.get_viewable(user, id).await?;
        let bytes = read_served(
            self.store.tile_path(&slide, level, col, row, format),
            "Tile not found",
        )
        .await?;
        Ok((bytes, format))
    }

    // ========================================================================
    // Integrity
    // ========================================================================

    pub async fn integrity(&self, user: &CurrentUser, id: i64) -> Result<IntegrityStatus, SlideServiceError> {
        let slide = self.get_viewable(user, id).await?;
        self.check(&slide).await
    }

    pub async fn repair(&self, user: &CurrentUser, id: i64) -> Result<IntegrityStatus, SlideServiceError> {
        let slide = self.get(id).await?;
        self.check_edit(user, &slide).await?;
        self.repair_slide(&slide).await
    }

    /// Regenerate whatever the integrity check reports missing and return
    /// the fresh status
    pub async fn repair_slide(&self, slide: &Slide) -> Result<IntegrityStatus, SlideServiceError> {
        let status = self.check(slide).await?;
        if !status.needs_repair {
            return Ok(status);
        }

        self.try_repair(slide, status).await.map_err(|e| {
            SlideServiceError::ProcessingError(format!(
                "Failed to repair slide {} (id={}): {}",
                slide.name, slide.id, e
            ))
        })?;

        let repaired = self.get(slide.id).await?;
        let status = self.check(&repaired).await?;
        tracing::info!(
            "Repaired slide {} (id={}), needs repair: {}",
            repaired.name,
            repaired.id,
            status.needs_repair
        );
        Ok(status)
    }

    /// Every slide whose derived state is incomplete
    pub async fn integrity_all(&self) -> Result<Vec<SlideIntegrityReport>, SlideServiceError> {
        let slides = self
            .slides
            .list_all()
            .await
            .context("Failed to list slides")?;

        let reports = self
            .blocking(move |store| {
                slides
                    .into_iter()
                    .filter_map(|slide| {
                        let status = store.check_integrity(&slide);
                        status.needs_repair.then(|| SlideIntegrityReport {
                            id: slide.id,
                            name: slide.name,
                            status,
                        })
                    })
                    .collect::<Vec<_>>()
            })
            .await?;
        Ok(reports)
    }

    // ========================================================================
    // Private helper methods
    // ========================================================================

    async fn check(&self, slide: &Slide) -> Result<IntegrityStatus, SlideServiceError> {
        let slide = slide.clone();
        self.blocking(move |store| store.check_integrity(&slide)).await
    }

    async fn try_repair(&self, slide: &Slide, status: IntegrityStatus) -> anyhow::Result<()> {
        if !status.file_exists {
            return Err(SlideError::FileMissing.into());
        }

        if status.images_incomplete() {
            let target = slide.clone();
            self.blocking(move |store| -> SlideResult<()> {
                store.delete_images(&target)?;
                store.generate_images(&target)
            })
            .await??;
        }

        if !status.metadata_valid {
            let target = slide.clone();
            let metadata = self
                .blocking(move |store| store.read_metadata(&target))
                .await??;
            let value = serde_json::to_value(&metadata).context("Failed to serialize slide metadata")?;
            self.slides.set_metadata(slide.id, Some(&value)).await?;
        }
        Ok(())
    }

    /// Generate the pyramid and store the metadata
    async fn process(&self, slide: Slide) -> Result<Slide, SlideServiceError> {
        let target = slide.clone();
        let metadata = self
            .blocking(move |store| -> SlideResult<SlideMetadata> {
                store.generate_images(&target)?;
                store.read_metadata(&target)
            })
            .await?
            .map_err(|e| {
                tracing::error!("Failed to process slide {} (id={}): {}", slide.name, slide.id, e);
                SlideServiceError::ValidationError(e.to_string())
            })?;

        let value = serde_json::to_value(&metadata).context("Failed to serialize slide metadata")?;
        self.slides
            .set_metadata(slide.id, Some(&value))
            .await
            .context("Failed to save slide metadata")?;
        self.get(slide.id).await
    }

    async fn save_upload(&self, upload: SlideUpload) -> Result<String, SlideServiceError> {
        Ok(self
            .blocking(move |store| store.save_upload(&upload))
            .await?
            .context("Failed to store slide file")?)
    }

    /// Run blocking file or image work on a copy of the store
    async fn blocking<T, F>(&self, work: F) -> Result<T, SlideServiceError>
    where
        F: FnOnce(SlideStore) -> T + Send + 'static,
        T: Send + 'static,
    {
        let store = self.store.clone();
        Ok(tokio::task::spawn_blocking(move || work(store))
            .await
            .context("Slide worker task failed")?)
    }

    fn validate_upload(&self, upload: &SlideUpload) -> Result<(), SlideServiceError> {
        if upload.data.is_empty() {
            return Err(SlideServiceError::ValidationError(
                "Slide file is empty".to_string(),
            ));
        }
        if upload.data.len() as u64 > self.media.max_upload_size {
            return Err(SlideServiceError::ValidationError(format!(
                "Slide file exceeds the maximum size of {} bytes",
                self.media.max_upload_size
            )));
        }
        if !self.media.is_extension_allowed(&upload.file_name) {
            return Err(SlideServiceError::ValidationError(format!(
                "Unsupported slide file type. Allowed: {}",
                self.media.allowed_extensions.join(", ")
            )));
        }
        for image in &upload.associated {
            if !is_associated_name(&image.name) {
                return Err(SlideServiceError::ValidationError(format!(
                    "Invalid associated image name: {}",
                    image.name
                )));
            }
            if associated_image_extension(&image.data).is_none() {
                return Err(SlideServiceError::ValidationError(format!(
                    "Associated image '{}' must be a PNG or JPEG file",
                    image.name
                )));
            }
        }
        Ok(())
    }

    async fn check_edit(&self, user: &CurrentUser, slide: &Slide) -> Result<(), SlideServiceError> {
        if self.access.can_edit_slide(user, slide).await? {
            Ok(())
        } else {
            Err(SlideServiceError::PermissionDenied(EDIT_DENIED.to_string()))
        }
    }

    async fn check_folder(&self, user: &CurrentUser, folder_id: i64) -> Result<(), SlideServiceError> {
        if self.access.can_edit_folder(user, folder_id).await? {
            Ok(())
        } else {
            Err(SlideServiceError::PermissionDenied(FOLDER_DENIED.to_string()))
        }
    }
}

fn require(user: &CurrentUser, codename: &str, message: &str) -> Result<(), SlideServiceError> {
    if user.has_perm(codename) {
        Ok(())
    } else {
        Err(SlideServiceError::PermissionDenied(message.to_string()))
    }
}

/// Associated image names become part of a sidecar file name
fn is_associated_name(name: &str) -> bool {
    !name.is_empty() && name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_')
}

fn validate_name(name: &str) -> Result<String, SlideServiceError> {
    let name = name.trim();
    if name.is_empty() {
        return Err(SlideServiceError::ValidationError(
            "Slide name cannot be empty".to_string(),
        ));
    }
    if name.chars().count() > 255 {
        return Err(SlideServiceError::ValidationError(
            "Slide name cannot exceed 255 characters".to_string(),
        ));
    }
    Ok(name.to_string())
}

/// Read a derived file, logging the path when it is missing
async fn read_served(path: PathBuf, missing: &str) -> Result<Vec<u8>, SlideServiceError> {
    match tokio::fs::read(&path).await {
        Ok(bytes) => Ok(bytes),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            tracing::error!("{}: {}", missing.trim_end_matches('.'), path.display());
            Err(SlideServiceError::NotFound(missing.to_string()))
        }
        Err(e) => Err(anyhow::Error::new(e)
            .context(format!("Failed to read {}", path.display()))
            .into()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{ContentInput, Tag};
    use crate::services::test_support::{sample_png, sample_upload, Fixture};

    fn setup_test_service(fx: &Fixture) -> SlideService {
        SlideService::new(
            fx.slides.clone(),
            fx.tags.clone(),
            fx.annotations.clone(),
            fx.access.clone(),
            fx.store.clone(),
            MediaConfig::default(),
        )
    }

    fn input(name: &str, folder_id: Option<i64>) -> CreateSlideInput {
        CreateSlideInput {
            name: name.to_string(),
            information: "H&E".to_string(),
            folder_id,
            is_public: false,
        }
    }

    async fn upload(fx: &Fixture, service: &SlideService, user: &CurrentUser, folder_id: Option<i64>) -> Slide {
        service
            .create(user, input("Liver", folder_id), sample_upload("liver.png", 300, 200))
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_create_processes_slide() {
        let fx = Fixture::new().await;
        let service = setup_test_service(&fx);
        let group = fx.publisher_group("Histo").await;
        let alice = fx.member("alice", &[group.id]).await;

        let slide = upload(&fx, &service, &alice, group.base_folder_id).await;
        assert_eq!(slide.file, "slides/liver.png");
        assert_eq!(slide.image_root, format!("images/{}", slide.id));
        assert_eq!(slide.author_id, Some(alice.id()));
        assert!(slide.metadata_valid());
        assert_eq!(slide.metadata.as_ref().unwrap()["sourceLens"], 40);

        let status = service.integrity(&alice, slide.id).await.unwrap();
        assert!(!status.needs_repair);
        assert!(service.integrity_all().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_create_rejects_foreign_folder_and_bad_extension() {
        let fx = Fixture::new().await;
        let service = setup_test_service(&fx);
        let histo = fx.publisher_group("Histo").await;
        let cyto = fx.publisher_group("Cyto").await;
        let alice = fx.member("alice", &[histo.id]).await;

        let err = service
            .create(&alice, input("x", cyto.base_folder_id), SlideUpload::new("x.png", sample_png(10, 10)))
            .await
            .unwrap_err();
        assert!(matches!(err, SlideServiceError::PermissionDenied(ref m) if m == FOLDER_DENIED));

        let err = service
            .create(&alice, input("x", None), SlideUpload::new("x.exe", vec![1, 2, 3]))
            .await
            .unwrap_err();
        assert!(matches!(err, SlideServiceError::ValidationError(_)));
    }

    #[tokio::test]
    async fn test_processing_failure_keeps_row() {
        let fx = Fixture::new().await;
        let service = setup_test_service(&fx);
        let admin = fx.admin().await;

        let err = service
            .create(&admin, input("No macro", None), SlideUpload::new("bare.png", sample_png(40, 40)))
            .await
            .unwrap_err();
        assert!(matches!(err, SlideServiceError::ValidationError(ref m) if m.starts_with("Failed to generate images: ")));

        let problems = service.integrity_all().await.unwrap();
        assert_eq!(problems.len(), 1);
        assert_eq!(problems[0].name, "No macro");
        assert!(problems[0].status.file_exists);
        assert!(!problems[0].status.associated_image_exists);
    }

    #[tokio::test]
    async fn test_same_file_name_uploads_twice() {
        let fx = Fixture::new().await;
        let service = setup_test_service(&fx);
        let admin = fx.admin().await;

        let first = upload(&fx, &service, &admin, None).await;
        let second = upload(&fx, &service, &admin, None).await;
        assert_ne!(first.file, second.file);
        assert!(second.file.starts_with("slides/liver_"));
        assert!(second.metadata_valid());
        assert!(!service.integrity(&admin, second.id).await.unwrap().needs_repair);
    }

    #[tokio::test]
    async fn test_rejects_invalid_associated_image() {
        let fx = Fixture::new().await;
        let service = setup_test_service(&fx);
        let admin = fx.admin().await;

        let mut bad = sample_upload("liver.png", 30, 30);
        bad.associated[0].data = b"GIF89a".to_vec();
        let err = service.create(&admin, input("Bad", None), bad).await.unwrap_err();
        assert!(matches!(err, SlideServiceError::ValidationError(ref m) if m == "Associated image 'macro' must be a PNG or JPEG file"));

        let mut bad = sample_upload("liver.png", 30, 30);
        bad.associated[0].name = "../macro".to_string();
        assert!(matches!(
            service.create(&admin, input("Bad", None), bad).await,
            Err(SlideServiceError::ValidationError(_))
        ));
        assert!(service.list(&admin).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_delete_removes_vendor_sidecars() {
        let fx = Fixture::new().await;
        let service = setup_test_service(&fx);
        let admin = fx.admin().await;
        let slide = upload(&fx, &service, &admin, None).await;

        service.delete(&admin, slide.id).await.unwrap();
        let slides_dir = fx.store.media_root().join("slides");
        assert_eq!(std::fs::read_dir(&slides_dir).unwrap().count(), 0);

        // A bare upload under the same name must not inherit the old metadata
        let err = service
            .create(&admin, input("Unrelated", None), SlideUpload::new("liver.png", sample_png(50, 50)))
            .await
            .unwrap_err();
        assert!(matches!(err, SlideServiceError::ValidationError(_)));
        let unrelated = &service.list(&admin).await.unwrap()[0];
        assert_eq!(unrelated.name, "Unrelated");
        assert!(unrelated.metadata.is_none());
    }

    #[tokio::test]
    async fn test_replace_file_swaps_sidecars() {
        let fx = Fixture::new().await;
        let service = setup_test_service(&fx);
        let admin = fx.admin().await;
        let slide = upload(&fx, &service, &admin, None).await;
        let old_path = fx.store.slide_path(&slide);

        let mut replacement = sample_upload("kidney.png", 120, 80);
        replacement.properties = Some(
            "openslide.mpp-x = 0.5\nopenslide.mpp-y = 0.5\nhamamatsu.SourceLens = 20\nhamamatsu.Created = 2022/01/01\n"
                .to_string(),
        );
        let replaced = service.replace_file(&admin, slide.id, replacement).await.unwrap();
        assert_eq!(replaced.file, "slides/kidney.png");
        assert_eq!(replaced.metadata.as_ref().unwrap()["sourceLens"], 20);
        assert!(!old_path.exists());

        let names: Vec<String> = std::fs::read_dir(fx.store.media_root().join("slides"))
            .unwrap()
            .flatten()
            .map(|e| e.file_name().to_string_lossy().to_string())
            .collect();
        assert_eq!(names.len(), 3);
        assert!(names.iter().all(|n| n.starts_with("kidney.png")));

        let dzi = String::from_utf8(service.dzi(&admin, slide.id).await.unwrap()).unwrap();
        assert!(dzi.contains(r#"Width="120""#));
    }

    #[tokio::test]
    async fn test_repair_regenerates_missing_parts() {
        let fx = Fixture::new().await;
        let service = setup_test_service(&fx);
        let admin = fx.admin().await;
        let slide = upload(&fx, &service, &admin, None).await;

        std::fs::remove_file(fx.store.thumbnail_path(&slide)).unwrap();
        std::fs::remove_file(fx.store.tile_path(&slide, 0, 0, 0, TileFormat::Jpeg)).unwrap();
        fx.slides.set_metadata(slide.id, None).await.unwrap();

        let before = service.integrity(&admin, slide.id).await.unwrap();
        assert!(before.needs_repair);
        assert!(!before.tiles_complete);
        assert!(!before.metadata_valid);

        let after = service.repair(&admin, slide.id).await.unwrap();
        assert!(!after.needs_repair);
        assert!(service.get(slide.id).await.unwrap().metadata_valid());
    }

    #[tokio::test]
    async fn test_repair_without_original_fails() {
        let fx = Fixture::new().await;
        let service = setup_test_service(&fx);
        let admin = fx.admin().await;
        let slide = upload(&fx, &service, &admin, None).await;
        std::fs::remove_file(fx.store.slide_path(&slide)).unwrap();

        let err = service.repair(&admin, slide.id).await.unwrap_err();
        let expected = format!(
            "Failed to repair slide Liver (id={}): Original slide file does not exist",
            slide.id
        );
        assert!(matches!(err, SlideServiceError::ProcessingError(ref m) if *m == expected));
    }

    #[tokio::test]
    async fn test_serving_derived_files() {
        let fx = Fixture::new().await;
        let service = setup_test_service(&fx);
        let group = fx.publisher_group("Histo").await;
        let alice = fx.member("alice", &[group.id]).await;
        let outsider = fx.member("bob", &[fx.publisher_group("Cyto").await.id]).await;
        let slide = upload(&fx, &service, &alice, group.base_folder_id).await;

        let dzi = String::from_utf8(service.dzi(&alice, slide.id).await.unwrap()).unwrap();
        assert!(dzi.contains(r#"Width="300""#));

        let (bytes, format) = service.tile(&alice, slide.id, 0, 0, 0, "jpeg").await.unwrap();
        assert_eq!(format, TileFormat::Jpeg);
        assert!(!bytes.is_empty());

        assert!(matches!(
            service.tile(&alice, slide.id, 0, 0, 0, "gif").await,
            Err(SlideServiceError::ValidationError(ref m)) if m == "Unsupported format"
        ));
        assert!(matches!(
            service.tile(&alice, slide.id, 0, 5, 5, "jpeg").await,
            Err(SlideServiceError::NotFound(ref m)) if m == "Tile not found"
        ));
        assert!(matches!(
            service.thumbnail(&outsider, slide.id).await,
            Err(SlideServiceError::PermissionDenied(ref m)) if m == VIEW_DENIED
        ));

        std::fs::remove_file(fx.store.associated_image_path(&slide)).unwrap();
        assert!(matches!(
            service.associated_image(&alice, slide.id).await,
            Err(SlideServiceError::NotFound(ref m)) if m == "Associated image not found."
        ));
    }

    #[tokio::test]
    async fn test_update_moves_and_prunes_lectures() {
        let fx = Fixture::new().await;
        let service = setup_test_service(&fx);
        let histo = fx.publisher_group("Histo").await;
        let alice = fx.member("alice", &[histo.id]).await;
        let cyto = fx.publisher_group("Cyto").await;
        let bob = fx.member("bob", &[cyto.id]).await;
        let slide = fx.slide("kidney", histo.base_folder_id, true).await;

        let lecture = fx.lecture("Nephrology", &bob).await;
        fx.lectures
            .replace_contents(lecture.id, &[ContentInput::new(slide.id, None)])
            .await
            .unwrap();

        let updated = service
            .update(
                &alice,
                slide.id,
                UpdateSlideInput { name: Some("Kidney".to_string()), is_public: Some(false), ..Default::default() },
            )
            .await
            .unwrap();
        assert_eq!(updated.name, "Kidney");
        assert!(fx.lectures.contents(lecture.id).await.unwrap().is_empty());

        assert!(matches!(
            service.update(&bob, slide.id, UpdateSlideInput::default()).await,
            Err(SlideServiceError::PermissionDenied(ref m)) if m == EDIT_DENIED
        ));
    }

    #[tokio::test]
    async fn test_detail_and_delete() {
        let fx = Fixture::new().await;
        let service = setup_test_service(&fx);
        let admin = fx.admin().await;
        let group = fx.publisher_group("Histo").await;
        let folder = fx.folder("Liver", group.base_folder_id).await;
        let slide = upload(&fx, &service, &admin, Some(folder.id)).await;

        let tag = fx
            .tags
            .create(&Tag::new("hepatic".to_string(), admin.id()))
            .await
            .unwrap();
        fx.tags.attach(tag.id, slide.id).await.unwrap();

        let detail = service.detail(&admin, slide.id).await.unwrap();
        assert_eq!(detail.folder_name, "Histo/Liver");
        assert_eq!(detail.file_name, "liver.png");
        assert_eq!(detail.tags, vec!["hepatic".to_string()]);
        assert!(detail.editable);

        service.delete(&admin, slide.id).await.unwrap();
        assert!(!fx.store.slide_path(&slide).exists());
        assert!(!fx.store.dzi_path(&slide).exists());
        assert!(matches!(service.get(slide.id).await, Err(SlideServiceError::NotFound(_))));
    }
}
