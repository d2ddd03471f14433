//! Shared fixture for service tests: in-memory database, every repository
//! and a temporary media root.

use chrono::Utc;
use image::{DynamicImage, ImageBuffer, ImageOutputFormat, Rgb, RgbImage};
use std::io::Cursor;
use std::sync::Arc;

use super::access::AccessControl;
use crate::cache::{create_cache, Cache};
use crate::config::{CacheConfig, DeepZoomConfig};
use crate::db::repositories::*;
use crate::db::{create_test_pool, migrations, DynDatabasePool};
use crate::models::{title_case, CurrentUser, Folder, Group, GroupKind, Lecture, Slide, User};
use crate::slide::{AssociatedUpload, SlideStore, SlideUpload, ASSOCIATED_MACRO};

pub(crate) struct Fixture {
    pub pool: DynDatabasePool,
    pub users: Arc<dyn UserRepository>,
    pub sessions: Arc<dyn SessionRepository>,
    pub groups: Arc<dyn GroupRepository>,
    pub folders: Arc<dyn FolderRepository>,
    pub lecture_folders: Arc<dyn FolderRepository>,
    pub slides: Arc<dyn SlideRepository>,
    pub tags: Arc<dyn TagRepository>,
    pub lectures: Arc<dyn LectureRepository>,
    pub annotations: Arc<dyn AnnotationRepository>,
    pub access: Arc<AccessControl>,
    pub cache: Arc<Cache>,
    pub store: SlideStore,
    admin: CurrentUser,
    _media: tempfile::TempDir,
}

impl Fixture {
    pub async fn new() -> Self {
        let pool = create_test_pool().await.expect("Failed to create test pool");
        migrations::run_migrations(&pool)
            .await
            .expect("Failed to run migrations");

        let users = SqlxUserRepository::boxed(pool.clone());
        let sessions = SqlxSessionRepository::boxed(pool.clone());
        let groups = SqlxGroupRepository::boxed(pool.clone());
        let folders = SqlxFolderRepository::boxed(pool.clone(), FolderTable::Slide);
        let lecture_folders = SqlxFolderRepository::boxed(pool.clone(), FolderTable::Lecture);
        let slides = SqlxSlideRepository::boxed(pool.clone());
        let tags = SqlxTagRepository::boxed(pool.clone());
        let lectures = SqlxLectureRepository::boxed(pool.clone());
        let annotations = SqlxAnnotationRepository::boxed(pool.clone());

        let access = Arc::new(AccessControl::new(
            users.clone(),
            groups.clone(),
            folders.clone(),
            lecture_folders.clone(),
            slides.clone(),
            lectures.clone(),
        ));
        let cache = create_cache(&CacheConfig::default())
            .await
            .expect("Failed to create cache");

        let media = tempfile::tempdir().expect("Failed to create media root");
        let store = SlideStore::new(media.path(), DeepZoomConfig::default());

        let mut admin = User::new("admin".to_string(), None, "hash".to_string());
        admin.is_staff = true;
        let admin = users.create(&admin).await.expect("Failed to create admin");
        let admin = access.principal(admin).await.expect("Failed to load admin");

        Self {
            pool,
            users,
            sessions,
            groups,
            folders,
            lecture_folders,
            slides,
            tags,
            lectures,
            annotations,
            access,
            cache,
            store,
            admin,
            _media: media,
        }
    }

    pub async fn admin(&self) -> CurrentUser {
        self.admin.clone()
    }

    pub async fn group(&self, name: &str, kind: GroupKind) -> Group {
        let group = Group {
            id: 0,
            name: name.to_string(),
            kind,
            base_folder_id: None,
            created_at: Utc::now(),
        };
        let group = self.groups.create(&group).await.unwrap();
        self.groups
            .set_permissions(group.id, kind.default_permissions())
            .await
            .unwrap();
        group
    }

    /// Publisher group with its base folder
    pub async fn publisher_group(&self, name: &str) -> Group {
        let mut group = self.group(name, GroupKind::Publisher).await;
        let base = self.folder(&title_case(name), None).await;
        self.groups
            .set_base_folder(group.id, Some(base.id))
            .await
            .unwrap();
        group.base_folder_id = Some(base.id);
        group
    }

    pub async fn member(&self, username: &str, group_ids: &[i64]) -> CurrentUser {
        let user = User::new(username.to_string(), None, "hash".to_string());
        let user = self.users.create(&user).await.unwrap();
        for group_id in group_ids {
            self.groups.add_member(*group_id, user.id).await.unwrap();
        }
        self.access.principal(user).await.unwrap()
    }

    pub async fn reload(&self, user: &CurrentUser) -> CurrentUser {
        self.access
            .principal_by_id(user.id())
            .await
            .unwrap()
            .unwrap()
    }

    pub async fn folder(&self, name: &str, parent_id: Option<i64>) -> Folder {
        self.folders
            .create(&Folder::new(name.to_string(), parent_id, None))
            .await
            .unwrap()
    }

    pub async fn lecture_folder(&self, name: &str, parent_id: Option<i64>) -> Folder {
        self.lecture_folders
            .create(&Folder::new(name.to_string(), parent_id, None))
            .await
            .unwrap()
    }

    pub async fn slide(&self, name: &str, folder_id: Option<i64>, is_public: bool) -> Slide {
        let mut slide = Slide::new(name.to_string(), format!("slides/{}.png", name), None);
        slide.folder_id = folder_id;
        slide.is_public = is_public;
        let mut slide = self.slides.create(&slide).await.unwrap();
        slide.image_root = Slide::image_root_for(slide.id);
        self.slides
            .set_image_root(slide.id, &slide.image_root)
            .await
            .unwrap();
        slide
    }

    pub async fn lecture(&self, name: &str, author: &CurrentUser) -> Lecture {
        self.lectures
            .create(&Lecture::new(name.to_string(), Some(author.id()), None))
            .await
            .unwrap()
    }
}

/// PNG bytes of a solid `width`x`height` image
pub(crate) fn sample_png(width: u32, height: u32) -> Vec<u8> {
    let image: RgbImage = ImageBuffer::from_pixel(width, height, Rgb([180, 40, 90]));
    let mut cursor = Cursor::new(Vec::new());
    DynamicImage::ImageRgb8(image)
        .write_to(&mut cursor, ImageOutputFormat::Png)
        .unwrap();
    cursor.into_inner()
}

/// Upload of a `width`x`height` slide with a macro image and complete
/// vendor properties
pub(crate) fn sample_upload(file_name: &str, width: u32, height: u32) -> SlideUpload {
    let macro_image: RgbImage = ImageBuffer::from_pixel(20, 10, Rgb([0, 0, 255]));
    let mut macro_png = Cursor::new(Vec::new());
    DynamicImage::ImageRgb8(macro_image)
        .write_to(&mut macro_png, ImageOutputFormat::Png)
        .unwrap();

    SlideUpload {
        properties: Some(SAMPLE_PROPERTIES.to_string()),
        associated: vec![AssociatedUpload {
            name: ASSOCIATED_MACRO.to_string(),
            data: macro_png.into_inner(),
        }],
        ..SlideUpload::new(file_name, sample_png(width, height))
    }
}

pub(crate) const SAMPLE_PROPERTIES: &str = "openslide.mpp-x = 0.25\nopenslide.mpp-y = 0.25\nhamamatsu.SourceLens = 40\nhamamatsu.Created = 2021/03/04\n";
