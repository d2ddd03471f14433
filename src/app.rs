//! Application wiring shared by the server and the integrity CLI

use anyhow::Result;
use std::sync::Arc;

use crate::api::AppState;
use crate::cache::create_cache;
use crate::config::Config;
use crate::db::{
    self,
    repositories::{
        FolderTable, SqlxAnnotationRepository, SqlxFolderRepository, SqlxGroupRepository,
        SqlxLectureRepository, SqlxSessionRepository, SqlxSlideRepository, SqlxTagRepository,
        SqlxUserRepository,
    },
};
use crate::services::{
    AccessControl, AnnotationService, FolderService, GroupService, LectureFolderService,
    LectureService, LoginRateLimiter, SlideService, TagService, UserService,
};
use crate::slide::SlideStore;

/// Connect to the database, run migrations and build every service
pub async fn build_state(config: &Config) -> Result<AppState> {
    let pool = db::create_pool(&config.database).await?;
    tracing::info!("Database connected: {}", config.database.url);

    db::migrations::run_migrations(&pool).await?;
    tracing::info!("Database migrations completed");

    let cache = create_cache(&config.cache).await?;
    tracing::info!("Cache initialized");

    // Create repositories
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

    std::fs::create_dir_all(&config.media.root)?;
    let store = SlideStore::new(&config.media.root, config.deepzoom.clone());
    tracing::info!("Media root: {}", config.media.root.display());

    Ok(AppState {
        user_service: Arc::new(UserService::new(
            users.clone(),
            sessions,
            access.clone(),
            &config.auth,
        )),
        group_service: Arc::new(GroupService::new(
            groups.clone(),
            users,
            folders.clone(),
            lecture_folders.clone(),
            access.clone(),
            cache.clone(),
        )),
        folder_service: Arc::new(FolderService::new(
            folders,
            slides.clone(),
            access.clone(),
            cache.clone(),
        )),
        slide_service: Arc::new(SlideService::new(
            slides.clone(),
            tags.clone(),
            annotations.clone(),
            access.clone(),
            store,
            config.media.clone(),
        )),
        tag_service: Arc::new(TagService::new(tags, slides.clone(), access.clone())),
        lecture_folder_service: Arc::new(LectureFolderService::new(
            lecture_folders.clone(),
            lectures.clone(),
            access.clone(),
            cache,
        )),
        lecture_service: Arc::new(LectureService::new(
            lectures,
            lecture_folders,
            slides.clone(),
            annotations.clone(),
            groups,
            access.clone(),
        )),
        annotation_service: Arc::new(AnnotationService::new(annotations, slides, access)),
        auth_config: Arc::new(config.auth.clone()),
        media_config: Arc::new(config.media.clone()),
        rate_limiter: Arc::new(LoginRateLimiter::new()),
    })
}
