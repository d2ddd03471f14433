//! Services layer - Business logic
//!
//! This module contains all business logic services for the slide server.
//! Services are responsible for:
//! - Enforcing permissions and ownership rules
//! - Coordinating between repositories, the slide store and the cache
//! - Handling validation and error cases

pub mod access;
pub mod annotation;
pub mod folder;
pub mod group;
pub mod lecture;
pub mod lecture_folder;
pub mod password;
pub mod rate_limiter;
pub mod slide;
pub mod tag;
pub mod user;

#[cfg(test)]
pub(crate) mod test_support;

pub use access::{join_path, AccessControl};
pub use annotation::{AnnotationDetail, AnnotationService, AnnotationServiceError, ViewerContext};
pub use folder::{FolderItems, FolderService, FolderServiceError};
pub use group::{GroupService, GroupServiceError};
pub use lecture::{LectureService, LectureServiceError, LectureView};
pub use lecture_folder::{LectureFolderService, LectureFolderServiceError};
pub use password::{hash_password, verify_password};
pub use rate_limiter::LoginRateLimiter;
pub use slide::{SlideService, SlideServiceError};
pub use tag::{TagService, TagServiceError};
pub use user::{HomeSummary, LoginInput, RegisterInput, UserService, UserServiceError};
