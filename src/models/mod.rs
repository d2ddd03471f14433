//! Data models
//!
//! Database entities, request inputs and the derived views returned by the API.

mod annotation;
mod browse;
mod folder;
mod group;
mod lecture;
mod session;
mod slide;
mod tag;
mod user;

pub use annotation::{
    Annotation, CreateAnnotationInput, SaveAnnotationInput, SaveAnnotationOutcome,
    UpdateAnnotationInput,
};
pub use browse::{sort_items, Breadcrumb, BrowseItem, BrowseResult, ItemKind};
pub use folder::{
    CreateFolderInput, Folder, FolderDetail, FolderTree, LectureFolderDetail, UpdateFolderInput,
};
pub use group::{permissions, title_case, CreateGroupInput, Group, GroupKind};
pub use lecture::{
    ActivityToggle, BulletinEntry, ContentInput, CreateLectureInput, Lecture, LectureContent,
    LectureDetail, UpdateLectureInput,
};
pub use session::Session;
pub use slide::{
    CreateSlideInput, IntegrityStatus, Slide, SlideDetail, SlideIntegrityReport, SlideMetadata,
    UpdateSlideInput, METADATA_KEYS,
};
pub use tag::{Tag, TagWithCount};
pub use user::{CurrentUser, UpdateUserInput, User};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer};

/// `%Y-%m-%d %H:%M:%S`, used by detail views
pub fn format_timestamp(dt: &DateTime<Utc>) -> String {
    dt.format("%Y-%m-%d %H:%M:%S").to_string()
}

/// `%Y-%m-%d %H:%M`, used by the lecture activity toggle
pub fn format_timestamp_minutes(dt: &DateTime<Utc>) -> String {
    dt.format("%Y-%m-%d %H:%M").to_string()
}

/// Deserialize a present-but-null field as `Some(None)`.
///
/// Pair with `#[serde(default)]` so an absent field stays `None`.
pub(crate) fn double_option<'de, T, D>(deserializer: D) -> Result<Option<Option<T>>, D::Error>
where
    T: Deserialize<'de>,
    D: Deserializer<'de>,
{
    Option::<T>::deserialize(deserializer).map(Some)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_timestamp_formats() {
        let dt = Utc.with_ymd_and_hms(2024, 3, 9, 14, 5, 7).unwrap();
        assert_eq!(format_timestamp(&dt), "2024-03-09 14:05:07");
        assert_eq!(format_timestamp_minutes(&dt), "2024-03-09 14:05");
    }
}
