//! Slide model
//!
//! A slide is an uploaded whole-slide image plus the state derived from it:
//! the Deep Zoom pyramid under `image_root`, a thumbnail, the macro image and
//! extracted metadata.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::format_timestamp;

/// Keys that a valid metadata object must carry
pub const METADATA_KEYS: [&str; 4] = ["mpp-x", "mpp-y", "sourceLens", "created"];

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Slide {
    pub id: i64,
    pub name: String,
    /// Path of the original file, relative to the media root (`slides/...`)
    pub file: String,
    pub information: String,
    /// Directory of derived images, relative to the media root (`images/<id>`)
    pub image_root: String,
    /// Extracted metadata; kept as raw JSON so corrupt values can be detected
    pub metadata: Option<serde_json::Value>,
    pub is_public: bool,
    pub author_id: Option<i64>,
    pub folder_id: Option<i64>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Slide {
    pub fn new(name: String, file: String, author_id: Option<i64>) -> Self {
        let now = Utc::now();
        Self {
            id: 0,
            name,
            file,
            information: String::new(),
            image_root: String::new(),
            metadata: None,
            is_public: false,
            author_id,
            folder_id: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Relative image directory for a slide id
    pub fn image_root_for(id: i64) -> String {
        format!("images/{}", id)
    }

    /// Original file name without the `slides/` prefix
    pub fn file_name(&self) -> &str {
        self.file.rsplit('/').next().unwrap_or(&self.file)
    }

    /// Whether the stored metadata carries every required key
    pub fn metadata_valid(&self) -> bool {
        match &self.metadata {
            Some(serde_json::Value::Object(map)) => {
                METADATA_KEYS.iter().all(|key| map.contains_key(*key))
            }
            _ => false,
        }
    }
}

/// Metadata extracted from vendor slide properties
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SlideMetadata {
    /// Microns per pixel along X
    #[serde(rename = "mpp-x")]
    pub mpp_x: f64,
    #[serde(rename = "mpp-y")]
    pub mpp_y: f64,
    /// Objective magnification
    #[serde(rename = "sourceLens")]
    pub source_lens: i64,
    /// Acquisition date as written by the scanner
    pub created: String,
}

/// Result of checking a slide's derived state
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct IntegrityStatus {
    pub needs_repair: bool,
    pub file_exists: bool,
    pub dzi_exists: bool,
    pub tiles_complete: bool,
    pub thumbnail_exists: bool,
    pub associated_image_exists: bool,
    pub metadata_valid: bool,
}

impl IntegrityStatus {
    /// Build a status; `needs_repair` is derived from the individual checks
    pub fn new(
        file_exists: bool,
        dzi_exists: bool,
        tiles_complete: bool,
        thumbnail_exists: bool,
        associated_image_exists: bool,
        metadata_valid: bool,
    ) -> Self {
        let needs_repair = !(file_exists
            && dzi_exists
            && tiles_complete
            && thumbnail_exists
            && associated_image_exists
            && metadata_valid);
        Self {
            needs_repair,
            file_exists,
            dzi_exists,
            tiles_complete,
            thumbnail_exists,
            associated_image_exists,
            metadata_valid,
        }
    }

    /// Whether any derived image is missing
    pub fn images_incomplete(&self) -> bool {
        !(self.dzi_exists
            && self.tiles_complete
            && self.thumbnail_exists
            && self.associated_image_exists)
    }
}

/// A slide that failed its integrity check
#[derive(Debug, Clone, Serialize)]
pub struct SlideIntegrityReport {
    pub id: i64,
    pub name: String,
    pub status: IntegrityStatus,
}

/// Fields accepted when creating a slide; the file arrives separately
#[derive(Debug, Clone, Default, Deserialize)]
pub struct CreateSlideInput {
    pub name: String,
    #[serde(default)]
    pub information: String,
    #[serde(default)]
    pub folder_id: Option<i64>,
    #[serde(default)]
    pub is_public: bool,
}

/// Editable slide fields; changing them never reprocesses the file
#[derive(Debug, Clone, Default, Deserialize)]
pub struct UpdateSlideInput {
    pub name: Option<String>,
    pub information: Option<String>,
    #[serde(default, deserialize_with = "super::double_option")]
    pub folder_id: Option<Option<i64>>,
    pub is_public: Option<bool>,
}

/// Slide detail with derived display fields
#[derive(Debug, Clone, Serialize)]
pub struct SlideDetail {
    #[serde(flatten)]
    pub slide: Slide,
    /// Full path of the containing folder, or `-`
    pub folder_name: String,
    pub file_name: String,
    pub created_at_formatted: String,
    pub updated_at_formatted: String,
    pub tags: Vec<String>,
    pub editable: bool,
}

impl SlideDetail {
    pub fn new(slide: Slide, folder_path: Option<String>, tags: Vec<String>, editable: bool) -> Self {
        Self {
            folder_name: folder_path.unwrap_or_else(|| "-".to_string()),
            file_name: slide.file_name().to_string(),
            created_at_formatted: format_timestamp(&slide.created_at),
            updated_at_formatted: format_timestamp(&slide.updated_at),
            tags,
            editable,
            slide,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn slide_with_metadata(metadata: Option<serde_json::Value>) -> Slide {
        let mut slide = Slide::new("CMU-1".to_string(), "slides/CMU-1.svs".to_string(), None);
        slide.metadata = metadata;
        slide
    }

    #[test]
    fn test_file_name() {
        let slide = slide_with_metadata(None);
        assert_eq!(slide.file_name(), "CMU-1.svs");
        assert_eq!(Slide::image_root_for(12), "images/12");
    }

    #[test]
    fn test_metadata_valid_requires_all_keys() {
        let full = json!({"mpp-x": 0.25, "mpp-y": 0.25, "sourceLens": 20, "created": "2020/01/01"});
        assert!(slide_with_metadata(Some(full)).metadata_valid());

        let partial = json!({"mpp-x": 0.25, "mpp-y": 0.25, "sourceLens": 20});
        assert!(!slide_with_metadata(Some(partial)).metadata_valid());

        assert!(!slide_with_metadata(Some(json!("corrupt"))).metadata_valid());
        assert!(!slide_with_metadata(None).metadata_valid());
    }

    #[test]
    fn test_metadata_serializes_with_vendor_keys() {
        let metadata = SlideMetadata {
            mpp_x: 0.499,
            mpp_y: 0.5,
            source_lens: 20,
            created: "2009/12/29".to_string(),
        };
        let value = serde_json::to_value(&metadata).unwrap();
        assert_eq!(value["mpp-x"], json!(0.499));
        assert_eq!(value["sourceLens"], json!(20));
        assert!(slide_with_metadata(Some(value)).metadata_valid());
    }

    #[test]
    fn test_integrity_status_needs_repair() {
        let healthy = IntegrityStatus::new(true, true, true, true, true, true);
        assert!(!healthy.needs_repair);
        assert!(!healthy.images_incomplete());

        let no_thumb = IntegrityStatus::new(true, true, true, false, true, true);
        assert!(no_thumb.needs_repair);
        assert!(no_thumb.images_incomplete());

        let bad_metadata = IntegrityStatus::new(true, true, true, true, true, false);
        assert!(bad_metadata.needs_repair);
        assert!(!bad_metadata.images_incomplete());
    }

    #[test]
    fn test_update_input_folder_null() {
        let input: UpdateSlideInput = serde_json::from_str(r#"{"folder_id": null}"#).unwrap();
        assert_eq!(input.folder_id, Some(None));
    }
}
