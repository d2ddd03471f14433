//! Lecture model
//!
//! A lecture is an ordered list of slides, each optionally pinned to one of
//! that slide's annotations, shared with a set of groups.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{format_timestamp, format_timestamp_minutes};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Lecture {
    pub id: i64,
    pub name: String,
    pub description: String,
    pub author_id: Option<i64>,
    pub folder_id: Option<i64>,
    /// Inactive lectures are visible only to their editors
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Lecture {
    pub fn new(name: String, author_id: Option<i64>, folder_id: Option<i64>) -> Self {
        let now = Utc::now();
        Self {
            id: 0,
            name,
            description: String::new(),
            author_id,
            folder_id,
            is_active: false,
            created_at: now,
            updated_at: now,
        }
    }
}

/// One step of a lecture
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LectureContent {
    pub id: i64,
    pub lecture_id: i64,
    /// Position within the lecture (unique per lecture)
    pub order: i64,
    pub slide_id: i64,
    pub annotation_id: Option<i64>,
}

/// Content entry as submitted by clients. Without an explicit `order` the
/// list position is used.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct ContentInput {
    pub slide_id: i64,
    #[serde(default)]
    pub annotation_id: Option<i64>,
    #[serde(default)]
    pub order: Option<i64>,
}

impl ContentInput {
    pub fn new(slide_id: i64, annotation_id: Option<i64>) -> Self {
        Self {
            slide_id,
            annotation_id,
            order: None,
        }
    }

    /// Stored order for the entry at `index`
    pub fn position(&self, index: usize) -> i64 {
        self.order.unwrap_or(index as i64)
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct CreateLectureInput {
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub folder_id: Option<i64>,
    #[serde(default)]
    pub group_ids: Vec<i64>,
    #[serde(default)]
    pub is_active: bool,
    #[serde(default)]
    pub contents: Vec<ContentInput>,
}

/// Partial lecture update; `contents`, when present, replaces all contents
#[derive(Debug, Clone, Default, Deserialize)]
pub struct UpdateLectureInput {
    pub name: Option<String>,
    pub description: Option<String>,
    #[serde(default, deserialize_with = "super::double_option")]
    pub folder_id: Option<Option<i64>>,
    pub group_ids: Option<Vec<i64>>,
    pub is_active: Option<bool>,
    pub contents: Option<Vec<ContentInput>>,
}

/// Lecture detail with derived display fields
#[derive(Debug, Clone, Serialize)]
pub struct LectureDetail {
    #[serde(flatten)]
    pub lecture: Lecture,
    pub folder_name: Option<String>,
    pub group_ids: Vec<i64>,
    pub group_names: Vec<String>,
    pub created_at_formatted: String,
    pub updated_at_formatted: String,
    pub slides_count: i64,
    pub contents: Vec<LectureContent>,
}

impl LectureDetail {
    pub fn new(
        lecture: Lecture,
        folder_name: Option<String>,
        groups: Vec<(i64, String)>,
        contents: Vec<LectureContent>,
    ) -> Self {
        let (group_ids, group_names) = groups.into_iter().unzip();
        Self {
            folder_name,
            group_ids,
            group_names,
            created_at_formatted: format_timestamp(&lecture.created_at),
            updated_at_formatted: format_timestamp(&lecture.updated_at),
            slides_count: contents.len() as i64,
            contents,
            lecture,
        }
    }
}

/// Lecture as listed on the bulletin board
#[derive(Debug, Clone, Serialize)]
pub struct BulletinEntry {
    #[serde(flatten)]
    pub lecture: Lecture,
    pub is_editable: bool,
}

/// Response of the activity toggle
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ActivityToggle {
    pub is_active: bool,
    pub updated_at_formatted: String,
}

impl ActivityToggle {
    pub fn from_lecture(lecture: &Lecture) -> Self {
        Self {
            is_active: lecture.is_active,
            updated_at_formatted: format_timestamp_minutes(&lecture.updated_at),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lecture_new_inactive() {
        let lecture = Lecture::new("Renal pathology".to_string(), Some(1), None);
        assert!(!lecture.is_active);
        assert_eq!(lecture.id, 0);
    }

    #[test]
    fn test_detail_counts_contents() {
        let lecture = Lecture::new("L".to_string(), None, None);
        let contents = vec![
            LectureContent {
                id: 1,
                lecture_id: 1,
                order: 0,
                slide_id: 4,
                annotation_id: None,
            },
            LectureContent {
                id: 2,
                lecture_id: 1,
                order: 1,
                slide_id: 5,
                annotation_id: Some(9),
            },
        ];
        let detail = LectureDetail::new(
            lecture,
            Some("Renal".to_string()),
            vec![(1, "students".to_string()), (2, "residents".to_string())],
            contents,
        );
        assert_eq!(detail.slides_count, 2);
        assert_eq!(detail.group_names, vec!["students", "residents"]);
        assert_eq!(detail.group_ids, vec![1, 2]);
    }

    #[test]
    fn test_activity_toggle_format() {
        let lecture = Lecture::new("L".to_string(), None, None);
        let toggle = ActivityToggle::from_lecture(&lecture);
        assert_eq!(toggle.updated_at_formatted.len(), "2024-01-01 00:00".len());
    }

    #[test]
    fn test_content_input_annotation_optional() {
        let input: ContentInput = serde_json::from_str(r#"{"slide_id": 3}"#).unwrap();
        assert_eq!(input.annotation_id, None);
    }
}
