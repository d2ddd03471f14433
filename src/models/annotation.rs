//! Annotation model

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Viewer drawing attached to a slide; `data` is opaque to the server
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Annotation {
    pub id: i64,
    pub name: String,
    pub description: String,
    pub data: serde_json::Value,
    pub author_id: i64,
    pub slide_id: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Annotation {
    pub fn new(name: String, author_id: i64, slide_id: i64, data: serde_json::Value) -> Self {
        let now = Utc::now();
        Self {
            id: 0,
            name,
            description: String::new(),
            data,
            author_id,
            slide_id,
            created_at: now,
            updated_at: now,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct CreateAnnotationInput {
    pub slide_id: i64,
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub data: serde_json::Value,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct UpdateAnnotationInput {
    pub name: Option<String>,
    pub description: Option<String>,
    pub data: Option<serde_json::Value>,
}

/// Viewer save request: updates `annotation_id` when given, creates otherwise
#[derive(Debug, Clone, Deserialize)]
pub struct SaveAnnotationInput {
    #[serde(default, alias = "annotationId")]
    pub annotation_id: Option<i64>,
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub data: serde_json::Value,
}

/// Outcome of a viewer save, reported back as a message
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct SaveAnnotationOutcome {
    pub success: bool,
    pub message: String,
    pub annotation_id: Option<i64>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_save_input_accepts_camel_case_id() {
        let input: SaveAnnotationInput =
            serde_json::from_str(r#"{"annotationId": 4, "name": "ROI"}"#).unwrap();
        assert_eq!(input.annotation_id, Some(4));
        assert!(input.data.is_null());
    }
}
