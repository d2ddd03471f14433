//! Tag model

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Free-form slide label
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Tag {
    pub id: i64,
    /// Tag name (unique, at most 100 characters)
    pub name: String,
    pub created_by: i64,
    pub created_at: DateTime<Utc>,
}

impl Tag {
    pub fn new(name: String, created_by: i64) -> Self {
        Self {
            id: 0,
            name,
            created_by,
            created_at: Utc::now(),
        }
    }
}

/// Tag with the number of slides carrying it
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TagWithCount {
    #[serde(flatten)]
    pub tag: Tag,
    pub slide_count: i64,
}
