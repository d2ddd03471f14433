//! Folder model
//!
//! Slide folders and lecture folders share this shape. Each tree is rooted at
//! a base folder (no parent); the base folder decides who may edit the tree.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::format_timestamp;

/// A node in a folder hierarchy
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Folder {
    pub id: i64,
    pub name: String,
    pub parent_id: Option<i64>,
    pub author_id: Option<i64>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Folder {
    pub fn new(name: String, parent_id: Option<i64>, author_id: Option<i64>) -> Self {
        let now = Utc::now();
        Self {
            id: 0,
            name,
            parent_id,
            author_id,
            created_at: now,
            updated_at: now,
        }
    }

    /// Base folders have no parent
    pub fn is_base_folder(&self) -> bool {
        self.parent_id.is_none()
    }
}

/// Folder tree node as returned by the tree endpoints
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FolderTree {
    /// `None` only for the synthetic Root node shown to administrators
    pub id: Option<i64>,
    pub name: String,
    pub subfolders: Vec<FolderTree>,
}

impl FolderTree {
    /// Wrap base folder trees in a synthetic `Root` node
    pub fn root(subfolders: Vec<FolderTree>) -> Self {
        Self {
            id: None,
            name: "Root".to_string(),
            subfolders,
        }
    }

    /// Number of nodes in this tree, including itself
    pub fn total_count(&self) -> usize {
        1 + self.subfolders.iter().map(|c| c.total_count()).sum::<usize>()
    }
}

/// Input for creating a folder
#[derive(Debug, Clone, Deserialize)]
pub struct CreateFolderInput {
    pub name: String,
    #[serde(default)]
    pub parent_id: Option<i64>,
}

impl CreateFolderInput {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            parent_id: None,
        }
    }

    pub fn with_parent(mut self, parent_id: i64) -> Self {
        self.parent_id = Some(parent_id);
        self
    }
}

/// Input for renaming or moving a folder
#[derive(Debug, Clone, Default, Deserialize)]
pub struct UpdateFolderInput {
    pub name: Option<String>,
    /// `Some(None)` moves the folder to the top level
    #[serde(default, deserialize_with = "super::double_option")]
    pub parent_id: Option<Option<i64>>,
}

/// Folder detail with derived display fields
#[derive(Debug, Clone, Serialize)]
pub struct FolderDetail {
    #[serde(flatten)]
    pub folder: Folder,
    /// Full path of the parent folder, or `-` at the top level
    pub parent_path: String,
    pub created_at_formatted: String,
    pub updated_at_formatted: String,
    pub subfolders_count: i64,
    pub slides_count: i64,
}

impl FolderDetail {
    pub fn new(folder: Folder, parent_path: Option<String>, subfolders: i64, slides: i64) -> Self {
        Self {
            parent_path: parent_path.unwrap_or_else(|| "-".to_string()),
            created_at_formatted: format_timestamp(&folder.created_at),
            updated_at_formatted: format_timestamp(&folder.updated_at),
            subfolders_count: subfolders,
            slides_count: slides,
            folder,
        }
    }
}

/// Lecture folder detail with derived display fields
#[derive(Debug, Clone, Serialize)]
pub struct LectureFolderDetail {
    #[serde(flatten)]
    pub folder: Folder,
    pub parent_name: Option<String>,
    pub created_at_formatted: String,
    pub updated_at_formatted: String,
    pub subfolders_count: i64,
    pub lectures_count: i64,
}

impl LectureFolderDetail {
    pub fn new(folder: Folder, parent_name: Option<String>, subfolders: i64, lectures: i64) -> Self {
        Self {
            parent_name,
            created_at_formatted: format_timestamp(&folder.created_at),
            updated_at_formatted: format_timestamp(&folder.updated_at),
            subfolders_count: subfolders,
            lectures_count: lectures,
            folder,
        }
    }
}
