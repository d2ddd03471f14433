//! Groups, group profiles and permission codenames

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Permission codenames, `app.action_model`
pub mod permissions {
    pub const ADD_FOLDER: &str = "database.add_folder";
    pub const CHANGE_FOLDER: &str = "database.change_folder";
    pub const DELETE_FOLDER: &str = "database.delete_folder";
    pub const VIEW_FOLDER: &str = "database.view_folder";
    pub const ADD_SLIDE: &str = "database.add_slide";
    pub const CHANGE_SLIDE: &str = "database.change_slide";
    pub const DELETE_SLIDE: &str = "database.delete_slide";
    pub const VIEW_SLIDE: &str = "database.view_slide";
    pub const ADD_TAG: &str = "database.add_tag";
    pub const CHANGE_TAG: &str = "database.change_tag";
    pub const DELETE_TAG: &str = "database.delete_tag";
    pub const VIEW_TAG: &str = "database.view_tag";

    pub const ADD_LECTUREFOLDER: &str = "lectures.add_lecturefolder";
    pub const CHANGE_LECTUREFOLDER: &str = "lectures.change_lecturefolder";
    pub const DELETE_LECTUREFOLDER: &str = "lectures.delete_lecturefolder";
    pub const VIEW_LECTUREFOLDER: &str = "lectures.view_lecturefolder";
    pub const ADD_LECTURE: &str = "lectures.add_lecture";
    pub const CHANGE_LECTURE: &str = "lectures.change_lecture";
    pub const DELETE_LECTURE: &str = "lectures.delete_lecture";
    pub const VIEW_LECTURE: &str = "lectures.view_lecture";
    pub const ADD_LECTURECONTENT: &str = "lectures.add_lecturecontent";
    pub const CHANGE_LECTURECONTENT: &str = "lectures.change_lecturecontent";
    pub const DELETE_LECTURECONTENT: &str = "lectures.delete_lecturecontent";
    pub const VIEW_LECTURECONTENT: &str = "lectures.view_lecturecontent";

    pub const ADD_ANNOTATION: &str = "slide_viewer.add_annotation";
    pub const CHANGE_ANNOTATION: &str = "slide_viewer.change_annotation";
    pub const DELETE_ANNOTATION: &str = "slide_viewer.delete_annotation";
    pub const VIEW_ANNOTATION: &str = "slide_viewer.view_annotation";

    pub const ALL: &[&str] = &[
        ADD_FOLDER,
        CHANGE_FOLDER,
        DELETE_FOLDER,
        VIEW_FOLDER,
        ADD_SLIDE,
        CHANGE_SLIDE,
        DELETE_SLIDE,
        VIEW_SLIDE,
        ADD_TAG,
        CHANGE_TAG,
        DELETE_TAG,
        VIEW_TAG,
        ADD_LECTUREFOLDER,
        CHANGE_LECTUREFOLDER,
        DELETE_LECTUREFOLDER,
        VIEW_LECTUREFOLDER,
        ADD_LECTURE,
        CHANGE_LECTURE,
        DELETE_LECTURE,
        VIEW_LECTURE,
        ADD_LECTURECONTENT,
        CHANGE_LECTURECONTENT,
        DELETE_LECTURECONTENT,
        VIEW_LECTURECONTENT,
        ADD_ANNOTATION,
        CHANGE_ANNOTATION,
        DELETE_ANNOTATION,
        VIEW_ANNOTATION,
    ];

    /// Permissions granted to viewer groups on creation
    pub const VIEWER_DEFAULTS: &[&str] =
        &[VIEW_SLIDE, VIEW_LECTURE, VIEW_LECTURECONTENT, VIEW_ANNOTATION];

    pub fn is_known(codename: &str) -> bool {
        ALL.contains(&codename)
    }
}

/// Group profile type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GroupKind {
    /// Owns a base folder and may publish slides and lectures
    Publisher,
    /// Read access to what publishers share with it
    Viewer,
}

impl GroupKind {
    /// Stored integer code
    pub fn code(&self) -> i64 {
        match self {
            GroupKind::Publisher => 1,
            GroupKind::Viewer => 2,
        }
    }

    pub fn from_code(code: i64) -> anyhow::Result<Self> {
        match code {
            1 => Ok(GroupKind::Publisher),
            2 => Ok(GroupKind::Viewer),
            _ => Err(anyhow::anyhow!("Invalid group kind code: {}", code)),
        }
    }

    /// Permissions assigned to a new group of this kind
    pub fn default_permissions(&self) -> &'static [&'static str] {
        match self {
            GroupKind::Publisher => permissions::ALL,
            GroupKind::Viewer => permissions::VIEWER_DEFAULTS,
        }
    }
}

impl fmt::Display for GroupKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GroupKind::Publisher => write!(f, "publisher"),
            GroupKind::Viewer => write!(f, "viewer"),
        }
    }
}

impl FromStr for GroupKind {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "publisher" | "1" => Ok(GroupKind::Publisher),
            "viewer" | "2" => Ok(GroupKind::Viewer),
            _ => Err(anyhow::anyhow!("Invalid group kind: {}", s)),
        }
    }
}

/// A user group together with its profile
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Group {
    pub id: i64,
    pub name: String,
    pub kind: GroupKind,
    /// Root folder owned by a publisher group
    pub base_folder_id: Option<i64>,
    pub created_at: DateTime<Utc>,
}

/// Input for creating a group
#[derive(Debug, Clone, Deserialize)]
pub struct CreateGroupInput {
    pub name: String,
    pub kind: GroupKind,
}

/// Capitalise the first letter of every word and lowercase the rest.
///
/// Any non-alphabetic character starts a new word, so `"path_lab"` becomes
/// `"Path_Lab"`.
pub fn title_case(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut at_word_start = true;
    for c in s.chars() {
        if c.is_alphabetic() {
            if at_word_start {
                out.extend(c.to_uppercase());
            } else {
                out.extend(c.to_lowercase());
            }
            at_word_start = false;
        } else {
            out.push(c);
            at_word_start = true;
        }
    }
    out
}
