//! Folder browsing views shared by the slide and lecture databases

use serde::Serialize;

use super::{Folder, Lecture, Slide};

/// Kind of a browsable item. Folders sort before leaf items.
#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq, PartialOrd, Ord)]
#[serde(rename_all = "lowercase")]
pub enum ItemKind {
    Folder,
    Lecture,
    Slide,
}

/// One row in a folder listing
#[derive(Debug, Clone, Serialize)]
pub struct BrowseItem {
    #[serde(rename = "type")]
    pub kind: ItemKind,
    pub id: i64,
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub is_public: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub is_active: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub is_editable: Option<bool>,
}

impl BrowseItem {
    pub fn with_editable(mut self, editable: bool) -> Self {
        self.is_editable = Some(editable);
        self
    }
}

impl From<&Folder> for BrowseItem {
    fn from(folder: &Folder) -> Self {
        Self {
            kind: ItemKind::Folder,
            id: folder.id,
            name: folder.name.clone(),
            is_public: None,
            is_active: None,
            description: None,
            is_editable: None,
        }
    }
}

impl From<&Slide> for BrowseItem {
    fn from(slide: &Slide) -> Self {
        Self {
            kind: ItemKind::Slide,
            id: slide.id,
            name: slide.name.clone(),
            is_public: Some(slide.is_public),
            is_active: None,
            description: Some(slide.information.clone()),
            is_editable: None,
        }
    }
}

impl From<&Lecture> for BrowseItem {
    fn from(lecture: &Lecture) -> Self {
        Self {
            kind: ItemKind::Lecture,
            id: lecture.id,
            name: lecture.name.clone(),
            is_public: None,
            is_active: Some(lecture.is_active),
            description: Some(lecture.description.clone()),
            is_editable: None,
        }
    }
}

/// Sort by kind, then case-insensitively by name
pub fn sort_items(items: &mut [BrowseItem]) {
    items.sort_by(|a, b| {
        a.kind
            .cmp(&b.kind)
            .then_with(|| a.name.to_lowercase().cmp(&b.name.to_lowercase()))
    });
}

/// One step of the path shown above a listing; `id` is `None` for Root
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct Breadcrumb {
    pub id: Option<i64>,
    pub name: String,
}

impl Breadcrumb {
    pub fn root() -> Self {
        Self {
            id: None,
            name: "Root".to_string(),
        }
    }
}

impl From<&Folder> for Breadcrumb {
    fn from(folder: &Folder) -> Self {
        Self {
            id: Some(folder.id),
            name: folder.name.clone(),
        }
    }
}

/// A folder listing
#[derive(Debug, Clone, Serialize)]
pub struct BrowseResult {
    pub current_folder: Option<Folder>,
    pub items: Vec<BrowseItem>,
    pub breadcrumbs: Vec<Breadcrumb>,
    pub editable: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn item(kind: ItemKind, name: &str) -> BrowseItem {
        BrowseItem {
            kind,
            id: 0,
            name: name.to_string(),
            is_public: None,
            is_active: None,
            description: None,
            is_editable: None,
        }
    }

    #[test]
    fn test_sort_items_folders_first_case_insensitive() {
        let mut items = vec![
            item(ItemKind::Slide, "beta"),
            item(ItemKind::Folder, "zeta"),
            item(ItemKind::Slide, "Alpha"),
            item(ItemKind::Folder, "Eta"),
        ];
        sort_items(&mut items);
        let names: Vec<&str> = items.iter().map(|i| i.name.as_str()).collect();
        assert_eq!(names, vec!["Eta", "zeta", "Alpha", "beta"]);
    }

    #[test]
    fn test_item_kind_serializes_as_type() {
        let json = serde_json::to_value(item(ItemKind::Lecture, "x")).unwrap();
        assert_eq!(json["type"], "lecture");
        assert!(json.get("is_public").is_none());
    }
}
