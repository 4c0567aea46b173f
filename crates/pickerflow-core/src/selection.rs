//! Selected remote items.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Identifier the storage service uses for an account's top level folder.
pub const ROOT_FOLDER_ID: &str = "root";

/// Kind of a selected item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SelectionKind {
    #[default]
    File,
    Folder,
}

impl SelectionKind {
    /// Check if this is a file.
    pub fn is_file(&self) -> bool {
        matches!(self, Self::File)
    }

    /// Check if this is a folder.
    pub fn is_folder(&self) -> bool {
        matches!(self, Self::Folder)
    }

    /// Path segment the storage API uses for this kind.
    pub fn collection(&self) -> &'static str {
        match self {
            Self::File => "files",
            Self::Folder => "folders",
        }
    }
}

impl std::fmt::Display for SelectionKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::File => write!(f, "file"),
            Self::Folder => write!(f, "folder"),
        }
    }
}

/// A file or folder chosen by the user.
///
/// Service metadata that pickerflow does not interpret is kept in `extra`
/// and written back untouched when the selection is reported.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Selection {
    /// Service identifier of the item.
    pub id: String,
    /// Display name.
    pub name: String,
    /// File or folder.
    #[serde(rename = "type", default)]
    pub kind: SelectionKind,
    /// Server error payload, set when an operation on this item failed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<Value>,
    /// Shareable link, set when link creation succeeded.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub link: Option<String>,
    /// Metadata of the copy, set when a copy to the upload location succeeded.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Value>,
    /// Remaining service fields.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Selection {
    /// Create a selection with no extra metadata.
    pub fn new(id: impl Into<String>, name: impl Into<String>, kind: SelectionKind) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            kind,
            error: None,
            link: None,
            metadata: None,
            extra: Map::new(),
        }
    }

    /// Create a file selection.
    pub fn file(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self::new(id, name, SelectionKind::File)
    }

    /// Create a folder selection.
    pub fn folder(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self::new(id, name, SelectionKind::Folder)
    }

    /// Check if this selection is the account's root folder.
    pub fn is_root_folder(&self) -> bool {
        self.kind.is_folder() && self.id == ROOT_FOLDER_ID
    }

    /// The item as the service now describes it, e.g. after a copy.
    ///
    /// `metadata` replaces this selection. Id, name and type it does not
    /// carry are kept from this selection. A value that is not an object
    /// is stored in `metadata` instead.
    pub fn replaced_by(&self, metadata: Value) -> Selection {
        let Value::Object(fields) = metadata else {
            return Selection {
                metadata: Some(metadata),
                ..self.clone()
            };
        };

        let mut merged = Map::new();
        merged.insert("id".to_string(), Value::String(self.id.clone()));
        merged.insert("name".to_string(), Value::String(self.name.clone()));
        merged.insert("type".to_string(), Value::String(self.kind.to_string()));
        merged.extend(fields.clone());

        serde_json::from_value(Value::Object(merged)).unwrap_or_else(|_| Selection {
            metadata: Some(Value::Object(fields)),
            ..self.clone()
        })
    }
}

/// Where a list of selections came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SelectionOrigin {
    /// Items picked in the file list.
    Chosen,
    /// The folder being browsed, confirmed with nothing picked.
    CurrentFolder,
}

/// Turn what the user chose in the browser into the list to confirm.
///
/// When nothing was chosen and folders may be picked, the folder currently
/// being browsed becomes the only selection.
pub fn collect_selections(
    chosen: Vec<Selection>,
    current_folder: Option<Selection>,
    types: &[String],
) -> (Vec<Selection>, SelectionOrigin) {
    if !chosen.is_empty() {
        return (chosen, SelectionOrigin::Chosen);
    }

    let folders_allowed = types.iter().any(|t| t == "all" || t == "folders");
    match current_folder {
        Some(mut folder) if folders_allowed => {
            folder.kind = SelectionKind::Folder;
            (vec![folder], SelectionOrigin::CurrentFolder)
        }
        _ => (Vec::new(), SelectionOrigin::Chosen),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_selection_keeps_service_fields() {
        let raw = json!({
            "id": "F1",
            "name": "report.pdf",
            "type": "file",
            "size": 1024,
            "mime_type": "application/pdf"
        });

        let selection: Selection = serde_json::from_value(raw.clone()).unwrap();
        assert_eq!(selection.kind, SelectionKind::File);
        assert_eq!(selection.extra.get("size"), Some(&json!(1024)));

        let back = serde_json::to_value(&selection).unwrap();
        assert_eq!(back, raw);
    }

    #[test]
    fn test_root_folder_detection() {
        assert!(Selection::folder("root", "My Drive").is_root_folder());
        assert!(!Selection::folder("abc", "Docs").is_root_folder());
        assert!(!Selection::file("root", "odd name").is_root_folder());
    }

    #[test]
    fn test_collect_prefers_chosen_items() {
        let chosen = vec![Selection::file("1", "a.txt")];
        let current = Some(Selection::folder("dir", "Docs"));
        let types = vec!["all".to_string()];

        let (result, origin) = collect_selections(chosen.clone(), current, &types);
        assert_eq!(result, chosen);
        assert_eq!(origin, SelectionOrigin::Chosen);
    }

    #[test]
    fn test_collect_falls_back_to_current_folder() {
        let current = Some(Selection::new("dir", "Docs", SelectionKind::File));

        let (result, origin) = collect_selections(vec![], current.clone(), &["folders".to_string()]);
        assert_eq!(result.len(), 1);
        assert!(result[0].kind.is_folder());
        assert_eq!(origin, SelectionOrigin::CurrentFolder);

        let (result, _) = collect_selections(vec![], current, &["files".to_string()]);
        assert!(result.is_empty());
    }

    #[test]
    fn test_replaced_by_takes_service_metadata() {
        let mut original = Selection::file("F1", "a.txt");
        original.extra.insert("size".to_string(), json!(3));

        let metadata = json!({ "id": "NEW1", "name": "a.txt", "type": "file", "parent": { "id": "drop" } });
        let replaced = original.replaced_by(metadata.clone());
        assert_eq!(serde_json::to_value(&replaced).unwrap(), metadata);

        let handle = original.replaced_by(json!({ "id": "T5", "state": "PENDING" }));
        assert_eq!(handle.id, "T5");
        assert_eq!(handle.name, "a.txt");
        assert_eq!(handle.extra.get("state"), Some(&json!("PENDING")));
        assert!(handle.extra.get("size").is_none());

        let odd = original.replaced_by(json!("done"));
        assert_eq!(odd.id, "F1");
        assert_eq!(odd.metadata, Some(json!("done")));
    }
}
