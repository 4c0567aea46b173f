//! Per-item operation types.

use pickerflow_core::{Selection, SelectionKind};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// What to do with one selected item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OperationKind {
    /// Mint a shareable link.
    CreateLink,
    /// Copy the item into the upload location.
    Copy(SelectionKind),
}

/// A queued unit of work for one selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingOperation {
    /// Index of the selection this operation resolves.
    pub index: usize,
    /// The request to issue.
    pub kind: OperationKind,
}

impl PendingOperation {
    /// Create a link operation.
    pub fn create_link(index: usize) -> Self {
        Self {
            index,
            kind: OperationKind::CreateLink,
        }
    }

    /// Create a copy operation.
    pub fn copy(index: usize, kind: SelectionKind) -> Self {
        Self {
            index,
            kind: OperationKind::Copy(kind),
        }
    }
}

/// How one operation resolved.
#[derive(Debug, Clone, PartialEq)]
pub enum ItemOutcome {
    /// A link was created.
    Linked(String),
    /// The item was copied; holds the metadata that replaces the selection.
    Copied(Value),
    /// The request or task failed; holds the error payload.
    Failed(Value),
}

impl ItemOutcome {
    /// Check if the operation succeeded.
    pub fn is_success(&self) -> bool {
        !matches!(self, Self::Failed(_))
    }

    /// Write the outcome onto its selection.
    pub fn apply_to(self, selection: &mut Selection) {
        match self {
            Self::Linked(url) => selection.link = Some(url),
            Self::Copied(metadata) => *selection = selection.replaced_by(metadata),
            Self::Failed(error) => selection.error = Some(error),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_outcome_writes_matching_field() {
        let mut selection = Selection::file("1", "a.txt");

        ItemOutcome::Linked("https://x/1".to_string()).apply_to(&mut selection);
        assert_eq!(selection.link.as_deref(), Some("https://x/1"));
        assert!(selection.error.is_none());

        ItemOutcome::Failed(json!({"code": 403})).apply_to(&mut selection);
        assert_eq!(selection.error, Some(json!({"code": 403})));
    }

    #[test]
    fn test_copy_replaces_selection() {
        let mut selection = Selection::file("1", "a.txt");
        let metadata = json!({"id": "copy-1", "name": "a.txt", "type": "file", "account": 9});

        ItemOutcome::Copied(metadata.clone()).apply_to(&mut selection);
        assert_eq!(serde_json::to_value(&selection).unwrap(), metadata);
    }

    #[test]
    fn test_operation_constructors() {
        let op = PendingOperation::copy(2, SelectionKind::Folder);
        assert_eq!(op.index, 2);
        assert_eq!(op.kind, OperationKind::Copy(SelectionKind::Folder));
        assert!(!ItemOutcome::Failed(Value::Null).is_success());
    }
}
