//! Saving files into a folder of the active account.

use std::sync::Arc;

use pickerflow_core::{Action, Credentials, HostMessage, ValidationError};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tokio::sync::{mpsc, Mutex};
use tracing::{debug, warn};

use crate::api::PickerApi;
use crate::launcher::ThrottledLauncher;

/// A file to save, fetched by the service from `url`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SaveFile {
    pub url: String,
    pub name: String,
}

/// The folder files are saved into.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TargetFolder {
    pub id: String,
    #[serde(default)]
    pub can_upload_files: bool,
    /// Names already present in the folder.
    #[serde(default)]
    pub children: Vec<String>,
}

/// Files to save and where.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SaveRequest {
    pub files: Vec<SaveFile>,
    pub folder: TargetFolder,
    /// Name typed by the user; replaces every file's own name when set.
    #[serde(default)]
    pub name: Option<String>,
}

impl SaveRequest {
    /// Name `file` will be saved under.
    pub fn target_name<'a>(&'a self, file: &'a SaveFile) -> &'a str {
        self.name
            .as_deref()
            .filter(|name| !name.is_empty())
            .unwrap_or(&file.name)
    }

    /// First target name that already exists in the folder.
    pub fn colliding_name(&self) -> Option<&str> {
        self.files
            .iter()
            .map(|file| self.target_name(file))
            .find(|name| self.folder.children.iter().any(|child| child == name))
    }
}

/// How a save ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SaveOutcome {
    /// Refused before any request; an error message was sent.
    Rejected(ValidationError),
    /// Every file was attempted and a success message sent.
    Finished { saved: usize, failed: usize },
}

#[derive(Debug, Default)]
struct SaveState {
    saves: Vec<Value>,
    failed: usize,
}

/// One save attempt.
///
/// Saves are not affected by cancels: once a file is written the service
/// already has it.
pub(crate) struct SaveSession {
    api: Arc<dyn PickerApi>,
    credentials: Credentials,
    exp_id: Option<String>,
    host: mpsc::Sender<HostMessage>,
    state: Mutex<SaveState>,
}

impl SaveSession {
    pub(crate) fn new(
        api: Arc<dyn PickerApi>,
        credentials: Credentials,
        exp_id: Option<String>,
        host: mpsc::Sender<HostMessage>,
    ) -> Self {
        Self {
            api,
            credentials,
            exp_id,
            host,
            state: Mutex::new(SaveState::default()),
        }
    }

    pub(crate) async fn run(self: Arc<Self>, request: SaveRequest, overwrite: bool, limit: usize) -> SaveOutcome {
        let mut launcher = ThrottledLauncher::new();
        for file in &request.files {
            launcher.enqueue(SaveFile {
                url: file.url.clone(),
                name: request.target_name(file).to_string(),
            });
        }

        let parent_id = Arc::new(request.folder.id.clone());
        let session = Arc::clone(&self);
        launcher
            .run(limit, move |file| {
                let session = Arc::clone(&session);
                let parent_id = Arc::clone(&parent_id);
                async move { session.save_one(file, &parent_id, overwrite).await }
            })
            .await;

        let (saves, failed) = {
            let mut state = self.state.lock().await;
            (std::mem::take(&mut state.saves), state.failed)
        };
        let saved = saves.len();
        debug!(saved, failed, "Save finished");

        self.send(Action::Success, Value::Array(saves)).await;
        SaveOutcome::Finished { saved, failed }
    }

    async fn save_one(&self, file: SaveFile, parent_id: &str, overwrite: bool) {
        let event = json!({ "name": file.name, "url": file.url });
        self.send(Action::StartFileUpload, event.clone()).await;

        let body = json!({ "url": file.url, "parent_id": parent_id, "name": file.name });
        match self.api.save_file(&self.credentials, body, overwrite).await {
            Ok(metadata) => {
                self.state.lock().await.saves.push(metadata.clone());
                let mut event = event;
                event["metadata"] = metadata;
                self.send(Action::FinishFileUpload, event).await;
            }
            Err(e) => {
                warn!(name = %file.name, error = %e, "Error uploading file");
                self.state.lock().await.failed += 1;
            }
        }
    }

    async fn send(&self, action: Action, data: Value) {
        let message = HostMessage::new(self.exp_id.clone(), action, Some(data));
        let _ = self.host.send(message).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(name: Option<&str>) -> SaveRequest {
        SaveRequest {
            files: vec![
                SaveFile {
                    url: "https://src/1".to_string(),
                    name: "one.txt".to_string(),
                },
                SaveFile {
                    url: "https://src/2".to_string(),
                    name: "two.txt".to_string(),
                },
            ],
            folder: TargetFolder {
                id: "F".to_string(),
                can_upload_files: true,
                children: vec!["two.txt".to_string(), "typed.txt".to_string()],
            },
            name: name.map(str::to_string),
        }
    }

    #[test]
    fn test_colliding_name_uses_file_names() {
        assert_eq!(request(None).colliding_name(), Some("two.txt"));
    }

    #[test]
    fn test_typed_name_overrides() {
        let req = request(Some("typed.txt"));
        assert_eq!(req.target_name(&req.files[0]), "typed.txt");
        assert_eq!(req.colliding_name(), Some("typed.txt"));

        let req = request(Some("fresh.txt"));
        assert_eq!(req.colliding_name(), None);

        let req = request(Some(""));
        assert_eq!(req.target_name(&req.files[0]), "one.txt");
    }
}
