//! Copies into the upload location.

use std::sync::Arc;

use pickerflow_core::{CopyMode, Credentials, PickerConfig, SelectionKind, UploadLocation};
use serde_json::{json, Map, Value};
use thiserror::Error;
use tracing::{debug, error, warn};

use crate::api::{ApiError, CopyRequest, PickerApi};
use crate::operation::ItemOutcome;
use crate::poll::TaskPoller;

/// Errors from a copy.
#[derive(Debug, Clone, Error)]
pub enum CopyError {
    /// The copy request itself failed.
    #[error(transparent)]
    Api(#[from] ApiError),

    /// The copy task finished in a failure state.
    #[error("Task {task_id} failed")]
    TaskFailed { task_id: String, payload: Value },
}

impl CopyError {
    /// Error payload recorded on the selection.
    pub fn payload(&self) -> Value {
        match self {
            Self::Api(e) => e.payload(),
            Self::TaskFailed { payload, .. } => payload.clone(),
        }
    }
}

/// Copies selected items into the configured upload location.
pub struct CopyDispatcher {
    api: Arc<dyn PickerApi>,
    poller: Arc<dyn TaskPoller>,
    mode: CopyMode,
    target: Option<UploadLocation>,
    link: bool,
    link_options: Map<String, Value>,
}

impl CopyDispatcher {
    /// Create a copy dispatcher from the picker configuration.
    pub fn new(api: Arc<dyn PickerApi>, poller: Arc<dyn TaskPoller>, config: &PickerConfig) -> Self {
        Self {
            api,
            poller,
            mode: config.copy_to_upload_location,
            target: config.upload_location.clone(),
            link: config.link,
            link_options: config.link_options.clone(),
        }
    }

    /// Describe the copy request for one item.
    pub fn request(&self, item_id: &str, kind: SelectionKind) -> CopyRequest {
        let mut body = Map::new();
        body.insert("account".to_string(), json!("upload_location"));
        match self.target {
            Some(UploadLocation::Folder {
                ref account,
                ref folder,
            }) => {
                body.insert("drop_account".to_string(), json!(account));
                body.insert("parent_id".to_string(), json!(folder));
            }
            Some(UploadLocation::Uri { ref uri }) => {
                body.insert("drop_uri".to_string(), json!(uri));
            }
            None => {}
        }

        CopyRequest {
            item_id: item_id.to_string(),
            kind,
            return_task: self.mode.returns_task(),
            link: kind.is_file().then_some(self.link),
            link_options: kind.is_file().then(|| self.link_options.clone()),
            async_hint: kind.is_folder(),
            body: Value::Object(body),
        }
    }

    /// Copy one item and return its new metadata.
    pub async fn copy(
        &self,
        item_id: &str,
        kind: SelectionKind,
        credentials: &Credentials,
    ) -> Result<Value, CopyError> {
        let request = self.request(item_id, kind);
        let response = self.api.copy(credentials, &request).await?;

        if self.mode != CopyMode::Sync {
            return Ok(response);
        }

        let task_id = response
            .get("id")
            .and_then(|id| match id {
                Value::String(s) => Some(s.clone()),
                Value::Number(n) => Some(n.to_string()),
                _ => None,
            })
            .ok_or_else(|| ApiError::decode("copy response has no task id"))?;

        debug!(item_id, %task_id, "Polling copy task");
        let status = self.poller.poll(&task_id, credentials).await.map_err(|e| {
            error!(%task_id, error = %e, "Task status request failed");
            CopyError::Api(e)
        })?;

        if status.is_failure() {
            return Err(CopyError::TaskFailed {
                task_id,
                payload: status.error_payload(),
            });
        }
        Ok(status.result_metadata())
    }

    /// Copy one item and turn the result into an item outcome.
    pub async fn run(&self, item_id: &str, kind: SelectionKind, credentials: &Credentials) -> ItemOutcome {
        match self.copy(item_id, kind, credentials).await {
            Ok(metadata) => ItemOutcome::Copied(metadata),
            Err(e) => {
                warn!(item_id, %kind, error = %e, "Error copying to upload location");
                ItemOutcome::Failed(e.payload())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::{ApiResult, BoxFuture};
    use crate::poll::TaskStatus;

    struct Unused;

    impl PickerApi for Unused {
        fn create_link<'a>(&'a self, _: &'a Credentials, _: Value) -> BoxFuture<'a, ApiResult<Value>> {
            Box::pin(async { Ok(Value::Null) })
        }
        fn copy<'a>(&'a self, _: &'a Credentials, _: &'a CopyRequest) -> BoxFuture<'a, ApiResult<Value>> {
            Box::pin(async { Ok(Value::Null) })
        }
        fn task_status<'a>(&'a self, _: &'a Credentials, _: &'a str) -> BoxFuture<'a, ApiResult<Value>> {
            Box::pin(async { Ok(Value::Null) })
        }
        fn save_file<'a>(&'a self, _: &'a Credentials, _: Value, _: bool) -> BoxFuture<'a, ApiResult<Value>> {
            Box::pin(async { Ok(Value::Null) })
        }
    }

    impl TaskPoller for Unused {
        fn poll<'a>(&'a self, _: &'a str, _: &'a Credentials) -> BoxFuture<'a, ApiResult<TaskStatus>> {
            Box::pin(async { Ok(TaskStatus::new(Value::Null)) })
        }
    }

    fn dispatcher(mode: CopyMode, target: UploadLocation) -> CopyDispatcher {
        let config = PickerConfig::builder()
            .base_url("https://api.example.com")
            .copy_to_upload_location(mode)
            .upload_location(target)
            .link(true)
            .build()
            .unwrap();
        CopyDispatcher::new(Arc::new(Unused), Arc::new(Unused), &config)
    }

    #[test]
    fn test_folder_target_body() {
        let copier = dispatcher(
            CopyMode::Immediate,
            UploadLocation::Folder {
                account: "5".to_string(),
                folder: "F".to_string(),
            },
        );
        let request = copier.request("item", SelectionKind::File);

        assert_eq!(
            request.body,
            json!({"account": "upload_location", "drop_account": "5", "parent_id": "F"})
        );
        assert!(!request.return_task);
        assert_eq!(request.link, Some(true));
        assert!(!request.async_hint);
    }

    #[test]
    fn test_uri_target_and_folder_hint() {
        let copier = dispatcher(
            CopyMode::Async,
            UploadLocation::Uri {
                uri: "drop://x".to_string(),
            },
        );
        let request = copier.request("dir", SelectionKind::Folder);

        assert_eq!(
            request.body,
            json!({"account": "upload_location", "drop_uri": "drop://x"})
        );
        assert!(request.return_task);
        assert!(request.async_hint);
        assert!(request.link.is_none());
        assert!(request.link_options.is_none());
    }
}
