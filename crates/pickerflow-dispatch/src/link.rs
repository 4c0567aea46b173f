//! Shareable link creation.

use std::sync::Arc;

use pickerflow_core::Credentials;
use serde_json::{Map, Value};
use tracing::warn;

use crate::api::{ApiError, ApiResult, PickerApi};
use crate::operation::ItemOutcome;

/// Mints a shareable link for one selected file.
pub struct LinkCreator {
    api: Arc<dyn PickerApi>,
    options: Map<String, Value>,
}

impl LinkCreator {
    /// Create a link creator sending `options` with every request.
    pub fn new(api: Arc<dyn PickerApi>, options: Map<String, Value>) -> Self {
        Self { api, options }
    }

    /// Request a link for an item and return its URL.
    pub async fn create_link(&self, item_id: &str, credentials: &Credentials) -> ApiResult<String> {
        let mut body = self.options.clone();
        body.insert("file_id".to_string(), Value::String(item_id.to_string()));

        let response = self.api.create_link(credentials, Value::Object(body)).await?;
        response
            .get("url")
            .and_then(Value::as_str)
            .map(str::to_string)
            .ok_or_else(|| ApiError::decode("link response has no url"))
    }

    /// Request a link and turn the result into an item outcome.
    pub async fn run(&self, item_id: &str, credentials: &Credentials) -> ItemOutcome {
        match self.create_link(item_id, credentials).await {
            Ok(url) => ItemOutcome::Linked(url),
            Err(e) => {
                warn!(item_id, error = %e, "Error creating link");
                ItemOutcome::Failed(e.payload())
            }
        }
    }
}
