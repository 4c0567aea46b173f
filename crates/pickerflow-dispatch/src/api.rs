//! Storage API seam.
//!
//! [`PickerApi`] is the only place requests leave the process. The
//! dispatcher builds request descriptions and hands them over; [`HttpApi`]
//! sends them with reqwest.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use pickerflow_core::{Credentials, PickerConfig, SelectionKind};
use reqwest::header::AUTHORIZATION;
use serde_json::{json, Map, Value};
use thiserror::Error;
use tracing::debug;
use url::Url;

use crate::ASYNC_HEADER;

/// Type alias for boxed futures returned by async API methods.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Result type for API calls.
pub type ApiResult<T> = Result<T, ApiError>;

/// Errors returned by a storage API call.
#[derive(Debug, Clone, Error)]
pub enum ApiError {
    /// The server answered with a non-2xx status.
    #[error("Request failed with status {status}")]
    Status { status: u16, body: Option<Value> },

    /// The request never got an answer.
    #[error("Request failed: {message}")]
    Transport { message: String },

    /// The answer could not be understood.
    #[error("Invalid response: {message}")]
    Decode { message: String },

    /// The request URL could not be built.
    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),
}

impl ApiError {
    /// Create a transport error.
    pub fn transport(message: impl Into<String>) -> Self {
        Self::Transport {
            message: message.into(),
        }
    }

    /// Create a decode error.
    pub fn decode(message: impl Into<String>) -> Self {
        Self::Decode {
            message: message.into(),
        }
    }

    /// Error payload recorded on a failed selection.
    ///
    /// The server's own error body when there is one, otherwise a small
    /// object describing the failure.
    pub fn payload(&self) -> Value {
        match self {
            Self::Status {
                body: Some(body), ..
            } => body.clone(),
            Self::Status { status, body: None } => json!({
                "status_code": status,
                "message": self.to_string(),
            }),
            _ => json!({ "message": self.to_string() }),
        }
    }
}

/// A copy of one item into the upload location.
#[derive(Debug, Clone, PartialEq)]
pub struct CopyRequest {
    /// Service id of the item being copied.
    pub item_id: String,
    /// File or folder.
    pub kind: SelectionKind,
    /// Ask the server for a task handle instead of final metadata.
    pub return_task: bool,
    /// Link flag for file copies.
    pub link: Option<bool>,
    /// Link options for file copies.
    pub link_options: Option<Map<String, Value>>,
    /// Ask the server to process the copy asynchronously.
    pub async_hint: bool,
    /// JSON body naming the destination.
    pub body: Value,
}

/// Requests the dispatcher needs from the storage service.
pub trait PickerApi: Send + Sync {
    /// `POST storage/links/`.
    fn create_link<'a>(&'a self, credentials: &'a Credentials, body: Value) -> BoxFuture<'a, ApiResult<Value>>;

    /// `POST storage/{files|folders}/{id}/copy`.
    fn copy<'a>(&'a self, credentials: &'a Credentials, request: &'a CopyRequest) -> BoxFuture<'a, ApiResult<Value>>;

    /// `GET tasks/{id}`.
    fn task_status<'a>(&'a self, credentials: &'a Credentials, task_id: &'a str) -> BoxFuture<'a, ApiResult<Value>>;

    /// `POST storage/files/?overwrite=..`.
    fn save_file<'a>(
        &'a self,
        credentials: &'a Credentials,
        body: Value,
        overwrite: bool,
    ) -> BoxFuture<'a, ApiResult<Value>>;
}

/// [`PickerApi`] over HTTP.
///
/// The client has no request timeout: a slow server stalls only the
/// request waiting on it.
#[derive(Debug, Clone)]
pub struct HttpApi {
    client: reqwest::Client,
    config: Arc<PickerConfig>,
}

impl HttpApi {
    /// Create an API client for a configuration.
    pub fn new(config: Arc<PickerConfig>) -> Self {
        Self::with_client(reqwest::Client::new(), config)
    }

    /// Create an API client that reuses an existing reqwest client.
    pub fn with_client(client: reqwest::Client, config: Arc<PickerConfig>) -> Self {
        Self { client, config }
    }

    fn url(&self, credentials: &Credentials, category: &str, path: &str) -> ApiResult<Url> {
        let raw = self
            .config
            .account_url(&credentials.account_id, category, path);
        Ok(Url::parse(&raw)?)
    }

    async fn send(&self, request: reqwest::RequestBuilder, credentials: &Credentials) -> ApiResult<Value> {
        let response = request
            .header(AUTHORIZATION, credentials.authorization())
            .send()
            .await
            .map_err(|e| ApiError::transport(e.to_string()))?;

        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|e| ApiError::transport(e.to_string()))?;

        if !status.is_success() {
            return Err(ApiError::Status {
                status: status.as_u16(),
                body: serde_json::from_str(&text).ok(),
            });
        }

        if text.trim().is_empty() {
            return Ok(Value::Null);
        }
        serde_json::from_str(&text).map_err(|e| ApiError::decode(e.to_string()))
    }
}

impl PickerApi for HttpApi {
    fn create_link<'a>(&'a self, credentials: &'a Credentials, body: Value) -> BoxFuture<'a, ApiResult<Value>> {
        Box::pin(async move {
            let url = self.url(credentials, "storage", "/links/")?;
            debug!(%url, "Creating link");
            self.send(self.client.post(url).json(&body), credentials).await
        })
    }

    fn copy<'a>(&'a self, credentials: &'a Credentials, request: &'a CopyRequest) -> BoxFuture<'a, ApiResult<Value>> {
        Box::pin(async move {
            let path = format!("/{}/{}/copy", request.kind.collection(), request.item_id);
            let mut url = self.url(credentials, "storage", &path)?;

            let mut query = Vec::new();
            if request.return_task {
                query.push(("return_type", "task".to_string()));
            }
            if let Some(link) = request.link {
                query.push(("link", link.to_string()));
            }
            if let Some(ref options) = request.link_options {
                let encoded = serde_json::to_string(options).map_err(|e| ApiError::decode(e.to_string()))?;
                query.push(("link_options", encoded));
            }
            if !query.is_empty() {
                url.query_pairs_mut().extend_pairs(query);
            }

            debug!(%url, "Copying item");
            let mut builder = self.client.post(url).json(&request.body);
            if request.async_hint {
                builder = builder.header(ASYNC_HEADER, "true");
            }
            self.send(builder, credentials).await
        })
    }

    fn task_status<'a>(&'a self, credentials: &'a Credentials, task_id: &'a str) -> BoxFuture<'a, ApiResult<Value>> {
        Box::pin(async move {
            let url = self.url(credentials, "tasks", &format!("/{task_id}"))?;
            self.send(self.client.get(url), credentials).await
        })
    }

    fn save_file<'a>(
        &'a self,
        credentials: &'a Credentials,
        body: Value,
        overwrite: bool,
    ) -> BoxFuture<'a, ApiResult<Value>> {
        Box::pin(async move {
            let mut url = self.url(credentials, "storage", "/files/")?;
            url.query_pairs_mut()
                .append_pair("overwrite", if overwrite { "true" } else { "false" });
            debug!(%url, "Saving file");
            self.send(self.client.post(url).json(&body), credentials).await
        })
    }
}
