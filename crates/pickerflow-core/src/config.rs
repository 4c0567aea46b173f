//! Picker configuration types.

use std::path::Path;

use derive_builder::Builder;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::ConfigError;

/// How selected items are copied into the upload location.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CopyMode {
    /// Items are not copied.
    #[default]
    #[serde(rename = "none")]
    Disabled,
    /// The copy response is the final metadata.
    Immediate,
    /// The copy returns a task that is polled until it finishes.
    Sync,
    /// The copy returns a task that is reported without waiting for it.
    Async,
}

impl CopyMode {
    /// Check if selections are copied at all.
    pub fn is_enabled(&self) -> bool {
        !matches!(self, Self::Disabled)
    }

    /// Check if the copy request asks the server for a task handle.
    pub fn returns_task(&self) -> bool {
        matches!(self, Self::Sync | Self::Async)
    }
}

impl std::fmt::Display for CopyMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Disabled => write!(f, "none"),
            Self::Immediate => write!(f, "immediate"),
            Self::Sync => write!(f, "sync"),
            Self::Async => write!(f, "async"),
        }
    }
}

/// Destination for copied items.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum UploadLocation {
    /// A folder in a specific account.
    Folder { account: String, folder: String },
    /// A drop URI resolved by the service.
    Uri { uri: String },
}

/// Configuration of the picker.
#[derive(Debug, Clone, Builder, Serialize, Deserialize)]
#[builder(setter(into), build_fn(validate = "Self::validate"))]
pub struct PickerConfig {
    /// API base URL, e.g. `https://api.example.com`.
    pub base_url: String,

    /// API version path segment.
    #[builder(default = "default_api_version()")]
    #[serde(default = "default_api_version")]
    pub api_version: String,

    /// Identifier echoed in every host message.
    #[builder(default)]
    #[serde(default)]
    pub exp_id: Option<String>,

    /// Copy selections into the upload location.
    #[builder(default)]
    #[serde(default)]
    pub copy_to_upload_location: CopyMode,

    /// Create a shareable link for each selected file.
    #[builder(default = "false")]
    #[serde(default)]
    pub link: bool,

    /// Options sent with every link request.
    #[builder(default)]
    #[serde(default)]
    pub link_options: Map<String, Value>,

    /// Where copies go.
    #[builder(default)]
    #[serde(default)]
    pub upload_location: Option<UploadLocation>,

    /// Selectable item types (`all`, `files`, `folders`, ...).
    #[builder(default = "default_types()")]
    #[serde(default = "default_types")]
    pub types: Vec<String>,

    /// Maximum number of item requests in flight.
    #[builder(default = "4")]
    #[serde(default = "default_concurrency_limit")]
    pub concurrency_limit: usize,

    /// Delay between task status requests in milliseconds.
    #[builder(default = "3000")]
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
}

fn default_api_version() -> String {
    "v0".to_string()
}

fn default_types() -> Vec<String> {
    vec!["all".to_string()]
}

fn default_concurrency_limit() -> usize {
    4
}

fn default_poll_interval_ms() -> u64 {
    3000
}

impl PickerConfigBuilder {
    fn validate(&self) -> Result<(), String> {
        match self.base_url {
            Some(ref url) if url.trim().is_empty() => {
                return Err("Base URL cannot be empty".to_string());
            }
            None => return Err("Base URL is required".to_string()),
            _ => {}
        }
        if self.concurrency_limit == Some(0) {
            return Err("Concurrency limit must be at least 1".to_string());
        }
        let copy_enabled = self.copy_to_upload_location.is_some_and(|m| m.is_enabled());
        let has_location = matches!(self.upload_location, Some(Some(_)));
        if copy_enabled && !has_location {
            return Err("Copying requires an upload location".to_string());
        }
        Ok(())
    }
}

impl PickerConfig {
    /// Create a new picker config builder.
    pub fn builder() -> PickerConfigBuilder {
        PickerConfigBuilder::default()
    }

    /// Load and validate a JSON config file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let config: Self = serde_json::from_str(&raw).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Check that the values are consistent.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.base_url.trim().is_empty() {
            return Err(ConfigError::invalid("Base URL cannot be empty"));
        }
        if self.concurrency_limit == 0 {
            return Err(ConfigError::invalid("Concurrency limit must be at least 1"));
        }
        if self.copy_to_upload_location.is_enabled() && self.upload_location.is_none() {
            return Err(ConfigError::invalid("Copying requires an upload location"));
        }
        Ok(())
    }

    /// Build an account-scoped API URL.
    ///
    /// `category` is the API area (`storage`, `tasks`) and `path` starts
    /// with a slash.
    pub fn account_url(&self, account_id: &str, category: &str, path: &str) -> String {
        format!(
            "{}/{}/accounts/{}/{}{}",
            self.base_url.trim_end_matches('/'),
            self.api_version,
            account_id,
            category,
            path
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_builder_defaults() {
        let config = PickerConfig::builder()
            .base_url("https://api.example.com")
            .build()
            .unwrap();

        assert_eq!(config.api_version, "v0");
        assert_eq!(config.concurrency_limit, 4);
        assert_eq!(config.poll_interval_ms, 3000);
        assert_eq!(config.copy_to_upload_location, CopyMode::Disabled);
        assert!(!config.link);
    }

    #[test]
    fn test_builder_rejects_copy_without_location() {
        let result = PickerConfig::builder()
            .base_url("https://api.example.com")
            .copy_to_upload_location(CopyMode::Sync)
            .build();
        assert!(result.is_err());

        let config = PickerConfig::builder()
            .base_url("https://api.example.com")
            .copy_to_upload_location(CopyMode::Sync)
            .upload_location(UploadLocation::Uri {
                uri: "drop://target".to_string(),
            })
            .build()
            .unwrap();
        assert!(config.copy_to_upload_location.returns_task());
    }

    #[test]
    fn test_builder_rejects_zero_concurrency() {
        let result = PickerConfig::builder()
            .base_url("https://api.example.com")
            .concurrency_limit(0usize)
            .build();
        assert!(result.is_err());
    }

    #[test]
    fn test_upload_location_shapes() {
        let folder: UploadLocation =
            serde_json::from_str(r#"{"account": "12", "folder": "F9"}"#).unwrap();
        assert_eq!(
            folder,
            UploadLocation::Folder {
                account: "12".to_string(),
                folder: "F9".to_string()
            }
        );

        let uri: UploadLocation = serde_json::from_str(r#"{"uri": "drop://x"}"#).unwrap();
        assert!(matches!(uri, UploadLocation::Uri { .. }));
    }

    #[test]
    fn test_copy_mode_names() {
        let mode: CopyMode = serde_json::from_str("\"none\"").unwrap();
        assert_eq!(mode, CopyMode::Disabled);
        let mode: CopyMode = serde_json::from_str("\"async\"").unwrap();
        assert_eq!(mode, CopyMode::Async);
        assert!(!CopyMode::Immediate.returns_task());
        assert_eq!(CopyMode::Sync.to_string(), "sync");
    }

    #[test]
    fn test_account_url() {
        let config = PickerConfig::builder()
            .base_url("https://api.example.com/")
            .build()
            .unwrap();

        assert_eq!(
            config.account_url("42", "tasks", "/T1"),
            "https://api.example.com/v0/accounts/42/tasks/T1"
        );
    }
}
