//! Error types shared across pickerflow.

use std::path::PathBuf;

use thiserror::Error;

/// A confirmation or save that was refused before any request was made.
///
/// The display text is the user-facing message sent to the host.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum ValidationError {
    /// Nothing was selected.
    #[error("No file or folder was selected")]
    NoSelection,

    /// The target folder does not accept uploads.
    #[error("Files cannot be saved to this folder")]
    CannotUploadHere,

    /// Copying the whole account is not allowed.
    #[error("The root folder cannot be copied")]
    ForbidRootFolderCopy,
}

/// Errors loading or validating a picker configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Config file could not be read.
    #[error("Failed to read config {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Config file is not valid JSON for a picker config.
    #[error("Failed to parse config {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    /// Config values are inconsistent.
    #[error("Invalid configuration: {message}")]
    Invalid { message: String },
}

impl ConfigError {
    /// Create an invalid configuration error.
    pub fn invalid(message: impl Into<String>) -> Self {
        Self::Invalid {
            message: message.into(),
        }
    }
}
