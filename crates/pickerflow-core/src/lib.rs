//! Core types and configuration for pickerflow.
//!
//! This crate provides the data structures shared by the dispatcher and the
//! command line front end: selections, account credentials, picker
//! configuration and the messages reported to the embedding host.

mod config;
mod credentials;
mod error;
mod message;
mod selection;

pub use config::{CopyMode, PickerConfig, PickerConfigBuilder, UploadLocation};
pub use credentials::Credentials;
pub use error::{ConfigError, ValidationError};
pub use message::{Action, HostMessage, HOST_MESSAGE_TYPE};
pub use selection::{collect_selections, Selection, SelectionKind, SelectionOrigin, ROOT_FOLDER_ID};
