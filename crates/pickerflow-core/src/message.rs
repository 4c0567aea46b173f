//! Messages reported to the embedding host.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use strum::{Display, EnumString};

use crate::{Selection, ValidationError};

/// Value of the `type` field of every host message.
pub const HOST_MESSAGE_TYPE: &str = "explorer";

/// What happened.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, EnumString)]
#[serde(rename_all = "camelCase")]
#[strum(serialize_all = "camelCase")]
pub enum Action {
    /// Files were chosen; follow-up operations may still run.
    Selected,
    /// The confirmation or save finished without item failures.
    Success,
    /// Some item failed, or the request was refused up front.
    Error,
    /// The user cancelled.
    Cancel,
    /// A save of one file started.
    StartFileUpload,
    /// A save of one file finished.
    FinishFileUpload,
}

/// A single report to the host.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HostMessage {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exp_id: Option<String>,
    #[serde(rename = "type")]
    pub kind: String,
    pub action: Action,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl HostMessage {
    /// Create a message with optional data.
    pub fn new(exp_id: Option<String>, action: Action, data: Option<Value>) -> Self {
        Self {
            exp_id,
            kind: HOST_MESSAGE_TYPE.to_string(),
            action,
            data,
        }
    }

    /// Create a message carrying a list of selections.
    pub fn selections(exp_id: Option<String>, action: Action, selections: &[Selection]) -> Self {
        let data = serde_json::to_value(selections).unwrap_or(Value::Array(Vec::new()));
        Self::new(exp_id, action, Some(data))
    }

    /// Create the error message for a refused request.
    pub fn validation(exp_id: Option<String>, error: ValidationError) -> Self {
        Self::new(exp_id, Action::Error, Some(Value::String(error.to_string())))
    }

    /// Decode the data back into selections, if it holds any.
    pub fn selection_data(&self) -> Option<Vec<Selection>> {
        self.data
            .as_ref()
            .and_then(|data| serde_json::from_value(data.clone()).ok())
    }
}
