use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::TodoistError;

/// Per-command failure reported inside `sync_status`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SyncError {
    #[serde(default)]
    pub error: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_code: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_tag: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub http_code: Option<u16>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_extra: Option<Value>,
}

impl SyncError {
    /// Status for a submitted command the server did not report on.
    pub fn indeterminate(uuid: &str) -> Self {
        Self {
            error: format!("no status returned for command {}", uuid),
            error_tag: Some("INDETERMINATE".to_string()),
            ..Default::default()
        }
    }

    pub fn message(&self) -> String {
        if self.error.is_empty() {
            match self.error_tag {
                Some(ref tag) => tag.clone(),
                None => "sync command failed".to_string(),
            }
        } else {
            self.error.clone()
        }
    }

    pub fn into_error(self, uuid: &str) -> TodoistError {
        TodoistError::Sync {
            uuid: uuid.to_string(),
            message: self.message(),
            code: self.error_code,
        }
    }
}

/// Outcome of one command: the literal string `"ok"` or an error object.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(from = "RawStatus", into = "RawStatus")]
pub enum CommandStatus {
    Ok,
    Failed(SyncError),
}

#[derive(Serialize, Deserialize)]
#[serde(untagged)]
enum RawStatus {
    Text(String),
    Error(SyncError),
}

impl From<RawStatus> for CommandStatus {
    fn from(raw: RawStatus) -> Self {
        match raw {
            RawStatus::Text(text) if text == "ok" => Self::Ok,
            RawStatus::Text(text) => Self::Failed(SyncError {
                error: text,
                ..Default::default()
            }),
            RawStatus::Error(err) => Self::Failed(err),
        }
    }
}

impl From<CommandStatus> for RawStatus {
    fn from(status: CommandStatus) -> Self {
        match status {
            CommandStatus::Ok => Self::Text("ok".to_string()),
            CommandStatus::Failed(err) => Self::Error(err),
        }
    }
}

/// Body returned by `POST /sync`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SyncResponse {
    #[serde(default)]
    pub sync_status: HashMap<String, CommandStatus>,
    #[serde(default)]
    pub temp_id_mapping: HashMap<String, String>,
    #[serde(default)]
    pub full_sync: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sync_token: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reminders: Option<Vec<Value>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reminders_location: Option<Vec<Value>>,
}

impl SyncResponse {
    /// Result of the command with this uuid. A uuid missing from
    /// `sync_status` is a failure, never an implicit success.
    pub fn command_result(&self, uuid: &str) -> Result<(), SyncError> {
        match self.sync_status.get(uuid) {
            Some(CommandStatus::Ok) => Ok(()),
            Some(CommandStatus::Failed(err)) => Err(err.clone()),
            None => Err(SyncError::indeterminate(uuid)),
        }
    }

    /// Real id assigned to a temp id, if the server created the entity.
    pub fn resolve_temp_id(&self, temp_id: &str) -> Option<&str> {
        self.temp_id_mapping.get(temp_id).map(String::as_str)
    }
}
