use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// A Todoist task as returned by the REST API.
///
/// Only the fields the server reasons about are typed; everything else the
/// API returns is kept in `extra` so responses round-trip unchanged.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Task {
    pub id: String,
    pub content: String,
    #[serde(default)]
    pub description: String,
    pub project_id: String,
    #[serde(default)]
    pub section_id: Option<String>,
    #[serde(default)]
    pub parent_id: Option<String>,
    #[serde(default)]
    pub labels: Vec<String>,
    /// 1 (normal) to 4 (urgent).
    #[serde(default = "default_priority")]
    pub priority: u8,
    #[serde(default)]
    pub due: Option<Due>,
    #[serde(default)]
    pub deadline: Option<Deadline>,
    #[serde(default)]
    pub checked: bool,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

fn default_priority() -> u8 {
    1
}

/// Due date as interpreted by Todoist. Natural-language parsing happens
/// server-side; this is the echoed result.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Due {
    pub date: String,
    #[serde(default)]
    pub string: Option<String>,
    #[serde(default)]
    pub is_recurring: bool,
    #[serde(default)]
    pub datetime: Option<String>,
    #[serde(default)]
    pub timezone: Option<String>,
    #[serde(default)]
    pub lang: Option<String>,
}

/// Hard deadline, distinct from the due date.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Deadline {
    pub date: String,
    #[serde(default)]
    pub lang: Option<String>,
}

/// Destination for a task move. Todoist applies exactly one of these.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MoveTarget {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub project_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub section_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_id: Option<String>,
}

impl MoveTarget {
    pub fn project(id: impl Into<String>) -> Self {
        Self {
            project_id: Some(id.into()),
            ..Default::default()
        }
    }

    /// Number of destination fields set.
    pub fn destinations(&self) -> usize {
        [&self.project_id, &self.section_id, &self.parent_id]
            .iter()
            .filter(|d| d.is_some())
            .count()
    }
}

/// Filters for `GET /tasks`.
#[derive(Debug, Clone, Default)]
pub struct TaskQuery {
    pub project_id: Option<String>,
    pub section_id: Option<String>,
    pub parent_id: Option<String>,
    pub label: Option<String>,
    pub cursor: Option<String>,
    pub limit: Option<u32>,
}
