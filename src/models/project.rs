use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// A Todoist project.
///
/// Projects nest through `parent_id` and hold sections and tasks.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Project {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub parent_id: Option<String>,
    #[serde(default)]
    pub color: Option<String>,
    #[serde(default)]
    pub is_favorite: bool,
    #[serde(default)]
    pub is_archived: bool,
    #[serde(default)]
    pub view_style: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// A section grouping tasks inside a project.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Section {
    pub id: String,
    pub project_id: String,
    pub name: String,
    #[serde(default)]
    pub section_order: Option<i64>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}
