use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// A personal label.
///
/// Shared labels (labels on tasks in shared projects that the user does not
/// own) have no id and are only addressable by name through sync commands.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Label {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub color: Option<String>,
    #[serde(default)]
    pub is_favorite: bool,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}
