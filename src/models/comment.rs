use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// A comment on a task or project.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Comment {
    pub id: String,
    pub content: String,
    #[serde(default)]
    pub task_id: Option<String>,
    #[serde(default)]
    pub project_id: Option<String>,
    #[serde(default)]
    pub posted_at: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// What a comment is attached to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommentParent {
    Task(String),
    Project(String),
}

impl CommentParent {
    pub fn query_pair(&self) -> (&'static str, &str) {
        match self {
            Self::Task(id) => ("task_id", id),
            Self::Project(id) => ("project_id", id),
        }
    }
}
