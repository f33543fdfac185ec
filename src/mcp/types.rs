//! Request and response types for MCP tools.

use rmcp::schemars::JsonSchema;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};

use crate::client::RateLimitStatus;

// ============================================================
// Request Types
// ============================================================

/// Keep an explicit `null` as `Some(Value::Null)`; only an absent field is `None`.
fn present_value<'de, D>(deserializer: D) -> Result<Option<Value>, D::Error>
where
    D: Deserializer<'de>,
{
    Value::deserialize(deserializer).map(Some)
}

#[derive(Debug, Deserialize, JsonSchema)]
pub struct TaskIdRequest {
    #[schemars(description = "The Todoist task id")]
    pub task_id: String,
}

#[derive(Debug, Default, Deserialize, JsonSchema)]
pub struct ListTasksRequest {
    #[schemars(description = "Only tasks in this project")]
    #[serde(default)]
    pub project_id: Option<String>,
    #[schemars(description = "Only tasks in this section")]
    #[serde(default)]
    pub section_id: Option<String>,
    #[schemars(description = "Only subtasks of this task")]
    #[serde(default)]
    pub parent_id: Option<String>,
    #[schemars(description = "Only tasks carrying this label name")]
    #[serde(default)]
    pub label: Option<String>,
    #[schemars(
        description = "Todoist filter expression such as 'today | overdue'. When set, the other filters are ignored."
    )]
    #[serde(default)]
    pub filter: Option<String>,
    #[schemars(description = "Cursor returned by a previous call")]
    #[serde(default)]
    pub cursor: Option<String>,
    #[schemars(description = "Page size (the API caps this at 200)")]
    #[serde(default)]
    pub limit: Option<u32>,
    #[schemars(description = "Follow cursors and return every page. Ignores cursor.")]
    #[serde(default)]
    pub all: bool,
}

/// Fields of a new task. Serialized as-is into the create call.
#[derive(Debug, Default, Serialize, Deserialize, JsonSchema)]
pub struct CreateTaskRequest {
    #[schemars(description = "Task title")]
    pub content: String,
    #[schemars(description = "Longer notes for the task")]
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub project_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub section_id: Option<String>,
    #[schemars(description = "Create the task as a subtask of this task")]
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_id: Option<String>,
    #[schemars(description = "Label names")]
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub labels: Option<Vec<String>>,
    #[schemars(description = "1 (normal) to 4 (urgent)")]
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub priority: Option<u8>,
    #[schemars(description = "Natural language due date, e.g. 'every friday at 5pm'")]
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub due_string: Option<String>,
    #[schemars(description = "Due date as YYYY-MM-DD")]
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub due_date: Option<String>,
    #[schemars(description = "Deadline as 'YYYY-MM-DD' or {\"date\": \"YYYY-MM-DD\"}")]
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deadline: Option<Value>,
    #[schemars(description = "Id of the collaborator to assign")]
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub assignee_id: Option<String>,
}

/// Changes to one task. Only the fields given are sent.
#[derive(Debug, Default, Serialize, Deserialize, JsonSchema)]
pub struct UpdateTaskRequest {
    #[schemars(description = "The task to update")]
    #[serde(skip_serializing)]
    pub task_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub labels: Option<Vec<String>>,
    #[schemars(description = "1 (normal) to 4 (urgent)")]
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub priority: Option<u8>,
    #[schemars(description = "Natural language due date; 'no date' clears it")]
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub due_string: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub due_date: Option<String>,
    #[schemars(
        description = "Deadline as 'YYYY-MM-DD' or {\"date\": \"YYYY-MM-DD\"}; null or an empty string removes it"
    )]
    #[serde(
        default,
        deserialize_with = "present_value",
        skip_serializing_if = "Option::is_none"
    )]
    pub deadline: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub assignee_id: Option<String>,
}

#[derive(Debug, Default, Deserialize, JsonSchema)]
pub struct MoveTaskRequest {
    pub task_id: String,
    #[schemars(description = "Destination project")]
    #[serde(default)]
    pub project_id: Option<String>,
    #[schemars(description = "Destination section")]
    #[serde(default)]
    pub section_id: Option<String>,
    #[schemars(description = "New parent task")]
    #[serde(default)]
    pub parent_id: Option<String>,
}

#[derive(Debug, Default, Deserialize, JsonSchema)]
pub struct ListProjectsRequest {
    #[serde(default)]
    pub cursor: Option<String>,
    #[schemars(description = "Follow cursors and return every page")]
    #[serde(default)]
    pub all: bool,
}

#[derive(Debug, Deserialize, JsonSchema)]
pub struct ProjectIdRequest {
    pub project_id: String,
}

#[derive(Debug, Serialize, Deserialize, JsonSchema)]
pub struct CreateProjectRequest {
    pub name: String,
    #[schemars(description = "Nest the project under this parent")]
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_id: Option<String>,
    #[schemars(description = "Todoist color name, e.g. 'berry_red'")]
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub color: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_favorite: Option<bool>,
    #[schemars(description = "'list', 'board' or 'calendar'")]
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub view_style: Option<String>,
}

#[derive(Debug, Default, Deserialize, JsonSchema)]
pub struct ListSectionsRequest {
    #[schemars(description = "Only sections of this project")]
    #[serde(default)]
    pub project_id: Option<String>,
    #[serde(default)]
    pub cursor: Option<String>,
}

#[derive(Debug, Deserialize, JsonSchema)]
pub struct CreateSectionRequest {
    pub project_id: String,
    pub name: String,
}

#[derive(Debug, Default, Deserialize, JsonSchema)]
pub struct ListCommentsRequest {
    #[schemars(description = "Comments on this task (give this or project_id)")]
    #[serde(default)]
    pub task_id: Option<String>,
    #[schemars(description = "Comments on this project (give this or task_id)")]
    #[serde(default)]
    pub project_id: Option<String>,
    #[serde(default)]
    pub cursor: Option<String>,
}

#[derive(Debug, Deserialize, JsonSchema)]
pub struct CreateCommentRequest {
    #[serde(default)]
    pub task_id: Option<String>,
    #[serde(default)]
    pub project_id: Option<String>,
    #[schemars(description = "Comment text (Markdown)")]
    pub content: String,
}

#[derive(Debug, Default, Deserialize, JsonSchema)]
pub struct ListLabelsRequest {
    #[serde(default)]
    pub cursor: Option<String>,
}

#[derive(Debug, Deserialize, JsonSchema)]
pub struct CreateLabelRequest {
    pub name: String,
    #[serde(default)]
    pub color: Option<String>,
}

#[derive(Debug, Deserialize, JsonSchema)]
pub struct RenameSharedLabelRequest {
    #[schemars(description = "Current shared label name")]
    pub name: String,
    pub new_name: String,
}

#[derive(Debug, Deserialize, JsonSchema)]
pub struct RemoveSharedLabelRequest {
    #[schemars(description = "Shared label to remove from every task")]
    pub name: String,
}

#[derive(Debug, Deserialize, JsonSchema)]
pub struct AddReminderRequest {
    pub task_id: String,
    #[schemars(description = "'relative' (needs minute_offset) or 'absolute' (needs a due date)")]
    #[serde(default)]
    pub reminder_type: Option<String>,
    #[schemars(description = "Minutes before the task's due time")]
    #[serde(default)]
    pub minute_offset: Option<i64>,
    #[schemars(description = "Natural language time for an absolute reminder")]
    #[serde(default)]
    pub due_string: Option<String>,
    #[schemars(description = "Date and time for an absolute reminder, RFC 3339")]
    #[serde(default)]
    pub due_datetime: Option<String>,
}

#[derive(Debug, Deserialize, JsonSchema)]
pub struct BulkTasksRequest {
    #[schemars(description = "One of: update, complete, uncomplete, move, delete")]
    pub action: String,
    #[schemars(description = "Tasks to act on; repeats are dropped, at most 50 distinct ids")]
    pub task_ids: Vec<String>,
    #[schemars(
        description = "For update: fields to change (content, description and comments are not allowed). For move: exactly one of project_id, section_id, parent_id."
    )]
    #[serde(default)]
    pub fields: Option<Map<String, Value>>,
    #[schemars(description = "After an update, re-fetch each task and report the stored values")]
    #[serde(default)]
    pub verify: bool,
}

#[derive(Debug, Deserialize, JsonSchema)]
pub struct DependencyInput {
    #[schemars(description = "Index of the dependent command")]
    pub command_index: usize,
    #[schemars(description = "temp_id of the command it depends on")]
    pub depends_on: String,
}

#[derive(Debug, Deserialize, JsonSchema)]
pub struct BatchCommandsRequest {
    #[schemars(
        description = "Sync commands: {\"type\": \"item_add\", \"args\": {...}, \"temp_id\"?: \"...\", \"uuid\"?: \"...\"}. At most 100."
    )]
    pub commands: Vec<Value>,
    #[serde(default)]
    pub dependencies: Vec<DependencyInput>,
    #[schemars(description = "Keep going after a failed command")]
    #[serde(default)]
    pub continue_on_error: bool,
    #[schemars(description = "Only validate the batch; nothing is sent")]
    #[serde(default)]
    pub validate_only: bool,
}

// ============================================================
// Response Types
// ============================================================

/// One page of a list tool, or every page when `all` was requested.
#[derive(Debug, Serialize)]
pub struct ListResponse<T> {
    pub items: Vec<T>,
    pub next_cursor: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct ActionResponse {
    pub success: bool,
    pub id: String,
    pub resource_uri: String,
    pub message: String,
}

#[derive(Debug, Serialize)]
pub struct SyncActionResponse {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct RateLimitStatusResponse {
    pub limits: Vec<RateLimitStatus>,
}
