//! Typed wrappers over the Todoist REST endpoints.

use std::future::Future;

use serde_json::{json, Map, Value};
use tracing::debug;

use super::{ApiRequest, TodoistClient};
use crate::error::{Result, TodoistError};
use crate::models::*;

/// Stop following cursors after this many pages.
pub const MAX_PAGES: usize = 50;

/// Rewrite a `deadline` field into the `deadline_date` field Todoist expects.
///
/// - `"2025-01-31"` is passed through
/// - `{"date": "2025-01-31"}` is unwrapped to its date
/// - `null` becomes `""`, which removes the deadline
///
/// Any other shape is left alone for the API to reject.
pub fn normalize_deadline(body: &mut Map<String, Value>) {
    let Some(deadline) = body.remove("deadline") else {
        return;
    };

    let date = match &deadline {
        Value::String(s) => Some(s.clone()),
        Value::Object(obj) => obj.get("date").and_then(Value::as_str).map(str::to_string),
        Value::Null => Some(String::new()),
        _ => None,
    };

    match date {
        Some(date) => {
            body.insert("deadline_date".to_string(), Value::String(date));
        }
        None => {
            body.insert("deadline".to_string(), deadline);
        }
    }
}

/// Follow `next_cursor` until the stream ends or `max_pages` is reached.
pub async fn collect_pages<T, F, Fut>(mut fetch: F, max_pages: usize) -> Result<Vec<T>>
where
    F: FnMut(Option<String>) -> Fut,
    Fut: Future<Output = Result<Page<T>>>,
{
    let mut items = Vec::new();
    let mut cursor = None;

    for _ in 0..max_pages {
        let page = fetch(cursor.take()).await?;
        items.extend(page.results);
        match page.next_cursor {
            Some(next) => cursor = Some(next),
            None => return Ok(items),
        }
    }

    debug!(max_pages, "Stopped paginating at page cap");
    Ok(items)
}

fn require_id(kind: &str, id: &str) -> Result<()> {
    if id.trim().is_empty() {
        return Err(TodoistError::Validation(format!("{} id must not be empty", kind)));
    }
    Ok(())
}

impl TodoistClient {
    // ============================================================
    // Task Operations
    // ============================================================

    /// Get a task by ID.
    pub async fn get_task(&self, id: &str) -> Result<Task> {
        require_id("task", id)?;
        self.execute(ApiRequest::get(format!("/tasks/{}", id))).await
    }

    /// Get a task as raw JSON, every field the API returned included.
    pub async fn get_task_value(&self, id: &str) -> Result<Value> {
        require_id("task", id)?;
        self.execute(ApiRequest::get(format!("/tasks/{}", id))).await
    }

    /// List active tasks with optional filtering.
    pub async fn list_tasks(&self, query: &TaskQuery) -> Result<Page<Task>> {
        let request = ApiRequest::get("/tasks")
            .query_opt("project_id", query.project_id.as_deref())
            .query_opt("section_id", query.section_id.as_deref())
            .query_opt("parent_id", query.parent_id.as_deref())
            .query_opt("label", query.label.as_deref())
            .query_opt("cursor", query.cursor.as_deref())
            .query_opt("limit", query.limit);
        self.execute(request).await
    }

    /// List active tasks matching a Todoist filter expression.
    pub async fn filter_tasks(
        &self,
        filter: &str,
        cursor: Option<&str>,
        limit: Option<u32>,
    ) -> Result<Page<Task>> {
        let request = ApiRequest::get("/tasks/filter")
            .query("query", filter)
            .query_opt("cursor", cursor)
            .query_opt("limit", limit);
        self.execute(request).await
    }

    /// Create a task. `params` is the flat field bag of the create call.
    pub async fn create_task(&self, params: &Map<String, Value>) -> Result<Task> {
        let mut body = params.clone();
        normalize_deadline(&mut body);
        self.execute(ApiRequest::post("/tasks").json(Value::Object(body)))
            .await
    }

    /// Update a task. Only the fields present in `params` change.
    pub async fn update_task(&self, id: &str, params: &Map<String, Value>) -> Result<Task> {
        require_id("task", id)?;
        let mut body = params.clone();
        normalize_deadline(&mut body);
        self.execute(ApiRequest::post(format!("/tasks/{}", id)).json(Value::Object(body)))
            .await
    }

    /// Mark a task complete.
    pub async fn close_task(&self, id: &str) -> Result<()> {
        require_id("task", id)?;
        self.execute(ApiRequest::post(format!("/tasks/{}/close", id)))
            .await
    }

    /// Reopen a completed task.
    pub async fn reopen_task(&self, id: &str) -> Result<()> {
        require_id("task", id)?;
        self.execute(ApiRequest::post(format!("/tasks/{}/reopen", id)))
            .await
    }

    pub async fn delete_task(&self, id: &str) -> Result<()> {
        require_id("task", id)?;
        self.execute(ApiRequest::delete(format!("/tasks/{}", id)))
            .await
    }

    /// Move a task to another project, section or parent.
    pub async fn move_task(&self, id: &str, target: &MoveTarget) -> Result<Value> {
        require_id("task", id)?;
        if target.destinations() == 0 {
            return Err(TodoistError::Validation(
                "move needs a project_id, section_id or parent_id".to_string(),
            ));
        }
        let body = serde_json::to_value(target)?;
        self.execute(ApiRequest::post(format!("/tasks/{}/move", id)).json(body))
            .await
    }

    // ============================================================
    // Project Operations
    // ============================================================

    pub async fn list_projects(&self, cursor: Option<&str>) -> Result<Page<Project>> {
        self.execute(ApiRequest::get("/projects").query_opt("cursor", cursor))
            .await
    }

    /// Get a project by ID.
    pub async fn get_project(&self, id: &str) -> Result<Project> {
        require_id("project", id)?;
        self.execute(ApiRequest::get(format!("/projects/{}", id)))
            .await
    }

    pub async fn create_project(&self, params: &Map<String, Value>) -> Result<Project> {
        self.execute(ApiRequest::post("/projects").json(Value::Object(params.clone())))
            .await
    }

    // ============================================================
    // Section Operations
    // ============================================================

    pub async fn list_sections(
        &self,
        project_id: Option<&str>,
        cursor: Option<&str>,
    ) -> Result<Page<Section>> {
        let request = ApiRequest::get("/sections")
            .query_opt("project_id", project_id)
            .query_opt("cursor", cursor);
        self.execute(request).await
    }

    pub async fn create_section(&self, project_id: &str, name: &str) -> Result<Section> {
        require_id("project", project_id)?;
        let body = json!({ "project_id": project_id, "name": name });
        self.execute(ApiRequest::post("/sections").json(body)).await
    }

    // ============================================================
    // Comment Operations
    // ============================================================

    pub async fn list_comments(
        &self,
        parent: &CommentParent,
        cursor: Option<&str>,
    ) -> Result<Page<Comment>> {
        let (key, id) = parent.query_pair();
        require_id(key, id)?;
        let request = ApiRequest::get("/comments")
            .query(key, id)
            .query_opt("cursor", cursor);
        self.execute(request).await
    }

    pub async fn create_comment(&self, parent: &CommentParent, content: &str) -> Result<Comment> {
        let (key, id) = parent.query_pair();
        require_id(key, id)?;
        let mut body = Map::new();
        body.insert(key.to_string(), Value::String(id.to_string()));
        body.insert("content".to_string(), Value::String(content.to_string()));
        self.execute(ApiRequest::post("/comments").json(Value::Object(body)))
            .await
    }

    // ============================================================
    // Label Operations
    // ============================================================

    pub async fn list_labels(&self, cursor: Option<&str>) -> Result<Page<Label>> {
        self.execute(ApiRequest::get("/labels").query_opt("cursor", cursor))
            .await
    }

    pub async fn create_label(&self, name: &str, color: Option<&str>) -> Result<Label> {
        let mut body = json!({ "name": name });
        if let Some(color) = color {
            body["color"] = Value::String(color.to_string());
        }
        self.execute(ApiRequest::post("/labels").json(body)).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn body(value: Value) -> Map<String, Value> {
        match value {
            Value::Object(map) => map,
            _ => panic!("expected object"),
        }
    }

    #[test]
    fn deadline_string_passes_through() {
        let mut b = body(json!({"deadline": "2025-03-01", "priority": 4}));
        normalize_deadline(&mut b);
        assert_eq!(b.get("deadline_date"), Some(&json!("2025-03-01")));
        assert!(!b.contains_key("deadline"));
        assert_eq!(b.get("priority"), Some(&json!(4)));
    }

    #[test]
    fn deadline_object_is_unwrapped() {
        let mut b = body(json!({"deadline": {"date": "2025-03-01", "lang": "en"}}));
        normalize_deadline(&mut b);
        assert_eq!(b.get("deadline_date"), Some(&json!("2025-03-01")));
    }

    #[test]
    fn null_deadline_clears() {
        let mut b = body(json!({"deadline": null}));
        normalize_deadline(&mut b);
        assert_eq!(b.get("deadline_date"), Some(&json!("")));
    }

    #[test]
    fn body_without_deadline_is_untouched() {
        let mut b = body(json!({"content": "x"}));
        normalize_deadline(&mut b);
        assert_eq!(b, body(json!({"content": "x"})));
    }

    #[tokio::test]
    async fn collect_pages_follows_cursor_to_end() {
        let pages = vec![
            Page { results: vec![1, 2], next_cursor: Some("a".to_string()) },
            Page { results: vec![3], next_cursor: Some("b".to_string()) },
            Page { results: vec![4], next_cursor: None },
        ];
        let mut seen_cursors = Vec::new();
        let mut iter = pages.into_iter();

        let items = collect_pages(
            |cursor| {
                seen_cursors.push(cursor);
                let page = iter.next().unwrap();
                async move { Ok(page) }
            },
            10,
        )
        .await
        .unwrap();

        assert_eq!(items, vec![1, 2, 3, 4]);
        assert_eq!(seen_cursors, vec![None, Some("a".to_string()), Some("b".to_string())]);
    }

    #[tokio::test]
    async fn collect_pages_respects_page_cap() {
        let items = collect_pages(
            |_| async { Ok(Page { results: vec![0u8], next_cursor: Some("more".to_string()) }) },
            3,
        )
        .await
        .unwrap();
        assert_eq!(items.len(), 3);
    }
}
