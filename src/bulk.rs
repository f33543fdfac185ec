//! Bulk task operations.
//!
//! One action applied to up to [`MAX_BULK_TASKS`] tasks. `update`, `complete`
//! and `uncomplete` go out as a single sync batch; `move`, `delete` and
//! deadline changes are dispatched per task. Whatever the path, the caller
//! gets one [`OperationResult`] per distinct id, in input order.

use std::collections::HashSet;
use std::fmt;
use std::str::FromStr;

use futures::future::join_all;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::{debug, info, warn};

use crate::client::TodoistClient;
use crate::error::{Result, TodoistError};
use crate::models::MoveTarget;
use crate::sync::{CommandArgs, IdArgs, ItemUpdateArgs, SyncCommand};

/// Most distinct task ids accepted in one bulk call.
pub const MAX_BULK_TASKS: usize = 50;

/// Free-text fields bulk update refuses to touch.
pub const DISALLOWED_UPDATE_FIELDS: [&str; 3] = ["content", "description", "comments"];

pub const RESOURCE_SCHEME: &str = "todoist";

/// Fields applied through `POST /tasks/{id}` instead of the sync batch.
const DEADLINE_FIELDS: [&str; 2] = ["deadline", "deadline_date"];

type Outcome = std::result::Result<(), String>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BulkAction {
    Update,
    Complete,
    Uncomplete,
    Move,
    Delete,
}

impl BulkAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Update => "update",
            Self::Complete => "complete",
            Self::Uncomplete => "uncomplete",
            Self::Move => "move",
            Self::Delete => "delete",
        }
    }
}

impl fmt::Display for BulkAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for BulkAction {
    type Err = TodoistError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "update" => Ok(Self::Update),
            "complete" => Ok(Self::Complete),
            "uncomplete" => Ok(Self::Uncomplete),
            "move" => Ok(Self::Move),
            "delete" => Ok(Self::Delete),
            other => Err(TodoistError::Validation(format!(
                "unknown bulk action '{}'; expected update, complete, uncomplete, move or delete",
                other
            ))),
        }
    }
}

#[derive(Debug, Clone)]
pub struct BulkRequest {
    pub action: BulkAction,
    pub task_ids: Vec<String>,
    /// Changed fields for `update`, destination for `move`.
    pub fields: Map<String, Value>,
    /// Re-fetch updated tasks and report the values the server now holds.
    pub verify: bool,
}

impl BulkRequest {
    pub fn new(action: BulkAction, task_ids: Vec<String>) -> Self {
        Self {
            action,
            task_ids,
            fields: Map::new(),
            verify: false,
        }
    }

    pub fn field(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.fields.insert(key.to_string(), value.into());
        self
    }

    pub fn with_fields(mut self, fields: Map<String, Value>) -> Self {
        self.fields = fields;
        self
    }

    pub fn verified(mut self) -> Self {
        self.verify = true;
        self
    }
}

/// Remove repeated ids, keeping the first occurrence of each.
pub fn dedup_ids(ids: &[String]) -> Vec<String> {
    let mut seen = HashSet::new();
    ids.iter()
        .filter(|id| seen.insert(id.as_str()))
        .cloned()
        .collect()
}

pub fn resource_uri(task_id: &str) -> String {
    format!("{}://task/{}", RESOURCE_SCHEME, task_id)
}

/// Outcome of the optional re-fetch after an update.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum Verification {
    NotRequested,
    Confirmed { verified_values: Map<String, Value> },
    /// The re-fetch failed; the update itself still counts as successful.
    Unavailable { reason: String },
}

impl Verification {
    pub fn is_not_requested(&self) -> bool {
        matches!(self, Self::NotRequested)
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct OperationResult {
    pub task_id: String,
    pub success: bool,
    pub error: Option<String>,
    pub resource_uri: String,
    #[serde(skip_serializing_if = "Verification::is_not_requested")]
    pub verification: Verification,
}

#[derive(Debug, Clone, Serialize)]
pub struct BulkOperationSummary {
    pub success: bool,
    pub action: BulkAction,
    pub total_tasks: usize,
    pub successful: usize,
    pub failed: usize,
    /// Whether repeated ids were dropped from the input.
    pub deduplicated: bool,
    pub original_count: usize,
    pub results: Vec<OperationResult>,
}

/// Structural checks done before anything is sent.
pub fn validate(request: &BulkRequest, ids: &[String]) -> Result<()> {
    if ids.is_empty() {
        return Err(TodoistError::Validation(
            "task_ids must contain at least one id".to_string(),
        ));
    }
    if ids.iter().any(|id| id.trim().is_empty()) {
        return Err(TodoistError::Validation(
            "task_ids must not contain empty ids".to_string(),
        ));
    }
    if ids.len() > MAX_BULK_TASKS {
        return Err(TodoistError::Validation(format!(
            "bulk operations accept at most {} tasks; received {}",
            MAX_BULK_TASKS,
            ids.len()
        )));
    }

    match request.action {
        BulkAction::Update => {
            let rejected: Vec<&str> = DISALLOWED_UPDATE_FIELDS
                .iter()
                .copied()
                .filter(|f| request.fields.contains_key(*f))
                .collect();
            if !rejected.is_empty() {
                return Err(TodoistError::Validation(format!(
                    "bulk update cannot change {}; edit those tasks individually",
                    rejected.join(", ")
                )));
            }
            if request.fields.is_empty() {
                return Err(TodoistError::Validation(
                    "bulk update needs at least one field to change".to_string(),
                ));
            }
            // Both land in `due.date`.
            if request.fields.contains_key("due_date") && request.fields.contains_key("due_datetime") {
                return Err(TodoistError::Validation(
                    "give due_date or due_datetime, not both".to_string(),
                ));
            }
        }
        BulkAction::Move => {
            move_target(&request.fields)?;
        }
        BulkAction::Complete | BulkAction::Uncomplete | BulkAction::Delete => {}
    }
    Ok(())
}

fn move_target(fields: &Map<String, Value>) -> Result<MoveTarget> {
    let target: MoveTarget = serde_json::from_value(Value::Object(fields.clone()))
        .map_err(|e| TodoistError::Validation(format!("invalid move destination: {}", e)))?;
    if target.destinations() != 1 {
        return Err(TodoistError::Validation(
            "bulk move needs exactly one of project_id, section_id or parent_id".to_string(),
        ));
    }
    Ok(target)
}

/// Translate update fields from REST naming into `item_update` args.
///
/// Deadline fields are dropped here; they travel separately.
pub fn to_sync_fields(fields: &Map<String, Value>) -> Map<String, Value> {
    let mut args = Map::new();
    let mut due = Map::new();
    let mut duration = Map::new();

    for (key, value) in fields {
        match key.as_str() {
            k if DEADLINE_FIELDS.contains(&k) => {}
            "due_string" => {
                due.insert("string".to_string(), value.clone());
            }
            "due_date" | "due_datetime" => {
                due.insert("date".to_string(), value.clone());
            }
            "due_lang" => {
                due.insert("lang".to_string(), value.clone());
            }
            "assignee_id" => {
                args.insert("responsible_uid".to_string(), value.clone());
            }
            "duration" => {
                duration.insert("amount".to_string(), value.clone());
            }
            "duration_unit" => {
                duration.insert("unit".to_string(), value.clone());
            }
            _ => {
                args.insert(key.clone(), value.clone());
            }
        }
    }

    if !due.is_empty() {
        args.insert("due".to_string(), Value::Object(due));
    }
    if !duration.is_empty() {
        args.insert("duration".to_string(), Value::Object(duration));
    }
    args
}

fn deadline_fields(fields: &Map<String, Value>) -> Map<String, Value> {
    fields
        .iter()
        .filter(|(k, _)| DEADLINE_FIELDS.contains(&k.as_str()))
        .map(|(k, v)| (k.clone(), v.clone()))
        .collect()
}

/// Where a requested field shows up on a fetched task.
fn task_pointer(field: &str) -> String {
    match field {
        "due_string" => "/due/string".to_string(),
        "due_date" => "/due/date".to_string(),
        "due_datetime" => "/due/datetime".to_string(),
        "due_lang" => "/due/lang".to_string(),
        "deadline" | "deadline_date" => "/deadline/date".to_string(),
        "assignee_id" => "/responsible_uid".to_string(),
        "duration" => "/duration/amount".to_string(),
        "duration_unit" => "/duration/unit".to_string(),
        other => format!("/{}", other),
    }
}

/// Values of the requested fields as the server now reports them.
pub fn verified_values(task: &Value, fields: &Map<String, Value>) -> Map<String, Value> {
    fields
        .keys()
        .map(|key| {
            let value = task.pointer(&task_pointer(key)).cloned().unwrap_or(Value::Null);
            (key.clone(), value)
        })
        .collect()
}

/// Per-task failures, permission errors included, are recorded as data.
fn collect_outcomes(results: Vec<Result<()>>) -> Vec<Outcome> {
    results
        .into_iter()
        .map(|r| r.map_err(|err| err.user_message()))
        .collect()
}

#[derive(Debug, Clone)]
pub struct BulkService {
    client: TodoistClient,
}

impl BulkService {
    pub fn new(client: TodoistClient) -> Self {
        Self { client }
    }

    pub async fn execute(&self, request: BulkRequest) -> Result<BulkOperationSummary> {
        let original_count = request.task_ids.len();
        let ids = dedup_ids(&request.task_ids);
        validate(&request, &ids)?;
        // A missing token is the only auth failure that stops the call.
        self.client.ensure_token()?;

        let deduplicated = ids.len() != original_count;
        if deduplicated {
            debug!(original_count, distinct = ids.len(), "Dropped repeated task ids");
        }

        let outcomes = match request.action {
            BulkAction::Update => self.update(&ids, &request.fields).await?,
            BulkAction::Complete => {
                self.sync_each(&ids, |id| CommandArgs::ItemComplete(IdArgs { id }))
                    .await
            }
            BulkAction::Uncomplete => {
                self.sync_each(&ids, |id| CommandArgs::ItemUncomplete(IdArgs { id }))
                    .await
            }
            BulkAction::Move => {
                let target = move_target(&request.fields)?;
                let calls = ids.iter().map(|id| {
                    let target = &target;
                    async move { self.client.move_task(id, target).await.map(|_| ()) }
                });
                collect_outcomes(join_all(calls).await)
            }
            BulkAction::Delete => {
                let calls = ids.iter().map(|id| self.client.delete_task(id));
                collect_outcomes(join_all(calls).await)
            }
        };

        let mut results: Vec<OperationResult> = ids
            .iter()
            .zip(outcomes)
            .map(|(id, outcome)| OperationResult {
                task_id: id.clone(),
                success: outcome.is_ok(),
                error: outcome.err(),
                resource_uri: resource_uri(id),
                verification: Verification::NotRequested,
            })
            .collect();

        if request.verify && request.action == BulkAction::Update {
            self.verify(&mut results, &request.fields).await;
        }

        let successful = results.iter().filter(|r| r.success).count();
        let summary = BulkOperationSummary {
            success: true,
            action: request.action,
            total_tasks: results.len(),
            successful,
            failed: results.len() - successful,
            deduplicated,
            original_count,
            results,
        };
        info!(
            action = %summary.action,
            total = summary.total_tasks,
            successful = summary.successful,
            failed = summary.failed,
            "Bulk operation finished"
        );
        Ok(summary)
    }

    /// One sync command per id, submitted as a single batch.
    async fn sync_each<F>(&self, ids: &[String], make: F) -> Vec<Outcome>
    where
        F: Fn(String) -> CommandArgs,
    {
        let commands: Vec<SyncCommand> = ids
            .iter()
            .map(|id| SyncCommand::new(make(id.clone())))
            .collect();
        self.submit(&commands).await
    }

    async fn submit(&self, commands: &[SyncCommand]) -> Vec<Outcome> {
        match self.client.execute_batch(commands).await {
            Ok(response) => commands
                .iter()
                .map(|c| response.command_result(&c.uuid).map_err(|e| e.message()))
                .collect(),
            Err(err) => {
                warn!(commands = commands.len(), error = %err, "Bulk sync submission failed");
                let message = err.user_message();
                commands.iter().map(|_| Err(message.clone())).collect()
            }
        }
    }

    async fn update(&self, ids: &[String], fields: &Map<String, Value>) -> Result<Vec<Outcome>> {
        let sync_fields = to_sync_fields(fields);
        let deadline = deadline_fields(fields);

        let mut outcomes: Vec<Outcome> = if sync_fields.is_empty() {
            vec![Ok(()); ids.len()]
        } else {
            let commands = ids
                .iter()
                .map(|id| {
                    ItemUpdateArgs::from_fields(id, &sync_fields)
                        .map(|args| SyncCommand::new(CommandArgs::ItemUpdate(args)))
                })
                .collect::<Result<Vec<_>>>()?;
            self.submit(&commands).await
        };

        if !deadline.is_empty() {
            let calls = ids.iter().map(|id| {
                let deadline = &deadline;
                async move { self.client.update_task(id, deadline).await.map(|_| ()) }
            });
            let deadline_outcomes = collect_outcomes(join_all(calls).await);

            for (outcome, deadline_outcome) in outcomes.iter_mut().zip(deadline_outcomes) {
                if let Err(err) = deadline_outcome {
                    if outcome.is_ok() {
                        *outcome = Err(format!("deadline update failed: {}", err));
                    }
                }
            }
        }

        Ok(outcomes)
    }

    async fn verify(&self, results: &mut [OperationResult], fields: &Map<String, Value>) {
        let fetches = results.iter().map(|r| {
            let wanted = r.success;
            let id = r.task_id.clone();
            async move {
                if wanted {
                    Some(self.client.get_task_value(&id).await)
                } else {
                    None
                }
            }
        });
        let fetched = join_all(fetches).await;

        for (result, fetch) in results.iter_mut().zip(fetched) {
            match fetch {
                None => {}
                Some(Ok(task)) => {
                    result.verification = Verification::Confirmed {
                        verified_values: verified_values(&task, fields),
                    };
                }
                Some(Err(err)) => {
                    warn!(task_id = %result.task_id, error = %err, "Could not verify bulk update");
                    result.verification = Verification::Unavailable {
                        reason: err.user_message(),
                    };
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn ids(raw: &[&str]) -> Vec<String> {
        raw.iter().map(|s| s.to_string()).collect()
    }

    fn fields(value: Value) -> Map<String, Value> {
        match value {
            Value::Object(map) => map,
            _ => panic!("expected object"),
        }
    }

    #[test]
    fn dedup_keeps_first_occurrence_order() {
        let input = ids(&["b", "a", "b", "c", "a"]);
        let once = dedup_ids(&input);
        assert_eq!(once, ids(&["b", "a", "c"]));
        assert_eq!(dedup_ids(&once), once);
        assert!(once.len() <= input.len());
    }

    #[test]
    fn update_rejects_due_date_with_due_datetime() {
        let request = BulkRequest::new(BulkAction::Update, ids(&["1"])).with_fields(fields(json!({
            "due_date": "2025-03-01",
            "due_datetime": "2025-03-01T09:00:00Z"
        })));
        let err = validate(&request, &request.task_ids).unwrap_err();
        assert!(err.to_string().contains("due_datetime"));

        let one = BulkRequest::new(BulkAction::Update, ids(&["1"]))
            .with_fields(fields(json!({ "due_datetime": "2025-03-01T09:00:00Z" })));
        assert!(validate(&one, &one.task_ids).is_ok());
    }

    #[test]
    fn action_parses_known_names_only() {
        assert_eq!("move".parse::<BulkAction>().unwrap(), BulkAction::Move);
        assert_eq!(BulkAction::Uncomplete.to_string(), "uncomplete");
        assert!(matches!(
            "archive".parse::<BulkAction>(),
            Err(TodoistError::Validation(_))
        ));
    }

    #[test]
    fn ceiling_counts_distinct_ids() {
        let mut many: Vec<String> = (0..50).map(|i| i.to_string()).collect();
        many.push("0".to_string());
        let request = BulkRequest::new(BulkAction::Complete, many.clone());
        assert!(validate(&request, &dedup_ids(&many)).is_ok());

        let over: Vec<String> = (0..51).map(|i| i.to_string()).collect();
        let err = validate(&BulkRequest::new(BulkAction::Complete, over.clone()), &over).unwrap_err();
        let msg = err.to_string();
        assert!(msg.contains("50") && msg.contains("51"));
    }

    #[test]
    fn update_rejects_free_text_fields() {
        let list = ids(&["1"]);
        for field in DISALLOWED_UPDATE_FIELDS {
            let request = BulkRequest::new(BulkAction::Update, list.clone()).field(field, "x");
            let err = validate(&request, &list).unwrap_err();
            assert!(err.to_string().contains(field));
        }

        let combined = BulkRequest::new(BulkAction::Update, list.clone())
            .field("content", "x")
            .field("comments", "y")
            .field("priority", 2);
        assert!(validate(&combined, &list).is_err());
    }

    #[test]
    fn move_needs_exactly_one_destination() {
        let list = ids(&["1"]);
        let none = BulkRequest::new(BulkAction::Move, list.clone());
        assert!(validate(&none, &list).is_err());

        let two = BulkRequest::new(BulkAction::Move, list.clone())
            .field("project_id", "p")
            .field("section_id", "s");
        assert!(validate(&two, &list).is_err());

        let one = BulkRequest::new(BulkAction::Move, list.clone()).field("section_id", "s");
        assert!(validate(&one, &list).is_ok());
    }

    #[test]
    fn sync_fields_nest_due_and_duration() {
        let out = to_sync_fields(&fields(json!({
            "priority": 4,
            "due_string": "every monday",
            "due_lang": "en",
            "assignee_id": "u1",
            "duration": 30,
            "duration_unit": "minute",
            "deadline_date": "2025-06-01"
        })));

        assert_eq!(
            Value::Object(out),
            json!({
                "priority": 4,
                "due": {"string": "every monday", "lang": "en"},
                "responsible_uid": "u1",
                "duration": {"amount": 30, "unit": "minute"}
            })
        );
    }

    #[test]
    fn verified_values_follow_field_locations() {
        let task = json!({
            "id": "1",
            "priority": 3,
            "due": {"string": "tomorrow", "date": "2025-05-02"},
            "deadline": {"date": "2025-06-01"}
        });
        let requested = fields(json!({
            "priority": 3,
            "due_string": "tomorrow",
            "deadline_date": "2025-06-01",
            "labels": ["x"]
        }));

        let values = verified_values(&task, &requested);
        assert_eq!(values["priority"], json!(3));
        assert_eq!(values["due_string"], json!("tomorrow"));
        assert_eq!(values["deadline_date"], json!("2025-06-01"));
        assert_eq!(values["labels"], Value::Null);
    }

    #[test]
    fn resource_uri_uses_task_path() {
        assert_eq!(resource_uri("8821"), "todoist://task/8821");
    }

    #[test]
    fn unrequested_verification_is_not_serialized() {
        let result = OperationResult {
            task_id: "1".into(),
            success: true,
            error: None,
            resource_uri: resource_uri("1"),
            verification: Verification::NotRequested,
        };
        let value = serde_json::to_value(&result).unwrap();
        assert!(value.get("verification").is_none());
        assert_eq!(value["error"], Value::Null);
    }
}
