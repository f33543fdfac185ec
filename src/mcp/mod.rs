//! MCP server exposing Todoist tasks, projects and bulk operations as tools.

mod types;

use std::str::FromStr;

pub use types::*;

use rmcp::{
    handler::server::{tool::ToolRouter, wrapper::Parameters},
    model::{CallToolResult, Content, ServerInfo},
    tool, tool_handler, tool_router, ErrorData as McpError, ServerHandler, ServiceExt,
};
use serde::Serialize;
use serde_json::{json, Map, Value};
use tracing::warn;
use uuid::Uuid;

use crate::batch::{BatchOperationResult, BatchOptions, BatchRequest, BatchService, CommandDependency};
use crate::bulk::{resource_uri, BulkAction, BulkOperationSummary, BulkRequest, BulkService};
use crate::client::{collect_pages, TodoistClient, MAX_PAGES};
use crate::error::{ErrorKind, TodoistError};
use crate::models::*;
use crate::sync::{
    CommandArgs, PendingCommand, ReminderAddArgs, SharedLabelRemoveArgs, SharedLabelRenameArgs,
    SyncCommand,
};

/// Map a client error onto the MCP error space with a sanitized message.
/// The full error only goes to the log.
fn tool_error(err: TodoistError) -> McpError {
    warn!(kind = ?err.kind(), error = %err, "Todoist call failed");
    match err.kind() {
        ErrorKind::Validation | ErrorKind::NotFound => {
            McpError::invalid_params(err.user_message(), None)
        }
        _ => McpError::internal_error(err.user_message(), None),
    }
}

fn json_result<T: Serialize>(value: &T) -> Result<CallToolResult, McpError> {
    let json = serde_json::to_string_pretty(value)
        .map_err(|e| McpError::internal_error(e.to_string(), None))?;
    Ok(CallToolResult::success(vec![Content::text(json)]))
}

fn to_fields<T: Serialize>(value: &T) -> Result<Map<String, Value>, McpError> {
    match serde_json::to_value(value) {
        Ok(Value::Object(map)) => Ok(map),
        Ok(_) => Err(McpError::internal_error("expected an object", None)),
        Err(e) => Err(McpError::internal_error(e.to_string(), None)),
    }
}

fn comment_parent(
    task_id: Option<String>,
    project_id: Option<String>,
) -> Result<CommentParent, McpError> {
    match (task_id, project_id) {
        (Some(task_id), None) => Ok(CommentParent::Task(task_id)),
        (None, Some(project_id)) => Ok(CommentParent::Project(project_id)),
        _ => Err(McpError::invalid_params(
            "Give exactly one of task_id or project_id",
            None,
        )),
    }
}

#[derive(Clone)]
pub struct TodoistMcpServer {
    client: TodoistClient,
    batch: BatchService,
    bulk: BulkService,
    tool_router: ToolRouter<Self>,
}

impl TodoistMcpServer {
    pub fn new(client: TodoistClient) -> Self {
        Self {
            batch: BatchService::new(client.clone()),
            bulk: BulkService::new(client.clone()),
            client,
            tool_router: Self::tool_router(),
        }
    }

    // ============================================================
    // Tool logic shared by the tools and their tests
    // ============================================================

    async fn run_list_tasks(&self, req: ListTasksRequest) -> Result<ListResponse<Task>, McpError> {
        let client = &self.client;
        let limit = req.limit;

        if let Some(filter) = req.filter.as_deref() {
            if req.all {
                let items = collect_pages(
                    |cursor| async move { client.filter_tasks(filter, cursor.as_deref(), limit).await },
                    MAX_PAGES,
                )
                .await
                .map_err(tool_error)?;
                return Ok(ListResponse { items, next_cursor: None });
            }
            let page = client
                .filter_tasks(filter, req.cursor.as_deref(), limit)
                .await
                .map_err(tool_error)?;
            return Ok(ListResponse { items: page.results, next_cursor: page.next_cursor });
        }

        let query = TaskQuery {
            project_id: req.project_id,
            section_id: req.section_id,
            parent_id: req.parent_id,
            label: req.label,
            cursor: req.cursor,
            limit: req.limit,
        };

        if req.all {
            let items = collect_pages(
                |cursor| {
                    let query = TaskQuery { cursor, ..query.clone() };
                    async move { client.list_tasks(&query).await }
                },
                MAX_PAGES,
            )
            .await
            .map_err(tool_error)?;
            return Ok(ListResponse { items, next_cursor: None });
        }

        let page = client.list_tasks(&query).await.map_err(tool_error)?;
        Ok(ListResponse { items: page.results, next_cursor: page.next_cursor })
    }

    async fn run_update_task(&self, req: UpdateTaskRequest) -> Result<Task, McpError> {
        let fields = to_fields(&req)?;
        if fields.is_empty() {
            return Err(McpError::invalid_params("No fields to update", None));
        }
        self.client
            .update_task(&req.task_id, &fields)
            .await
            .map_err(tool_error)
    }

    async fn run_move_task(&self, req: MoveTaskRequest) -> Result<ActionResponse, McpError> {
        let target = MoveTarget {
            project_id: req.project_id,
            section_id: req.section_id,
            parent_id: req.parent_id,
        };
        if target.destinations() != 1 {
            return Err(McpError::invalid_params(
                "Give exactly one of project_id, section_id or parent_id",
                None,
            ));
        }
        self.client
            .move_task(&req.task_id, &target)
            .await
            .map_err(tool_error)?;

        Ok(ActionResponse {
            success: true,
            resource_uri: resource_uri(&req.task_id),
            message: format!("Task {} moved", req.task_id),
            id: req.task_id,
        })
    }

    async fn run_bulk_tasks(&self, req: BulkTasksRequest) -> Result<BulkOperationSummary, McpError> {
        let action = BulkAction::from_str(&req.action).map_err(tool_error)?;
        let mut request = BulkRequest::new(action, req.task_ids)
            .with_fields(req.fields.unwrap_or_default());
        request.verify = req.verify;

        self.bulk.execute(request).await.map_err(tool_error)
    }

    async fn run_batch_commands(
        &self,
        req: BatchCommandsRequest,
    ) -> Result<BatchOperationResult, McpError> {
        let commands = req
            .commands
            .into_iter()
            .enumerate()
            .map(|(index, raw)| {
                serde_json::from_value::<PendingCommand>(raw).map_err(|e| {
                    McpError::invalid_params(format!("Command {} is invalid: {}", index, e), None)
                })
            })
            .collect::<Result<Vec<_>, _>>()?;

        let request = BatchRequest {
            commands,
            dependencies: req
                .dependencies
                .into_iter()
                .map(|d| CommandDependency {
                    command_index: d.command_index,
                    depends_on: d.depends_on,
                })
                .collect(),
            options: BatchOptions {
                continue_on_error: req.continue_on_error,
                validate_only: req.validate_only,
            },
        };

        self.batch.execute(request).await.map_err(tool_error)
    }

    /// Submit one administrative command without the batch retry policy.
    async fn run_single_sync(&self, args: CommandArgs) -> Result<SyncActionResponse, McpError> {
        let command = SyncCommand::new(args);
        let response = self
            .client
            .sync(std::slice::from_ref(&command))
            .await
            .map_err(tool_error)?;

        Ok(match response.command_result(&command.uuid) {
            Ok(()) => SyncActionResponse { success: true, id: None, error: None },
            Err(err) => SyncActionResponse {
                success: false,
                id: None,
                error: Some(err.message()),
            },
        })
    }

    async fn run_add_reminder(&self, req: AddReminderRequest) -> Result<SyncActionResponse, McpError> {
        let due = match (req.due_string, req.due_datetime) {
            (Some(string), _) => Some(json!({ "string": string })),
            (None, Some(date)) => Some(json!({ "date": date })),
            (None, None) => None,
        };
        if due.is_none() && req.minute_offset.is_none() {
            return Err(McpError::invalid_params(
                "A reminder needs minute_offset or a due time",
                None,
            ));
        }
        let reminder_type = req.reminder_type.or_else(|| {
            Some(if req.minute_offset.is_some() { "relative" } else { "absolute" }.to_string())
        });

        let temp_id = Uuid::new_v4().to_string();
        let command = SyncCommand::new(CommandArgs::ReminderAdd(ReminderAddArgs {
            item_id: req.task_id,
            reminder_type,
            due,
            minute_offset: req.minute_offset,
            extra: Map::new(),
        }))
        .with_temp_id(temp_id.clone());

        let response = self
            .client
            .execute_batch(std::slice::from_ref(&command))
            .await
            .map_err(tool_error)?;

        Ok(match response.command_result(&command.uuid) {
            Ok(()) => SyncActionResponse {
                success: true,
                id: response.resolve_temp_id(&temp_id).map(str::to_string),
                error: None,
            },
            Err(err) => SyncActionResponse {
                success: false,
                id: None,
                error: Some(err.message()),
            },
        })
    }

    // ============================================================
    // Test helpers - expose tool logic for testing
    // ============================================================

    pub async fn test_list_tasks(&self, req: ListTasksRequest) -> Result<ListResponse<Task>, McpError> {
        self.run_list_tasks(req).await
    }

    pub async fn test_update_task(&self, req: UpdateTaskRequest) -> Result<Task, McpError> {
        self.run_update_task(req).await
    }

    pub async fn test_move_task(&self, req: MoveTaskRequest) -> Result<ActionResponse, McpError> {
        self.run_move_task(req).await
    }

    pub async fn test_bulk_tasks(
        &self,
        req: BulkTasksRequest,
    ) -> Result<BulkOperationSummary, McpError> {
        self.run_bulk_tasks(req).await
    }

    pub async fn test_batch_commands(
        &self,
        req: BatchCommandsRequest,
    ) -> Result<BatchOperationResult, McpError> {
        self.run_batch_commands(req).await
    }

    pub async fn test_rename_shared_label(
        &self,
        req: RenameSharedLabelRequest,
    ) -> Result<SyncActionResponse, McpError> {
        self.run_single_sync(CommandArgs::SharedLabelRename(SharedLabelRenameArgs {
            name_old: req.name,
            name_new: req.new_name,
        }))
        .await
    }

    pub async fn test_add_reminder(
        &self,
        req: AddReminderRequest,
    ) -> Result<SyncActionResponse, McpError> {
        self.run_add_reminder(req).await
    }

    pub fn test_rate_limit_status(&self) -> RateLimitStatusResponse {
        RateLimitStatusResponse {
            limits: self.client.rate_limit_status(),
        }
    }
}

#[tool_router]
impl TodoistMcpServer {
    // ============================================================
    // Tasks
    // ============================================================

    #[tool(description = "Get one task by id, with every field Todoist returns.")]
    async fn get_task(
        &self,
        params: Parameters<TaskIdRequest>,
    ) -> Result<CallToolResult, McpError> {
        let task = self
            .client
            .get_task(&params.0.task_id)
            .await
            .map_err(tool_error)?;
        json_result(&task)
    }

    #[tool(
        description = "List active tasks. Filter by project, section, parent or label, or pass a Todoist filter expression. Paginated: pass next_cursor back as cursor, or set all=true to fetch every page."
    )]
    async fn list_tasks(
        &self,
        params: Parameters<ListTasksRequest>,
    ) -> Result<CallToolResult, McpError> {
        json_result(&self.run_list_tasks(params.0).await?)
    }

    #[tool(
        description = "Create a task. Due dates accept natural language via due_string. deadline takes 'YYYY-MM-DD'."
    )]
    async fn create_task(
        &self,
        params: Parameters<CreateTaskRequest>,
    ) -> Result<CallToolResult, McpError> {
        let fields = to_fields(&params.0)?;
        let task = self.client.create_task(&fields).await.map_err(tool_error)?;
        json_result(&task)
    }

    #[tool(description = "Update a task. Only the fields given are changed.")]
    async fn update_task(
        &self,
        params: Parameters<UpdateTaskRequest>,
    ) -> Result<CallToolResult, McpError> {
        json_result(&self.run_update_task(params.0).await?)
    }

    #[tool(description = "Mark a task complete. Recurring tasks move to their next date.")]
    async fn complete_task(
        &self,
        params: Parameters<TaskIdRequest>,
    ) -> Result<CallToolResult, McpError> {
        let id = params.0.task_id;
        self.client.close_task(&id).await.map_err(tool_error)?;
        json_result(&ActionResponse {
            success: true,
            resource_uri: resource_uri(&id),
            message: format!("Task {} completed", id),
            id,
        })
    }

    #[tool(description = "Reopen a completed task.")]
    async fn reopen_task(
        &self,
        params: Parameters<TaskIdRequest>,
    ) -> Result<CallToolResult, McpError> {
        let id = params.0.task_id;
        self.client.reopen_task(&id).await.map_err(tool_error)?;
        json_result(&ActionResponse {
            success: true,
            resource_uri: resource_uri(&id),
            message: format!("Task {} reopened", id),
            id,
        })
    }

    #[tool(description = "Delete a task and its subtasks. This cannot be undone.")]
    async fn delete_task(
        &self,
        params: Parameters<TaskIdRequest>,
    ) -> Result<CallToolResult, McpError> {
        let id = params.0.task_id;
        self.client.delete_task(&id).await.map_err(tool_error)?;
        json_result(&ActionResponse {
            success: true,
            resource_uri: resource_uri(&id),
            message: format!("Task {} deleted", id),
            id,
        })
    }

    #[tool(
        description = "Move a task to another project, section or parent task. Give exactly one destination."
    )]
    async fn move_task(
        &self,
        params: Parameters<MoveTaskRequest>,
    ) -> Result<CallToolResult, McpError> {
        json_result(&self.run_move_task(params.0).await?)
    }

    // ============================================================
    // Projects and sections
    // ============================================================

    #[tool(description = "List projects. Set all=true to fetch every page.")]
    async fn list_projects(
        &self,
        params: Parameters<ListProjectsRequest>,
    ) -> Result<CallToolResult, McpError> {
        let req = params.0;
        let client = &self.client;

        let response = if req.all {
            let items = collect_pages(
                |cursor| async move { client.list_projects(cursor.as_deref()).await },
                MAX_PAGES,
            )
            .await
            .map_err(tool_error)?;
            ListResponse { items, next_cursor: None }
        } else {
            let page = client
                .list_projects(req.cursor.as_deref())
                .await
                .map_err(tool_error)?;
            ListResponse { items: page.results, next_cursor: page.next_cursor }
        };
        json_result(&response)
    }

    #[tool(description = "Get one project by id.")]
    async fn get_project(
        &self,
        params: Parameters<ProjectIdRequest>,
    ) -> Result<CallToolResult, McpError> {
        let project = self
            .client
            .get_project(&params.0.project_id)
            .await
            .map_err(tool_error)?;
        json_result(&project)
    }

    #[tool(description = "Create a project, optionally nested under a parent project.")]
    async fn create_project(
        &self,
        params: Parameters<CreateProjectRequest>,
    ) -> Result<CallToolResult, McpError> {
        let fields = to_fields(&params.0)?;
        let project = self.client.create_project(&fields).await.map_err(tool_error)?;
        json_result(&project)
    }

    #[tool(description = "List sections, optionally limited to one project.")]
    async fn list_sections(
        &self,
        params: Parameters<ListSectionsRequest>,
    ) -> Result<CallToolResult, McpError> {
        let req = params.0;
        let page = self
            .client
            .list_sections(req.project_id.as_deref(), req.cursor.as_deref())
            .await
            .map_err(tool_error)?;
        json_result(&ListResponse { items: page.results, next_cursor: page.next_cursor })
    }

    #[tool(description = "Create a section in a project.")]
    async fn create_section(
        &self,
        params: Parameters<CreateSectionRequest>,
    ) -> Result<CallToolResult, McpError> {
        let req = params.0;
        let section = self
            .client
            .create_section(&req.project_id, &req.name)
            .await
            .map_err(tool_error)?;
        json_result(&section)
    }

    // ============================================================
    // Comments and labels
    // ============================================================

    #[tool(description = "List comments on a task or a project.")]
    async fn list_comments(
        &self,
        params: Parameters<ListCommentsRequest>,
    ) -> Result<CallToolResult, McpError> {
        let req = params.0;
        let parent = comment_parent(req.task_id, req.project_id)?;
        let page = self
            .client
            .list_comments(&parent, req.cursor.as_deref())
            .await
            .map_err(tool_error)?;
        json_result(&ListResponse { items: page.results, next_cursor: page.next_cursor })
    }

    #[tool(description = "Add a comment to a task or a project.")]
    async fn create_comment(
        &self,
        params: Parameters<CreateCommentRequest>,
    ) -> Result<CallToolResult, McpError> {
        let req = params.0;
        let parent = comment_parent(req.task_id, req.project_id)?;
        let comment = self
            .client
            .create_comment(&parent, &req.content)
            .await
            .map_err(tool_error)?;
        json_result(&comment)
    }

    #[tool(description = "List personal labels.")]
    async fn list_labels(
        &self,
        params: Parameters<ListLabelsRequest>,
    ) -> Result<CallToolResult, McpError> {
        let page = self
            .client
            .list_labels(params.0.cursor.as_deref())
            .await
            .map_err(tool_error)?;
        json_result(&ListResponse { items: page.results, next_cursor: page.next_cursor })
    }

    #[tool(description = "Create a personal label.")]
    async fn create_label(
        &self,
        params: Parameters<CreateLabelRequest>,
    ) -> Result<CallToolResult, McpError> {
        let req = params.0;
        let label = self
            .client
            .create_label(&req.name, req.color.as_deref())
            .await
            .map_err(tool_error)?;
        json_result(&label)
    }

    #[tool(description = "Rename a shared label on every task that carries it.")]
    async fn rename_shared_label(
        &self,
        params: Parameters<RenameSharedLabelRequest>,
    ) -> Result<CallToolResult, McpError> {
        let req = params.0;
        let result = self
            .run_single_sync(CommandArgs::SharedLabelRename(SharedLabelRenameArgs {
                name_old: req.name,
                name_new: req.new_name,
            }))
            .await?;
        json_result(&result)
    }

    #[tool(description = "Remove a shared label from every task that carries it.")]
    async fn remove_shared_label(
        &self,
        params: Parameters<RemoveSharedLabelRequest>,
    ) -> Result<CallToolResult, McpError> {
        let result = self
            .run_single_sync(CommandArgs::SharedLabelRemove(SharedLabelRemoveArgs {
                name: params.0.name,
            }))
            .await?;
        json_result(&result)
    }

    #[tool(
        description = "Add a reminder to a task: relative (minute_offset before the due time) or absolute (due_string or due_datetime). Returns the new reminder id."
    )]
    async fn add_reminder(
        &self,
        params: Parameters<AddReminderRequest>,
    ) -> Result<CallToolResult, McpError> {
        json_result(&self.run_add_reminder(params.0).await?)
    }

    // ============================================================
    // Bulk and batch
    // ============================================================

    #[tool(
        description = "Apply one action (update, complete, uncomplete, move, delete) to up to 50 tasks. Repeated ids are dropped. Partial failure is normal: check each entry of results. Bulk update cannot change content, description or comments."
    )]
    async fn bulk_tasks(
        &self,
        params: Parameters<BulkTasksRequest>,
    ) -> Result<CallToolResult, McpError> {
        json_result(&self.run_bulk_tasks(params.0).await?)
    }

    #[tool(
        description = "Submit up to 100 raw sync commands in one request. Use temp_id to reference entities created earlier in the same batch. Set validate_only to dry-run."
    )]
    async fn batch_commands(
        &self,
        params: Parameters<BatchCommandsRequest>,
    ) -> Result<CallToolResult, McpError> {
        json_result(&self.run_batch_commands(params.0).await?)
    }

    #[tool(description = "Show the remaining REST and Sync request budget and when it resets.")]
    async fn rate_limit_status(&self) -> Result<CallToolResult, McpError> {
        json_result(&self.test_rate_limit_status())
    }
}

#[tool_handler]
impl ServerHandler for TodoistMcpServer {
    fn get_info(&self) -> ServerInfo {
        ServerInfo {
            server_info: rmcp::model::Implementation {
                name: "todoist-mcp".into(),
                version: env!("CARGO_PKG_VERSION").into(),
                title: None,
                icons: None,
                website_url: None,
            },
            capabilities: rmcp::model::ServerCapabilities::builder()
                .enable_tools()
                .build(),
            instructions: Some(
                r#"Tools for reading and changing a Todoist account.

- Use list_projects first to find project ids; tasks, sections and comments refer to them.
- For changes to many tasks prefer bulk_tasks over repeated single calls. It accepts at most 50 distinct task ids and reports success per task.
- batch_commands is the low-level escape hatch for raw sync commands (at most 100).
- Requests are rate limited (REST and Sync budgets are separate). rate_limit_status shows what is left."#
                    .into(),
            ),
            ..Default::default()
        }
    }
}

pub async fn run_stdio_server(client: TodoistClient) -> anyhow::Result<()> {
    use tokio::io::{stdin, stdout};

    tracing::info!("Starting MCP server via stdio");

    let service = TodoistMcpServer::new(client);
    let server = service.serve((stdin(), stdout())).await?;

    let quit_reason = server.waiting().await?;
    tracing::info!("MCP server stopped: {:?}", quit_reason);

    Ok(())
}
