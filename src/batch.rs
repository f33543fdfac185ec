//! Generic batch execution over the sync protocol.
//!
//! A batch is validated locally (size, uuid and temp id uniqueness, declared
//! dependencies), optionally dry-run, then submitted once through
//! [`TodoistClient::execute_batch`] and folded into a [`BatchOperationResult`].

use std::collections::{HashMap, HashSet};

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::client::TodoistClient;
use crate::error::{ErrorKind, Result, TodoistError};
use crate::sync::{PendingCommand, SyncCommand, SyncResponse};

/// Most commands accepted in one batch.
pub const MAX_BATCH_COMMANDS: usize = 100;

/// Declares that command `command_index` refers to the temp id `depends_on`
/// created by another command in the same batch.
///
/// Dependencies are checked for existence only; commands still run in
/// submission order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommandDependency {
    pub command_index: usize,
    pub depends_on: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BatchOptions {
    /// Keep evaluating results after the first failed command.
    #[serde(default)]
    pub continue_on_error: bool,
    /// Validate and report without submitting anything.
    #[serde(default)]
    pub validate_only: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct BatchRequest {
    pub commands: Vec<PendingCommand>,
    #[serde(default)]
    pub dependencies: Vec<CommandDependency>,
    #[serde(default)]
    pub options: BatchOptions,
}

impl BatchRequest {
    pub fn new(commands: Vec<PendingCommand>) -> Self {
        Self {
            commands,
            dependencies: Vec::new(),
            options: BatchOptions::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BatchOperationError {
    /// Position in the submitted batch, or -1 for a failure of the whole call.
    pub command_index: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub command_uuid: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub command_type: Option<String>,
    pub error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_code: Option<i64>,
}

#[derive(Debug, Clone, Serialize)]
pub struct BatchOperationResult {
    pub success: bool,
    pub completed_commands: usize,
    pub failed_commands: usize,
    /// Commands not evaluated because the batch stopped at a failure.
    pub skipped_commands: usize,
    pub errors: Vec<BatchOperationError>,
    pub temp_id_mapping: HashMap<String, String>,
}

impl BatchOperationResult {
    pub fn total_commands(&self) -> usize {
        self.completed_commands + self.failed_commands + self.skipped_commands
    }
}

/// Check size limits, assign missing uuids and reject duplicate uuids or
/// temp ids.
pub fn prepare_commands(pending: Vec<PendingCommand>) -> Result<Vec<SyncCommand>> {
    if pending.is_empty() {
        return Err(TodoistError::Validation(
            "batch must contain at least one command".to_string(),
        ));
    }
    if pending.len() > MAX_BATCH_COMMANDS {
        return Err(TodoistError::Validation(format!(
            "batch contains {} commands; at most {} are allowed",
            pending.len(),
            MAX_BATCH_COMMANDS
        )));
    }

    let commands: Vec<SyncCommand> = pending.into_iter().map(PendingCommand::into_command).collect();

    let mut uuids = HashSet::new();
    let mut temp_ids = HashSet::new();
    for (index, command) in commands.iter().enumerate() {
        if !uuids.insert(command.uuid.as_str()) {
            return Err(TodoistError::Validation(format!(
                "command {} reuses uuid {}",
                index, command.uuid
            )));
        }
        if let Some(ref temp_id) = command.temp_id {
            if !temp_ids.insert(temp_id.as_str()) {
                return Err(TodoistError::Validation(format!(
                    "command {} reuses temp_id {}",
                    index, temp_id
                )));
            }
        }
    }

    Ok(commands)
}

/// Every dependency must point at a command in the batch and at a temp id
/// some other command declares.
pub fn validate_dependencies(
    commands: &[SyncCommand],
    dependencies: &[CommandDependency],
) -> Result<()> {
    for dep in dependencies {
        let Some(command) = commands.get(dep.command_index) else {
            return Err(TodoistError::Validation(format!(
                "dependency refers to command {} but the batch has {} commands",
                dep.command_index,
                commands.len()
            )));
        };

        let provider = commands
            .iter()
            .position(|c| c.temp_id.as_deref() == Some(dep.depends_on.as_str()));
        match provider {
            None => {
                return Err(TodoistError::Validation(format!(
                    "command {} depends on unknown temp_id {}",
                    dep.command_index, dep.depends_on
                )))
            }
            Some(index) if index == dep.command_index => {
                return Err(TodoistError::Validation(format!(
                    "command {} ({}) depends on its own temp_id {}",
                    dep.command_index,
                    command.verb(),
                    dep.depends_on
                )))
            }
            Some(_) => {}
        }
    }
    Ok(())
}

/// Fold per-command statuses in submission order.
pub fn fold_sync_response(
    commands: &[SyncCommand],
    response: &SyncResponse,
    continue_on_error: bool,
) -> BatchOperationResult {
    let declared: HashSet<&str> = commands.iter().filter_map(|c| c.temp_id.as_deref()).collect();
    let temp_id_mapping = response
        .temp_id_mapping
        .iter()
        .filter(|(temp_id, _)| declared.contains(temp_id.as_str()))
        .map(|(k, v)| (k.clone(), v.clone()))
        .collect();

    let mut result = BatchOperationResult {
        success: true,
        completed_commands: 0,
        failed_commands: 0,
        skipped_commands: 0,
        errors: Vec::new(),
        temp_id_mapping,
    };

    for (index, command) in commands.iter().enumerate() {
        match response.command_result(&command.uuid) {
            Ok(()) => result.completed_commands += 1,
            Err(err) => {
                result.failed_commands += 1;
                result.errors.push(BatchOperationError {
                    command_index: index as i64,
                    command_uuid: Some(command.uuid.clone()),
                    command_type: Some(command.verb().to_string()),
                    error: err.message(),
                    error_code: err.error_code,
                });
                if !continue_on_error {
                    result.success = false;
                    result.skipped_commands = commands.len() - index - 1;
                    break;
                }
            }
        }
    }

    result
}

/// Batch orchestration on top of a [`TodoistClient`]. Holds no state of its
/// own.
#[derive(Debug, Clone)]
pub struct BatchService {
    client: TodoistClient,
}

impl BatchService {
    pub fn new(client: TodoistClient) -> Self {
        Self { client }
    }

    /// Run a batch.
    ///
    /// Structural problems and missing credentials are returned as errors.
    /// Anything else that goes wrong is reported inside the result.
    pub async fn execute(&self, request: BatchRequest) -> Result<BatchOperationResult> {
        let commands = prepare_commands(request.commands)?;
        validate_dependencies(&commands, &request.dependencies)?;
        let total = commands.len();

        if request.options.validate_only {
            info!(commands = total, "Batch validated (dry run)");
            return Ok(BatchOperationResult {
                success: true,
                completed_commands: total,
                failed_commands: 0,
                skipped_commands: 0,
                errors: Vec::new(),
                temp_id_mapping: HashMap::new(),
            });
        }

        let response = match self.client.execute_batch(&commands).await {
            Ok(response) => response,
            Err(err) if err.kind() == ErrorKind::Authentication => return Err(err),
            Err(err) => {
                warn!(commands = total, error = %err, "Batch submission failed");
                return Ok(BatchOperationResult {
                    success: false,
                    completed_commands: 0,
                    failed_commands: total,
                    skipped_commands: 0,
                    errors: vec![BatchOperationError {
                        command_index: -1,
                        command_uuid: None,
                        command_type: None,
                        error: err.user_message(),
                        error_code: None,
                    }],
                    temp_id_mapping: HashMap::new(),
                });
            }
        };

        let result = fold_sync_response(&commands, &response, request.options.continue_on_error);
        info!(
            completed = result.completed_commands,
            failed = result.failed_commands,
            skipped = result.skipped_commands,
            "Batch executed"
        );
        Ok(result)
    }
}
