//! Typed sync commands.
//!
//! On the wire a command is `{"type", "uuid", "temp_id"?, "args"}`. Here the
//! verb and its args travel together as one [`CommandArgs`] variant, with
//! [`CommandArgs::Other`] carrying verbs this crate does not model.

use serde::de::DeserializeOwned;
use serde::ser::SerializeStruct;
use serde::{Deserialize, Serialize, Serializer};
use serde_json::{Map, Value};
use uuid::Uuid;

use crate::error::TodoistError;
use crate::models::MoveTarget;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IdArgs {
    pub id: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ItemAddArgs {
    pub content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub project_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub section_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub labels: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub priority: Option<u8>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub due: Option<Value>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Changes for one task. Only fields present are sent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ItemUpdateArgs {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub priority: Option<u8>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub labels: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub due: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub responsible_uid: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl ItemUpdateArgs {
    /// Build update args for `id` from a field map in sync-API naming.
    pub fn from_fields(id: &str, fields: &Map<String, Value>) -> Result<Self, TodoistError> {
        let mut args = fields.clone();
        args.insert("id".to_string(), Value::String(id.to_string()));
        parse_args("item_update", Value::Object(args))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ItemMoveArgs {
    pub id: String,
    #[serde(flatten)]
    pub target: MoveTarget,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProjectAddArgs {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub color: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SectionAddArgs {
    pub name: String,
    pub project_id: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NoteAddArgs {
    pub content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub item_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub project_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReminderAddArgs {
    pub item_id: String,
    /// `relative`, `absolute` or `location`.
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub reminder_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub due: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub minute_offset: Option<i64>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SharedLabelRenameArgs {
    pub name_old: String,
    pub name_new: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SharedLabelRemoveArgs {
    pub name: String,
}

/// A sync command verb with its arguments.
#[derive(Debug, Clone, PartialEq)]
pub enum CommandArgs {
    ItemAdd(ItemAddArgs),
    ItemUpdate(ItemUpdateArgs),
    ItemMove(ItemMoveArgs),
    ItemComplete(IdArgs),
    ItemUncomplete(IdArgs),
    ItemDelete(IdArgs),
    ProjectAdd(ProjectAddArgs),
    SectionAdd(SectionAddArgs),
    NoteAdd(NoteAddArgs),
    ReminderAdd(ReminderAddArgs),
    ReminderDelete(IdArgs),
    SharedLabelRename(SharedLabelRenameArgs),
    SharedLabelRemove(SharedLabelRemoveArgs),
    /// Any verb without a typed variant, passed through untouched.
    Other {
        verb: String,
        args: Map<String, Value>,
    },
}

fn parse_args<T: DeserializeOwned>(verb: &str, args: Value) -> Result<T, TodoistError> {
    serde_json::from_value(args)
        .map_err(|e| TodoistError::Validation(format!("invalid args for {}: {}", verb, e)))
}

impl CommandArgs {
    pub fn verb(&self) -> &str {
        match self {
            Self::ItemAdd(_) => "item_add",
            Self::ItemUpdate(_) => "item_update",
            Self::ItemMove(_) => "item_move",
            Self::ItemComplete(_) => "item_complete",
            Self::ItemUncomplete(_) => "item_uncomplete",
            Self::ItemDelete(_) => "item_delete",
            Self::ProjectAdd(_) => "project_add",
            Self::SectionAdd(_) => "section_add",
            Self::NoteAdd(_) => "note_add",
            Self::ReminderAdd(_) => "reminder_add",
            Self::ReminderDelete(_) => "reminder_delete",
            Self::SharedLabelRename(_) => "shared_label_rename",
            Self::SharedLabelRemove(_) => "shared_label_remove",
            Self::Other { verb, .. } => verb,
        }
    }

    /// Parse wire-level `type` and `args` into a typed variant.
    pub fn from_parts(verb: &str, args: Value) -> Result<Self, TodoistError> {
        let args = match args {
            Value::Null => Value::Object(Map::new()),
            other => other,
        };

        Ok(match verb {
            "item_add" => Self::ItemAdd(parse_args(verb, args)?),
            "item_update" => Self::ItemUpdate(parse_args(verb, args)?),
            "item_move" => Self::ItemMove(parse_args(verb, args)?),
            "item_complete" => Self::ItemComplete(parse_args(verb, args)?),
            "item_uncomplete" => Self::ItemUncomplete(parse_args(verb, args)?),
            "item_delete" => Self::ItemDelete(parse_args(verb, args)?),
            "project_add" => Self::ProjectAdd(parse_args(verb, args)?),
            "section_add" => Self::SectionAdd(parse_args(verb, args)?),
            "note_add" => Self::NoteAdd(parse_args(verb, args)?),
            "reminder_add" => Self::ReminderAdd(parse_args(verb, args)?),
            "reminder_delete" => Self::ReminderDelete(parse_args(verb, args)?),
            "shared_label_rename" => Self::SharedLabelRename(parse_args(verb, args)?),
            "shared_label_remove" => Self::SharedLabelRemove(parse_args(verb, args)?),
            "" => {
                return Err(TodoistError::Validation(
                    "command type must not be empty".to_string(),
                ))
            }
            _ => match args {
                Value::Object(args) => Self::Other {
                    verb: verb.to_string(),
                    args,
                },
                _ => {
                    return Err(TodoistError::Validation(format!(
                        "args for {} must be an object",
                        verb
                    )))
                }
            },
        })
    }
}

impl Serialize for CommandArgs {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Self::ItemAdd(a) => a.serialize(serializer),
            Self::ItemUpdate(a) => a.serialize(serializer),
            Self::ItemMove(a) => a.serialize(serializer),
            Self::ItemComplete(a) | Self::ItemUncomplete(a) | Self::ItemDelete(a) => {
                a.serialize(serializer)
            }
            Self::ProjectAdd(a) => a.serialize(serializer),
            Self::SectionAdd(a) => a.serialize(serializer),
            Self::NoteAdd(a) => a.serialize(serializer),
            Self::ReminderAdd(a) => a.serialize(serializer),
            Self::ReminderDelete(a) => a.serialize(serializer),
            Self::SharedLabelRename(a) => a.serialize(serializer),
            Self::SharedLabelRemove(a) => a.serialize(serializer),
            Self::Other { args, .. } => args.serialize(serializer),
        }
    }
}

/// A command ready for submission, with its uuid assigned.
#[derive(Debug, Clone, PartialEq)]
pub struct SyncCommand {
    pub args: CommandArgs,
    pub uuid: String,
    pub temp_id: Option<String>,
}

impl SyncCommand {
    pub fn new(args: CommandArgs) -> Self {
        Self {
            args,
            uuid: Uuid::new_v4().to_string(),
            temp_id: None,
        }
    }

    pub fn with_temp_id(mut self, temp_id: impl Into<String>) -> Self {
        self.temp_id = Some(temp_id.into());
        self
    }

    pub fn with_uuid(mut self, uuid: impl Into<String>) -> Self {
        self.uuid = uuid.into();
        self
    }

    pub fn verb(&self) -> &str {
        self.args.verb()
    }
}

impl Serialize for SyncCommand {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut state = serializer.serialize_struct("SyncCommand", 4)?;
        state.serialize_field("type", self.args.verb())?;
        state.serialize_field("uuid", &self.uuid)?;
        match self.temp_id {
            Some(ref temp_id) => state.serialize_field("temp_id", temp_id)?,
            None => state.skip_field("temp_id")?,
        }
        state.serialize_field("args", &self.args)?;
        state.end()
    }
}

#[derive(Debug, Deserialize)]
struct WireCommand {
    #[serde(rename = "type")]
    verb: String,
    #[serde(default)]
    uuid: Option<String>,
    #[serde(default)]
    temp_id: Option<String>,
    #[serde(default)]
    args: Value,
}

/// A caller-supplied command whose uuid may still be missing.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(try_from = "WireCommand")]
pub struct PendingCommand {
    pub args: CommandArgs,
    pub uuid: Option<String>,
    pub temp_id: Option<String>,
}

impl TryFrom<WireCommand> for PendingCommand {
    type Error = TodoistError;

    fn try_from(wire: WireCommand) -> Result<Self, Self::Error> {
        Ok(Self {
            args: CommandArgs::from_parts(&wire.verb, wire.args)?,
            uuid: wire.uuid.filter(|u| !u.trim().is_empty()),
            temp_id: wire.temp_id.filter(|t| !t.trim().is_empty()),
        })
    }
}

impl PendingCommand {
    /// Assign a fresh uuid when none was given.
    pub fn into_command(self) -> SyncCommand {
        SyncCommand {
            args: self.args,
            uuid: self.uuid.unwrap_or_else(|| Uuid::new_v4().to_string()),
            temp_id: self.temp_id,
        }
    }
}

impl From<SyncCommand> for PendingCommand {
    fn from(command: SyncCommand) -> Self {
        Self {
            args: command.args,
            uuid: Some(command.uuid),
            temp_id: command.temp_id,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn serializes_to_wire_shape() {
        let command = SyncCommand::new(CommandArgs::ItemComplete(IdArgs { id: "42".into() }))
            .with_uuid("u-1");

        assert_eq!(
            serde_json::to_value(&command).unwrap(),
            json!({"type": "item_complete", "uuid": "u-1", "args": {"id": "42"}})
        );
    }

    #[test]
    fn temp_id_is_emitted_when_present() {
        let command = SyncCommand::new(CommandArgs::SectionAdd(SectionAddArgs {
            name: "Backlog".into(),
            project_id: "7".into(),
        }))
        .with_uuid("u-2")
        .with_temp_id("tmp-section");

        let value = serde_json::to_value(&command).unwrap();
        assert_eq!(value["temp_id"], "tmp-section");
        assert_eq!(value["args"]["name"], "Backlog");
    }

    #[test]
    fn pending_command_parses_typed_verb() {
        let pending: PendingCommand = serde_json::from_value(json!({
            "type": "item_add",
            "temp_id": "t1",
            "args": {"content": "Write tests", "priority": 3, "child_order": 2}
        }))
        .unwrap();

        match pending.args {
            CommandArgs::ItemAdd(ref args) => {
                assert_eq!(args.content, "Write tests");
                assert_eq!(args.priority, Some(3));
                assert_eq!(args.extra.get("child_order"), Some(&json!(2)));
            }
            ref other => panic!("unexpected variant: {:?}", other),
        }
        assert!(pending.uuid.is_none());
        assert_eq!(pending.temp_id.as_deref(), Some("t1"));
    }

    #[test]
    fn unknown_verb_falls_back_to_other() {
        let pending: PendingCommand = serde_json::from_value(json!({
            "type": "filter_add",
            "uuid": "abc",
            "args": {"name": "Urgent", "query": "p1"}
        }))
        .unwrap();

        assert_eq!(pending.args.verb(), "filter_add");
        let command = pending.into_command();
        assert_eq!(command.uuid, "abc");
        assert_eq!(
            serde_json::to_value(&command).unwrap()["args"],
            json!({"name": "Urgent", "query": "p1"})
        );
    }

    #[test]
    fn typed_verb_with_missing_args_is_rejected() {
        let result: Result<PendingCommand, _> =
            serde_json::from_value(json!({"type": "item_complete", "args": {}}));
        assert!(result.is_err());
    }

    #[test]
    fn into_command_assigns_distinct_uuids() {
        let make = || PendingCommand {
            args: CommandArgs::ItemDelete(IdArgs { id: "1".into() }),
            uuid: None,
            temp_id: None,
        };
        let a = make().into_command();
        let b = make().into_command();
        assert!(!a.uuid.is_empty());
        assert_ne!(a.uuid, b.uuid);
    }

    #[test]
    fn item_update_from_fields_types_known_keys() {
        let mut fields = Map::new();
        fields.insert("priority".into(), json!(4));
        fields.insert("labels".into(), json!(["home"]));
        fields.insert("day_order".into(), json!(1));

        let args = ItemUpdateArgs::from_fields("99", &fields).unwrap();
        assert_eq!(args.id, "99");
        assert_eq!(args.priority, Some(4));
        assert_eq!(args.labels, Some(vec!["home".to_string()]));
        assert_eq!(args.extra.get("day_order"), Some(&json!(1)));
    }
}
