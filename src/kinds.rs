//! Typed mutation variants for the productivity app's offline writes.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::mutation::{DecodeError, MutationKind, decode_payload};

/// Payload for creating a task.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewTask {
    /// Client-generated task id.
    pub id: String,
    /// Task title.
    pub title: String,
    /// Optional due date, epoch milliseconds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub due_at: Option<u64>,
}

/// Partial update of a task; `None` fields are left unchanged.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct TaskPatch {
    /// Target task id.
    pub id: String,
    /// New title.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    /// New due date.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub due_at: Option<u64>,
}

/// Payload for creating or replacing a note body.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NoteBody {
    /// Client-generated note id.
    pub id: String,
    /// Markdown body.
    pub body: String,
}

/// Reference to an entity by id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntityRef {
    /// Entity id.
    pub id: String,
}

/// A spaced-repetition revisit of a note.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Revisit {
    /// Revisited note id.
    pub note_id: String,
    /// When the revisit happened, epoch milliseconds.
    pub revisited_at: u64,
}

/// Joining a shared challenge.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChallengeJoin {
    /// Challenge id.
    pub challenge_id: String,
}

/// Every write the app can defer while offline.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AppMutation {
    /// `create_task`
    CreateTask(NewTask),
    /// `update_task`
    UpdateTask(TaskPatch),
    /// `complete_task`
    CompleteTask(EntityRef),
    /// `delete_task`
    DeleteTask(EntityRef),
    /// `create_note`
    CreateNote(NoteBody),
    /// `update_note`
    UpdateNote(NoteBody),
    /// `delete_note`
    DeleteNote(EntityRef),
    /// `log_revisit`
    LogRevisit(Revisit),
    /// `join_challenge`
    JoinChallenge(ChallengeJoin),
}

impl MutationKind for AppMutation {
    fn kind(&self) -> &'static str {
        match self {
            Self::CreateTask(_) => "create_task",
            Self::UpdateTask(_) => "update_task",
            Self::CompleteTask(_) => "complete_task",
            Self::DeleteTask(_) => "delete_task",
            Self::CreateNote(_) => "create_note",
            Self::UpdateNote(_) => "update_note",
            Self::DeleteNote(_) => "delete_note",
            Self::LogRevisit(_) => "log_revisit",
            Self::JoinChallenge(_) => "join_challenge",
        }
    }

    fn to_payload(&self) -> serde_json::Result<Value> {
        match self {
            Self::CreateTask(p) => serde_json::to_value(p),
            Self::UpdateTask(p) => serde_json::to_value(p),
            Self::CompleteTask(p) | Self::DeleteTask(p) | Self::DeleteNote(p) => {
                serde_json::to_value(p)
            }
            Self::CreateNote(p) | Self::UpdateNote(p) => serde_json::to_value(p),
            Self::LogRevisit(p) => serde_json::to_value(p),
            Self::JoinChallenge(p) => serde_json::to_value(p),
        }
    }

    fn from_parts(kind: &str, payload: Value) -> Result<Self, DecodeError> {
        let out = match kind {
            "create_task" => Self::CreateTask(decode_payload(kind, payload)?),
            "update_task" => Self::UpdateTask(decode_payload(kind, payload)?),
            "complete_task" => Self::CompleteTask(decode_payload(kind, payload)?),
            "delete_task" => Self::DeleteTask(decode_payload(kind, payload)?),
            "create_note" => Self::CreateNote(decode_payload(kind, payload)?),
            "update_note" => Self::UpdateNote(decode_payload(kind, payload)?),
            "delete_note" => Self::DeleteNote(decode_payload(kind, payload)?),
            "log_revisit" => Self::LogRevisit(decode_payload(kind, payload)?),
            "join_challenge" => Self::JoinChallenge(decode_payload(kind, payload)?),
            other => return Err(DecodeError::UnknownType(other.to_string())),
        };
        Ok(out)
    }
}
