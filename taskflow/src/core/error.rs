//! Fatal engine errors.
//!
//! Every variant halts the run. Recoverable conditions (unset kind, navigation
//! clamps, context misses, finish without prepare) are logged instead.

use thiserror::Error;

use crate::core::types::TaskId;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum TaskError {
    /// A collaborator the task needs was not supplied in the environment.
    #[error("task '{task}' ({id}) requires a configured {collaborator}")]
    MissingCollaborator {
        task: String,
        id: TaskId,
        collaborator: &'static str,
    },
    /// A behavior needs an enclosing repeat or navigable task.
    #[error("task '{task}' ({id}) must be a descendant of a {ancestor}")]
    MissingAncestor {
        task: String,
        id: TaskId,
        ancestor: &'static str,
    },
    #[error("repeat task '{task}' ({id}): row source unavailable: {reason}")]
    RowSourceUnavailable {
        task: String,
        id: TaskId,
        reason: String,
    },
    #[error("repeat task '{task}' ({id}): {reason}")]
    InvalidRepeatPolicy {
        task: String,
        id: TaskId,
        reason: String,
    },
    #[error("task '{task}' ({id}) behavior failed: {message}")]
    Behavior {
        task: String,
        id: TaskId,
        message: String,
    },
}

impl TaskError {
    /// Tag used when the error is reported to the experiment log.
    pub fn tag(&self) -> &'static str {
        match self {
            TaskError::MissingCollaborator { .. } | TaskError::MissingAncestor { .. } => "config",
            TaskError::RowSourceUnavailable { .. } | TaskError::InvalidRepeatPolicy { .. } => {
                "repeat"
            }
            TaskError::Behavior { .. } => "task",
        }
    }
}
