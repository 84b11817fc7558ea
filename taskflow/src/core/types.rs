//! Shared deterministic types for the task engine.
//!
//! These types define stable contracts between the lifecycle, composite and
//! collaborator layers. They carry no I/O and must remain deterministic.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

/// Stable numeric task identifier used for bookkeeping and handler ownership.
///
/// Not required to be globally unique; the protocol loader assigns pre-order
/// ids when the document omits them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TaskId(pub u32);

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Task classification; drives the default run-phase behavior.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskKind {
    /// Grouping node; run phase completes immediately.
    Structural,
    /// Does its work during prepare; run phase completes immediately.
    Functional,
    /// Waits for an input signal, timer expiry or an explicit stop.
    Interactive,
    /// Misconfigured node. Waits like `Interactive` and logs an error on every prepare.
    #[default]
    Unset,
}

impl TaskKind {
    /// True if the run phase holds until something marks the task not-running.
    pub fn waits_for_signal(self) -> bool {
        matches!(self, TaskKind::Interactive | TaskKind::Unset)
    }
}

/// Navigation request raised by a descendant of a navigable collection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MoveDirection {
    #[default]
    None,
    Next,
    Previous,
}

impl MoveDirection {
    /// Read and clear the pending request.
    pub fn take(&mut self) -> MoveDirection {
        std::mem::take(self)
    }
}

/// Result of a single scheduler tick delivered to a node.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tick {
    StillRunning,
    Done,
}

/// Lifecycle phase of a task node.
///
/// `Idle -> RunPhase -> Subtree -> Finished`. Prepare is instantaneous and
/// happens on the `Idle -> RunPhase` edge; a skipped run phase (structural and
/// functional kinds) passes straight through to `Subtree` in the same tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Phase {
    #[default]
    Idle,
    RunPhase,
    Subtree,
    Finished,
}

/// Named input handler binding (confirm, key or controller button).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Binding {
    Confirm,
    Key(String),
    Button(String),
}

impl fmt::Display for Binding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Binding::Confirm => write!(f, "confirm"),
            Binding::Key(name) => write!(f, "key:{name}"),
            Binding::Button(name) => write!(f, "button:{name}"),
        }
    }
}

impl std::str::FromStr for Binding {
    type Err = String;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        let raw = raw.trim();
        if raw == "confirm" {
            return Ok(Binding::Confirm);
        }
        match raw.split_once(':') {
            Some(("key", name)) if !name.is_empty() => Ok(Binding::Key(name.to_string())),
            Some(("button", name)) if !name.is_empty() => Ok(Binding::Button(name.to_string())),
            _ => Err(format!(
                "invalid binding '{raw}' (expected confirm, key:<name> or button:<name>)"
            )),
        }
    }
}

impl Serialize for Binding {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Binding {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}

/// One row handed out by a row source.
pub type Row = BTreeMap<String, String>;

/// Per-iteration key/value store owned by a repeat controller.
pub type SharedContext = BTreeMap<String, String>;
