//! Scripted input source replaying timed binding events.

use std::collections::{BTreeMap, BTreeSet, VecDeque};
use std::fs;
use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::core::collaborators::InputSource;
use crate::core::types::{Binding, TaskId};

/// One scripted event: `binding` fires once the run clock reaches `at_seconds`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ScriptedEvent {
    pub at_seconds: f64,
    pub binding: Binding,
}

/// Input source fed by a script and by direct presses.
///
/// An event is delivered to every task registered for its binding at the
/// moment it fires, and dropped when nobody listens.
#[derive(Debug, Default)]
pub struct ScriptedInput {
    script: VecDeque<(Duration, Binding)>,
    handlers: BTreeMap<TaskId, BTreeSet<Binding>>,
    inbox: BTreeMap<TaskId, Vec<Binding>>,
}

impl ScriptedInput {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build from events; they are replayed in time order.
    pub fn from_events(events: Vec<ScriptedEvent>) -> Result<Self> {
        let mut script = Vec::with_capacity(events.len());
        for event in events {
            let at = Duration::try_from_secs_f64(event.at_seconds)
                .map_err(|err| anyhow!("invalid event time {}: {err}", event.at_seconds))?;
            script.push((at, event.binding));
        }
        script.sort_by_key(|(at, _)| *at);
        Ok(Self {
            script: script.into(),
            ..Self::default()
        })
    }

    /// Load a JSON array of `{ "at_seconds", "binding" }` events.
    pub fn load(path: &Path) -> Result<Self> {
        let contents =
            fs::read_to_string(path).with_context(|| format!("read events {}", path.display()))?;
        let events: Vec<ScriptedEvent> = serde_json::from_str(&contents)
            .with_context(|| format!("parse events {}", path.display()))?;
        Self::from_events(events).with_context(|| format!("load events {}", path.display()))
    }

    /// Deliver `binding` right away.
    pub fn press(&mut self, binding: Binding) {
        let owners: Vec<TaskId> = self
            .handlers
            .iter()
            .filter(|(_, bindings)| bindings.contains(&binding))
            .map(|(owner, _)| *owner)
            .collect();
        if owners.is_empty() {
            debug!(%binding, "input dropped, no handler registered");
            return;
        }
        for owner in owners {
            self.inbox.entry(owner).or_default().push(binding.clone());
        }
    }

    /// Handlers still registered across all tasks.
    pub fn registered_count(&self) -> usize {
        self.handlers.values().map(BTreeSet::len).sum()
    }

    pub fn remaining_events(&self) -> usize {
        self.script.len()
    }
}

impl InputSource for ScriptedInput {
    fn register(&mut self, owner: TaskId, binding: Binding) {
        self.handlers.entry(owner).or_default().insert(binding);
    }

    fn unregister(&mut self, owner: TaskId, binding: &Binding) {
        if let Some(bindings) = self.handlers.get_mut(&owner) {
            bindings.remove(binding);
            if bindings.is_empty() {
                self.handlers.remove(&owner);
            }
        }
    }

    fn unregister_all(&mut self, owner: TaskId) {
        self.handlers.remove(&owner);
        self.inbox.remove(&owner);
    }

    fn drain(&mut self, owner: TaskId) -> Vec<Binding> {
        self.inbox.remove(&owner).unwrap_or_default()
    }

    fn begin_tick(&mut self, now: Duration) {
        while self.script.front().is_some_and(|(at, _)| *at <= now) {
            if let Some((at, binding)) = self.script.pop_front() {
                debug!(at_ms = at.as_millis() as u64, %binding, "scripted input fired");
                self.press(binding);
            }
        }
    }
}
