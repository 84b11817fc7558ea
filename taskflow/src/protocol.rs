//! Authored protocol documents and their conversion into task trees.

use std::collections::BTreeSet;
use std::time::Duration;

use anyhow::{Result, anyhow};
use serde::{Deserialize, Serialize};

use crate::behaviors::BehaviorSpec;
use crate::core::repeat::RepeatController;
use crate::core::task::TaskNode;
use crate::core::timer::TimerBound;
use crate::core::types::{Row, TaskKind};
use crate::io::table::TableRows;

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct TaskSpec {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<u32>,
    #[serde(default)]
    pub kind: TaskKind,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timer: Option<TimerSpec>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub behavior: Option<BehaviorSpec>,
    #[serde(default)]
    pub navigable: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub repeat: Option<RepeatSpec>,
    #[serde(default)]
    pub children: Vec<TaskSpec>,
}

fn default_enabled() -> bool {
    true
}

/// Run-phase bound in seconds: fixed, or re-sampled from `[min, max]`.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq)]
#[serde(untagged)]
pub enum TimerSpec {
    Fixed { seconds: f64 },
    Randomized { min: f64, max: f64 },
}

impl TimerSpec {
    pub fn to_bound(self) -> Result<TimerBound> {
        match self {
            TimerSpec::Fixed { seconds } => Ok(TimerBound::Fixed(seconds_to_duration(seconds)?)),
            TimerSpec::Randomized { min, max } => Ok(TimerBound::Randomized {
                min: seconds_to_duration(min)?,
                max: seconds_to_duration(max)?,
            }),
        }
    }
}

fn seconds_to_duration(seconds: f64) -> Result<Duration> {
    Duration::try_from_secs_f64(seconds).map_err(|err| anyhow!("invalid timer value {seconds}: {err}"))
}

#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
pub struct RepeatSpec {
    /// Iterations when no table rows are available.
    #[serde(default)]
    pub count: u32,
    /// Dataset name; defaults to the task name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output: Option<String>,
    #[serde(default)]
    pub columns: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub table: Option<TableSpec>,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
pub struct TableSpec {
    #[serde(default)]
    pub rows: Vec<Row>,
    /// Non-zero seeds shuffle the visiting order once.
    #[serde(default)]
    pub seed: u64,
}

impl TaskSpec {
    /// Dataset name a repeat node writes to.
    pub fn dataset_name(&self) -> Option<&str> {
        self.repeat
            .as_ref()
            .map(|repeat| repeat.output.as_deref().unwrap_or(&self.name))
    }

    /// Give every node without an explicit id the smallest unused id, in
    /// pre-order. Explicit ids are left alone.
    pub fn assign_ids(&mut self) {
        let mut used = BTreeSet::new();
        self.collect_ids(&mut used);
        let mut next = 0;
        self.fill_ids(&mut used, &mut next);
    }

    fn collect_ids(&self, used: &mut BTreeSet<u32>) {
        if let Some(id) = self.id {
            used.insert(id);
        }
        for child in &self.children {
            child.collect_ids(used);
        }
    }

    fn fill_ids(&mut self, used: &mut BTreeSet<u32>, next: &mut u32) {
        if self.id.is_none() {
            while used.contains(next) {
                *next += 1;
            }
            self.id = Some(*next);
            used.insert(*next);
        }
        for child in &mut self.children {
            child.fill_ids(used, next);
        }
    }

    /// Build the executable tree. Missing ids are assigned first.
    pub fn build(&self) -> Result<TaskNode> {
        let mut spec = self.clone();
        spec.assign_ids();
        spec.build_node()
    }

    fn build_node(&self) -> Result<TaskNode> {
        let mut node = TaskNode::new(self.id.unwrap_or_default(), self.name.clone(), self.kind)
            .with_enabled(self.enabled);
        if let Some(timer) = self.timer {
            node = node.with_timer(timer.to_bound()?);
        }
        if let Some(behavior) = &self.behavior {
            node = node.with_boxed_behavior(behavior.instantiate());
        }
        if self.navigable && self.repeat.is_some() {
            return Err(anyhow!(
                "task '{}' cannot be both navigable and repeat",
                self.name
            ));
        }
        if self.navigable {
            node = node.navigable();
        }
        if let Some(repeat) = &self.repeat {
            node = node.repeating(self.controller(repeat));
        }
        for child in &self.children {
            node.add_child(child.build_node()?);
        }
        Ok(node)
    }

    fn controller(&self, repeat: &RepeatSpec) -> RepeatController {
        let mut controller = RepeatController::fixed(repeat.count);
        if let Some(table) = &repeat.table {
            controller =
                controller.with_rows(Box::new(TableRows::with_seed(table.rows.clone(), table.seed)));
        }
        let output = repeat.output.clone().unwrap_or_else(|| self.name.clone());
        controller.with_output(output, repeat.columns.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::TaskId;

    fn parse(raw: &str) -> TaskSpec {
        serde_json::from_str(raw).expect("parse protocol")
    }

    #[test]
    fn defaults_apply_to_sparse_nodes() {
        let spec = parse(r#"{ "name": "root" }"#);

        assert_eq!(spec.kind, TaskKind::Unset);
        assert!(spec.enabled);
        assert!(!spec.navigable);
        assert!(spec.children.is_empty());
    }

    #[test]
    fn timers_parse_fixed_and_randomized() {
        let fixed: TimerSpec = serde_json::from_str(r#"{ "seconds": 2.5 }"#).expect("fixed");
        let random: TimerSpec = serde_json::from_str(r#"{ "min": 1, "max": 3 }"#).expect("random");

        assert_eq!(
            fixed.to_bound().expect("bound"),
            TimerBound::Fixed(Duration::from_millis(2500))
        );
        assert_eq!(
            random.to_bound().expect("bound"),
            TimerBound::Randomized {
                min: Duration::from_secs(1),
                max: Duration::from_secs(3)
            }
        );
        assert!(TimerSpec::Fixed { seconds: -1.0 }.to_bound().is_err());
    }

    #[test]
    fn ids_fill_gaps_in_pre_order() {
        let mut spec = parse(
            r#"{ "name": "root", "children": [
                { "name": "a", "id": 1 },
                { "name": "b", "children": [ { "name": "b1" } ] },
                { "name": "c" }
            ] }"#,
        );

        spec.assign_ids();

        assert_eq!(spec.id, Some(0));
        assert_eq!(spec.children[0].id, Some(1));
        assert_eq!(spec.children[1].id, Some(2));
        assert_eq!(spec.children[1].children[0].id, Some(3));
        assert_eq!(spec.children[2].id, Some(4));
    }

    #[test]
    fn build_wires_flows_and_links() {
        let spec = parse(
            r#"{ "name": "root", "kind": "structural", "children": [
                { "name": "trials", "kind": "structural",
                  "repeat": { "count": 2, "columns": ["rt"] },
                  "children": [ { "name": "trial", "kind": "functional" } ] },
                { "name": "calibration", "kind": "structural", "navigable": true,
                  "children": [ { "name": "place", "kind": "interactive" } ] }
            ] }"#,
        );

        let root = spec.build().expect("build");

        assert_eq!(root.child_names(), vec!["trials", "calibration"]);
        assert!(root.children()[0].is_repeat());
        assert!(root.children()[1].is_navigable());
        let place = root.find(TaskId(4)).expect("place");
        assert_eq!(place.links().navigable, Some(TaskId(3)));
        let trial = root.find(TaskId(2)).expect("trial");
        assert_eq!(trial.links().repeat, Some(TaskId(1)));
    }

    #[test]
    fn dataset_name_defaults_to_task_name() {
        let spec = parse(r#"{ "name": "block", "repeat": { "count": 1 } }"#);
        assert_eq!(spec.dataset_name(), Some("block"));

        let named = parse(r#"{ "name": "block", "repeat": { "output": "rts" } }"#);
        assert_eq!(named.dataset_name(), Some("rts"));
    }

    #[test]
    fn navigable_repeat_is_rejected_at_build() {
        let spec = parse(r#"{ "name": "both", "navigable": true, "repeat": { "count": 1 } }"#);
        assert!(spec.build().is_err());
    }
}
