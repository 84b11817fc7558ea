//! Repetition of a subtree, driven by a fixed count or by table rows.
//!
//! Each iteration runs the children as an ordinary sequence, then writes one
//! dataset row built from the shared context, resets every child and clears
//! the context before the next iteration starts.

use std::collections::BTreeSet;
use std::time::Duration;

use tracing::{debug, info};

use crate::core::collaborators::RowSource;
use crate::core::context::{Env, RepeatScope, Scope};
use crate::core::error::TaskError;
use crate::core::task::{TaskNode, report};
use crate::core::types::{Row, SharedContext, TaskId, Tick};

/// Policy chosen at prepare.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RepeatPolicy {
    FixedCount(u32),
    TableDriven { rows: usize },
}

impl RepeatPolicy {
    pub fn iterations(self) -> usize {
        match self {
            RepeatPolicy::FixedCount(count) => count as usize,
            RepeatPolicy::TableDriven { rows } => rows,
        }
    }
}

/// Progress snapshot for on-screen reporting.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RepeatProgress {
    /// 1-based iteration in progress (or next to start).
    pub iteration: u32,
    pub total: Option<usize>,
    /// 1-based child in progress within the iteration.
    pub subtask: usize,
    pub subtasks: usize,
}

pub struct RepeatController {
    count: u32,
    rows: Option<Box<dyn RowSource>>,
    output: Option<String>,
    columns: Vec<String>,

    policy: Option<RepeatPolicy>,
    dataset: String,
    dataset_open: bool,
    iteration: u32,
    subtask: usize,
    in_iteration: bool,
    context: SharedContext,
    row: Option<Row>,
}

impl RepeatController {
    /// Repeat the subtree `count` times.
    pub fn fixed(count: u32) -> Self {
        Self {
            count,
            rows: None,
            output: None,
            columns: Vec::new(),
            policy: None,
            dataset: String::new(),
            dataset_open: false,
            iteration: 1,
            subtask: 0,
            in_iteration: false,
            context: SharedContext::new(),
            row: None,
        }
    }

    /// Repeat once per row; falls back to the fixed count when `rows` is empty.
    pub fn table(rows: impl RowSource + 'static) -> Self {
        Self::fixed(0).with_rows(Box::new(rows))
    }

    pub fn with_rows(mut self, rows: Box<dyn RowSource>) -> Self {
        self.rows = Some(rows);
        self
    }

    pub fn with_count(mut self, count: u32) -> Self {
        self.count = count;
        self
    }

    /// Dataset written once per iteration. Defaults to the task name.
    pub fn with_output(mut self, name: impl Into<String>, columns: Vec<String>) -> Self {
        self.output = Some(name.into());
        self.columns = columns;
        self
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn policy(&self) -> Option<RepeatPolicy> {
        self.policy
    }

    pub fn context(&self) -> &SharedContext {
        &self.context
    }

    pub fn progress(&self, subtasks: usize) -> RepeatProgress {
        RepeatProgress {
            iteration: self.iteration,
            total: self.policy.map(RepeatPolicy::iterations),
            subtask: self.subtask + 1,
            subtasks,
        }
    }

    pub(crate) fn active_child(&self, child_count: usize) -> Option<usize> {
        (self.in_iteration && self.subtask < child_count).then_some(self.subtask)
    }

    pub(crate) fn prepare(
        &mut self,
        task: &str,
        id: TaskId,
        env: &mut Env<'_>,
    ) -> Result<(), TaskError> {
        let mut seen = BTreeSet::new();
        if let Some(duplicate) = self.columns.iter().find(|column| !seen.insert(column.as_str())) {
            return Err(TaskError::InvalidRepeatPolicy {
                task: task.to_string(),
                id,
                reason: format!("output column '{duplicate}' listed twice"),
            });
        }

        self.context.clear();
        self.row = None;
        self.iteration = 1;
        self.subtask = 0;
        self.in_iteration = false;

        let policy = match self.rows.as_deref_mut() {
            Some(rows) if rows.row_count() > 0 => {
                rows.reset();
                RepeatPolicy::TableDriven {
                    rows: rows.row_count(),
                }
            }
            _ => RepeatPolicy::FixedCount(self.count),
        };
        self.policy = Some(policy);
        self.dataset = self.output.clone().unwrap_or_else(|| task.to_string());
        info!(task, %id, ?policy, dataset = %self.dataset, "repeat prepared");

        env.log.begin_dataset(&self.dataset, &self.columns);
        self.dataset_open = true;
        Ok(())
    }

    pub(crate) fn drive(
        &mut self,
        task: &str,
        id: TaskId,
        children: &mut [TaskNode],
        dt: Duration,
        env: &mut Env<'_>,
        scope: &mut Scope<'_>,
    ) -> Result<Tick, TaskError> {
        loop {
            if !self.in_iteration {
                match self.begin_iteration(task, id) {
                    Ok(true) => {}
                    Ok(false) => return Ok(Tick::Done),
                    Err(err) => {
                        self.close_dataset(env);
                        return Err(report(env, err));
                    }
                }
            }

            while let Some(child) = children.get_mut(self.subtask) {
                let mut child_scope = Scope {
                    nav: scope.nav.as_deref_mut(),
                    repeat: Some(RepeatScope {
                        context: &mut self.context,
                        row: self.row.as_ref(),
                        iteration: self.iteration,
                    }),
                };
                match child.tick(dt, env, &mut child_scope) {
                    Ok(Tick::StillRunning) => return Ok(Tick::StillRunning),
                    Ok(Tick::Done) => self.subtask += 1,
                    Err(err) => {
                        // Already reported by the failing descendant.
                        self.close_dataset(env);
                        return Err(err);
                    }
                }
            }

            self.end_iteration(children, env);
        }
    }

    /// Start the next iteration; false once the policy is exhausted.
    fn begin_iteration(&mut self, task: &str, id: TaskId) -> Result<bool, TaskError> {
        let unavailable = |reason: String| TaskError::RowSourceUnavailable {
            task: task.to_string(),
            id,
            reason,
        };
        match self.policy {
            None => {
                return Err(TaskError::InvalidRepeatPolicy {
                    task: task.to_string(),
                    id,
                    reason: "iteration started before prepare".to_string(),
                });
            }
            Some(RepeatPolicy::FixedCount(count)) => {
                if self.iteration > count {
                    return Ok(false);
                }
            }
            Some(RepeatPolicy::TableDriven { .. }) => {
                let rows = self
                    .rows
                    .as_deref_mut()
                    .ok_or_else(|| unavailable("no row source attached".to_string()))?;
                if !rows.move_next() {
                    return Ok(false);
                }
                self.row = Some(rows.current().map_err(unavailable)?);
            }
        }
        self.in_iteration = true;
        self.subtask = 0;
        debug!(task, %id, iteration = self.iteration, row = ?self.row, "iteration started");
        Ok(true)
    }

    fn end_iteration(&mut self, children: &mut [TaskNode], env: &mut Env<'_>) {
        for column in &self.columns {
            let value = match self.context.get(column) {
                Some(value) => value.as_str(),
                None => {
                    debug!(dataset = %self.dataset, column = %column, "context miss, writing placeholder");
                    ""
                }
            };
            env.log.set_value(&self.dataset, column, value);
        }
        env.log.log_row(&self.dataset);
        debug!(dataset = %self.dataset, iteration = self.iteration, "iteration logged");

        for child in &mut *children {
            child.reset();
        }
        self.context.clear();
        self.row = None;
        self.subtask = 0;
        self.in_iteration = false;
        self.iteration += 1;
    }

    pub(crate) fn finish(&mut self, env: &mut Env<'_>) {
        self.close_dataset(env);
    }

    fn close_dataset(&mut self, env: &mut Env<'_>) {
        if self.dataset_open {
            env.log.end_dataset(&self.dataset);
            self.dataset_open = false;
        }
    }

    pub(crate) fn reset(&mut self) {
        self.policy = None;
        self.iteration = 1;
        self.subtask = 0;
        self.in_iteration = false;
        self.context.clear();
        self.row = None;
        if let Some(rows) = self.rows.as_deref_mut() {
            rows.reset();
        }
    }
}
