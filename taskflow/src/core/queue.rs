//! Flat sequential queue for simple linear protocols.
//!
//! Runs prepare, run phase and finish for each task in order. Children of
//! queued tasks are ignored; there is no navigation or repetition.

use std::time::Duration;

use tracing::debug;

use crate::core::context::{Env, Scope};
use crate::core::error::TaskError;
use crate::core::task::TaskNode;
use crate::core::types::{Phase, Tick};

#[derive(Debug, Default)]
pub struct TaskQueue {
    tasks: Vec<TaskNode>,
    index: usize,
}

impl TaskQueue {
    pub fn new(tasks: Vec<TaskNode>) -> Self {
        Self { tasks, index: 0 }
    }

    pub fn tasks(&self) -> &[TaskNode] {
        &self.tasks
    }

    /// Task currently being executed, if the queue is not exhausted.
    pub fn current(&self) -> Option<&TaskNode> {
        self.tasks.get(self.index)
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    pub fn tick(&mut self, dt: Duration, env: &mut Env<'_>) -> Result<Tick, TaskError> {
        while let Some(task) = self.tasks.get_mut(self.index) {
            let mut scope = Scope::root();
            if task.is_enabled() {
                let running = if task.phase() == Phase::Idle {
                    task.prepare(env, &mut scope)?;
                    task.is_running()
                } else {
                    task.poll_run_phase(dt, env, &mut scope)?
                };
                if running {
                    return Ok(Tick::StillRunning);
                }
                task.finish(env, &mut scope);
            }
            debug!(index = self.index, task = task.name(), "queue advanced");
            self.index += 1;
        }
        Ok(Tick::Done)
    }
}
