//! Fixed-step driver that ticks a protocol until it completes.

use std::time::Duration;

use tracing::{debug, info, warn};

use crate::core::context::{Env, Scope};
use crate::core::error::TaskError;
use crate::core::queue::TaskQueue;
use crate::core::task::TaskNode;
use crate::core::types::Tick;

/// Something the scheduler can advance: a task tree or a flat queue.
pub trait Tickable {
    fn advance(&mut self, dt: Duration, env: &mut Env<'_>) -> Result<Tick, TaskError>;
}

impl Tickable for TaskNode {
    fn advance(&mut self, dt: Duration, env: &mut Env<'_>) -> Result<Tick, TaskError> {
        self.tick(dt, env, &mut Scope::root())
    }
}

impl Tickable for TaskQueue {
    fn advance(&mut self, dt: Duration, env: &mut Env<'_>) -> Result<Tick, TaskError> {
        self.tick(dt, env)
    }
}

/// Reason why a run stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunStop {
    /// The root reported done.
    Complete,
    /// The tick limit was reached first.
    Stalled,
}

/// Summary of a scheduler run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RunOutcome {
    pub ticks: u64,
    pub elapsed: Duration,
    pub stop: RunStop,
}

#[derive(Debug, Clone, Copy)]
pub struct Scheduler {
    dt: Duration,
    max_ticks: Option<u64>,
}

impl Scheduler {
    pub fn new(dt: Duration) -> Self {
        Self { dt, max_ticks: None }
    }

    pub fn with_max_ticks(mut self, max_ticks: Option<u64>) -> Self {
        self.max_ticks = max_ticks;
        self
    }

    pub fn run<T: Tickable>(&self, root: &mut T, env: &mut Env<'_>) -> Result<RunOutcome, TaskError> {
        self.run_with(root, env, |_, _| {})
    }

    /// Tick `root` until done or until the tick limit. Tick `k` (0-based)
    /// runs at `now = k * dt`; `on_tick` sees the root after every tick that
    /// left it running.
    ///
    /// A fatal task error stops the run immediately.
    pub fn run_with<T: Tickable, F: FnMut(u64, &T)>(
        &self,
        root: &mut T,
        env: &mut Env<'_>,
        mut on_tick: F,
    ) -> Result<RunOutcome, TaskError> {
        let mut ticks = 0u64;
        loop {
            if self.max_ticks.is_some_and(|limit| ticks >= limit) {
                warn!(ticks, "tick limit reached before completion");
                env.log
                    .warn("scheduler", &format!("stalled after {ticks} ticks"));
                return Ok(self.outcome(ticks, RunStop::Stalled));
            }
            let now = self.dt.saturating_mul(u32::try_from(ticks).unwrap_or(u32::MAX));
            if let Some(input) = env.input.as_deref_mut() {
                input.begin_tick(now);
            }
            let outcome = root.advance(self.dt, env)?;
            ticks += 1;
            match outcome {
                Tick::Done => {
                    info!(ticks, "run complete");
                    return Ok(self.outcome(ticks, RunStop::Complete));
                }
                Tick::StillRunning => {
                    debug!(ticks, now_ms = now.as_millis() as u64, "tick");
                    on_tick(ticks, root);
                }
            }
        }
    }

    fn outcome(&self, ticks: u64, stop: RunStop) -> RunOutcome {
        RunOutcome {
            ticks,
            elapsed: self.dt.saturating_mul(u32::try_from(ticks).unwrap_or(u32::MAX)),
            stop,
        }
    }
}
