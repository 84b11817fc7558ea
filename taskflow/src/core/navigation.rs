//! Cursor-driven child traversal for navigable collections.
//!
//! After each child resolves, a pending `Previous`/`Next` request raised by a
//! descendant redirects the cursor. Requests past either end are dropped with
//! a warning and the cursor advances normally.

use std::time::Duration;

use tracing::{debug, warn};

use crate::core::context::{Env, Scope};
use crate::core::error::TaskError;
use crate::core::task::TaskNode;
use crate::core::types::{MoveDirection, Phase, Tick};

#[derive(Debug, Default)]
pub struct Navigator {
    cursor: Option<usize>,
    pending: MoveDirection,
}

impl Navigator {
    pub fn cursor(&self) -> Option<usize> {
        self.cursor
    }

    pub(crate) fn prepare(&mut self, child_count: usize) {
        self.cursor = (child_count > 0).then_some(0);
        self.pending = MoveDirection::None;
    }

    pub(crate) fn reset(&mut self) {
        self.cursor = None;
        self.pending = MoveDirection::None;
    }

    pub(crate) fn drive(
        &mut self,
        owner: &str,
        children: &mut [TaskNode],
        dt: Duration,
        env: &mut Env<'_>,
        scope: &mut Scope<'_>,
    ) -> Result<Tick, TaskError> {
        while let Some(index) = self.cursor {
            let outcome = {
                let mut child_scope = Scope {
                    nav: Some(&mut self.pending),
                    repeat: scope.repeat.as_mut().map(|repeat| repeat.reborrow()),
                };
                children[index].tick(dt, env, &mut child_scope)?
            };
            if outcome == Tick::StillRunning {
                return Ok(Tick::StillRunning);
            }

            self.cursor = self.next_cursor(owner, index, children.len(), env);
            if let Some(next) = self.cursor {
                // Revisited children start a fresh pass.
                if children[next].phase() != Phase::Idle {
                    children[next].reset();
                }
                debug!(collection = owner, from = index, to = next, "cursor moved");
            }
        }
        Ok(Tick::Done)
    }

    fn next_cursor(
        &mut self,
        owner: &str,
        index: usize,
        len: usize,
        env: &mut Env<'_>,
    ) -> Option<usize> {
        let forward = (index + 1 < len).then_some(index + 1);
        match self.pending.take() {
            MoveDirection::None => forward,
            MoveDirection::Previous if index > 0 => Some(index - 1),
            MoveDirection::Next if forward.is_some() => forward,
            direction => {
                warn!(collection = owner, index, ?direction, "move request at boundary ignored");
                env.log.warn(
                    "navigation",
                    &format!("{owner}: {direction:?} from child {index} is out of range"),
                );
                forward
            }
        }
    }
}
