//! Execution environment, ancestor scope and the control handle given to
//! leaf behaviors.
//!
//! Collaborators are passed explicitly as an [`Env`] bundle instead of being
//! looked up globally. The [`Scope`] threads the nearest navigable
//! collection's move signal and the nearest repeat controller's iteration
//! state down the active path, so descendants never hold references back into
//! the tree.

use std::time::Duration;

use rand::rngs::StdRng;
use tracing::{debug, warn};

use crate::core::collaborators::{ExperimentLog, Hud, InputSource, Settings};
use crate::core::error::TaskError;
use crate::core::types::{Binding, MoveDirection, Row, SharedContext, TaskId, TaskKind};

/// Collaborators handed to every prepare/tick/finish.
pub struct Env<'e> {
    pub settings: &'e Settings,
    pub log: &'e mut dyn ExperimentLog,
    pub input: Option<&'e mut dyn InputSource>,
    pub hud: Option<&'e mut dyn Hud>,
    pub rng: &'e mut StdRng,
}

impl<'e> Env<'e> {
    pub fn new(settings: &'e Settings, log: &'e mut dyn ExperimentLog, rng: &'e mut StdRng) -> Self {
        Self {
            settings,
            log,
            input: None,
            hud: None,
            rng,
        }
    }

    pub fn with_input(mut self, input: &'e mut dyn InputSource) -> Self {
        self.input = Some(input);
        self
    }

    pub fn with_hud(mut self, hud: &'e mut dyn Hud) -> Self {
        self.hud = Some(hud);
        self
    }
}

/// Ancestor state visible to the active path of the tree.
#[derive(Default)]
pub struct Scope<'s> {
    pub(crate) nav: Option<&'s mut MoveDirection>,
    pub(crate) repeat: Option<RepeatScope<'s>>,
}

impl Scope<'_> {
    /// Scope for a tree root: no enclosing collection or repeat.
    pub fn root() -> Self {
        Self::default()
    }

    /// Reborrow for a child that inherits every ancestor link.
    pub(crate) fn child(&mut self) -> Scope<'_> {
        Scope {
            nav: self.nav.as_deref_mut(),
            repeat: self.repeat.as_mut().map(RepeatScope::reborrow),
        }
    }
}

pub(crate) struct RepeatScope<'s> {
    pub(crate) context: &'s mut SharedContext,
    pub(crate) row: Option<&'s Row>,
    pub(crate) iteration: u32,
}

impl RepeatScope<'_> {
    pub(crate) fn reborrow(&mut self) -> RepeatScope<'_> {
        RepeatScope {
            context: &mut *self.context,
            row: self.row,
            iteration: self.iteration,
        }
    }
}

/// Handle a behavior uses to observe and steer its own task.
pub struct TaskCtx<'a, 'e, 's> {
    pub(crate) id: TaskId,
    pub(crate) name: &'a str,
    pub(crate) kind: TaskKind,
    pub(crate) elapsed: Duration,
    pub(crate) running: &'a mut bool,
    pub(crate) env: &'a mut Env<'e>,
    pub(crate) scope: &'a mut Scope<'s>,
}

impl<'e> TaskCtx<'_, 'e, '_> {
    pub fn id(&self) -> TaskId {
        self.id
    }

    pub fn name(&self) -> &str {
        self.name
    }

    pub fn kind(&self) -> TaskKind {
        self.kind
    }

    /// Run-phase time accumulated so far.
    pub fn elapsed(&self) -> Duration {
        self.elapsed
    }

    pub fn is_running(&self) -> bool {
        *self.running
    }

    /// Mark the task not-running; its run phase resolves on this tick.
    pub fn stop(&mut self) {
        if *self.running {
            debug!(task = self.name, id = %self.id, "stop requested");
        }
        *self.running = false;
    }

    /// Ask the nearest navigable ancestor to move its cursor once this
    /// task's branch resolves. Dropped with a warning when there is none.
    pub fn request_move(&mut self, direction: MoveDirection) {
        match self.scope.nav.as_deref_mut() {
            Some(slot) => {
                debug!(task = self.name, id = %self.id, ?direction, "move requested");
                *slot = direction;
            }
            None => {
                warn!(task = self.name, id = %self.id, ?direction, "move request without navigable ancestor");
                self.env.log.warn(
                    "navigation",
                    &format!("{} requested {:?} outside a navigable collection", self.name, direction),
                );
            }
        }
    }

    /// Shared context of the nearest repeat ancestor.
    pub fn context_mut(&mut self) -> Option<&mut SharedContext> {
        self.scope.repeat.as_mut().map(|repeat| &mut *repeat.context)
    }

    pub fn context(&self) -> Option<&SharedContext> {
        self.scope.repeat.as_ref().map(|repeat| &*repeat.context)
    }

    /// Row of the current table-driven iteration, if any.
    pub fn row(&self) -> Option<&Row> {
        self.scope.repeat.as_ref().and_then(|repeat| repeat.row)
    }

    /// 1-based iteration of the nearest repeat ancestor.
    pub fn iteration(&self) -> Option<u32> {
        self.scope.repeat.as_ref().map(|repeat| repeat.iteration)
    }

    pub fn settings(&self) -> &Settings {
        self.env.settings
    }

    pub fn log(&mut self) -> &mut (dyn ExperimentLog + 'e) {
        &mut *self.env.log
    }

    pub fn hud(&mut self) -> Option<&mut (dyn Hud + 'e)> {
        self.env.hud.as_deref_mut()
    }

    /// Register an input handler owned by this task. Unregistered at finish.
    pub fn register(&mut self, binding: Binding) -> Result<(), TaskError> {
        let Some(input) = self.env.input.as_deref_mut() else {
            return Err(TaskError::MissingCollaborator {
                task: self.name.to_string(),
                id: self.id,
                collaborator: "input source",
            });
        };
        debug!(task = self.name, id = %self.id, %binding, "register handler");
        input.register(self.id, binding);
        Ok(())
    }

    pub fn unregister(&mut self, binding: &Binding) {
        if let Some(input) = self.env.input.as_deref_mut() {
            input.unregister(self.id, binding);
        }
    }
}
