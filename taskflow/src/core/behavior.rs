//! Leaf behavior hooks attached to a task node.
//!
//! The node owns the lifecycle; a behavior only reacts to it. Every hook has
//! a default, so a node without custom logic uses [`NoBehavior`].

use crate::core::context::TaskCtx;
use crate::core::error::TaskError;
use crate::core::types::{Binding, TaskKind};

/// Collaborators and ancestors a behavior needs; checked at prepare.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Requirements {
    pub input: bool,
    pub hud: bool,
    pub repeat_ancestor: bool,
    pub navigable_ancestor: bool,
}

pub trait TaskBehavior {
    /// Short label used in diagnostics.
    fn label(&self) -> &'static str {
        "plain"
    }

    fn requirements(&self) -> Requirements {
        Requirements::default()
    }

    /// Handlers registered automatically at prepare and removed at finish.
    ///
    /// Waiting kinds listen for confirm unless the behavior opts out.
    fn default_bindings(&self, kind: TaskKind) -> Vec<Binding> {
        if kind.waits_for_signal() {
            vec![Binding::Confirm]
        } else {
            Vec::new()
        }
    }

    fn on_prepare(&mut self, _ctx: &mut TaskCtx<'_, '_, '_>) -> Result<(), TaskError> {
        Ok(())
    }

    /// An input event delivered to one of this task's handlers.
    fn on_input(&mut self, binding: &Binding, ctx: &mut TaskCtx<'_, '_, '_>) {
        if *binding == Binding::Confirm {
            ctx.stop();
        }
    }

    /// Once per tick while the run phase is active.
    fn on_tick(&mut self, _ctx: &mut TaskCtx<'_, '_, '_>) {}

    /// The run-phase timer reached its bound. The task is already stopped.
    fn on_timeout(&mut self, _ctx: &mut TaskCtx<'_, '_, '_>) {}

    fn on_finish(&mut self, _ctx: &mut TaskCtx<'_, '_, '_>) {}

    fn on_reset(&mut self) {}
}

/// Behavior with every hook left at its default.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoBehavior;

impl TaskBehavior for NoBehavior {}
