//! Task node lifecycle and the default depth-first composite execution.
//!
//! A node is a poll-driven state machine advanced by [`TaskNode::tick`]:
//! prepare on the first tick, hold the run phase until something marks the
//! task not-running, then drive the children one at a time and finish. A
//! child `i + 1` is never ticked before child `i` has finished.

use std::time::Duration;

use tracing::{debug, error, info, warn};

use crate::core::behavior::{NoBehavior, TaskBehavior};
use crate::core::context::{Env, Scope, TaskCtx};
use crate::core::error::TaskError;
use crate::core::navigation::Navigator;
use crate::core::repeat::{RepeatController, RepeatProgress};
use crate::core::timer::{TaskTimer, TimerBound};
use crate::core::types::{Phase, TaskId, TaskKind, Tick};

/// Externally observable lifecycle flags.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Status {
    pub phase: Phase,
    pub is_prepared: bool,
    pub is_running: bool,
    pub is_completed: bool,
}

/// Nearest enclosing navigable collection and repeat controller, fixed when
/// the node is attached to its parent.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AncestorLinks {
    pub navigable: Option<TaskId>,
    pub repeat: Option<TaskId>,
}

/// How a node picks its next child.
enum Flow {
    Sequence { cursor: usize },
    Navigable(Navigator),
    Repeat(Box<RepeatController>),
}

pub struct TaskNode {
    id: TaskId,
    name: String,
    kind: TaskKind,
    enabled: bool,
    timer: TaskTimer,
    status: Status,
    behavior: Box<dyn TaskBehavior>,
    flow: Flow,
    children: Vec<TaskNode>,
    links: AncestorLinks,
}

impl std::fmt::Debug for TaskNode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TaskNode")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("kind", &self.kind)
            .field("behavior", &self.behavior.label())
            .field("status", &self.status)
            .field("children", &self.children)
            .finish_non_exhaustive()
    }
}

impl TaskNode {
    pub fn new(id: u32, name: impl Into<String>, kind: TaskKind) -> Self {
        Self {
            id: TaskId(id),
            name: name.into(),
            kind,
            enabled: true,
            timer: TaskTimer::default(),
            status: Status::default(),
            behavior: Box::new(NoBehavior),
            flow: Flow::Sequence { cursor: 0 },
            children: Vec::new(),
            links: AncestorLinks::default(),
        }
    }

    pub fn with_timer(mut self, bound: TimerBound) -> Self {
        self.timer = TaskTimer::new(bound);
        self
    }

    pub fn with_behavior(mut self, behavior: impl TaskBehavior + 'static) -> Self {
        self.behavior = Box::new(behavior);
        self
    }

    pub fn with_boxed_behavior(mut self, behavior: Box<dyn TaskBehavior>) -> Self {
        self.behavior = behavior;
        self
    }

    pub fn with_enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    /// Turn this node into a navigable collection over its children.
    ///
    /// A collection never holds its own run phase, so its kind becomes
    /// structural.
    pub fn navigable(mut self) -> Self {
        if self.kind != TaskKind::Structural {
            debug!(task = %self.name, id = %self.id, kind = ?self.kind, "navigable collection runs as structural");
            self.kind = TaskKind::Structural;
        }
        self.flow = Flow::Navigable(Navigator::default());
        self.relink_children();
        self
    }

    /// Turn this node into a repeat controller over its children.
    pub fn repeating(mut self, controller: RepeatController) -> Self {
        self.flow = Flow::Repeat(Box::new(controller));
        self.relink_children();
        self
    }

    pub fn with_child(mut self, child: TaskNode) -> Self {
        self.add_child(child);
        self
    }

    pub fn with_children(mut self, children: impl IntoIterator<Item = TaskNode>) -> Self {
        for child in children {
            self.add_child(child);
        }
        self
    }

    /// Attach `child` as the last child and fix its ancestor links.
    pub fn add_child(&mut self, mut child: TaskNode) {
        child.links = self.links_for_children();
        child.relink_children();
        self.children.push(child);
    }

    fn links_for_children(&self) -> AncestorLinks {
        let mut links = self.links;
        match self.flow {
            Flow::Navigable(_) => links.navigable = Some(self.id),
            Flow::Repeat(_) => links.repeat = Some(self.id),
            Flow::Sequence { .. } => {}
        }
        links
    }

    fn relink_children(&mut self) {
        let links = self.links_for_children();
        for child in &mut self.children {
            child.links = links;
            child.relink_children();
        }
    }

    pub fn id(&self) -> TaskId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn kind(&self) -> TaskKind {
        self.kind
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn status(&self) -> Status {
        self.status
    }

    pub fn phase(&self) -> Phase {
        self.status.phase
    }

    pub fn is_prepared(&self) -> bool {
        self.status.is_prepared
    }

    pub fn is_running(&self) -> bool {
        self.status.is_running
    }

    pub fn is_completed(&self) -> bool {
        self.status.is_completed
    }

    /// Run-phase time accumulated in the current pass.
    pub fn elapsed(&self) -> Duration {
        self.timer.elapsed()
    }

    pub fn timer(&self) -> &TaskTimer {
        &self.timer
    }

    pub fn links(&self) -> AncestorLinks {
        self.links
    }

    pub fn children(&self) -> &[TaskNode] {
        &self.children
    }

    pub fn is_navigable(&self) -> bool {
        matches!(self.flow, Flow::Navigable(_))
    }

    pub fn is_repeat(&self) -> bool {
        matches!(self.flow, Flow::Repeat(_))
    }

    pub fn repeat_progress(&self) -> Option<RepeatProgress> {
        match &self.flow {
            Flow::Repeat(controller) => Some(controller.progress(self.children.len())),
            _ => None,
        }
    }

    /// Cursor of a navigable collection (`None` once exhausted).
    pub fn navigation_cursor(&self) -> Option<usize> {
        match &self.flow {
            Flow::Navigable(navigator) => navigator.cursor(),
            _ => None,
        }
    }

    /// Depth-first, pre-order lookup.
    pub fn find(&self, id: TaskId) -> Option<&TaskNode> {
        if self.id == id {
            return Some(self);
        }
        self.children.iter().find_map(|child| child.find(id))
    }

    /// Names of the direct children in authored order.
    pub fn child_names(&self) -> Vec<&str> {
        self.children.iter().map(|child| child.name.as_str()).collect()
    }

    /// Mark this task not-running. Its run phase resolves on the next tick.
    pub fn stop(&mut self) {
        self.status.is_running = false;
    }

    /// Stop the deepest task currently holding its run phase.
    ///
    /// Returns false when nothing on the active path is running.
    pub fn stop_active(&mut self) -> bool {
        match self.status.phase {
            Phase::RunPhase if self.status.is_running => {
                info!(task = %self.name, id = %self.id, "operator stop");
                self.stop();
                true
            }
            Phase::Subtree => match self.active_child_index() {
                Some(index) => self.children[index].stop_active(),
                None => false,
            },
            _ => false,
        }
    }

    fn active_child_index(&self) -> Option<usize> {
        match &self.flow {
            Flow::Sequence { cursor } => Some(*cursor).filter(|index| *index < self.children.len()),
            Flow::Navigable(navigator) => navigator.cursor(),
            Flow::Repeat(controller) => controller.active_child(self.children.len()),
        }
    }

    fn with_ctx<'e, 's, R>(
        &mut self,
        env: &mut Env<'e>,
        scope: &mut Scope<'s>,
        hook: impl FnOnce(&mut dyn TaskBehavior, &mut TaskCtx<'_, 'e, 's>) -> R,
    ) -> R {
        let mut ctx = TaskCtx {
            id: self.id,
            name: &self.name,
            kind: self.kind,
            elapsed: self.timer.elapsed(),
            running: &mut self.status.is_running,
            env,
            scope,
        };
        hook(self.behavior.as_mut(), &mut ctx)
    }

    fn check_requirements(&self, env: &Env<'_>) -> Result<(), TaskError> {
        let requirements = self.behavior.requirements();
        let needs_input =
            requirements.input || !self.behavior.default_bindings(self.kind).is_empty();
        if needs_input && env.input.is_none() {
            return Err(self.missing_collaborator("input source"));
        }
        if requirements.hud && env.hud.is_none() {
            return Err(self.missing_collaborator("HUD"));
        }
        if requirements.repeat_ancestor && self.links.repeat.is_none() {
            return Err(TaskError::MissingAncestor {
                task: self.name.clone(),
                id: self.id,
                ancestor: "repeat task",
            });
        }
        if requirements.navigable_ancestor && self.links.navigable.is_none() {
            return Err(TaskError::MissingAncestor {
                task: self.name.clone(),
                id: self.id,
                ancestor: "navigable collection",
            });
        }
        Ok(())
    }

    fn missing_collaborator(&self, collaborator: &'static str) -> TaskError {
        TaskError::MissingCollaborator {
            task: self.name.clone(),
            id: self.id,
            collaborator,
        }
    }

    /// Reset transient state, start the timer and register handlers.
    ///
    /// Missing collaborators are fatal. Structural and functional tasks leave
    /// prepare already not-running.
    pub fn prepare(&mut self, env: &mut Env<'_>, scope: &mut Scope<'_>) -> Result<(), TaskError> {
        debug!(task = %self.name, id = %self.id, kind = ?self.kind, "preparing");
        env.log.info("task", &format!("{} preparing", self.name));

        if let Err(err) = self.check_requirements(env) {
            return Err(report(env, err));
        }
        if self.kind == TaskKind::Unset {
            error!(task = %self.name, id = %self.id, "task kind is unset");
            env.log
                .error("task", &format!("{} has no task kind configured", self.name));
        }

        self.status.is_completed = false;
        self.status.is_prepared = true;
        self.status.is_running = true;
        self.status.phase = Phase::RunPhase;
        self.timer.start(env.rng);
        if let Some(bound) = self.timer.active_bound() {
            debug!(task = %self.name, bound_ms = bound.as_millis() as u64, "timer started");
        }

        let child_count = self.children.len();
        match &mut self.flow {
            Flow::Sequence { cursor } => *cursor = 0,
            Flow::Navigable(navigator) => navigator.prepare(child_count),
            Flow::Repeat(controller) => {
                if let Err(err) = controller.prepare(&self.name, self.id, env) {
                    return Err(report(env, err));
                }
            }
        }

        for binding in self.behavior.default_bindings(self.kind) {
            if let Some(input) = env.input.as_deref_mut() {
                input.register(self.id, binding);
            }
        }
        if let Err(err) = self.with_ctx(env, scope, |behavior, ctx| behavior.on_prepare(ctx)) {
            return Err(report(env, err));
        }

        if !self.kind.waits_for_signal() {
            self.status.is_running = false;
        }
        Ok(())
    }

    /// Advance the run phase by one tick. Returns true while still running.
    pub fn poll_run_phase(
        &mut self,
        dt: Duration,
        env: &mut Env<'_>,
        scope: &mut Scope<'_>,
    ) -> Result<bool, TaskError> {
        if !self.status.is_running {
            return Ok(false);
        }
        if self.timer.advance(dt) {
            debug!(task = %self.name, id = %self.id, elapsed_ms = self.timer.elapsed().as_millis() as u64, "timer expired");
            self.status.is_running = false;
            self.with_ctx(env, scope, |behavior, ctx| behavior.on_timeout(ctx));
        }
        if self.status.is_running {
            let events = env
                .input
                .as_deref_mut()
                .map(|input| input.drain(self.id))
                .unwrap_or_default();
            for binding in events {
                if !self.status.is_running {
                    break;
                }
                debug!(task = %self.name, id = %self.id, %binding, "input");
                self.with_ctx(env, scope, |behavior, ctx| behavior.on_input(&binding, ctx));
            }
        }
        if self.status.is_running {
            self.with_ctx(env, scope, |behavior, ctx| behavior.on_tick(ctx));
        }
        Ok(self.status.is_running)
    }

    /// Terminal step of a pass. Without a prior prepare this only warns.
    pub fn finish(&mut self, env: &mut Env<'_>, scope: &mut Scope<'_>) {
        if !self.status.is_prepared {
            warn!(task = %self.name, id = %self.id, "finish called before prepare");
            env.log
                .warn("task", &format!("{} finish called before prepare", self.name));
            return;
        }
        if self.status.phase == Phase::Finished {
            return;
        }
        self.with_ctx(env, scope, |behavior, ctx| behavior.on_finish(ctx));
        if let Some(input) = env.input.as_deref_mut() {
            input.unregister_all(self.id);
        }
        if let Flow::Repeat(controller) = &mut self.flow {
            controller.finish(env);
        }
        self.status.is_running = false;
        self.status.is_completed = true;
        self.status.phase = Phase::Finished;
        debug!(task = %self.name, id = %self.id, "finished");
        env.log.info("task", &format!("{} finished", self.name));
    }

    /// Return this node and every descendant to a re-executable state.
    pub fn reset(&mut self) {
        self.status = Status::default();
        self.timer.reset();
        match &mut self.flow {
            Flow::Sequence { cursor } => *cursor = 0,
            Flow::Navigable(navigator) => navigator.reset(),
            Flow::Repeat(controller) => controller.reset(),
        }
        self.behavior.on_reset();
        for child in &mut self.children {
            child.reset();
        }
    }

    /// Advance this subtree by one scheduler tick.
    ///
    /// Transitions that need no waiting cascade within the same tick, so a
    /// chain of structural tasks resolves without consuming ticks.
    pub fn tick(
        &mut self,
        dt: Duration,
        env: &mut Env<'_>,
        scope: &mut Scope<'_>,
    ) -> Result<Tick, TaskError> {
        if !self.enabled {
            return Ok(Tick::Done);
        }
        loop {
            match self.status.phase {
                Phase::Idle => {
                    self.prepare(env, scope)?;
                    if self.status.is_running {
                        return Ok(Tick::StillRunning);
                    }
                    self.enter_subtree();
                }
                Phase::RunPhase => {
                    if self.poll_run_phase(dt, env, scope)? {
                        return Ok(Tick::StillRunning);
                    }
                    self.enter_subtree();
                }
                Phase::Subtree => {
                    if self.drive_children(dt, env, scope)? == Tick::StillRunning {
                        return Ok(Tick::StillRunning);
                    }
                    self.finish(env, scope);
                    return Ok(Tick::Done);
                }
                Phase::Finished => return Ok(Tick::Done),
            }
        }
    }

    fn enter_subtree(&mut self) {
        debug!(task = %self.name, id = %self.id, elapsed_ms = self.timer.elapsed().as_millis() as u64, children = ?self.child_names(), "run phase resolved");
        self.status.phase = Phase::Subtree;
    }

    fn drive_children(
        &mut self,
        dt: Duration,
        env: &mut Env<'_>,
        scope: &mut Scope<'_>,
    ) -> Result<Tick, TaskError> {
        match &mut self.flow {
            Flow::Sequence { cursor } => {
                while let Some(child) = self.children.get_mut(*cursor) {
                    if child.tick(dt, env, &mut scope.child())? == Tick::StillRunning {
                        return Ok(Tick::StillRunning);
                    }
                    *cursor += 1;
                }
                Ok(Tick::Done)
            }
            Flow::Navigable(navigator) => {
                navigator.drive(&self.name, &mut self.children, dt, env, scope)
            }
            Flow::Repeat(controller) => {
                controller.drive(&self.name, self.id, &mut self.children, dt, env, scope)
            }
        }
    }
}

/// Record a fatal error in the experiment log before it propagates.
pub(crate) fn report(env: &mut Env<'_>, err: TaskError) -> TaskError {
    error!(error = %err, "fatal task error");
    env.log.error(err.tag(), &err.to_string());
    err
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::Binding;
    use crate::test_support::{Harness, Recorder, interactive, leaf, structural};

    #[test]
    fn structural_chain_resolves_in_one_tick() {
        let mut harness = Harness::new();
        let mut root = structural(0, "root")
            .with_child(structural(1, "a").with_child(leaf(2, "a1")))
            .with_child(leaf(3, "b"));

        assert_eq!(harness.tick(&mut root), Tick::Done);
        assert!(root.is_completed());
        assert!(root.children().iter().all(TaskNode::is_completed));
    }

    #[test]
    fn interactive_waits_for_confirm() {
        let mut harness = Harness::new();
        let mut root = structural(0, "root").with_child(interactive(1, "ask"));

        assert_eq!(harness.tick(&mut root), Tick::StillRunning);
        assert_eq!(harness.tick(&mut root), Tick::StillRunning);
        harness.input.press(Binding::Confirm);
        assert_eq!(harness.tick(&mut root), Tick::Done);
        assert_eq!(harness.input.registered_count(), 0);
    }

    #[test]
    fn disabled_task_has_no_side_effects() {
        let mut harness = Harness::new();
        let mut task = interactive(1, "off").with_enabled(false);

        assert_eq!(harness.tick(&mut task), Tick::Done);
        assert_eq!(task.status(), Status::default());
        assert!(harness.log.messages.is_empty());
    }

    #[test]
    fn finish_before_prepare_only_warns() {
        let mut harness = Harness::new();
        let mut task = leaf(1, "early");

        harness.finish(&mut task);

        assert!(!task.is_completed());
        assert_eq!(task.phase(), Phase::Idle);
        assert!(harness.log.has("WARN", "finish called before prepare"));
    }

    #[test]
    fn unset_kind_logs_error_on_every_prepare() {
        let mut harness = Harness::new();
        let mut task = TaskNode::new(1, "mystery", TaskKind::Unset);

        harness.tick(&mut task);
        task.stop();
        assert_eq!(harness.tick(&mut task), Tick::Done);
        task.reset();
        harness.tick(&mut task);

        assert_eq!(harness.log.count("ERROR", "no task kind configured"), 2);
    }

    #[test]
    fn missing_input_source_is_fatal() {
        let mut harness = Harness::without_input();
        let mut task = interactive(1, "ask");

        let err = harness.try_tick(&mut task).expect_err("missing input");
        assert!(matches!(
            err,
            TaskError::MissingCollaborator {
                collaborator: "input source",
                ..
            }
        ));
        assert!(harness.log.has("ERROR", "requires a configured input source"));
    }

    #[test]
    fn reset_then_prepare_matches_fresh_node() {
        let mut harness = Harness::new();
        let mut task = interactive(1, "timed").with_timer(TimerBound::Fixed(Duration::from_secs(2)));
        for _ in 0..4 {
            harness.tick(&mut task);
        }
        assert!(task.is_completed());
        assert!(task.elapsed() > Duration::ZERO);

        task.reset();
        harness.prepare(&mut task);

        assert!(!task.is_completed());
        assert_eq!(task.elapsed(), Duration::ZERO);
        assert!(task.is_running());
    }

    #[test]
    fn stop_active_reaches_the_running_leaf() {
        let mut harness = Harness::new();
        let mut root = structural(0, "root")
            .with_child(leaf(1, "setup"))
            .with_child(structural(2, "block").with_child(interactive(3, "wait")));

        assert_eq!(harness.tick(&mut root), Tick::StillRunning);
        assert!(root.stop_active());
        assert_eq!(harness.tick(&mut root), Tick::Done);
        assert!(!root.stop_active());
    }

    #[test]
    fn parent_run_phase_precedes_children() {
        let mut harness = Harness::new();
        let recorder = Recorder::default();
        let mut root = interactive(0, "gate")
            .with_behavior(recorder.behavior("gate"))
            .with_child(leaf(1, "child").with_behavior(recorder.behavior("child")));

        harness.tick(&mut root);
        assert_eq!(recorder.events(), vec!["gate:prepare"]);
        root.stop();
        harness.tick(&mut root);
        assert_eq!(
            recorder.events(),
            vec![
                "gate:prepare",
                "child:prepare",
                "child:finish",
                "gate:finish"
            ]
        );
    }

    #[test]
    fn navigable_collection_runs_as_structural() {
        let mut harness = Harness::new();
        let mut collection = TaskNode::new(0, "calibration", TaskKind::Unset)
            .with_child(leaf(1, "a"))
            .with_child(leaf(2, "b"))
            .navigable();

        assert_eq!(collection.kind(), TaskKind::Structural);
        assert_eq!(harness.tick(&mut collection), Tick::Done);
        assert!(collection.children().iter().all(TaskNode::is_completed));
        assert!(!harness.log.has("ERROR", "no task kind configured"));
    }

    #[test]
    fn children_attach_with_ancestor_links() {
        let root = structural(0, "root").with_child(
            structural(1, "nav")
                .with_child(structural(2, "inner").with_child(leaf(3, "deep")))
                .navigable(),
        );

        let deep = root.find(TaskId(3)).expect("deep");
        assert_eq!(deep.links().navigable, Some(TaskId(1)));
        assert_eq!(deep.links().repeat, None);
    }
}
