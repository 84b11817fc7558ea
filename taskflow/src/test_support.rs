//! Test-only helpers: node builders, in-memory collaborators and a harness
//! that owns a full execution environment.

use std::cell::RefCell;
use std::collections::BTreeMap;
use std::rc::Rc;
use std::time::Duration;

use rand::SeedableRng;
use rand::rngs::StdRng;

use crate::core::behavior::TaskBehavior;
use crate::core::collaborators::{ExperimentLog, RowSource, Settings};
use crate::core::context::{Env, Scope, TaskCtx};
use crate::core::error::TaskError;
use crate::core::queue::TaskQueue;
use crate::core::task::TaskNode;
use crate::core::types::{Binding, MoveDirection, Row, TaskKind, Tick};
use crate::io::hud::ConsoleHud;
use crate::io::input::ScriptedInput;
use crate::scheduler::{RunOutcome, Scheduler, Tickable};

/// Structural node with no behavior.
pub fn structural(id: u32, name: &str) -> TaskNode {
    TaskNode::new(id, name, TaskKind::Structural)
}

/// Functional node: runs its hooks and finishes without waiting.
pub fn leaf(id: u32, name: &str) -> TaskNode {
    TaskNode::new(id, name, TaskKind::Functional)
}

/// Interactive node waiting for confirm or its timer.
pub fn interactive(id: u32, name: &str) -> TaskNode {
    TaskNode::new(id, name, TaskKind::Interactive)
}

pub fn row(pairs: &[(&str, &str)]) -> Row {
    pairs
        .iter()
        .map(|(key, value)| (key.to_string(), value.to_string()))
        .collect()
}

/// One recorded experiment-log message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoggedMessage {
    pub level: &'static str,
    pub tag: String,
    pub message: String,
}

#[derive(Debug, Default)]
struct MemoryDataset {
    columns: Vec<String>,
    pending: BTreeMap<String, String>,
    rows: Vec<Vec<String>>,
    open: bool,
}

/// Experiment log kept in memory.
#[derive(Debug, Default)]
pub struct MemoryLog {
    pub messages: Vec<LoggedMessage>,
    datasets: BTreeMap<String, MemoryDataset>,
}

impl MemoryLog {
    /// True if a message at `level` contains `needle`.
    pub fn has(&self, level: &str, needle: &str) -> bool {
        self.count(level, needle) > 0
    }

    pub fn count(&self, level: &str, needle: &str) -> usize {
        self.messages
            .iter()
            .filter(|logged| logged.level == level && logged.message.contains(needle))
            .count()
    }

    /// Rows written to `name`, in column order.
    pub fn rows(&self, name: &str) -> Vec<Vec<String>> {
        self.datasets
            .get(name)
            .map(|dataset| dataset.rows.clone())
            .unwrap_or_default()
    }

    /// True once `name` was begun and then ended.
    pub fn closed(&self, name: &str) -> bool {
        self.datasets.get(name).is_some_and(|dataset| !dataset.open)
    }

    fn push(&mut self, level: &'static str, tag: &str, message: &str) {
        self.messages.push(LoggedMessage {
            level,
            tag: tag.to_string(),
            message: message.to_string(),
        });
    }
}

impl ExperimentLog for MemoryLog {
    fn info(&mut self, tag: &str, message: &str) {
        self.push("INFO", tag, message);
    }

    fn warn(&mut self, tag: &str, message: &str) {
        self.push("WARN", tag, message);
    }

    fn error(&mut self, tag: &str, message: &str) {
        self.push("ERROR", tag, message);
    }

    fn begin_dataset(&mut self, name: &str, columns: &[String]) {
        let dataset = self.datasets.entry(name.to_string()).or_default();
        dataset.columns = columns.to_vec();
        dataset.open = true;
    }

    fn set_value(&mut self, name: &str, column: &str, value: &str) {
        if let Some(dataset) = self.datasets.get_mut(name) {
            dataset.pending.insert(column.to_string(), value.to_string());
        }
    }

    fn log_row(&mut self, name: &str) {
        if let Some(dataset) = self.datasets.get_mut(name) {
            let pending = std::mem::take(&mut dataset.pending);
            let row = dataset
                .columns
                .iter()
                .map(|column| pending.get(column).cloned().unwrap_or_default())
                .collect();
            dataset.rows.push(row);
        }
    }

    fn end_dataset(&mut self, name: &str) {
        if let Some(dataset) = self.datasets.get_mut(name) {
            dataset.open = false;
        }
    }
}

/// Row source that claims `rows` rows but fails to produce any.
#[derive(Debug)]
pub struct BrokenRows {
    rows: usize,
}

impl BrokenRows {
    pub fn new(rows: usize) -> Self {
        Self { rows }
    }
}

impl RowSource for BrokenRows {
    fn move_next(&mut self) -> bool {
        true
    }

    fn reset(&mut self) {}

    fn current(&self) -> Result<Row, String> {
        Err("table file is unreadable".to_string())
    }

    fn row_count(&self) -> usize {
        self.rows
    }
}

/// Owns every collaborator and ticks trees with a one-second delta.
pub struct Harness {
    pub log: MemoryLog,
    pub input: ScriptedInput,
    pub hud: ConsoleHud,
    pub settings: Settings,
    pub rng: StdRng,
    pub dt: Duration,
    input_enabled: bool,
    hud_enabled: bool,
}

impl Default for Harness {
    fn default() -> Self {
        Self::new()
    }
}

impl Harness {
    pub fn new() -> Self {
        Self {
            log: MemoryLog::default(),
            input: ScriptedInput::new(),
            hud: ConsoleHud::silent(),
            settings: Settings::default(),
            rng: StdRng::seed_from_u64(7),
            dt: Duration::from_secs(1),
            input_enabled: true,
            hud_enabled: true,
        }
    }

    /// Environment without an input source.
    pub fn without_input() -> Self {
        Self {
            input_enabled: false,
            ..Self::new()
        }
    }

    /// Environment without a HUD.
    pub fn without_hud() -> Self {
        Self {
            hud_enabled: false,
            ..Self::new()
        }
    }

    pub fn env(&mut self) -> Env<'_> {
        let mut env = Env::new(&self.settings, &mut self.log, &mut self.rng);
        if self.input_enabled {
            env = env.with_input(&mut self.input);
        }
        if self.hud_enabled {
            env = env.with_hud(&mut self.hud);
        }
        env
    }

    pub fn try_tick(&mut self, node: &mut TaskNode) -> Result<Tick, TaskError> {
        let dt = self.dt;
        node.tick(dt, &mut self.env(), &mut Scope::root())
    }

    pub fn tick(&mut self, node: &mut TaskNode) -> Tick {
        self.try_tick(node).expect("tick")
    }

    pub fn tick_queue(&mut self, queue: &mut TaskQueue) -> Tick {
        let dt = self.dt;
        queue.tick(dt, &mut self.env()).expect("queue tick")
    }

    pub fn prepare(&mut self, node: &mut TaskNode) {
        node.prepare(&mut self.env(), &mut Scope::root())
            .expect("prepare");
    }

    pub fn finish(&mut self, node: &mut TaskNode) {
        node.finish(&mut self.env(), &mut Scope::root());
    }

    /// Run through the scheduler with this harness's delta.
    pub fn run<T: Tickable>(
        &mut self,
        root: &mut T,
        max_ticks: Option<u64>,
    ) -> Result<RunOutcome, TaskError> {
        let scheduler = Scheduler::new(self.dt).with_max_ticks(max_ticks);
        scheduler.run(root, &mut self.env())
    }
}

#[derive(Debug, Default)]
struct RecorderState {
    events: Vec<String>,
    context_sizes: Vec<usize>,
    rows: Vec<String>,
}

/// Shared recorder for behaviors built from it.
#[derive(Debug, Clone, Default)]
pub struct Recorder {
    state: Rc<RefCell<RecorderState>>,
}

impl Recorder {
    /// Records `name:prepare`, `name:timeout` and `name:finish`.
    pub fn behavior(&self, name: &str) -> Recording {
        self.build(name, Action::Record)
    }

    /// Like [`Recorder::behavior`], and requests `direction` at prepare the
    /// first `times` times it runs.
    pub fn mover(&self, name: &str, direction: MoveDirection, times: usize) -> Recording {
        self.build(
            name,
            Action::Move {
                direction,
                remaining: times,
            },
        )
    }

    /// Waits for confirm; `back` requests `Previous` and stops.
    pub fn back_on(&self, name: &str, back: Binding) -> Recording {
        self.build(name, Action::Back(back))
    }

    /// Writes the next batch of pairs into the shared context at every prepare.
    pub fn writer(&self, batches: Vec<Vec<(&str, &str)>>) -> Recording {
        let batches = batches
            .into_iter()
            .map(|batch| {
                batch
                    .into_iter()
                    .map(|(key, value)| (key.to_string(), value.to_string()))
                    .collect()
            })
            .collect();
        self.build("writer", Action::Write { batches, next: 0 })
    }

    /// Records the shared context size at every prepare.
    pub fn context_observer(&self) -> Recording {
        self.build("context_observer", Action::ObserveContext)
    }

    /// Records the row value of `column` at every prepare.
    pub fn row_observer(&self, column: &str) -> Recording {
        self.build("row_observer", Action::ObserveRow(column.to_string()))
    }

    pub fn events(&self) -> Vec<String> {
        self.state.borrow().events.clone()
    }

    /// Names of recorded prepares, in order.
    pub fn prepared(&self) -> Vec<String> {
        self.state
            .borrow()
            .events
            .iter()
            .filter_map(|event| event.strip_suffix(":prepare"))
            .map(str::to_string)
            .collect()
    }

    pub fn observed_context_sizes(&self) -> Vec<usize> {
        self.state.borrow().context_sizes.clone()
    }

    pub fn observed_rows(&self) -> Vec<String> {
        self.state.borrow().rows.clone()
    }

    fn build(&self, name: &str, action: Action) -> Recording {
        Recording {
            name: name.to_string(),
            state: Rc::clone(&self.state),
            action,
        }
    }
}

#[derive(Debug)]
enum Action {
    Record,
    Move {
        direction: MoveDirection,
        remaining: usize,
    },
    Back(Binding),
    Write {
        batches: Vec<Vec<(String, String)>>,
        next: usize,
    },
    ObserveContext,
    ObserveRow(String),
}

impl Action {
    fn records_lifecycle(&self) -> bool {
        matches!(self, Action::Record | Action::Move { .. } | Action::Back(_))
    }
}

#[derive(Debug)]
pub struct Recording {
    name: String,
    state: Rc<RefCell<RecorderState>>,
    action: Action,
}

impl Recording {
    fn record(&self, hook: &str) {
        if self.action.records_lifecycle() {
            self.state
                .borrow_mut()
                .events
                .push(format!("{}:{hook}", self.name));
        }
    }
}

impl TaskBehavior for Recording {
    fn label(&self) -> &'static str {
        "recorder"
    }

    fn default_bindings(&self, kind: TaskKind) -> Vec<Binding> {
        match (&self.action, kind.waits_for_signal()) {
            (_, false) => Vec::new(),
            (Action::Back(back), true) => vec![Binding::Confirm, back.clone()],
            (_, true) => vec![Binding::Confirm],
        }
    }

    fn on_prepare(&mut self, ctx: &mut TaskCtx<'_, '_, '_>) -> Result<(), TaskError> {
        self.record("prepare");
        match &mut self.action {
            Action::Move {
                direction,
                remaining,
            } if *remaining > 0 => {
                *remaining -= 1;
                ctx.request_move(*direction);
            }
            Action::Write { batches, next } => {
                if let Some(batch) = batches.get(*next) {
                    if let Some(context) = ctx.context_mut() {
                        context.extend(batch.iter().cloned());
                    }
                }
                *next += 1;
            }
            Action::ObserveContext => {
                let size = ctx.context().map_or(0, BTreeMap::len);
                self.state.borrow_mut().context_sizes.push(size);
            }
            Action::ObserveRow(column) => {
                let value = ctx
                    .row()
                    .and_then(|row| row.get(column.as_str()))
                    .cloned()
                    .unwrap_or_default();
                self.state.borrow_mut().rows.push(value);
            }
            _ => {}
        }
        Ok(())
    }

    fn on_input(&mut self, binding: &Binding, ctx: &mut TaskCtx<'_, '_, '_>) {
        if let Action::Back(back) = &self.action {
            if binding == back {
                ctx.request_move(MoveDirection::Previous);
                ctx.stop();
                return;
            }
        }
        if *binding == Binding::Confirm {
            ctx.stop();
        }
    }

    fn on_timeout(&mut self, _ctx: &mut TaskCtx<'_, '_, '_>) {
        self.record("timeout");
    }

    fn on_finish(&mut self, _ctx: &mut TaskCtx<'_, '_, '_>) {
        self.record("finish");
    }
}
