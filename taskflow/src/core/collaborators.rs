//! Interfaces of the collaborators the engine consumes.
//!
//! The engine never renders, tracks input devices or parses tables itself. It
//! talks to these traits; `io` provides file/console implementations and
//! `test_support` provides in-memory ones.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::core::types::{Binding, Row, TaskId};

/// Read-only settings snapshot handed to every prepare.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct Settings {
    pub participant_id: String,
    pub display_mode: DisplayMode,
    /// HUD distance from the viewer in meters.
    pub hud_distance: f64,
    /// Delay before UI accepts input, in milliseconds.
    pub ui_delay_ms: u64,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            participant_id: "anonymous".to_string(),
            display_mode: DisplayMode::Desktop,
            hud_distance: 1.5,
            ui_delay_ms: 0,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum DisplayMode {
    #[default]
    Desktop,
    Vr,
}

/// Experiment logging sink: free-form audit messages plus named datasets.
pub trait ExperimentLog {
    fn info(&mut self, tag: &str, message: &str);
    fn warn(&mut self, tag: &str, message: &str);
    fn error(&mut self, tag: &str, message: &str);

    /// Open dataset `name` with the given column order.
    fn begin_dataset(&mut self, name: &str, columns: &[String]);
    /// Stage a value for the dataset's pending row.
    fn set_value(&mut self, name: &str, column: &str, value: &str);
    /// Flush the pending row; unset columns are written empty.
    fn log_row(&mut self, name: &str);
    fn end_dataset(&mut self, name: &str);
}

/// Minimal enumerator over externally supplied rows.
pub trait RowSource {
    /// Advance to the next row; false once the rows are exhausted.
    fn move_next(&mut self) -> bool;
    /// Rewind to before the first row.
    fn reset(&mut self);
    /// Row at the current position.
    fn current(&self) -> Result<Row, String>;
    fn row_count(&self) -> usize;
}

/// Player/input event source with per-task handler registration.
pub trait InputSource {
    fn register(&mut self, owner: TaskId, binding: Binding);
    fn unregister(&mut self, owner: TaskId, binding: &Binding);
    fn unregister_all(&mut self, owner: TaskId);
    /// Events delivered to `owner` since the last drain, in arrival order.
    fn drain(&mut self, owner: TaskId) -> Vec<Binding>;
    /// Called by the scheduler at the start of every tick.
    fn begin_tick(&mut self, _now: Duration) {}
}

/// Heads-up display used by leaf behaviors.
pub trait Hud {
    fn set_title(&mut self, title: &str);
    fn set_content(&mut self, content: &str);
    fn show(&mut self);
    fn hide(&mut self);
}
