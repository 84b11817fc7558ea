//! Stable exit codes for `taskflow` CLI commands.

/// Command succeeded or the protocol ran to completion.
pub const OK: i32 = 0;
/// Invalid config or protocol document, or another setup error.
pub const INVALID: i32 = 1;
/// `taskflow run` hit the tick limit before the protocol completed.
pub const STALLED: i32 = 2;
/// A task raised a fatal error and the run was halted.
pub const FATAL: i32 = 3;
