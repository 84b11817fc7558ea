//! Hierarchical task execution engine for experimental protocols.
//!
//! A protocol is a tree of tasks advanced one scheduler tick at a time. Each
//! node prepares, holds its own run phase until a timer, an input or its
//! behavior ends it, then runs its children depth-first and finishes.
//! Composite nodes can instead walk their children with a navigable cursor
//! or repeat them over a fixed count or a table of rows, logging one dataset
//! row per iteration.
//!
//! - **[`core`]**: Pure, deterministic engine logic (lifecycle, navigation,
//!   repetition, authoring invariants). No I/O.
//! - **[`io`]**: Side-effecting collaborators (config, protocol files,
//!   dataset logs, scripted input, console HUD).
//!
//! [`protocol`] turns documents into task trees, [`behaviors`] holds the
//! concrete leaf behaviors and [`scheduler`] drives a tree to completion.

pub mod behaviors;
pub mod core;
pub mod exit_codes;
pub mod io;
pub mod logging;
pub mod protocol;
pub mod scheduler;
#[cfg(any(test, feature = "test-support"))]
pub mod test_support;
