//! Deterministic, pure engine logic.
//!
//! Core modules must be free of I/O side effects. Everything they touch from
//! the outside world goes through the collaborator traits in
//! [`collaborators`], handed in explicitly as an [`context::Env`].

pub mod behavior;
pub mod collaborators;
pub mod context;
pub mod error;
pub mod invariants;
pub mod navigation;
pub mod queue;
pub mod repeat;
pub mod task;
pub mod timer;
pub mod types;
