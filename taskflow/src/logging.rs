//! Diagnostic tracing for engine runs.
//!
//! A run writes to two channels. Lifecycle events (prepare, run-phase
//! resolution, cursor moves, iteration boundaries) go to `tracing` and are
//! filtered by `RUST_LOG`; nothing from this channel lands in the output
//! directory. Participant-facing records go through [`ExperimentLog`] and are
//! written regardless of the filter.
//!
//! [`ExperimentLog`]: crate::core::collaborators::ExperimentLog

use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Install a compact stderr subscriber. Level comes from `RUST_LOG`, `warn`
/// when unset (`RUST_LOG=taskflow=debug` shows every tick).
pub fn init() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(std::io::stderr).compact())
        .init();
}
