//! Diagnostic tracing for the planner.
//!
//! Tracing events go to stderr and are filtered with `RUST_LOG`. The planning
//! data files written by [`crate::io::data_file`] are the product output and do
//! not depend on the log level.

use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Initialize the tracing subscriber.
///
/// Reads `RUST_LOG`. Defaults to `info` so the waiting and selection messages
/// of a planning session are visible.
///
/// # Example
/// ```bash
/// RUST_LOG=planner=debug planner run
/// ```
pub fn init() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(std::io::stderr).compact())
        .init();
}
