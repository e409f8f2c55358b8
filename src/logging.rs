//! Structured logging setup.
//!
//! Logs go to **stderr**; stdout belongs to the host protocol. Filtering
//! follows `RUST_LOG`, e.g. `RUST_LOG=neon_provider=debug` shows every
//! remote call the lifecycle operations make.
//!
//! Secrets never reach the log: lifecycle spans skip state arguments and
//! `Debug` output of states and API models masks passwords and URIs.

use tracing_subscriber::{fmt, prelude::*, EnvFilter};

fn subscriber(default_level: &str) -> impl tracing::Subscriber + Send + Sync + 'static {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    tracing_subscriber::registry().with(filter).with(
        fmt::layer()
            .with_writer(std::io::stderr)
            .with_target(true)
            .with_thread_ids(false)
            .with_file(false)
            .with_line_number(false),
    )
}

/// Install the global subscriber, `info` unless `RUST_LOG` says otherwise.
///
/// # Panics
///
/// Panics if a global subscriber has already been set.
pub fn init_logging() {
    init_logging_with_default("info");
}

/// Like [`init_logging`] with another default level.
///
/// # Panics
///
/// Panics if a global subscriber has already been set.
pub fn init_logging_with_default(default_level: &str) {
    subscriber(default_level).init();
}

/// Try to install the global subscriber. Returns false if one is already set.
pub fn try_init_logging() -> bool {
    subscriber("info").try_init().is_ok()
}
