//! Tracing subscriber setup for hosts and tests.

use tracing_subscriber::{fmt, EnvFilter};

/// Initializes the tracing subscriber for logging.
///
/// The filter comes from `RUST_LOG` and falls back to `warn`. Calling this
/// more than once is harmless; later calls leave the first subscriber in
/// place.
pub fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));

    let _ = fmt()
        .with_env_filter(filter)
        .with_target(false)
        .without_time()
        .try_init();
}
