//! Logging and tracing utilities

use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

/// Initialize tracing subscriber with default configuration
///
/// Honors `RUST_LOG`; falls back to `info`.
pub fn init_tracing() {
    init_tracing_with("info");
}

/// Initialize tracing with a caller-chosen default filter
///
/// `RUST_LOG` still wins when set. Output goes to stderr so stdout stays free
/// for command results. Calling this twice is a no-op rather than a panic, so
/// binaries and tests can both call it.
pub fn init_tracing_with(default_filter: &str) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));

    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .try_init();
}
