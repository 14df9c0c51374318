//! Log output for the binaries
//!
//! Libraries log through the `log` facade; the subscriber installed here
//! picks those records up as well as native tracing events.

use tracing_subscriber::EnvFilter;

/// Filter used when neither `RUST_LOG` nor the configured level parses
pub const DEFAULT_FILTER: &str = "info";

/// `RUST_LOG` wins over the configured level
pub fn filter_for(level: &str) -> EnvFilter {
    EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(level))
        .unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER))
}

/// Install the global subscriber; later calls are ignored
pub fn init_logging(level: &str) {
    let installed = tracing_subscriber::fmt()
        .with_env_filter(filter_for(level))
        .with_target(true)
        .with_line_number(true)
        .with_ansi(false)
        .try_init();

    if installed.is_err() {
        log::debug!("logging already initialised");
    }
}
