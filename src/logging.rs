//! Diagnostic logging
//!
//! Check output belongs on stdout, where the scheduler collects it, so logs
//! go to stderr. `RUST_LOG` wins when it is set, otherwise the number of
//! `-v` flags picks the level.

use tracing_subscriber::EnvFilter;

/// The default filter directive for a given number of `-v` flags
pub fn level_for(verbosity: u8) -> &'static str {
    match verbosity {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    }
}

/// Install the global subscriber
///
/// Safe to call more than once, later calls are ignored.
pub fn init(verbosity: u8) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(level_for(verbosity)));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init();
}
