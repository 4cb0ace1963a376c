// ABOUTME: Tracing subscriber setup for the berth binary
// ABOUTME: RUST_LOG wins, then BERTH_LOG, then the info default

use berth_config::{env_opt, BERTH_LOG};
use tracing_subscriber::EnvFilter;

pub const DEFAULT_LOG_FILTER: &str = "info";

/// Resolve the log filter from the environment
pub fn log_filter() -> EnvFilter {
    EnvFilter::try_from_default_env()
        .or_else(|_| {
            EnvFilter::try_new(env_opt(BERTH_LOG).unwrap_or_else(|| DEFAULT_LOG_FILTER.to_string()))
        })
        .unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER))
}

/// Install the global subscriber. Logs go to stderr so JSON output stays clean.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(log_filter())
        .with_target(false)
        .with_writer(std::io::stderr)
        .compact()
        .try_init();
}
