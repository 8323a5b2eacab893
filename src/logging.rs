//! Tracing subscriber setup.

use tracing_subscriber::EnvFilter;

/// Installs a global fmt subscriber filtered by `RUST_LOG`, falling back to
/// `default_filter` (e.g. [`crate::SyncConfig::log_filter`]).
///
/// Returns `false` when a global subscriber was already installed, which
/// makes repeated calls harmless.
pub fn init_logging(default_filter: &str) -> bool {
    tracing_subscriber::fmt()
        .with_env_filter(build_filter(default_filter))
        .with_target(true)
        .try_init()
        .is_ok()
}

fn build_filter(default_filter: &str) -> EnvFilter {
    EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(default_filter))
        .unwrap_or_else(|_| EnvFilter::new(crate::config::DEFAULT_LOG_FILTER))
}
