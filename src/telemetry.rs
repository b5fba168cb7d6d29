//! Tracing setup.

use tracing_subscriber::EnvFilter;

use crate::config::LoggingConfig;

/// Install the global tracing subscriber from config.
///
/// `CARDSYNC_LOG` overrides the configured filter. Safe to call more than
/// once; later calls are no-ops.
pub fn init(config: &LoggingConfig) {
    let filter = std::env::var("CARDSYNC_LOG")
        .ok()
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| config.filter.clone());

    let filter = EnvFilter::try_new(&filter).unwrap_or_else(|_| EnvFilter::new("info"));

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}
