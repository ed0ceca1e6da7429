//! Process-wide `tracing` subscriber setup.

use config::ObservabilityConfig;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

#[derive(Debug, thiserror::Error)]
pub enum SubscriberError {
    #[error("Invalid log filter '{filter}': {reason}")]
    InvalidFilter { filter: String, reason: String },

    #[error("A global subscriber is already installed: {0}")]
    AlreadyInstalled(String)
}

/// Install the global subscriber.
///
/// `RUST_LOG` wins over the configured level when set. Log lines go to
/// stderr so stdout stays free for command output. Call once, from the
/// binary.
pub fn init_subscriber(config: &ObservabilityConfig) -> Result<(), SubscriberError> {
    let filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => EnvFilter::try_new(&config.logging_level).map_err(|e| {
            SubscriberError::InvalidFilter {
                filter: config.logging_level.clone(),
                reason: e.to_string()
            }
        })?
    };

    let registry = tracing_subscriber::registry().with(filter);
    let result = if config.json_logs {
        registry
            .with(
                fmt::layer()
                    .json()
                    .with_current_span(true)
                    .with_writer(std::io::stderr)
            )
            .try_init()
    } else {
        registry
            .with(fmt::layer().with_target(true).with_writer(std::io::stderr))
            .try_init()
    };

    result.map_err(|e| SubscriberError::AlreadyInstalled(e.to_string()))
}
