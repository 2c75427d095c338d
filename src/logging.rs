//! Tracing subscriber setup

use tracing::debug;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

use crate::config::LoggingConfig;
use crate::error::AirsoundsError;

/// Filter directive for the configured level raised by `-v` flags.
/// `RUST_LOG` takes precedence over both.
#[must_use]
pub fn filter_directive(config: &LoggingConfig, verbosity: u8) -> String {
    let level = match verbosity {
        0 => config.level.as_str(),
        1 => "debug",
        _ => "trace",
    };
    format!("{level},hyper=warn,reqwest=warn")
}

/// Install the global subscriber; `pretty` or `json` output
pub fn init(config: &LoggingConfig, verbosity: u8) -> Result<(), AirsoundsError> {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter_directive(config, verbosity)));

    let registry = tracing_subscriber::registry().with(env_filter);
    let result = if config.format == "json" {
        registry
            .with(tracing_subscriber::fmt::layer().json().with_target(true))
            .try_init()
    } else {
        registry
            .with(tracing_subscriber::fmt::layer().with_target(false))
            .try_init()
    };
    result.map_err(|e| AirsoundsError::config(format!("Failed to initialize logging: {e}")))?;

    debug!("Logging initialized ({} format)", config.format);
    Ok(())
}
