//! Structured logging setup.
//!
//! Everything in the crate logs through `tracing`. Applications that do not
//! install their own subscriber can call [`init_logging`] once at startup.

use tracing::Level;
use tracing_subscriber::{fmt, EnvFilter};

use crate::config::LoggingConfig;
use crate::error::{Result, WireError};

/// Install a global fmt subscriber configured from `config`.
///
/// `RUST_LOG` takes precedence over `config.log_level` when set. Calling this
/// again after a subscriber is installed is a no-op that returns `Ok(false)`.
pub fn init_logging(config: &LoggingConfig) -> Result<bool> {
    let filter = env_filter(config.log_level)?;

    let installed = if config.json_format {
        fmt()
            .json()
            .with_env_filter(filter)
            .with_target(true)
            .try_init()
            .is_ok()
    } else {
        fmt()
            .with_env_filter(filter)
            .with_target(true)
            .try_init()
            .is_ok()
    };

    if installed {
        tracing::info!(app = %config.app_name, level = %config.log_level, "Logging initialized");
    }
    Ok(installed)
}

fn env_filter(level: Level) -> Result<EnvFilter> {
    match EnvFilter::try_from_default_env() {
        Ok(filter) => Ok(filter),
        Err(_) => EnvFilter::try_new(level.as_str().to_ascii_lowercase())
            .map_err(|e| WireError::Config(format!("Invalid log filter: {e}"))),
    }
}
