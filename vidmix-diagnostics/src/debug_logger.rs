//! Structured debug logging system

use tracing::debug;
use tracing_subscriber::EnvFilter;
use vidmix_media::{MediaError, MediaResult};

/// Debug logger for structured logging
#[derive(Debug, Default)]
pub struct DebugLogger;

impl DebugLogger {
    /// Create new debug logger
    pub fn new() -> Self {
        Self
    }

    /// Initialize logging system
    ///
    /// `RUST_LOG` wins when set; otherwise `level` is used as the default
    /// directive. A subscriber installed earlier stays in place.
    pub fn init_logging(level: &str) -> MediaResult<()> {
        let filter = match EnvFilter::try_from_default_env() {
            Ok(filter) => filter,
            Err(_) => EnvFilter::try_new(level).map_err(|e| MediaError::InvalidConfiguration {
                message: format!("Invalid log level '{}': {}", level, e),
            })?,
        };

        if tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(true)
            .try_init()
            .is_err()
        {
            debug!("Global subscriber already installed, keeping it");
        }
        Ok(())
    }
}
