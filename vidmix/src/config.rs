//! Configuration types and defaults

use crate::error::VidMixError;
use vidmix_media::CompositorConfig;

/// Global vidmix configuration
#[derive(Debug, Clone)]
pub struct GlobalConfig {
    /// Enable debug logging
    pub debug_logging: bool,
    /// Default filter directive when `RUST_LOG` is unset
    pub log_level: String,
    /// Configuration used by mixers created without their own
    pub default_mixer: CompositorConfig,
    /// Maximum number of concurrent mixers per session
    pub max_mixers: usize,
}

impl Default for GlobalConfig {
    fn default() -> Self {
        Self {
            debug_logging: false,
            log_level: "info".to_string(),
            default_mixer: CompositorConfig::default(),
            max_mixers: 4,
        }
    }
}

impl GlobalConfig {
    /// Validate configuration
    pub fn validate(&self) -> Result<(), VidMixError> {
        if self.max_mixers == 0 {
            return Err(VidMixError::Initialization {
                reason: "max_mixers must be at least 1".to_string(),
            });
        }
        self.default_mixer.validate()?;
        Ok(())
    }
}
