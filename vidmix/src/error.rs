//! Error types for the vidmix facade

use thiserror::Error;
use vidmix_media::MediaError;

/// Main error type for vidmix
#[derive(Error, Debug)]
pub enum VidMixError {
    /// Initialization error
    #[error("Initialization failed: {reason}")]
    Initialization {
        /// Reason for initialization failure
        reason: String,
    },

    /// A mixer, view or track id is not known to the session
    #[error("{kind} not found: {id}")]
    NotFound {
        /// What was looked up
        kind: &'static str,
        /// The id that was not found
        id: String,
    },

    /// An id is already taken
    #[error("{kind} already exists: {id}")]
    AlreadyExists {
        /// What was created
        kind: &'static str,
        /// The id in use
        id: String,
    },

    /// Resource limit exceeded
    #[error("Resource limit exceeded: {resource}")]
    ResourceLimit {
        /// Resource that exceeded limit
        resource: String,
    },

    /// Error raised by the compositing core
    #[error(transparent)]
    Media(#[from] MediaError),
}

impl VidMixError {
    /// Whether retrying the operation could succeed
    pub fn is_recoverable(&self) -> bool {
        match self {
            VidMixError::Initialization { .. } => false,
            VidMixError::NotFound { .. } | VidMixError::AlreadyExists { .. } => false,
            VidMixError::ResourceLimit { .. } => true,
            VidMixError::Media(error) => error.is_recoverable(),
        }
    }
}

/// Result alias for facade operations
pub type VidMixResult<T> = Result<T, VidMixError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_media_error_converts() {
        let error: VidMixError = MediaError::AlreadyRunning.into();
        assert!(matches!(error, VidMixError::Media(MediaError::AlreadyRunning)));
        assert_eq!(error.to_string(), MediaError::AlreadyRunning.to_string());
    }

    #[test]
    fn test_not_found_display() {
        let error = VidMixError::NotFound {
            kind: "mixer",
            id: "main".to_string(),
        };
        assert_eq!(error.to_string(), "mixer not found: main");
        assert!(!error.is_recoverable());
    }
}
