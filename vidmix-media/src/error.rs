//! Media error types and handling
//!
//! This module defines all error types used throughout the compositing core,
//! providing clear error messages and context for debugging and error handling.
//! No error raised here is fatal to a running compositor: per-track failures
//! skip the track for one tick, everything else is reported synchronously.

use thiserror::Error;

/// Axis of a crop window
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CropAxis {
    /// Left + right fractions
    Horizontal,
    /// Top + bottom fractions
    Vertical,
}

impl std::fmt::Display for CropAxis {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CropAxis::Horizontal => write!(f, "horizontal"),
            CropAxis::Vertical => write!(f, "vertical"),
        }
    }
}

/// Main error type for media compositing operations
#[derive(Error, Debug, Clone)]
pub enum MediaError {
    /// `start` was called on a compositor that is already running
    #[error("Compositor already running")]
    AlreadyRunning,

    /// Track is not registered
    #[error("Unknown track: {track_id}")]
    UnknownTrack {
        /// Track identifier
        track_id: String,
    },

    /// Converting a frame into a texture failed
    #[error("Texture upload failed for track {track_id}: {reason}")]
    TextureUploadFailure {
        /// Track identifier
        track_id: String,
        /// Failure reason
        reason: String,
    },

    /// Crop fractions cover the whole axis
    #[error("Degenerate crop on {axis} axis: fractions sum to {sum}")]
    DegenerateCrop {
        /// Offending axis
        axis: CropAxis,
        /// Sum of the two fractions on that axis
        sum: f32,
    },

    /// Invalid configuration provided
    #[error("Invalid configuration: {message}")]
    InvalidConfiguration {
        /// Error message
        message: String,
    },

    /// Unsupported pixel format
    #[error("Unsupported format: {format}")]
    UnsupportedFormat {
        /// Format description
        format: String,
    },

    /// Invalid frame data error
    #[error("Invalid frame data: expected {expected} bytes, got {actual}")]
    InvalidFrameData {
        /// Expected data size
        expected: usize,
        /// Actual data size
        actual: usize,
    },

    /// Invalid state for operation
    #[error("Invalid state: {message}")]
    InvalidState {
        /// State error message
        message: String,
    },

    /// Texture or canvas allocation failed
    #[error("Memory allocation failed: {size} bytes")]
    MemoryAllocationFailed {
        /// Size that failed to allocate
        size: usize,
    },

    /// Capturer reported a failure
    #[error("Capture error: {message}")]
    Capture {
        /// Error message
        message: String,
    },
}

/// Result type alias for media operations
pub type MediaResult<T> = Result<T, MediaError>;

impl MediaError {
    /// Check if error is recoverable
    pub fn is_recoverable(&self) -> bool {
        match self {
            MediaError::UnknownTrack { .. } => true,
            MediaError::TextureUploadFailure { .. } => true,
            MediaError::MemoryAllocationFailed { .. } => true,
            MediaError::Capture { .. } => true,
            MediaError::AlreadyRunning => false,
            MediaError::DegenerateCrop { .. } => false,
            MediaError::InvalidConfiguration { .. } => false,
            MediaError::UnsupportedFormat { .. } => false,
            _ => false,
        }
    }

    /// Get error category
    pub fn category(&self) -> ErrorCategory {
        match self {
            MediaError::AlreadyRunning => ErrorCategory::State,
            MediaError::UnknownTrack { .. } => ErrorCategory::Track,
            MediaError::TextureUploadFailure { .. } => ErrorCategory::Render,
            MediaError::DegenerateCrop { .. } => ErrorCategory::Configuration,
            MediaError::InvalidConfiguration { .. } => ErrorCategory::Configuration,
            MediaError::UnsupportedFormat { .. } => ErrorCategory::Format,
            MediaError::InvalidFrameData { .. } => ErrorCategory::Data,
            MediaError::InvalidState { .. } => ErrorCategory::State,
            MediaError::MemoryAllocationFailed { .. } => ErrorCategory::Memory,
            MediaError::Capture { .. } => ErrorCategory::Device,
        }
    }

    /// Wrap this error as a texture upload failure for `track_id`
    pub fn into_upload_failure(self, track_id: &str) -> MediaError {
        match self {
            MediaError::TextureUploadFailure { .. } => self,
            other => MediaError::TextureUploadFailure {
                track_id: track_id.to_string(),
                reason: other.to_string(),
            },
        }
    }
}

/// Error categories for classification
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    /// Configuration and parameter errors
    Configuration,
    /// Format and data structure errors
    Format,
    /// Data validation errors
    Data,
    /// Track registration errors
    Track,
    /// Texture upload and draw errors
    Render,
    /// Device and capturer errors
    Device,
    /// State management errors
    State,
    /// Memory management errors
    Memory,
}
