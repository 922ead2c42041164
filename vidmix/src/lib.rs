//! # vidmix - Real-Time Multi-Track Video Compositing
//!
//! vidmix takes several independently arriving video tracks (local cameras,
//! remote peers) and composes them into one output video stream at a fixed
//! frame rate, suitable for recording or re-broadcasting a call.
//!
//! ## Key Features
//!
//! - **Fixed-rate compositing**: a tick loop that never stalls on slow producers
//! - **Correct orientation**: rotation, front-camera mirroring and object fit per track
//! - **Session scoped**: mixers, views and tracks live in an explicit [`MediaSession`]
//! - **Pluggable output**: send composed frames to channels, callbacks or another mixer
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use vidmix::{CompositorConfig, VidMix, VideoFrame};
//!
//! fn main() -> Result<(), vidmix::VidMixError> {
//!     let vidmix = VidMix::init()?;
//!     let session = vidmix.session()?;
//!
//!     session.register_track("alice", true, "Alice");
//!     let mixer = session.create_mixer("call", CompositorConfig::default())?;
//!     let mut composed = mixer.subscribe();
//!
//!     session.push_frame("alice", VideoFrame::solid(640, 480, [255, 0, 0, 255]))?;
//!     vidmix.block_on(async {
//!         let _ = composed.recv().await;
//!         session.shutdown().await
//!     })?;
//!     Ok(())
//! }
//! ```

#![deny(missing_docs)]
#![warn(clippy::all)]

// Re-export core types for easy access
pub use vidmix_media::{
    CallbackSink, CameraSwitchObserver, ChannelSink, CompositeOutput, Compositor, CompositorConfig,
    CompositorEvent, CompositorState, CompositorStats, CropRect, LayoutKind, MediaError, MediaResult,
    ObjectFit, OutputSink, PixelFormat, RotationMode, SamplesInterceptor, SamplesInterceptorDelegate,
    TestPatternCapturer, TestPatternConfig, Track, VideoCapturer, VideoFrame, VideoResolution,
    VideoRotation, VideoSink, VideoViewRenderer, ViewConfig, VirtualCaptureSource,
};

#[cfg(feature = "diagnostics")]
pub use vidmix_diagnostics::{DebugLogger, MixerAnalyzer, MixerReport, RenderProfiler};

// Public API modules
pub mod config;
pub mod error;
pub mod session;

// Re-export main API types
pub use config::GlobalConfig;
pub use error::{VidMixError, VidMixResult};
pub use session::MediaSession;

/// Main entry point for vidmix
#[derive(Debug, Clone)]
pub struct VidMix {
    inner: std::sync::Arc<VidMixInner>,
}

#[derive(Debug)]
struct VidMixInner {
    runtime: tokio::runtime::Runtime,
    config: GlobalConfig,
}

impl VidMix {
    /// Initialize vidmix with default settings
    ///
    /// # Example
    /// ```rust,no_run
    /// use vidmix::VidMix;
    ///
    /// let vidmix = VidMix::init()?;
    /// # Ok::<(), vidmix::VidMixError>(())
    /// ```
    pub fn init() -> Result<Self, VidMixError> {
        Self::init_with(GlobalConfig::default())
    }

    /// Initialize with custom global configuration
    ///
    /// Must not be called from inside an async context: vidmix owns its
    /// runtime and drops it when the last handle goes away.
    pub fn init_with(config: GlobalConfig) -> Result<Self, VidMixError> {
        config.validate()?;
        if config.debug_logging {
            Self::init_logging(&config.log_level)?;
        }

        let runtime = tokio::runtime::Builder::new_multi_thread()
            .thread_name("vidmix")
            .enable_all()
            .build()
            .map_err(|e| VidMixError::Initialization {
                reason: format!("Failed to create async runtime: {}", e),
            })?;

        tracing::info!("vidmix initialized (max {} mixers)", config.max_mixers);
        Ok(Self {
            inner: std::sync::Arc::new(VidMixInner { runtime, config }),
        })
    }

    #[cfg(feature = "diagnostics")]
    fn init_logging(level: &str) -> Result<(), VidMixError> {
        DebugLogger::init_logging(level)?;
        Ok(())
    }

    #[cfg(not(feature = "diagnostics"))]
    fn init_logging(_level: &str) -> Result<(), VidMixError> {
        tracing::debug!("Debug logging requested without the diagnostics feature");
        Ok(())
    }

    /// Global configuration
    pub fn config(&self) -> &GlobalConfig {
        &self.inner.config
    }

    /// Handle to the runtime mixers tick on
    pub fn handle(&self) -> tokio::runtime::Handle {
        self.inner.runtime.handle().clone()
    }

    /// Create a new session whose mixers run on this instance's runtime
    pub fn session(&self) -> Result<MediaSession, VidMixError> {
        MediaSession::with_runtime(self.inner.config.clone(), self.handle())
    }

    /// Run a future to completion on the vidmix runtime
    pub fn block_on<F: std::future::Future>(&self, future: F) -> F::Output {
        self.inner.runtime.block_on(future)
    }
}
