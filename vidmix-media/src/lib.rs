//! # VidMix Media
//!
//! The compositing core of VidMix: frame and track types, the geometry engine,
//! per-track frame caches and renderers, the multi-track compositor and its
//! output sinks, plus the single-view renderer that shares the same geometry.

#![warn(clippy::all)]

pub mod capture;
pub mod compositor;
pub mod error;
pub mod frame_cache;
pub mod geometry;
pub mod interceptor;
pub mod layout;
pub mod observer;
pub mod output;
pub mod render;
pub mod track_renderer;
pub mod tracks;
pub mod video_render;

// Re-export main types
pub use capture::{
    CameraSwitchObserver, CapturerCapability, CapturerKind, TestPatternCapturer,
    TestPatternConfig, VideoCapturer, VideoSink,
};
pub use compositor::{
    Compositor, CompositorConfig, CompositorEvent, CompositorState, CompositorStats,
    DiagnosticsCallback, MAX_TARGET_FPS,
};
pub use error::{CropAxis, ErrorCategory, MediaError, MediaResult};
pub use frame_cache::{CacheStats, FrameBufferCache};
pub use geometry::{
    apply_permutation, corner_permutation, cube_vertex_data, cube_vertex_data_cropped,
    inverse_permutation, rotation_mode_for, texture_coordinates, texture_coordinates_cropped,
    texture_coordinates_scaled, CropRect, CubeVertexData, ObjectFit, Rect, RotationMode,
};
pub use interceptor::{InterceptorStats, SamplesInterceptor, SamplesInterceptorDelegate};
pub use layout::{Grid, LayoutKind, LayoutSlot, LayoutStrategy, PictureInPicture, SideBySide};
pub use observer::{ObserverHandle, ObserverRegistry};
pub use output::{CallbackSink, ChannelSink, CompositeOutput, OutputSink, VirtualCaptureSource};
pub use render::{
    Canvas, DrawCommand, RenderBackend, SoftwareBackend, Texture, TextureId, MAX_BLUR_RADIUS,
};
pub use track_renderer::{FrameInfo, TextureStatus, TrackRenderer};
pub use tracks::{AudioFrame, PixelFormat, Track, VideoFrame, VideoResolution, VideoRotation};
pub use video_render::{FrameListener, VideoViewRenderer, ViewConfig, ViewEvent};
