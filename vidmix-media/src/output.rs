//! Composite output and its consumers

use crate::capture::VideoSink;
use crate::observer::{ObserverHandle, ObserverRegistry};
use crate::tracks::{PixelFormat, VideoFrame, VideoResolution};
use bytes::Bytes;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::debug;

/// One finished composite frame
///
/// Published only after the write pass for its tick has completed; the pixel
/// buffer is immutable from then on.
#[derive(Debug, Clone)]
pub struct CompositeOutput {
    /// Canvas width in pixels
    pub width: u32,
    /// Canvas height in pixels
    pub height: u32,
    /// Pixel layout of `data`
    pub format: PixelFormat,
    /// Monotonic output frame counter, starting at 1
    pub frame_number: u64,
    /// Time since the producer started, in microseconds
    pub timestamp_us: u64,
    /// Number of tracks drawn into this frame
    pub tracks_drawn: usize,
    /// Pixel buffer
    pub data: Bytes,
}

impl CompositeOutput {
    pub fn resolution(&self) -> VideoResolution {
        VideoResolution::new(self.width, self.height)
    }

    /// RGBA value at `(x, y)`
    pub fn pixel(&self, x: u32, y: u32) -> Option<[u8; 4]> {
        if x >= self.width || y >= self.height || self.format != PixelFormat::Rgba {
            return None;
        }
        let offset = (y as usize * self.width as usize + x as usize) * 4;
        let px = self.data.get(offset..offset + 4)?;
        Some([px[0], px[1], px[2], px[3]])
    }

    /// Whether every pixel equals `color`
    pub fn is_filled_with(&self, color: [u8; 4]) -> bool {
        self.format == PixelFormat::Rgba && self.data.chunks_exact(4).all(|px| px == color)
    }

    /// Re-wrap as a video frame without copying pixels
    pub fn to_video_frame(&self) -> VideoFrame {
        VideoFrame::new(self.width, self.height, self.format, self.data.clone())
            .with_timestamp(self.timestamp_us)
    }
}

/// Consumer of composed frames
pub trait OutputSink: Send + Sync {
    fn on_composed_frame(&self, output: Arc<CompositeOutput>);
}

/// Sink forwarding composed frames to a broadcast channel
#[derive(Debug, Clone)]
pub struct ChannelSink {
    tx: broadcast::Sender<Arc<CompositeOutput>>,
}

impl ChannelSink {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Arc<CompositeOutput>> {
        self.tx.subscribe()
    }
}

impl OutputSink for ChannelSink {
    fn on_composed_frame(&self, output: Arc<CompositeOutput>) {
        // no subscribers is fine; the frame is simply not observed
        let _ = self.tx.send(output);
    }
}

/// Sink calling a closure for every composed frame
pub struct CallbackSink<F>
where
    F: Fn(Arc<CompositeOutput>) + Send + Sync,
{
    callback: F,
}

impl<F> CallbackSink<F>
where
    F: Fn(Arc<CompositeOutput>) + Send + Sync,
{
    pub fn new(callback: F) -> Self {
        Self { callback }
    }
}

impl<F> OutputSink for CallbackSink<F>
where
    F: Fn(Arc<CompositeOutput>) + Send + Sync,
{
    fn on_composed_frame(&self, output: Arc<CompositeOutput>) {
        (self.callback)(output)
    }
}

/// Re-publishes composed frames as an outbound video track
///
/// Every composed frame becomes a [`VideoFrame`] on [`track_id`](Self::track_id)
/// and is forwarded to the registered video sinks (encoders, other mixers).
#[derive(Debug)]
pub struct VirtualCaptureSource {
    track_id: String,
    sinks: ObserverRegistry<dyn VideoSink>,
    frames_published: AtomicU64,
}

impl VirtualCaptureSource {
    pub fn new(track_id: impl Into<String>) -> Self {
        Self {
            track_id: track_id.into(),
            sinks: ObserverRegistry::new(),
            frames_published: AtomicU64::new(0),
        }
    }

    pub fn track_id(&self) -> &str {
        &self.track_id
    }

    pub fn add_sink(&self, sink: Arc<dyn VideoSink>) -> ObserverHandle {
        self.sinks.register(sink)
    }

    pub fn remove_sink(&self, handle: ObserverHandle) -> bool {
        self.sinks.unregister(handle)
    }

    pub fn frames_published(&self) -> u64 {
        self.frames_published.load(Ordering::Relaxed)
    }
}

impl OutputSink for VirtualCaptureSource {
    fn on_composed_frame(&self, output: Arc<CompositeOutput>) {
        let frame = Arc::new(output.to_video_frame());
        let delivered = self
            .sinks
            .notify(|sink| sink.on_frame(&self.track_id, Arc::clone(&frame)));
        self.frames_published.fetch_add(1, Ordering::Relaxed);
        debug!(
            "Virtual source {} republished frame {} to {} sinks",
            self.track_id, output.frame_number, delivered
        );
    }
}
