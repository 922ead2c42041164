//! Single-view video renderer
//!
//! A [`VideoViewRenderer`] presents one track in a display-sized surface. It is
//! the second consumer of the shared geometry and frame cache: frames arrive
//! through [`VideoSink`], rendering happens on demand through
//! [`render`](VideoViewRenderer::render) on whatever thread drives the display.
//!
//! Muting a view stops it taking new frames and keeps showing the last one,
//! blurred. Blur can also be switched on for a live view.

use crate::capture::{CameraSwitchObserver, VideoSink};
use crate::error::{MediaError, MediaResult};
use crate::geometry::{CropRect, ObjectFit, Rect};
use crate::observer::{ObserverHandle, ObserverRegistry};
use crate::output::CompositeOutput;
use crate::render::{Canvas, RenderBackend, SoftwareBackend, MAX_BLUR_RADIUS};
use crate::track_renderer::{FrameInfo, TrackRenderer};
use crate::tracks::{PixelFormat, Track, VideoFrame, VideoResolution, VideoRotation};
use bytes::Bytes;
use parking_lot::{Mutex, RwLock};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::broadcast;
use tracing::{debug, info};

/// View configuration
#[derive(Debug, Clone, PartialEq)]
pub struct ViewConfig {
    /// Display surface size
    pub display: VideoResolution,
    /// Object fit inside the display
    pub object_fit: ObjectFit,
    /// Mirror the picture horizontally
    pub mirror: bool,
    /// RGBA fill outside the picture
    pub background_color: [u8; 4],
    /// Blur the picture even when not muted
    pub blur: bool,
    /// Gaussian blur radius in pixels
    pub blur_radius: f32,
}

impl Default for ViewConfig {
    fn default() -> Self {
        Self {
            display: VideoResolution::VGA,
            object_fit: ObjectFit::Contain,
            mirror: false,
            background_color: [0, 0, 0, 255],
            blur: false,
            blur_radius: 40.0,
        }
    }
}

impl ViewConfig {
    pub fn validate(&self) -> MediaResult<()> {
        if self.display.is_empty() {
            return Err(MediaError::InvalidConfiguration {
                message: "Display size cannot be zero".to_string(),
            });
        }
        if !(0.0..=MAX_BLUR_RADIUS).contains(&self.blur_radius) {
            return Err(MediaError::InvalidConfiguration {
                message: format!(
                    "Blur radius {} outside [0, {}]",
                    self.blur_radius, MAX_BLUR_RADIUS
                ),
            });
        }
        Ok(())
    }
}

/// View events
#[derive(Debug, Clone, PartialEq)]
pub enum ViewEvent {
    /// The first frame of the track reached the display
    FirstFrameRendered { track_id: String },
    /// The displayed frame size or rotation changed
    FrameResolutionChanged {
        track_id: String,
        width: u32,
        height: u32,
        rotation: VideoRotation,
    },
}

/// Receives every frame a view renders
pub trait FrameListener: Send + Sync {
    fn on_rendered_frame(&self, track_id: &str, output: &Arc<CompositeOutput>);
}

struct Surface {
    backend: Box<dyn RenderBackend>,
    canvas: Canvas,
}

/// Renders one track into a display surface
pub struct VideoViewRenderer {
    renderer: Arc<TrackRenderer>,
    surface: Mutex<Surface>,
    config: RwLock<ViewConfig>,
    muted: AtomicBool,
    first_frame_rendered: AtomicBool,
    last_frame: Mutex<Option<FrameInfo>>,
    snapshot: RwLock<Option<Arc<CompositeOutput>>>,
    listeners: ObserverRegistry<dyn FrameListener>,
    event_tx: broadcast::Sender<ViewEvent>,
    frames_rendered: AtomicU64,
    epoch: Instant,
}

impl VideoViewRenderer {
    pub fn new(track: Track, config: ViewConfig) -> MediaResult<Self> {
        Self::with_backend(track, config, Box::new(SoftwareBackend::new()))
    }

    pub fn with_backend(
        track: Track,
        config: ViewConfig,
        backend: Box<dyn RenderBackend>,
    ) -> MediaResult<Self> {
        config.validate()?;
        let renderer = Arc::new(TrackRenderer::new(track));
        renderer.set_mirror(config.mirror);
        let (event_tx, _) = broadcast::channel(64);
        Ok(Self {
            renderer,
            surface: Mutex::new(Surface {
                backend,
                canvas: Canvas::new(config.display),
            }),
            config: RwLock::new(config),
            muted: AtomicBool::new(false),
            first_frame_rendered: AtomicBool::new(false),
            last_frame: Mutex::new(None),
            snapshot: RwLock::new(None),
            listeners: ObserverRegistry::new(),
            event_tx,
            frames_rendered: AtomicU64::new(0),
            epoch: Instant::now(),
        })
    }

    pub fn track_id(&self) -> &str {
        self.renderer.track_id()
    }

    /// The underlying track renderer
    pub fn renderer(&self) -> &Arc<TrackRenderer> {
        &self.renderer
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ViewEvent> {
        self.event_tx.subscribe()
    }

    pub fn add_listener(&self, listener: Arc<dyn FrameListener>) -> ObserverHandle {
        self.listeners.register(listener)
    }

    pub fn remove_listener(&self, handle: ObserverHandle) -> bool {
        self.listeners.unregister(handle)
    }

    pub fn config(&self) -> ViewConfig {
        self.config.read().clone()
    }

    pub fn set_display_size(&self, size: VideoResolution) -> MediaResult<()> {
        if size.is_empty() {
            return Err(MediaError::InvalidConfiguration {
                message: "Display size cannot be zero".to_string(),
            });
        }
        self.config.write().display = size;
        self.surface.lock().canvas = Canvas::new(size);
        debug!("View {} resized to {}x{}", self.track_id(), size.width, size.height);
        Ok(())
    }

    pub fn set_object_fit(&self, object_fit: ObjectFit) {
        self.config.write().object_fit = object_fit;
    }

    pub fn set_mirror(&self, mirror: bool) {
        self.config.write().mirror = mirror;
        self.renderer.set_mirror(mirror);
    }

    pub fn set_crop(&self, crop: CropRect) {
        self.renderer.set_crop(crop);
    }

    pub fn set_rotation_override(&self, rotation: Option<VideoRotation>) {
        self.renderer.set_rotation_override(rotation);
    }

    /// A muted view drops incoming frames and shows the last one blurred
    pub fn set_muted(&self, muted: bool) {
        if self.muted.swap(muted, Ordering::AcqRel) != muted {
            debug!("View {} muted: {}", self.track_id(), muted);
        }
    }

    pub fn is_muted(&self) -> bool {
        self.muted.load(Ordering::Acquire)
    }

    /// Blur the picture of a live view
    pub fn set_blur(&self, blur: bool) {
        self.config.write().blur = blur;
    }

    /// Whether the next render is blurred, either explicitly or through mute
    pub fn is_blurred(&self) -> bool {
        self.is_muted() || self.config.read().blur
    }

    pub fn set_blur_radius(&self, radius: f32) -> MediaResult<()> {
        if !(0.0..=MAX_BLUR_RADIUS).contains(&radius) {
            return Err(MediaError::InvalidConfiguration {
                message: format!("Blur radius {} outside [0, {}]", radius, MAX_BLUR_RADIUS),
            });
        }
        self.config.write().blur_radius = radius;
        Ok(())
    }

    /// Hand a frame to the view
    ///
    /// Returns the cached frame version; while muted the frame is dropped and
    /// the version does not move.
    pub fn push_frame(&self, frame: impl Into<Arc<VideoFrame>>) -> u64 {
        if self.is_muted() {
            return self.renderer.cache().version();
        }
        self.renderer.push(frame)
    }

    /// Render the latest frame into the display surface
    ///
    /// Returns `None` before the first frame arrives. A muted view keeps
    /// rendering the last frame it took, blurred.
    pub fn render(&self) -> MediaResult<Option<Arc<CompositeOutput>>> {
        let config = self.config();
        let blurred = config.blur || self.is_muted();
        let mut surface = self.surface.lock();
        let Surface { backend, canvas } = &mut *surface;

        self.renderer.ensure_texture(backend.as_mut())?;
        let placement = Rect::new(0, 0, canvas.width(), canvas.height());
        let Some(draw) = self.renderer.draw_command(placement, config.object_fit) else {
            return Ok(None);
        };
        backend.composite(canvas, config.background_color, std::slice::from_ref(&draw))?;
        drop(draw);
        if blurred {
            backend.blur(canvas, config.blur_radius)?;
        }

        let frame_number = self.frames_rendered.fetch_add(1, Ordering::AcqRel) + 1;
        let output = Arc::new(CompositeOutput {
            width: canvas.width(),
            height: canvas.height(),
            format: PixelFormat::Rgba,
            frame_number,
            timestamp_us: self.epoch.elapsed().as_micros() as u64,
            tracks_drawn: 1,
            data: Bytes::copy_from_slice(canvas.pixels()),
        });
        drop(surface);

        self.publish_events();
        *self.snapshot.write() = Some(Arc::clone(&output));
        self.listeners
            .notify(|listener| listener.on_rendered_frame(self.track_id(), &output));
        Ok(Some(output))
    }

    fn publish_events(&self) {
        let track_id = self.track_id().to_string();
        if !self.first_frame_rendered.swap(true, Ordering::AcqRel) {
            info!("First frame rendered for track {}", track_id);
            let _ = self.event_tx.send(ViewEvent::FirstFrameRendered {
                track_id: track_id.clone(),
            });
        }

        let Some(current) = self.renderer.frame_info() else {
            return;
        };
        let mut last = self.last_frame.lock();
        let changed = last.map_or(true, |previous| {
            (previous.width, previous.height, previous.rotation)
                != (current.width, current.height, current.rotation)
        });
        *last = Some(current);
        drop(last);

        if changed {
            debug!(
                "Track {} frame is now {}x{} at {}°",
                track_id,
                current.width,
                current.height,
                current.rotation.degrees()
            );
            let _ = self.event_tx.send(ViewEvent::FrameResolutionChanged {
                track_id,
                width: current.width,
                height: current.height,
                rotation: current.rotation,
            });
        }
    }

    /// Most recently rendered frame
    pub fn snapshot(&self) -> Option<Arc<CompositeOutput>> {
        self.snapshot.read().clone()
    }

    pub fn frames_rendered(&self) -> u64 {
        self.frames_rendered.load(Ordering::Acquire)
    }

    pub fn live_textures(&self) -> usize {
        self.surface.lock().backend.live_textures()
    }

    /// Release the texture and cached frames; the view renders nothing afterwards
    pub fn dispose(&self) {
        let _surface = self.surface.lock();
        self.renderer.dispose();
        self.snapshot.write().take();
        self.listeners.clear();
    }
}

impl std::fmt::Debug for VideoViewRenderer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VideoViewRenderer")
            .field("track_id", &self.track_id())
            .field("config", &self.config())
            .field("muted", &self.is_muted())
            .finish()
    }
}

impl VideoSink for VideoViewRenderer {
    fn on_frame(&self, track_id: &str, frame: Arc<VideoFrame>) {
        if track_id == self.track_id() {
            self.push_frame(frame);
        }
    }
}

impl CameraSwitchObserver for VideoViewRenderer {
    fn did_switch_camera(&self, track_id: &str, front_facing: bool) {
        if track_id == self.track_id() {
            self.renderer.set_front_facing(front_facing);
        }
    }
}
