//! Multi-track compositor
//!
//! The compositor owns the registered [`TrackRenderer`]s and drives a
//! fixed-rate tick loop on the tokio runtime. Each tick:
//!
//! 1. snapshots the enabled tracks under the registry lock,
//! 2. lets every renderer bring its texture up to date (one upload at most),
//! 3. issues a single composite pass into the output canvas,
//! 4. publishes the finished frame to every registered [`OutputSink`].
//!
//! Track removal during a tick is deferred: the renderer is parked until the
//! tick completes and only then disposed. `stop` signals the loop, waits for the
//! in-flight tick to drain and then releases every texture.
//!
//! Sinks and the diagnostics callback run after the tick has released every
//! compositor lock, so they may call back into the compositor.

use crate::capture::{CameraSwitchObserver, VideoSink};
use crate::error::{MediaError, MediaResult};
use crate::geometry::{CropRect, ObjectFit};
use crate::layout::{LayoutKind, LayoutSlot, LayoutStrategy};
use crate::observer::{ObserverHandle, ObserverRegistry};
use crate::output::{CompositeOutput, OutputSink};
use crate::render::{Canvas, RenderBackend, SoftwareBackend};
use crate::track_renderer::{TextureStatus, TrackRenderer};
use crate::tracks::{PixelFormat, Track, VideoFrame, VideoResolution};
use bytes::Bytes;
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{broadcast, watch};
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

/// Highest accepted target frame rate
pub const MAX_TARGET_FPS: u32 = 120;

/// Compositor configuration, fixed for one Running period
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompositorConfig {
    /// Ticks per second
    pub target_fps: u32,
    /// Output canvas size
    pub output: VideoResolution,
    /// Fit used for tracks without their own override
    pub object_fit: ObjectFit,
    /// RGBA fill behind and between tracks
    pub background_color: [u8; 4],
    /// Built-in layout installed at start
    pub layout: LayoutKind,
    /// Period of the statistics log line
    pub stats_log_interval: Duration,
}

impl Default for CompositorConfig {
    fn default() -> Self {
        Self {
            target_fps: 30,
            output: VideoResolution::VGA,
            object_fit: ObjectFit::Contain,
            background_color: [0, 0, 0, 255],
            layout: LayoutKind::SideBySide,
            stats_log_interval: Duration::from_secs(4),
        }
    }
}

impl CompositorConfig {
    /// Validate configuration
    pub fn validate(&self) -> MediaResult<()> {
        if self.target_fps == 0 {
            return Err(MediaError::InvalidConfiguration {
                message: "Target frame rate cannot be zero".to_string(),
            });
        }
        if self.target_fps > MAX_TARGET_FPS {
            return Err(MediaError::InvalidConfiguration {
                message: format!(
                    "Target frame rate {} exceeds {}",
                    self.target_fps, MAX_TARGET_FPS
                ),
            });
        }
        if self.output.is_empty() {
            return Err(MediaError::InvalidConfiguration {
                message: format!(
                    "Output resolution {}x{} is empty",
                    self.output.width, self.output.height
                ),
            });
        }
        Ok(())
    }

    /// Interval between ticks
    pub fn tick_period(&self) -> Duration {
        Duration::from_secs_f64(1.0 / self.target_fps.max(1) as f64)
    }
}

/// Lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CompositorState {
    Idle,
    Running,
    Stopping,
}

/// Compositor events
#[derive(Debug, Clone)]
pub enum CompositorEvent {
    Started {
        target_fps: u32,
        output: VideoResolution,
    },
    Stopped {
        frames_composed: u64,
    },
    TrackAdded {
        track_id: String,
    },
    TrackUpdated {
        track_id: String,
    },
    TrackRemoved {
        track_id: String,
    },
    TextureUploadFailed {
        track_id: String,
        reason: String,
    },
    FrameComposed {
        frame_number: u64,
        tracks_drawn: usize,
        tick_time: Duration,
    },
}

/// Aggregate compositor statistics
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CompositorStats {
    /// Frames pushed into the registered tracks
    pub frames_received: u64,
    /// Frames overwritten before they were uploaded
    pub frames_dropped: u64,
    /// Composite frames published
    pub frames_rendered: u64,
    /// Successful texture uploads
    pub texture_uploads: u64,
    /// Failed texture uploads
    pub upload_failures: u64,
    /// Mean wall time of one tick
    pub average_tick_time: Duration,
    /// Registered tracks
    pub tracks: usize,
}

/// Callback receiving per-track errors raised inside the tick loop
pub type DiagnosticsCallback = Arc<dyn Fn(&MediaError) + Send + Sync>;

#[derive(Debug, Default)]
struct Registry {
    renderers: Vec<Arc<TrackRenderer>>,
    ticks_in_flight: usize,
    /// Renderers removed while a tick was in flight, disposed when it ends
    graveyard: Vec<Arc<TrackRenderer>>,
}

struct Engine {
    backend: Box<dyn RenderBackend>,
    canvas: Canvas,
    config: CompositorConfig,
}

#[derive(Debug, Default)]
struct TickCounters {
    ticks: u64,
    total_tick_time: Duration,
    uploads: u64,
    upload_failures: u64,
}

struct Shared {
    registry: Mutex<Registry>,
    engine: Mutex<Engine>,
    layout: RwLock<Arc<dyn LayoutStrategy>>,
    sinks: ObserverRegistry<dyn OutputSink>,
    event_tx: broadcast::Sender<CompositorEvent>,
    diagnostics: RwLock<Option<DiagnosticsCallback>>,
    frame_counter: AtomicU64,
    counters: Mutex<TickCounters>,
    /// Composed frames waiting for delivery, queued in frame order
    pending: Mutex<VecDeque<Arc<CompositeOutput>>>,
    /// Set while one thread is delivering `pending` to the sinks
    publishing: AtomicBool,
    epoch: Instant,
}

impl Shared {
    fn emit(&self, event: CompositorEvent) {
        // no subscribers is not an error
        let _ = self.event_tx.send(event);
    }

    fn report_upload_failure(&self, error: MediaError) {
        let (track_id, reason) = match &error {
            MediaError::TextureUploadFailure { track_id, reason } => (track_id.clone(), reason.clone()),
            other => (String::new(), other.to_string()),
        };
        warn!("Skipping track {} this tick: {}", track_id, reason);
        self.counters.lock().upload_failures += 1;
        self.emit(CompositorEvent::TextureUploadFailed { track_id, reason });
        let callback = self.diagnostics.read().clone();
        if let Some(callback) = callback {
            callback(&error);
        }
    }

    fn tick(&self) -> MediaResult<Arc<CompositeOutput>> {
        let started = Instant::now();
        let mut engine = self.engine.lock();

        let snapshot: Vec<Arc<TrackRenderer>> = {
            let mut registry = self.registry.lock();
            registry.ticks_in_flight += 1;
            registry
                .renderers
                .iter()
                .filter(|renderer| renderer.is_enabled())
                .cloned()
                .collect()
        };

        let Engine {
            backend,
            canvas,
            config,
        } = &mut *engine;
        let layout = Arc::clone(&*self.layout.read());
        let canvas_size = canvas.resolution();
        let count = snapshot.len();

        let mut draws = Vec::with_capacity(count);
        let mut uploads = 0u64;
        let mut failures = Vec::new();
        for (index, renderer) in snapshot.iter().enumerate() {
            match renderer.ensure_texture(backend.as_mut()) {
                Ok(TextureStatus::Uploaded) => uploads += 1,
                Ok(_) => {}
                Err(error) => failures.push(error),
            }
            let placement =
                renderer.placement_rect(canvas_size, layout.as_ref(), LayoutSlot::new(index, count));
            if let Some(draw) = renderer.draw_command(placement, config.object_fit) {
                draws.push(draw);
            }
        }

        let tracks_drawn = draws.len();
        let composited = backend.composite(canvas, config.background_color, &draws);
        // texture handles are only borrowed for the pass
        drop(draws);

        let output = composited.map(|()| {
            let frame_number = self.frame_counter.fetch_add(1, Ordering::AcqRel) + 1;
            Arc::new(CompositeOutput {
                width: canvas.width(),
                height: canvas.height(),
                format: PixelFormat::Rgba,
                frame_number,
                timestamp_us: started.duration_since(self.epoch).as_micros() as u64,
                tracks_drawn,
                data: Bytes::copy_from_slice(canvas.pixels()),
            })
        });
        if let Ok(output) = &output {
            // queued under the engine lock, so the queue is in frame order
            self.pending.lock().push_back(Arc::clone(output));
        }
        drop(engine);

        let graveyard = {
            let mut registry = self.registry.lock();
            registry.ticks_in_flight -= 1;
            if registry.ticks_in_flight == 0 {
                std::mem::take(&mut registry.graveyard)
            } else {
                Vec::new()
            }
        };
        for renderer in graveyard {
            renderer.dispose();
        }
        drop(snapshot);

        for error in failures {
            self.report_upload_failure(error);
        }
        let output = output?;
        self.deliver_pending();

        let tick_time = started.elapsed();
        {
            let mut counters = self.counters.lock();
            counters.ticks += 1;
            counters.total_tick_time += tick_time;
            counters.uploads += uploads;
        }
        self.emit(CompositorEvent::FrameComposed {
            frame_number: output.frame_number,
            tracks_drawn,
            tick_time,
        });
        Ok(output)
    }

    /// Hand queued frames to the sinks, oldest first
    ///
    /// One thread delivers at a time. A tick that finds delivery in progress
    /// leaves its frame to that thread, which also covers a sink that ticks
    /// the compositor from inside its callback.
    fn deliver_pending(&self) {
        loop {
            if self.publishing.swap(true, Ordering::AcqRel) {
                return;
            }
            loop {
                let next = self.pending.lock().pop_front();
                let Some(output) = next else {
                    break;
                };
                self.sinks
                    .notify(|sink| sink.on_composed_frame(Arc::clone(&output)));
            }
            self.publishing.store(false, Ordering::Release);
            // a frame queued after the last pop but before the flag cleared
            if self.pending.lock().is_empty() {
                return;
            }
        }
    }

    fn release_textures(&self) {
        let renderers = self.registry.lock().renderers.clone();
        for renderer in &renderers {
            renderer.release_texture();
        }
    }

    fn stats(&self) -> CompositorStats {
        let (frames_received, frames_dropped, tracks) = {
            let registry = self.registry.lock();
            let (received, dropped) = registry.renderers.iter().fold((0, 0), |acc, renderer| {
                let stats = renderer.cache_stats();
                (acc.0 + stats.frames_received, acc.1 + stats.frames_dropped)
            });
            (received, dropped, registry.renderers.len())
        };
        let counters = self.counters.lock();
        let average_tick_time = if counters.ticks > 0 {
            counters.total_tick_time / counters.ticks as u32
        } else {
            Duration::ZERO
        };
        CompositorStats {
            frames_received,
            frames_dropped,
            frames_rendered: self.frame_counter.load(Ordering::Acquire),
            texture_uploads: counters.uploads,
            upload_failures: counters.upload_failures,
            average_tick_time,
            tracks,
        }
    }

    fn log_stats(&self, since: Instant, rendered_before: u64) {
        let stats = self.stats();
        let elapsed = since.elapsed().as_secs_f64();
        let fps = if elapsed > 0.0 {
            (stats.frames_rendered - rendered_before) as f64 / elapsed
        } else {
            0.0
        };
        info!(
            "Compositor: {} tracks, received {}, dropped {}, rendered {} ({:.1} fps), avg tick {:?}",
            stats.tracks,
            stats.frames_received,
            stats.frames_dropped,
            stats.frames_rendered,
            fps,
            stats.average_tick_time
        );
    }
}

async fn run_tick_loop(shared: Arc<Shared>, config: CompositorConfig, mut stop_rx: watch::Receiver<bool>) {
    let mut interval = tokio::time::interval(config.tick_period());
    interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

    let stats_period = config.stats_log_interval.max(Duration::from_millis(100));
    let mut stats_interval =
        tokio::time::interval_at(tokio::time::Instant::now() + stats_period, stats_period);
    stats_interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
    let mut stats_since = Instant::now();
    let mut rendered_before = shared.frame_counter.load(Ordering::Acquire);

    loop {
        tokio::select! {
            biased;
            changed = stop_rx.changed() => {
                if changed.is_err() || *stop_rx.borrow() {
                    break;
                }
            }
            _ = interval.tick() => {
                if let Err(error) = shared.tick() {
                    warn!("Composite pass failed: {}", error);
                    let callback = shared.diagnostics.read().clone();
                    if let Some(callback) = callback {
                        callback(&error);
                    }
                }
            }
            _ = stats_interval.tick() => {
                shared.log_stats(stats_since, rendered_before);
                stats_since = Instant::now();
                rendered_before = shared.frame_counter.load(Ordering::Acquire);
            }
        }
    }
    debug!("Compositor tick loop exited");
}

/// Multi-track compositor
pub struct Compositor {
    shared: Arc<Shared>,
    state: Mutex<CompositorState>,
    task: Mutex<Option<(watch::Sender<bool>, tokio::task::JoinHandle<()>)>>,
}

impl Compositor {
    /// Compositor drawing with the software backend
    pub fn new() -> Self {
        Self::with_backend(Box::new(SoftwareBackend::new()))
    }

    pub fn with_backend(backend: Box<dyn RenderBackend>) -> Self {
        let config = CompositorConfig::default();
        let (event_tx, _) = broadcast::channel(256);
        let layout = config.layout.strategy();
        Self {
            shared: Arc::new(Shared {
                registry: Mutex::new(Registry::default()),
                engine: Mutex::new(Engine {
                    backend,
                    canvas: Canvas::new(config.output),
                    config,
                }),
                layout: RwLock::new(layout),
                sinks: ObserverRegistry::new(),
                event_tx,
                diagnostics: RwLock::new(None),
                frame_counter: AtomicU64::new(0),
                counters: Mutex::new(TickCounters::default()),
                pending: Mutex::new(VecDeque::new()),
                publishing: AtomicBool::new(false),
                epoch: Instant::now(),
            }),
            state: Mutex::new(CompositorState::Idle),
            task: Mutex::new(None),
        }
    }

    /// Begin ticking at `config.target_fps`
    ///
    /// Must be called from within a tokio runtime. Fails with
    /// [`MediaError::AlreadyRunning`] without touching any state when running.
    pub fn start(&self, config: CompositorConfig) -> MediaResult<()> {
        let mut state = self.state.lock();
        match *state {
            CompositorState::Running => return Err(MediaError::AlreadyRunning),
            CompositorState::Stopping => {
                return Err(MediaError::InvalidState {
                    message: "Compositor is stopping".to_string(),
                })
            }
            CompositorState::Idle => {}
        }
        config.validate()?;
        let runtime = tokio::runtime::Handle::try_current().map_err(|_| MediaError::InvalidState {
            message: "Compositor must be started inside a tokio runtime".to_string(),
        })?;

        {
            let mut engine = self.shared.engine.lock();
            if engine.canvas.resolution() != config.output {
                engine.canvas = Canvas::new(config.output);
            }
            engine.config = config.clone();
        }
        *self.shared.layout.write() = config.layout.strategy();

        let (stop_tx, stop_rx) = watch::channel(false);
        let handle = runtime.spawn(run_tick_loop(
            Arc::clone(&self.shared),
            config.clone(),
            stop_rx,
        ));
        *self.task.lock() = Some((stop_tx, handle));
        *state = CompositorState::Running;

        info!(
            "Compositor started: {} fps, {}x{}, {:?}",
            config.target_fps, config.output.width, config.output.height, config.object_fit
        );
        self.shared.emit(CompositorEvent::Started {
            target_fps: config.target_fps,
            output: config.output,
        });
        Ok(())
    }

    /// Stop ticking and release every texture
    ///
    /// Waits for an in-flight tick to finish first. A no-op unless running.
    pub async fn stop(&self) -> MediaResult<()> {
        let task = {
            let mut state = self.state.lock();
            if *state != CompositorState::Running {
                return Ok(());
            }
            *state = CompositorState::Stopping;
            self.task.lock().take()
        };

        if let Some((stop_tx, handle)) = task {
            let _ = stop_tx.send(true);
            if let Err(error) = handle.await {
                warn!("Compositor tick task ended abnormally: {}", error);
            }
        }

        // the loop has exited, so no draw can still reference a texture
        {
            let _serialised_with_ticks = self.shared.engine.lock();
            self.shared.release_textures();
        }

        *self.state.lock() = CompositorState::Idle;
        let frames_composed = self.frame_count();
        info!("Compositor stopped after {} frames", frames_composed);
        self.shared.emit(CompositorEvent::Stopped { frames_composed });
        Ok(())
    }

    pub fn state(&self) -> CompositorState {
        *self.state.lock()
    }

    pub fn is_running(&self) -> bool {
        self.state() == CompositorState::Running
    }

    /// Configuration of the current or most recent run
    pub fn config(&self) -> CompositorConfig {
        self.shared.engine.lock().config.clone()
    }

    /// Register a track, or refresh label and remote flag of an existing one
    ///
    /// Returns true when the track is new. A new track is drawn from the next
    /// tick on.
    pub fn add_track(&self, track: Track) -> bool {
        let mut registry = self.shared.registry.lock();
        if let Some(existing) = registry
            .renderers
            .iter()
            .find(|renderer| renderer.track_id() == track.id)
        {
            existing.update_track(track.remote, track.label);
            drop(registry);
            debug!("Updated track {}", track.id);
            self.shared
                .emit(CompositorEvent::TrackUpdated { track_id: track.id });
            return false;
        }

        let track_id = track.id.clone();
        registry.renderers.push(Arc::new(TrackRenderer::new(track)));
        drop(registry);

        info!("Added track {}", track_id);
        self.shared.emit(CompositorEvent::TrackAdded { track_id });
        true
    }

    /// Convenience wrapper around [`add_track`](Self::add_track)
    pub fn register_track(&self, track_id: &str, remote: bool, label: &str) -> bool {
        self.add_track(Track::new(track_id, remote, label))
    }

    /// Unregister a track; unknown ids are ignored
    ///
    /// If a tick is in flight, the track's resources are released once that
    /// tick completes.
    pub fn remove_track(&self, track_id: &str) -> bool {
        let mut registry = self.shared.registry.lock();
        let Some(position) = registry
            .renderers
            .iter()
            .position(|renderer| renderer.track_id() == track_id)
        else {
            debug!("Ignoring removal of unknown track {}", track_id);
            return false;
        };

        let renderer = registry.renderers.remove(position);
        if registry.ticks_in_flight > 0 {
            registry.graveyard.push(renderer);
            drop(registry);
        } else {
            drop(registry);
            renderer.dispose();
        }

        info!("Removed track {}", track_id);
        self.shared.emit(CompositorEvent::TrackRemoved {
            track_id: track_id.to_string(),
        });
        true
    }

    pub fn unregister_track(&self, track_id: &str) -> bool {
        self.remove_track(track_id)
    }

    /// Renderer of a registered track
    pub fn renderer(&self, track_id: &str) -> Option<Arc<TrackRenderer>> {
        self.shared
            .registry
            .lock()
            .renderers
            .iter()
            .find(|renderer| renderer.track_id() == track_id)
            .cloned()
    }

    fn require_renderer(&self, track_id: &str) -> MediaResult<Arc<TrackRenderer>> {
        self.renderer(track_id).ok_or_else(|| MediaError::UnknownTrack {
            track_id: track_id.to_string(),
        })
    }

    pub fn has_track(&self, track_id: &str) -> bool {
        self.renderer(track_id).is_some()
    }

    /// Registered tracks in draw order
    pub fn tracks(&self) -> Vec<Track> {
        self.shared
            .registry
            .lock()
            .renderers
            .iter()
            .map(|renderer| renderer.track())
            .collect()
    }

    pub fn track_count(&self) -> usize {
        self.shared.registry.lock().renderers.len()
    }

    /// Hand a new frame to a track; returns the frame's version
    ///
    /// Safe from any thread; never waits for a tick.
    pub fn push_frame(&self, track_id: &str, frame: impl Into<Arc<VideoFrame>>) -> MediaResult<u64> {
        let renderer = self.require_renderer(track_id)?;
        Ok(renderer.push(frame))
    }

    pub fn set_track_enabled(&self, track_id: &str, enabled: bool) -> MediaResult<()> {
        self.require_renderer(track_id)?.set_enabled(enabled);
        Ok(())
    }

    pub fn set_front_facing(&self, track_id: &str, front_facing: bool) -> MediaResult<()> {
        self.require_renderer(track_id)?.set_front_facing(front_facing);
        Ok(())
    }

    pub fn set_mirror(&self, track_id: &str, mirror: bool) -> MediaResult<()> {
        self.require_renderer(track_id)?.set_mirror(mirror);
        Ok(())
    }

    pub fn set_object_fit(&self, track_id: &str, object_fit: Option<ObjectFit>) -> MediaResult<()> {
        self.require_renderer(track_id)?.set_object_fit(object_fit);
        Ok(())
    }

    pub fn set_crop(&self, track_id: &str, crop: CropRect) -> MediaResult<()> {
        self.require_renderer(track_id)?.set_crop(crop);
        Ok(())
    }

    /// Replace the layout strategy; takes effect on the next tick
    pub fn set_layout(&self, layout: Arc<dyn LayoutStrategy>) {
        debug!("Layout set to {}", layout.name());
        *self.shared.layout.write() = layout;
    }

    pub fn add_sink(&self, sink: Arc<dyn OutputSink>) -> ObserverHandle {
        self.shared.sinks.register(sink)
    }

    pub fn remove_sink(&self, handle: ObserverHandle) -> bool {
        self.shared.sinks.unregister(handle)
    }

    /// Install a callback for texture upload failures and failed passes
    pub fn set_diagnostics_callback(&self, callback: Option<DiagnosticsCallback>) {
        *self.shared.diagnostics.write() = callback;
    }

    /// Subscribe to compositor events
    pub fn subscribe(&self) -> broadcast::Receiver<CompositorEvent> {
        self.shared.event_tx.subscribe()
    }

    /// Composite frames produced so far
    pub fn frame_count(&self) -> u64 {
        self.shared.frame_counter.load(Ordering::Acquire)
    }

    pub fn stats(&self) -> CompositorStats {
        self.shared.stats()
    }

    /// Textures currently alive in the render backend
    pub fn live_textures(&self) -> usize {
        self.shared.engine.lock().backend.live_textures()
    }

    pub fn backend_name(&self) -> &'static str {
        self.shared.engine.lock().backend.name()
    }

    /// Run one tick on the caller's thread
    ///
    /// Used for offline rendering and deterministic tests; it serialises with
    /// the clock-driven loop. On an idle compositor the textures it uploads
    /// stay alive until [`release_textures`](Self::release_textures), the next
    /// `stop` after a run, or drop.
    pub fn tick_now(&self) -> MediaResult<Arc<CompositeOutput>> {
        self.shared.tick()
    }

    /// Release every track texture of an idle compositor
    ///
    /// Tracks and their cached frames stay; the next tick uploads again.
    /// Fails with [`MediaError::InvalidState`] unless idle.
    pub fn release_textures(&self) -> MediaResult<()> {
        let state = self.state.lock();
        if *state != CompositorState::Idle {
            return Err(MediaError::InvalidState {
                message: format!("Cannot release textures while {:?}", *state),
            });
        }
        let _serialised_with_ticks = self.shared.engine.lock();
        self.shared.release_textures();
        debug!("Released textures of idle compositor");
        Ok(())
    }
}

impl Default for Compositor {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for Compositor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Compositor")
            .field("state", &self.state())
            .field("tracks", &self.track_count())
            .field("frames", &self.frame_count())
            .finish()
    }
}

impl Drop for Compositor {
    fn drop(&mut self) {
        if let Some((stop_tx, handle)) = self.task.lock().take() {
            let _ = stop_tx.send(true);
            handle.abort();
        }
    }
}

impl VideoSink for Compositor {
    fn on_frame(&self, track_id: &str, frame: Arc<VideoFrame>) {
        if self.push_frame(track_id, frame).is_err() {
            debug!("Dropping frame for unregistered track {}", track_id);
        }
    }
}

impl CameraSwitchObserver for Compositor {
    fn did_switch_camera(&self, track_id: &str, front_facing: bool) {
        if let Some(renderer) = self.renderer(track_id) {
            renderer.set_front_facing(front_facing);
            debug!("Track {} now front facing: {}", track_id, front_facing);
        }
    }

    fn did_fail_switch(&self, track_id: &str, error: &MediaError) {
        warn!("Camera switch failed for track {}: {}", track_id, error);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_validation() {
        assert!(CompositorConfig::default().validate().is_ok());
        let zero_fps = CompositorConfig {
            target_fps: 0,
            ..Default::default()
        };
        assert!(zero_fps.validate().is_err());
        let too_fast = CompositorConfig {
            target_fps: 240,
            ..Default::default()
        };
        assert!(too_fast.validate().is_err());
        let empty = CompositorConfig {
            output: VideoResolution::new(0, 480),
            ..Default::default()
        };
        assert!(matches!(
            empty.validate(),
            Err(MediaError::InvalidConfiguration { .. })
        ));
    }

    #[test]
    fn test_add_track_is_idempotent() {
        let compositor = Compositor::new();
        assert!(compositor.add_track(Track::remote("a", "Alice")));
        assert!(!compositor.add_track(Track::local("a", "Alice (local)")));
        assert_eq!(compositor.track_count(), 1);

        let track = &compositor.tracks()[0];
        assert!(!track.remote);
        assert_eq!(track.label, "Alice (local)");
    }

    #[test]
    fn test_remove_unknown_track_is_noop() {
        let compositor = Compositor::new();
        assert!(!compositor.remove_track("ghost"));
        compositor.add_track(Track::local("cam", "Camera"));
        assert!(compositor.remove_track("cam"));
        assert!(!compositor.remove_track("cam"));
    }

    #[test]
    fn test_push_to_unknown_track() {
        let compositor = Compositor::new();
        let result = compositor.push_frame("ghost", VideoFrame::solid(2, 2, [0, 0, 0, 255]));
        assert!(matches!(result, Err(MediaError::UnknownTrack { .. })));
    }

    #[test]
    fn test_start_requires_runtime() {
        let compositor = Compositor::new();
        assert!(matches!(
            compositor.start(CompositorConfig::default()),
            Err(MediaError::InvalidState { .. })
        ));
        assert_eq!(compositor.state(), CompositorState::Idle);
    }

    #[test]
    fn test_tick_now_fills_background() {
        let compositor = Compositor::new();
        let output = compositor.tick_now().unwrap();
        assert_eq!(output.resolution(), VideoResolution::VGA);
        assert_eq!(output.frame_number, 1);
        assert!(output.is_filled_with([0, 0, 0, 255]));
    }

    #[test]
    fn test_removal_during_tick_is_deferred() {
        let compositor = Compositor::new();
        compositor.add_track(Track::local("cam", "Camera"));
        let renderer = compositor.renderer("cam").unwrap();

        compositor.shared.registry.lock().ticks_in_flight += 1;
        compositor.remove_track("cam");
        assert!(!renderer.is_disposed());
        assert_eq!(compositor.shared.registry.lock().graveyard.len(), 1);

        compositor.shared.registry.lock().ticks_in_flight -= 1;
        compositor.tick_now().unwrap();
        assert!(renderer.is_disposed());
        assert!(compositor.shared.registry.lock().graveyard.is_empty());
    }
}
