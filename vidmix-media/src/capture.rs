//! Capturer interface and frame sinks
//!
//! Device management lives outside this crate. What the pipeline needs from a
//! capturer is a small capability set behind one trait; concrete capturer
//! variants are a closed [`CapturerKind`] rather than a type hierarchy.

use crate::error::{MediaError, MediaResult};
use crate::observer::{ObserverHandle, ObserverRegistry};
use crate::tracks::{PixelFormat, VideoFrame, VideoResolution, VideoRotation};
use async_trait::async_trait;
use bytes::Bytes;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

/// Consumer of raw frames for a track
///
/// Called from producer threads at any rate; implementations must not block.
pub trait VideoSink: Send + Sync {
    fn on_frame(&self, track_id: &str, frame: Arc<VideoFrame>);
}

/// Notified synchronously around a camera switch
pub trait CameraSwitchObserver: Send + Sync {
    fn will_switch_camera(&self, _track_id: &str, _to_front_facing: bool) {}

    fn did_switch_camera(&self, track_id: &str, front_facing: bool);

    fn did_fail_switch(&self, _track_id: &str, _error: &MediaError) {}
}

/// Closed set of capturer variants
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CapturerKind {
    Camera,
    Screen,
    File,
}

/// Operations a capturer may support
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CapturerCapability {
    Start,
    Stop,
    SwitchCamera,
    Restart,
}

impl CapturerKind {
    pub fn capabilities(&self) -> &'static [CapturerCapability] {
        match self {
            CapturerKind::Camera => &[
                CapturerCapability::Start,
                CapturerCapability::Stop,
                CapturerCapability::SwitchCamera,
                CapturerCapability::Restart,
            ],
            CapturerKind::Screen => &[
                CapturerCapability::Start,
                CapturerCapability::Stop,
                CapturerCapability::Restart,
            ],
            CapturerKind::File => &[CapturerCapability::Start, CapturerCapability::Stop],
        }
    }
}

/// A source of video frames for one track
#[async_trait]
pub trait VideoCapturer: Send + Sync {
    fn kind(&self) -> CapturerKind;

    fn track_id(&self) -> &str;

    fn supports(&self, capability: CapturerCapability) -> bool {
        self.kind().capabilities().contains(&capability)
    }

    fn is_front_facing(&self) -> bool;

    fn is_running(&self) -> bool;

    async fn start(&mut self) -> MediaResult<()>;

    async fn stop(&mut self) -> MediaResult<()>;

    /// Toggle between front and back camera, returning the new facing
    async fn switch_camera(&mut self) -> MediaResult<bool> {
        Err(MediaError::InvalidState {
            message: format!("{:?} capturer cannot switch camera", self.kind()),
        })
    }

    async fn restart(&mut self) -> MediaResult<()> {
        if !self.supports(CapturerCapability::Restart) {
            return Err(MediaError::InvalidState {
                message: format!("{:?} capturer cannot restart", self.kind()),
            });
        }
        self.stop().await?;
        self.start().await
    }
}

/// Synthetic capturer configuration
#[derive(Debug, Clone)]
pub struct TestPatternConfig {
    pub resolution: VideoResolution,
    pub fps: u32,
    pub rotation: VideoRotation,
    pub front_facing: bool,
    pub kind: CapturerKind,
}

impl Default for TestPatternConfig {
    fn default() -> Self {
        Self {
            resolution: VideoResolution::VGA,
            fps: 30,
            rotation: VideoRotation::Deg0,
            front_facing: false,
            kind: CapturerKind::Camera,
        }
    }
}

impl TestPatternConfig {
    pub fn validate(&self) -> MediaResult<()> {
        if self.resolution.is_empty() {
            return Err(MediaError::InvalidConfiguration {
                message: "Resolution cannot be zero".to_string(),
            });
        }
        if self.fps == 0 || self.fps > 120 {
            return Err(MediaError::InvalidConfiguration {
                message: format!("Frame rate {} outside 1..=120", self.fps),
            });
        }
        Ok(())
    }
}

/// Capturer producing colour bars on a timer
///
/// Front and back cameras produce different bar orders so a switch is visible
/// in the output.
pub struct TestPatternCapturer {
    track_id: String,
    config: TestPatternConfig,
    sink: Arc<dyn VideoSink>,
    observers: Arc<ObserverRegistry<dyn CameraSwitchObserver>>,
    front_facing: Arc<AtomicBool>,
    frames_produced: Arc<AtomicU64>,
    task: Option<tokio::task::JoinHandle<()>>,
}

impl TestPatternCapturer {
    pub fn new(
        track_id: impl Into<String>,
        config: TestPatternConfig,
        sink: Arc<dyn VideoSink>,
    ) -> MediaResult<Self> {
        config.validate()?;
        Ok(Self {
            track_id: track_id.into(),
            front_facing: Arc::new(AtomicBool::new(config.front_facing)),
            config,
            sink,
            observers: Arc::new(ObserverRegistry::new()),
            frames_produced: Arc::new(AtomicU64::new(0)),
            task: None,
        })
    }

    /// Share an existing observer registry
    pub fn with_observers(mut self, observers: Arc<ObserverRegistry<dyn CameraSwitchObserver>>) -> Self {
        self.observers = observers;
        self
    }

    pub fn add_observer(&self, observer: Arc<dyn CameraSwitchObserver>) -> ObserverHandle {
        self.observers.register(observer)
    }

    pub fn remove_observer(&self, handle: ObserverHandle) -> bool {
        self.observers.unregister(handle)
    }

    pub fn frames_produced(&self) -> u64 {
        self.frames_produced.load(Ordering::Relaxed)
    }

    /// One pattern frame for the given facing
    pub fn pattern_frame(resolution: VideoResolution, front_facing: bool) -> Bytes {
        const BARS: [[u8; 4]; 8] = [
            [235, 235, 235, 255],
            [235, 235, 16, 255],
            [16, 235, 235, 255],
            [16, 235, 16, 255],
            [235, 16, 235, 255],
            [235, 16, 16, 255],
            [16, 16, 235, 255],
            [16, 16, 16, 255],
        ];
        let (w, h) = (resolution.width as usize, resolution.height as usize);
        let mut row = Vec::with_capacity(w * 4);
        for x in 0..w {
            let mut bar = x * BARS.len() / w.max(1);
            if front_facing {
                bar = BARS.len() - 1 - bar;
            }
            row.extend_from_slice(&BARS[bar]);
        }
        let mut data = Vec::with_capacity(w * h * 4);
        for _ in 0..h {
            data.extend_from_slice(&row);
        }
        Bytes::from(data)
    }
}

#[async_trait]
impl VideoCapturer for TestPatternCapturer {
    fn kind(&self) -> CapturerKind {
        self.config.kind
    }

    fn track_id(&self) -> &str {
        &self.track_id
    }

    fn is_front_facing(&self) -> bool {
        self.front_facing.load(Ordering::Acquire)
    }

    fn is_running(&self) -> bool {
        self.task.as_ref().is_some_and(|task| !task.is_finished())
    }

    async fn start(&mut self) -> MediaResult<()> {
        if self.is_running() {
            return Ok(());
        }

        let track_id = self.track_id.clone();
        let config = self.config.clone();
        let sink = Arc::clone(&self.sink);
        let front_facing = Arc::clone(&self.front_facing);
        let frames_produced = Arc::clone(&self.frames_produced);

        let task = tokio::spawn(async move {
            let period = Duration::from_secs_f64(1.0 / config.fps as f64);
            let mut interval = tokio::time::interval(period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

            let mut facing = front_facing.load(Ordering::Acquire);
            let mut pattern = Self::pattern_frame(config.resolution, facing);
            let mut timestamp_us = 0u64;

            loop {
                interval.tick().await;

                let current = front_facing.load(Ordering::Acquire);
                if current != facing {
                    facing = current;
                    pattern = Self::pattern_frame(config.resolution, facing);
                }

                let frame = VideoFrame::new(
                    config.resolution.width,
                    config.resolution.height,
                    PixelFormat::Rgba,
                    pattern.clone(),
                )
                .with_rotation(config.rotation)
                .with_timestamp(timestamp_us);
                sink.on_frame(&track_id, Arc::new(frame));

                frames_produced.fetch_add(1, Ordering::Relaxed);
                timestamp_us += period.as_micros() as u64;
            }
        });

        self.task = Some(task);
        info!(
            "Test pattern capturer started for track {} ({}x{} @ {} fps)",
            self.track_id, self.config.resolution.width, self.config.resolution.height, self.config.fps
        );
        Ok(())
    }

    async fn stop(&mut self) -> MediaResult<()> {
        if let Some(task) = self.task.take() {
            task.abort();
            info!("Test pattern capturer stopped for track {}", self.track_id);
        }
        Ok(())
    }

    async fn switch_camera(&mut self) -> MediaResult<bool> {
        if !self.supports(CapturerCapability::SwitchCamera) {
            let error = MediaError::InvalidState {
                message: format!("{:?} capturer cannot switch camera", self.kind()),
            };
            warn!("Camera switch failed for track {}: {}", self.track_id, error);
            self.observers
                .notify(|observer| observer.did_fail_switch(&self.track_id, &error));
            return Err(error);
        }

        let target = !self.is_front_facing();
        self.observers
            .notify(|observer| observer.will_switch_camera(&self.track_id, target));
        self.front_facing.store(target, Ordering::Release);
        let notified = self
            .observers
            .notify(|observer| observer.did_switch_camera(&self.track_id, target));
        debug!(
            "Track {} switched to {} camera ({} observers)",
            self.track_id,
            if target { "front" } else { "back" },
            notified
        );
        Ok(target)
    }
}

impl Drop for TestPatternCapturer {
    fn drop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}
