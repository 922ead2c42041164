//! Render profiling driven by compositor events

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use vidmix_media::{CompositorEvent, MediaError, MediaResult};

/// Accumulated render statistics
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RenderProfile {
    /// Composite frames observed
    pub frames_composed: u64,
    /// Sum of tracks drawn over every observed frame
    pub tracks_drawn: u64,
    /// Shortest tick
    pub min_tick_time: Option<Duration>,
    /// Longest tick
    pub max_tick_time: Option<Duration>,
    /// Mean tick
    pub average_tick_time: Duration,
    /// Failed uploads per track
    pub upload_failures: BTreeMap<String, u64>,
    /// Tracks registered while profiling
    pub tracks_added: u64,
    /// Tracks removed while profiling
    pub tracks_removed: u64,
    /// Events lost because the profiler fell behind
    pub events_lagged: u64,
    /// Frame number of the last observed frame
    pub last_frame_number: Option<u64>,
}

impl RenderProfile {
    fn record(&mut self, event: CompositorEvent, total_tick_time: &mut Duration) {
        match event {
            CompositorEvent::FrameComposed {
                frame_number,
                tracks_drawn,
                tick_time,
            } => {
                self.frames_composed += 1;
                self.tracks_drawn += tracks_drawn as u64;
                self.min_tick_time = Some(self.min_tick_time.map_or(tick_time, |t| t.min(tick_time)));
                self.max_tick_time = Some(self.max_tick_time.map_or(tick_time, |t| t.max(tick_time)));
                *total_tick_time += tick_time;
                self.average_tick_time = *total_tick_time / self.frames_composed as u32;
                self.last_frame_number = Some(frame_number);
            }
            CompositorEvent::TextureUploadFailed { track_id, .. } => {
                *self.upload_failures.entry(track_id).or_default() += 1;
            }
            CompositorEvent::TrackAdded { .. } => self.tracks_added += 1,
            CompositorEvent::TrackRemoved { .. } => self.tracks_removed += 1,
            CompositorEvent::Started { .. }
            | CompositorEvent::Stopped { .. }
            | CompositorEvent::TrackUpdated { .. } => {}
        }
    }

    /// Mean number of tracks per composed frame
    pub fn average_tracks_drawn(&self) -> f64 {
        if self.frames_composed == 0 {
            0.0
        } else {
            self.tracks_drawn as f64 / self.frames_composed as f64
        }
    }

    /// Total failed uploads across all tracks
    pub fn total_upload_failures(&self) -> u64 {
        self.upload_failures.values().sum()
    }
}

#[derive(Debug, Default)]
struct ProfileState {
    profile: RenderProfile,
    total_tick_time: Duration,
}

/// Render profiler for monitoring a compositor
#[derive(Debug, Default)]
pub struct RenderProfiler {
    state: Arc<Mutex<ProfileState>>,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl RenderProfiler {
    /// Create new render profiler
    pub fn new() -> Self {
        Self::default()
    }

    /// Start profiling the events of one compositor
    ///
    /// Must be called from within a tokio runtime.
    pub fn start_profiling(&self, mut events: broadcast::Receiver<CompositorEvent>) -> MediaResult<()> {
        let mut task = self.task.lock();
        if task.as_ref().is_some_and(|handle| !handle.is_finished()) {
            return Err(MediaError::AlreadyRunning);
        }
        let runtime = tokio::runtime::Handle::try_current().map_err(|_| MediaError::InvalidState {
            message: "Render profiler requires a tokio runtime".to_string(),
        })?;

        let state = Arc::clone(&self.state);
        *task = Some(runtime.spawn(async move {
            loop {
                match events.recv().await {
                    Ok(event) => {
                        let mut state = state.lock();
                        let ProfileState {
                            profile,
                            total_tick_time,
                        } = &mut *state;
                        profile.record(event, total_tick_time);
                    }
                    Err(broadcast::error::RecvError::Lagged(missed)) => {
                        warn!("Render profiler lagged, {} events lost", missed);
                        state.lock().profile.events_lagged += missed;
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
            debug!("Render profiler event stream closed");
        }));
        info!("Starting render profiling");
        Ok(())
    }

    /// Stop profiling, keeping the statistics gathered so far
    pub async fn stop_profiling(&self) {
        let task = self.task.lock().take();
        if let Some(task) = task {
            task.abort();
            let _ = task.await;
            info!("Stopping render profiling");
        }
    }

    /// Whether the event task is alive
    pub fn is_profiling(&self) -> bool {
        self.task
            .lock()
            .as_ref()
            .is_some_and(|handle| !handle.is_finished())
    }

    /// Copy of the current statistics
    pub fn profile(&self) -> RenderProfile {
        self.state.lock().profile.clone()
    }

    /// Clear the statistics
    pub fn reset(&self) {
        *self.state.lock() = ProfileState::default();
    }
}

impl Drop for RenderProfiler {
    fn drop(&mut self) {
        if let Some(task) = self.task.get_mut().take() {
            task.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn composed(frame_number: u64, millis: u64) -> CompositorEvent {
        CompositorEvent::FrameComposed {
            frame_number,
            tracks_drawn: 2,
            tick_time: Duration::from_millis(millis),
        }
    }

    #[test]
    fn test_record_tick_times() {
        let mut profile = RenderProfile::default();
        let mut total = Duration::ZERO;
        for (n, ms) in [(1, 4), (2, 2), (3, 6)] {
            profile.record(composed(n, ms), &mut total);
        }
        assert_eq!(profile.frames_composed, 3);
        assert_eq!(profile.min_tick_time, Some(Duration::from_millis(2)));
        assert_eq!(profile.max_tick_time, Some(Duration::from_millis(6)));
        assert_eq!(profile.average_tick_time, Duration::from_millis(4));
        assert_eq!(profile.average_tracks_drawn(), 2.0);
        assert_eq!(profile.last_frame_number, Some(3));
    }

    #[test]
    fn test_record_failures_per_track() {
        let mut profile = RenderProfile::default();
        let mut total = Duration::ZERO;
        for track_id in ["a", "b", "a"] {
            profile.record(
                CompositorEvent::TextureUploadFailed {
                    track_id: track_id.to_string(),
                    reason: "oom".to_string(),
                },
                &mut total,
            );
        }
        assert_eq!(profile.upload_failures.get("a"), Some(&2));
        assert_eq!(profile.total_upload_failures(), 3);
    }

    #[tokio::test]
    async fn test_profiler_follows_channel() {
        let (tx, rx) = broadcast::channel(16);
        let profiler = RenderProfiler::new();
        profiler.start_profiling(rx).unwrap();
        assert!(matches!(
            profiler.start_profiling(tx.subscribe()),
            Err(MediaError::AlreadyRunning)
        ));

        tx.send(CompositorEvent::TrackAdded {
            track_id: "a".to_string(),
        })
        .unwrap();
        tx.send(composed(1, 3)).unwrap();
        drop(tx);

        // closing the channel ends the task
        for _ in 0..100 {
            if !profiler.is_profiling() {
                break;
            }
            tokio::task::yield_now().await;
        }
        assert!(!profiler.is_profiling());
        let profile = profiler.profile();
        assert_eq!(profile.tracks_added, 1);
        assert_eq!(profile.frames_composed, 1);

        profiler.reset();
        assert_eq!(profiler.profile(), RenderProfile::default());
        profiler.stop_profiling().await;
    }
}
