//! Session-scoped registry of mixers, views and tracks
//!
//! A [`MediaSession`] owns everything one call or recording needs: the
//! compositors ("mixers"), single-track views, the set of known tracks, the
//! camera-switch observers and a samples interceptor for recording taps.
//! Sessions are independent of each other; nothing is process-global.

use crate::config::GlobalConfig;
use crate::error::{VidMixError, VidMixResult};
use dashmap::DashMap;
use futures::future::join_all;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::runtime::Handle;
use tracing::{debug, info, warn};
use vidmix_media::{
    CameraSwitchObserver, Compositor, CompositorConfig, MediaError, ObserverHandle, ObserverRegistry,
    SamplesInterceptor, Track, VideoFrame, VideoResolution, VideoViewRenderer, ViewConfig,
};

/// Id of the composite track published by a session's interceptor
pub const COMPOSITE_TRACK_ID: &str = "composite";

struct MixerEntry {
    compositor: Arc<Compositor>,
    observer: ObserverHandle,
}

struct ViewEntry {
    view: Arc<VideoViewRenderer>,
    observer: ObserverHandle,
}

/// Explicit registry for one media session
pub struct MediaSession {
    runtime: Handle,
    config: GlobalConfig,
    mixers: DashMap<String, MixerEntry>,
    views: DashMap<u64, ViewEntry>,
    tracks: DashMap<String, Track>,
    next_view_id: AtomicU64,
    interceptor: Arc<SamplesInterceptor>,
    camera_observers: Arc<ObserverRegistry<dyn CameraSwitchObserver>>,
}

impl MediaSession {
    /// Session on the current tokio runtime
    pub fn new(config: GlobalConfig) -> VidMixResult<Self> {
        let runtime = Handle::try_current().map_err(|_| VidMixError::Initialization {
            reason: "MediaSession must be created inside a tokio runtime".to_string(),
        })?;
        Self::with_runtime(config, runtime)
    }

    /// Session whose mixers tick on the given runtime
    pub fn with_runtime(config: GlobalConfig, runtime: Handle) -> VidMixResult<Self> {
        config.validate()?;
        Ok(Self {
            runtime,
            config,
            mixers: DashMap::new(),
            views: DashMap::new(),
            tracks: DashMap::new(),
            next_view_id: AtomicU64::new(1),
            interceptor: Arc::new(SamplesInterceptor::new(COMPOSITE_TRACK_ID)),
            camera_observers: Arc::new(ObserverRegistry::new()),
        })
    }

    /// Configuration the session was created with
    pub fn config(&self) -> &GlobalConfig {
        &self.config
    }

    // ------------------------------------------------------------------
    // mixers
    // ------------------------------------------------------------------

    /// Create and start a mixer holding every track known to the session
    pub fn create_mixer(&self, id: &str, config: CompositorConfig) -> VidMixResult<Arc<Compositor>> {
        config.validate()?;
        if self.mixers.len() >= self.config.max_mixers {
            return Err(VidMixError::ResourceLimit {
                resource: format!("mixers (max {})", self.config.max_mixers),
            });
        }

        let entry = match self.mixers.entry(id.to_string()) {
            dashmap::mapref::entry::Entry::Occupied(_) => {
                return Err(VidMixError::AlreadyExists {
                    kind: "mixer",
                    id: id.to_string(),
                })
            }
            dashmap::mapref::entry::Entry::Vacant(entry) => entry,
        };

        let compositor = Arc::new(Compositor::new());
        for track in self.tracks.iter() {
            compositor.add_track(track.value().clone());
        }
        {
            let _runtime = self.runtime.enter();
            compositor.start(config)?;
        }
        let observer = self
            .camera_observers
            .register(Arc::clone(&compositor) as Arc<dyn CameraSwitchObserver>);
        entry.insert(MixerEntry {
            compositor: Arc::clone(&compositor),
            observer,
        });

        info!("Created mixer {}", id);
        Ok(compositor)
    }

    /// Create a mixer with [`GlobalConfig::default_mixer`]
    pub fn create_default_mixer(&self, id: &str) -> VidMixResult<Arc<Compositor>> {
        self.create_mixer(id, self.config.default_mixer.clone())
    }

    /// Stop a mixer and drop it from the session
    ///
    /// Waits for the mixer's in-flight tick to drain.
    pub async fn stop_mixer(&self, id: &str) -> VidMixResult<()> {
        let (_, entry) = self.mixers.remove(id).ok_or_else(|| VidMixError::NotFound {
            kind: "mixer",
            id: id.to_string(),
        })?;
        self.camera_observers.unregister(entry.observer);
        entry.compositor.stop().await?;
        info!("Stopped mixer {}", id);
        Ok(())
    }

    /// Running mixer by id
    pub fn mixer(&self, id: &str) -> Option<Arc<Compositor>> {
        self.mixers
            .get(id)
            .map(|entry| Arc::clone(&entry.compositor))
    }

    /// Ids of every mixer in the session
    pub fn mixer_ids(&self) -> Vec<String> {
        self.mixers.iter().map(|entry| entry.key().clone()).collect()
    }

    // ------------------------------------------------------------------
    // views
    // ------------------------------------------------------------------

    /// Create a display-sized view of one registered track
    pub fn create_view(&self, track_id: &str, display: VideoResolution) -> VidMixResult<u64> {
        let track = self
            .tracks
            .get(track_id)
            .map(|track| track.value().clone())
            .ok_or_else(|| VidMixError::NotFound {
                kind: "track",
                id: track_id.to_string(),
            })?;

        let view = Arc::new(VideoViewRenderer::new(
            track,
            ViewConfig {
                display,
                ..Default::default()
            },
        )?);
        let observer = self
            .camera_observers
            .register(Arc::clone(&view) as Arc<dyn CameraSwitchObserver>);
        let id = self.next_view_id.fetch_add(1, Ordering::Relaxed);
        self.views.insert(id, ViewEntry { view, observer });

        debug!("Created view {} for track {}", id, track_id);
        Ok(id)
    }

    /// View by id
    pub fn view(&self, id: u64) -> Option<Arc<VideoViewRenderer>> {
        self.views.get(&id).map(|entry| Arc::clone(&entry.view))
    }

    /// Release a view's texture and frames; unknown ids are ignored
    pub fn dispose_view(&self, id: u64) -> bool {
        match self.views.remove(&id) {
            Some((_, entry)) => {
                self.camera_observers.unregister(entry.observer);
                entry.view.dispose();
                debug!("Disposed view {}", id);
                true
            }
            None => false,
        }
    }

    /// Number of live views
    pub fn view_count(&self) -> usize {
        self.views.len()
    }

    // ------------------------------------------------------------------
    // tracks
    // ------------------------------------------------------------------

    /// Register a track with the session and every mixer
    pub fn register_track(&self, track_id: &str, remote: bool, label: &str) {
        let track = Track::new(track_id, remote, label);
        self.tracks.insert(track_id.to_string(), track.clone());
        for entry in self.mixers.iter() {
            entry.compositor.add_track(track.clone());
        }
    }

    /// Remove a track from the session and every mixer; unknown ids are ignored
    pub fn unregister_track(&self, track_id: &str) -> bool {
        let known = self.tracks.remove(track_id).is_some();
        for entry in self.mixers.iter() {
            entry.compositor.remove_track(track_id);
        }
        known
    }

    /// Tracks known to the session
    pub fn tracks(&self) -> Vec<Track> {
        self.tracks.iter().map(|track| track.value().clone()).collect()
    }

    /// Route a frame to every mixer and view of the track and to the interceptor
    ///
    /// Returns how many mixers and views received it.
    pub fn push_frame(&self, track_id: &str, frame: impl Into<Arc<VideoFrame>>) -> VidMixResult<usize> {
        if !self.tracks.contains_key(track_id) {
            return Err(VidMixError::NotFound {
                kind: "track",
                id: track_id.to_string(),
            });
        }
        let frame = frame.into();
        let mut delivered = 0;

        for entry in self.mixers.iter() {
            match entry.compositor.push_frame(track_id, Arc::clone(&frame)) {
                Ok(_) => delivered += 1,
                Err(MediaError::UnknownTrack { .. }) => {}
                Err(error) => warn!("Mixer {} rejected frame: {}", entry.key(), error),
            }
        }
        for entry in self.views.iter() {
            if entry.view.track_id() == track_id {
                entry.view.push_frame(Arc::clone(&frame));
                delivered += 1;
            }
        }
        self.interceptor.intercept_video(track_id, &frame);
        Ok(delivered)
    }

    /// Recording tap for raw samples
    pub fn interceptor(&self) -> &Arc<SamplesInterceptor> {
        &self.interceptor
    }

    // ------------------------------------------------------------------
    // camera switching
    // ------------------------------------------------------------------

    /// Observers told about camera switches; mixers and views join automatically
    pub fn camera_observers(&self) -> &Arc<ObserverRegistry<dyn CameraSwitchObserver>> {
        &self.camera_observers
    }

    /// Tell observers a camera switch is about to happen
    pub fn notify_will_switch(&self, track_id: &str, to_front_facing: bool) -> usize {
        self.camera_observers
            .notify(|observer| observer.will_switch_camera(track_id, to_front_facing))
    }

    /// Tell observers a camera switch completed; returns the number notified
    pub fn notify_did_switch(&self, track_id: &str, front_facing: bool) -> usize {
        debug!("Camera of track {} switched, front facing: {}", track_id, front_facing);
        self.camera_observers
            .notify(|observer| observer.did_switch_camera(track_id, front_facing))
    }

    /// Tell observers a camera switch failed
    pub fn notify_did_fail_switch(&self, track_id: &str, error: &MediaError) -> usize {
        warn!("Camera switch failed for track {}: {}", track_id, error);
        self.interceptor.report_video_failure(track_id, error);
        self.camera_observers
            .notify(|observer| observer.did_fail_switch(track_id, error))
    }

    // ------------------------------------------------------------------
    // teardown
    // ------------------------------------------------------------------

    /// Stop every mixer and dispose every view
    pub async fn shutdown(&self) -> VidMixResult<()> {
        let mixer_ids = self.mixer_ids();
        let results = join_all(mixer_ids.iter().map(|id| self.stop_mixer(id))).await;
        let mut first_error = None;
        for (id, result) in mixer_ids.iter().zip(results) {
            if let Err(error) = result {
                warn!("Failed to stop mixer {}: {}", id, error);
                first_error.get_or_insert(error);
            }
        }

        let view_ids: Vec<u64> = self.views.iter().map(|entry| *entry.key()).collect();
        for id in view_ids {
            self.dispose_view(id);
        }
        info!("Media session shut down");
        first_error.map_or(Ok(()), Err)
    }
}

impl std::fmt::Debug for MediaSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MediaSession")
            .field("mixers", &self.mixer_ids())
            .field("views", &self.views.len())
            .field("tracks", &self.tracks.len())
            .finish()
    }
}

impl Drop for MediaSession {
    fn drop(&mut self) {
        for entry in self.views.iter() {
            entry.view.dispose();
        }
    }
}
