//! Compositor state analysis and reports

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use vidmix_media::{
    CacheStats, Compositor, CompositorConfig, CompositorState, CompositorStats, MediaError, MediaResult,
    ObjectFit, Rect, RotationMode,
};

/// Overall verdict for a mixer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MixerHealth {
    /// Running and every enabled track is drawable
    Healthy,
    /// Running, but at least one enabled track is not being drawn
    Degraded,
    /// Not running
    Idle,
}

/// Per-track part of a report
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrackReport {
    /// Track ID
    pub track_id: String,
    /// Display label
    pub label: String,
    /// Whether the track arrives from a remote peer
    pub remote: bool,
    /// Whether the track takes part in compositing
    pub enabled: bool,
    /// Whether the last tick drew the track
    pub drawable: bool,
    /// Width and height of the frame behind the texture
    pub frame_size: Option<(u32, u32)>,
    /// Rotation mode currently applied
    pub rotation_mode: RotationMode,
    /// Per-track object fit override
    pub object_fit: Option<ObjectFit>,
    /// Placement used by the last draw
    pub placement: Option<Rect>,
    /// Frame cache counters
    pub cache: CacheStats,
    /// Successful uploads
    pub uploads: u64,
    /// Failed uploads
    pub upload_failures: u64,
}

/// Point-in-time report of one compositor
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MixerReport {
    /// When the report was taken
    pub generated_at: DateTime<Utc>,
    /// Lifecycle state
    pub state: CompositorState,
    /// Configuration of the current or last run
    pub config: CompositorConfig,
    /// Aggregate statistics
    pub stats: CompositorStats,
    /// Registered tracks in draw order
    pub tracks: Vec<TrackReport>,
    /// Textures held by the backend
    pub live_textures: usize,
    /// Render backend name
    pub backend: String,
    /// Overall verdict
    pub health: MixerHealth,
}

impl MixerReport {
    /// Pretty-printed JSON
    pub fn to_json(&self) -> MediaResult<String> {
        serde_json::to_string_pretty(self).map_err(|e| MediaError::InvalidState {
            message: format!("Failed to serialize mixer report: {}", e),
        })
    }

    /// Enabled tracks the last tick could not draw
    pub fn undrawn_tracks(&self) -> Vec<&str> {
        self.tracks
            .iter()
            .filter(|track| track.enabled && !track.drawable)
            .map(|track| track.track_id.as_str())
            .collect()
    }
}

/// Builds [`MixerReport`]s
#[derive(Debug, Default)]
pub struct MixerAnalyzer;

impl MixerAnalyzer {
    /// Create new analyzer
    pub fn new() -> Self {
        Self
    }

    /// Snapshot a compositor
    pub fn analyze(&self, compositor: &Compositor) -> MixerReport {
        let tracks: Vec<TrackReport> = compositor
            .tracks()
            .into_iter()
            .filter_map(|track| {
                let renderer = compositor.renderer(&track.id)?;
                Some(TrackReport {
                    drawable: renderer.is_drawable(),
                    frame_size: renderer.frame_info().map(|info| (info.width, info.height)),
                    rotation_mode: renderer.rotation_mode(),
                    object_fit: renderer.object_fit(),
                    placement: renderer.last_placement(),
                    cache: renderer.cache_stats(),
                    uploads: renderer.upload_count(),
                    upload_failures: renderer.upload_failure_count(),
                    track_id: track.id,
                    label: track.label,
                    remote: track.remote,
                    enabled: track.enabled,
                })
            })
            .collect();

        let state = compositor.state();
        let health = match state {
            CompositorState::Running => {
                // tracks that never received a frame are not a fault
                let stalled = tracks
                    .iter()
                    .any(|track| track.enabled && track.cache.frames_received > 0 && !track.drawable);
                if stalled {
                    MixerHealth::Degraded
                } else {
                    MixerHealth::Healthy
                }
            }
            CompositorState::Idle | CompositorState::Stopping => MixerHealth::Idle,
        };

        MixerReport {
            generated_at: Utc::now(),
            state,
            config: compositor.config(),
            stats: compositor.stats(),
            tracks,
            live_textures: compositor.live_textures(),
            backend: compositor.backend_name().to_string(),
            health,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use vidmix_media::{Track, VideoFrame};

    #[test]
    fn test_report_of_idle_compositor() {
        let compositor = Compositor::new();
        compositor.add_track(Track::local("cam", "Camera"));
        compositor
            .push_frame("cam", VideoFrame::solid(4, 4, [9, 9, 9, 255]))
            .unwrap();
        compositor.tick_now().unwrap();

        let report = MixerAnalyzer::new().analyze(&compositor);
        assert_eq!(report.health, MixerHealth::Idle);
        assert_eq!(report.tracks.len(), 1);
        assert_eq!(report.tracks[0].frame_size, Some((4, 4)));
        assert_eq!(report.tracks[0].uploads, 1);
        assert_eq!(report.live_textures, 1);
        assert!(report.undrawn_tracks().is_empty());

        let json = report.to_json().unwrap();
        assert!(json.contains("\"track_id\": \"cam\""));
        assert!(json.contains("\"backend\": \"software\""));
    }
}
