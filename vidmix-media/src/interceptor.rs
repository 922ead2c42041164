//! Raw sample taps for recording
//!
//! The interceptor sits beside the compositing path: it sees every raw frame
//! (and optionally every composed frame) and forwards it to delegates such as
//! recorders. It never alters or delays the frames it observes.

use crate::capture::VideoSink;
use crate::error::MediaError;
use crate::observer::{ObserverHandle, ObserverRegistry};
use crate::output::{CompositeOutput, OutputSink};
use crate::tracks::{AudioFrame, VideoFrame};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::warn;

/// Receiver of intercepted samples
pub trait SamplesInterceptorDelegate: Send + Sync {
    fn did_capture_video_samples(&self, track_id: &str, frame: &Arc<VideoFrame>);

    fn did_capture_audio_samples(&self, _track_id: &str, _frame: &AudioFrame) {}

    fn did_video_capture_fail(&self, _track_id: &str, _error: &MediaError) {}

    fn did_audio_capture_fail(&self, _track_id: &str, _error: &MediaError) {}
}

/// Interceptor counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct InterceptorStats {
    pub video_samples: u64,
    pub audio_samples: u64,
    pub failures: u64,
}

/// Fan-out point for raw samples
#[derive(Debug)]
pub struct SamplesInterceptor {
    composite_track_id: String,
    delegates: ObserverRegistry<dyn SamplesInterceptorDelegate>,
    video_samples: AtomicU64,
    audio_samples: AtomicU64,
    failures: AtomicU64,
}

impl SamplesInterceptor {
    /// Interceptor reporting composed frames under `composite_track_id`
    pub fn new(composite_track_id: impl Into<String>) -> Self {
        Self {
            composite_track_id: composite_track_id.into(),
            delegates: ObserverRegistry::new(),
            video_samples: AtomicU64::new(0),
            audio_samples: AtomicU64::new(0),
            failures: AtomicU64::new(0),
        }
    }

    pub fn add_delegate(&self, delegate: Arc<dyn SamplesInterceptorDelegate>) -> ObserverHandle {
        self.delegates.register(delegate)
    }

    pub fn remove_delegate(&self, handle: ObserverHandle) -> bool {
        self.delegates.unregister(handle)
    }

    pub fn has_delegates(&self) -> bool {
        !self.delegates.is_empty()
    }

    pub fn intercept_video(&self, track_id: &str, frame: &Arc<VideoFrame>) {
        self.video_samples.fetch_add(1, Ordering::Relaxed);
        self.delegates
            .notify(|delegate| delegate.did_capture_video_samples(track_id, frame));
    }

    pub fn intercept_audio(&self, track_id: &str, frame: &AudioFrame) {
        self.audio_samples.fetch_add(1, Ordering::Relaxed);
        self.delegates
            .notify(|delegate| delegate.did_capture_audio_samples(track_id, frame));
    }

    pub fn report_video_failure(&self, track_id: &str, error: &MediaError) {
        warn!("Video capture failed for track {}: {}", track_id, error);
        self.failures.fetch_add(1, Ordering::Relaxed);
        self.delegates
            .notify(|delegate| delegate.did_video_capture_fail(track_id, error));
    }

    pub fn report_audio_failure(&self, track_id: &str, error: &MediaError) {
        warn!("Audio capture failed for track {}: {}", track_id, error);
        self.failures.fetch_add(1, Ordering::Relaxed);
        self.delegates
            .notify(|delegate| delegate.did_audio_capture_fail(track_id, error));
    }

    pub fn stats(&self) -> InterceptorStats {
        InterceptorStats {
            video_samples: self.video_samples.load(Ordering::Relaxed),
            audio_samples: self.audio_samples.load(Ordering::Relaxed),
            failures: self.failures.load(Ordering::Relaxed),
        }
    }
}

impl VideoSink for SamplesInterceptor {
    fn on_frame(&self, track_id: &str, frame: Arc<VideoFrame>) {
        self.intercept_video(track_id, &frame);
    }
}

impl OutputSink for SamplesInterceptor {
    fn on_composed_frame(&self, output: Arc<CompositeOutput>) {
        let frame = Arc::new(output.to_video_frame());
        self.intercept_video(&self.composite_track_id, &frame);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tracks::PixelFormat;
    use bytes::Bytes;
    use parking_lot::Mutex;

    #[derive(Default)]
    struct Recorder {
        events: Mutex<Vec<String>>,
    }

    impl SamplesInterceptorDelegate for Recorder {
        fn did_capture_video_samples(&self, track_id: &str, frame: &Arc<VideoFrame>) {
            self.events
                .lock()
                .push(format!("video:{}:{}x{}", track_id, frame.width, frame.height));
        }

        fn did_capture_audio_samples(&self, track_id: &str, frame: &AudioFrame) {
            self.events
                .lock()
                .push(format!("audio:{}:{}", track_id, frame.samples.len()));
        }

        fn did_video_capture_fail(&self, track_id: &str, _error: &MediaError) {
            self.events.lock().push(format!("video-fail:{}", track_id));
        }
    }

    #[test]
    fn test_fan_out_to_delegates() {
        let interceptor = SamplesInterceptor::new("mix");
        let recorder = Arc::new(Recorder::default());
        interceptor.add_delegate(recorder.clone());

        interceptor.on_frame("cam", Arc::new(VideoFrame::solid(4, 2, [0, 0, 0, 255])));
        interceptor.intercept_audio(
            "mic",
            &AudioFrame {
                samples: vec![0.0; 480],
                sample_rate: 48000,
                channels: 1,
                timestamp_us: 0,
            },
        );
        interceptor.report_video_failure(
            "cam",
            &MediaError::Capture {
                message: "device lost".to_string(),
            },
        );
        interceptor.on_composed_frame(Arc::new(CompositeOutput {
            width: 1,
            height: 1,
            format: PixelFormat::Rgba,
            frame_number: 1,
            timestamp_us: 0,
            tracks_drawn: 0,
            data: Bytes::from_static(&[0, 0, 0, 255]),
        }));

        assert_eq!(
            *recorder.events.lock(),
            vec!["video:cam:4x2", "audio:mic:480", "video-fail:cam", "video:mix:1x1"]
        );
        assert_eq!(
            interceptor.stats(),
            InterceptorStats {
                video_samples: 2,
                audio_samples: 1,
                failures: 1
            }
        );
    }
}
