//! Tests for the compositor lifecycle, tick loop and track registry

use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{mpsc, Arc, Weak};
use std::time::Duration;
use tokio_test::{assert_err, assert_ok};
use vidmix_media::*;

fn counting_sink() -> (Arc<AtomicU64>, Arc<dyn OutputSink>) {
    let count = Arc::new(AtomicU64::new(0));
    let counter = Arc::clone(&count);
    let sink = CallbackSink::new(move |_output: Arc<CompositeOutput>| {
        counter.fetch_add(1, Ordering::Relaxed);
    });
    (count, Arc::new(sink))
}

// ============================================================================
// LIFECYCLE
// ============================================================================

#[tokio::test]
async fn test_start_stop_lifecycle() {
    let compositor = Compositor::new();
    assert_eq!(compositor.state(), CompositorState::Idle);

    assert_ok!(compositor.start(CompositorConfig::default()));
    assert_eq!(compositor.state(), CompositorState::Running);

    assert_ok!(compositor.stop().await);
    assert_eq!(compositor.state(), CompositorState::Idle);

    // stopping while idle is a no-op
    assert_ok!(compositor.stop().await);
    assert_eq!(compositor.state(), CompositorState::Idle);
}

#[tokio::test]
async fn test_start_twice_fails_without_state_change() {
    let compositor = Compositor::new();
    let config = CompositorConfig {
        target_fps: 15,
        ..Default::default()
    };
    compositor.start(config.clone()).unwrap();

    let second = CompositorConfig {
        target_fps: 60,
        output: VideoResolution::HD,
        ..Default::default()
    };
    let err = assert_err!(compositor.start(second));
    assert!(matches!(err, MediaError::AlreadyRunning));
    assert_eq!(compositor.state(), CompositorState::Running);
    assert_eq!(compositor.config(), config);

    compositor.stop().await.unwrap();
}

#[tokio::test]
async fn test_invalid_config_is_rejected() {
    let compositor = Compositor::new();
    let config = CompositorConfig {
        target_fps: 0,
        ..Default::default()
    };
    assert!(matches!(
        compositor.start(config),
        Err(MediaError::InvalidConfiguration { .. })
    ));
    assert_eq!(compositor.state(), CompositorState::Idle);
}

#[tokio::test]
async fn test_restart_after_stop() {
    let compositor = Compositor::new();
    compositor.start(CompositorConfig::default()).unwrap();
    compositor.stop().await.unwrap();
    assert_ok!(compositor.start(CompositorConfig::default()));
    compositor.stop().await.unwrap();
}

#[tokio::test]
async fn test_lifecycle_events() {
    let compositor = Compositor::new();
    let mut events = compositor.subscribe();

    compositor.add_track(Track::remote("a", "Alice"));
    compositor.start(CompositorConfig::default()).unwrap();
    compositor.remove_track("a");
    compositor.stop().await.unwrap();

    let mut seen = Vec::new();
    while let Ok(event) = events.try_recv() {
        match event {
            CompositorEvent::FrameComposed { .. } => {}
            other => seen.push(format!("{:?}", other)),
        }
    }
    assert!(seen[0].starts_with("TrackAdded"));
    assert!(seen[1].starts_with("Started"));
    assert!(seen[2].starts_with("TrackRemoved"));
    assert!(seen[3].starts_with("Stopped"));
}

// ============================================================================
// TICKING
// ============================================================================

#[tokio::test]
async fn test_zero_tracks_still_publish_background_frames() {
    let compositor = Compositor::new();
    let channel = ChannelSink::new(64);
    let mut frames = channel.subscribe();
    compositor.add_sink(Arc::new(channel));

    let background = [12, 34, 56, 255];
    compositor
        .start(CompositorConfig {
            target_fps: 30,
            output: VideoResolution::VGA,
            background_color: background,
            ..Default::default()
        })
        .unwrap();

    let mut previous = 0;
    for _ in 0..10 {
        let output = tokio::time::timeout(Duration::from_secs(5), frames.recv())
            .await
            .expect("tick loop stalled")
            .unwrap();
        assert_eq!(output.resolution(), VideoResolution::VGA);
        assert_eq!(output.tracks_drawn, 0);
        assert!(output.is_filled_with(background));
        assert_eq!(output.frame_number, previous + 1);
        previous = output.frame_number;
    }

    compositor.stop().await.unwrap();
}

#[test]
fn test_at_most_one_upload_per_tick() {
    let compositor = Compositor::new();
    compositor.register_track("cam", false, "Camera");

    for i in 0..100u8 {
        compositor
            .push_frame("cam", VideoFrame::solid(32, 24, [i, i, i, 255]))
            .unwrap();
    }
    compositor.tick_now().unwrap();
    let renderer = compositor.renderer("cam").unwrap();
    assert_eq!(renderer.upload_count(), 1);

    // no new frame: the texture is reused
    compositor.tick_now().unwrap();
    compositor.tick_now().unwrap();
    assert_eq!(renderer.upload_count(), 1);

    compositor
        .push_frame("cam", VideoFrame::solid(32, 24, [1, 2, 3, 255]))
        .unwrap();
    compositor.tick_now().unwrap();
    assert_eq!(renderer.upload_count(), 2);

    let stats = compositor.stats();
    assert_eq!(stats.texture_uploads, 2);
    assert_eq!(stats.frames_received, 101);
    assert_eq!(stats.frames_dropped, 99);
    assert_eq!(stats.frames_rendered, 4);
}

#[test]
fn test_texture_count_tracks_registrations() {
    let compositor = Compositor::new();
    for id in ["a", "b", "c"] {
        compositor.register_track(id, true, id);
    }
    // no texture before the first frame
    compositor.tick_now().unwrap();
    assert_eq!(compositor.live_textures(), 0);

    for id in ["a", "b", "c"] {
        compositor
            .push_frame(id, VideoFrame::solid(8, 8, [0, 0, 0, 255]))
            .unwrap();
    }
    compositor.tick_now().unwrap();
    assert_eq!(compositor.live_textures(), 3);

    compositor.remove_track("b");
    assert_eq!(compositor.live_textures(), 2);
    compositor.tick_now().unwrap();
    assert_eq!(compositor.live_textures(), 2);
}

#[test]
fn test_disabled_track_is_not_drawn() {
    let compositor = Compositor::new();
    compositor.register_track("a", false, "A");
    compositor.register_track("b", false, "B");
    compositor
        .push_frame("a", VideoFrame::solid(8, 8, [255, 0, 0, 255]))
        .unwrap();
    compositor
        .push_frame("b", VideoFrame::solid(8, 8, [0, 255, 0, 255]))
        .unwrap();

    assert_eq!(compositor.tick_now().unwrap().tracks_drawn, 2);
    compositor.set_track_enabled("b", false).unwrap();
    let output = compositor.tick_now().unwrap();
    assert_eq!(output.tracks_drawn, 1);
    // the remaining track takes the whole canvas
    assert_eq!(output.pixel(500, 240), Some([255, 0, 0, 255]));

    assert!(matches!(
        compositor.set_track_enabled("ghost", true),
        Err(MediaError::UnknownTrack { .. })
    ));
}

#[test]
fn test_upload_failure_skips_only_that_track() {
    let compositor = Compositor::new();
    let failures = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&failures);
    compositor.set_diagnostics_callback(Some(Arc::new(move |error: &MediaError| {
        assert!(matches!(error, MediaError::TextureUploadFailure { .. }));
        counter.fetch_add(1, Ordering::Relaxed);
    })));
    let mut events = compositor.subscribe();

    compositor.register_track("good", false, "Good");
    compositor.register_track("bad", true, "Bad");
    compositor
        .push_frame("good", VideoFrame::solid(8, 8, [255, 255, 255, 255]))
        .unwrap();
    compositor
        .push_frame("bad", VideoFrame::new(8, 8, PixelFormat::Mjpeg, vec![0xffu8; 32]))
        .unwrap();

    let output = compositor.tick_now().unwrap();
    assert_eq!(output.frame_number, 1);
    assert_eq!(output.tracks_drawn, 1);
    assert_eq!(failures.load(Ordering::Relaxed), 1);

    let mut failed_track = None;
    while let Ok(event) = events.try_recv() {
        if let CompositorEvent::TextureUploadFailed { track_id, .. } = event {
            failed_track = Some(track_id);
        }
    }
    assert_eq!(failed_track.as_deref(), Some("bad"));
    assert_eq!(compositor.stats().upload_failures, 1);
}

/// Run one manual tick on a helper thread, failing instead of hanging
fn tick_on_helper(compositor: &Arc<Compositor>) -> CompositeOutput {
    let (tx, rx) = mpsc::channel();
    let worker = Arc::clone(compositor);
    std::thread::spawn(move || {
        let _ = tx.send(worker.tick_now());
    });
    let output = rx
        .recv_timeout(Duration::from_secs(5))
        .expect("tick did not return");
    (*output.unwrap()).clone()
}

#[test]
fn test_diagnostics_callback_may_call_back_into_compositor() {
    let compositor = Arc::new(Compositor::new());
    let weak: Weak<Compositor> = Arc::downgrade(&compositor);
    let seen = Arc::new(parking_lot::Mutex::new(Vec::new()));
    let log = Arc::clone(&seen);
    compositor.set_diagnostics_callback(Some(Arc::new(move |error: &MediaError| {
        let Some(compositor) = weak.upgrade() else {
            return;
        };
        log.lock().push((
            error.to_string(),
            compositor.live_textures(),
            compositor.config().target_fps,
            compositor.backend_name(),
        ));
        // mutating the registry from the callback is allowed too
        compositor.remove_track("bad");
    })));

    compositor.register_track("good", false, "Good");
    compositor.register_track("bad", true, "Bad");
    compositor
        .push_frame("good", VideoFrame::solid(8, 8, [255, 255, 255, 255]))
        .unwrap();
    compositor
        .push_frame("bad", VideoFrame::new(8, 8, PixelFormat::Mjpeg, vec![0xffu8; 32]))
        .unwrap();

    let output = tick_on_helper(&compositor);
    assert_eq!(output.tracks_drawn, 1);

    let seen = seen.lock().clone();
    assert_eq!(seen.len(), 1);
    assert_eq!(seen[0].1, 1);
    assert_eq!(seen[0].2, 30);
    assert_eq!(seen[0].3, "software");
    assert!(!compositor.has_track("bad"));

    // the loop keeps going after the failing track is gone
    let next = tick_on_helper(&compositor);
    assert_eq!(next.frame_number, 2);
    assert_eq!(compositor.stats().upload_failures, 1);
}

#[test]
fn test_sink_may_tick_from_its_callback() {
    let compositor = Arc::new(Compositor::new());
    let weak = Arc::downgrade(&compositor);
    let frames = Arc::new(parking_lot::Mutex::new(Vec::new()));
    let log = Arc::clone(&frames);
    let ticked = AtomicBool::new(false);
    compositor.add_sink(Arc::new(CallbackSink::new(move |output: Arc<CompositeOutput>| {
        log.lock().push(output.frame_number);
        if !ticked.swap(true, Ordering::SeqCst) {
            if let Some(compositor) = weak.upgrade() {
                compositor.tick_now().unwrap();
            }
        }
    })));

    let output = tick_on_helper(&compositor);
    assert_eq!(output.frame_number, 1);
    // the nested frame is delivered after the outer one, never before
    assert_eq!(*frames.lock(), vec![1, 2]);
    assert_eq!(compositor.frame_count(), 2);
}

#[tokio::test]
async fn test_idle_compositor_releases_textures_on_request() {
    let compositor = Compositor::new();
    compositor.register_track("cam", false, "Camera");
    compositor
        .push_frame("cam", VideoFrame::solid(8, 8, [0, 255, 0, 255]))
        .unwrap();

    compositor.tick_now().unwrap();
    assert_eq!(compositor.live_textures(), 1);
    assert_ok!(compositor.release_textures());
    assert_eq!(compositor.live_textures(), 0);
    assert!(!compositor.renderer("cam").unwrap().is_drawable());

    // cached frame survives, so the next tick draws it again
    let output = compositor.tick_now().unwrap();
    assert_eq!(output.tracks_drawn, 1);
    assert_eq!(compositor.live_textures(), 1);

    compositor.start(CompositorConfig::default()).unwrap();
    let err = assert_err!(compositor.release_textures());
    assert!(matches!(err, MediaError::InvalidState { .. }));
    compositor.stop().await.unwrap();
    assert_eq!(compositor.live_textures(), 0);
}

#[test]
fn test_camera_switch_updates_facing() {
    let compositor = Compositor::new();
    compositor.register_track("cam", false, "Camera");
    compositor.did_switch_camera("cam", true);
    assert!(compositor.renderer("cam").unwrap().is_front_facing());
    // unknown tracks are ignored
    compositor.did_switch_camera("ghost", true);
}

#[test]
fn test_video_sink_routes_frames() {
    let compositor = Compositor::new();
    compositor.register_track("cam", false, "Camera");
    let sink: &dyn VideoSink = &compositor;
    sink.on_frame("cam", Arc::new(VideoFrame::solid(4, 4, [0, 0, 0, 255])));
    sink.on_frame("ghost", Arc::new(VideoFrame::solid(4, 4, [0, 0, 0, 255])));
    assert_eq!(compositor.renderer("cam").unwrap().cache().version(), 1);
}

// ============================================================================
// SCENARIO
// ============================================================================

#[tokio::test]
async fn test_two_track_scenario_at_30_fps() {
    let compositor = Arc::new(Compositor::new());
    let (published, sink) = counting_sink();
    compositor.add_sink(sink);

    compositor.add_track(Track::remote("A", "Remote A"));
    compositor.add_track(Track::local("B", "Local B"));
    compositor.set_front_facing("B", true).unwrap();
    compositor.set_mirror("B", true).unwrap();

    let frame_a = Arc::new(VideoFrame::solid(1280, 720, [200, 0, 0, 255]).with_rotation(VideoRotation::Deg90));
    let frame_b = Arc::new(VideoFrame::solid(640, 480, [0, 0, 200, 255]));
    compositor.push_frame("A", Arc::clone(&frame_a)).unwrap();
    compositor.push_frame("B", Arc::clone(&frame_b)).unwrap();

    compositor
        .start(CompositorConfig {
            target_fps: 30,
            output: VideoResolution::VGA,
            object_fit: ObjectFit::Contain,
            ..Default::default()
        })
        .unwrap();

    // producers keep pushing at their own pace
    let producer = {
        let compositor = Arc::clone(&compositor);
        tokio::spawn(async move {
            for _ in 0..40 {
                let _ = compositor.push_frame("A", Arc::clone(&frame_a));
                let _ = compositor.push_frame("B", Arc::clone(&frame_b));
                tokio::time::sleep(Duration::from_millis(25)).await;
            }
        })
    };

    tokio::time::sleep(Duration::from_secs(1)).await;
    let a = compositor.renderer("A").unwrap();
    let b = compositor.renderer("B").unwrap();
    assert!(a.upload_count() >= 1);
    assert!(b.upload_count() >= 1);
    assert_eq!(a.rotation_mode(), RotationMode::RotateRight);
    assert_eq!(b.rotation_mode(), RotationMode::FlipHorizontal);

    compositor.stop().await.unwrap();
    producer.abort();

    let ticks = compositor.frame_count();
    assert_eq!(ticks, published.load(Ordering::Relaxed));
    assert!((5..=45).contains(&ticks), "{} ticks in one second", ticks);
    assert_eq!(compositor.live_textures(), 0);
}

// ============================================================================
// CONCURRENCY
// ============================================================================

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_add_remove_racing_ticks() {
    let compositor = Arc::new(Compositor::new());
    let outputs = ChannelSink::new(1024);
    let mut rx = outputs.subscribe();
    compositor.add_sink(Arc::new(outputs));
    compositor
        .start(CompositorConfig {
            target_fps: 120,
            output: VideoResolution::new(160, 120),
            ..Default::default()
        })
        .unwrap();

    let mut workers = Vec::new();
    for worker in 0..8u8 {
        let compositor = Arc::clone(&compositor);
        workers.push(std::thread::spawn(move || {
            for round in 0..200u32 {
                let id = format!("track-{}", (worker as u32 + round) % 5);
                compositor.register_track(&id, worker % 2 == 0, "stress");
                let _ = compositor.push_frame(&id, VideoFrame::solid(16, 9, [worker, 0, 0, 255]));
                if round % 3 == 0 {
                    compositor.remove_track(&id);
                }
                if round % 7 == 0 {
                    // manual ticks race the clock-driven ones
                    let output = compositor.tick_now().unwrap();
                    assert_eq!(output.resolution(), VideoResolution::new(160, 120));
                }
            }
        }));
    }
    for worker in workers {
        worker.join().unwrap();
    }

    compositor.stop().await.unwrap();
    assert_eq!(compositor.live_textures(), 0);

    let mut last = 0;
    while let Ok(output) = rx.try_recv() {
        assert_eq!(output.data.len(), 160 * 120 * 4);
        assert!(output.frame_number > last);
        last = output.frame_number;
    }
    assert!(last > 0);

    // every track still registered gets a texture back on the next tick
    compositor.tick_now().unwrap();
    let with_frames = compositor
        .tracks()
        .iter()
        .filter(|track| compositor.renderer(&track.id).unwrap().cache().version() > 0)
        .count();
    assert_eq!(compositor.live_textures(), with_frames);
}
