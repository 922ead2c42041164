//! Mixer demo for vidmix
//!
//! Two synthetic cameras (one rotated, one front facing) are mixed side by
//! side for three seconds; the composed frames are counted and a report is
//! printed at the end.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use vidmix::{
    CallbackSink, CompositeOutput, CompositorConfig, GlobalConfig, MixerAnalyzer, RenderProfiler,
    TestPatternCapturer, TestPatternConfig, VidMix, VideoCapturer, VideoResolution, VideoRotation,
    VideoSink,
};

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let vidmix = VidMix::init_with(GlobalConfig {
        debug_logging: true,
        ..Default::default()
    })?;
    let session = Arc::new(vidmix.session()?);

    println!("🎬 Registering tracks");
    session.register_track("remote", true, "Remote peer");
    session.register_track("local", false, "Front camera");

    let mixer = session.create_mixer(
        "call",
        CompositorConfig {
            output: VideoResolution::HD,
            ..Default::default()
        },
    )?;
    let profiler = RenderProfiler::new();

    let composed = Arc::new(AtomicU64::new(0));
    let counter = Arc::clone(&composed);
    mixer.add_sink(Arc::new(CallbackSink::new(move |output: Arc<CompositeOutput>| {
        if output.frame_number % 30 == 0 {
            println!(
                "   📊 Frame {}: {} tracks drawn",
                output.frame_number, output.tracks_drawn
            );
        }
        counter.fetch_add(1, Ordering::Relaxed);
    })));

    // captured frames go through the session so every mixer and view sees them
    let sink: Arc<dyn VideoSink> = Arc::new(SessionSink(Arc::clone(&session)));

    vidmix.block_on(async {
        profiler.start_profiling(mixer.subscribe())?;

        let mut remote = TestPatternCapturer::new(
            "remote",
            TestPatternConfig {
                resolution: VideoResolution::HD,
                rotation: VideoRotation::Deg90,
                ..Default::default()
            },
            Arc::clone(&sink),
        )?;
        let mut local = TestPatternCapturer::new(
            "local",
            TestPatternConfig {
                front_facing: true,
                ..Default::default()
            },
            Arc::clone(&sink),
        )?
        .with_observers(Arc::clone(session.camera_observers()));

        println!("🎥 Starting capturers");
        remote.start().await?;
        local.start().await?;
        session.notify_did_switch("local", true);

        tokio::time::sleep(Duration::from_millis(1500)).await;
        println!("🔄 Switching local camera");
        local.switch_camera().await?;
        tokio::time::sleep(Duration::from_millis(1500)).await;

        remote.stop().await?;
        local.stop().await?;

        let report = MixerAnalyzer::new().analyze(&mixer);
        println!("📋 Mixer report:\n{}", report.to_json()?);

        session.shutdown().await?;
        profiler.stop_profiling().await;
        Ok::<(), Box<dyn std::error::Error>>(())
    })?;

    let profile = profiler.profile();
    println!(
        "✅ {} frames composed, average tick {:?}, {} upload failures",
        composed.load(Ordering::Relaxed),
        profile.average_tick_time,
        profile.total_upload_failures()
    );
    Ok(())
}

struct SessionSink(Arc<vidmix::MediaSession>);

impl VideoSink for SessionSink {
    fn on_frame(&self, track_id: &str, frame: Arc<vidmix::VideoFrame>) {
        if let Err(error) = self.0.push_frame(track_id, frame) {
            eprintln!("❌ Dropped frame for {}: {}", track_id, error);
        }
    }
}
