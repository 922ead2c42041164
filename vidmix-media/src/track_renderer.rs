//! Track Renderer
//!
//! Binds one track's [`FrameBufferCache`] to a draw call. The renderer owns the
//! track's texture exclusively: it re-uploads only when the cached frame
//! version moved past the uploaded one, and hands out short-lived
//! [`DrawCommand`]s that borrow the texture for a single composite pass.

use crate::error::MediaResult;
use crate::frame_cache::{CacheStats, FrameBufferCache};
use crate::geometry::{cube_vertex_data_cropped, rotation_mode_for, CropRect, ObjectFit, Rect, RotationMode};
use crate::layout::{LayoutSlot, LayoutStrategy};
use crate::render::{DrawCommand, RenderBackend, Texture};
use crate::tracks::{Track, VideoFrame, VideoResolution, VideoRotation};
use parking_lot::{Mutex, RwLock};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::debug;

/// Geometry of the frame behind the current texture
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameInfo {
    /// Frame width before rotation
    pub width: u32,
    /// Frame height before rotation
    pub height: u32,
    /// Intrinsic rotation of the frame
    pub rotation: VideoRotation,
    /// Cache version the texture was uploaded from
    pub version: u64,
}

/// Outcome of [`TrackRenderer::ensure_texture`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TextureStatus {
    /// No frame has arrived yet
    Empty,
    /// The texture already matches the latest frame
    Current,
    /// A new texture was uploaded this call
    Uploaded,
    /// The renderer has been disposed
    Released,
}

#[derive(Debug, Default)]
struct GpuSlot {
    texture: Option<Texture>,
    frame: Option<FrameInfo>,
    uploaded_version: u64,
    placement: Option<Rect>,
    drawable: bool,
    uploads: u64,
    upload_failures: u64,
    disposed: bool,
}

/// Per-track render state
#[derive(Debug)]
pub struct TrackRenderer {
    track: RwLock<Track>,
    cache: FrameBufferCache,
    front_facing: AtomicBool,
    mirror: AtomicBool,
    rotation_override: RwLock<Option<VideoRotation>>,
    object_fit: RwLock<Option<ObjectFit>>,
    crop: RwLock<CropRect>,
    gpu: Mutex<GpuSlot>,
}

impl TrackRenderer {
    pub fn new(track: Track) -> Self {
        let cache = FrameBufferCache::new(track.id.clone());
        Self {
            track: RwLock::new(track),
            cache,
            front_facing: AtomicBool::new(false),
            mirror: AtomicBool::new(false),
            rotation_override: RwLock::new(None),
            object_fit: RwLock::new(None),
            crop: RwLock::new(CropRect::NONE),
            gpu: Mutex::new(GpuSlot::default()),
        }
    }

    pub fn track_id(&self) -> &str {
        self.cache.track_id()
    }

    pub fn track(&self) -> Track {
        self.track.read().clone()
    }

    /// Refresh the descriptive attributes of the track
    pub fn update_track(&self, remote: bool, label: impl Into<String>) {
        let mut track = self.track.write();
        track.remote = remote;
        track.label = label.into();
    }

    pub fn is_enabled(&self) -> bool {
        self.track.read().enabled
    }

    pub fn set_enabled(&self, enabled: bool) {
        self.track.write().enabled = enabled;
    }

    /// Store a new frame; never blocks on rendering
    pub fn push(&self, frame: impl Into<Arc<VideoFrame>>) -> u64 {
        self.cache.push(frame)
    }

    pub fn cache(&self) -> &FrameBufferCache {
        &self.cache
    }

    pub fn cache_stats(&self) -> CacheStats {
        self.cache.stats()
    }

    pub fn set_front_facing(&self, front_facing: bool) {
        self.front_facing.store(front_facing, Ordering::Release);
    }

    pub fn is_front_facing(&self) -> bool {
        self.front_facing.load(Ordering::Acquire)
    }

    pub fn set_mirror(&self, mirror: bool) {
        self.mirror.store(mirror, Ordering::Release);
    }

    pub fn is_mirrored(&self) -> bool {
        self.mirror.load(Ordering::Acquire)
    }

    /// Ignore the frames' own rotation and use `rotation` instead
    pub fn set_rotation_override(&self, rotation: Option<VideoRotation>) {
        *self.rotation_override.write() = rotation;
    }

    pub fn rotation_override(&self) -> Option<VideoRotation> {
        *self.rotation_override.read()
    }

    /// Per-track object fit; `None` falls back to the consumer's default
    pub fn set_object_fit(&self, object_fit: Option<ObjectFit>) {
        *self.object_fit.write() = object_fit;
    }

    pub fn object_fit(&self) -> Option<ObjectFit> {
        *self.object_fit.read()
    }

    /// Restrict drawing to a crop window; [`CropRect::new`] has already validated it
    pub fn set_crop(&self, crop: CropRect) {
        *self.crop.write() = crop;
    }

    pub fn crop(&self) -> CropRect {
        *self.crop.read()
    }

    /// Make sure the texture matches the latest cached frame
    ///
    /// Uploads at most once per call. A failed upload leaves the track
    /// undrawable until a later call succeeds; the previous texture is kept and
    /// the same frame version is retried next time.
    pub fn ensure_texture(&self, backend: &mut dyn RenderBackend) -> MediaResult<TextureStatus> {
        let mut gpu = self.gpu.lock();
        if gpu.disposed {
            gpu.drawable = false;
            return Ok(TextureStatus::Released);
        }

        let Some((frame, version)) = self.cache.latest() else {
            gpu.drawable = false;
            return Ok(TextureStatus::Empty);
        };

        if version == gpu.uploaded_version && gpu.texture.is_some() {
            gpu.drawable = true;
            return Ok(TextureStatus::Current);
        }

        match backend.upload(&frame) {
            Ok(texture) => {
                debug!(
                    "Track {} uploaded frame v{} as {:?}",
                    self.track_id(),
                    version,
                    texture.id()
                );
                gpu.texture = Some(texture);
                gpu.frame = Some(FrameInfo {
                    width: frame.width,
                    height: frame.height,
                    rotation: frame.rotation,
                    version,
                });
                gpu.uploaded_version = version;
                gpu.drawable = true;
                gpu.uploads += 1;
                self.cache.acknowledge(version);
                Ok(TextureStatus::Uploaded)
            }
            Err(error) => {
                gpu.drawable = false;
                gpu.upload_failures += 1;
                Err(error.into_upload_failure(self.track_id()))
            }
        }
    }

    /// Rotation mode for the given facing and mirror flags
    ///
    /// Uses the rotation override when set, otherwise the intrinsic rotation of
    /// the frame behind the current texture.
    pub fn compute_rotation_mode(&self, front_facing: bool, mirror: bool) -> RotationMode {
        let rotation = self.rotation_override().unwrap_or_else(|| {
            self.gpu
                .lock()
                .frame
                .map(|frame| frame.rotation)
                .unwrap_or_default()
        });
        rotation_mode_for(rotation, front_facing, mirror)
    }

    /// Rotation mode from the renderer's current flags
    pub fn rotation_mode(&self) -> RotationMode {
        self.compute_rotation_mode(self.is_front_facing(), self.is_mirrored())
    }

    /// Where the layout puts this track inside the canvas
    pub fn placement_rect(
        &self,
        canvas: VideoResolution,
        layout: &dyn LayoutStrategy,
        slot: LayoutSlot,
    ) -> Rect {
        layout.place(canvas, slot)
    }

    /// Draw of the current texture fitted into `placement`, `None` if not drawable
    pub fn draw_command(&self, placement: Rect, default_fit: ObjectFit) -> Option<DrawCommand> {
        let mode = self.rotation_mode();
        let fit = self.object_fit().unwrap_or(default_fit);
        let crop = self.crop();

        let mut gpu = self.gpu.lock();
        if !gpu.drawable {
            return None;
        }
        let texture = gpu.texture.clone()?;
        gpu.placement = Some(placement);

        let vertices = cube_vertex_data_cropped(
            texture.width() as f32,
            texture.height() as f32,
            mode,
            fit,
            placement.width as f32,
            placement.height as f32,
            &crop,
        );
        Some(DrawCommand {
            texture,
            placement,
            vertices,
        })
    }

    pub fn is_drawable(&self) -> bool {
        self.gpu.lock().drawable
    }

    pub fn has_texture(&self) -> bool {
        self.gpu.lock().texture.is_some()
    }

    /// Frame geometry behind the current texture
    pub fn frame_info(&self) -> Option<FrameInfo> {
        self.gpu.lock().frame
    }

    /// Placement used by the most recent draw
    pub fn last_placement(&self) -> Option<Rect> {
        self.gpu.lock().placement
    }

    /// Successful uploads so far
    pub fn upload_count(&self) -> u64 {
        self.gpu.lock().uploads
    }

    pub fn upload_failure_count(&self) -> u64 {
        self.gpu.lock().upload_failures
    }

    /// Drop the texture but keep the track; the next `ensure_texture` re-uploads
    pub fn release_texture(&self) {
        let mut gpu = self.gpu.lock();
        gpu.texture = None;
        gpu.frame = None;
        gpu.uploaded_version = 0;
        gpu.placement = None;
        gpu.drawable = false;
    }

    /// Release the texture and every cached frame for good
    pub fn dispose(&self) {
        {
            let mut gpu = self.gpu.lock();
            gpu.texture = None;
            gpu.drawable = false;
            gpu.disposed = true;
        }
        self.cache.dispose();
        debug!("Disposed renderer for track {}", self.track_id());
    }

    pub fn is_disposed(&self) -> bool {
        self.gpu.lock().disposed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::MediaError;
    use crate::render::SoftwareBackend;
    use crate::tracks::PixelFormat;

    fn renderer() -> TrackRenderer {
        TrackRenderer::new(Track::local("cam", "Camera"))
    }

    #[test]
    fn test_no_texture_before_first_frame() {
        let renderer = renderer();
        let mut backend = SoftwareBackend::new();
        assert_eq!(renderer.ensure_texture(&mut backend).unwrap(), TextureStatus::Empty);
        assert!(!renderer.is_drawable());
        assert_eq!(backend.live_textures(), 0);
        assert!(renderer
            .draw_command(Rect::new(0, 0, 10, 10), ObjectFit::Contain)
            .is_none());
    }

    #[test]
    fn test_upload_only_when_version_changes() {
        let renderer = renderer();
        let mut backend = SoftwareBackend::new();
        for tag in 0..5 {
            renderer.push(VideoFrame::solid(4, 4, [tag, 0, 0, 255]));
        }
        assert_eq!(renderer.ensure_texture(&mut backend).unwrap(), TextureStatus::Uploaded);
        assert_eq!(renderer.ensure_texture(&mut backend).unwrap(), TextureStatus::Current);
        assert_eq!(renderer.upload_count(), 1);
        assert_eq!(backend.live_textures(), 1);

        renderer.push(VideoFrame::solid(4, 4, [9, 0, 0, 255]));
        assert_eq!(renderer.ensure_texture(&mut backend).unwrap(), TextureStatus::Uploaded);
        // replaced, not accumulated
        assert_eq!(backend.live_textures(), 1);
        assert_eq!(renderer.upload_count(), 2);
    }

    #[test]
    fn test_failed_upload_marks_not_drawable_and_retries() {
        let renderer = renderer();
        let mut backend = SoftwareBackend::new();
        renderer.push(VideoFrame::solid(4, 4, [1, 1, 1, 255]));
        renderer.ensure_texture(&mut backend).unwrap();

        renderer.push(VideoFrame::new(4, 4, PixelFormat::H264, vec![0u8; 16]));
        let err = renderer.ensure_texture(&mut backend).unwrap_err();
        assert!(matches!(err, MediaError::TextureUploadFailure { ref track_id, .. } if track_id == "cam"));
        assert!(!renderer.is_drawable());
        // prior texture is kept alive but not drawn
        assert!(renderer.has_texture());

        assert!(renderer.ensure_texture(&mut backend).is_err());
        assert_eq!(renderer.upload_failure_count(), 2);

        renderer.push(VideoFrame::solid(4, 4, [2, 2, 2, 255]));
        assert_eq!(renderer.ensure_texture(&mut backend).unwrap(), TextureStatus::Uploaded);
        assert!(renderer.is_drawable());
    }

    #[test]
    fn test_rotation_mode_follows_facing_changes() {
        let renderer = renderer();
        let mut backend = SoftwareBackend::new();
        renderer.push(VideoFrame::solid(4, 2, [0, 0, 0, 255]).with_rotation(VideoRotation::Deg90));
        renderer.ensure_texture(&mut backend).unwrap();

        assert_eq!(renderer.rotation_mode(), RotationMode::RotateRight);
        renderer.set_front_facing(true);
        assert_eq!(renderer.rotation_mode(), RotationMode::RotateLeft);
        renderer.set_mirror(true);
        assert_eq!(renderer.rotation_mode(), RotationMode::RotateLeftFlipVertical);

        renderer.set_rotation_override(Some(VideoRotation::Deg0));
        assert_eq!(renderer.rotation_mode(), RotationMode::FlipHorizontal);
    }

    #[test]
    fn test_dispose_releases_texture() {
        let renderer = renderer();
        let mut backend = SoftwareBackend::new();
        renderer.push(VideoFrame::solid(4, 4, [1, 1, 1, 255]));
        renderer.ensure_texture(&mut backend).unwrap();
        assert_eq!(backend.live_textures(), 1);

        renderer.dispose();
        assert_eq!(backend.live_textures(), 0);
        renderer.push(VideoFrame::solid(4, 4, [1, 1, 1, 255]));
        assert_eq!(renderer.ensure_texture(&mut backend).unwrap(), TextureStatus::Released);
        assert_eq!(backend.live_textures(), 0);
    }

    #[test]
    fn test_release_texture_forces_reupload() {
        let renderer = renderer();
        let mut backend = SoftwareBackend::new();
        renderer.push(VideoFrame::solid(4, 4, [1, 1, 1, 255]));
        renderer.ensure_texture(&mut backend).unwrap();
        renderer.release_texture();
        assert_eq!(backend.live_textures(), 0);
        assert_eq!(renderer.ensure_texture(&mut backend).unwrap(), TextureStatus::Uploaded);
    }
}
