//! Texture upload and composite drawing
//!
//! [`RenderBackend`] is the seam between the compositing pipeline and whatever
//! actually owns texture memory. The crate ships a CPU implementation,
//! [`SoftwareBackend`], which keeps RGBA8 textures in reference-counted buffers
//! and rasterises textured quads the way a fragment shader would: nearest
//! texel through interpolated texture coordinates, source-over blending,
//! scissored to the placement rectangle. Muted and blurred views get a
//! separable Gaussian pass over the finished canvas.

use crate::error::{MediaError, MediaResult};
use crate::geometry::{CubeVertexData, Rect};
use crate::tracks::{PixelFormat, VideoFrame, VideoResolution};
use bytes::Bytes;
use std::f64::consts::PI;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use tracing::debug;

/// Largest accepted blur radius, in pixels
pub const MAX_BLUR_RADIUS: f32 = 64.0;

/// Outermost Gaussian tap kept in a blur kernel
const BLUR_EDGE_WEIGHT: f64 = 1.0 / 256.0;

/// Texture identifier, unique per backend
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TextureId(pub u64);

#[derive(Debug)]
struct TextureStorage {
    id: TextureId,
    width: u32,
    height: u32,
    pixels: Bytes,
    live: Arc<AtomicUsize>,
}

impl Drop for TextureStorage {
    fn drop(&mut self) {
        self.live.fetch_sub(1, Ordering::AcqRel);
    }
}

/// Draw-ready RGBA texture handle
///
/// Handles are shared: the storage is released when the last handle is dropped.
#[derive(Debug, Clone)]
pub struct Texture {
    storage: Arc<TextureStorage>,
}

impl Texture {
    pub fn id(&self) -> TextureId {
        self.storage.id
    }

    pub fn width(&self) -> u32 {
        self.storage.width
    }

    pub fn height(&self) -> u32 {
        self.storage.height
    }

    /// Tightly packed RGBA8 texels
    pub fn pixels(&self) -> &[u8] {
        &self.storage.pixels
    }

    /// Texel at `(x, y)`, clamped to the texture edge
    pub fn texel(&self, x: u32, y: u32) -> [u8; 4] {
        let x = x.min(self.width().saturating_sub(1)) as usize;
        let y = y.min(self.height().saturating_sub(1)) as usize;
        let offset = (y * self.width() as usize + x) * 4;
        let px = &self.storage.pixels[offset..offset + 4];
        [px[0], px[1], px[2], px[3]]
    }
}

/// Hands out texture ids and tracks how many textures are alive
#[derive(Debug, Default)]
pub struct TextureAllocator {
    next_id: AtomicU64,
    live: Arc<AtomicUsize>,
}

impl TextureAllocator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wrap RGBA pixels in a new texture
    pub fn allocate(&self, width: u32, height: u32, pixels: Bytes) -> Texture {
        let id = TextureId(self.next_id.fetch_add(1, Ordering::Relaxed) + 1);
        self.live.fetch_add(1, Ordering::AcqRel);
        Texture {
            storage: Arc::new(TextureStorage {
                id,
                width,
                height,
                pixels,
                live: Arc::clone(&self.live),
            }),
        }
    }

    /// Textures allocated and not yet released
    pub fn live(&self) -> usize {
        self.live.load(Ordering::Acquire)
    }
}

/// RGBA8 render target
#[derive(Debug, Clone)]
pub struct Canvas {
    width: u32,
    height: u32,
    pixels: Vec<u8>,
}

impl Canvas {
    pub fn new(resolution: VideoResolution) -> Self {
        let len = resolution.pixel_count() as usize * 4;
        Self {
            width: resolution.width,
            height: resolution.height,
            pixels: vec![0; len],
        }
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn resolution(&self) -> VideoResolution {
        VideoResolution::new(self.width, self.height)
    }

    /// Fill every pixel with `color`
    pub fn clear(&mut self, color: [u8; 4]) {
        for px in self.pixels.chunks_exact_mut(4) {
            px.copy_from_slice(&color);
        }
    }

    pub fn pixel(&self, x: u32, y: u32) -> [u8; 4] {
        let offset = (y as usize * self.width as usize + x as usize) * 4;
        let px = &self.pixels[offset..offset + 4];
        [px[0], px[1], px[2], px[3]]
    }

    pub fn pixels(&self) -> &[u8] {
        &self.pixels
    }

    /// Separable Gaussian blur of the colour channels; alpha is left as is
    ///
    /// `radius` is the standard deviation in pixels, rounded and capped at
    /// [`MAX_BLUR_RADIUS`]. Edges are clamped. Radii under one pixel do nothing.
    pub fn gaussian_blur(&mut self, radius: f32) {
        let kernel = gaussian_kernel(radius);
        if kernel.len() < 2 || self.pixels.is_empty() {
            return;
        }
        let (width, height) = (self.width as usize, self.height as usize);
        let mut scratch = vec![0u8; self.pixels.len()];
        blur_pass(&self.pixels, &mut scratch, width, height, &kernel, true);
        blur_pass(&scratch, &mut self.pixels, width, height, &kernel, false);
    }

    fn blend(&mut self, x: u32, y: u32, src: [u8; 4]) {
        let offset = (y as usize * self.width as usize + x as usize) * 4;
        let dst = &mut self.pixels[offset..offset + 4];
        let alpha = src[3] as u32;
        if alpha == 255 {
            dst.copy_from_slice(&src);
            return;
        }
        let inv = 255 - alpha;
        for channel in 0..3 {
            dst[channel] = ((src[channel] as u32 * alpha + dst[channel] as u32 * inv + 127) / 255) as u8;
        }
        dst[3] = (alpha + (dst[3] as u32 * inv + 127) / 255).min(255) as u8;
    }
}

/// One textured quad of a composite pass
///
/// The texture handle is borrowed for the duration of a single
/// [`RenderBackend::composite`] call.
#[derive(Debug, Clone)]
pub struct DrawCommand {
    /// Texture to sample
    pub texture: Texture,
    /// Destination rectangle in canvas pixels
    pub placement: Rect,
    /// Quad geometry relative to `placement`
    pub vertices: CubeVertexData,
}

/// Owner of texture memory and executor of draw passes
pub trait RenderBackend: Send {
    /// Backend name for logging
    fn name(&self) -> &'static str;

    /// Pixel layout textures are stored in; other layouts are converted on upload
    fn texture_format(&self) -> PixelFormat {
        PixelFormat::Rgba
    }

    /// Convert a frame into a new texture
    fn upload(&mut self, frame: &VideoFrame) -> MediaResult<Texture>;

    /// Clear `target` to `background` and draw every command in order
    fn composite(
        &mut self,
        target: &mut Canvas,
        background: [u8; 4],
        draws: &[DrawCommand],
    ) -> MediaResult<()>;

    /// Blur the colour channels of `target` in place
    ///
    /// `radius` is the Gaussian standard deviation in pixels.
    fn blur(&mut self, target: &mut Canvas, radius: f32) -> MediaResult<()> {
        target.gaussian_blur(radius);
        Ok(())
    }

    /// Textures currently alive
    fn live_textures(&self) -> usize;
}

/// CPU render backend
#[derive(Debug)]
pub struct SoftwareBackend {
    allocator: TextureAllocator,
    max_texture_size: u32,
}

impl SoftwareBackend {
    /// Largest texture edge accepted by default
    pub const DEFAULT_MAX_TEXTURE_SIZE: u32 = 8192;

    pub fn new() -> Self {
        Self::with_max_texture_size(Self::DEFAULT_MAX_TEXTURE_SIZE)
    }

    /// Backend that refuses textures with an edge longer than `max_texture_size`
    pub fn with_max_texture_size(max_texture_size: u32) -> Self {
        Self {
            allocator: TextureAllocator::new(),
            max_texture_size,
        }
    }

    fn convert(frame: &VideoFrame) -> MediaResult<Bytes> {
        let (w, h) = (frame.width as usize, frame.height as usize);
        match frame.format {
            PixelFormat::Rgba => Ok(frame.data.slice(0..w * h * 4)),
            PixelFormat::Bgra => {
                let mut out = Vec::with_capacity(w * h * 4);
                for px in frame.data[..w * h * 4].chunks_exact(4) {
                    out.extend_from_slice(&[px[2], px[1], px[0], px[3]]);
                }
                Ok(Bytes::from(out))
            }
            PixelFormat::I420 => {
                let chroma_w = w.div_ceil(2);
                let chroma_len = chroma_w * h.div_ceil(2);
                let (y_plane, rest) = frame.data.split_at(w * h);
                let (u_plane, v_plane) = rest.split_at(chroma_len);
                Ok(yuv_to_rgba(w, h, |x, y| {
                    let c = (y / 2) * chroma_w + x / 2;
                    (y_plane[y * w + x], u_plane[c], v_plane[c])
                }))
            }
            PixelFormat::Nv12 => {
                let chroma_w = w.div_ceil(2);
                let (y_plane, uv_plane) = frame.data.split_at(w * h);
                Ok(yuv_to_rgba(w, h, |x, y| {
                    let c = ((y / 2) * chroma_w + x / 2) * 2;
                    (y_plane[y * w + x], uv_plane[c], uv_plane[c + 1])
                }))
            }
            PixelFormat::Mjpeg | PixelFormat::H264 => Err(MediaError::UnsupportedFormat {
                format: frame.format.to_string(),
            }),
        }
    }

    fn draw(target: &mut Canvas, draw: &DrawCommand) {
        let clip = Rect::new(
            draw.placement.x.min(target.width),
            draw.placement.y.min(target.height),
            draw.placement.width,
            draw.placement.height,
        );
        let clip_right = clip.right().min(target.width);
        let clip_bottom = clip.bottom().min(target.height);
        if clip.is_empty() || clip_right <= clip.x || clip_bottom <= clip.y {
            return;
        }

        let (extent_x, extent_y) = draw.vertices.extent();
        let rect_w = draw.placement.width as f32;
        let rect_h = draw.placement.height as f32;
        let quad_x0 = draw.placement.x as f32 + (1.0 - extent_x) / 2.0 * rect_w;
        let quad_x1 = draw.placement.x as f32 + (1.0 + extent_x) / 2.0 * rect_w;
        let quad_y0 = draw.placement.y as f32 + (1.0 - extent_y) / 2.0 * rect_h;
        let quad_y1 = draw.placement.y as f32 + (1.0 + extent_y) / 2.0 * rect_h;
        let quad_w = quad_x1 - quad_x0;
        let quad_h = quad_y1 - quad_y0;
        if quad_w <= 0.0 || quad_h <= 0.0 {
            return;
        }

        let (bl, br, tl, tr) = (
            draw.vertices.tex_coord(0),
            draw.vertices.tex_coord(1),
            draw.vertices.tex_coord(2),
            draw.vertices.tex_coord(3),
        );
        let tex_w = draw.texture.width() as f32;
        let tex_h = draw.texture.height() as f32;

        let y_start = (quad_y0.floor().max(0.0) as u32).max(clip.y);
        let y_end = (quad_y1.ceil().max(0.0) as u32).min(clip_bottom);
        let x_start = (quad_x0.floor().max(0.0) as u32).max(clip.x);
        let x_end = (quad_x1.ceil().max(0.0) as u32).min(clip_right);

        for py in y_start..y_end {
            let t = (py as f32 + 0.5 - quad_y0) / quad_h;
            if !(0.0..=1.0).contains(&t) {
                continue;
            }
            for px in x_start..x_end {
                let s = (px as f32 + 0.5 - quad_x0) / quad_w;
                if !(0.0..=1.0).contains(&s) {
                    continue;
                }
                let top = lerp2(tl, tr, s);
                let bottom = lerp2(bl, br, s);
                let (u, v) = lerp2(top, bottom, t);
                let tx = (u * tex_w).floor().max(0.0) as u32;
                let ty = (v * tex_h).floor().max(0.0) as u32;
                target.blend(px, py, draw.texture.texel(tx, ty));
            }
        }
    }
}

impl Default for SoftwareBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl RenderBackend for SoftwareBackend {
    fn name(&self) -> &'static str {
        "software"
    }

    fn upload(&mut self, frame: &VideoFrame) -> MediaResult<Texture> {
        frame.validate()?;
        if frame.width > self.max_texture_size || frame.height > self.max_texture_size {
            return Err(MediaError::MemoryAllocationFailed {
                size: frame.width as usize * frame.height as usize * 4,
            });
        }
        let pixels = Self::convert(frame)?;
        let texture = self.allocator.allocate(frame.width, frame.height, pixels);
        debug!(
            "Uploaded {} frame {}x{} as texture {:?}",
            frame.format,
            frame.width,
            frame.height,
            texture.id()
        );
        Ok(texture)
    }

    fn composite(
        &mut self,
        target: &mut Canvas,
        background: [u8; 4],
        draws: &[DrawCommand],
    ) -> MediaResult<()> {
        target.clear(background);
        for draw in draws {
            Self::draw(target, draw);
        }
        Ok(())
    }

    fn live_textures(&self) -> usize {
        self.allocator.live()
    }
}

/// One-sided normalised Gaussian weights, centre tap first
fn gaussian_kernel(radius: f32) -> Vec<f32> {
    if radius.is_nan() {
        return vec![1.0];
    }
    let sigma = radius.min(MAX_BLUR_RADIUS).round();
    if sigma < 1.0 {
        return vec![1.0];
    }
    let sigma = sigma as f64;
    let variance = sigma * sigma;
    let edge = BLUR_EDGE_WEIGHT * (2.0 * PI * variance).sqrt();
    let mut radius = (-2.0 * variance * edge.ln()).sqrt().floor() as usize;
    radius += radius % 2;

    let weights: Vec<f64> = (0..=radius)
        .map(|i| (-((i * i) as f64) / (2.0 * variance)).exp())
        .collect();
    let total = weights[0] + 2.0 * weights[1..].iter().sum::<f64>();
    weights.iter().map(|w| (w / total) as f32).collect()
}

fn blur_pass(src: &[u8], dst: &mut [u8], width: usize, height: usize, kernel: &[f32], horizontal: bool) {
    let radius = kernel.len() as isize - 1;
    let (max_x, max_y) = (width as isize - 1, height as isize - 1);
    for y in 0..height {
        for x in 0..width {
            let mut sum = [0.0f32; 3];
            for tap in -radius..=radius {
                let (sx, sy) = if horizontal {
                    ((x as isize + tap).clamp(0, max_x) as usize, y)
                } else {
                    (x, (y as isize + tap).clamp(0, max_y) as usize)
                };
                let weight = kernel[tap.unsigned_abs()];
                let offset = (sy * width + sx) * 4;
                for (channel, acc) in sum.iter_mut().enumerate() {
                    *acc += src[offset + channel] as f32 * weight;
                }
            }
            let offset = (y * width + x) * 4;
            for (channel, acc) in sum.iter().enumerate() {
                dst[offset + channel] = acc.round().clamp(0.0, 255.0) as u8;
            }
            dst[offset + 3] = src[offset + 3];
        }
    }
}

fn lerp2(a: (f32, f32), b: (f32, f32), t: f32) -> (f32, f32) {
    (a.0 + (b.0 - a.0) * t, a.1 + (b.1 - a.1) * t)
}

/// BT.601 limited-range YUV to RGBA
fn yuv_to_rgba(width: usize, height: usize, sample: impl Fn(usize, usize) -> (u8, u8, u8)) -> Bytes {
    let mut out = Vec::with_capacity(width * height * 4);
    for y in 0..height {
        for x in 0..width {
            let (luma, cb, cr) = sample(x, y);
            let c = luma as i32 - 16;
            let d = cb as i32 - 128;
            let e = cr as i32 - 128;
            let r = (298 * c + 409 * e + 128) >> 8;
            let g = (298 * c - 100 * d - 208 * e + 128) >> 8;
            let b = (298 * c + 516 * d + 128) >> 8;
            out.extend_from_slice(&[
                r.clamp(0, 255) as u8,
                g.clamp(0, 255) as u8,
                b.clamp(0, 255) as u8,
                255,
            ]);
        }
    }
    Bytes::from(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::{cube_vertex_data, ObjectFit, RotationMode};

    #[test]
    fn test_rgba_upload_is_zero_copy() {
        let mut backend = SoftwareBackend::new();
        let frame = VideoFrame::solid(4, 4, [10, 20, 30, 255]);
        let texture = backend.upload(&frame).unwrap();
        assert_eq!(texture.pixels().as_ptr(), frame.data.as_ptr());
        assert_eq!(backend.live_textures(), 1);
        drop(texture);
        assert_eq!(backend.live_textures(), 0);
    }

    #[test]
    fn test_bgra_swizzle() {
        let mut backend = SoftwareBackend::new();
        let frame = VideoFrame::new(1, 1, PixelFormat::Bgra, vec![1u8, 2, 3, 4]);
        let texture = backend.upload(&frame).unwrap();
        assert_eq!(texture.texel(0, 0), [3, 2, 1, 4]);
    }

    #[test]
    fn test_i420_grey_conversion() {
        let mut backend = SoftwareBackend::new();
        // Y=126, U=V=128 is mid grey
        let mut data = vec![126u8; 4];
        data.extend_from_slice(&[128, 128]);
        let frame = VideoFrame::new(2, 2, PixelFormat::I420, data);
        let texture = backend.upload(&frame).unwrap();
        let [r, g, b, a] = texture.texel(1, 1);
        assert_eq!(a, 255);
        assert_eq!(r, g);
        assert_eq!(g, b);
        assert!((120..=135).contains(&r));
    }

    #[test]
    fn test_compressed_upload_rejected() {
        let mut backend = SoftwareBackend::new();
        let frame = VideoFrame::new(16, 16, PixelFormat::Mjpeg, vec![0u8; 64]);
        assert!(matches!(
            backend.upload(&frame),
            Err(MediaError::UnsupportedFormat { .. })
        ));
        assert_eq!(backend.live_textures(), 0);
    }

    #[test]
    fn test_oversized_upload_rejected() {
        let mut backend = SoftwareBackend::with_max_texture_size(8);
        let frame = VideoFrame::solid(16, 4, [0, 0, 0, 255]);
        assert!(matches!(
            backend.upload(&frame),
            Err(MediaError::MemoryAllocationFailed { .. })
        ));
    }

    #[test]
    fn test_composite_letterboxes_with_background() {
        let mut backend = SoftwareBackend::new();
        let texture = backend
            .upload(&VideoFrame::solid(200, 100, [255, 0, 0, 255]))
            .unwrap();
        let mut canvas = Canvas::new(VideoResolution::new(100, 100));
        let vertices = cube_vertex_data(200.0, 100.0, RotationMode::NoRotation, ObjectFit::Contain, 100.0, 100.0);
        let draw = DrawCommand {
            texture,
            placement: Rect::new(0, 0, 100, 100),
            vertices,
        };
        backend
            .composite(&mut canvas, [0, 0, 255, 255], &[draw])
            .unwrap();

        // 2:1 frame in a square: bands of 25 px top and bottom
        assert_eq!(canvas.pixel(50, 10), [0, 0, 255, 255]);
        assert_eq!(canvas.pixel(50, 50), [255, 0, 0, 255]);
        assert_eq!(canvas.pixel(50, 90), [0, 0, 255, 255]);
    }

    #[test]
    fn test_composite_respects_rotation() {
        let mut backend = SoftwareBackend::new();
        // 2x1 texture: left texel red, right texel green
        let frame = VideoFrame::new(2, 1, PixelFormat::Rgba, vec![255u8, 0, 0, 255, 0, 255, 0, 255]);
        let texture = backend.upload(&frame).unwrap();
        let mut canvas = Canvas::new(VideoResolution::new(10, 20));
        let vertices = cube_vertex_data(2.0, 1.0, RotationMode::RotateRight, ObjectFit::Contain, 10.0, 20.0);
        backend
            .composite(
                &mut canvas,
                [0, 0, 0, 255],
                &[DrawCommand {
                    texture,
                    placement: Rect::new(0, 0, 10, 20),
                    vertices,
                }],
            )
            .unwrap();

        // a clockwise quarter turn moves the left edge to the top
        assert_eq!(canvas.pixel(5, 2), [255, 0, 0, 255]);
        assert_eq!(canvas.pixel(5, 17), [0, 255, 0, 255]);
    }

    #[test]
    fn test_gaussian_kernel_is_normalised() {
        let kernel = gaussian_kernel(2.0);
        // taps stop below 1/256, radius rounded up to even
        assert_eq!(kernel.len(), 7);
        let total = kernel[0] + 2.0 * kernel[1..].iter().sum::<f32>();
        assert!((total - 1.0).abs() < 1e-4);
        assert!(kernel.windows(2).all(|pair| pair[0] > pair[1]));

        assert_eq!(gaussian_kernel(0.4), vec![1.0]);
        assert_eq!(gaussian_kernel(f32::NAN), vec![1.0]);
    }

    #[test]
    fn test_blur_softens_edges_only() {
        let mut canvas = Canvas::new(VideoResolution::new(16, 2));
        for y in 0..2 {
            for x in 0..16 {
                let color = if x < 8 { [255, 0, 0, 255] } else { [0, 0, 255, 255] };
                canvas.blend(x, y, color);
            }
        }
        canvas.gaussian_blur(2.0);

        assert_eq!(canvas.pixel(0, 0), [255, 0, 0, 255]);
        assert_eq!(canvas.pixel(15, 1), [0, 0, 255, 255]);
        for x in [7, 8] {
            let [r, g, b, a] = canvas.pixel(x, 0);
            assert!(r > 0 && r < 255, "x={} r={}", x, r);
            assert!(b > 0 && b < 255, "x={} b={}", x, b);
            assert_eq!(g, 0);
            assert_eq!(a, 255);
        }
        assert_eq!(canvas.pixel(7, 0), canvas.pixel(7, 1));
    }

    #[test]
    fn test_blur_keeps_flat_colour_and_alpha() {
        let mut canvas = Canvas::new(VideoResolution::new(12, 12));
        canvas.clear([40, 80, 120, 200]);
        let before = canvas.pixels().to_vec();
        canvas.gaussian_blur(3.0);
        assert_eq!(canvas.pixels(), &before[..]);

        canvas.gaussian_blur(0.0);
        assert_eq!(canvas.pixels(), &before[..]);
    }

    #[test]
    fn test_blend_half_alpha() {
        let mut canvas = Canvas::new(VideoResolution::new(1, 1));
        canvas.clear([0, 0, 0, 255]);
        canvas.blend(0, 0, [255, 255, 255, 128]);
        let [r, _, _, a] = canvas.pixel(0, 0);
        assert!((127..=129).contains(&r));
        assert_eq!(a, 255);
    }
}
