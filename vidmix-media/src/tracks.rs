//! Track abstractions and media frame types

use crate::error::{MediaError, MediaResult};
use bytes::Bytes;
use serde::{Deserialize, Serialize};

/// Supported pixel layouts of a decoded frame buffer
///
/// Buffers are tightly packed: no row padding, planes back to back.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PixelFormat {
    /// 8-bit RGBA, 4 bytes per pixel
    Rgba,
    /// 8-bit BGRA, 4 bytes per pixel
    Bgra,
    /// Planar YUV 4:2:0 (Y, U, V planes)
    I420,
    /// Semi-planar YUV 4:2:0 (Y plane, interleaved UV plane)
    Nv12,
    /// Motion JPEG (compressed)
    Mjpeg,
    /// H.264 access unit (compressed)
    H264,
}

impl PixelFormat {
    /// Whether the buffer holds compressed data
    pub fn is_compressed(&self) -> bool {
        matches!(self, PixelFormat::Mjpeg | PixelFormat::H264)
    }

    /// Expected byte length of a tightly packed buffer, `None` for compressed formats
    pub fn buffer_size(&self, width: u32, height: u32) -> Option<usize> {
        let (w, h) = (width as usize, height as usize);
        match self {
            PixelFormat::Rgba | PixelFormat::Bgra => Some(w * h * 4),
            PixelFormat::I420 | PixelFormat::Nv12 => {
                let chroma = w.div_ceil(2) * h.div_ceil(2);
                Some(w * h + chroma * 2)
            }
            PixelFormat::Mjpeg | PixelFormat::H264 => None,
        }
    }
}

impl std::fmt::Display for PixelFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            PixelFormat::Rgba => "RGBA",
            PixelFormat::Bgra => "BGRA",
            PixelFormat::I420 => "I420",
            PixelFormat::Nv12 => "NV12",
            PixelFormat::Mjpeg => "MJPEG",
            PixelFormat::H264 => "H264",
        };
        f.write_str(name)
    }
}

/// Video resolution information
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct VideoResolution {
    pub width: u32,
    pub height: u32,
}

impl VideoResolution {
    pub const fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    pub const HD: Self = Self::new(1280, 720);
    pub const FULL_HD: Self = Self::new(1920, 1080);
    pub const VGA: Self = Self::new(640, 480);

    pub fn pixel_count(&self) -> u32 {
        self.width * self.height
    }

    pub fn aspect_ratio(&self) -> f64 {
        self.width as f64 / self.height as f64
    }

    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }
}

/// Intrinsic clockwise rotation a frame needs before display
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum VideoRotation {
    #[default]
    Deg0,
    Deg90,
    Deg180,
    Deg270,
}

impl VideoRotation {
    /// All four rotations, in ascending order
    pub const ALL: [VideoRotation; 4] = [
        VideoRotation::Deg0,
        VideoRotation::Deg90,
        VideoRotation::Deg180,
        VideoRotation::Deg270,
    ];

    /// Parse a rotation in degrees (negative values and multiples of 360 are normalised)
    pub fn from_degrees(degrees: i32) -> Option<Self> {
        match degrees.rem_euclid(360) {
            0 => Some(VideoRotation::Deg0),
            90 => Some(VideoRotation::Deg90),
            180 => Some(VideoRotation::Deg180),
            270 => Some(VideoRotation::Deg270),
            _ => None,
        }
    }

    pub fn degrees(&self) -> u32 {
        match self {
            VideoRotation::Deg0 => 0,
            VideoRotation::Deg90 => 90,
            VideoRotation::Deg180 => 180,
            VideoRotation::Deg270 => 270,
        }
    }

    /// True for quarter turns, which swap the displayed width and height
    pub fn is_quarter_turn(&self) -> bool {
        matches!(self, VideoRotation::Deg90 | VideoRotation::Deg270)
    }
}

/// One decoded image
///
/// The pixel buffer is a reference-counted handle owned by the capture or decode
/// layer; cloning a frame never copies pixel data.
#[derive(Debug, Clone)]
pub struct VideoFrame {
    /// Frame width in pixels
    pub width: u32,
    /// Frame height in pixels
    pub height: u32,
    /// Pixel layout of `data`
    pub format: PixelFormat,
    /// Pixel buffer
    pub data: Bytes,
    /// Capture timestamp in microseconds
    pub timestamp_us: u64,
    /// Rotation needed for upright display
    pub rotation: VideoRotation,
}

impl VideoFrame {
    /// Create a frame from a raw buffer
    pub fn new(width: u32, height: u32, format: PixelFormat, data: impl Into<Bytes>) -> Self {
        Self {
            width,
            height,
            format,
            data: data.into(),
            timestamp_us: 0,
            rotation: VideoRotation::Deg0,
        }
    }

    /// Create an RGBA frame filled with a single colour
    pub fn solid(width: u32, height: u32, rgba: [u8; 4]) -> Self {
        let pixels = (width as usize) * (height as usize);
        let data: Vec<u8> = rgba.iter().copied().cycle().take(pixels * 4).collect();
        Self::new(width, height, PixelFormat::Rgba, data)
    }

    /// Set the intrinsic rotation
    pub fn with_rotation(mut self, rotation: VideoRotation) -> Self {
        self.rotation = rotation;
        self
    }

    /// Set the capture timestamp
    pub fn with_timestamp(mut self, timestamp_us: u64) -> Self {
        self.timestamp_us = timestamp_us;
        self
    }

    pub fn resolution(&self) -> VideoResolution {
        VideoResolution::new(self.width, self.height)
    }

    /// Width after applying the intrinsic rotation
    pub fn rotated_width(&self) -> u32 {
        if self.rotation.is_quarter_turn() {
            self.height
        } else {
            self.width
        }
    }

    /// Height after applying the intrinsic rotation
    pub fn rotated_height(&self) -> u32 {
        if self.rotation.is_quarter_turn() {
            self.width
        } else {
            self.height
        }
    }

    /// Check buffer length against the declared format and dimensions
    pub fn validate(&self) -> MediaResult<()> {
        if self.width == 0 || self.height == 0 {
            return Err(MediaError::InvalidFrameData {
                expected: 1,
                actual: 0,
            });
        }
        match self.format.buffer_size(self.width, self.height) {
            Some(expected) if self.data.len() < expected => Err(MediaError::InvalidFrameData {
                expected,
                actual: self.data.len(),
            }),
            _ => Ok(()),
        }
    }
}

/// Audio frame representation
#[derive(Debug, Clone)]
pub struct AudioFrame {
    /// Audio samples (f32 PCM data)
    pub samples: Vec<f32>,
    /// Sample rate in Hz
    pub sample_rate: u32,
    /// Number of channels
    pub channels: u8,
    /// Timestamp in microseconds
    pub timestamp_us: u64,
}

/// A video source known to a compositor or view
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Track {
    /// Track ID
    pub id: String,
    /// Whether the track arrives from a remote peer
    pub remote: bool,
    /// Display label
    pub label: String,
    /// Whether the track takes part in compositing
    pub enabled: bool,
}

impl Track {
    /// Create new video track
    pub fn new(id: impl Into<String>, remote: bool, label: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            remote,
            label: label.into(),
            enabled: true,
        }
    }

    /// Create a local (camera / screen) track
    pub fn local(id: impl Into<String>, label: impl Into<String>) -> Self {
        Self::new(id, false, label)
    }

    /// Create a remote track
    pub fn remote(id: impl Into<String>, label: impl Into<String>) -> Self {
        Self::new(id, true, label)
    }

    /// Get track ID
    pub fn id(&self) -> &str {
        &self.id
    }
}
