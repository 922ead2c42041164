//! Geometry Engine
//!
//! Pure, stateless functions that turn a frame's size and orientation into the
//! vertex and texture coordinates of one textured quad:
//! - rotation-aware texture coordinates (one fixed permutation per [`RotationMode`])
//! - crop windows and centred scaling of those coordinates
//! - `contain` / `cover` object fit against a destination rectangle
//!
//! Conventions: quads are drawn as a four-vertex triangle strip in the order
//! bottom-left, bottom-right, top-left, top-right. Vertex positions live in
//! normalised device space (`[-1, 1]`, y up); texture coordinates live in
//! `[0, 1]` with the origin at the top-left texel (y down).

use crate::error::{CropAxis, MediaError, MediaResult};
use crate::tracks::VideoRotation;
use serde::{Deserialize, Serialize};

/// How a texture is oriented onto its quad
///
/// Compound variants apply the flip in texture space after the rotation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RotationMode {
    NoRotation,
    RotateLeft,
    RotateRight,
    FlipVertical,
    FlipHorizontal,
    RotateRightFlipVertical,
    RotateRightFlipHorizontal,
    RotateLeftFlipVertical,
    RotateLeftFlipHorizontal,
    Rotate180,
    Rotate270,
    Rotate270FlipVertical,
    Rotate270FlipHorizontal,
}

/// Texel coordinates per vertex, indexed by `RotationMode as usize`.
const TEXTURE_COORDINATES: [[f32; 8]; 13] = [
    // NoRotation
    [0.0, 1.0, 1.0, 1.0, 0.0, 0.0, 1.0, 0.0],
    // RotateLeft
    [0.0, 0.0, 0.0, 1.0, 1.0, 0.0, 1.0, 1.0],
    // RotateRight
    [1.0, 1.0, 1.0, 0.0, 0.0, 1.0, 0.0, 0.0],
    // FlipVertical
    [0.0, 0.0, 1.0, 0.0, 0.0, 1.0, 1.0, 1.0],
    // FlipHorizontal
    [1.0, 1.0, 0.0, 1.0, 1.0, 0.0, 0.0, 0.0],
    // RotateRightFlipVertical
    [1.0, 0.0, 1.0, 1.0, 0.0, 0.0, 0.0, 1.0],
    // RotateRightFlipHorizontal
    [0.0, 1.0, 0.0, 0.0, 1.0, 1.0, 1.0, 0.0],
    // RotateLeftFlipVertical
    [0.0, 1.0, 0.0, 0.0, 1.0, 1.0, 1.0, 0.0],
    // RotateLeftFlipHorizontal
    [1.0, 0.0, 1.0, 1.0, 0.0, 0.0, 0.0, 1.0],
    // Rotate180
    [1.0, 0.0, 0.0, 0.0, 1.0, 1.0, 0.0, 1.0],
    // Rotate270
    [0.0, 0.0, 0.0, 1.0, 1.0, 0.0, 1.0, 1.0],
    // Rotate270FlipVertical
    [0.0, 1.0, 0.0, 0.0, 1.0, 1.0, 1.0, 0.0],
    // Rotate270FlipHorizontal
    [1.0, 0.0, 1.0, 1.0, 0.0, 0.0, 0.0, 1.0],
];

impl RotationMode {
    /// Every rotation mode, in declaration order
    pub const ALL: [RotationMode; 13] = [
        RotationMode::NoRotation,
        RotationMode::RotateLeft,
        RotationMode::RotateRight,
        RotationMode::FlipVertical,
        RotationMode::FlipHorizontal,
        RotationMode::RotateRightFlipVertical,
        RotationMode::RotateRightFlipHorizontal,
        RotationMode::RotateLeftFlipVertical,
        RotationMode::RotateLeftFlipHorizontal,
        RotationMode::Rotate180,
        RotationMode::Rotate270,
        RotationMode::Rotate270FlipVertical,
        RotationMode::Rotate270FlipHorizontal,
    ];

    /// Whether the mode turns the texture a quarter turn
    pub fn swaps_dimensions(&self) -> bool {
        !matches!(
            self,
            RotationMode::NoRotation
                | RotationMode::FlipVertical
                | RotationMode::FlipHorizontal
                | RotationMode::Rotate180
        )
    }

    /// The mode that undoes this one
    pub fn inverse(&self) -> RotationMode {
        match self {
            RotationMode::RotateLeft | RotationMode::Rotate270 => RotationMode::RotateRight,
            RotationMode::RotateRight => RotationMode::RotateLeft,
            // Rotate180 and every mirror are involutions
            other => *other,
        }
    }

    /// Map a point of the upright quad (y down, `[0, 1]`) to the texel it samples
    pub fn transform_point(&self, x: f32, y: f32) -> (f32, f32) {
        match self {
            RotationMode::NoRotation => (x, y),
            RotationMode::FlipHorizontal => (1.0 - x, y),
            RotationMode::FlipVertical => (x, 1.0 - y),
            RotationMode::Rotate180 => (1.0 - x, 1.0 - y),
            RotationMode::RotateRight => (y, 1.0 - x),
            RotationMode::RotateLeft | RotationMode::Rotate270 => (1.0 - y, x),
            RotationMode::RotateRightFlipVertical
            | RotationMode::RotateLeftFlipHorizontal
            | RotationMode::Rotate270FlipHorizontal => (y, x),
            RotationMode::RotateRightFlipHorizontal
            | RotationMode::RotateLeftFlipVertical
            | RotationMode::Rotate270FlipVertical => (1.0 - y, 1.0 - x),
        }
    }
}

/// Derive the rotation mode for a frame
///
/// Front-facing sensors are mounted mirrored, so their quarter turns run the
/// other way. A mirror request flips the image horizontally on screen, which for
/// a rotated texture is a flip of the texture's other axis.
pub fn rotation_mode_for(
    rotation: VideoRotation,
    front_facing: bool,
    mirror: bool,
) -> RotationMode {
    match (rotation, front_facing, mirror) {
        (VideoRotation::Deg0, _, false) => RotationMode::NoRotation,
        (VideoRotation::Deg0, _, true) => RotationMode::FlipHorizontal,
        (VideoRotation::Deg90, false, false) => RotationMode::RotateRight,
        (VideoRotation::Deg90, false, true) => RotationMode::RotateRightFlipVertical,
        (VideoRotation::Deg90, true, false) => RotationMode::RotateLeft,
        (VideoRotation::Deg90, true, true) => RotationMode::RotateLeftFlipVertical,
        (VideoRotation::Deg180, _, false) => RotationMode::Rotate180,
        (VideoRotation::Deg180, _, true) => RotationMode::FlipVertical,
        (VideoRotation::Deg270, false, false) => RotationMode::Rotate270,
        (VideoRotation::Deg270, false, true) => RotationMode::Rotate270FlipVertical,
        (VideoRotation::Deg270, true, false) => RotationMode::RotateRight,
        (VideoRotation::Deg270, true, true) => RotationMode::RotateRightFlipVertical,
    }
}

/// Object-fit policy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum ObjectFit {
    /// Fit the whole frame inside the destination, letterboxing the rest
    #[default]
    Contain,
    /// Fill the destination, cropping the overflow symmetrically
    Cover,
    /// Stretch the frame to the destination, ignoring its aspect ratio
    Fill,
}

/// Crop window as fractions trimmed from each edge of the source texture
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct CropRect {
    pub left: f32,
    pub right: f32,
    pub top: f32,
    pub bottom: f32,
}

impl CropRect {
    /// No cropping
    pub const NONE: CropRect = CropRect {
        left: 0.0,
        right: 0.0,
        top: 0.0,
        bottom: 0.0,
    };

    /// Validated crop window
    ///
    /// Every fraction must lie in `[0, 1)` and each axis must keep a non-empty
    /// window.
    pub fn new(left: f32, right: f32, top: f32, bottom: f32) -> MediaResult<Self> {
        for value in [left, right, top, bottom] {
            if !(0.0..1.0).contains(&value) {
                return Err(MediaError::InvalidConfiguration {
                    message: format!("Crop fraction {} outside [0, 1)", value),
                });
            }
        }
        if left + right >= 1.0 {
            return Err(MediaError::DegenerateCrop {
                axis: CropAxis::Horizontal,
                sum: left + right,
            });
        }
        if top + bottom >= 1.0 {
            return Err(MediaError::DegenerateCrop {
                axis: CropAxis::Vertical,
                sum: top + bottom,
            });
        }
        Ok(Self {
            left,
            right,
            top,
            bottom,
        })
    }

    /// Fraction of the source width that stays visible
    pub fn width_fraction(&self) -> f32 {
        1.0 - self.left - self.right
    }

    /// Fraction of the source height that stays visible
    pub fn height_fraction(&self) -> f32 {
        1.0 - self.top - self.bottom
    }

    pub fn is_none(&self) -> bool {
        *self == CropRect::NONE
    }
}

/// Placement rectangle inside the output canvas, in pixels (origin top-left)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct Rect {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

impl Rect {
    pub const fn new(x: u32, y: u32, width: u32, height: u32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }

    pub fn right(&self) -> u32 {
        self.x + self.width
    }

    pub fn bottom(&self) -> u32 {
        self.y + self.height
    }
}

/// Texture coordinates for a rotation mode
pub fn texture_coordinates(mode: RotationMode) -> [f32; 8] {
    TEXTURE_COORDINATES[mode as usize]
}

/// Texture coordinates restricted to a crop window
///
/// Fractions summing to 1 or more on an axis produce an empty or inverted
/// window; callers are expected to go through [`CropRect::new`] first.
pub fn texture_coordinates_cropped(
    mode: RotationMode,
    crop_left: f32,
    crop_right: f32,
    crop_top: f32,
    crop_bottom: f32,
) -> [f32; 8] {
    window_coordinates(
        mode,
        crop_left,
        1.0 - crop_left - crop_right,
        crop_top,
        1.0 - crop_top - crop_bottom,
    )
}

/// Texture coordinates of a centred window covering the given fractions of each axis
pub fn texture_coordinates_scaled(
    mode: RotationMode,
    width_scaling: f32,
    height_scaling: f32,
) -> [f32; 8] {
    window_coordinates(
        mode,
        (1.0 - width_scaling) / 2.0,
        width_scaling,
        (1.0 - height_scaling) / 2.0,
        height_scaling,
    )
}

fn window_coordinates(mode: RotationMode, left: f32, width: f32, top: f32, height: f32) -> [f32; 8] {
    let mut coords = texture_coordinates(mode);
    for corner in coords.chunks_exact_mut(2) {
        corner[0] = left + corner[0] * width;
        corner[1] = top + corner[1] * height;
    }
    coords
}

/// Index of the identity corner sampled by each vertex of `mode`
pub fn corner_permutation(mode: RotationMode) -> [usize; 4] {
    let identity = texture_coordinates(RotationMode::NoRotation);
    let coords = texture_coordinates(mode);
    let mut permutation = [0usize; 4];
    for (vertex, slot) in permutation.iter_mut().enumerate() {
        let texel = (coords[vertex * 2], coords[vertex * 2 + 1]);
        *slot = (0..4)
            .find(|&corner| (identity[corner * 2], identity[corner * 2 + 1]) == texel)
            .unwrap_or(vertex);
    }
    permutation
}

/// Inverse of a corner permutation
pub fn inverse_permutation(permutation: [usize; 4]) -> [usize; 4] {
    let mut inverse = [0usize; 4];
    for (vertex, &corner) in permutation.iter().enumerate() {
        inverse[corner % 4] = vertex;
    }
    inverse
}

/// Reorder per-vertex coordinate pairs: output vertex `k` takes input vertex `permutation[k]`
pub fn apply_permutation(coords: [f32; 8], permutation: [usize; 4]) -> [f32; 8] {
    let mut out = [0.0f32; 8];
    for (vertex, &source) in permutation.iter().enumerate() {
        out[vertex * 2] = coords[source * 2];
        out[vertex * 2 + 1] = coords[source * 2 + 1];
    }
    out
}

/// Interleaved vertex data for one quad: four `(x, y, u, v)` vertices
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CubeVertexData(pub [f32; 16]);

impl CubeVertexData {
    /// Vertex position of vertex `index`
    pub fn position(&self, index: usize) -> (f32, f32) {
        (self.0[index * 4], self.0[index * 4 + 1])
    }

    /// Texture coordinate of vertex `index`
    pub fn tex_coord(&self, index: usize) -> (f32, f32) {
        (self.0[index * 4 + 2], self.0[index * 4 + 3])
    }

    /// Horizontal and vertical half-extent of the quad in device space
    pub fn extent(&self) -> (f32, f32) {
        let (x, y) = self.position(3);
        (x, y)
    }

    pub fn as_slice(&self) -> &[f32] {
        &self.0
    }
}

/// Vertex data for a frame fitted into a display rectangle
pub fn cube_vertex_data(
    frame_width: f32,
    frame_height: f32,
    rotation: RotationMode,
    object_fit: ObjectFit,
    display_width: f32,
    display_height: f32,
) -> CubeVertexData {
    cube_vertex_data_cropped(
        frame_width,
        frame_height,
        rotation,
        object_fit,
        display_width,
        display_height,
        &CropRect::NONE,
    )
}

/// Vertex data for the cropped part of a frame fitted into a display rectangle
pub fn cube_vertex_data_cropped(
    frame_width: f32,
    frame_height: f32,
    rotation: RotationMode,
    object_fit: ObjectFit,
    display_width: f32,
    display_height: f32,
    crop: &CropRect,
) -> CubeVertexData {
    let visible_width = frame_width * crop.width_fraction();
    let visible_height = frame_height * crop.height_fraction();
    let swaps = rotation.swaps_dimensions();
    let (rotated_width, rotated_height) = if swaps {
        (visible_height, visible_width)
    } else {
        (visible_width, visible_height)
    };

    // vertex scale, in display axes
    let (mut scale_x, mut scale_y) = (1.0f32, 1.0f32);
    // visible part of the source, in display axes
    let (mut visible_x, mut visible_y) = (1.0f32, 1.0f32);

    let usable = [rotated_width, rotated_height, display_width, display_height]
        .iter()
        .all(|v| v.is_finite() && *v > 0.0);
    if usable {
        let frame_aspect = rotated_width / rotated_height;
        let display_aspect = display_width / display_height;
        match object_fit {
            ObjectFit::Contain => {
                if frame_aspect > display_aspect {
                    scale_y = display_aspect / frame_aspect;
                } else if frame_aspect < display_aspect {
                    scale_x = frame_aspect / display_aspect;
                }
            }
            ObjectFit::Cover => {
                if frame_aspect > display_aspect {
                    visible_x = display_aspect / frame_aspect;
                } else if frame_aspect < display_aspect {
                    visible_y = frame_aspect / display_aspect;
                }
            }
            ObjectFit::Fill => {}
        }
    }

    let (width_scaling, height_scaling) = if swaps {
        (visible_y, visible_x)
    } else {
        (visible_x, visible_y)
    };
    let window_width = crop.width_fraction() * width_scaling;
    let window_height = crop.height_fraction() * height_scaling;
    let coords = window_coordinates(
        rotation,
        crop.left + (crop.width_fraction() - window_width) / 2.0,
        window_width,
        crop.top + (crop.height_fraction() - window_height) / 2.0,
        window_height,
    );

    let positions = [
        (-scale_x, -scale_y),
        (scale_x, -scale_y),
        (-scale_x, scale_y),
        (scale_x, scale_y),
    ];
    let mut buffer = [0.0f32; 16];
    for (vertex, (x, y)) in positions.iter().enumerate() {
        buffer[vertex * 4] = *x;
        buffer[vertex * 4 + 1] = *y;
        buffer[vertex * 4 + 2] = coords[vertex * 2];
        buffer[vertex * 4 + 3] = coords[vertex * 2 + 1];
    }
    CubeVertexData(buffer)
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Upright quad corners in vertex order (y down).
    const CORNERS: [(f32, f32); 4] = [(0.0, 1.0), (1.0, 1.0), (0.0, 0.0), (1.0, 0.0)];

    #[test]
    fn test_table_matches_point_transform() {
        for mode in RotationMode::ALL {
            let coords = texture_coordinates(mode);
            for (vertex, (x, y)) in CORNERS.iter().enumerate() {
                let (u, v) = mode.transform_point(*x, *y);
                assert_eq!(
                    (coords[vertex * 2], coords[vertex * 2 + 1]),
                    (u, v),
                    "{:?} vertex {}",
                    mode,
                    vertex
                );
            }
        }
    }

    #[test]
    fn test_inverse_mode_undoes_transform() {
        for mode in RotationMode::ALL {
            let inverse = mode.inverse();
            for (x, y) in CORNERS {
                let (ix, iy) = inverse.transform_point(x, y);
                assert_eq!(mode.transform_point(ix, iy), (x, y), "{:?}", mode);
            }
        }
    }

    #[test]
    fn test_swaps_dimensions() {
        assert!(!RotationMode::NoRotation.swaps_dimensions());
        assert!(!RotationMode::Rotate180.swaps_dimensions());
        assert!(RotationMode::RotateLeft.swaps_dimensions());
        assert!(RotationMode::Rotate270FlipHorizontal.swaps_dimensions());
    }

    #[test]
    fn test_crop_validation() {
        assert!(CropRect::new(0.1, 0.1, 0.2, 0.2).is_ok());
        assert!(matches!(
            CropRect::new(0.5, 0.5, 0.0, 0.0),
            Err(MediaError::DegenerateCrop {
                axis: CropAxis::Horizontal,
                ..
            })
        ));
        assert!(matches!(
            CropRect::new(0.0, 0.0, 0.7, 0.4),
            Err(MediaError::DegenerateCrop {
                axis: CropAxis::Vertical,
                ..
            })
        ));
        assert!(CropRect::new(-0.1, 0.0, 0.0, 0.0).is_err());
    }

    #[test]
    fn test_degenerate_crop_does_not_panic() {
        let coords = texture_coordinates_cropped(RotationMode::NoRotation, 0.6, 0.6, 0.0, 0.0);
        assert!(coords.iter().all(|c| c.is_finite()));
    }

    #[test]
    fn test_zero_sized_inputs_yield_full_quad() {
        let data = cube_vertex_data(0.0, 0.0, RotationMode::NoRotation, ObjectFit::Cover, 640.0, 480.0);
        assert_eq!(data.extent(), (1.0, 1.0));
        assert_eq!(data.tex_coord(2), (0.0, 0.0));
    }
}
