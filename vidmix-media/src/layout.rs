//! Placement of tracks inside the composite canvas
//!
//! Layout is an external collaborator of the Track Renderer: a strategy decides
//! where each slot goes, the renderer only fits its texture into that rectangle.

use crate::geometry::Rect;
use crate::tracks::VideoResolution;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

/// Position of one track among the tracks drawn in a tick
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct LayoutSlot {
    /// Zero-based index in draw order
    pub index: usize,
    /// Number of tracks drawn this tick
    pub count: usize,
}

impl LayoutSlot {
    pub fn new(index: usize, count: usize) -> Self {
        Self { index, count }
    }
}

/// Maps layout slots to placement rectangles
pub trait LayoutStrategy: Send + Sync + fmt::Debug {
    /// Strategy name for logging
    fn name(&self) -> &'static str;

    /// Placement rectangle of `slot` inside `canvas`
    fn place(&self, canvas: VideoResolution, slot: LayoutSlot) -> Rect;
}

/// Equal-width, full-height columns in draw order; a single track fills the canvas
#[derive(Debug, Clone, Copy, Default)]
pub struct SideBySide;

impl LayoutStrategy for SideBySide {
    fn name(&self) -> &'static str {
        "side-by-side"
    }

    fn place(&self, canvas: VideoResolution, slot: LayoutSlot) -> Rect {
        let count = slot.count.max(1) as u32;
        let index = (slot.index as u32).min(count - 1);
        let column = canvas.width / count;
        let x = column * index;
        // last column absorbs the rounding remainder
        let width = if index == count - 1 {
            canvas.width - x
        } else {
            column
        };
        Rect::new(x, 0, width, canvas.height)
    }
}

/// Near-square grid, filled row by row
#[derive(Debug, Clone, Copy, Default)]
pub struct Grid {
    /// Fixed column count; `None` picks `ceil(sqrt(count))`
    pub columns: Option<usize>,
}

impl Grid {
    fn dimensions(&self, count: usize) -> (u32, u32) {
        let count = count.max(1);
        let columns = self
            .columns
            .filter(|c| *c > 0)
            .unwrap_or_else(|| (count as f64).sqrt().ceil() as usize);
        let rows = count.div_ceil(columns);
        (columns as u32, rows as u32)
    }
}

impl LayoutStrategy for Grid {
    fn name(&self) -> &'static str {
        "grid"
    }

    fn place(&self, canvas: VideoResolution, slot: LayoutSlot) -> Rect {
        let (columns, rows) = self.dimensions(slot.count);
        let index = slot.index as u32;
        let column = index % columns;
        let row = (index / columns).min(rows - 1);
        let cell_w = canvas.width / columns;
        let cell_h = canvas.height / rows;
        Rect::new(column * cell_w, row * cell_h, cell_w, cell_h)
    }
}

/// First track fills the canvas, the others float as insets along the bottom edge
#[derive(Debug, Clone, Copy)]
pub struct PictureInPicture {
    /// Inset size as a fraction of the canvas
    pub inset_scale: f32,
    /// Gap between insets and the canvas edge, in pixels
    pub margin: u32,
}

impl Default for PictureInPicture {
    fn default() -> Self {
        Self {
            inset_scale: 0.25,
            margin: 16,
        }
    }
}

impl LayoutStrategy for PictureInPicture {
    fn name(&self) -> &'static str {
        "picture-in-picture"
    }

    fn place(&self, canvas: VideoResolution, slot: LayoutSlot) -> Rect {
        if slot.index == 0 {
            return Rect::new(0, 0, canvas.width, canvas.height);
        }
        let scale = self.inset_scale.clamp(0.05, 1.0);
        let inset_w = (canvas.width as f32 * scale) as u32;
        let inset_h = (canvas.height as f32 * scale) as u32;
        // insets stack right to left from the bottom-right corner
        let offset = slot.index as u32;
        let right = canvas
            .width
            .saturating_sub(self.margin + (offset - 1) * (inset_w + self.margin));
        let x = right.saturating_sub(inset_w);
        let y = canvas.height.saturating_sub(self.margin + inset_h);
        Rect::new(x, y, right - x, inset_h)
    }
}

/// Serialisable choice of built-in layout
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum LayoutKind {
    #[default]
    SideBySide,
    Grid,
    PictureInPicture,
}

impl LayoutKind {
    pub fn strategy(&self) -> Arc<dyn LayoutStrategy> {
        match self {
            LayoutKind::SideBySide => Arc::new(SideBySide),
            LayoutKind::Grid => Arc::new(Grid::default()),
            LayoutKind::PictureInPicture => Arc::new(PictureInPicture::default()),
        }
    }
}
