//! Painting seam between the ink core and a rendering backend.
//!
//! The core describes what a layer looks like through the [`Painter`] trait;
//! backends (a vello scene, a CPU pixmap) decide how it reaches pixels.

use crate::outline::stroke_path;
use crate::stroke::{InkPoint, InkTool, Stroke, parse_hex_color, with_opacity};
use kurbo::{Affine, BezPath, Point, Rect, Vec2};
use peniko::Color;

/// Drop shadow drawn beneath a filled rectangle.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Shadow {
    pub color: Color,
    /// Blur radius in the painter's user space.
    pub blur: f64,
    pub offset: Vec2,
}

/// Drawing operations a render layer needs.
///
/// All geometry is in user space; `transform` maps it to device pixels.
pub trait Painter {
    /// Clear the layer to transparent.
    fn clear(&mut self);

    /// Fill a closed path with the non-zero rule.
    fn fill_path(&mut self, transform: Affine, path: &BezPath, color: Color);

    /// Fill an axis-aligned rectangle, optionally with a drop shadow beneath it.
    fn fill_rect(&mut self, transform: Affine, rect: Rect, color: Color, shadow: Option<Shadow>);

    /// Outline a circle with a line of the given width.
    fn stroke_circle(&mut self, transform: Affine, center: Point, radius: f64, width: f64, color: Color);

    /// Fill many equal circles in one call.
    fn fill_circles(&mut self, transform: Affine, centers: &[Point], radius: f64, color: Color);

    /// Draw a single line of text with its top-left corner at `origin`.
    fn draw_text(&mut self, transform: Affine, origin: Point, text: &str, font_size: f64, color: Color);
}

/// A recorded painter call.
#[derive(Debug, Clone, PartialEq)]
pub enum PaintOp {
    Clear,
    FillPath {
        transform: Affine,
        path: BezPath,
        color: Color,
    },
    FillRect {
        transform: Affine,
        rect: Rect,
        color: Color,
        shadow: Option<Shadow>,
    },
    StrokeCircle {
        transform: Affine,
        center: Point,
        radius: f64,
        width: f64,
        color: Color,
    },
    FillCircles {
        transform: Affine,
        centers: Vec<Point>,
        radius: f64,
        color: Color,
    },
    Text {
        transform: Affine,
        origin: Point,
        text: String,
        font_size: f64,
        color: Color,
    },
}

/// Painter that records every call as a [`PaintOp`].
///
/// Useful for display-list style hosts and for asserting what a layer drew.
#[derive(Debug, Default, Clone)]
pub struct PaintRecorder {
    pub ops: Vec<PaintOp>,
}

impl PaintRecorder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn take(&mut self) -> Vec<PaintOp> {
        std::mem::take(&mut self.ops)
    }

    pub fn fill_path_count(&self) -> usize {
        self.ops
            .iter()
            .filter(|op| matches!(op, PaintOp::FillPath { .. }))
            .count()
    }

    pub fn texts(&self) -> Vec<&str> {
        self.ops
            .iter()
            .filter_map(|op| match op {
                PaintOp::Text { text, .. } => Some(text.as_str()),
                _ => None,
            })
            .collect()
    }
}

impl Painter for PaintRecorder {
    fn clear(&mut self) {
        self.ops.push(PaintOp::Clear);
    }

    fn fill_path(&mut self, transform: Affine, path: &BezPath, color: Color) {
        self.ops.push(PaintOp::FillPath {
            transform,
            path: path.clone(),
            color,
        });
    }

    fn fill_rect(&mut self, transform: Affine, rect: Rect, color: Color, shadow: Option<Shadow>) {
        self.ops.push(PaintOp::FillRect {
            transform,
            rect,
            color,
            shadow,
        });
    }

    fn stroke_circle(&mut self, transform: Affine, center: Point, radius: f64, width: f64, color: Color) {
        self.ops.push(PaintOp::StrokeCircle {
            transform,
            center,
            radius,
            width,
            color,
        });
    }

    fn fill_circles(&mut self, transform: Affine, centers: &[Point], radius: f64, color: Color) {
        self.ops.push(PaintOp::FillCircles {
            transform,
            centers: centers.to_vec(),
            radius,
            color,
        });
    }

    fn draw_text(&mut self, transform: Affine, origin: Point, text: &str, font_size: f64, color: Color) {
        self.ops.push(PaintOp::Text {
            transform,
            origin,
            text: text.to_string(),
            font_size,
            color,
        });
    }
}

/// Paint raw points with brush parameters. Returns whether anything was drawn.
pub fn paint_points(
    painter: &mut dyn Painter,
    transform: Affine,
    points: &[InkPoint],
    tool: InkTool,
    base_size: f64,
    color: &str,
    opacity: f64,
) -> bool {
    let Some(path) = stroke_path(points, tool, base_size) else {
        return false;
    };
    let color = with_opacity(parse_hex_color(color), tool.effective_opacity(opacity));
    painter.fill_path(transform, &path, color);
    true
}

/// Paint a committed stroke. Strokes with fewer than two points paint nothing.
pub fn paint_stroke(painter: &mut dyn Painter, transform: Affine, stroke: &Stroke) -> bool {
    paint_points(
        painter,
        transform,
        &stroke.points,
        stroke.tool,
        stroke.base_size,
        &stroke.color,
        stroke.opacity,
    )
}

/// Coalesces repaint requests for one layer into at most one pending frame.
#[derive(Debug, Default)]
pub struct RepaintGate {
    pending: bool,
}

impl RepaintGate {
    pub fn new() -> Self {
        Self::default()
    }

    /// Mark the layer dirty. Returns `true` only when no frame was pending yet,
    /// i.e. when the caller should schedule one.
    pub fn invalidate(&mut self) -> bool {
        !std::mem::replace(&mut self.pending, true)
    }

    /// Consume the pending flag. Returns whether the layer must repaint.
    pub fn take(&mut self) -> bool {
        std::mem::take(&mut self.pending)
    }

    pub fn is_pending(&self) -> bool {
        self.pending
    }
}
