//! Stroke records, ids and brushes.

use crate::geometry::BoundingBox;
use peniko::Color;
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

macro_rules! string_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub String);

        impl $name {
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<&str> for $name {
            fn from(value: &str) -> Self {
                Self(value.to_string())
            }
        }

        impl From<String> for $name {
            fn from(value: String) -> Self {
                Self(value)
            }
        }
    };
}

string_id!(
    /// Unique identifier of a stroke.
    StrokeId
);
string_id!(
    /// Study session the ink was drawn in.
    SessionId
);
string_id!(
    /// Background document (page) the ink sits on.
    DocumentId
);
string_id!(
    /// Unit of work a stroke is grouped under.
    AttemptId
);

impl StrokeId {
    /// Fresh random id.
    pub fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }
}

/// Pressure used when the input device does not report one.
pub const DEFAULT_PRESSURE: f64 = 0.5;

/// A sampled input point in world coordinates.
///
/// Serialized as the 4-element array `[x, y, pressure, t]`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(from = "[f64; 4]", into = "[f64; 4]")]
pub struct InkPoint {
    pub x: f64,
    pub y: f64,
    /// Pressure in `[0, 1]`.
    pub pressure: f64,
    /// Sample time in milliseconds.
    pub t: i64,
}

impl InkPoint {
    pub fn new(x: f64, y: f64, pressure: f64, t: i64) -> Self {
        Self { x, y, pressure, t }
    }

    /// Normalize a device pressure reading. Missing, zero or non-finite
    /// readings fall back to [`DEFAULT_PRESSURE`].
    pub fn normalize_pressure(pressure: Option<f64>) -> f64 {
        match pressure {
            Some(p) if p.is_finite() && p > 0.0 => p.min(1.0),
            _ => DEFAULT_PRESSURE,
        }
    }

    pub fn position(&self) -> kurbo::Point {
        kurbo::Point::new(self.x, self.y)
    }
}

impl From<[f64; 4]> for InkPoint {
    fn from([x, y, pressure, t]: [f64; 4]) -> Self {
        Self { x, y, pressure, t: t as i64 }
    }
}

impl From<InkPoint> for [f64; 4] {
    fn from(p: InkPoint) -> Self {
        [p.x, p.y, p.pressure, p.t as f64]
    }
}

/// Drawing tool stored on a stroke.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InkTool {
    #[default]
    Pencil,
    Pen,
    Marker,
}

impl InkTool {
    pub fn name(self) -> &'static str {
        match self {
            InkTool::Pencil => "pencil",
            InkTool::Pen => "pen",
            InkTool::Marker => "marker",
        }
    }

    /// Opacity actually used when painting. Markers are capped to emulate
    /// highlighter translucency.
    pub fn effective_opacity(self, opacity: f64) -> f64 {
        let opacity = opacity.clamp(0.0, 1.0);
        match self {
            InkTool::Marker => opacity.min(MARKER_MAX_OPACITY),
            InkTool::Pencil | InkTool::Pen => opacity,
        }
    }
}

/// Highest opacity a marker stroke is painted with.
pub const MARKER_MAX_OPACITY: f64 = 0.45;

/// Active brush: a drawing tool or the eraser gesture mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Brush {
    #[default]
    Pencil,
    Pen,
    Marker,
    Eraser,
}

impl Brush {
    /// The tool this brush draws with, or `None` for the eraser.
    pub fn tool(self) -> Option<InkTool> {
        match self {
            Brush::Pencil => Some(InkTool::Pencil),
            Brush::Pen => Some(InkTool::Pen),
            Brush::Marker => Some(InkTool::Marker),
            Brush::Eraser => None,
        }
    }

    pub fn is_eraser(self) -> bool {
        matches!(self, Brush::Eraser)
    }
}

impl From<InkTool> for Brush {
    fn from(tool: InkTool) -> Self {
        match tool {
            InkTool::Pencil => Brush::Pencil,
            InkTool::Pen => Brush::Pen,
            InkTool::Marker => Brush::Marker,
        }
    }
}

/// A committed freehand stroke.
///
/// `bbox` is stored alongside the points and always equals the tight box of
/// `points` at rest.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Stroke {
    pub id: StrokeId,
    pub session_id: SessionId,
    pub document_id: DocumentId,
    pub attempt_id: AttemptId,
    /// Creation time in milliseconds.
    pub created_at: i64,
    /// Last modification time in milliseconds.
    pub updated_at: i64,
    pub tool: InkTool,
    /// CSS hex color, e.g. `#111827`.
    pub color: String,
    pub opacity: f64,
    pub base_size: f64,
    pub points: Vec<InkPoint>,
    pub bbox: BoundingBox,
}

impl Stroke {
    /// Shift every point and the stored box by `(dx, dy)` and bump `updated_at`.
    pub fn translate(&mut self, dx: f64, dy: f64, now_ms: i64) {
        for point in &mut self.points {
            point.x += dx;
            point.y += dy;
        }
        self.bbox = self.bbox.offset(dx, dy);
        self.updated_at = now_ms;
    }

    /// Parsed paint color (black when the stored string is not a hex color).
    pub fn paint_color(&self) -> Color {
        parse_hex_color(&self.color)
    }

    pub fn belongs_to(&self, attempt_id: &AttemptId) -> bool {
        &self.attempt_id == attempt_id
    }
}

/// Parse a CSS hex color (`#rgb`, `#rrggbb`, `#rrggbbaa`). Anything else is black.
pub fn parse_hex_color(color: &str) -> Color {
    if let Some(hex) = color.trim().strip_prefix('#') {
        let channel = |range: std::ops::Range<usize>| {
            hex.get(range).and_then(|h| u8::from_str_radix(h, 16).ok())
        };
        match hex.len() {
            3 => {
                if let (Some(r), Some(g), Some(b)) = (channel(0..1), channel(1..2), channel(2..3)) {
                    return Color::from_rgba8(r * 17, g * 17, b * 17, 255);
                }
            }
            6 => {
                if let (Some(r), Some(g), Some(b)) = (channel(0..2), channel(2..4), channel(4..6)) {
                    return Color::from_rgba8(r, g, b, 255);
                }
            }
            8 => {
                if let (Some(r), Some(g), Some(b), Some(a)) =
                    (channel(0..2), channel(2..4), channel(4..6), channel(6..8))
                {
                    return Color::from_rgba8(r, g, b, a);
                }
            }
            _ => {}
        }
    }

    log::debug!("Unparseable stroke color {:?}, using black", color);
    Color::from_rgba8(0, 0, 0, 255)
}

/// Scale a color's alpha by `opacity`.
pub fn with_opacity(color: Color, opacity: f64) -> Color {
    let rgba = color.to_rgba8();
    let alpha = (rgba.a as f64 * opacity.clamp(0.0, 1.0)).round() as u8;
    Color::from_rgba8(rgba.r, rgba.g, rgba.b, alpha)
}
