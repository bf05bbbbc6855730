//! Pointer input delivered by the host.

use kurbo::Point;
use serde::{Deserialize, Serialize};

/// Device class of a pointer stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PointerKind {
    Pen,
    Touch,
    Mouse,
}

impl PointerKind {
    /// Parse a DOM-style `pointerType` string. Unknown kinds are treated as mouse.
    pub fn from_pointer_type(s: &str) -> Self {
        match s {
            "pen" => PointerKind::Pen,
            "touch" => PointerKind::Touch,
            _ => PointerKind::Mouse,
        }
    }
}

/// One pointer sample in container coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PointerInput {
    /// Host-assigned id, stable for the lifetime of one contact.
    pub pointer_id: u64,
    pub kind: PointerKind,
    /// Position relative to the drawing surface, in container pixels.
    pub position: Point,
    /// Device pressure, if reported.
    pub pressure: Option<f64>,
    /// Event time in milliseconds since the UNIX epoch.
    pub timestamp_ms: i64,
}

impl PointerInput {
    pub fn new(pointer_id: u64, kind: PointerKind, position: Point, timestamp_ms: i64) -> Self {
        Self {
            pointer_id,
            kind,
            position,
            pressure: None,
            timestamp_ms,
        }
    }

    pub fn with_pressure(mut self, pressure: f64) -> Self {
        self.pressure = Some(pressure);
        self
    }

    /// Same contact moved to `position` at `timestamp_ms`.
    pub fn moved_to(mut self, position: Point, timestamp_ms: i64) -> Self {
        self.position = position;
        self.timestamp_ms = timestamp_ms;
        self
    }
}
