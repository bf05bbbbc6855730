//! Container-to-world transform for the ink layers.
//!
//! `world = (container - pan) / ratio`. The host owns pan and zoom; this module
//! only does the arithmetic, with the ratio clamped away from zero.

use kurbo::{Affine, Point, Rect, Size, Vec2};
use serde::{Deserialize, Serialize};

/// Smallest zoom ratio accepted before dividing.
pub const MIN_RATIO: f64 = 0.0001;

/// Clamp a zoom ratio away from zero. Non-finite input becomes `min_ratio`.
#[inline]
pub fn clamp_ratio(ratio: f64, min_ratio: f64) -> f64 {
    if ratio.is_finite() { ratio.max(min_ratio) } else { min_ratio }
}

/// Map a container point to world coordinates.
pub fn to_world_point(container: Point, pan: Vec2, ratio: f64, min_ratio: f64) -> Point {
    let r = clamp_ratio(ratio, min_ratio);
    Point::new((container.x - pan.x) / r, (container.y - pan.y) / r)
}

/// Convert a screen-pixel distance into world units at the given ratio.
pub fn min_dist_world(screen_px: f64, ratio: f64, min_ratio: f64) -> f64 {
    screen_px / clamp_ratio(ratio, min_ratio)
}

/// Pan offset and zoom ratio supplied by the host.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Viewport {
    /// Container-space offset of the world origin.
    pub pan: Vec2,
    /// World to container multiplier.
    pub ratio: f64,
    /// Lower bound applied to `ratio` before dividing.
    #[serde(default = "default_min_ratio")]
    pub min_ratio: f64,
}

fn default_min_ratio() -> f64 {
    MIN_RATIO
}

impl Default for Viewport {
    fn default() -> Self {
        Self {
            pan: Vec2::ZERO,
            ratio: 1.0,
            min_ratio: MIN_RATIO,
        }
    }
}

impl Viewport {
    pub fn new(pan: Vec2, ratio: f64) -> Self {
        Self {
            pan,
            ratio,
            min_ratio: MIN_RATIO,
        }
    }

    /// Use `min_ratio` as the zoom clamp. Values that are not positive keep
    /// [`MIN_RATIO`].
    pub fn with_min_ratio(mut self, min_ratio: f64) -> Self {
        self.min_ratio = if min_ratio.is_finite() && min_ratio > 0.0 {
            min_ratio
        } else {
            MIN_RATIO
        };
        self
    }

    /// Ratio safe to divide by.
    pub fn ratio(&self) -> f64 {
        clamp_ratio(self.ratio, self.min_ratio)
    }

    pub fn to_world(&self, container: Point) -> Point {
        to_world_point(container, self.pan, self.ratio, self.min_ratio)
    }

    pub fn to_container(&self, world: Point) -> Point {
        let r = self.ratio();
        Point::new(world.x * r + self.pan.x, world.y * r + self.pan.y)
    }

    /// World length of `screen_px` container pixels.
    pub fn screen_to_world_len(&self, screen_px: f64) -> f64 {
        min_dist_world(screen_px, self.ratio, self.min_ratio)
    }

    /// World to device-pixel transform for a layer backed at `dpr` pixels per
    /// container pixel.
    pub fn paint_transform(&self, dpr: f64) -> Affine {
        let s = dpr * self.ratio();
        Affine::new([s, 0.0, 0.0, s, dpr * self.pan.x, dpr * self.pan.y])
    }

    /// World-space rectangle visible in a container of the given size.
    pub fn visible_world_rect(&self, container: Size) -> Rect {
        let min = self.to_world(Point::ZERO);
        let max = self.to_world(Point::new(container.width, container.height));
        Rect::from_points(min, max)
    }
}

/// Tuning for [`grid_dots`].
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GridOptions {
    pub spacing_world: f64,
    pub base_dot_radius_world: f64,
    pub max_dots: usize,
}

impl Default for GridOptions {
    fn default() -> Self {
        Self {
            spacing_world: 24.0,
            base_dot_radius_world: 1.0,
            max_dots: 12_000,
        }
    }
}

/// Dot centers and radius of a dotted background grid, in world coordinates.
#[derive(Debug, Clone, PartialEq)]
pub struct GridDots {
    pub centers: Vec<Point>,
    pub radius: f64,
    pub spacing: f64,
}

/// Lay out the dotted grid covering the visible part of the world.
///
/// Spacing grows by an integer factor when the visible dot count would exceed
/// the cap, and dots keep a roughly constant on-screen radius.
pub fn grid_dots(viewport: &Viewport, container: Size, options: &GridOptions) -> GridDots {
    let scale = viewport.ratio();
    let mut spacing = options.spacing_world.max(2.0);
    let base_radius = options.base_dot_radius_world.max(0.2);
    let max_dots = options.max_dots.max(2_000) as f64;

    let visible = viewport.visible_world_rect(container);
    let world_w = visible.width().max(1.0);
    let world_h = visible.height().max(1.0);

    let est_cols = (world_w / spacing).ceil() + 2.0;
    let est_rows = (world_h / spacing).ceil() + 2.0;
    let est_dots = est_cols * est_rows;
    if est_dots > max_dots {
        spacing *= (est_dots / max_dots).sqrt().ceil();
    }

    let start_x = (visible.x0 / spacing).floor() * spacing;
    let start_y = (visible.y0 / spacing).floor() * spacing;
    let cols = ((visible.x1 + spacing - start_x) / spacing).floor() as usize + 1;
    let rows = ((visible.y1 + spacing - start_y) / spacing).floor() as usize + 1;

    let radius_screen = (base_radius * scale).clamp(0.55, 1.35);

    let mut centers = Vec::with_capacity(cols * rows);
    for row in 0..rows {
        let y = start_y + row as f64 * spacing;
        for col in 0..cols {
            centers.push(Point::new(start_x + col as f64 * spacing, y));
        }
    }

    GridDots {
        centers,
        radius: radius_screen / scale,
        spacing,
    }
}
