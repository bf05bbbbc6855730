//! Variable-width outline generation for freehand strokes.
//!
//! Turns a centerline of pressure samples into a closed polygon whose width
//! follows pressure (real or simulated from speed), then smooths that polygon
//! into a fillable path. The outline is a pure function of its inputs.

use crate::stroke::{InkPoint, InkTool};
use kurbo::{BezPath, Point, Vec2};
use std::f64::consts::PI;

/// How fast simulated pressure follows speed changes.
const RATE_OF_PRESSURE_CHANGE: f64 = 0.275;

/// Slightly more than a half turn, so cap arcs close without a seam.
const FIXED_PI: f64 = PI + 0.0001;

/// Segments in a start cap or sharp-corner arc.
const CAP_STEPS: usize = 13;

/// Segments in the end cap arc.
const END_CAP_STEPS: usize = 29;

/// Points this close to the end of the stroke are skipped (except the last).
const END_NOISE_LENGTH: f64 = 3.0;

/// Parameters of the outline algorithm.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct OutlineOptions {
    /// Nominal diameter of the stroke.
    pub size: f64,
    /// How much pressure affects the width, in `[-1, 1]`.
    pub thinning: f64,
    /// How far apart neighbouring outline points must be, as a fraction of size.
    pub smoothing: f64,
    /// How strongly the centerline lags behind the raw input, in `[0, 1]`.
    pub streamline: f64,
    /// Fraction of the stroke length tapered at the start.
    pub taper_start: f64,
    /// Fraction of the stroke length tapered at the end.
    pub taper_end: f64,
    /// Derive pressure from speed instead of the recorded values.
    pub simulate_pressure: bool,
    /// The input is complete; the last point is used as-is.
    pub complete: bool,
}

impl Default for OutlineOptions {
    fn default() -> Self {
        Self {
            size: 16.0,
            thinning: 0.5,
            smoothing: 0.5,
            streamline: 0.5,
            taper_start: 0.0,
            taper_end: 0.0,
            simulate_pressure: true,
            complete: false,
        }
    }
}

impl OutlineOptions {
    /// Per-tool parameters for a stroke of the given base size.
    pub fn for_tool(tool: InkTool, base_size: f64) -> Self {
        match tool {
            InkTool::Pencil => Self {
                size: base_size * 1.35,
                thinning: 0.35,
                smoothing: 0.6,
                streamline: 0.6,
                taper_start: 0.2,
                taper_end: 0.2,
                ..Self::default()
            },
            InkTool::Pen => Self {
                size: base_size * 1.7,
                thinning: 0.65,
                smoothing: 0.55,
                streamline: 0.6,
                taper_start: 0.2,
                taper_end: 0.2,
                ..Self::default()
            },
            InkTool::Marker => Self {
                size: base_size * 3.2,
                thinning: 0.25,
                smoothing: 0.65,
                streamline: 0.55,
                taper_start: 0.0,
                taper_end: 0.0,
                ..Self::default()
            },
        }
    }
}

/// A centerline sample after streamlining.
#[derive(Debug, Clone, Copy)]
struct CenterPoint {
    point: Point,
    pressure: f64,
    /// Unit vector pointing back towards the previous sample.
    vector: Vec2,
    distance: f64,
    running_length: f64,
}

/// Outline polygon for `points`. Fewer than two input points yield an empty ring.
pub fn stroke_outline(points: &[InkPoint], options: &OutlineOptions) -> Vec<Point> {
    if points.len() < 2 || options.size <= 0.0 {
        return Vec::new();
    }
    let centerline = streamline_points(points, options);
    outline_points(&centerline, options)
}

/// Closed path through the midpoints of consecutive ring vertices, using each
/// vertex as a quadratic control point. Removes the faceting of the polygon.
pub fn smooth_outline_path(ring: &[Point]) -> BezPath {
    let mut path = BezPath::new();
    let (Some(&first), Some(&last)) = (ring.first(), ring.last()) else {
        return path;
    };

    path.move_to(first.midpoint(last));
    for (i, &p) in ring.iter().enumerate() {
        let next = ring[(i + 1) % ring.len()];
        path.quad_to(p, p.midpoint(next));
    }
    path.close_path();
    path
}

/// Fillable path for a stroke, or `None` when it has nothing to paint.
pub fn stroke_path(points: &[InkPoint], tool: InkTool, base_size: f64) -> Option<BezPath> {
    let ring = stroke_outline(points, &OutlineOptions::for_tool(tool, base_size));
    if ring.is_empty() {
        None
    } else {
        Some(smooth_outline_path(&ring))
    }
}

fn unit(v: Vec2) -> Vec2 {
    let len = v.hypot();
    if len > 0.0 { v / len } else { Vec2::ZERO }
}

/// Perpendicular of `v`.
fn per(v: Vec2) -> Vec2 {
    Vec2::new(v.y, -v.x)
}

fn rotate_around(p: Point, center: Point, angle: f64) -> Point {
    let (s, c) = angle.sin_cos();
    let d = p - center;
    Point::new(center.x + d.x * c - d.y * s, center.y + d.x * s + d.y * c)
}

fn normalized_input_pressure(p: f64, fallback: f64) -> f64 {
    if p.is_finite() && p >= 0.0 { p } else { fallback }
}

fn streamline_points(input: &[InkPoint], options: &OutlineOptions) -> Vec<CenterPoint> {
    let t = 0.15 + (1.0 - options.streamline) * 0.85;

    let mut raw: Vec<(Point, f64)> = input
        .iter()
        .map(|p| (Point::new(p.x, p.y), p.pressure))
        .collect();

    // Two samples give too little to work with; subdivide the segment.
    if raw.len() == 2 {
        let (a, pa) = raw[0];
        let (b, _) = raw[1];
        raw.truncate(1);
        for i in 1..5 {
            raw.push((a.lerp(b, i as f64 / 4.0), pa));
        }
    }

    let (first, first_pressure) = raw[0];
    let mut centerline = vec![CenterPoint {
        point: first,
        pressure: normalized_input_pressure(first_pressure, 0.25),
        vector: Vec2::new(1.0, 1.0),
        distance: 0.0,
        running_length: 0.0,
    }];

    let mut reached_min_length = false;
    let mut running_length = 0.0;
    let mut prev = centerline[0];
    let max = raw.len() - 1;

    for (i, &(target, pressure)) in raw.iter().enumerate().skip(1) {
        let point = if options.complete && i == max {
            target
        } else {
            prev.point.lerp(target, t)
        };
        if point == prev.point {
            continue;
        }

        let distance = point.distance(prev.point);
        running_length += distance;

        if i < max && !reached_min_length {
            if running_length < options.size {
                continue;
            }
            reached_min_length = true;
        }

        prev = CenterPoint {
            point,
            pressure: normalized_input_pressure(pressure, 0.5),
            vector: unit(prev.point - point),
            distance,
            running_length,
        };
        centerline.push(prev);
    }

    centerline[0].vector = centerline.get(1).map(|p| p.vector).unwrap_or(Vec2::ZERO);
    centerline
}

fn radius_for(size: f64, thinning: f64, pressure: f64) -> f64 {
    size * (0.5 - thinning * (0.5 - pressure))
}

fn simulated_pressure(prev: f64, distance: f64, size: f64) -> f64 {
    let sp = (distance / size).min(1.0);
    let rp = (1.0 - sp).min(1.0);
    (prev + (rp - prev) * (sp * RATE_OF_PRESSURE_CHANGE)).min(1.0)
}

fn ease_out_quad(t: f64) -> f64 {
    t * (2.0 - t)
}

fn ease_out_cubic(t: f64) -> f64 {
    let t = t - 1.0;
    t * t * t + 1.0
}

fn outline_points(points: &[CenterPoint], options: &OutlineOptions) -> Vec<Point> {
    let size = options.size;
    let Some(last) = points.last() else {
        return Vec::new();
    };
    let total_length = last.running_length;
    let taper_start = options.taper_start.max(0.0) * total_length;
    let taper_end = options.taper_end.max(0.0) * total_length;
    let min_distance = (size * options.smoothing).powi(2);

    let mut left: Vec<Point> = Vec::new();
    let mut right: Vec<Point> = Vec::new();

    let mut prev_pressure = points.iter().take(10).fold(points[0].pressure, |acc, p| {
        let pressure = if options.simulate_pressure {
            simulated_pressure(acc, p.distance, size)
        } else {
            p.pressure
        };
        (acc + pressure) / 2.0
    });

    let mut radius = radius_for(size, options.thinning, last.pressure);
    let mut first_radius: Option<f64> = None;
    let mut prev_vector = points[0].vector;
    let mut pl = points[0].point;
    let mut pr = pl;
    let mut tl = pl;
    let mut tr = pr;
    let mut prev_was_sharp = false;

    for (i, cp) in points.iter().enumerate() {
        let is_last = i == points.len() - 1;
        if !is_last && total_length - cp.running_length < END_NOISE_LENGTH {
            continue;
        }

        if options.thinning != 0.0 {
            let pressure = if options.simulate_pressure {
                simulated_pressure(prev_pressure, cp.distance, size)
            } else {
                cp.pressure
            };
            radius = radius_for(size, options.thinning, pressure);
            prev_pressure = pressure;
        } else {
            radius = size / 2.0;
        }
        first_radius.get_or_insert(radius);

        let ts = if cp.running_length < taper_start {
            ease_out_quad(cp.running_length / taper_start)
        } else {
            1.0
        };
        let remaining = total_length - cp.running_length;
        let te = if remaining < taper_end {
            ease_out_cubic(remaining / taper_end)
        } else {
            1.0
        };
        radius = (radius * ts.min(te)).max(0.01);

        let next_vector = if is_last { cp.vector } else { points[i + 1].vector };
        let next_dpr = if is_last { 1.0 } else { cp.vector.dot(next_vector) };
        let prev_dpr = cp.vector.dot(prev_vector);

        let sharp_here = prev_dpr < 0.0 && !prev_was_sharp;
        let sharp_next = next_dpr < 0.0;

        if sharp_here || sharp_next {
            // Round the corner with a half-turn arc on each side.
            let offset = per(prev_vector) * radius;
            for step in 0..=CAP_STEPS {
                let t = step as f64 / CAP_STEPS as f64;
                tl = rotate_around(cp.point - offset, cp.point, FIXED_PI * t);
                left.push(tl);
                tr = rotate_around(cp.point + offset, cp.point, -FIXED_PI * t);
                right.push(tr);
            }
            pl = tl;
            pr = tr;
            if sharp_next {
                prev_was_sharp = true;
            }
            continue;
        }
        prev_was_sharp = false;

        if is_last {
            let offset = per(cp.vector) * radius;
            left.push(cp.point - offset);
            right.push(cp.point + offset);
            continue;
        }

        let offset = per(next_vector.lerp(cp.vector, next_dpr)) * radius;
        tl = cp.point - offset;
        if i <= 1 || (pl - tl).hypot2() > min_distance {
            left.push(tl);
            pl = tl;
        }
        tr = cp.point + offset;
        if i <= 1 || (pr - tr).hypot2() > min_distance {
            right.push(tr);
            pr = tr;
        }
        prev_vector = cp.vector;
    }

    let first_point = points[0].point;

    if points.len() == 1 {
        // Every sample collapsed onto one spot: draw a dot.
        let last_point = first_point + Vec2::new(1.0, 1.0);
        let r = first_radius.unwrap_or(radius);
        let start = first_point + unit(per(first_point - last_point)) * -r;
        return (1..=CAP_STEPS)
            .map(|step| {
                let t = step as f64 / CAP_STEPS as f64;
                rotate_around(start, first_point, FIXED_PI * 2.0 * t)
            })
            .collect();
    }

    let last_point = last.point;
    let mut start_cap = Vec::new();
    if taper_start <= 0.0 {
        if let Some(&anchor) = right.first() {
            for step in 1..=CAP_STEPS {
                let t = step as f64 / CAP_STEPS as f64;
                start_cap.push(rotate_around(anchor, first_point, FIXED_PI * t));
            }
        }
    }

    let mut end_cap = Vec::new();
    if taper_end > 0.0 {
        end_cap.push(last_point);
    } else {
        let direction = per(-last.vector);
        let start = last_point + direction * radius;
        for step in 1..END_CAP_STEPS {
            let t = step as f64 / END_CAP_STEPS as f64;
            end_cap.push(rotate_around(start, last_point, FIXED_PI * 3.0 * t));
        }
    }

    right.reverse();
    let mut ring = left;
    ring.extend(end_cap);
    ring.extend(right);
    ring.extend(start_cap);
    ring
}
