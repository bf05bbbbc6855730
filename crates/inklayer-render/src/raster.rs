//! CPU rasterization with tiny-skia.
//!
//! Used for PNG export and for hosts without a GPU. Text is not rasterized:
//! card labels only appear on interactive layers.

use crate::renderer::{RenderResult, RendererError, encode_png};
use inklayer_core::paint::{Painter, Shadow};
use kurbo::{Affine, BezPath, PathEl, Point, Rect};
use peniko::Color;
use tiny_skia::{FillRule, Paint, PathBuilder, Pixmap, Transform};

fn to_transform(affine: Affine) -> Transform {
    let [a, b, c, d, e, f] = affine.as_coeffs();
    Transform::from_row(a as f32, b as f32, c as f32, d as f32, e as f32, f as f32)
}

fn to_paint(color: Color) -> Paint<'static> {
    let rgba = color.to_rgba8();
    let mut paint = Paint::default();
    paint.set_color_rgba8(rgba.r, rgba.g, rgba.b, rgba.a);
    paint.anti_alias = true;
    paint
}

/// Convert a kurbo path. Returns `None` for paths tiny-skia considers empty.
fn to_path(path: &BezPath) -> Option<tiny_skia::Path> {
    let mut pb = PathBuilder::new();
    for el in path.elements() {
        match *el {
            PathEl::MoveTo(p) => pb.move_to(p.x as f32, p.y as f32),
            PathEl::LineTo(p) => pb.line_to(p.x as f32, p.y as f32),
            PathEl::QuadTo(p1, p2) => pb.quad_to(p1.x as f32, p1.y as f32, p2.x as f32, p2.y as f32),
            PathEl::CurveTo(p1, p2, p3) => pb.cubic_to(
                p1.x as f32,
                p1.y as f32,
                p2.x as f32,
                p2.y as f32,
                p3.x as f32,
                p3.y as f32,
            ),
            PathEl::ClosePath => pb.close(),
        }
    }
    pb.finish()
}

fn to_rect(rect: Rect) -> Option<tiny_skia::Rect> {
    let rect = rect.abs();
    tiny_skia::Rect::from_ltrb(rect.x0 as f32, rect.y0 as f32, rect.x1 as f32, rect.y1 as f32)
}

/// [`Painter`] backed by a tiny-skia pixmap.
pub struct PixmapPainter {
    pixmap: Pixmap,
}

impl PixmapPainter {
    /// Transparent pixmap of the given size in device pixels.
    pub fn new(width: u32, height: u32) -> RenderResult<Self> {
        let pixmap = Pixmap::new(width, height)
            .ok_or_else(|| RendererError::Surface(format!("Cannot allocate {}x{} pixmap", width, height)))?;
        Ok(Self { pixmap })
    }

    pub fn width(&self) -> u32 {
        self.pixmap.width()
    }

    pub fn height(&self) -> u32 {
        self.pixmap.height()
    }

    /// Fill the whole surface with `color`.
    pub fn fill_background(&mut self, color: Color) {
        let rgba = color.to_rgba8();
        self.pixmap
            .fill(tiny_skia::Color::from_rgba8(rgba.r, rgba.g, rgba.b, rgba.a));
    }

    /// Straight-alpha RGBA8 copy of the pixels.
    pub fn to_rgba8(&self) -> Vec<u8> {
        self.pixmap
            .pixels()
            .iter()
            .flat_map(|p| {
                let c = p.demultiply();
                [c.red(), c.green(), c.blue(), c.alpha()]
            })
            .collect()
    }

    /// Straight-alpha RGBA8 value of one pixel.
    pub fn pixel(&self, x: u32, y: u32) -> Option<[u8; 4]> {
        let c = self.pixmap.pixel(x, y)?.demultiply();
        Some([c.red(), c.green(), c.blue(), c.alpha()])
    }

    pub fn encode_png(&self) -> RenderResult<Vec<u8>> {
        encode_png(&self.to_rgba8(), self.width(), self.height())
    }
}

impl Painter for PixmapPainter {
    fn clear(&mut self) {
        self.pixmap.fill(tiny_skia::Color::TRANSPARENT);
    }

    fn fill_path(&mut self, transform: Affine, path: &BezPath, color: Color) {
        let Some(path) = to_path(path) else {
            return;
        };
        self.pixmap.fill_path(
            &path,
            &to_paint(color),
            FillRule::Winding,
            to_transform(transform),
            None,
        );
    }

    fn fill_rect(&mut self, transform: Affine, rect: Rect, color: Color, shadow: Option<Shadow>) {
        let ts = to_transform(transform);
        // No blur on the CPU path: the shadow is a flat offset copy.
        if let Some(shadow) = shadow {
            if let Some(r) = to_rect(rect + shadow.offset) {
                self.pixmap.fill_rect(r, &to_paint(shadow.color), ts, None);
            }
        }
        if let Some(r) = to_rect(rect) {
            self.pixmap.fill_rect(r, &to_paint(color), ts, None);
        }
    }

    fn stroke_circle(&mut self, transform: Affine, center: Point, radius: f64, width: f64, color: Color) {
        let Some(path) = PathBuilder::from_circle(center.x as f32, center.y as f32, radius as f32) else {
            return;
        };
        let stroke = tiny_skia::Stroke {
            width: width as f32,
            ..Default::default()
        };
        self.pixmap
            .stroke_path(&path, &to_paint(color), &stroke, to_transform(transform), None);
    }

    fn fill_circles(&mut self, transform: Affine, centers: &[Point], radius: f64, color: Color) {
        let mut pb = PathBuilder::new();
        for c in centers {
            pb.push_circle(c.x as f32, c.y as f32, radius as f32);
        }
        let Some(path) = pb.finish() else {
            return;
        };
        self.pixmap.fill_path(
            &path,
            &to_paint(color),
            FillRule::Winding,
            to_transform(transform),
            None,
        );
    }

    fn draw_text(&mut self, _transform: Affine, _origin: Point, text: &str, _font_size: f64, _color: Color) {
        log::debug!("Skipping text '{}' on raster surface", text);
    }
}
