//! Vello-based painter for GPU-accelerated layers.

use inklayer_core::paint::{Painter, Shadow};
use kurbo::{Affine, BezPath, Circle, Point, Rect, Stroke};
use parley::layout::PositionedLayoutItem;
use parley::{FontContext, LayoutContext, StyleProperty};
use peniko::{Brush, Color, Fill};
use vello::Scene;

/// Font stack used for card labels.
const LABEL_FONTS: &str = "system-ui, -apple-system, Segoe UI, Roboto, sans-serif";

/// Records one ink layer into a vello [`Scene`].
///
/// Hosts keep one painter per layer and submit [`VelloPainter::scene`] to
/// their vello renderer after [`inklayer_core::Overlay::render_frame`].
pub struct VelloPainter {
    scene: Scene,
    /// Font context for label text (cached across frames).
    font_cx: FontContext,
    layout_cx: LayoutContext<Brush>,
}

impl Default for VelloPainter {
    fn default() -> Self {
        Self::new()
    }
}

impl VelloPainter {
    pub fn new() -> Self {
        Self {
            scene: Scene::new(),
            font_cx: FontContext::new(),
            layout_cx: LayoutContext::new(),
        }
    }

    /// Get the built scene for rendering.
    pub fn scene(&self) -> &Scene {
        &self.scene
    }

    /// Take ownership of the scene (resets internal scene).
    pub fn take_scene(&mut self) -> Scene {
        std::mem::take(&mut self.scene)
    }
}

impl Painter for VelloPainter {
    fn clear(&mut self) {
        self.scene.reset();
    }

    fn fill_path(&mut self, transform: Affine, path: &BezPath, color: Color) {
        self.scene.fill(Fill::NonZero, transform, color, None, path);
    }

    fn fill_rect(&mut self, transform: Affine, rect: Rect, color: Color, shadow: Option<Shadow>) {
        if let Some(shadow) = shadow {
            // Blur radius maps to roughly two standard deviations.
            self.scene.draw_blurred_rounded_rect(
                transform,
                rect + shadow.offset,
                shadow.color,
                0.0,
                shadow.blur / 2.0,
            );
        }
        self.scene.fill(Fill::NonZero, transform, color, None, &rect);
    }

    fn stroke_circle(&mut self, transform: Affine, center: Point, radius: f64, width: f64, color: Color) {
        let circle = Circle::new(center, radius);
        self.scene
            .stroke(&Stroke::new(width), transform, color, None, &circle);
    }

    fn fill_circles(&mut self, transform: Affine, centers: &[Point], radius: f64, color: Color) {
        // Batch every dot into one path for a single draw call.
        let mut path = BezPath::new();
        for c in centers {
            path.extend(kurbo::Shape::path_elements(&Circle::new(*c, radius), 0.1));
        }
        self.scene.fill(Fill::NonZero, transform, color, None, &path);
    }

    fn draw_text(&mut self, transform: Affine, origin: Point, text: &str, font_size: f64, color: Color) {
        if text.is_empty() {
            return;
        }
        let brush = Brush::Solid(color);

        let mut builder = self
            .layout_cx
            .ranged_builder(&mut self.font_cx, text, 1.0, false);
        builder.push_default(StyleProperty::FontSize(font_size as f32));
        builder.push_default(StyleProperty::Brush(brush.clone()));
        builder.push_default(StyleProperty::FontStack(parley::FontStack::Source(
            LABEL_FONTS.into(),
        )));
        let mut layout = builder.build(text);
        layout.break_all_lines(None);
        layout.align(None, parley::Alignment::Start, parley::AlignmentOptions::default());

        // Parley lays out with y=0 at the top of the first line.
        let text_transform = transform * Affine::translate(origin.to_vec2());

        let mut glyph_count = 0;
        for line in layout.lines() {
            for item in line.items() {
                let PositionedLayoutItem::GlyphRun(glyph_run) = item else {
                    continue;
                };
                let mut x = glyph_run.offset();
                let y = glyph_run.baseline();
                let run = glyph_run.run();
                let font = run.font();
                let run_font_size = run.font_size();

                let glyphs: Vec<vello::Glyph> = glyph_run
                    .glyphs()
                    .map(|glyph| {
                        let gx = x + glyph.x;
                        let gy = y - glyph.y;
                        x += glyph.advance;
                        glyph_count += 1;
                        vello::Glyph {
                            id: glyph.id,
                            x: gx,
                            y: gy,
                        }
                    })
                    .collect();

                if !glyphs.is_empty() {
                    self.scene
                        .draw_glyphs(font)
                        .brush(&brush)
                        .hint(true)
                        .transform(text_transform)
                        .font_size(run_font_size)
                        .normalized_coords(run.normalized_coords())
                        .draw(Fill::NonZero, glyphs.into_iter());
                }
            }
        }

        if glyph_count == 0 {
            log::debug!("No system font available for label '{}'", text);
        }
    }
}
