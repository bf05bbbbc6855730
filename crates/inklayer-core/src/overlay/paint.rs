//! Layer painting for the overlay.

use super::{FramePainted, Gesture, GestureMode, Overlay};
use crate::geometry::BoundingBox;
use crate::paint::{Painter, Shadow, paint_points, paint_stroke};
use crate::stroke::{AttemptId, InkTool};
use crate::viewport::{GridOptions, grid_dots};
use kurbo::{Point, Vec2};
use peniko::Color;
use std::collections::HashMap;

const CARD_FILL: Color = Color::from_rgba8(255, 255, 255, 13);
const CARD_LABEL: Color = Color::from_rgba8(255, 255, 255, 191);
const CARD_SHADOW: Color = Color::from_rgba8(0, 0, 0, 64);
const CARD_SHADOW_BLUR_PX: f64 = 14.0;
const CARD_SHADOW_OFFSET_PX: f64 = 6.0;
const ERASER_RING: Color = Color::from_rgba8(15, 23, 42, 191);
const ERASER_RING_WIDTH_PX: f64 = 1.5;
const GRID_DOT: Color = Color::from_rgba8(0, 0, 0, 46);

/// Background card behind the strokes of an attempt other than the active one.
#[derive(Debug, Clone, PartialEq)]
pub struct AttemptCard {
    pub attempt_id: AttemptId,
    /// Union of the attempt's stroke boxes, padded.
    pub bbox: BoundingBox,
    /// Newest `created_at` among the attempt's strokes.
    pub last_created_at: i64,
    pub label: String,
}

impl Overlay {
    /// Cards of every attempt present in the store except the active one,
    /// oldest activity first (the paint order).
    pub fn other_attempt_cards(&self) -> Vec<AttemptCard> {
        let store = self.store.borrow();
        let active = store.active_attempt_id();
        let padding = self
            .config
            .px_to_world(self.config.card_padding_px, self.viewport.ratio());

        let mut groups: HashMap<&AttemptId, (BoundingBox, i64)> = HashMap::new();
        for stroke in store.strokes() {
            if Some(&stroke.attempt_id) == active {
                continue;
            }
            groups
                .entry(&stroke.attempt_id)
                .and_modify(|(bbox, last)| {
                    *bbox = bbox.union(&stroke.bbox);
                    *last = (*last).max(stroke.created_at);
                })
                .or_insert((stroke.bbox, stroke.created_at));
        }

        let mut cards: Vec<AttemptCard> = groups
            .into_iter()
            .map(|(attempt_id, (bbox, last_created_at))| AttemptCard {
                attempt_id: attempt_id.clone(),
                bbox: bbox.expand(padding),
                last_created_at,
                label: self.label_for(attempt_id).to_string(),
            })
            .collect();
        cards.sort_by(|a, b| {
            a.last_created_at
                .cmp(&b.last_created_at)
                .then_with(|| a.attempt_id.cmp(&b.attempt_id))
        });
        cards
    }

    /// Repaint whichever layers are dirty. Call once per animation frame
    /// after the [`FrameRequester`](super::FrameRequester) fired.
    pub fn render_frame(&mut self, persisted: &mut dyn Painter, live: &mut dyn Painter) -> FramePainted {
        self.sync_context();
        let (paint_persisted, paint_live) = self.frame.begin_frame();
        if paint_persisted {
            self.paint_persisted(persisted);
        }
        if paint_live {
            self.paint_live(live);
        }
        FramePainted {
            persisted: paint_persisted,
            live: paint_live,
        }
    }

    /// Paint the persisted layer: optional grid, other-attempt cards with
    /// their labels, then every committed stroke oldest first.
    pub fn paint_persisted(&self, painter: &mut dyn Painter) {
        painter.clear();
        let transform = self.viewport.paint_transform(self.device_pixel_ratio);
        let ratio = self.viewport.ratio();

        if self.config.show_grid {
            let grid = grid_dots(&self.viewport, self.container, &GridOptions::default());
            painter.fill_circles(transform, &grid.centers, grid.radius, GRID_DOT);
        }

        let cards = self.other_attempt_cards();
        let store = self.store.borrow();
        let lifted = match (self.mode(), store.selected_attempt_id()) {
            (GestureMode::Dragging, Some(selected)) if self.config.touch_environment => Some(selected),
            _ => None,
        };
        let font_size = self.config.px_to_world(self.config.label_font_px, ratio);
        let label_padding = self.config.px_to_world(self.config.label_padding_px, ratio);

        for card in &cards {
            let shadow = (lifted == Some(&card.attempt_id)).then(|| Shadow {
                color: CARD_SHADOW,
                blur: self.config.px_to_world(CARD_SHADOW_BLUR_PX, ratio),
                offset: Vec2::new(0.0, self.config.px_to_world(CARD_SHADOW_OFFSET_PX, ratio)),
            });
            painter.fill_rect(transform, card.bbox.to_rect(), CARD_FILL, shadow);
            painter.draw_text(
                transform,
                Point::new(card.bbox.min_x + label_padding, card.bbox.min_y + label_padding),
                &card.label,
                font_size,
                CARD_LABEL,
            );
        }

        for stroke in store.strokes() {
            paint_stroke(painter, transform, stroke);
        }
    }

    /// Paint the live layer: the stroke being drawn, or the eraser ring.
    pub fn paint_live(&self, painter: &mut dyn Painter) {
        painter.clear();
        let transform = self.viewport.paint_transform(self.device_pixel_ratio);
        let Some(active) = &self.active else {
            return;
        };

        match &active.gesture {
            Gesture::Drawing { points, .. } if points.len() >= 2 => {
                let store = self.store.borrow();
                // The eraser never draws; a brush switch mid-stroke previews as pencil.
                let tool = store.brush().tool().unwrap_or(InkTool::Pencil);
                paint_points(
                    painter,
                    transform,
                    points,
                    tool,
                    store.base_size(),
                    store.color(),
                    store.opacity(),
                );
            }
            Gesture::Erasing { radius, cursor } => {
                let width = self
                    .config
                    .px_to_world(ERASER_RING_WIDTH_PX, self.viewport.ratio());
                painter.stroke_circle(transform, *cursor, *radius, width, ERASER_RING);
            }
            _ => {}
        }
    }
}
