//! PNG export of one attempt's ink.

use crate::raster::PixmapPainter;
use crate::renderer::RendererError;
use inklayer_core::config::InkConfig;
use inklayer_core::geometry::BoundingBox;
use inklayer_core::paint::paint_stroke;
use inklayer_core::storage::{InkPersistence, StorageError};
use inklayer_core::stroke::AttemptId;
use kurbo::Affine;
use peniko::Color;
use thiserror::Error;

/// Export errors.
#[derive(Debug, Error)]
pub enum ExportError {
    #[error("No strokes to export for attempt {0}")]
    NoStrokes(AttemptId),
    #[error(transparent)]
    Storage(#[from] StorageError),
    #[error(transparent)]
    Render(#[from] RendererError),
}

/// Export settings.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ExportOptions {
    /// Margin around the ink, in world units.
    pub padding: f64,
    /// Output pixels per world unit.
    pub scale: f64,
    /// Opaque background; `None` keeps the image transparent.
    pub background: Option<Color>,
}

impl Default for ExportOptions {
    fn default() -> Self {
        Self {
            padding: 24.0,
            scale: 2.0,
            background: None,
        }
    }
}

impl ExportOptions {
    pub fn from_config(config: &InkConfig) -> Self {
        Self {
            padding: config.export_padding,
            scale: config.export_scale,
            background: None,
        }
    }
}

/// An encoded export.
#[derive(Debug, Clone)]
pub struct ExportedImage {
    pub png: Vec<u8>,
    pub width: u32,
    pub height: u32,
    /// Suggested file name, `attempt_<first 8 id chars>.png`.
    pub file_name: String,
}

/// Suggested download name for an attempt export.
pub fn export_file_name(attempt_id: &AttemptId) -> String {
    let short: String = attempt_id.as_str().chars().take(8).collect();
    format!("attempt_{}.png", short)
}

/// Render every stored stroke of `attempt_id`, across documents, into a PNG.
pub async fn export_attempt_png(
    persistence: &dyn InkPersistence,
    attempt_id: &AttemptId,
    options: &ExportOptions,
) -> Result<ExportedImage, ExportError> {
    let strokes = persistence.list_by_attempt(attempt_id).await?;
    let Some(bounds) = BoundingBox::union_all(strokes.iter().map(|s| &s.bbox)) else {
        return Err(ExportError::NoStrokes(attempt_id.clone()));
    };
    let bounds = bounds.expand(options.padding.max(0.0));
    let scale = if options.scale.is_finite() && options.scale > 0.0 {
        options.scale
    } else {
        1.0
    };

    let width = (bounds.width() * scale).ceil().max(1.0) as u32;
    let height = (bounds.height() * scale).ceil().max(1.0) as u32;
    log::info!(
        "Exporting {} strokes of attempt {} at {}x{}",
        strokes.len(),
        attempt_id,
        width,
        height
    );

    let mut painter = PixmapPainter::new(width, height)?;
    if let Some(background) = options.background {
        painter.fill_background(background);
    }
    let transform = Affine::new([
        scale,
        0.0,
        0.0,
        scale,
        -bounds.min_x * scale,
        -bounds.min_y * scale,
    ]);
    for stroke in &strokes {
        paint_stroke(&mut painter, transform, stroke);
    }

    Ok(ExportedImage {
        png: painter.encode_png()?,
        width,
        height,
        file_name: export_file_name(attempt_id),
    })
}
