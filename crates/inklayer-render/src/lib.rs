//! inklayer Render Library
//!
//! [`Painter`](inklayer_core::Painter) implementations for the ink layers and
//! PNG export of an attempt. The CPU rasterizer uses tiny-skia; the default
//! interactive painter records into a Vello scene.

mod export;
mod raster;
mod renderer;

#[cfg(feature = "vello-renderer")]
mod vello_impl;

pub use export::{ExportError, ExportOptions, ExportedImage, export_attempt_png, export_file_name};
pub use raster::PixmapPainter;
pub use renderer::{RenderResult, RendererError, encode_png};

#[cfg(feature = "vello-renderer")]
pub use vello_impl::VelloPainter;
