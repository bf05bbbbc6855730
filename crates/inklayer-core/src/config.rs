//! Tunable constants of the ink engine.

use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;

/// Configuration loading errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config {path}: {message}")]
    Io { path: String, message: String },
    #[error("Failed to parse config: {0}")]
    Parse(String),
}

/// Engine configuration. Screen-pixel values are converted to world units
/// with the current zoom ratio at the point of use.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct InkConfig {
    /// Distance gate for draw sampling, in screen pixels.
    pub min_sample_distance_px: f64,
    pub eraser_radius_px: f64,
    /// Lower bound of the eraser radius in world units.
    pub eraser_min_radius_world: f64,
    /// Absolute lower bound applied during an eraser pass.
    pub eraser_hit_floor_world: f64,
    /// Multiple of a stroke's base size added to its eraser hit box.
    pub eraser_bbox_size_factor: f64,
    pub hold_delay_ms: i64,
    /// Movement that cancels a pending hold, in screen pixels.
    pub hold_cancel_px: f64,
    pub card_padding_px: f64,
    pub label_font_px: f64,
    pub label_padding_px: f64,
    pub min_ratio: f64,
    /// Host is touch capable: touch selections wait for a hold before dragging.
    pub touch_environment: bool,
    /// Export margin, in world units.
    pub export_padding: f64,
    /// Export oversampling factor.
    pub export_scale: f64,
    pub show_grid: bool,
}

impl Default for InkConfig {
    fn default() -> Self {
        Self {
            min_sample_distance_px: 0.6,
            eraser_radius_px: 12.0,
            eraser_min_radius_world: 6.0,
            eraser_hit_floor_world: 3.0,
            eraser_bbox_size_factor: 4.0,
            hold_delay_ms: 280,
            hold_cancel_px: 6.0,
            card_padding_px: 18.0,
            label_font_px: 11.0,
            label_padding_px: 6.0,
            min_ratio: crate::viewport::MIN_RATIO,
            touch_environment: false,
            export_padding: 24.0,
            export_scale: 2.0,
            show_grid: false,
        }
    }
}

impl InkConfig {
    /// Parse from JSON. Missing fields take their defaults.
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        serde_json::from_str(json).map_err(|e| ConfigError::Parse(e.to_string()))
    }

    /// Load from a JSON file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path).map_err(|e| ConfigError::Io {
            path: path.display().to_string(),
            message: e.to_string(),
        })?;
        let config = Self::from_json(&json)?;
        log::debug!("Loaded ink config from {}", path.display());
        Ok(config)
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    /// Eraser radius in world units at the given zoom ratio.
    pub fn eraser_radius_world(&self, ratio: f64) -> f64 {
        let r = crate::viewport::clamp_ratio(ratio, self.min_ratio);
        self.eraser_min_radius_world.max(self.eraser_radius_px / r)
    }

    /// Convert a screen-pixel length to world units at the given zoom ratio.
    pub fn px_to_world(&self, px: f64, ratio: f64) -> f64 {
        px / crate::viewport::clamp_ratio(ratio, self.min_ratio)
    }
}
