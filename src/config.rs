//! Configuration for the bridge and the async export façade.
//!
//! [`BridgeConfig`] carries the defaults the typed API falls back on when a
//! caller omits an option, plus where to find libgs. Build it via
//! [`BridgeConfig::builder`] or take [`BridgeConfig::default`].
//!
//! The builder only rejects values that can never be passed to the engine
//! (a zero DPI). Anything else, including JPEG qualities outside 0–100, is
//! forwarded unchanged and left to Ghostscript's own validation.

use crate::error::BridgeError;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Bridge configuration.
///
/// # Example
/// ```rust
/// use gsbridge::BridgeConfig;
///
/// let config = BridgeConfig::builder()
///     .default_dpi(300)
///     .jpeg_quality(85)
///     .build()
///     .unwrap();
/// assert_eq!(config.default_dpi, 300);
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BridgeConfig {
    /// Explicit libgs path. When `None`, `GS_LIB_PATH` and the platform
    /// library names are searched.
    pub library_path: Option<PathBuf>,

    /// Raster resolution used when a caller does not specify one. Default: 150.
    pub default_dpi: u32,

    /// JPEG quality used when a caller does not specify one. Default: 90.
    pub jpeg_quality: i32,

    /// Lower bound applied to preview renders. Default: 72.
    pub preview_min_dpi: u32,

    /// Upper bound applied to preview renders. Default: 600.
    pub preview_max_dpi: u32,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            library_path: None,
            default_dpi: 150,
            jpeg_quality: 90,
            preview_min_dpi: 72,
            preview_max_dpi: 600,
        }
    }
}

impl BridgeConfig {
    /// Create a new builder for `BridgeConfig`.
    pub fn builder() -> BridgeConfigBuilder {
        BridgeConfigBuilder {
            config: Self::default(),
        }
    }

    /// DPI for a preview render at `scale` (1.0 = 72 DPI), clamped to the
    /// configured preview bounds.
    pub fn preview_dpi(&self, scale: f32) -> u32 {
        let raw = (72.0 * scale).round();
        let raw = if raw.is_finite() && raw > 0.0 {
            raw.min(u32::MAX as f32) as u32
        } else {
            0
        };
        raw.clamp(self.preview_min_dpi, self.preview_max_dpi)
    }
}

/// Builder for [`BridgeConfig`].
#[derive(Debug)]
pub struct BridgeConfigBuilder {
    config: BridgeConfig,
}

impl BridgeConfigBuilder {
    pub fn library_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.library_path = Some(path.into());
        self
    }

    pub fn default_dpi(mut self, dpi: u32) -> Self {
        self.config.default_dpi = dpi;
        self
    }

    pub fn jpeg_quality(mut self, quality: i32) -> Self {
        self.config.jpeg_quality = quality;
        self
    }

    pub fn preview_dpi_range(mut self, min: u32, max: u32) -> Self {
        self.config.preview_min_dpi = min;
        self.config.preview_max_dpi = max;
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(self) -> Result<BridgeConfig, BridgeError> {
        let c = &self.config;
        if c.default_dpi == 0 {
            return Err(BridgeError::InvalidConfig(
                "default DPI must be positive".into(),
            ));
        }
        if c.preview_min_dpi == 0 || c.preview_min_dpi > c.preview_max_dpi {
            return Err(BridgeError::InvalidConfig(format!(
                "preview DPI range must be 1 ≤ min ≤ max, got {}–{}",
                c.preview_min_dpi, c.preview_max_dpi
            )));
        }
        Ok(self.config)
    }
}
