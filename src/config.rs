use std::fs;
use std::path::Path;
use std::thread;

use serde::Deserialize;

use crate::error::{RenderError, RenderResult};

/// What ends up in the presentable image on flush.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DisplayMode {
    #[default]
    Color,
    Depth,
    ShadowMap,
}

/// Which stored depth value wins the depth test.
///
/// `GreaterWins` keeps the "larger value wins" rule: buffers are cleared to 0, projections put the
/// near plane at NDC z = +1 and the far plane at -1. `LessWins` is the conventional layout: cleared
/// to 1, near plane at -1. Either way the fragment closer to the camera (or light) wins.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DepthConvention {
    #[default]
    GreaterWins,
    LessWins,
}

impl DepthConvention {
    /// "Empty" depth, written by clear().
    pub fn clear_value(self) -> f32 {
        return match self {
            DepthConvention::GreaterWins => 0.0,
            DepthConvention::LessWins => 1.0,
        };
    }

    /// NDC z of the near plane.
    pub fn near_ndc(self) -> f32 {
        return match self {
            DepthConvention::GreaterWins => 1.0,
            DepthConvention::LessWins => -1.0,
        };
    }

    /// Depth test: does `depth` replace `stored`?
    pub fn passes(self, depth: f32, stored: f32) -> bool {
        return match self {
            DepthConvention::GreaterWins => depth > stored,
            DepthConvention::LessWins => depth < stored,
        };
    }

    /// Shadow comparison: is a point at `depth` (as seen from the light) in front of the occluder
    /// stored in the shadow map, give or take `bias`?
    pub fn is_lit(self, depth: f32, stored: f32, bias: f32) -> bool {
        return match self {
            DepthConvention::GreaterWins => depth > stored - bias,
            DepthConvention::LessWins => depth < stored + bias,
        };
    }
}

/// Shadow map layout and PCF sampling parameters.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
#[serde(default)]
pub struct ShadowConfig {
    pub resolution: u32,
    pub half_extent: f32, // Half size of the light's orthographic box.
    pub near: f32,
    pub far: f32,
    pub kernel_radius: f32, // In shadow map texels.
    pub samples: usize,     // How many of the 16 Poisson taps are taken.
    pub bias: f32,
}

impl Default for ShadowConfig {
    fn default() -> Self {
        return Self {
            resolution: 2048,
            half_extent: 10.0,
            near: 0.1,
            far: 100.0,
            kernel_radius: 1.0,
            samples: 16,
            bias: 0.0003,
        };
    }
}

/// Renderer construction parameters. Every field has a default, so a TOML file only needs to
/// mention what it changes.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct RenderConfig {
    pub width: u32,
    pub height: u32,
    pub display_mode: DisplayMode,
    pub depth_convention: DepthConvention,
    pub workers: usize, // 0 picks the available parallelism.
    pub tile_rows: usize,
    pub shadow: ShadowConfig,
}

impl Default for RenderConfig {
    fn default() -> Self {
        return Self {
            width: 800,
            height: 800,
            display_mode: DisplayMode::default(),
            depth_convention: DepthConvention::default(),
            workers: 0,
            tile_rows: 16,
            shadow: ShadowConfig::default(),
        };
    }
}

impl RenderConfig {
    /// Parses a TOML document and validates the result.
    pub fn from_toml_str(source: &str) -> RenderResult<Self> {
        let config: RenderConfig = toml::from_str(source)?;
        config.validate()?;
        return Ok(config);
    }

    /// Reads and parses a TOML config file.
    pub fn load<P: AsRef<Path>>(path: P) -> RenderResult<Self> {
        let source = fs::read_to_string(path)?;
        return Self::from_toml_str(&source);
    }

    /// Number of raster workers to spawn.
    pub fn worker_count(&self) -> usize {
        if self.workers > 0 {
            return self.workers;
        }
        return thread::available_parallelism()
            .map(|count| count.get())
            .unwrap_or(1);
    }

    /// Checks everything the renderer relies on at construction time.
    pub fn validate(&self) -> RenderResult<()> {
        fn invalid(message: String) -> RenderResult<()> {
            return Err(RenderError::InvalidConfig(message));
        }

        if self.width == 0 || self.height == 0 {
            return invalid(format!("frame size {}x{} is empty", self.width, self.height));
        }
        // Presentable images are RGBA8 with u32 dimensions, so the byte count must stay addressable.
        let frame_bytes = (self.width as u64) * (self.height as u64) * 4;
        if frame_bytes > u32::MAX as u64 {
            return invalid(format!("frame size {}x{} is too large", self.width, self.height));
        }
        if self.tile_rows == 0 {
            return invalid("tile_rows must be at least 1".to_string());
        }

        let shadow = &self.shadow;
        if shadow.resolution == 0 {
            return invalid("shadow map resolution must be at least 1".to_string());
        }
        let shadow_bytes = (shadow.resolution as u64) * (shadow.resolution as u64) * 4;
        if shadow_bytes > u32::MAX as u64 {
            return invalid(format!("shadow map resolution {} is too large", shadow.resolution));
        }
        if !(shadow.half_extent > 0.0) {
            return invalid(format!("shadow half extent {} must be positive", shadow.half_extent));
        }
        if !(shadow.near < shadow.far) {
            return invalid(format!(
                "shadow near plane {} must be in front of far plane {}",
                shadow.near, shadow.far
            ));
        }
        if shadow.samples == 0 || shadow.samples > 16 {
            return invalid(format!("shadow samples {} must be within 1..=16", shadow.samples));
        }
        if !(shadow.kernel_radius >= 0.0) {
            return invalid(format!("kernel radius {} must not be negative", shadow.kernel_radius));
        }

        return Ok(());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let config = RenderConfig::from_toml_str(
            r#"
            width = 320
            height = 240
            display_mode = "shadow_map"
            depth_convention = "less_wins"

            [shadow]
            resolution = 512
            "#,
        )
        .unwrap();

        assert_eq!(config.width, 320);
        assert_eq!(config.height, 240);
        assert_eq!(config.display_mode, DisplayMode::ShadowMap);
        assert_eq!(config.depth_convention, DepthConvention::LessWins);
        assert_eq!(config.shadow.resolution, 512);
        assert_eq!(config.shadow.samples, 16);
        assert_eq!(config.tile_rows, 16);
    }

    #[test]
    fn test_rejects_bad_values() {
        assert!(RenderConfig::from_toml_str("width = 0").is_err());
        assert!(RenderConfig::from_toml_str("tile_rows = 0").is_err());
        assert!(RenderConfig::from_toml_str("[shadow]\nsamples = 17").is_err());
        assert!(RenderConfig::from_toml_str("[shadow]\nnear = 5.0\nfar = 1.0").is_err());
        assert!(RenderConfig::from_toml_str("width = \"wide\"").is_err());
    }

    #[test]
    fn test_depth_conventions_agree_on_closer() {
        for convention in [DepthConvention::GreaterWins, DepthConvention::LessWins] {
            let near = convention.near_ndc() * 0.5 + 0.5;
            let far = -convention.near_ndc() * 0.5 + 0.5;
            assert!(convention.passes(near, far));
            assert!(!convention.passes(far, near));
            assert!(convention.passes(near, convention.clear_value()));
        }
    }
}
