use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{ensure, Context, Result};
use serde::Deserialize;

/// Top-level filter configuration, loaded from YAML.
///
/// Every field has a default, so an empty document is a valid configuration.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct FilterConfig {
    pub segmentation: SegmentationConfig,
    pub compositor: CompositorConfig,
    pub render: RenderConfig,
}

/// Knobs for the mask provider's sampling loop.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct SegmentationConfig {
    /// ONNX model file. Without one the filter runs with the background mask only.
    pub model: Option<PathBuf>,
    /// Wall-clock period of the inference loop.
    #[serde(with = "humantime_serde")]
    pub sample_interval: Duration,
    /// Probability at or above which a pixel counts as person.
    pub confidence_threshold: f32,
    /// Scale applied to the native frame size before inference.
    pub internal_resolution: f32,
}

impl SegmentationConfig {
    const fn default_sample_interval() -> Duration {
        Duration::from_millis(100)
    }

    const fn default_confidence_threshold() -> f32 {
        0.7
    }

    const fn default_internal_resolution() -> f32 {
        0.5
    }

    /// Size of the inference input for a frame of the given native size.
    pub fn internal_size(&self, width: u32, height: u32) -> (u32, u32) {
        let scale = self.internal_resolution.clamp(f32::MIN_POSITIVE, 1.0);
        let scaled = |v: u32| ((v as f32 * scale).round() as u32).max(1);
        (scaled(width), scaled(height))
    }

    fn validate(&self) -> Result<()> {
        ensure!(
            self.sample_interval > Duration::ZERO,
            "segmentation.sample-interval must be positive"
        );
        ensure!(
            self.confidence_threshold > 0.0 && self.confidence_threshold <= 1.0,
            "segmentation.confidence-threshold must be in (0, 1]"
        );
        ensure!(
            self.internal_resolution > 0.0 && self.internal_resolution <= 1.0,
            "segmentation.internal-resolution must be in (0, 1]"
        );
        if let Some(model) = &self.model {
            ensure!(
                !model.as_os_str().is_empty(),
                "segmentation.model must not be empty"
            );
        }
        Ok(())
    }
}

impl Default for SegmentationConfig {
    fn default() -> Self {
        Self {
            model: None,
            sample_interval: Self::default_sample_interval(),
            confidence_threshold: Self::default_confidence_threshold(),
            internal_resolution: Self::default_internal_resolution(),
        }
    }
}

/// Per-pixel treatment parameters.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct CompositorConfig {
    /// Sobel magnitude above which a person pixel is drawn as a line.
    pub edge_threshold: f32,
    /// Share of the original colour mixed back into the background grayscale.
    pub background_saturation: f32,
    /// Multiplier applied to background pixels after desaturation.
    pub background_brightness: f32,
}

impl CompositorConfig {
    const fn default_edge_threshold() -> f32 {
        0.2
    }

    const fn default_background_saturation() -> f32 {
        0.3
    }

    const fn default_background_brightness() -> f32 {
        0.5
    }

    fn validate(&self) -> Result<()> {
        ensure!(
            self.edge_threshold >= 0.0,
            "compositor.edge-threshold must be >= 0"
        );
        ensure!(
            (0.0..=1.0).contains(&self.background_saturation),
            "compositor.background-saturation must be in [0, 1]"
        );
        ensure!(
            (0.0..=1.0).contains(&self.background_brightness),
            "compositor.background-brightness must be in [0, 1]"
        );
        Ok(())
    }
}

impl Default for CompositorConfig {
    fn default() -> Self {
        Self {
            edge_threshold: Self::default_edge_threshold(),
            background_saturation: Self::default_background_saturation(),
            background_brightness: Self::default_background_brightness(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct RenderConfig {
    /// Target render ticks per second.
    pub fps: u32,
}

impl RenderConfig {
    pub fn frame_duration(&self) -> Duration {
        Duration::from_secs_f64(1.0 / f64::from(self.fps.max(1)))
    }
}

impl Default for RenderConfig {
    fn default() -> Self {
        Self { fps: 30 }
    }
}

impl FilterConfig {
    pub fn validate(&self) -> Result<()> {
        self.segmentation.validate()?;
        self.compositor.validate()?;
        ensure!(self.render.fps > 0, "render.fps must be > 0");
        Ok(())
    }
}

/// Read and parse a YAML configuration file.
pub fn from_yaml_file(path: &Path) -> Result<FilterConfig> {
    let raw = fs::read_to_string(path)
        .with_context(|| format!("reading config file {}", path.display()))?;
    let cfg: FilterConfig = serde_yaml::from_str(&raw)
        .with_context(|| format!("parsing config file {}", path.display()))?;
    Ok(cfg)
}
