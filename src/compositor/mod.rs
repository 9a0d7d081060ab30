//! Per-pixel line-art compositor.
//!
//! For each output pixel the mask picks one of two treatments: person pixels
//! become black-on-white Sobel line art, background pixels become a muted,
//! partly desaturated and darkened copy of the video.

pub mod edge;
pub mod sampler;

use image::{Rgba, RgbaImage};

use crate::config::CompositorConfig;
use crate::segmentation::MaskTexture;

/// Mask values strictly above this count as person.
pub const PERSON_CUTOFF: f32 = 0.5;

/// Inputs for one rendered frame.
#[derive(Debug, Clone, Copy)]
pub struct RenderUniforms<'a> {
    pub frame: &'a RgbaImage,
    pub mask: &'a MaskTexture,
    /// Output size in pixels; normally the frame's own size.
    pub resolution: (u32, u32),
    pub edge_threshold: f32,
}

impl<'a> RenderUniforms<'a> {
    pub fn new(frame: &'a RgbaImage, mask: &'a MaskTexture, edge_threshold: f32) -> Self {
        Self {
            frame,
            mask,
            resolution: frame.dimensions(),
            edge_threshold,
        }
    }
}

/// Which treatment a pixel gets.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Region {
    Person,
    Background,
}

impl Region {
    /// Hard cut at [`PERSON_CUTOFF`]; a value of exactly 0.5 is background.
    pub fn classify(mask_value: f32) -> Self {
        if mask_value > PERSON_CUTOFF {
            Self::Person
        } else {
            Self::Background
        }
    }
}

#[derive(Debug, Clone)]
pub struct Compositor {
    background_saturation: f32,
    background_brightness: f32,
}

impl Compositor {
    pub fn new(config: &CompositorConfig) -> Self {
        Self {
            background_saturation: config.background_saturation,
            background_brightness: config.background_brightness,
        }
    }

    /// Render a whole frame.
    pub fn render(&self, uniforms: &RenderUniforms<'_>) -> RgbaImage {
        let _span = tracing::debug_span!("composite").entered();
        let (width, height) = uniforms.resolution;
        RgbaImage::from_fn(width, height, |x, y| {
            let u = (x as f32 + 0.5) / width as f32;
            let v = (y as f32 + 0.5) / height as f32;
            self.shade_at(uniforms, u, v)
        })
    }

    /// Evaluate a single pixel at normalized coordinates.
    pub fn shade_at(&self, uniforms: &RenderUniforms<'_>, u: f32, v: f32) -> Rgba<u8> {
        let (width, height) = uniforms.resolution;
        let texel = (1.0 / width.max(1) as f32, 1.0 / height.max(1) as f32);

        let color = sampler::sample(uniforms.frame, u, v);
        let mask = uniforms.mask.sample(u, v);
        let magnitude = edge::magnitude(uniforms.frame, u, v, texel);

        let rgb = self.shade(
            [color[0], color[1], color[2]],
            mask,
            magnitude,
            uniforms.edge_threshold,
        );
        Rgba([to_u8(rgb[0]), to_u8(rgb[1]), to_u8(rgb[2]), 255])
    }

    /// The per-pixel decision, free of any sampling.
    pub fn shade(
        &self,
        color: [f32; 3],
        mask: f32,
        magnitude: f32,
        edge_threshold: f32,
    ) -> [f32; 3] {
        match Region::classify(mask) {
            Region::Person => {
                if magnitude > edge_threshold {
                    [0.0; 3]
                } else {
                    [1.0; 3]
                }
            }
            Region::Background => self.muted(color),
        }
    }

    /// Background treatment: partial desaturation, then darkening.
    pub fn muted(&self, color: [f32; 3]) -> [f32; 3] {
        let gray = edge::luminance(color);
        let mix = self.background_saturation;
        color.map(|c| (gray + (c - gray) * mix) * self.background_brightness)
    }
}

impl Default for Compositor {
    fn default() -> Self {
        Self::new(&CompositorConfig::default())
    }
}

fn to_u8(v: f32) -> u8 {
    (v.clamp(0.0, 1.0) * 255.0).round() as u8
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classify_boundary_is_background() {
        assert_eq!(Region::classify(0.5), Region::Background);
        assert_eq!(Region::classify(0.500_001), Region::Person);
        assert_eq!(Region::classify(0.0), Region::Background);
    }

    #[test]
    fn muted_red_matches_formula() {
        let c = Compositor::default();
        let out = c.muted([1.0, 0.0, 0.0]);
        let gray = 0.299;
        assert!((out[0] - (gray * 0.7 + 0.3) * 0.5).abs() < 1e-6);
        assert!((out[1] - gray * 0.7 * 0.5).abs() < 1e-6);
        assert_eq!(out[1], out[2]);
    }

    #[test]
    fn person_pixels_are_pure_black_or_white() {
        let c = Compositor::default();
        assert_eq!(c.shade([0.3, 0.6, 0.9], 1.0, 0.9, 0.2), [0.0; 3]);
        assert_eq!(c.shade([0.3, 0.6, 0.9], 1.0, 0.1, 0.2), [1.0; 3]);
        // magnitude equal to the threshold is not an edge
        assert_eq!(c.shade([0.3, 0.6, 0.9], 1.0, 0.2, 0.2), [1.0; 3]);
    }
}
