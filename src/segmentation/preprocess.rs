use anyhow::{bail, Result};
use image::{imageops, RgbImage, RgbaImage};
use ndarray::Array4;

use super::types::ProbabilityMap;

/// Preprocessor for converting frames to model input tensors and back
pub struct Preprocessor {
    target_width: u32,
    target_height: u32,
}

impl Preprocessor {
    pub fn new(target_width: u32, target_height: u32) -> Self {
        Self {
            target_width,
            target_height,
        }
    }

    /// Shrink a decoded RGBA frame to the inference ("internal") resolution.
    ///
    /// Alpha is dropped; models only see RGB.
    pub fn downsample(frame: &RgbaImage, width: u32, height: u32) -> RgbImage {
        let _span = tracing::debug_span!("downsample").entered();

        let rgb = RgbImage::from_fn(frame.width(), frame.height(), |x, y| {
            let p = frame.get_pixel(x, y);
            image::Rgb([p[0], p[1], p[2]])
        });
        if rgb.dimensions() == (width, height) {
            return rgb;
        }
        imageops::resize(&rgb, width, height, imageops::FilterType::Triangle)
    }

    /// Preprocess an RGB image into a normalized NCHW tensor
    ///
    /// Steps:
    /// 1. Resize to target dimensions
    /// 2. Convert to float and normalize to [0, 1]
    /// 3. Transpose from HWC to NCHW format
    ///
    /// Returns: Array4<f32> with shape [1, 3, height, width]
    pub fn preprocess(&self, image: &RgbImage) -> Array4<f32> {
        let _span = tracing::debug_span!("preprocess").entered();

        let resized;
        let source = if image.dimensions() != (self.target_width, self.target_height) {
            resized = imageops::resize(
                image,
                self.target_width,
                self.target_height,
                imageops::FilterType::Triangle,
            );
            &resized
        } else {
            image
        };

        let (width, height) = source.dimensions();
        let mut tensor = Array4::<f32>::zeros((1, 3, height as usize, width as usize));
        for (x, y, pixel) in source.enumerate_pixels() {
            let (x, y) = (x as usize, y as usize);
            for c in 0..3 {
                tensor[[0, c, y, x]] = f32::from(pixel[c]) / 255.0;
            }
        }
        tensor
    }

    /// Pull the person channel out of a raw model output.
    ///
    /// Handles single-channel `[1, 1, H, W]` / `[1, H, W, 1]` outputs and
    /// two-class `[1, 2, H, W]` / `[1, H, W, 2]` outputs where class 1 is person.
    /// Values outside [0, 1] are treated as logits.
    pub fn postprocess(shape: &[i64], data: &[f32]) -> Result<ProbabilityMap> {
        let _span = tracing::debug_span!("postprocess").entered();

        let dims: Vec<usize> = shape.iter().map(|&d| d.max(0) as usize).collect();
        let (width, height, mut values) = match dims.as_slice() {
            [1, 1, h, w] | [1, h, w, 1] | [h, w] => (*w, *h, data.to_vec()),
            [1, 2, h, w] => {
                let plane = h * w;
                if data.len() < plane * 2 {
                    bail!("output holds {} values, expected {}", data.len(), plane * 2);
                }
                (*w, *h, data[plane..plane * 2].to_vec())
            }
            [1, h, w, 2] => (*w, *h, data.iter().skip(1).step_by(2).copied().collect()),
            other => bail!("unsupported segmentation output shape {other:?}"),
        };

        if looks_like_logits(&values) {
            for v in &mut values {
                *v = 1.0 / (1.0 + (-*v).exp());
            }
        }

        match ProbabilityMap::new(width as u32, height as u32, values) {
            Some(map) => Ok(map),
            None => bail!("output shape {dims:?} does not match {} values", data.len()),
        }
    }
}

fn looks_like_logits(values: &[f32]) -> bool {
    values.iter().any(|&v| !(-0.01..=1.01).contains(&v))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tensor_is_nchw_and_normalized() {
        let image = RgbImage::from_pixel(2, 1, image::Rgb([255, 0, 51]));
        let tensor = Preprocessor::new(2, 1).preprocess(&image);
        assert_eq!(tensor.shape(), &[1, 3, 1, 2]);
        assert!((tensor[[0, 0, 0, 1]] - 1.0).abs() < f32::EPSILON);
        assert!(tensor[[0, 1, 0, 0]].abs() < f32::EPSILON);
        assert!((tensor[[0, 2, 0, 0]] - 0.2).abs() < 1e-6);
    }

    #[test]
    fn downsample_drops_alpha_and_resizes() {
        let frame = RgbaImage::from_pixel(8, 4, image::Rgba([10, 20, 30, 0]));
        let small = Preprocessor::downsample(&frame, 4, 2);
        assert_eq!(small.dimensions(), (4, 2));
        assert_eq!(small.get_pixel(1, 1).0, [10, 20, 30]);
    }

    #[test]
    fn picks_person_plane_from_two_class_nchw() {
        let data = [0.9, 0.8, 0.1, 0.2];
        let map = Preprocessor::postprocess(&[1, 2, 1, 2], &data).unwrap();
        assert_eq!(map.dimensions(), (2, 1));
        assert_eq!(map.values(), &[0.1, 0.2]);
    }

    #[test]
    fn picks_person_channel_from_two_class_nhwc() {
        let data = [0.9, 0.1, 0.3, 0.7, 0.5, 0.5];
        let map = Preprocessor::postprocess(&[1, 3, 1, 2], &data).unwrap();
        assert_eq!(map.dimensions(), (1, 3));
        assert_eq!(map.values(), &[0.1, 0.7, 0.5]);
    }

    #[test]
    fn applies_sigmoid_to_logits() {
        let map = Preprocessor::postprocess(&[1, 1, 1, 3], &[-4.0, 0.0, 4.0]).unwrap();
        let v = map.values();
        assert!(v[0] < 0.05);
        assert!((v[1] - 0.5).abs() < 1e-6);
        assert!(v[2] > 0.95);
    }

    #[test]
    fn rejects_unknown_layout() {
        assert!(Preprocessor::postprocess(&[1, 3, 2, 5], &[0.0; 30]).is_err());
        assert!(Preprocessor::postprocess(&[1, 1, 2, 2], &[0.0; 3]).is_err());
    }
}
