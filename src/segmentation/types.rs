use anyhow::Result;
use image::RgbImage;

/// Person probabilities at the model's output resolution.
///
/// Values are in [0, 1], flattened row-major; 0.0 = background, 1.0 = person.
#[derive(Debug, Clone, PartialEq)]
pub struct ProbabilityMap {
    width: u32,
    height: u32,
    values: Vec<f32>,
}

impl ProbabilityMap {
    /// Wrap raw values. Returns `None` when the length does not match the size.
    pub fn new(width: u32, height: u32, values: Vec<f32>) -> Option<Self> {
        if width == 0 || height == 0 || values.len() != width as usize * height as usize {
            return None;
        }
        Some(Self {
            width,
            height,
            values,
        })
    }

    /// A map with every pixel set to `value`.
    pub fn filled(width: u32, height: u32, value: f32) -> Self {
        let width = width.max(1);
        let height = height.max(1);
        Self {
            width,
            height,
            values: vec![value.clamp(0.0, 1.0); width as usize * height as usize],
        }
    }

    pub fn dimensions(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    pub fn values(&self) -> &[f32] {
        &self.values
    }

    /// Binary person/background decision at `threshold`.
    ///
    /// Pixels at or above the threshold become 1.0, everything else 0.0.
    pub fn thresholded(mut self, threshold: f32) -> Self {
        for v in &mut self.values {
            *v = if *v >= threshold { 1.0 } else { 0.0 };
        }
        self
    }
}

/// Trait for segmentation models
/// Allows swapping between different backends (ONNX models, test doubles, ...)
pub trait SegmentationModel: Send {
    /// Process a frame and return person probabilities
    ///
    /// The output resolution is the model's own and need not match `frame`.
    fn segment(&mut self, frame: &RgbImage) -> Result<ProbabilityMap>;

    /// Reset internal state (for models with temporal components)
    ///
    /// Called when the video source changes.
    fn reset_state(&mut self) {}

    /// Get the model's preferred input dimensions
    ///
    /// Returns (width, height)
    fn input_size(&self) -> (u32, u32);

    /// Get the output dimensions (usually matches input)
    ///
    /// Returns (width, height)
    fn output_size(&self) -> (u32, u32) {
        self.input_size()
    }
}

/// Builds a model. Runs once, on the blocking pool.
pub type ModelLoader = Box<dyn FnOnce() -> Result<Box<dyn SegmentationModel>> + Send>;
