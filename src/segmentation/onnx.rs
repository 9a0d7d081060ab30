use super::preprocess::Preprocessor;
use super::types::{ModelLoader, ProbabilityMap, SegmentationModel};
use crate::error::FilterError;
use anyhow::{Context, Result};
use image::RgbImage;
use ort::session::builder::GraphOptimizationLevel;
use ort::session::Session;
use ort::value::Tensor;
use std::path::{Path, PathBuf};

/// Square input size the person-segmentation models are exported at.
const INPUT_SIZE: u32 = 256;
/// Threads ONNX Runtime may use inside one inference call.
const INTRA_THREADS: usize = 4;

/// Person segmentation backed by an ONNX model
///
/// Works with single-output selfie/person segmentation exports
/// (MediaPipe selfie segmentation, MODNet, U2Net-human and similar).
/// The graph settings are fixed; only the model file varies.
pub struct OnnxSegmenter {
    session: Session,
    preprocessor: Preprocessor,
    width: u32,
    height: u32,
}

impl OnnxSegmenter {
    /// Load a model from an ONNX file
    ///
    /// # Configuration
    /// - Input size: 256x256, NCHW, RGB in [0, 1]
    /// - Graph optimization: level 3
    pub fn new<P: AsRef<Path>>(model_path: P) -> Result<Self> {
        let path = model_path.as_ref();

        tracing::info!("Loading segmentation model from {}", path.display());

        let session = Session::builder()?
            .with_optimization_level(GraphOptimizationLevel::Level3)?
            .with_intra_threads(INTRA_THREADS)?
            .commit_from_file(path)
            .with_context(|| format!("Failed to load model from {}", path.display()))?;

        tracing::info!(
            inputs = session.inputs.len(),
            outputs = session.outputs.len(),
            "segmentation model loaded"
        );

        Ok(Self {
            session,
            preprocessor: Preprocessor::new(INPUT_SIZE, INPUT_SIZE),
            width: INPUT_SIZE,
            height: INPUT_SIZE,
        })
    }

    /// A deferred constructor for the mask provider to run off the async runtime.
    pub fn loader(model_path: PathBuf) -> ModelLoader {
        Box::new(move || {
            let model = Self::new(&model_path).map_err(|err| {
                FilterError::ModelLoad(format!("{}: {err:#}", model_path.display()))
            })?;
            Ok(Box::new(model) as Box<dyn SegmentationModel>)
        })
    }
}

impl SegmentationModel for OnnxSegmenter {
    fn segment(&mut self, frame: &RgbImage) -> Result<ProbabilityMap> {
        let _span = tracing::debug_span!("onnx_segment").entered();

        let input = self.preprocessor.preprocess(frame);
        let shape = [1usize, 3, self.height as usize, self.width as usize];
        let tensor = Tensor::from_array((shape, input.into_raw_vec()))
            .context("Failed to build input tensor")?;

        let infer_span = tracing::debug_span!("inference").entered();
        let outputs = self
            .session
            .run(ort::inputs![tensor])
            .context("Failed to run inference")?;
        drop(infer_span);

        let (out_shape, data) = outputs[0]
            .try_extract_tensor::<f32>()
            .context("Segmentation output is not an f32 tensor")?;
        let dims: Vec<i64> = out_shape.iter().copied().collect();

        Preprocessor::postprocess(&dims, data)
    }

    fn input_size(&self) -> (u32, u32) {
        (self.width, self.height)
    }
}
