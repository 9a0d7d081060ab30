pub mod mask;
mod onnx;
mod preprocess;
pub mod provider;
pub mod types;

pub use mask::{MaskPublisher, MaskTexture, Publication};
pub use onnx::OnnxSegmenter;
pub use preprocess::Preprocessor;
pub use provider::{FrameTap, MaskProvider, ModelState, ProviderStats};
pub use types::{ModelLoader, ProbabilityMap, SegmentationModel};
