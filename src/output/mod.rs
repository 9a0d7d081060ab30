#[cfg(feature = "loopback")]
mod loopback;
mod png_sequence;

#[cfg(feature = "loopback")]
pub use loopback::V4L2Output;
pub use png_sequence::PngSequence;

use anyhow::Result;
use image::RgbaImage;

/// Trait for output destinations
pub trait OutputSink {
    /// Write a frame to the output
    fn write_frame(&mut self, frame: &RgbaImage) -> Result<()>;

    /// Get the expected output resolution, if the sink fixes one
    fn resolution(&self) -> Option<(u32, u32)>;
}
