mod clip;

pub use clip::AnimatedClip;

use anyhow::Result;
use image::RgbaImage;
use std::sync::Arc;
use std::time::Duration;

/// What a source reports once its header has been read.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClipMetadata {
    pub width: u32,
    pub height: u32,
    /// `None` for open-ended sources.
    pub duration: Option<Duration>,
}

/// Trait for time-indexed video sources
pub trait FrameSource: Send {
    /// Read the header: native size and duration
    fn probe(&mut self) -> Result<ClipMetadata>;

    /// Attempt to start playback; a source may refuse
    fn start(&mut self) -> Result<()> {
        Ok(())
    }

    /// Playback paused or the source is being released
    fn stop(&mut self) {}

    /// Frame shown at `position`, or `None` once past the end
    fn frame_at(&mut self, position: Duration) -> Result<Option<Arc<RgbaImage>>>;
}
