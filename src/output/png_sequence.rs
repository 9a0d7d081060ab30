use super::OutputSink;
use anyhow::{Context, Result};
use image::RgbaImage;
use std::fs;
use std::path::{Path, PathBuf};

/// Writes each frame as `frame_000001.png`, `frame_000002.png`, ... in a directory
pub struct PngSequence {
    dir: PathBuf,
    next_index: u64,
}

impl PngSequence {
    pub fn new<P: AsRef<Path>>(dir: P) -> Result<Self> {
        let dir = dir.as_ref().to_path_buf();
        fs::create_dir_all(&dir)
            .with_context(|| format!("Failed to create output directory {}", dir.display()))?;
        tracing::info!("Writing frames to {}", dir.display());
        Ok(Self { dir, next_index: 1 })
    }

    pub fn frames_written(&self) -> u64 {
        self.next_index - 1
    }

    fn path_for(&self, index: u64) -> PathBuf {
        self.dir.join(format!("frame_{index:06}.png"))
    }
}

impl OutputSink for PngSequence {
    fn write_frame(&mut self, frame: &RgbaImage) -> Result<()> {
        let path = self.path_for(self.next_index);
        frame
            .save(&path)
            .with_context(|| format!("Failed to write {}", path.display()))?;
        self.next_index += 1;
        Ok(())
    }

    fn resolution(&self) -> Option<(u32, u32)> {
        None
    }
}
