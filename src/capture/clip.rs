use super::{ClipMetadata, FrameSource};
use crate::error::FilterError;
use anyhow::Result;
use image::codecs::gif::GifDecoder;
use image::codecs::png::PngDecoder;
use image::{AnimationDecoder, Frames, RgbaImage};
use std::fs::File;
use std::io::BufReader;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

/// Delay used for frames that declare none (browsers do the same for GIFs).
const DEFAULT_FRAME_DELAY: Duration = Duration::from_millis(100);

/// A fully decoded animated image (GIF or APNG) played back as video
pub struct AnimatedClip {
    /// Frame start times, ascending, first is zero
    starts: Vec<Duration>,
    frames: Vec<Arc<RgbaImage>>,
    duration: Duration,
    width: u32,
    height: u32,
}

impl AnimatedClip {
    /// Decode every frame of an animated GIF or APNG file
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, FilterError> {
        let path = path.as_ref();
        let _span = tracing::debug_span!("decode_clip", path = %path.display()).entered();

        let extension = path
            .extension()
            .and_then(|e| e.to_str())
            .map(str::to_ascii_lowercase)
            .unwrap_or_default();
        let reader = BufReader::new(File::open(path)?);

        let frames = match extension.as_str() {
            "gif" => collect(GifDecoder::new(reader)?.into_frames())?,
            "png" | "apng" => {
                let decoder = PngDecoder::new(reader)?;
                if !decoder.is_apng()? {
                    return Err(FilterError::UnsupportedFormat(format!(
                        "{} is a still PNG",
                        path.display()
                    )));
                }
                collect(decoder.apng()?.into_frames())?
            }
            other => {
                return Err(FilterError::UnsupportedFormat(format!(
                    "unknown extension {other:?} for {}",
                    path.display()
                )))
            }
        };

        let clip = Self::from_frames(frames)?;
        tracing::info!(
            "Decoded {} frames ({}x{}, {:.2}s) from {}",
            clip.frames.len(),
            clip.width,
            clip.height,
            clip.duration.as_secs_f32(),
            path.display()
        );
        Ok(clip)
    }

    /// Build a clip from frames and their display durations
    pub fn from_frames(frames: Vec<(RgbaImage, Duration)>) -> Result<Self, FilterError> {
        let (width, height) = match frames.first() {
            Some((first, _)) => first.dimensions(),
            None => return Err(FilterError::EmptyClip),
        };

        let mut starts = Vec::with_capacity(frames.len());
        let mut images = Vec::with_capacity(frames.len());
        let mut cursor = Duration::ZERO;
        for (index, (image, delay)) in frames.into_iter().enumerate() {
            if image.dimensions() != (width, height) {
                return Err(FilterError::FrameSize {
                    index,
                    width: image.width(),
                    height: image.height(),
                    expected_width: width,
                    expected_height: height,
                });
            }
            starts.push(cursor);
            images.push(Arc::new(image));
            cursor += if delay.is_zero() {
                DEFAULT_FRAME_DELAY
            } else {
                delay
            };
        }

        Ok(Self {
            starts,
            frames: images,
            duration: cursor,
            width,
            height,
        })
    }

    pub fn frame_count(&self) -> usize {
        self.frames.len()
    }

    pub fn duration(&self) -> Duration {
        self.duration
    }
}

fn collect(frames: Frames<'_>) -> Result<Vec<(RgbaImage, Duration)>, FilterError> {
    let frames = frames.collect_frames()?;
    Ok(frames
        .into_iter()
        .map(|frame| {
            let delay = Duration::from(frame.delay());
            (frame.into_buffer(), delay)
        })
        .collect())
}

impl FrameSource for AnimatedClip {
    fn probe(&mut self) -> Result<ClipMetadata> {
        Ok(ClipMetadata {
            width: self.width,
            height: self.height,
            duration: Some(self.duration),
        })
    }

    fn frame_at(&mut self, position: Duration) -> Result<Option<Arc<RgbaImage>>> {
        if position >= self.duration {
            return Ok(None);
        }
        let index = self.starts.partition_point(|&start| start <= position);
        Ok(index
            .checked_sub(1)
            .and_then(|i| self.frames.get(i))
            .cloned())
    }
}
