use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use image::RgbaImage;
use tokio::sync::watch;
use tracing::{debug, info, warn};

use super::texture::VideoTexture;
use crate::capture::{ClipMetadata, FrameSource};
use crate::error::FilterError;
use crate::segmentation::FrameTap;

/// Transport and metadata for the loaded source.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PlaybackState {
    pub current_time: Duration,
    /// Known once metadata has loaded; `None` for open-ended sources.
    pub duration: Option<Duration>,
    pub paused: bool,
    pub ended: bool,
    pub native_size: Option<(u32, u32)>,
    /// The frame-sampling texture exists and frames can be rendered.
    pub ready: bool,
}

impl Default for PlaybackState {
    fn default() -> Self {
        Self {
            current_time: Duration::ZERO,
            duration: None,
            paused: true,
            ended: false,
            native_size: None,
            ready: false,
        }
    }
}

impl PlaybackState {
    pub fn is_playing(&self) -> bool {
        self.ready && !self.paused
    }
}

/// Lifecycle notifications from the decoder, applied on the next tick.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DecoderEvent {
    MetadataLoaded(ClipMetadata),
    /// Enough is buffered to render a frame.
    CanPlay,
    Ended,
    Failed(String),
}

/// Owns the video source, its playback clock and the frame-sampling texture.
///
/// Every state change is mirrored to a [`FrameTap`] for the inference loop.
pub struct FrameDriver {
    source: Option<Box<dyn FrameSource>>,
    source_id: u64,
    state: PlaybackState,
    texture: Option<VideoTexture>,
    current: Option<Arc<RgbaImage>>,
    pending: VecDeque<DecoderEvent>,
    tap: watch::Sender<FrameTap>,
}

impl FrameDriver {
    pub fn new() -> (Self, watch::Receiver<FrameTap>) {
        let (tap, tap_rx) = watch::channel(FrameTap::default());
        let driver = Self {
            source: None,
            source_id: 0,
            state: PlaybackState::default(),
            texture: None,
            current: None,
            pending: VecDeque::new(),
            tap,
        };
        (driver, tap_rx)
    }

    /// Replace the current source. Returns the new source id.
    ///
    /// The previous source, its texture and its last frame are gone before
    /// this returns; metadata and readiness arrive on the next [`tick`].
    ///
    /// [`tick`]: FrameDriver::tick
    pub fn load_source(&mut self, mut source: Box<dyn FrameSource>) -> u64 {
        self.release();
        self.source_id += 1;
        self.state = PlaybackState::default();

        match source.probe() {
            Ok(metadata) => {
                self.pending.push_back(DecoderEvent::MetadataLoaded(metadata));
                self.pending.push_back(DecoderEvent::CanPlay);
            }
            Err(err) => self.pending.push_back(DecoderEvent::Failed(format!("{err:#}"))),
        }
        self.source = Some(source);
        self.publish_tap();

        info!(source = self.source_id, "video source assigned");
        self.source_id
    }

    /// Release the source and its texture.
    pub fn unload(&mut self) {
        self.release();
        self.state = PlaybackState::default();
        self.publish_tap();
    }

    fn release(&mut self) {
        if let Some(mut old) = self.source.take() {
            old.stop();
            debug!(source = self.source_id, "released video source");
        }
        self.texture = None;
        self.current = None;
        self.pending.clear();
    }

    pub fn source_id(&self) -> u64 {
        self.source_id
    }

    pub fn state(&self) -> PlaybackState {
        self.state
    }

    pub fn texture(&self) -> Option<&VideoTexture> {
        self.texture.as_ref()
    }

    /// Apply one decoder lifecycle event.
    pub fn handle_event(&mut self, event: DecoderEvent) {
        match event {
            DecoderEvent::MetadataLoaded(metadata) => {
                debug!(
                    width = metadata.width,
                    height = metadata.height,
                    duration = ?metadata.duration,
                    "metadata loaded"
                );
                self.state.duration = metadata.duration;
                self.state.native_size = Some((metadata.width, metadata.height));
            }
            DecoderEvent::CanPlay => self.on_can_play(),
            DecoderEvent::Ended => {
                self.state.ended = true;
                self.state.paused = true;
                if let Some(duration) = self.state.duration {
                    self.state.current_time = duration;
                }
                if let Some(source) = self.source.as_mut() {
                    source.stop();
                }
                info!(source = self.source_id, "playback ended");
            }
            DecoderEvent::Failed(message) => {
                warn!(source = self.source_id, "video source failed: {message}");
            }
        }
        self.publish_tap();
    }

    fn on_can_play(&mut self) {
        if self.state.ready {
            return;
        }
        let (width, height) = match self.state.native_size {
            Some((w, h)) if w > 0 && h > 0 => (w, h),
            _ => {
                debug!("can-play without a frame size; waiting");
                return;
            }
        };

        let mut texture = VideoTexture::bind(self.source_id, width, height);
        if self.decode_current() {
            texture.request_update();
        }
        self.texture = Some(texture);
        self.state.ready = true;
        info!(source = self.source_id, width, height, "video ready");
    }

    /// Decode the frame at the current time into `current`.
    ///
    /// Returns `false` when the source has nothing at that time.
    fn decode_current(&mut self) -> bool {
        let Some(source) = self.source.as_mut() else {
            return false;
        };
        match source.frame_at(self.state.current_time) {
            Ok(Some(frame)) => {
                self.current = Some(frame);
                true
            }
            Ok(None) => false,
            Err(err) => {
                debug!("frame decode failed, keeping last frame: {err:#}");
                self.current.is_some()
            }
        }
    }

    /// One render tick: apply decoder events, advance the clock, and request a
    /// texture refresh when a new frame is due.
    pub fn tick(&mut self, elapsed: Duration) {
        while let Some(event) = self.pending.pop_front() {
            self.handle_event(event);
        }

        if self.state.is_playing() {
            self.state.current_time += elapsed;
            if self.decode_current() {
                if let Some(texture) = self.texture.as_mut() {
                    texture.request_update();
                }
            } else {
                self.handle_event(DecoderEvent::Ended);
            }
        }
        self.publish_tap();
    }

    /// The frame the render path should draw, uploading it first if requested.
    pub fn render_frame(&mut self) -> Option<Arc<RgbaImage>> {
        let texture = self.texture.as_mut()?;
        if let Some(frame) = &self.current {
            texture.upload_if_needed(frame);
        }
        texture.view().cloned()
    }

    /// Start playback. A rejection leaves the driver paused.
    pub fn play(&mut self) -> Result<(), FilterError> {
        let Some(source) = self.source.as_mut() else {
            return Err(FilterError::NoSource);
        };
        if !self.state.paused {
            return Ok(());
        }

        match source.start() {
            Ok(()) => {
                if self.state.ended {
                    self.state.ended = false;
                    self.state.current_time = Duration::ZERO;
                    if self.state.ready && self.decode_current() {
                        if let Some(texture) = self.texture.as_mut() {
                            texture.request_update();
                        }
                    }
                }
                self.state.paused = false;
                self.publish_tap();
                Ok(())
            }
            Err(err) => {
                warn!("playback start rejected: {err:#}");
                self.state.paused = true;
                self.publish_tap();
                Err(FilterError::PlaybackRejected(format!("{err:#}")))
            }
        }
    }

    pub fn pause(&mut self) {
        if self.state.paused {
            return;
        }
        if let Some(source) = self.source.as_mut() {
            source.stop();
        }
        self.state.paused = true;
        self.publish_tap();
    }

    /// Flip between playing and paused. Returns whether it is now playing.
    pub fn toggle_playback(&mut self) -> bool {
        if self.state.paused {
            self.play().is_ok()
        } else {
            self.pause();
            false
        }
    }

    /// Jump to `position`, clamped to the clip. Works while paused.
    pub fn seek(&mut self, position: Duration) {
        if self.source.is_none() {
            return;
        }
        let position = match self.state.duration {
            Some(duration) => position.min(duration),
            None => position,
        };
        self.state.current_time = position;
        self.state.ended = false;

        if self.state.ready && self.decode_current() {
            if let Some(texture) = self.texture.as_mut() {
                texture.request_update();
            }
        }
        debug!(position = ?position, "seek");
        self.publish_tap();
    }

    fn publish_tap(&self) {
        let frame = if self.state.ready {
            self.current.clone()
        } else {
            None
        };
        self.tap.send_replace(FrameTap {
            source_id: self.source_id,
            frame,
            playing: self.state.is_playing(),
        });
    }
}
