use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use image::RgbaImage;
use tokio::sync::watch;
use tracing::{debug, info};

use crate::capture::{AnimatedClip, FrameSource};
use crate::compositor::{Compositor, RenderUniforms};
use crate::config::FilterConfig;
use crate::error::FilterError;
use crate::playback::{FrameDriver, PlaybackState};
use crate::segmentation::{
    MaskPublisher, MaskProvider, MaskTexture, ModelLoader, ModelState, ProviderStats,
};

/// One running instance of the filter.
///
/// Owns the model provider (model, mask buffer, sampling task), the frame
/// driver with its texture, and the compositor. Built by [`FilterSession::start`]
/// and torn down as a unit by [`FilterSession::teardown`].
pub struct FilterSession {
    config: FilterConfig,
    driver: FrameDriver,
    provider: Option<MaskProvider>,
    mask_rx: watch::Receiver<Arc<MaskTexture>>,
    // keeps the background mask alive when no provider runs
    _fallback: Option<MaskPublisher>,
    compositor: Compositor,
    last_tick: Option<Instant>,
}

impl FilterSession {
    /// Start a session. With `loader`, the model begins loading immediately.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn start(config: FilterConfig, loader: Option<ModelLoader>) -> Self {
        let (driver, tap_rx) = FrameDriver::new();
        let compositor = Compositor::new(&config.compositor);

        let (provider, mask_rx, fallback) = match loader {
            Some(loader) => {
                let provider = MaskProvider::spawn(config.segmentation.clone(), loader, tap_rx);
                let mask_rx = provider.mask();
                (Some(provider), mask_rx, None)
            }
            None => {
                info!("no segmentation model configured; background treatment only");
                let (publisher, mask_rx) = MaskPublisher::new();
                (None, mask_rx, Some(publisher))
            }
        };

        Self {
            config,
            driver,
            provider,
            mask_rx,
            _fallback: fallback,
            compositor,
            last_tick: None,
        }
    }

    /// Decode an animated clip off the runtime and make it the current source.
    ///
    /// On failure the current source keeps playing.
    pub async fn open_clip(&mut self, path: &Path) -> Result<u64> {
        let owned = path.to_path_buf();
        let clip = tokio::task::spawn_blocking(move || AnimatedClip::open(owned))
            .await
            .context("clip decoder task failed")?
            .with_context(|| format!("opening clip {}", path.display()))?;
        debug!(frames = clip.frame_count(), "clip decoded");
        Ok(self.load_source(Box::new(clip)))
    }

    /// Swap in a new source; playback state resets to zero.
    pub fn load_source(&mut self, source: Box<dyn FrameSource>) -> u64 {
        self.last_tick = None;
        self.driver.load_source(source)
    }

    pub fn play(&mut self) -> Result<(), FilterError> {
        self.driver.play()
    }

    pub fn pause(&mut self) {
        self.driver.pause();
    }

    pub fn toggle_playback(&mut self) -> bool {
        self.driver.toggle_playback()
    }

    pub fn seek(&mut self, position: Duration) {
        self.driver.seek(position);
    }

    pub fn playback(&self) -> PlaybackState {
        self.driver.state()
    }

    pub fn model_state(&self) -> ModelState {
        match &self.provider {
            Some(provider) => provider.state(),
            None => ModelState::Disabled,
        }
    }

    pub fn provider_stats(&self) -> ProviderStats {
        self.provider
            .as_ref()
            .map(MaskProvider::stats)
            .unwrap_or_default()
    }

    /// The mask the next render tick would use.
    pub fn current_mask(&self) -> Arc<MaskTexture> {
        self.mask_rx.borrow().clone()
    }

    pub fn config(&self) -> &FilterConfig {
        &self.config
    }

    /// Render tick driven by wall-clock time.
    pub fn render_tick(&mut self, now: Instant) -> Option<RgbaImage> {
        let elapsed = self.step_clock(now);
        self.render_elapsed(elapsed)
    }

    /// Like [`render_tick`](Self::render_tick) but draws the mask instead.
    pub fn mask_tick(&mut self, now: Instant) -> Option<RgbaImage> {
        let elapsed = self.step_clock(now);
        self.render_mask(elapsed)
    }

    fn step_clock(&mut self, now: Instant) -> Duration {
        let elapsed = self
            .last_tick
            .map(|last| now.saturating_duration_since(last))
            .unwrap_or_default();
        self.last_tick = Some(now);
        elapsed
    }

    /// Render tick with an explicit clock step.
    ///
    /// Returns `None` until the source is ready. Never waits on inference.
    pub fn render_elapsed(&mut self, elapsed: Duration) -> Option<RgbaImage> {
        self.driver.tick(elapsed);
        let frame = self.driver.render_frame()?;
        let mask = self.current_mask();
        let uniforms = RenderUniforms::new(&frame, &mask, self.config.compositor.edge_threshold);
        Some(self.compositor.render(&uniforms))
    }

    /// Mask visualization at the frame's size, for debugging output.
    pub fn render_mask(&mut self, elapsed: Duration) -> Option<RgbaImage> {
        self.driver.tick(elapsed);
        let frame = self.driver.render_frame()?;
        let (width, height) = frame.dimensions();
        Some(self.current_mask().to_rgba(width, height))
    }

    /// Stop the sampling loop, release the mask, texture and source.
    pub async fn teardown(mut self) {
        if let Some(provider) = self.provider.take() {
            provider.shutdown().await;
        }
        self.driver.unload();
        info!("filter session torn down");
    }
}
