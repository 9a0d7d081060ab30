use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use anyhow::Result;
use image::RgbaImage;
use tokio::select;
use tokio::sync::watch;
use tokio::task::{JoinHandle, JoinSet};
use tokio::time::{interval, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::mask::{MaskPublisher, MaskTexture, Publication};
use super::preprocess::Preprocessor;
use super::types::{ModelLoader, ProbabilityMap, SegmentationModel};
use crate::config::SegmentationConfig;

/// Lifecycle of the segmentation model.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ModelState {
    /// The session was started without a model; the background mask is final.
    Disabled,
    Loading,
    Ready,
    /// Terminal. Rendering carries on with the background mask.
    Failed(String),
}

impl ModelState {
    pub fn is_ready(&self) -> bool {
        matches!(self, Self::Ready)
    }
}

/// What the inference loop needs from the frame driver on each tick.
#[derive(Debug, Clone, Default)]
pub struct FrameTap {
    /// Identifies the loaded source; bumps on every source change.
    pub source_id: u64,
    /// Latest decoded frame, once the source is ready.
    pub frame: Option<Arc<RgbaImage>>,
    pub playing: bool,
}

#[derive(Debug, Default)]
struct Counters {
    ticks: AtomicU64,
    skipped_idle: AtomicU64,
    skipped_busy: AtomicU64,
    completed: AtomicU64,
    failed: AtomicU64,
    discarded: AtomicU64,
    inference_micros: AtomicU64,
}

/// Point-in-time copy of the provider's counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ProviderStats {
    pub ticks: u64,
    /// Ticks skipped because the video was paused, not ready, or frameless.
    pub skipped_idle: u64,
    /// Ticks skipped because the previous inference was still running.
    pub skipped_busy: u64,
    pub completed: u64,
    pub failed: u64,
    /// Results dropped because the source changed while they were computed.
    pub discarded: u64,
    pub inference_time: Duration,
}

impl ProviderStats {
    /// Mean wall time of a finished pass, whether it was published, failed or dropped.
    pub fn average_inference(&self) -> Duration {
        let runs = self.completed + self.failed + self.discarded;
        if runs == 0 {
            return Duration::ZERO;
        }
        Duration::from_secs_f64(self.inference_time.as_secs_f64() / runs as f64)
    }
}

/// Owns the segmentation model and keeps a best-effort mask published.
///
/// The model is loaded on the blocking pool, then a fixed-interval loop samples
/// the current frame and runs at most one inference at a time. Readers get the
/// latest completed mask through [`MaskProvider::mask`] and never wait on
/// inference.
pub struct MaskProvider {
    cancel: CancellationToken,
    handle: JoinHandle<()>,
    state_rx: watch::Receiver<ModelState>,
    mask_rx: watch::Receiver<Arc<MaskTexture>>,
    counters: Arc<Counters>,
}

impl MaskProvider {
    /// Start loading the model and, once ready, the sampling loop.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn spawn(
        config: SegmentationConfig,
        loader: ModelLoader,
        frames: watch::Receiver<FrameTap>,
    ) -> Self {
        let cancel = CancellationToken::new();
        let (state_tx, state_rx) = watch::channel(ModelState::Loading);
        let (publisher, mask_rx) = MaskPublisher::new();
        let counters = Arc::new(Counters::default());

        let handle = tokio::spawn(run(
            config,
            loader,
            frames,
            publisher,
            state_tx,
            counters.clone(),
            cancel.clone(),
        ));

        Self {
            cancel,
            handle,
            state_rx,
            mask_rx,
            counters,
        }
    }

    pub fn state(&self) -> ModelState {
        self.state_rx.borrow().clone()
    }

    pub fn state_watch(&self) -> watch::Receiver<ModelState> {
        self.state_rx.clone()
    }

    /// Receiver for the published mask. Always holds a valid texture.
    pub fn mask(&self) -> watch::Receiver<Arc<MaskTexture>> {
        self.mask_rx.clone()
    }

    pub fn stats(&self) -> ProviderStats {
        let c = &self.counters;
        ProviderStats {
            ticks: c.ticks.load(Ordering::Relaxed),
            skipped_idle: c.skipped_idle.load(Ordering::Relaxed),
            skipped_busy: c.skipped_busy.load(Ordering::Relaxed),
            completed: c.completed.load(Ordering::Relaxed),
            failed: c.failed.load(Ordering::Relaxed),
            discarded: c.discarded.load(Ordering::Relaxed),
            inference_time: Duration::from_micros(c.inference_micros.load(Ordering::Relaxed)),
        }
    }

    /// Halt the loop and release the mask. An in-flight inference is abandoned.
    pub async fn shutdown(self) {
        self.cancel.cancel();
        if let Err(err) = self.handle.await {
            warn!("mask provider task ended abnormally: {err}");
        }
    }
}

type SharedModel = Arc<Mutex<Box<dyn SegmentationModel>>>;

/// Result of one inference pass, tagged with the source it was computed for.
struct Pass {
    source_id: u64,
    elapsed: Duration,
    result: Result<ProbabilityMap>,
}

async fn run(
    config: SegmentationConfig,
    loader: ModelLoader,
    mut frames: watch::Receiver<FrameTap>,
    publisher: MaskPublisher,
    state_tx: watch::Sender<ModelState>,
    counters: Arc<Counters>,
    cancel: CancellationToken,
) {
    let model = select! {
        _ = cancel.cancelled() => {
            debug!("session ended while the model was loading; discarding it");
            publisher.release();
            return;
        }
        loaded = tokio::task::spawn_blocking(loader) => loaded,
    };

    let model: SharedModel = match model {
        Ok(Ok(model)) => {
            info!(input = ?model.input_size(), "segmentation model ready");
            Arc::new(Mutex::new(model))
        }
        Ok(Err(err)) => {
            warn!("segmentation unavailable, rendering without mask: {err:#}");
            let _ = state_tx.send(ModelState::Failed(format!("{err:#}")));
            return;
        }
        Err(join) => {
            warn!("segmentation model loader panicked: {join}");
            let _ = state_tx.send(ModelState::Failed(join.to_string()));
            return;
        }
    };
    if cancel.is_cancelled() {
        publisher.release();
        return;
    }
    let _ = state_tx.send(ModelState::Ready);

    let mut ticker = interval(config.sample_interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    let mut in_flight: JoinSet<Pass> = JoinSet::new();
    let mut last_source = frames.borrow().source_id;

    loop {
        select! {
            _ = cancel.cancelled() => break,

            _ = ticker.tick() => {
                counters.ticks.fetch_add(1, Ordering::Relaxed);
                if !in_flight.is_empty() {
                    counters.skipped_busy.fetch_add(1, Ordering::Relaxed);
                    continue;
                }

                let tap = frames.borrow_and_update().clone();
                if tap.source_id != last_source {
                    last_source = tap.source_id;
                    reset_model(&model);
                }
                let frame = match tap.frame {
                    Some(frame) if tap.playing => frame,
                    _ => {
                        counters.skipped_idle.fetch_add(1, Ordering::Relaxed);
                        continue;
                    }
                };

                let model = model.clone();
                let config = config.clone();
                let source_id = tap.source_id;
                in_flight.spawn_blocking(move || {
                    let started = Instant::now();
                    let result = infer(&model, &frame, &config);
                    Pass { source_id, elapsed: started.elapsed(), result }
                });
            }

            Some(joined) = in_flight.join_next() => {
                let pass = match joined {
                    Ok(pass) => pass,
                    Err(err) => {
                        warn!("inference task ended abnormally: {err}");
                        counters.failed.fetch_add(1, Ordering::Relaxed);
                        continue;
                    }
                };
                counters
                    .inference_micros
                    .fetch_add(pass.elapsed.as_micros() as u64, Ordering::Relaxed);

                match pass.result {
                    Ok(map) => {
                        if pass.source_id != frames.borrow().source_id {
                            debug!(source = pass.source_id, "dropping mask for a replaced source");
                            counters.discarded.fetch_add(1, Ordering::Relaxed);
                            continue;
                        }
                        let publication = publisher.publish(&map);
                        counters.completed.fetch_add(1, Ordering::Relaxed);
                        if publication == Publication::Reallocated {
                            debug!(size = ?map.dimensions(), "allocated mask texture");
                        }
                    }
                    Err(err) => {
                        // previous mask stays published; the next tick retries
                        debug!("inference failed: {err:#}");
                        counters.failed.fetch_add(1, Ordering::Relaxed);
                    }
                }
            }
        }
    }

    in_flight.detach_all();
    publisher.release();
    debug!("mask provider stopped");
}

/// Lock the model, taking it back from a pass that panicked mid-inference.
///
/// A panicking pass is counted as failed; the next tick retries with the same model.
fn lock_model(model: &SharedModel) -> MutexGuard<'_, Box<dyn SegmentationModel>> {
    model.lock().unwrap_or_else(PoisonError::into_inner)
}

fn reset_model(model: &SharedModel) {
    lock_model(model).reset_state();
}

fn infer(
    model: &SharedModel,
    frame: &RgbaImage,
    config: &SegmentationConfig,
) -> Result<ProbabilityMap> {
    let (width, height) = config.internal_size(frame.width(), frame.height());
    let input = Preprocessor::downsample(frame, width, height);
    let map = lock_model(model).segment(&input)?;
    Ok(map.thresholded(config.confidence_threshold))
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::RgbImage;

    struct Constant;

    impl SegmentationModel for Constant {
        fn segment(&mut self, frame: &RgbImage) -> Result<ProbabilityMap> {
            Ok(ProbabilityMap::filled(frame.width(), frame.height(), 0.8))
        }

        fn input_size(&self) -> (u32, u32) {
            (2, 2)
        }
    }

    #[test]
    fn poisoned_model_is_still_usable() {
        let boxed: Box<dyn SegmentationModel> = Box::new(Constant);
        let model: SharedModel = Arc::new(Mutex::new(boxed));
        let poisoner = model.clone();
        let _ = std::thread::spawn(move || {
            let _guard = poisoner.lock().unwrap();
            panic!("inference crashed");
        })
        .join();
        assert!(model.is_poisoned());

        reset_model(&model);
        let frame = RgbaImage::from_pixel(4, 4, image::Rgba([1, 2, 3, 255]));
        let config = SegmentationConfig::default();
        let map = infer(&model, &frame, &config).unwrap();
        assert_eq!(map.dimensions(), config.internal_size(4, 4));
        assert!(map.values().iter().all(|&v| v == 1.0));
    }

    #[test]
    fn average_counts_every_finished_pass() {
        let stats = ProviderStats {
            completed: 1,
            failed: 1,
            discarded: 2,
            inference_time: Duration::from_millis(400),
            ..ProviderStats::default()
        };
        assert_eq!(stats.average_inference(), Duration::from_millis(100));
        assert_eq!(ProviderStats::default().average_inference(), Duration::ZERO);
    }
}
