use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use image::{imageops, RgbaImage};
use tokio::runtime::{Handle, RuntimeFlavor};
use tokio::select;
use tokio::time::{interval, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::config::RenderConfig;
use crate::output::OutputSink;
use crate::session::FilterSession;

/// How often per-stage averages are logged.
const STATS_EVERY: u64 = 30;

#[derive(Debug, Clone, Copy)]
pub struct PipelineOptions {
    pub fps: u32,
    /// Write the mask visualization instead of the composite.
    pub show_mask: bool,
    /// Return once the clip has played to its end.
    pub stop_when_ended: bool,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PipelineReport {
    pub ticks: u64,
    pub frames_written: u64,
}

/// The render loop: tick the session at display rate and hand frames to `output`.
///
/// Never waits on inference; each tick draws with whatever mask is published.
/// The composite is CPU work proportional to the frame area. On a multi-thread
/// runtime it runs under `block_in_place` so other tasks move off this worker.
pub async fn run<O: OutputSink + ?Sized>(
    session: &mut FilterSession,
    output: &mut O,
    options: PipelineOptions,
    cancel: CancellationToken,
) -> Result<PipelineReport> {
    let frame_duration = RenderConfig { fps: options.fps }.frame_duration();
    let target = output.resolution();
    let mut ticker = interval(frame_duration);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    let mut report = PipelineReport::default();
    let mut total_render_time = Duration::ZERO;
    let mut total_output_time = Duration::ZERO;

    info!("Starting render loop at {} fps", options.fps);
    if options.show_mask {
        info!("Writing mask visualization instead of the composite");
    }
    if let Some((width, height)) = target {
        info!("Output fixed at {}x{}, frames are resized to fit", width, height);
    }

    loop {
        select! {
            _ = cancel.cancelled() => {
                debug!("render loop cancelled");
                break;
            }
            _ = ticker.tick() => {}
        }
        report.ticks += 1;

        let render_start = Instant::now();
        let frame = render_heavy(|| {
            let frame = if options.show_mask {
                session.mask_tick(render_start)
            } else {
                session.render_tick(render_start)
            };
            frame.map(|frame| fit_to(frame, target))
        });
        total_render_time += render_start.elapsed();

        if let Some(frame) = frame {
            let output_start = Instant::now();
            output
                .write_frame(&frame)
                .context("Failed to write frame")?;
            total_output_time += output_start.elapsed();
            report.frames_written += 1;

            if report.frames_written % STATS_EVERY == 0 {
                let n = report.frames_written as f64;
                let avg_render_ms = total_render_time.as_secs_f64() * 1000.0 / n;
                let avg_output_ms = total_output_time.as_secs_f64() * 1000.0 / n;
                let stats = session.provider_stats();
                info!(
                    "Frame {}: render={:.1}ms, output={:.1}ms, masks={}, busy={}, segment={:.1}ms",
                    report.frames_written,
                    avg_render_ms,
                    avg_output_ms,
                    stats.completed,
                    stats.skipped_busy,
                    stats.average_inference().as_secs_f64() * 1000.0,
                );
            }
        }

        if options.stop_when_ended && session.playback().ended {
            info!(frames = report.frames_written, "clip finished");
            break;
        }
    }

    Ok(report)
}

fn render_heavy<T>(render: impl FnOnce() -> T) -> T {
    match Handle::try_current().map(|handle| handle.runtime_flavor()) {
        Ok(RuntimeFlavor::MultiThread) => tokio::task::block_in_place(render),
        _ => render(),
    }
}

/// Resize to the sink's fixed resolution, if it has one.
fn fit_to(frame: RgbaImage, target: Option<(u32, u32)>) -> RgbaImage {
    match target {
        Some((width, height)) if frame.dimensions() != (width, height) => {
            imageops::resize(&frame, width, height, imageops::FilterType::Triangle)
        }
        _ => frame,
    }
}
