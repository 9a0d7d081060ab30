use anyhow::{Context, Result};
use clap::Parser;
use lineart_fx::config::{self, FilterConfig};
use lineart_fx::output::{OutputSink, PngSequence};
use lineart_fx::pipeline::{self, PipelineOptions};
use lineart_fx::segmentation::{ModelLoader, OnnxSegmenter};
use lineart_fx::FilterSession;
use std::path::PathBuf;
use tokio_util::sync::CancellationToken;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Animated GIF or APNG to play through the filter
    clip: PathBuf,

    /// YAML configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Path to segmentation model (ONNX file)
    /// If not provided, every pixel gets the background treatment
    #[arg(long)]
    model: Option<PathBuf>,

    /// Directory for the rendered PNG frames
    #[arg(short, long, default_value = "lineart-out")]
    output_dir: PathBuf,

    /// Stream to a v4l2loopback device instead of writing PNG files
    #[cfg(feature = "loopback")]
    #[arg(long)]
    loopback: Option<PathBuf>,

    /// Output resolution width (loopback device)
    #[cfg(feature = "loopback")]
    #[arg(long, default_value_t = 1280)]
    output_width: u32,

    /// Output resolution height (loopback device)
    #[cfg(feature = "loopback")]
    #[arg(long, default_value_t = 720)]
    output_height: u32,

    /// Target frames per second (overrides the config file)
    #[arg(long)]
    fps: Option<u32>,

    /// Write the segmentation mask (grayscale silhouette) instead of the composite
    #[arg(long)]
    show_mask: bool,

    /// Enable debug logging
    #[arg(long)]
    debug: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let log_level = if args.debug {
        tracing::Level::DEBUG
    } else {
        tracing::Level::INFO
    };

    tracing_subscriber::fmt()
        .with_max_level(log_level)
        .with_target(false)
        .init();

    tracing::info!("lineart-fx starting");

    let mut cfg = match &args.config {
        Some(path) => config::from_yaml_file(path)
            .with_context(|| format!("loading config from {}", path.display()))?,
        None => FilterConfig::default(),
    };
    if let Some(model) = &args.model {
        cfg.segmentation.model = Some(model.clone());
    }
    if let Some(fps) = args.fps {
        cfg.render.fps = fps;
    }
    cfg.validate().context("validating configuration")?;

    tracing::info!("Target FPS: {}", cfg.render.fps);
    tracing::info!(
        "Segmentation every {:?}, threshold {}, internal resolution {}",
        cfg.segmentation.sample_interval,
        cfg.segmentation.confidence_threshold,
        cfg.segmentation.internal_resolution
    );

    let loader: Option<ModelLoader> = cfg.segmentation.model.clone().map(OnnxSegmenter::loader);
    let fps = cfg.render.fps;
    let mut session = FilterSession::start(cfg, loader);

    session
        .open_clip(&args.clip)
        .await
        .context("Failed to open clip")?;
    if let Err(err) = session.play() {
        tracing::warn!("could not start playback: {err}");
    }

    let cancel = CancellationToken::new();
    tokio::spawn({
        let cancel = cancel.clone();
        async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                tracing::info!("Interrupted, stopping");
                cancel.cancel();
            }
        }
    });

    let options = PipelineOptions {
        fps,
        show_mask: args.show_mask,
        stop_when_ended: true,
    };

    let mut output = open_output(&args)?;
    let result = pipeline::run(&mut session, output.as_mut(), options, cancel).await;

    match session.model_state() {
        lineart_fx::segmentation::ModelState::Failed(reason) => {
            tracing::warn!("segmentation was unavailable: {reason}");
        }
        state => tracing::debug!("final model state: {:?}", state),
    }
    session.teardown().await;

    let report = result?;
    tracing::info!(
        "Done: {} frames written over {} ticks",
        report.frames_written,
        report.ticks
    );
    Ok(())
}

fn open_output(args: &Args) -> Result<Box<dyn OutputSink>> {
    #[cfg(feature = "loopback")]
    if let Some(device) = &args.loopback {
        tracing::info!("Output: {}x{}", args.output_width, args.output_height);
        let output =
            lineart_fx::output::V4L2Output::new(device, args.output_width, args.output_height)
                .context("Failed to initialize v4l2loopback output")?;
        return Ok(Box::new(output));
    }

    let output = PngSequence::new(&args.output_dir).context("Failed to initialize PNG output")?;
    Ok(Box::new(output))
}
