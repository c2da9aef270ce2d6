//! Replays recorded camera frames through the measurement pipeline.
//!
//! The first directory's frames set the zero reference; every further
//! directory yields one sample. The resulting table is printed and can be
//! exported as CSV.
//!
//!   cargo run -p laser_level --bin laser_replay -- zero/ pos1/ pos2/ pos3/ --csv out.csv

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result, bail};
use clap::Parser;
use laser_level::{
    AnalyserFrame, Config, Frame, FramePipeline, SampleCompletion, SampleIntent, SessionEvent,
    SessionWorker, export,
};
use tracing::{debug, info, warn};

#[derive(Parser, Debug)]
#[command(about = "Replay recorded laser line frames and measure flatness")]
struct Args {
    /// Config file (.toml, .yaml or .json); defaults are used if omitted
    #[arg(long)]
    config: Option<PathBuf>,

    /// Directory of frames used to zero the sensor
    zero: PathBuf,

    /// One directory of frames per sample position
    #[arg(required = true)]
    samples: Vec<PathBuf>,

    /// Give up on a measurement after this many seconds
    #[arg(long, default_value_t = 30.0)]
    timeout: f64,

    /// Write the sample table to this CSV file
    #[arg(long)]
    csv: Option<PathBuf>,
}

fn load_frames(dir: &Path) -> Result<Vec<Frame>> {
    let mut paths: Vec<PathBuf> = std::fs::read_dir(dir)
        .with_context(|| format!("reading {}", dir.display()))?
        .filter_map(|entry| entry.ok().map(|entry| entry.path()))
        .filter(|path| path.is_file())
        .collect();
    paths.sort();

    let mut frames = Vec::with_capacity(paths.len());
    for path in paths {
        let gray = match image::open(&path) {
            Ok(image) => image.into_luma8(),
            Err(err) => {
                warn!("Skipping {}: {err}", path.display());
                continue;
            }
        };
        let (width, height) = gray.dimensions();
        match Frame::new(width as usize, height as usize, gray.into_raw()) {
            Ok(frame) => frames.push(frame),
            Err(err) => warn!("Skipping {}: {err}", path.display()),
        }
    }

    if frames.is_empty() {
        bail!("no decodable frames in {}", dir.display());
    }
    info!("Loaded {} frames from {}", frames.len(), dir.display());
    Ok(frames)
}

async fn run_measurement(
    pipeline: &FramePipeline,
    intent: SampleIntent,
    frames: &[Frame],
    limit: Duration,
) -> Result<SampleCompletion> {
    let completion = tokio::time::timeout(limit, pipeline.measure(intent, frames))
        .await
        .with_context(|| format!("{intent:?} did not complete within {limit:?}"))??;

    if let Err(err) = &completion.outcome {
        bail!("{intent:?} failed: {err}");
    }
    Ok(completion)
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let config = match &args.config {
        Some(path) => Config::load(path).with_context(|| format!("loading {}", path.display()))?,
        None => Config::default(),
    };
    common::log_setup::setup_logging(&config.log)?;

    let mut worker = SessionWorker::new(config.calibration(), config.sample_timeout(), |event| {
        if let SessionEvent::SubSampleProgress { received, total } = event {
            debug!("{received}/{total}");
        }
    });
    let handle = worker.handle();
    let mut pipeline = FramePipeline::new(
        config.reducer(),
        config.locator(),
        handle.clone(),
        |frame: AnalyserFrame| {
            if let Some(label) = frame.label {
                debug!("Live reading: {label}");
            }
        },
    );

    let limit = Duration::from_secs_f64(args.timeout);
    let result = async {
        let frames = load_frames(&args.zero)?;
        run_measurement(&pipeline, SampleIntent::Zero, &frames, limit).await?;

        for dir in &args.samples {
            let frames = load_frames(dir)?;
            run_measurement(&pipeline, SampleIntent::Append, &frames, limit).await?;
        }
        anyhow::Ok(())
    }
    .await;

    pipeline.stop();
    let snapshot = handle.snapshot();
    worker.exit();
    result?;

    let units = snapshot.calibration.units;
    println!(
        "{:>6}  {:>14}  {:>14}  {:>14}  {:>14}",
        "Sample", "Measured", "Flattened", "Below Max", "Above Min"
    );
    for sample in &snapshot.samples {
        println!(
            "{:>6}  {:>14}  {:>14}  {:>14}  {:>14}",
            sample.x,
            units.format(sample.y),
            units.format(sample.lin_y_error),
            units.format(sample.shim),
            units.format(sample.scrape),
        );
    }

    if let Some(path) = &args.csv {
        export::write_csv_file(path, &snapshot.samples, units)
            .with_context(|| format!("writing {}", path.display()))?;
        info!("Exported {} samples to {}", snapshot.samples.len(), path.display());
    }

    Ok(())
}
