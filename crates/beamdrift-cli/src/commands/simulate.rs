use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use beamdrift_core::geometry::Position;
use beamdrift_core::io::{DirectorySink, StoredShiftsSource};
use beamdrift_core::pipeline::config::{InitialTrackSource, MotionFitConfig};
use beamdrift_core::pipeline::{MicrographMotion, MicrographSource, MotionEstimator, MotionSink};
use beamdrift_core::synthetic::{SyntheticConfig, SyntheticDataset};
use clap::Args;
use tracing::info;

use crate::progress::BarReporter;
use crate::summary::{print_config_summary, print_motion_summary, print_search_outcome};

#[derive(Args)]
pub struct SimulateArgs {
    /// Motion-fit config file (TOML)
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Tune the prior hyperparameters instead of writing tracks
    #[arg(long)]
    pub params: bool,

    /// Number of micrographs
    #[arg(long, default_value = "2")]
    pub micrographs: usize,

    /// Particles per micrograph
    #[arg(long, default_value = "6")]
    pub particles: usize,

    /// Frames per movie
    #[arg(long, default_value = "8")]
    pub frames: usize,

    /// Particle box size in pixels
    #[arg(long, default_value = "32")]
    pub box_size: usize,

    /// Drift per frame, "x,y" in pixels
    #[arg(long, default_value = "0.4,-0.25")]
    pub drift: String,

    /// Amplitude of the per-particle deviation from the drift (pixels)
    #[arg(long, default_value = "0.3")]
    pub wobble: f64,

    /// Frequency cutoff in pixels (overrides the config)
    #[arg(long)]
    pub k_cutoff: Option<f64>,

    /// Worker threads (0 = all cores)
    #[arg(long)]
    pub threads: Option<usize>,

    /// Write diagnostic tracks and correlation images
    #[arg(long)]
    pub diagnostics: bool,

    /// Start from the tracks written by a previous run into this directory
    #[arg(long)]
    pub shifts_from: Option<PathBuf>,

    /// Output directory
    #[arg(short, long, default_value = "motion")]
    pub output: PathBuf,
}

/// Collects results in memory while forwarding them to the output directory.
struct TeeSink {
    dir: DirectorySink,
    results: Vec<MicrographMotion>,
}

impl MotionSink for TeeSink {
    fn write(&mut self, motion: &MicrographMotion) -> beamdrift_core::error::Result<()> {
        self.dir.write(motion)?;
        self.results.write(motion)
    }
}

pub fn run(args: &SimulateArgs) -> Result<()> {
    let mut config: MotionFitConfig = if let Some(ref path) = args.config {
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config {}", path.display()))?;
        toml::from_str(&contents).context("Invalid motion-fit config")?
    } else {
        MotionFitConfig::default()
    };
    if args.k_cutoff.is_some() {
        config.k_cutoff = args.k_cutoff;
    }
    if let Some(threads) = args.threads {
        config.threads = threads;
    }
    config.diagnostics |= args.diagnostics;

    let dataset = SyntheticDataset::new(SyntheticConfig {
        micrographs: args.micrographs,
        particles: args.particles,
        frames: args.frames,
        box_size: args.box_size,
        drift: parse_pair(&args.drift)?,
        wobble: args.wobble,
        ..Default::default()
    })?;

    let stored = args
        .shifts_from
        .as_ref()
        .map(|dir| StoredShiftsSource::new(&dataset, dir));
    if stored.is_some() {
        config.init.source = InitialTrackSource::Metadata;
    }
    let source: &dyn MicrographSource = match &stored {
        Some(stored) => stored,
        None => &dataset,
    };

    print_config_summary(&config, args.params);

    let reporter = Arc::new(BarReporter::new(args.micrographs)?);
    let estimator =
        MotionEstimator::new(config.clone(), source)?.with_reporter(reporter.clone());
    info!(threads = estimator.thread_count(), "Thread pool ready");

    if args.params {
        let outcome = estimator.estimate_params()?;
        reporter.finish("Done");
        print_search_outcome(&outcome);
        return Ok(());
    }

    let mut sink = TeeSink {
        dir: DirectorySink::new(&args.output, config.diagnostics)?,
        results: Vec::new(),
    };
    let summary = estimator.estimate_motion(&mut sink)?;
    reporter.finish("Done");

    let errors: Vec<f64> = sink
        .results
        .iter()
        .map(|motion| {
            let truth = dataset.true_tracks(motion.index);
            track_rms_error(&motion.total_tracks(), &truth)
        })
        .collect();
    print_motion_summary(&summary, &errors, sink.dir.root());

    Ok(())
}

fn parse_pair(s: &str) -> Result<Position> {
    let (x, y) = s
        .split_once(',')
        .with_context(|| format!("Expected \"x,y\", got \"{s}\""))?;
    Ok(Position::new(
        x.trim().parse().context("Invalid x")?,
        y.trim().parse().context("Invalid y")?,
    ))
}

/// RMS distance between estimated and true positions over all particles
/// and frames.
fn track_rms_error(estimated: &[Vec<Position>], truth: &[Vec<Position>]) -> f64 {
    let mut sum = 0.0;
    let mut n = 0usize;
    for (est, tru) in estimated.iter().zip(truth) {
        for (e, t) in est.iter().zip(tru) {
            sum += e.distance(t).powi(2);
            n += 1;
        }
    }
    if n == 0 {
        0.0
    } else {
        (sum / n as f64).sqrt()
    }
}
