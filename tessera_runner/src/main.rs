//! Runs balancing cycles over a seeded set of readings and renders the partition
//! before every cycle.
//!
//! Stops after `--cycles` cycles, or on Ctrl-C once the running cycle is done.

mod config;

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use tokio::sync::watch;
use tracing::{info, warn, Level};
use tracing_subscriber::FmtSubscriber;

use config::RunnerConfig;
use tessera::core_modules::sampling::{FixedSamples, RandomSamples};
use tessera::core_modules::utils::image_helper::image_helper::PngWriter;
use tessera::pipeline::{CycleObserver, NoObserver, SampleSource};
use tessera::{BalancingPipeline, TileSize};

#[derive(Parser)]
#[command(name = "tessera")]
#[command(version)]
#[command(about = "Keeps a grid partitioned into regions holding about K readings each")]
struct Cli {
    /// TOML file with runner settings and a [balance] table; flags override it
    #[arg(long, env = "TESSERA_CONFIG")]
    config: Option<PathBuf>,

    /// Grid width in cells [default: 50]
    #[arg(long)]
    width: Option<u32>,

    /// Grid height in cells [default: 50]
    #[arg(long)]
    height: Option<u32>,

    /// Target reading count per region (K) [default: 10]
    #[arg(long, short = 'k')]
    target: Option<u32>,

    /// Readings per batch [default: 100]
    #[arg(long)]
    samples: Option<usize>,

    /// Seed for the reading generator [default: 10]
    #[arg(long)]
    seed: Option<u64>,

    /// Stop after this many cycles (runs until Ctrl-C otherwise)
    #[arg(long)]
    cycles: Option<u64>,

    /// Start from tiles of this width instead of one region
    #[arg(long, requires = "tile_height")]
    tile_width: Option<u32>,

    /// Start from tiles of this height instead of one region
    #[arg(long, requires = "tile_width")]
    tile_height: Option<u32>,

    /// Draw a fresh batch of readings every cycle
    #[arg(long)]
    resample: bool,

    /// Directory the cycle images are written to [default: images]
    #[arg(long)]
    output_dir: Option<PathBuf>,

    /// Pixels per grid cell [default: 8]
    #[arg(long)]
    scale: Option<u32>,

    /// Do not write images
    #[arg(long)]
    no_render: bool,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,
}

impl Cli {
    fn into_config(self) -> Result<RunnerConfig> {
        let mut config = match &self.config {
            Some(path) => RunnerConfig::load(path)?,
            None => RunnerConfig::default(),
        };

        let balance = &mut config.balance;
        if let Some(width) = self.width {
            balance.width = width;
        }
        if let Some(height) = self.height {
            balance.height = height;
        }
        if let Some(target) = self.target {
            balance.target = target;
        }
        if let (Some(width), Some(height)) = (self.tile_width, self.tile_height) {
            balance.initial_tile = Some(TileSize { width, height });
        }

        if let Some(samples) = self.samples {
            config.samples = samples;
        }
        if let Some(seed) = self.seed {
            config.seed = seed;
        }
        if self.cycles.is_some() {
            config.cycles = self.cycles;
        }
        if let Some(dir) = self.output_dir {
            config.output_dir = dir;
        }
        if let Some(scale) = self.scale {
            config.scale = scale;
        }
        config.resample |= self.resample;
        config.render &= !self.no_render;

        config.validate()?;
        Ok(config)
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Set up logging
    let level = if cli.verbose { Level::DEBUG } else { Level::INFO };
    FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(false)
        .compact()
        .init();

    let config = cli.into_config()?;
    let balance = &config.balance;
    info!(
        width = balance.width,
        height = balance.height,
        target = balance.target,
        samples = config.samples,
        seed = config.seed,
        "Starting"
    );

    let pipeline = BalancingPipeline::new(balance.clone())
        .context("failed to build the initial partition")?;
    let grid = pipeline.partition().grid();

    let source: Box<dyn SampleSource + Send> = if config.resample {
        Box::new(RandomSamples::seeded(grid, config.samples, config.seed))
    } else {
        Box::new(FixedSamples::seeded(grid, config.samples, config.seed))
    };

    let observer: Box<dyn CycleObserver + Send> = if config.render {
        let writer = PngWriter::new(&config.output_dir, balance.target, config.scale)
            .with_context(|| format!("cannot write images to {}", config.output_dir.display()))?;
        info!(dir = %config.output_dir.display(), "Writing one image per cycle");
        Box::new(writer)
    } else {
        Box::new(NoObserver)
    };

    // Ctrl-C only flips a flag; the pipeline checks it between cycles.
    let (stop_tx, stop_rx) = watch::channel(false);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupted, stopping after the current cycle");
            let _ = stop_tx.send(true);
        }
    });

    let limit = config.cycles;
    let ran = tokio::task::spawn_blocking(move || {
        let (mut pipeline, mut source, mut observer) = (pipeline, source, observer);
        let ran = pipeline.run(source.as_mut(), observer.as_mut(), |report| {
            info!(
                cycle = report.cycle,
                regions = report.regions,
                under = report.under,
                at = report.at,
                over = report.over,
                "Cycle complete"
            );
            !*stop_rx.borrow() && limit.is_none_or(|max| report.cycle < max)
        });
        ran.map(|ran| (ran, pipeline.partition().len()))
    })
    .await
    .context("balancing task failed")?
    .context("balancing cycle failed")?;

    let (cycles, regions) = ran;
    info!(cycles, regions, "Finished");
    Ok(())
}
