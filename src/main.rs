// main.rs - Dataset inspection for a protoseg data directory

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use rand::rngs::StdRng;
use rand::SeedableRng;
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

use protoseg::{AugmentConfig, Config, Mode, RandomAugmentor, SegDataset, TchFormatter};

#[derive(Debug, Parser)]
#[command(name = "protoseg", about = "Load, filter and batch a segmentation dataset")]
struct Args {
    /// JSON configuration file
    #[arg(short, long)]
    config: PathBuf,

    /// train, val or test
    #[arg(short, long, default_value = "train")]
    mode: Mode,

    /// Number of batches to load
    #[arg(short, long, default_value_t = 1)]
    batches: usize,

    /// Override `batch_size` from the configuration
    #[arg(long)]
    batch_size: Option<usize>,

    #[arg(long)]
    shuffle: bool,

    /// Seed for shuffling
    #[arg(long)]
    seed: Option<u64>,

    /// Apply random augmentation to train/val samples
    #[arg(long)]
    augment: bool,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let args = Args::parse();
    let config = Config::from_json_file(&args.config)
        .with_context(|| format!("failed to load config {}", args.config.display()))?;

    let mut dataset = SegDataset::new(&config, args.mode, TchFormatter::default())
        .with_context(|| format!("failed to build {} dataset", args.mode))?;
    if args.augment {
        dataset = dataset.with_augmentor(RandomAugmentor::new(AugmentConfig::default()));
    }

    let batch_size = args.batch_size.unwrap_or(config.batch_size);
    info!(
        samples = dataset.len(),
        batch_size,
        full_batches = dataset.len() / batch_size.max(1),
        device = ?dataset.formatter().device(),
        "dataset loaded"
    );

    let batches = match (args.shuffle, args.seed) {
        (true, Some(seed)) => {
            dataset.batched_sequence_with_rng(batch_size, &mut StdRng::seed_from_u64(seed))?
        }
        (shuffle, _) => dataset.batched_sequence(batch_size, shuffle)?,
    };

    for (i, batch) in batches.take(args.batches).enumerate() {
        let batch = batch.with_context(|| format!("failed to load batch {}", i))?;
        let formatter = dataset.formatter();
        let images = formatter.collate_images(&batch.images)?;
        if batch.masks.is_empty() {
            info!(batch = i, images = ?images.size(), "loaded batch");
        } else {
            let masks = formatter.collate_masks(&batch.masks)?;
            let foreground = f64::try_from(masks.to_kind(tch::Kind::Float).mean(tch::Kind::Float))?;
            info!(
                batch = i,
                images = ?images.size(),
                masks = ?masks.size(),
                foreground,
                "loaded batch"
            );
        }
        for path in &batch.paths {
            debug!(batch = i, path = %path.display());
        }
    }

    Ok(())
}
