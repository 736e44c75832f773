use std::path::{Path, PathBuf};

use anyhow::Context;
use clap::Parser;
use futures::future::join_all;
use grow_mask::{ChannelConfig, FilterChannel, FilterConfig, image_helper};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

/// Writes a green growth mask for every input image.
#[derive(Parser)]
#[command(name = "mask_tester")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Filter images through the growth mask channel", long_about = None)]
struct Cli {
    /// Images to filter
    #[arg(required = true)]
    images: Vec<PathBuf>,

    /// Directory the masks are written to
    #[arg(long, short, default_value = "masks")]
    output_dir: PathBuf,

    /// Number of filter workers (defaults to number of CPUs)
    #[arg(long, env = "GROW_MASK_WORKERS")]
    workers: Option<usize>,

    /// Green must exceed this value to count as green
    #[arg(long, default_value_t = FilterConfig::default().green_floor)]
    green_floor: u8,

    /// Dilation radius around each green pixel
    #[arg(long, default_value_t = FilterConfig::default().dilation_radius)]
    radius: u32,
}

fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();
    let cli = Cli::parse();

    let mut config = ChannelConfig::default().with_filter(FilterConfig {
        green_floor: cli.green_floor,
        dilation_radius: cli.radius,
        ..FilterConfig::default()
    });
    if let Some(workers) = cli.workers {
        config = config.with_workers(workers);
    }

    std::fs::create_dir_all(&cli.output_dir)
        .with_context(|| format!("creating {}", cli.output_dir.display()))?;

    let channel = FilterChannel::new(config);
    channel.install();

    // One producer per image, all in flight at once.
    let runs = cli
        .images
        .iter()
        .map(|input| process(&channel, input, &cli.output_dir));
    let results = join_all(runs).await;

    let mut failures = 0;
    for (input, result) in cli.images.iter().zip(results) {
        match result {
            Ok(output) => info!("{} -> {}", input.display(), output.display()),
            Err(err) => {
                failures += 1;
                error!("{}: {:#}", input.display(), err);
            }
        }
    }

    channel.shutdown().await;
    anyhow::ensure!(failures == 0, "{failures} of {} images failed", cli.images.len());
    Ok(())
}

async fn process(
    channel: &FilterChannel,
    input: &Path,
    output_dir: &Path,
) -> anyhow::Result<PathBuf> {
    // Decoding and encoding are CPU and disk bound; keep them off the runtime.
    let path = input.to_path_buf();
    let raster = tokio::task::spawn_blocking(move || image_helper::load(&path))
        .await?
        .with_context(|| format!("loading {}", input.display()))?;
    let (width, height) = raster.dimensions();

    let mut producer = channel.producer();
    let mask = producer.filter(raster).await.context("filtering")?;
    info!(producer = %producer.id(), width, height, "mask received");

    let stem = input
        .file_stem()
        .map(|stem| stem.to_string_lossy().into_owned())
        .unwrap_or_else(|| "image".to_string());
    let output = output_dir.join(format!("{stem}_mask.png"));
    let path = output.clone();
    tokio::task::spawn_blocking(move || image_helper::save(&path, &mask))
        .await?
        .with_context(|| format!("writing {}", output.display()))?;
    Ok(output)
}
