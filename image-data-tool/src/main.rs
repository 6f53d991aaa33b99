use anyhow::{bail, Context, Result};
use clap::Parser;
use image_data::{ImageDataConfig, ImageDataLayer};
use itertools::Itertools;
use label_list::{LabelGroup, Manifest};
use prettytable::{cell, row, Table};
use tch::Device;
use tch_tensor_like::TensorLike;
use std::{
    collections::BTreeMap,
    env,
    path::{Path, PathBuf},
    time::{Duration, Instant},
};
use tracing::info;
use tracing_subscriber::{filter::LevelFilter, prelude::*, EnvFilter};

#[derive(Debug, Clone, Parser)]
/// Inspect label list manifests and benchmark the image data layer
enum Opts {
    /// Parse the manifest and print its summary
    Inspect {
        /// configuration file
        config_file: PathBuf,
    },
    /// Run the prefetcher and report the batch wait time
    Bench {
        /// configuration file
        config_file: PathBuf,
        /// number of batches to consume
        #[clap(long, default_value = "100")]
        num_batches: usize,
        /// simulated training step time in milliseconds
        #[clap(long, default_value = "0")]
        step_delay_ms: u64,
        /// device that batches are moved to, e.g. "cpu" or "cuda:0"
        #[clap(long, default_value = "cpu", parse(try_from_str = parse_device))]
        device: Device,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    // setup tracing
    let fmt_layer = tracing_subscriber::fmt::layer().with_target(true).compact();
    let filter_layer = {
        let filter = EnvFilter::from_default_env();
        if env::var("RUST_LOG").is_err() {
            filter.add_directive(LevelFilter::INFO.into())
        } else {
            filter
        }
    };
    tracing_subscriber::registry()
        .with(filter_layer)
        .with(fmt_layer)
        .init();

    match Opts::parse() {
        Opts::Inspect { config_file } => {
            inspect(config_file)?;
        }
        Opts::Bench {
            config_file,
            num_batches,
            step_delay_ms,
            device,
        } => {
            bench(
                config_file,
                num_batches,
                Duration::from_millis(step_delay_ms),
                device,
            )
            .await?;
        }
    }

    Ok(())
}

fn load_config(config_file: &Path) -> Result<ImageDataConfig> {
    ImageDataConfig::open(config_file)
        .with_context(|| format!("failed to load config file '{}'", config_file.display()))
}

fn inspect(config_file: impl AsRef<Path>) -> Result<()> {
    let config = load_config(config_file.as_ref())?;
    let manifest = config
        .label_list_parser_init()
        .build()?
        .open(&config.source)?;

    // print the summary
    {
        let mut table = Table::new();
        table.add_row(row!["source", config.source.display()]);
        table.add_row(row!["records", manifest.len()]);
        table.add_row(row!["multi-label", manifest.is_multi_label()]);
        table.add_row(row!["labels per line", manifest.num_labels_per_line()]);
        table.add_row(row!["max label id", manifest.max_label_id()]);
        table.add_row(row!["conflicts", manifest.num_conflicts()]);
        table.printstd();
    }

    // print per-label counts
    {
        let mut table = Table::new();
        table.add_row(row!["label", "positive", "ignore"]);
        label_counts(&manifest)
            .into_iter()
            .for_each(|(label, [positive, ignore])| {
                table.add_row(row![label, positive, ignore]);
            });
        table.printstd();
    }

    Ok(())
}

/// Count the records listing each label id, per label group.
fn label_counts(manifest: &Manifest) -> BTreeMap<i64, [usize; 2]> {
    let mut counts = BTreeMap::new();

    manifest.records().iter().for_each(|record| {
        LabelGroup::ALL.into_iter().for_each(|group| {
            record.labels(group).iter().unique().for_each(|&label| {
                let entry: &mut [usize; 2] = counts.entry(label).or_default();
                entry[group.index()] += 1;
            });
        });
    });

    counts
}

fn parse_device(text: &str) -> Result<Device> {
    let device = match text {
        "cpu" => Device::Cpu,
        "cuda" => Device::Cuda(0),
        _ => match text.strip_prefix("cuda:") {
            Some(index) => Device::Cuda(
                index
                    .parse()
                    .with_context(|| format!("invalid CUDA device index '{}'", index))?,
            ),
            None => bail!("expect 'cpu', 'cuda' or 'cuda:N', but get '{}'", text),
        },
    };
    Ok(device)
}

async fn bench(
    config_file: impl AsRef<Path>,
    num_batches: usize,
    step_delay: Duration,
    device: Device,
) -> Result<()> {
    let config = load_config(config_file.as_ref())?;
    let layer = ImageDataLayer::new(&config)?;
    let data_shape = layer.data_shape();
    let label_shape = layer.label_shape();
    let prefetcher = layer.start()?;

    let since = Instant::now();
    let mut waits = Vec::with_capacity(num_batches);
    let mut transfer = Duration::ZERO;
    let mut last_epoch = 0;

    for _ in 0..num_batches {
        let instant = Instant::now();
        let guard = prefetcher.recv_async().await?;
        waits.push(instant.elapsed());

        // a CPU move shares storage with the slot, keep the guard until the step ends
        let instant = Instant::now();
        let batch = guard.f_to_device(device)?;
        transfer += instant.elapsed();
        last_epoch = batch.epoch;

        if !step_delay.is_zero() {
            tokio::time::sleep(step_delay).await;
        }
    }

    let elapsed = since.elapsed();
    prefetcher.stop()?;
    info!("consumed {} batches in {:?}", num_batches, elapsed);

    let total_wait: Duration = waits.iter().sum();
    let (min_wait, max_wait) = waits
        .iter()
        .copied()
        .minmax()
        .into_option()
        .unwrap_or_default();
    let mean_wait = total_wait
        .checked_div(num_batches as u32)
        .unwrap_or_default();
    let images_per_sec = (num_batches as i64 * data_shape[0]) as f64 / elapsed.as_secs_f64();

    let mut table = Table::new();
    table.add_row(row!["data shape", format!("{:?}", data_shape)]);
    table.add_row(row!["label shape", format!("{:?}", label_shape)]);
    table.add_row(row!["device", format!("{:?}", device)]);
    table.add_row(row!["batches", num_batches]);
    table.add_row(row!["last epoch", last_epoch]);
    table.add_row(row!["mean wait", format!("{:?}", mean_wait)]);
    table.add_row(row!["min wait", format!("{:?}", min_wait)]);
    table.add_row(row!["max wait", format!("{:?}", max_wait)]);
    table.add_row(row!["transfer", format!("{:?}", transfer)]);
    table.add_row(row!["images/s", format!("{:.1}", images_per_sec)]);
    table.printstd();

    Ok(())
}
