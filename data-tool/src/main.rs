use anyhow::{ensure, Context, Result};
use clap::Parser;
use prettytable::{cell, row, Table};
use std::{env, ops::Range, path::PathBuf};
use tracing_subscriber::{filter::LevelFilter, prelude::*, EnvFilter};
use vision_data::{
    build_dataset, build_dataset_with_transform, build_transform,
    config::Config,
    dataset::{GenericDataset as _, RandomAccessDataset as _},
};

#[derive(Debug, Clone, Parser)]
/// Inspect datasets and preprocessing pipelines built from a configuration file.
enum Opts {
    /// Show the transform steps, the number of records and classes.
    Info {
        /// configuration file
        config_file: PathBuf,
        /// build the evaluation split
        #[clap(long)]
        eval: bool,
    },
    /// Load samples and show their tensor shapes and targets.
    Sample {
        /// configuration file
        config_file: PathBuf,
        /// build the evaluation split
        #[clap(long)]
        eval: bool,
        /// number of samples to load
        #[clap(long, default_value = "8")]
        count: usize,
        /// index of the first sample
        #[clap(long, default_value = "0")]
        start: usize,
    },
}

fn main() -> Result<()> {
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
        Opts::Info { config_file, eval } => {
            let config = Config::open(&config_file)
                .with_context(|| format!("failed to load '{}'", config_file.display()))?;
            info(&config, !eval)?;
        }
        Opts::Sample {
            config_file,
            eval,
            count,
            start,
        } => {
            let config = Config::open(&config_file)
                .with_context(|| format!("failed to load '{}'", config_file.display()))?;
            sample(&config, !eval, start, count)?;
        }
    }

    Ok(())
}

fn info(config: &Config, is_train: bool) -> Result<()> {
    let transform = build_transform(is_train, &config.transform)?;
    let steps = transform.steps();
    let (dataset, num_classes) = build_dataset_with_transform(is_train, config, transform)?;

    let mut table = Table::new();
    table.add_row(row!["step", "transform"]);
    steps.iter().enumerate().for_each(|(index, step)| {
        table.add_row(row![index, step]);
    });
    table.printstd();

    let mut table = Table::new();
    table.add_row(row!["dataset", config.dataset.kind.name()]);
    table.add_row(row!["split", if is_train { "train" } else { "eval" }]);
    table.add_row(row!["records", dataset.num_records()]);
    table.add_row(row!["classes", num_classes]);
    table.add_row(row!["input channels", dataset.input_channels()]);
    table.printstd();

    Ok(())
}

fn sample(config: &Config, is_train: bool, start: usize, count: usize) -> Result<()> {
    let (mut dataset, _num_classes) = build_dataset(is_train, config)?;
    let range = sample_range(start, count, dataset.num_records())?;

    let mut table = Table::new();
    table.add_row(row!["index", "shape", "target", "file"]);

    for index in range {
        let record = dataset
            .nth(index)
            .with_context(|| format!("failed to load sample {}", index))?;
        let file = dataset.filename(index).unwrap_or_default();
        table.add_row(row![
            index,
            format!("{:?}", record.image.shape()),
            record.target,
            file
        ]);
    }

    table.printstd();
    Ok(())
}

/// The indices to load, truncated at the end of the dataset.
fn sample_range(start: usize, count: usize, num_records: usize) -> Result<Range<usize>> {
    ensure!(
        start < num_records,
        "start index {} is out of range for {} records",
        start,
        num_records
    );
    let end = num_records.min(start.saturating_add(count));
    Ok(start..end)
}
