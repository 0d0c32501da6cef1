use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use clap::Parser;
use log::info;

use rusty_barcode::{ExtractConfig, Extraction};

/// Extract barcode signals from one image directory and store them.
#[derive(Parser, Debug)]
#[command(name = "rusty-barcode", version, about)]
struct Cli {
    /// Directory holding README.txt and one image per subject
    path: Option<PathBuf>,

    /// JSON file with extraction settings; flags below override it
    #[arg(long)]
    config: Option<PathBuf>,

    /// 1-based position of the metadata group to extract
    #[arg(long = "group")]
    group_number: Option<usize>,

    /// Normalization divisor
    #[arg(long)]
    max_value: Option<f64>,

    /// Noise floor in raw intensity units
    #[arg(long)]
    threshold: Option<f64>,

    /// Length of the resampled signals
    #[arg(long)]
    final_len: Option<usize>,

    /// Key column for --update
    #[arg(long)]
    id_column: Option<String>,

    /// Write this run's table (.parquet or .json), replacing the file
    #[arg(long, conflicts_with = "update")]
    output: Option<PathBuf>,

    /// Merge this run's table into an existing table (.parquet or .json)
    #[arg(long)]
    update: Option<PathBuf>,

    /// Save the thresholded barcodes as an image
    #[arg(long)]
    barcodes: Option<PathBuf>,
}

impl Cli {
    fn extract_config(&self) -> Result<ExtractConfig> {
        let mut config = match &self.config {
            Some(path) => ExtractConfig::from_json_file(path)
                .with_context(|| format!("loading config {}", path.display()))?,
            None => ExtractConfig::default(),
        };
        match (&self.path, &self.config) {
            (Some(path), _) => config.path = path.clone(),
            (None, Some(_)) => {}
            (None, None) => bail!("give a source directory or --config"),
        }
        if let Some(v) = self.group_number {
            config.group_number = v;
        }
        if let Some(v) = self.max_value {
            config.max_value = v;
        }
        if let Some(v) = self.threshold {
            config.threshold = v;
        }
        if let Some(v) = self.final_len {
            config.final_len = v;
        }
        if let Some(v) = &self.id_column {
            config.id_column = v.clone();
        }
        Ok(config)
    }
}

fn main() -> Result<()> {
    env_logger::init();

    let cli = Cli::parse();
    let config = cli.extract_config()?;

    let run = Extraction::run(&config)
        .with_context(|| format!("extracting {}", config.path.display()))?;

    if let Some(path) = &cli.barcodes {
        run.save_barcodes(path)
            .with_context(|| format!("saving barcodes to {}", path.display()))?;
    }

    if let Some(path) = &cli.output {
        let table = run
            .save_table(path)
            .with_context(|| format!("writing {}", path.display()))?;
        info!("Created table with {} rows", table.len());
    } else if let Some(path) = &cli.update {
        let table = run
            .update_table(path)
            .with_context(|| format!("updating {}", path.display()))?;
        info!("Table now holds {} rows", table.len());
    } else {
        let table = run.table()?;
        println!(
            "Extracted {} rows x {} columns from {} (use --output or --update to store them)",
            table.len(),
            table.columns.len(),
            config.path.display()
        );
    }
    Ok(())
}
