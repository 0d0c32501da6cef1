use std::path::{Path, PathBuf};

use log::{debug, info};
use rayon::prelude::*;

use crate::config::ExtractConfig;
use crate::data::metadata::{Group, Metadata, METADATA_FILE_NAME};
use crate::data::model::Table;
use crate::data::signal::{self, ProcessedSignals};
use crate::data::source::{list_images, FileDecoder, ImageDecoder};
use crate::data::{store, table};
use crate::error::{ExtractError, Result};
use crate::render;

// ---------------------------------------------------------------------------
// Extraction – one source directory, one metadata group
// ---------------------------------------------------------------------------

/// The result of processing one source directory: its metadata, the images
/// that were read, and every signal derived from them.
///
/// Image `i` (in file-name order) belongs to row `i` of the selected group.
#[derive(Debug, Clone)]
pub struct Extraction {
    pub config: ExtractConfig,
    pub metadata: Metadata,
    pub images: Vec<PathBuf>,
    pub signals: ProcessedSignals,
    group_index: usize,
}

impl Extraction {
    /// Parse the directory's metadata and process its images from disk.
    pub fn run(config: &ExtractConfig) -> Result<Self> {
        Self::run_with(config, &FileDecoder)
    }

    pub fn run_with(config: &ExtractConfig, decoder: &dyn ImageDecoder) -> Result<Self> {
        config.validate()?;
        let dir = config.path.as_path();

        let metadata = Metadata::from_path(&dir.join(METADATA_FILE_NAME))?;
        let group = metadata.group(config.group_number)?;
        let group_index = config.group_number - 1;
        info!(
            "{}: {} group(s), using group {} with {} subjects",
            dir.display(),
            metadata.groups.len(),
            config.group_number,
            group.len()
        );

        let images = list_images(dir)?;
        if images.len() != group.len() {
            return Err(ExtractError::Schema(format!(
                "{} holds {} images but group {} lists {} subjects",
                dir.display(),
                images.len(),
                config.group_number,
                group.len()
            )));
        }
        for (row, path) in images.iter().enumerate() {
            debug!("row {row} <- {}", path.display());
        }

        let raw_images = images
            .par_iter()
            .map(|path| decoder.decode(path))
            .collect::<Result<Vec<_>>>()?;
        let signals = signal::process(&raw_images, &config.signal_params())?;
        info!("Processed {} images from {}", signals.len(), dir.display());

        Ok(Extraction {
            config: config.clone(),
            metadata,
            images,
            signals,
            group_index,
        })
    }

    pub fn header(&self) -> &[String] {
        &self.metadata.header
    }

    /// The group selected when the run was made.
    pub fn group(&self) -> &Group {
        &self.metadata.groups[self.group_index]
    }

    /// The run's table: metadata columns plus `array_vals` / `array_vals_ni`.
    pub fn table(&self) -> Result<Table> {
        table::build(
            self.header(),
            &self.group().rows,
            &self.signals.raw,
            &self.signals.unthresholded,
        )
    }

    /// Write the run's table to `path`, replacing anything already there.
    pub fn save_table(&self, path: &Path) -> Result<Table> {
        let table = self.table()?;
        store::save_table(path, &table)?;
        Ok(table)
    }

    /// Upsert the run's table into the table stored at `path`.
    pub fn update_table(&self, path: &Path) -> Result<Table> {
        store::update_table(path, &self.table()?, &self.config.id_column)
    }

    /// Save the thresholded barcodes of every image as one picture.
    pub fn save_barcodes(&self, path: &Path) -> Result<()> {
        render::save_barcodes(path, &self.signals.barcodes)
    }
}
