//! Turn per-subject microscopy images into normalized 1-D "barcode" signals
//! and merge them, keyed by subject ID, into a persistent table.
//!
//! ```no_run
//! use rusty_barcode::{ExtractConfig, Extraction};
//!
//! let config = ExtractConfig::new("/data/plate1");
//! let run = Extraction::run(&config)?;
//! run.update_table("barcodes.parquet".as_ref())?;
//! # Ok::<(), rusty_barcode::ExtractError>(())
//! ```

pub mod config;
pub mod data;
pub mod error;
pub mod extract;
pub mod render;

pub use config::ExtractConfig;
pub use error::{ExtractError, Result};
pub use extract::Extraction;
