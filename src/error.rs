use std::io;
use std::path::PathBuf;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum ExtractError {
    #[error("Metadata format error: {0}")]
    Format(String),
    #[error("Schema error: {0}")]
    Schema(String),
    #[error("I/O error on {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("Failed to decode image {}: {message}", .path.display())]
    Image { path: PathBuf, message: String },
    #[error("Arrow error: {0}")]
    Arrow(#[from] arrow::error::ArrowError),
    #[error("Parquet error: {0}")]
    Parquet(#[from] parquet::errors::ParquetError),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("Group {requested} out of range: metadata holds {available} group(s)")]
    Range { requested: usize, available: usize },
    #[error("Invalid configuration: {0}")]
    Config(String),
}

impl ExtractError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: io::Error) -> Self {
        ExtractError::Io {
            path: path.into(),
            source,
        }
    }

    /// Whether the failure came from reading or writing something outside the
    /// process (files, images, serialized tables).
    pub fn is_io(&self) -> bool {
        matches!(
            self,
            ExtractError::Io { .. }
                | ExtractError::Image { .. }
                | ExtractError::Arrow(_)
                | ExtractError::Parquet(_)
                | ExtractError::Json(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, ExtractError>;
