use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::data::signal::SignalParams;
use crate::data::table::DEFAULT_ID_COLUMN;
use crate::error::{ExtractError, Result};

/// Settings for one extraction run over a source directory.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExtractConfig {
    /// Directory holding `README.txt` and one image per subject.
    pub path: PathBuf,
    /// 1-based position of the group to extract.
    pub group_number: usize,
    /// Normalization divisor (65535 for 16-bit images).
    pub max_value: f64,
    /// Noise floor in raw intensity units.
    pub threshold: f64,
    /// Length of the resampled signals.
    pub final_len: usize,
    /// Key column for merging into a stored table.
    pub id_column: String,
}

impl Default for ExtractConfig {
    fn default() -> Self {
        let signal = SignalParams::default();
        ExtractConfig {
            path: PathBuf::from("."),
            group_number: 1,
            max_value: signal.max_value,
            threshold: signal.threshold,
            final_len: signal.final_len,
            id_column: DEFAULT_ID_COLUMN.to_string(),
        }
    }
}

impl ExtractConfig {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        ExtractConfig {
            path: path.into(),
            ..Default::default()
        }
    }

    /// Load settings from a JSON file; missing keys take their defaults.
    pub fn from_json_file(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path).map_err(|e| ExtractError::io(path, e))?;
        let config: ExtractConfig = serde_json::from_str(&text)?;
        Ok(config)
    }

    /// Check the numeric settings. `group_number` is checked against the
    /// metadata when the run selects its group.
    pub fn validate(&self) -> Result<()> {
        if !self.max_value.is_finite() || self.max_value <= 0.0 {
            return Err(ExtractError::Config(format!(
                "max_value must be a positive number, got {}",
                self.max_value
            )));
        }
        if !self.threshold.is_finite() {
            return Err(ExtractError::Config(format!(
                "threshold must be finite, got {}",
                self.threshold
            )));
        }
        if self.final_len == 0 {
            return Err(ExtractError::Config("final_len must be at least 1".into()));
        }
        if self.id_column.is_empty() {
            return Err(ExtractError::Config("id_column must not be empty".into()));
        }
        Ok(())
    }

    pub fn signal_params(&self) -> SignalParams {
        SignalParams {
            max_value: self.max_value,
            threshold: self.threshold,
            final_len: self.final_len,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_sixteen_bit_pipeline() {
        let config = ExtractConfig::new("/data/plate1");
        assert_eq!(config.group_number, 1);
        assert_eq!(config.max_value, 65535.0);
        assert_eq!(config.threshold, 0.0);
        assert_eq!(config.final_len, 3500);
        assert_eq!(config.id_column, "ID");
        config.validate().unwrap();
    }

    #[test]
    fn partial_json_fills_in_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("run.json");
        std::fs::write(&path, r#"{ "path": "plate2", "group_number": 2, "threshold": 1200 }"#)
            .unwrap();
        let config = ExtractConfig::from_json_file(&path).unwrap();
        assert_eq!(config.path, PathBuf::from("plate2"));
        assert_eq!(config.group_number, 2);
        assert_eq!(config.threshold, 1200.0);
        assert_eq!(config.final_len, 3500);
        assert!((config.signal_params().relative_threshold() - 1200.0 / 65535.0).abs() < 1e-12);
    }

    #[test]
    fn rejects_invalid_values() {
        let bad = [
            ExtractConfig {
                max_value: 0.0,
                ..Default::default()
            },
            ExtractConfig {
                final_len: 0,
                ..Default::default()
            },
            ExtractConfig {
                threshold: f64::NAN,
                ..Default::default()
            },
        ];
        for config in bad {
            assert!(matches!(config.validate(), Err(ExtractError::Config(_))));
        }
    }
}
