use ndarray::{Array2, ArrayD, Axis, Ix2};
use rayon::prelude::*;

use crate::error::{ExtractError, Result};

/// Barcode rows per this many samples of signal.
const BARCODE_ASPECT: usize = 20;

// ---------------------------------------------------------------------------
// Parameters
// ---------------------------------------------------------------------------

/// Normalization and resampling parameters shared by every image of a run.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SignalParams {
    /// Divisor mapping raw intensities onto a nominal [0, 1] range.
    pub max_value: f64,
    /// Absolute (pre-normalization) noise floor.
    pub threshold: f64,
    /// Length every resampled vector is stretched or squeezed to.
    pub final_len: usize,
}

impl Default for SignalParams {
    fn default() -> Self {
        SignalParams {
            max_value: 65535.0,
            threshold: 0.0,
            final_len: 3500,
        }
    }
}

impl SignalParams {
    /// Threshold on the normalized scale.
    pub fn relative_threshold(&self) -> f64 {
        self.threshold / self.max_value
    }
}

// ---------------------------------------------------------------------------
// Single-vector operations
// ---------------------------------------------------------------------------

/// Max-project the first 2-D plane of `image` onto its columns and normalize.
///
/// Leading axes beyond the last two are indexed at 0. The result has one
/// value per image column, divided by `max_value` without clamping.
pub fn collapse(image: &ArrayD<f64>, max_value: f64) -> Result<Vec<f64>> {
    if image.ndim() < 2 {
        return Err(ExtractError::Schema(format!(
            "image must have at least 2 dimensions, got shape {:?}",
            image.shape()
        )));
    }
    let mut view = image.view();
    while view.ndim() > 2 {
        view = view.index_axis_move(Axis(0), 0);
    }
    let plane = view
        .into_dimensionality::<Ix2>()
        .map_err(|e| ExtractError::Schema(format!("image plane: {e}")))?;
    if plane.is_empty() {
        return Err(ExtractError::Schema(format!(
            "image plane is empty (shape {:?})",
            plane.shape()
        )));
    }

    Ok(plane
        .fold_axis(Axis(0), f64::NEG_INFINITY, |&acc, &v| acc.max(v))
        .iter()
        .map(|&v| v / max_value)
        .collect())
}

/// Linearly resample `vector` to `new_len` points spread evenly over its
/// original index range. An empty input yields zeros.
pub fn resample(vector: &[f64], new_len: usize) -> Vec<f64> {
    let len = vector.len();
    if len == 0 {
        return vec![0.0; new_len];
    }
    let last = (len - 1) as f64;
    let step = if new_len > 1 {
        last / (new_len - 1) as f64
    } else {
        0.0
    };

    (0..new_len)
        .map(|i| {
            // Pin the final sample to the last index so rounding can't drift past it.
            let x = if new_len > 1 && i == new_len - 1 {
                last
            } else {
                i as f64 * step
            };
            let lo = x.floor() as usize;
            if lo >= len - 1 {
                return vector[len - 1];
            }
            let frac = x - lo as f64;
            vector[lo] + (vector[lo + 1] - vector[lo]) * frac
        })
        .collect()
}

/// Zero every element strictly below `relative_threshold`.
pub fn apply_threshold(vector: &mut [f64], relative_threshold: f64) {
    for v in vector.iter_mut().filter(|v| **v < relative_threshold) {
        *v = 0.0;
    }
}

/// Repeat `vector` vertically into a tile roughly 20 times wider than tall.
pub fn barcode(vector: &[f64]) -> Array2<f64> {
    let height = (vector.len() / BARCODE_ASPECT).max(1);
    Array2::from_shape_fn((height, vector.len()), |(_, col)| vector[col])
}

// ---------------------------------------------------------------------------
// Per-image pipeline
// ---------------------------------------------------------------------------

/// Everything derived from one image.
#[derive(Debug, Clone, PartialEq)]
pub struct Signals {
    /// Normalized, native length.
    pub raw: Vec<f64>,
    /// Resampled to `final_len`, not thresholded.
    pub unthresholded: Vec<f64>,
    /// Resampled to `final_len` and thresholded.
    pub thresholded: Vec<f64>,
    pub barcode: Array2<f64>,
}

pub fn process_image(image: &ArrayD<f64>, params: &SignalParams) -> Result<Signals> {
    let raw = collapse(image, params.max_value)?;
    let unthresholded = resample(&raw, params.final_len);
    let mut thresholded = unthresholded.clone();
    apply_threshold(&mut thresholded, params.relative_threshold());
    let barcode = barcode(&thresholded);
    Ok(Signals {
        raw,
        unthresholded,
        thresholded,
        barcode,
    })
}

/// Per-stage lists, each in the order the images were given.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ProcessedSignals {
    pub raw: Vec<Vec<f64>>,
    pub thresholded: Vec<Vec<f64>>,
    pub unthresholded: Vec<Vec<f64>>,
    pub barcodes: Vec<Array2<f64>>,
}

impl ProcessedSignals {
    pub fn len(&self) -> usize {
        self.raw.len()
    }

    pub fn is_empty(&self) -> bool {
        self.raw.is_empty()
    }
}

impl FromIterator<Signals> for ProcessedSignals {
    fn from_iter<I: IntoIterator<Item = Signals>>(iter: I) -> Self {
        let mut out = ProcessedSignals::default();
        for s in iter {
            out.raw.push(s.raw);
            out.thresholded.push(s.thresholded);
            out.unthresholded.push(s.unthresholded);
            out.barcodes.push(s.barcode);
        }
        out
    }
}

/// Run every image through the pipeline. Images are processed in parallel;
/// the output keeps input order.
pub fn process(images: &[ArrayD<f64>], params: &SignalParams) -> Result<ProcessedSignals> {
    let signals = images
        .par_iter()
        .map(|image| process_image(image, params))
        .collect::<Result<Vec<_>>>()?;
    Ok(signals.into_iter().collect())
}
