use std::path::Path;

use image::{GrayImage, Luma};
use log::info;
use ndarray::Array2;

use crate::error::{ExtractError, Result};

/// Blank rows between consecutive barcodes.
const GAP_ROWS: u32 = 2;

// ---------------------------------------------------------------------------
// Barcode sheet
// ---------------------------------------------------------------------------

/// Map a normalized value onto a gray level: 0 is black, 1 is white.
fn gray_level(v: f64) -> u8 {
    if v.is_nan() {
        return 0;
    }
    (v.clamp(0.0, 1.0) * 255.0).round() as u8
}

/// Stack barcodes top to bottom into one grayscale image, separated by white
/// gaps. Narrower barcodes are padded with white on the right.
pub fn render_barcodes(barcodes: &[Array2<f64>]) -> GrayImage {
    let width = barcodes.iter().map(|b| b.ncols()).max().unwrap_or(0) as u32;
    let height = barcodes.iter().map(|b| b.nrows() as u32).sum::<u32>()
        + GAP_ROWS * barcodes.len().saturating_sub(1) as u32;

    let mut sheet = GrayImage::from_pixel(width, height, Luma([255]));
    let mut top = 0u32;
    for bar in barcodes {
        for ((row, col), &v) in bar.indexed_iter() {
            sheet.put_pixel(col as u32, top + row as u32, Luma([gray_level(v)]));
        }
        top += bar.nrows() as u32 + GAP_ROWS;
    }
    sheet
}

/// Render barcodes and save them as an image; the format follows the extension.
pub fn save_barcodes(path: &Path, barcodes: &[Array2<f64>]) -> Result<()> {
    let sheet = render_barcodes(barcodes);
    sheet.save(path).map_err(|e| ExtractError::Image {
        path: path.to_path_buf(),
        message: e.to_string(),
    })?;
    info!(
        "Saved {} barcodes ({}x{}) to {}",
        barcodes.len(),
        sheet.width(),
        sheet.height(),
        path.display()
    );
    Ok(())
}
