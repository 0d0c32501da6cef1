use std::path::{Path, PathBuf};

use image::DynamicImage;
use log::{debug, warn};
use ndarray::{Array3, ArrayD};

use crate::error::{ExtractError, Result};

// ---------------------------------------------------------------------------
// Directory listing
// ---------------------------------------------------------------------------

/// Whether a directory entry name counts as an image: not hidden and not a
/// `.txt` file.
pub fn is_image_name(name: &str) -> bool {
    !name.starts_with('.') && !name.ends_with(".txt")
}

/// List the image files of `dir`, sorted by file name.
///
/// Row alignment with the metadata group is positional, so the order here is
/// the order rows are matched in.
pub fn list_images(dir: &Path) -> Result<Vec<PathBuf>> {
    let entries = std::fs::read_dir(dir).map_err(|e| ExtractError::io(dir, e))?;

    let mut images = Vec::new();
    for entry in entries {
        let entry = entry.map_err(|e| ExtractError::io(dir, e))?;
        let path = entry.path();
        let Some(name) = entry.file_name().to_str().map(str::to_string) else {
            warn!("Skipping non UTF-8 file name {}", path.display());
            continue;
        };
        if !is_image_name(&name) {
            continue;
        }
        let file_type = entry.file_type().map_err(|e| ExtractError::io(&path, e))?;
        if !file_type.is_file() {
            warn!("Skipping {}: not a regular file", path.display());
            continue;
        }
        images.push(path);
    }
    images.sort_by(|a, b| a.file_name().cmp(&b.file_name()));
    Ok(images)
}

// ---------------------------------------------------------------------------
// Decoding
// ---------------------------------------------------------------------------

/// Turns an image file into a numeric array of rank >= 2.
pub trait ImageDecoder: Sync {
    fn decode(&self, path: &Path) -> Result<ArrayD<f64>>;
}

/// Decodes PNG / TIFF files with the `image` crate.
///
/// Grayscale samples keep their stored values; colour images are reduced to
/// luma at the same bit depth. Only the first frame of a multi-page file is
/// read, returned as a `[1, height, width]` stack.
#[derive(Debug, Clone, Copy, Default)]
pub struct FileDecoder;

impl ImageDecoder for FileDecoder {
    fn decode(&self, path: &Path) -> Result<ArrayD<f64>> {
        let img = image::open(path).map_err(|e| ExtractError::Image {
            path: path.to_path_buf(),
            message: e.to_string(),
        })?;
        let (width, height) = (img.width() as usize, img.height() as usize);
        debug!("Decoded {} ({width}x{height}, {:?})", path.display(), img.color());

        let samples = luma_samples(img);
        Array3::from_shape_vec((1, height, width), samples)
            .map(Array3::into_dyn)
            .map_err(|e| ExtractError::Image {
                path: path.to_path_buf(),
                message: e.to_string(),
            })
    }
}

fn luma_samples(img: DynamicImage) -> Vec<f64> {
    match img {
        DynamicImage::ImageLuma8(buf) => buf.into_raw().into_iter().map(f64::from).collect(),
        DynamicImage::ImageLuma16(buf) => buf.into_raw().into_iter().map(f64::from).collect(),
        DynamicImage::ImageLumaA8(_) | DynamicImage::ImageRgb8(_) | DynamicImage::ImageRgba8(_) => {
            img.to_luma8().into_raw().into_iter().map(f64::from).collect()
        }
        DynamicImage::ImageLumaA16(_)
        | DynamicImage::ImageRgb16(_)
        | DynamicImage::ImageRgba16(_) => {
            img.to_luma16().into_raw().into_iter().map(f64::from).collect()
        }
        other => other
            .to_luma32f()
            .into_raw()
            .into_iter()
            .map(f64::from)
            .collect(),
    }
}
