use std::path::PathBuf;

use anyhow::{Context, Result};
use image::{ImageBuffer, Luma};
use rusty_barcode::data::metadata::METADATA_FILE_NAME;

const WIDTH: u32 = 900;
const HEIGHT: u32 = 48;
const BACKGROUND: f64 = 1500.0;
const NOISE_SPAN: f64 = 1200.0;

/// A fluorescent band: flat top between `start` and `end`, linear shoulders
/// `edge` pixels wide on both sides.
struct Band {
    start: f64,
    end: f64,
    edge: f64,
    peak: f64,
}

impl Band {
    fn at(&self, x: f64) -> f64 {
        let outside = (self.start - x).max(x - self.end).max(0.0);
        self.peak * (1.0 - outside / self.edge).max(0.0)
    }
}

/// Reproducible per-pixel noise in `[-NOISE_SPAN / 2, NOISE_SPAN / 2)`.
fn noise(subject: u64, x: u32, y: u32) -> f64 {
    let mut h = subject
        .wrapping_mul(0x9E37_79B9_7F4A_7C15)
        ^ ((u64::from(x) << 32) | u64::from(y));
    h ^= h >> 29;
    h = h.wrapping_mul(0xBF58_476D_1CE4_E5B9);
    h ^= h >> 32;
    (h % 4096) as f64 / 4096.0 * NOISE_SPAN - NOISE_SPAN / 2.0
}

/// A worm-like strip: bands along x, dimmer towards the top and bottom edges.
fn render_subject(subject: u64, bands: &[Band]) -> ImageBuffer<Luma<u16>, Vec<u16>> {
    let half = HEIGHT as f64 / 2.0;
    ImageBuffer::from_fn(WIDTH, HEIGHT, |x, y| {
        let along: f64 = bands.iter().map(|b| b.at(x as f64)).sum();
        let across = 1.0 - ((y as f64 + 0.5 - half) / half).powi(2);
        let v = along * across + BACKGROUND + noise(subject, x, y);
        Luma([v.clamp(0.0, 65535.0) as u16])
    })
}

fn band(start: f64, end: f64, edge: f64, peak: f64) -> Band {
    Band { start, end, edge, peak }
}

fn main() -> Result<()> {
    let out: PathBuf = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "sample_plate".to_string())
        .into();
    std::fs::create_dir_all(&out).with_context(|| format!("creating {}", out.display()))?;

    let subjects = [
        ("W001", "OP50", vec![band(140.0, 165.0, 20.0, 40000.0), band(390.0, 450.0, 45.0, 22000.0)]),
        ("W002", "OP50", vec![band(150.0, 170.0, 15.0, 38000.0), band(670.0, 730.0, 35.0, 30000.0)]),
        ("W003", "HB101", vec![band(270.0, 330.0, 30.0, 52000.0)]),
        (
            "W004",
            "HB101",
            vec![
                band(115.0, 125.0, 12.0, 15000.0),
                band(465.0, 495.0, 20.0, 45000.0),
                band(780.0, 820.0, 30.0, 20000.0),
            ],
        ),
    ];

    let mut readme = String::from(
        "Synthetic plate\n*--*\nstrain,sex,temperature\nN2,herm,20\n*--*\n*-*\nID,feed\n",
    );
    for (i, (id, feed, bands)) in subjects.iter().enumerate() {
        readme.push_str(&format!("{id},{feed}\n"));
        let path = out.join(format!("{:02}_{id}.png", i + 1));
        render_subject(i as u64 + 1, bands)
            .save(&path)
            .with_context(|| format!("writing {}", path.display()))?;
    }
    readme.push_str("*-*\n");

    let readme_path = out.join(METADATA_FILE_NAME);
    std::fs::write(&readme_path, readme)
        .with_context(|| format!("writing {}", readme_path.display()))?;

    println!(
        "Wrote {} images ({WIDTH}x{HEIGHT}, 16-bit) and {METADATA_FILE_NAME} to {}",
        subjects.len(),
        out.display()
    );
    Ok(())
}
