use std::path::Path;

use image::{ImageBuffer, Luma};
use rusty_barcode::data::model::Cell;
use rusty_barcode::data::store::load_table;
use rusty_barcode::{ExtractConfig, Extraction};

fn write_plate(dir: &Path, ids: &[&str], peak: u16) {
    let mut readme = String::from("*--*\nstrain,sex\nN2,herm\n*--*\n*-*\nID,feed\n");
    for (i, id) in ids.iter().enumerate() {
        readme.push_str(&format!("{id},OP50\n"));
        // Column x peaks at `peak` on row 1 only; every other pixel is dark.
        let img: ImageBuffer<Luma<u16>, Vec<u16>> = ImageBuffer::from_fn(40, 3, |x, y| {
            if y == 1 && x == 10 * (i as u32 + 1) {
                Luma([peak])
            } else {
                Luma([0])
            }
        });
        img.save(dir.join(format!("{i:02}.png"))).unwrap();
    }
    readme.push_str("*-*\n");
    std::fs::write(dir.join("README.txt"), readme).unwrap();
}

#[test]
fn extract_store_and_rerun() {
    let plate = tempfile::tempdir().unwrap();
    let out = tempfile::tempdir().unwrap();
    let db = out.path().join("barcodes.parquet");
    write_plate(plate.path(), &["W1", "W2"], 65535);

    let config = ExtractConfig {
        final_len: 79,
        ..ExtractConfig::new(plate.path())
    };
    let run = Extraction::run(&config).unwrap();
    assert_eq!(run.images.len(), 2);
    assert_eq!(run.signals.barcodes[0].dim(), (3, 79));

    let created = run.save_table(&db).unwrap();
    assert_eq!(
        created.columns,
        vec!["strain", "sex", "ID", "diet", "array_vals", "array_vals_ni"]
    );
    let raw = created.get(0, "array_vals_ni").and_then(Cell::as_vector).unwrap();
    assert_eq!(raw.len(), 40);
    assert_eq!(raw[10], 1.0);
    assert_eq!(raw.iter().filter(|&&v| v > 0.0).count(), 1);
    let interp = created.get(1, "array_vals").and_then(Cell::as_vector).unwrap();
    assert_eq!(interp.len(), 79);
    assert_eq!(interp[40], 1.0);

    // Re-running the same plate changes nothing.
    let rerun = Extraction::run(&config).unwrap().update_table(&db).unwrap();
    assert_eq!(rerun, created);

    // A second plate with one overlapping subject replaces it and adds the other.
    let plate2 = tempfile::tempdir().unwrap();
    write_plate(plate2.path(), &["W2", "W3"], 32768);
    let merged = Extraction::run(&ExtractConfig::new(plate2.path()))
        .unwrap()
        .update_table(&db)
        .unwrap();
    let ids: Vec<String> = merged.column("ID").unwrap().map(|c| c.to_string()).collect();
    assert_eq!(ids, vec!["W1", "W2", "W3"]);
    let w2 = merged.get(1, "array_vals_ni").and_then(Cell::as_vector).unwrap();
    assert!((w2[10] - 32768.0 / 65535.0).abs() < 1e-12);
    assert_eq!(load_table(&db).unwrap(), merged);
}

#[test]
fn barcodes_are_rendered() {
    let plate = tempfile::tempdir().unwrap();
    let out = tempfile::tempdir().unwrap();
    write_plate(plate.path(), &["W1", "W2", "W3"], 65535);

    let config = ExtractConfig {
        final_len: 100,
        threshold: 1000.0,
        ..ExtractConfig::new(plate.path())
    };
    let run = Extraction::run(&config).unwrap();
    let png = out.path().join("barcodes.png");
    run.save_barcodes(&png).unwrap();

    let sheet = image::open(&png).unwrap().to_luma8();
    // three 5-row barcodes with 2-row gaps
    assert_eq!(sheet.dimensions(), (100, 5 * 3 + 2 * 2));
}
