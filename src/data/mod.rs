/// Data layer: metadata parsing, signal extraction, and the barcode table.
///
/// Architecture:
/// ```text
///  README.txt              image files
///        │                      │
///        ▼                      ▼
///   ┌──────────┐          ┌──────────┐
///   │ metadata │          │  source  │  list + decode → ArrayD
///   └──────────┘          └──────────┘
///        │                      │
///        │                      ▼
///        │                ┌──────────┐
///        │                │  signal  │  collapse → resample → threshold
///        │                └──────────┘
///        ▼                      ▼
///   ┌─────────────────────────────────┐
///   │  table   build rows, upsert      │
///   └─────────────────────────────────┘
///                   │
///                   ▼
///   ┌─────────────────────────────────┐
///   │  store   .parquet / .json        │
///   └─────────────────────────────────┘
/// ```

pub mod metadata;
pub mod model;
pub mod signal;
pub mod source;
pub mod store;
pub mod table;
