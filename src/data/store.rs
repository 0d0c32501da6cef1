use std::collections::HashMap;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use arrow::array::{
    Array, ArrayRef, AsArray, BooleanArray, Float64Array, Float64Builder, Int64Array,
    ListBuilder, StringArray,
};
use arrow::datatypes::{
    DataType, Field, Float32Type, Float64Type, Int32Type, Int64Type, Schema,
};
use arrow::record_batch::{RecordBatch, RecordBatchOptions};
use log::info;
use parquet::arrow::arrow_reader::ParquetRecordBatchReaderBuilder;
use parquet::arrow::ArrowWriter;
use serde_json::{Map, Value as JsonValue};

use super::model::{Cell, Table};
use super::table::merge;
use crate::error::{ExtractError, Result};

// ---------------------------------------------------------------------------
// Public entry-points
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Format {
    Parquet,
    Json,
}

impl Format {
    fn from_path(path: &Path) -> Result<Self> {
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .unwrap_or("")
            .to_ascii_lowercase();
        match ext.as_str() {
            "parquet" | "pq" => Ok(Format::Parquet),
            "json" => Ok(Format::Json),
            other => Err(ExtractError::Config(format!(
                "unsupported table extension `.{other}` (use .parquet or .json)"
            ))),
        }
    }
}

/// Load a whole table. Dispatch by extension.
///
/// Supported formats:
/// * `.parquet` / `.pq` – one column per table column, vectors as `List<Float64>`
///   (a column mixing cell variants is tagged text, see `ColumnKind::Tagged`)
/// * `.json`            – `[{ "ID": "1", "array_vals": [...], ... }, ...]`
pub fn load_table(path: &Path) -> Result<Table> {
    match Format::from_path(path)? {
        Format::Parquet => load_parquet(path),
        Format::Json => load_json(path),
    }
}

/// Replace the table at `path` with `table`.
///
/// The new contents go to a sibling temporary file that is renamed over
/// `path` once fully written, so readers see either the old or the new table.
/// A table with a repeated column name is rejected before anything is written.
pub fn save_table(path: &Path, table: &Table) -> Result<()> {
    let format = Format::from_path(path)?;
    if let Some(name) = table.duplicate_column() {
        return Err(ExtractError::Schema(format!(
            "cannot save a table with duplicate column `{name}`"
        )));
    }
    let tmp = temp_path(path);
    let written = match format {
        Format::Parquet => write_parquet(&tmp, table),
        Format::Json => write_json(&tmp, table),
    };
    if let Err(e) = written {
        let _ = std::fs::remove_file(&tmp);
        return Err(e);
    }
    std::fs::rename(&tmp, path).map_err(|e| ExtractError::io(path, e))?;
    info!("Wrote {} rows x {} columns to {}", table.len(), table.columns.len(), path.display());
    Ok(())
}

/// Upsert `new` into the table stored at `path`: load, merge on `id_column`,
/// write back. Returns the merged table.
///
/// Not safe against concurrent writers to the same path.
pub fn update_table(path: &Path, new: &Table, id_column: &str) -> Result<Table> {
    let existing = load_table(path)?;
    let merged = merge(&existing, new, id_column)?;
    info!(
        "Merged {} new rows into {} existing rows: {} rows after deduplication on `{id_column}`",
        new.len(),
        existing.len(),
        merged.len()
    );
    save_table(path, &merged)?;
    Ok(merged)
}

fn temp_path(path: &Path) -> PathBuf {
    let mut name = path.file_name().unwrap_or_default().to_os_string();
    name.push(".tmp");
    path.with_file_name(name)
}

// ---------------------------------------------------------------------------
// Column typing
// ---------------------------------------------------------------------------

/// Field metadata key marking a column whose cells carry their own type tag.
const CELL_ENCODING_KEY: &str = "rusty_barcode.cell";
const TAGGED_ENCODING: &str = "tagged";

/// How a column is laid out in Parquet.
#[derive(Debug, Clone, PartialEq)]
enum ColumnKind {
    /// Every non-null cell has the same variant.
    Typed(DataType),
    /// Variants differ; cells are stored as tagged text (see `encode_tagged`).
    Tagged,
}

/// Storage layout of a column, from the variants of its non-null cells.
fn column_kind(table: &Table, idx: usize) -> ColumnKind {
    let mut ty: Option<DataType> = None;
    for row in table.rows() {
        let cell_ty = match &row[idx] {
            Cell::Null => continue,
            Cell::Text(_) => DataType::Utf8,
            Cell::Integer(_) => DataType::Int64,
            Cell::Float(_) => DataType::Float64,
            Cell::Bool(_) => DataType::Boolean,
            Cell::Vector(_) => list_type(),
        };
        match &ty {
            None => ty = Some(cell_ty),
            Some(prev) if *prev == cell_ty => {}
            Some(_) => return ColumnKind::Tagged,
        }
    }
    ColumnKind::Typed(ty.unwrap_or(DataType::Utf8))
}

/// `<tag>:<payload>` with tags `t` text, `i` integer, `f` float, `b` bool and
/// `v` vector (comma-separated). Floats use `{:?}` so NaN and infinities
/// survive.
fn encode_tagged(cell: &Cell) -> Option<String> {
    Some(match cell {
        Cell::Null => return None,
        Cell::Text(s) => format!("t:{s}"),
        Cell::Integer(i) => format!("i:{i}"),
        Cell::Float(v) => format!("f:{v:?}"),
        Cell::Bool(b) => format!("b:{b}"),
        Cell::Vector(v) => {
            let items: Vec<String> = v.iter().map(|x| format!("{x:?}")).collect();
            format!("v:{}", items.join(","))
        }
    })
}

fn decode_tagged(encoded: &str, column: &str) -> Result<Cell> {
    let bad = || ExtractError::Schema(format!("column `{column}`: malformed tagged cell `{encoded}`"));
    let (tag, payload) = encoded.split_once(':').ok_or_else(bad)?;
    Ok(match tag {
        "t" => Cell::Text(payload.to_string()),
        "i" => Cell::Integer(payload.parse().map_err(|_| bad())?),
        "f" => Cell::Float(payload.parse().map_err(|_| bad())?),
        "b" => Cell::Bool(payload.parse().map_err(|_| bad())?),
        "v" if payload.is_empty() => Cell::Vector(Vec::new()),
        "v" => Cell::Vector(
            payload
                .split(',')
                .map(|x| x.parse::<f64>().map_err(|_| bad()))
                .collect::<Result<Vec<_>>>()?,
        ),
        _ => return Err(bad()),
    })
}

fn list_type() -> DataType {
    DataType::List(Arc::new(Field::new("item", DataType::Float64, true)))
}

// ---------------------------------------------------------------------------
// Parquet
// ---------------------------------------------------------------------------

fn load_parquet(path: &Path) -> Result<Table> {
    let file = File::open(path).map_err(|e| ExtractError::io(path, e))?;
    let builder = ParquetRecordBatchReaderBuilder::try_new(file)?;
    let fields = builder.schema().fields().clone();
    let columns: Vec<String> = fields.iter().map(|f| f.name().clone()).collect();
    let tagged: Vec<bool> = fields
        .iter()
        .map(|f| {
            f.metadata().get(CELL_ENCODING_KEY).map(String::as_str) == Some(TAGGED_ENCODING)
        })
        .collect();
    let reader = builder.build()?;

    let mut table = Table::new(columns);
    for batch in reader {
        let batch = batch?;
        for row in 0..batch.num_rows() {
            let cells = batch
                .columns()
                .iter()
                .enumerate()
                .map(|(idx, col)| {
                    if tagged[idx] && !col.is_null(row) {
                        let text = col.as_string_opt::<i32>().ok_or_else(|| {
                            ExtractError::Schema(format!(
                                "tagged column `{}` is not Utf8",
                                table.columns[idx]
                            ))
                        })?;
                        decode_tagged(text.value(row), &table.columns[idx])
                    } else {
                        extract_cell(col, row)
                    }
                })
                .collect::<Result<Vec<_>>>()?;
            table.push_row(cells)?;
        }
    }
    Ok(table)
}

/// Extract a single cell from an Arrow column at a given row.
fn extract_cell(col: &ArrayRef, row: usize) -> Result<Cell> {
    if col.is_null(row) {
        return Ok(Cell::Null);
    }
    Ok(match col.data_type() {
        DataType::Utf8 => Cell::Text(col.as_string::<i32>().value(row).to_string()),
        DataType::LargeUtf8 => Cell::Text(col.as_string::<i64>().value(row).to_string()),
        DataType::Int32 => Cell::Integer(col.as_primitive::<Int32Type>().value(row) as i64),
        DataType::Int64 => Cell::Integer(col.as_primitive::<Int64Type>().value(row)),
        DataType::Float32 => Cell::Float(col.as_primitive::<Float32Type>().value(row) as f64),
        DataType::Float64 => Cell::Float(col.as_primitive::<Float64Type>().value(row)),
        DataType::Boolean => Cell::Bool(col.as_boolean().value(row)),
        DataType::List(_) => Cell::Vector(f64_values(&col.as_list::<i32>().value(row))?),
        DataType::LargeList(_) => Cell::Vector(f64_values(&col.as_list::<i64>().value(row))?),
        other => {
            return Err(ExtractError::Schema(format!(
                "unsupported column type {other:?}"
            )))
        }
    })
}

/// The inner array of a list cell can be Float64 or Float32; nulls read as NaN.
fn f64_values(values: &ArrayRef) -> Result<Vec<f64>> {
    match values.data_type() {
        DataType::Float64 => Ok(values
            .as_primitive::<Float64Type>()
            .iter()
            .map(|v| v.unwrap_or(f64::NAN))
            .collect()),
        DataType::Float32 => Ok(values
            .as_primitive::<Float32Type>()
            .iter()
            .map(|v| v.map(f64::from).unwrap_or(f64::NAN))
            .collect()),
        other => Err(ExtractError::Schema(format!(
            "list inner type is {other:?}, expected Float64 or Float32"
        ))),
    }
}

fn build_column(table: &Table, idx: usize, kind: &ColumnKind) -> ArrayRef {
    let cells = table.rows().iter().map(|row| &row[idx]);
    let ty = match kind {
        ColumnKind::Tagged => {
            return Arc::new(StringArray::from(
                cells.map(encode_tagged).collect::<Vec<_>>(),
            ))
        }
        ColumnKind::Typed(ty) => ty,
    };
    match ty {
        DataType::Int64 => Arc::new(Int64Array::from(
            cells
                .map(|c| match c {
                    Cell::Integer(i) => Some(*i),
                    _ => None,
                })
                .collect::<Vec<_>>(),
        )),
        DataType::Float64 => Arc::new(Float64Array::from(
            cells
                .map(|c| match c {
                    Cell::Float(v) => Some(*v),
                    _ => None,
                })
                .collect::<Vec<_>>(),
        )),
        DataType::Boolean => Arc::new(BooleanArray::from(
            cells
                .map(|c| match c {
                    Cell::Bool(b) => Some(*b),
                    _ => None,
                })
                .collect::<Vec<_>>(),
        )),
        DataType::List(_) => {
            let mut builder = ListBuilder::new(Float64Builder::new());
            for cell in cells {
                match cell {
                    Cell::Vector(v) => {
                        builder.values().append_slice(v);
                        builder.append(true);
                    }
                    _ => builder.append(false),
                }
            }
            Arc::new(builder.finish())
        }
        _ => Arc::new(StringArray::from(
            cells
                .map(|c| match c {
                    Cell::Text(s) => Some(s.clone()),
                    _ => None,
                })
                .collect::<Vec<_>>(),
        )),
    }
}

fn write_parquet(path: &Path, table: &Table) -> Result<()> {
    let kinds: Vec<ColumnKind> = (0..table.columns.len())
        .map(|idx| column_kind(table, idx))
        .collect();
    let schema = Arc::new(Schema::new(
        table
            .columns
            .iter()
            .zip(&kinds)
            .map(|(name, kind)| match kind {
                ColumnKind::Typed(ty) => Field::new(name, ty.clone(), true),
                ColumnKind::Tagged => Field::new(name, DataType::Utf8, true).with_metadata(
                    HashMap::from([(CELL_ENCODING_KEY.to_string(), TAGGED_ENCODING.to_string())]),
                ),
            })
            .collect::<Vec<_>>(),
    ));
    let arrays: Vec<ArrayRef> = kinds
        .iter()
        .enumerate()
        .map(|(idx, kind)| build_column(table, idx, kind))
        .collect();
    let batch = RecordBatch::try_new_with_options(
        schema.clone(),
        arrays,
        &RecordBatchOptions::new().with_row_count(Some(table.len())),
    )?;

    let file = File::create(path).map_err(|e| ExtractError::io(path, e))?;
    let mut writer = ArrowWriter::try_new(file, schema, None)?;
    writer.write(&batch)?;
    writer.close()?;
    Ok(())
}

// ---------------------------------------------------------------------------
// JSON
// ---------------------------------------------------------------------------

/// Records-oriented JSON: a top-level array of objects, one per row. Columns
/// are the keys in order of first appearance; absent keys read as null.
fn load_json(path: &Path) -> Result<Table> {
    let text = std::fs::read_to_string(path).map_err(|e| ExtractError::io(path, e))?;
    let root: JsonValue = serde_json::from_str(&text)?;
    let records = root
        .as_array()
        .ok_or_else(|| ExtractError::Schema("expected a top-level JSON array".into()))?;

    let mut objects = Vec::with_capacity(records.len());
    let mut columns: Vec<String> = Vec::new();
    for (i, rec) in records.iter().enumerate() {
        let obj = rec
            .as_object()
            .ok_or_else(|| ExtractError::Schema(format!("row {i} is not a JSON object")))?;
        for key in obj.keys() {
            if !columns.contains(key) {
                columns.push(key.clone());
            }
        }
        objects.push(obj);
    }

    let mut table = Table::new(columns);
    for (i, obj) in objects.into_iter().enumerate() {
        let row = table
            .columns
            .iter()
            .map(|col| obj.get(col).map_or(Ok(Cell::Null), |v| json_to_cell(v, i, col)))
            .collect::<Result<Vec<_>>>()?;
        table.push_row(row)?;
    }
    Ok(table)
}

fn json_to_cell(val: &JsonValue, row: usize, col: &str) -> Result<Cell> {
    Ok(match val {
        JsonValue::String(s) => Cell::Text(s.clone()),
        JsonValue::Number(n) => {
            if let Some(i) = n.as_i64() {
                Cell::Integer(i)
            } else {
                Cell::Float(n.as_f64().unwrap_or(f64::NAN))
            }
        }
        JsonValue::Bool(b) => Cell::Bool(*b),
        JsonValue::Null => Cell::Null,
        JsonValue::Array(items) => Cell::Vector(
            items
                .iter()
                .enumerate()
                .map(|(j, v)| match v {
                    JsonValue::Null => Ok(f64::NAN),
                    other => other.as_f64().ok_or_else(|| {
                        ExtractError::Schema(format!("row {row}, {col}[{j}]: not a number"))
                    }),
                })
                .collect::<Result<Vec<_>>>()?,
        ),
        JsonValue::Object(_) => {
            return Err(ExtractError::Schema(format!(
                "row {row}, {col}: nested objects are not supported"
            )))
        }
    })
}

fn cell_to_json(cell: &Cell) -> JsonValue {
    match cell {
        Cell::Text(s) => JsonValue::String(s.clone()),
        Cell::Integer(i) => JsonValue::from(*i),
        Cell::Float(v) => JsonValue::from(*v),
        Cell::Bool(b) => JsonValue::Bool(*b),
        Cell::Vector(v) => JsonValue::Array(v.iter().map(|&x| JsonValue::from(x)).collect()),
        Cell::Null => JsonValue::Null,
    }
}

fn write_json(path: &Path, table: &Table) -> Result<()> {
    let records: Vec<JsonValue> = table
        .rows()
        .iter()
        .map(|row| {
            let obj: Map<String, JsonValue> = table
                .columns
                .iter()
                .cloned()
                .zip(row.iter().map(cell_to_json))
                .collect();
            JsonValue::Object(obj)
        })
        .collect();
    let file = File::create(path).map_err(|e| ExtractError::io(path, e))?;
    let mut writer = BufWriter::new(file);
    serde_json::to_writer(&mut writer, &records)?;
    writer.flush().map_err(|e| ExtractError::io(path, e))
}
