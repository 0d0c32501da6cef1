use std::collections::HashSet;
use std::fmt;

use crate::error::{ExtractError, Result};

// ---------------------------------------------------------------------------
// Cell – a single value in a table column
// ---------------------------------------------------------------------------

/// A dynamically-typed table cell. Metadata columns arrive as `Text`; the
/// signal columns hold whole vectors; other variants come back from stored
/// tables written elsewhere.
///
/// Floats compare by value with `0.0 == -0.0`, except that every NaN equals
/// every other NaN, so NaN keys deduplicate like any other key.
#[derive(Debug, Clone)]
pub enum Cell {
    Text(String),
    Integer(i64),
    Float(f64),
    Bool(bool),
    Vector(Vec<f64>),
    Null,
}

// -- Manual PartialEq/Eq/Hash so cells can key the deduplication set --

/// Canonical bits: `0.0` and `-0.0` collapse, as do all NaN payloads.
fn float_bits(x: f64) -> u64 {
    if x == 0.0 {
        0
    } else if x.is_nan() {
        f64::NAN.to_bits()
    } else {
        x.to_bits()
    }
}

impl PartialEq for Cell {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Cell::Text(a), Cell::Text(b)) => a == b,
            (Cell::Integer(a), Cell::Integer(b)) => a == b,
            (Cell::Float(a), Cell::Float(b)) => float_bits(*a) == float_bits(*b),
            (Cell::Bool(a), Cell::Bool(b)) => a == b,
            (Cell::Vector(a), Cell::Vector(b)) => {
                a.len() == b.len()
                    && a.iter().zip(b).all(|(x, y)| float_bits(*x) == float_bits(*y))
            }
            (Cell::Null, Cell::Null) => true,
            _ => false,
        }
    }
}

impl Eq for Cell {}

impl std::hash::Hash for Cell {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        std::mem::discriminant(self).hash(state);
        match self {
            Cell::Text(s) => s.hash(state),
            Cell::Integer(i) => i.hash(state),
            Cell::Float(f) => float_bits(*f).hash(state),
            Cell::Bool(b) => b.hash(state),
            Cell::Vector(v) => {
                v.len().hash(state);
                for x in v {
                    float_bits(*x).hash(state);
                }
            }
            Cell::Null => {}
        }
    }
}

impl fmt::Display for Cell {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Cell::Text(s) => write!(f, "{s}"),
            Cell::Integer(i) => write!(f, "{i}"),
            Cell::Float(v) => write!(f, "{v}"),
            Cell::Bool(b) => write!(f, "{b}"),
            Cell::Vector(v) => write!(f, "[{} values]", v.len()),
            Cell::Null => write!(f, "<null>"),
        }
    }
}

impl From<&str> for Cell {
    fn from(s: &str) -> Self {
        Cell::Text(s.to_string())
    }
}

impl From<String> for Cell {
    fn from(s: String) -> Self {
        Cell::Text(s)
    }
}

impl From<Vec<f64>> for Cell {
    fn from(v: Vec<f64>) -> Self {
        Cell::Vector(v)
    }
}

impl Cell {
    pub fn is_null(&self) -> bool {
        matches!(self, Cell::Null)
    }

    pub fn as_vector(&self) -> Option<&[f64]> {
        match self {
            Cell::Vector(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            Cell::Text(s) => Some(s),
            _ => None,
        }
    }
}

// ---------------------------------------------------------------------------
// Table – ordered columns, positional rows
// ---------------------------------------------------------------------------

/// A row table. Every row has exactly `columns.len()` cells.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Table {
    pub columns: Vec<String>,
    rows: Vec<Vec<Cell>>,
}

impl Table {
    pub fn new(columns: Vec<String>) -> Self {
        Table {
            columns,
            rows: Vec::new(),
        }
    }

    /// Append a row, rejecting one whose width differs from the column count.
    pub fn push_row(&mut self, row: Vec<Cell>) -> Result<()> {
        if row.len() != self.columns.len() {
            return Err(ExtractError::Schema(format!(
                "row {} has {} cells but the table has {} columns",
                self.rows.len(),
                row.len(),
                self.columns.len()
            )));
        }
        self.rows.push(row);
        Ok(())
    }

    pub fn rows(&self) -> &[Vec<Cell>] {
        &self.rows
    }

    pub fn into_rows(self) -> Vec<Vec<Cell>> {
        self.rows
    }

    /// Position of the first column named `name`.
    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == name)
    }

    /// All cells of the first column named `name`, in row order.
    pub fn column(&self, name: &str) -> Option<impl Iterator<Item = &Cell> + '_> {
        let idx = self.column_index(name)?;
        Some(self.rows.iter().map(move |row| &row[idx]))
    }

    /// First column name that occurs more than once, if any.
    pub fn duplicate_column(&self) -> Option<&str> {
        let mut seen = HashSet::new();
        self.columns
            .iter()
            .find(|name| !seen.insert(name.as_str()))
            .map(String::as_str)
    }

    pub fn get(&self, row: usize, column: &str) -> Option<&Cell> {
        let idx = self.column_index(column)?;
        self.rows.get(row).map(|r| &r[idx])
    }

    /// Number of rows.
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}
