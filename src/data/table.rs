use std::collections::{HashMap, HashSet};

use super::model::{Cell, Table};
use crate::error::{ExtractError, Result};

/// Resampled, unthresholded signal.
pub const ARRAY_VALS_COLUMN: &str = "array_vals";
/// Normalized signal at native length.
pub const ARRAY_VALS_NI_COLUMN: &str = "array_vals_ni";
/// Key column for the upsert merge.
pub const DEFAULT_ID_COLUMN: &str = "ID";

// ---------------------------------------------------------------------------
// Building a run's table
// ---------------------------------------------------------------------------

/// One row per group row: the metadata cells as text, then the
/// unthresholded and raw vectors of the image at the same position.
pub fn build(
    header: &[String],
    group_rows: &[Vec<String>],
    raw: &[Vec<f64>],
    unthresholded: &[Vec<f64>],
) -> Result<Table> {
    if group_rows.len() != raw.len() || group_rows.len() != unthresholded.len() {
        return Err(ExtractError::Schema(format!(
            "{} metadata rows but {} raw and {} resampled signals",
            group_rows.len(),
            raw.len(),
            unthresholded.len()
        )));
    }

    let mut columns = header.to_vec();
    columns.push(ARRAY_VALS_COLUMN.to_string());
    columns.push(ARRAY_VALS_NI_COLUMN.to_string());

    let mut table = Table::new(columns);
    for ((meta, raw), interp) in group_rows.iter().zip(raw).zip(unthresholded) {
        if meta.len() != header.len() {
            return Err(ExtractError::Schema(format!(
                "metadata row {} has {} fields but the header has {}",
                table.len(),
                meta.len(),
                header.len()
            )));
        }
        let mut row: Vec<Cell> = meta.iter().cloned().map(Cell::Text).collect();
        row.push(Cell::Vector(interp.clone()));
        row.push(Cell::Vector(raw.clone()));
        table.push_row(row)?;
    }
    Ok(table)
}

// ---------------------------------------------------------------------------
// Upsert merge
// ---------------------------------------------------------------------------

fn check_unique_columns(table: &Table, side: &str) -> Result<()> {
    match table.duplicate_column() {
        Some(name) => Err(ExtractError::Schema(format!(
            "{side} table has duplicate column `{name}`"
        ))),
        None => Ok(()),
    }
}

fn require_column(table: &Table, column: &str, side: &str) -> Result<usize> {
    table.column_index(column).ok_or_else(|| {
        ExtractError::Schema(format!("{side} table has no `{column}` column"))
    })
}

/// Append `new` below `existing` and keep only the newest row per ID.
///
/// Columns are the outer union: existing columns first, then columns only
/// `new` has; cells a side lacks are `Null`. A surviving row stays where its
/// last occurrence was.
pub fn merge(existing: &Table, new: &Table, id_column: &str) -> Result<Table> {
    check_unique_columns(existing, "existing")?;
    check_unique_columns(new, "new")?;
    require_column(existing, id_column, "existing")?;
    require_column(new, id_column, "new")?;

    let mut columns = existing.columns.clone();
    for name in &new.columns {
        if !columns.contains(name) {
            columns.push(name.clone());
        }
    }
    let position: HashMap<&str, usize> = columns
        .iter()
        .enumerate()
        .map(|(i, c)| (c.as_str(), i))
        .collect();

    let widen = |table: &Table| -> Vec<Vec<Cell>> {
        let slots: Vec<usize> = table.columns.iter().map(|c| position[c.as_str()]).collect();
        table
            .rows()
            .iter()
            .map(|row| {
                let mut wide = vec![Cell::Null; columns.len()];
                for (cell, &slot) in row.iter().zip(&slots) {
                    wide[slot] = cell.clone();
                }
                wide
            })
            .collect()
    };
    let mut stacked = widen(existing);
    stacked.extend(widen(new));

    let id_idx = position[id_column];
    let mut seen: HashSet<Cell> = HashSet::new();
    let mut kept: Vec<Vec<Cell>> = Vec::with_capacity(stacked.len());
    for row in stacked.into_iter().rev() {
        if seen.insert(row[id_idx].clone()) {
            kept.push(row);
        }
    }
    kept.reverse();

    let mut merged = Table::new(columns);
    for row in kept {
        merged.push_row(row)?;
    }
    Ok(merged)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table(columns: &[&str], rows: &[&[Cell]]) -> Table {
        let mut t = Table::new(columns.iter().map(|c| c.to_string()).collect());
        for row in rows {
            t.push_row(row.to_vec()).unwrap();
        }
        t
    }

    fn ids(t: &Table) -> Vec<Cell> {
        t.column("ID").unwrap().cloned().collect()
    }

    #[test]
    fn build_appends_signal_columns() {
        let header = vec!["ID".to_string(), "diet".to_string()];
        let rows = vec![
            vec!["1".to_string(), "OP50".to_string()],
            vec!["2".to_string(), "HB101".to_string()],
        ];
        let raw = vec![vec![0.1, 0.2], vec![0.3, 0.4]];
        let interp = vec![vec![0.1, 0.15, 0.2], vec![0.3, 0.35, 0.4]];

        let t = build(&header, &rows, &raw, &interp).unwrap();
        assert_eq!(t.columns, vec!["ID", "diet", "array_vals", "array_vals_ni"]);
        assert_eq!(t.len(), 2);
        assert_eq!(t.get(1, "diet"), Some(&Cell::from("HB101")));
        assert_eq!(t.get(1, ARRAY_VALS_COLUMN), Some(&Cell::Vector(interp[1].clone())));
        assert_eq!(t.get(0, ARRAY_VALS_NI_COLUMN), Some(&Cell::Vector(raw[0].clone())));
    }

    #[test]
    fn build_rejects_count_mismatch() {
        let header = vec!["ID".to_string()];
        let rows = vec![vec!["1".to_string()], vec!["2".to_string()]];
        let err = build(&header, &rows, &[vec![0.0]], &[vec![0.0]]).unwrap_err();
        assert!(matches!(err, ExtractError::Schema(_)));
    }

    #[test]
    fn build_rejects_ragged_rows() {
        let header = vec!["ID".to_string(), "sex".to_string()];
        let rows = vec![vec!["1".to_string()]];
        let err = build(&header, &rows, &[vec![0.0]], &[vec![0.0]]).unwrap_err();
        assert!(matches!(err, ExtractError::Schema(_)));
    }

    #[test]
    fn newest_row_wins() {
        let old = table(&["ID", "v"], &[&["1".into(), "v_old".into()]]);
        let new = table(
            &["ID", "v"],
            &[&["1".into(), "v_new".into()], &["2".into(), "v_two".into()]],
        );
        let merged = merge(&old, &new, "ID").unwrap();
        assert_eq!(merged.len(), 2);
        assert_eq!(merged.get(0, "ID"), Some(&Cell::from("1")));
        assert_eq!(merged.get(0, "v"), Some(&Cell::from("v_new")));
        assert_eq!(merged.get(1, "ID"), Some(&Cell::from("2")));
        assert_eq!(merged.get(1, "v"), Some(&Cell::from("v_two")));
    }

    #[test]
    fn surviving_rows_keep_last_occurrence_position() {
        let old = table(
            &["ID"],
            &[&["a".into()], &["b".into()], &["c".into()]],
        );
        let new = table(&["ID"], &[&["b".into()], &["d".into()]]);
        let merged = merge(&old, &new, "ID").unwrap();
        assert_eq!(
            ids(&merged),
            vec![Cell::from("a"), Cell::from("c"), Cell::from("b"), Cell::from("d")]
        );
    }

    #[test]
    fn merge_is_idempotent() {
        let old = table(
            &["ID", "v"],
            &[&["1".into(), "x".into()], &["3".into(), "z".into()]],
        );
        let new = table(
            &["ID", "v"],
            &[&["1".into(), "y".into()], &["2".into(), "w".into()]],
        );
        let once = merge(&old, &new, "ID").unwrap();
        let twice = merge(&once, &new, "ID").unwrap();
        assert_eq!(once, twice);
    }

    #[test]
    fn every_distinct_id_appears_once() {
        let old = table(
            &["ID"],
            &[&["1".into()], &["1".into()], &["2".into()]],
        );
        let new = table(&["ID"], &[&["2".into()], &["3".into()], &["3".into()]]);
        let merged = merge(&old, &new, "ID").unwrap();
        let mut got: Vec<String> = ids(&merged).iter().map(|c| c.to_string()).collect();
        got.sort();
        assert_eq!(got, vec!["1", "2", "3"]);
    }

    #[test]
    fn columns_are_outer_joined() {
        let old = table(&["ID", "sex"], &[&["1".into(), "herm".into()]]);
        let new = table(
            &["ID", "diet"],
            &[&["2".into(), "OP50".into()]],
        );
        let merged = merge(&old, &new, "ID").unwrap();
        assert_eq!(merged.columns, vec!["ID", "sex", "diet"]);
        assert_eq!(merged.get(0, "diet"), Some(&Cell::Null));
        assert_eq!(merged.get(1, "sex"), Some(&Cell::Null));
        assert_eq!(merged.get(1, "diet"), Some(&Cell::from("OP50")));
    }

    #[test]
    fn typed_ids_do_not_collide() {
        let old = table(&["ID"], &[&[Cell::Integer(1)]]);
        let new = table(&["ID"], &[&["1".into()]]);
        assert_eq!(merge(&old, &new, "ID").unwrap().len(), 2);
    }

    #[test]
    fn nan_ids_deduplicate() {
        let old = table(&["ID", "v"], &[&[Cell::Float(f64::NAN), "old".into()]]);
        let new = table(&["ID", "v"], &[&[Cell::Float(f64::NAN), "new".into()]]);
        let merged = merge(&old, &new, "ID").unwrap();
        assert_eq!(merged.len(), 1);
        assert_eq!(merged.get(0, "v"), Some(&Cell::from("new")));
    }

    #[test]
    fn missing_id_column_is_schema_error() {
        let old = table(&["name"], &[&["a".into()]]);
        let new = table(&["ID"], &[&["1".into()]]);
        assert!(matches!(merge(&old, &new, "ID"), Err(ExtractError::Schema(_))));
        assert!(matches!(merge(&new, &old, "ID"), Err(ExtractError::Schema(_))));
    }

    #[test]
    fn duplicate_columns_are_schema_error() {
        let old = table(&["ID", "x", "x"], &[]);
        let new = table(&["ID"], &[]);
        assert!(matches!(merge(&old, &new, "ID"), Err(ExtractError::Schema(_))));
    }
}
