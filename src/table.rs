//! Columnar result sets.
//!
//! A [`ResultTable`] is the unit of data flowing through every tier: the
//! warehouse returns one, the warm store serializes one, the hot store holds
//! one behind an `Arc`. Columns are typed and every cell is nullable, so the
//! warm-store codec round-trips names, types, and values exactly.

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum TableError {
    #[error("column {name:?} has {actual} values, expected {expected}")]
    ColumnLengthMismatch {
        name: String,
        expected: usize,
        actual: usize,
    },

    #[error("duplicate column name {0:?}")]
    DuplicateColumn(String),
}

/// The typed value vector backing one column. Every cell is optional; a
/// `None` is a null from the warehouse and must survive serialization.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "values", rename_all = "snake_case")]
pub enum ColumnValues {
    Int64(Vec<Option<i64>>),
    Float64(Vec<Option<f64>>),
    Utf8(Vec<Option<String>>),
    Bool(Vec<Option<bool>>),
}

impl ColumnValues {
    /// Number of cells in this column.
    pub fn len(&self) -> usize {
        match self {
            ColumnValues::Int64(v) => v.len(),
            ColumnValues::Float64(v) => v.len(),
            ColumnValues::Utf8(v) => v.len(),
            ColumnValues::Bool(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Logical type name, for diagnostics and the API response.
    pub fn type_name(&self) -> &'static str {
        match self {
            ColumnValues::Int64(_) => "int64",
            ColumnValues::Float64(_) => "float64",
            ColumnValues::Utf8(_) => "utf8",
            ColumnValues::Bool(_) => "bool",
        }
    }

    /// Approximate heap footprint of the cell data in bytes.
    fn approx_bytes(&self) -> usize {
        match self {
            ColumnValues::Int64(v) => v.len() * 16,
            ColumnValues::Float64(v) => v.len() * 16,
            ColumnValues::Bool(v) => v.len() * 2,
            ColumnValues::Utf8(v) => v
                .iter()
                .map(|s| 32 + s.as_ref().map(|s| s.len()).unwrap_or(0))
                .sum(),
        }
    }
}

/// A single named column.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Column {
    pub name: String,
    #[serde(flatten)]
    pub values: ColumnValues,
}

impl Column {
    pub fn new(name: impl Into<String>, values: ColumnValues) -> Self {
        Self {
            name: name.into(),
            values,
        }
    }
}

/// A column-oriented result set.
///
/// All columns have the same length. A table with zero rows — or zero
/// columns — is a perfectly valid result and a perfectly valid cache entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResultTable {
    columns: Vec<Column>,
}

impl ResultTable {
    /// Build a table, validating that column lengths agree and names are
    /// unique.
    pub fn new(columns: Vec<Column>) -> Result<Self, TableError> {
        if let Some(first) = columns.first() {
            let expected = first.values.len();
            for col in &columns {
                if col.values.len() != expected {
                    return Err(TableError::ColumnLengthMismatch {
                        name: col.name.clone(),
                        expected,
                        actual: col.values.len(),
                    });
                }
            }
        }
        for (i, col) in columns.iter().enumerate() {
            if columns[..i].iter().any(|c| c.name == col.name) {
                return Err(TableError::DuplicateColumn(col.name.clone()));
            }
        }
        Ok(Self { columns })
    }

    /// A table with no columns and no rows.
    pub fn empty() -> Self {
        Self {
            columns: Vec::new(),
        }
    }

    pub fn num_rows(&self) -> usize {
        self.columns.first().map(|c| c.values.len()).unwrap_or(0)
    }

    pub fn num_columns(&self) -> usize {
        self.columns.len()
    }

    pub fn columns(&self) -> &[Column] {
        &self.columns
    }

    /// Look up a column by name.
    pub fn column(&self, name: &str) -> Option<&Column> {
        self.columns.iter().find(|c| c.name == name)
    }

    /// Approximate resident size in bytes, used for the hot store's byte
    /// budget. Not exact; stable for identical tables.
    pub fn approx_bytes(&self) -> usize {
        self.columns
            .iter()
            .map(|c| 64 + c.name.len() + c.values.approx_bytes())
            .sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_table() -> ResultTable {
        ResultTable::new(vec![
            Column::new(
                "plan",
                ColumnValues::Utf8(vec![Some("monthly".into()), None, Some("annual".into())]),
            ),
            Column::new(
                "subscriptions",
                ColumnValues::Int64(vec![Some(120), Some(88), None]),
            ),
            Column::new(
                "churn_rate",
                ColumnValues::Float64(vec![Some(0.031), None, Some(0.012)]),
            ),
            Column::new(
                "active",
                ColumnValues::Bool(vec![Some(true), Some(false), None]),
            ),
        ])
        .unwrap()
    }

    #[test]
    fn test_row_and_column_counts() {
        let table = sample_table();
        assert_eq!(table.num_rows(), 3);
        assert_eq!(table.num_columns(), 4);
        assert_eq!(table.column("plan").unwrap().values.type_name(), "utf8");
        assert!(table.column("missing").is_none());
    }

    #[test]
    fn test_length_mismatch_rejected() {
        let result = ResultTable::new(vec![
            Column::new("a", ColumnValues::Int64(vec![Some(1), Some(2)])),
            Column::new("b", ColumnValues::Int64(vec![Some(1)])),
        ]);
        assert!(matches!(
            result,
            Err(TableError::ColumnLengthMismatch { .. })
        ));
    }

    #[test]
    fn test_duplicate_column_rejected() {
        let result = ResultTable::new(vec![
            Column::new("a", ColumnValues::Int64(vec![])),
            Column::new("a", ColumnValues::Utf8(vec![])),
        ]);
        assert!(matches!(result, Err(TableError::DuplicateColumn(_))));
    }

    #[test]
    fn test_empty_table_is_valid() {
        let empty = ResultTable::empty();
        assert_eq!(empty.num_rows(), 0);
        assert_eq!(empty.num_columns(), 0);

        // Zero rows with columns present is also valid.
        let no_rows = ResultTable::new(vec![
            Column::new("a", ColumnValues::Int64(vec![])),
            Column::new("b", ColumnValues::Utf8(vec![])),
        ])
        .unwrap();
        assert_eq!(no_rows.num_rows(), 0);
        assert_eq!(no_rows.num_columns(), 2);
    }

    #[test]
    fn test_json_roundtrip_preserves_nulls_and_types() {
        let table = sample_table();
        let encoded = serde_json::to_vec(&table).unwrap();
        let decoded: ResultTable = serde_json::from_slice(&encoded).unwrap();
        assert_eq!(decoded, table);
    }

    #[test]
    fn test_approx_bytes_scales_with_rows() {
        let small = ResultTable::new(vec![Column::new(
            "v",
            ColumnValues::Int64(vec![Some(1); 10]),
        )])
        .unwrap();
        let large = ResultTable::new(vec![Column::new(
            "v",
            ColumnValues::Int64(vec![Some(1); 1000]),
        )])
        .unwrap();
        assert!(large.approx_bytes() > small.approx_bytes());
    }
}
