//! Executed-statement results.

use crate::value::Value;
use std::sync::Arc;

/// The outcome of one executed statement.
///
/// Services hand these out behind an `Arc`; a cached SELECT returns the same
/// `Arc` to every caller with identical substituted SQL.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ResultSet {
    columns: Arc<[String]>,
    rows: Vec<Row>,
    rows_affected: u64,
    last_insert_id: Option<u64>,
}

/// One row of a [`ResultSet`].
#[derive(Debug, Clone, PartialEq)]
pub struct Row {
    columns: Arc<[String]>,
    values: Vec<Value>,
}

impl ResultSet {
    /// Build a result set from column names and row values.
    ///
    /// Rows shorter than `columns` are padded with NULL.
    pub fn new(columns: Vec<String>, rows: Vec<Vec<Value>>) -> Self {
        let columns: Arc<[String]> = columns.into();
        let rows = rows
            .into_iter()
            .map(|mut values| {
                values.resize(columns.len(), Value::Null);
                Row {
                    columns: Arc::clone(&columns),
                    values,
                }
            })
            .collect();
        Self {
            columns,
            rows,
            rows_affected: 0,
            last_insert_id: None,
        }
    }

    /// A row-less result for DML statements.
    pub fn affected(rows_affected: u64, last_insert_id: Option<u64>) -> Self {
        Self {
            rows_affected,
            last_insert_id,
            ..Self::default()
        }
    }

    pub fn with_rows_affected(mut self, n: u64) -> Self {
        self.rows_affected = n;
        self
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn rows(&self) -> &[Row] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn first(&self) -> Option<&Row> {
        self.rows.first()
    }

    pub fn rows_affected(&self) -> u64 {
        self.rows_affected
    }

    /// Auto-increment id generated by this statement, if any.
    pub fn last_insert_id(&self) -> Option<u64> {
        self.last_insert_id
    }

    /// All values of the named column, in row order.
    pub fn column(&self, name: &str) -> Option<Vec<&Value>> {
        let idx = self.columns.iter().position(|c| c == name)?;
        Some(self.rows.iter().map(|r| &r.values[idx]).collect())
    }
}

impl Row {
    pub fn get(&self, column: &str) -> Option<&Value> {
        let idx = self.columns.iter().position(|c| c == column)?;
        self.values.get(idx)
    }

    pub fn get_idx(&self, idx: usize) -> Option<&Value> {
        self.values.get(idx)
    }

    pub fn values(&self) -> &[Value] {
        &self.values
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}
