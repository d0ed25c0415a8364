//! Materialized statement results

use serde_json::{Map, Value};

/// One result row: column name to value, in select order
pub type Row = Map<String, Value>;

/// Result of one statement
///
/// Row-returning statements carry their rows (fully read before the shared
/// statement handle is released); other statements carry the affected-row
/// count and the last inserted row id.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct QueryResult {
    rows: Vec<Row>,
    cursor: usize,
    rows_affected: u64,
    last_insert_id: i64,
}

impl QueryResult {
    pub(crate) fn from_rows(rows: Vec<Row>) -> Self {
        Self {
            rows,
            ..Default::default()
        }
    }

    pub(crate) fn from_execution(rows_affected: u64, last_insert_id: i64) -> Self {
        Self {
            rows_affected,
            last_insert_id,
            ..Default::default()
        }
    }

    /// Number of rows in the result set
    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    pub fn rows_affected(&self) -> u64 {
        self.rows_affected
    }

    pub fn last_insert_id(&self) -> i64 {
        self.last_insert_id
    }

    /// Next row in sequence, `None` once exhausted
    pub fn next_row(&mut self) -> Option<&Row> {
        let row = self.rows.get(self.cursor)?;
        self.cursor += 1;
        Some(row)
    }

    /// Restart sequential iteration from the first row
    pub fn rewind(&mut self) {
        self.cursor = 0;
    }

    /// All rows, independent of the iteration cursor
    pub fn fetch_all(&self) -> &[Row] {
        &self.rows
    }

    pub fn into_rows(self) -> Vec<Row> {
        self.rows
    }

    /// Column names of the first row
    pub fn columns(&self) -> Vec<&str> {
        self.rows
            .first()
            .map(|row| row.keys().map(String::as_str).collect())
            .unwrap_or_default()
    }
}

impl IntoIterator for QueryResult {
    type Item = Row;
    type IntoIter = std::vec::IntoIter<Row>;

    fn into_iter(self) -> Self::IntoIter {
        self.rows.into_iter()
    }
}
