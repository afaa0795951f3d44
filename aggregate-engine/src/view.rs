//! FILENAME: aggregate-engine/src/view.rs
//! Result Table - the finished output handed to the writer.
//!
//! Every cell is already rendered text, so a writer only has to join cells
//! with its delimiter.

use serde::Serialize;

/// Counters collected over one pass.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RunStats {
    /// Rows offered to the engine, including skipped ones.
    pub rows_seen: u64,
    pub rows_processed: u64,
    /// Rows too short for the configured field indices.
    pub rows_skipped: u64,
    /// Distinct key tuples.
    pub groups: usize,
    /// Distinct pivot tuples (1 when pivoting is disabled).
    pub pivot_columns: usize,
    /// Values numeric aggregates could not parse.
    pub rejected_values: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ResultTable {
    /// Column labels, present when the header row is enabled.
    pub header: Option<Vec<String>>,

    /// One row per key tuple, in first-seen order.
    pub rows: Vec<Vec<String>>,

    pub stats: RunStats,
}

impl ResultTable {
    /// Number of columns in every row of this table.
    pub fn column_count(&self) -> usize {
        self.header
            .as_ref()
            .map(Vec::len)
            .or_else(|| self.rows.first().map(Vec::len))
            .unwrap_or(0)
    }

    /// True when there are no data rows (a header may still be present).
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Header (if any) followed by the data rows.
    pub fn lines(&self) -> impl Iterator<Item = &[String]> {
        self.header
            .iter()
            .map(Vec::as_slice)
            .chain(self.rows.iter().map(Vec::as_slice))
    }
}
