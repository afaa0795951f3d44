//! FILENAME: aggregate-engine/src/engine.rs
//! Group Engine - routes rows to accumulators and builds the result table.
//!
//! Algorithm (single pass, no buffering of raw rows):
//! 1. Extract the key tuple and the pivot tuple from the row
//! 2. Intern both; new tuples are appended in first-seen order
//! 3. Find or create the accumulator array for (key, pivot)
//! 4. Feed each value field's raw bytes to its accumulator
//!
//! Finalization walks keys in first-seen order and, for each, every pivot
//! tuple in global first-seen order, so pivot columns line up across rows
//! even when a group never saw a given pivot value.

use std::iter;

use log::{debug, warn};
use rustc_hash::FxHashMap;
use smallvec::SmallVec;

use crate::aggregator::Aggregator;
use crate::definition::{AggregationSpec, EngineOptions, FieldIndex, MalformedRowPolicy};
use crate::error::EngineError;
use crate::view::{ResultTable, RunStats};

// ============================================================================
// TUPLE INTERNING
// ============================================================================

/// The byte values of the key (or pivot) fields of one row.
type Tuple = SmallVec<[Box<[u8]>; 4]>;

/// Position of a tuple in first-seen order.
type TupleId = usize;

/// Stores each distinct tuple once and hands out ids in arrival order.
#[derive(Debug, Default)]
struct TupleInterner {
    tuple_to_id: FxHashMap<Tuple, TupleId>,
    id_to_tuple: Vec<Tuple>,
}

impl TupleInterner {
    fn intern(&mut self, tuple: Tuple) -> TupleId {
        if let Some(&id) = self.tuple_to_id.get(&tuple) {
            return id;
        }
        let id = self.id_to_tuple.len();
        self.id_to_tuple.push(tuple.clone());
        self.tuple_to_id.insert(tuple, id);
        id
    }

    fn len(&self) -> usize {
        self.id_to_tuple.len()
    }

    fn iter(&self) -> impl Iterator<Item = &Tuple> {
        self.id_to_tuple.iter()
    }
}

fn extract_tuple<F: AsRef<[u8]>>(fields: &[F], indices: &[FieldIndex]) -> Tuple {
    indices.iter().map(|&i| Box::from(fields[i].as_ref())).collect()
}

fn field_text(field: &[u8]) -> String {
    String::from_utf8_lossy(field).into_owned()
}

// ============================================================================
// GROUP ENTRY
// ============================================================================

/// Accumulator arrays of one key tuple, one array per pivot tuple seen with it.
#[derive(Debug, Default)]
struct GroupEntry {
    cells: FxHashMap<TupleId, Vec<Box<dyn Aggregator>>>,
}

// ============================================================================
// GROUP ENGINE
// ============================================================================

/// Owns all group and accumulator state for one pass over a stream.
#[derive(Debug)]
pub struct GroupEngine {
    spec: AggregationSpec,
    options: EngineOptions,
    keys: TupleInterner,
    pivots: TupleInterner,
    /// Indexed by key TupleId.
    groups: Vec<GroupEntry>,
    rows_seen: u64,
    rows_processed: u64,
    rows_skipped: u64,
}

impl GroupEngine {
    pub fn new(spec: AggregationSpec, options: EngineOptions) -> Self {
        let mut pivots = TupleInterner::default();
        if !spec.is_pivoting() {
            // Without pivot fields every row lands in one implicit column,
            // registered up front so an empty stream still gets its labels.
            pivots.intern(Tuple::new());
        }
        GroupEngine {
            spec,
            options,
            keys: TupleInterner::default(),
            pivots,
            groups: Vec::new(),
            rows_seen: 0,
            rows_processed: 0,
            rows_skipped: 0,
        }
    }

    pub fn spec(&self) -> &AggregationSpec {
        &self.spec
    }

    /// Feeds one row. Returns `Ok(false)` when the row was skipped as malformed.
    pub fn process_row<F: AsRef<[u8]>>(&mut self, fields: &[F]) -> Result<bool, EngineError> {
        self.rows_seen += 1;

        let required = self.spec.required_fields();
        if fields.len() < required {
            return match self.options.malformed_rows {
                MalformedRowPolicy::Skip => {
                    self.rows_skipped += 1;
                    warn!(
                        "skipping row {}: expected at least {} fields, found {}",
                        self.rows_seen,
                        required,
                        fields.len()
                    );
                    Ok(false)
                }
                MalformedRowPolicy::Abort => Err(EngineError::MalformedRow {
                    row: self.rows_seen,
                    required,
                    found: fields.len(),
                }),
            };
        }

        let key_id = self.keys.intern(extract_tuple(fields, self.spec.keys()));
        if key_id == self.groups.len() {
            self.groups.push(GroupEntry::default());
        }
        let pivot_id = self.pivots.intern(extract_tuple(fields, self.spec.pivots()));

        let spec = &self.spec;
        let aggregators = self.groups[key_id]
            .cells
            .entry(pivot_id)
            .or_insert_with(|| spec.create_aggregators());

        for (aggregator, value_field) in aggregators.iter_mut().zip(spec.value_fields()) {
            aggregator.update(fields[value_field.source_index].as_ref());
        }

        self.rows_processed += 1;
        Ok(true)
    }

    /// Feeds every row of a stream, stopping at the first error.
    pub fn process<I, R, F>(&mut self, rows: I) -> Result<(), EngineError>
    where
        I: IntoIterator<Item = R>,
        R: AsRef<[F]>,
        F: AsRef<[u8]>,
    {
        for row in rows {
            self.process_row(row.as_ref())?;
        }
        Ok(())
    }

    /// Counters for the rows processed so far.
    pub fn stats(&self) -> RunStats {
        let rejected_values = self
            .groups
            .iter()
            .flat_map(|group| group.cells.values())
            .flatten()
            .map(|aggregator| aggregator.rejected())
            .sum::<u64>();

        RunStats {
            rows_seen: self.rows_seen,
            rows_processed: self.rows_processed,
            rows_skipped: self.rows_skipped,
            groups: self.keys.len(),
            pivot_columns: self.pivots.len(),
            rejected_values,
        }
    }

    /// Renders the table for everything fed so far.
    ///
    /// Does not consume or reset any state: it can be called mid-stream for
    /// partial results and yields the same table when called twice.
    pub fn finalize(&self) -> ResultTable {
        let stats = self.stats();
        debug!(
            "finalizing {} groups x {} pivot columns ({} rows processed)",
            stats.groups, stats.pivot_columns, stats.rows_processed
        );
        if stats.rows_skipped > 0 || stats.rejected_values > 0 {
            warn!(
                "{} malformed rows skipped, {} non-numeric values ignored",
                stats.rows_skipped, stats.rejected_values
            );
        }

        let header = if self.options.header {
            Some(self.header_labels())
        } else {
            None
        };

        let value_count = self.spec.value_fields().len();
        let mut rows = Vec::with_capacity(self.keys.len());

        for (key, group) in self.keys.iter().zip(&self.groups) {
            let mut row: Vec<String> = key.iter().map(|field| field_text(field)).collect();
            row.reserve(self.pivots.len() * value_count);

            for pivot_id in 0..self.pivots.len() {
                match group.cells.get(&pivot_id) {
                    Some(aggregators) => row.extend(aggregators.iter().map(|a| a.render())),
                    None => row.extend(
                        iter::repeat(self.options.empty_cell_text.clone()).take(value_count),
                    ),
                }
            }

            rows.push(row);
        }

        ResultTable { header, rows, stats }
    }

    fn header_labels(&self) -> Vec<String> {
        let mut labels = self.spec.key_labels().to_vec();
        for pivot in self.pivots.iter() {
            for value_field in self.spec.value_fields() {
                if self.spec.is_pivoting() {
                    labels.push(format!("{}:{}", self.pivot_text(pivot), value_field.label));
                } else {
                    labels.push(value_field.label.clone());
                }
            }
        }
        labels
    }

    /// Pivot fields joined with the sub-delimiter.
    fn pivot_text(&self, pivot: &Tuple) -> String {
        let joined = pivot.join(self.spec.sub_delimiter());
        field_text(&joined)
    }
}

/// Runs a whole stream through a fresh engine.
pub fn aggregate_rows<I, R, F>(
    spec: AggregationSpec,
    options: EngineOptions,
    rows: I,
) -> Result<ResultTable, EngineError>
where
    I: IntoIterator<Item = R>,
    R: AsRef<[F]>,
    F: AsRef<[u8]>,
{
    let mut engine = GroupEngine::new(spec, options);
    engine.process(rows)?;
    Ok(engine.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::definition::{AggregationConfig, AggregationType, HeaderMap};

    fn build_spec(config: AggregationConfig) -> AggregationSpec {
        AggregationSpec::build(&config, &HeaderMap::default()).unwrap()
    }

    fn strings(cells: &[&str]) -> Vec<String> {
        cells.iter().map(|c| c.to_string()).collect()
    }

    #[test]
    fn test_pivot_sum() {
        let spec = build_spec(
            AggregationConfig::new()
                .with_keys("0")
                .with_pivots("1")
                .with_aggregate(AggregationType::Sum, "2"),
        );
        let rows = vec![vec!["a", "x", "10"], vec!["a", "y", "20"], vec!["a", "x", "5"]];

        let table = aggregate_rows(spec, EngineOptions::default(), rows).unwrap();

        assert_eq!(table.header, Some(strings(&["0", "x:2-Sum", "y:2-Sum"])));
        assert_eq!(table.rows, vec![strings(&["a", "15", "20"])]);
    }

    #[test]
    fn test_count_grouped_by_itself() {
        let spec = build_spec(
            AggregationConfig::new()
                .with_keys("0")
                .with_aggregate(AggregationType::Count, "0"),
        );
        let rows = vec![vec!["p"], vec!["q"], vec!["p"]];

        let table = aggregate_rows(spec, EngineOptions::default(), rows).unwrap();

        assert_eq!(table.header, Some(strings(&["0", "0-Cnt"])));
        assert_eq!(table.rows, vec![strings(&["p", "2"]), strings(&["q", "1"])]);
    }

    #[test]
    fn test_pivot_columns_are_global_first_seen() {
        let spec = build_spec(
            AggregationConfig::new()
                .with_keys("0")
                .with_pivots("1")
                .with_aggregate(AggregationType::Sum, "2"),
        );
        let rows = vec![
            vec!["a", "y", "1"],
            vec!["b", "x", "2"],
            vec!["b", "y", "3"],
            vec!["a", "z", "4"],
        ];
        let options = EngineOptions {
            empty_cell_text: "-".to_string(),
            ..EngineOptions::default()
        };

        let table = aggregate_rows(spec, options, rows).unwrap();

        assert_eq!(
            table.header,
            Some(strings(&["0", "y:2-Sum", "x:2-Sum", "z:2-Sum"]))
        );
        assert_eq!(
            table.rows,
            vec![strings(&["a", "1", "-", "4"]), strings(&["b", "3", "2", "-"])]
        );
        assert_eq!(table.stats.pivot_columns, 3);
    }

    #[test]
    fn test_composite_keys_and_pivots() {
        let spec = build_spec(
            AggregationConfig::new()
                .with_keys("0,1")
                .with_pivots("2,3")
                .with_aggregate(AggregationType::Concat, "4")
                .with_sub_delimiter("/"),
        );
        let rows = vec![
            vec!["a", "b", "p", "q", "1"],
            vec!["a", "c", "p", "q", "2"],
            vec!["a", "b", "p", "q", "3"],
        ];

        let table = aggregate_rows(spec, EngineOptions::default(), rows).unwrap();

        assert_eq!(table.header, Some(strings(&["0", "1", "p/q:4-Cat"])));
        assert_eq!(
            table.rows,
            vec![strings(&["a", "b", "1/3"]), strings(&["a", "c", "2"])]
        );
    }

    #[test]
    fn test_multiple_aggregates_on_one_field() {
        let spec = build_spec(
            AggregationConfig::new()
                .with_keys("0")
                .with_aggregate(AggregationType::Count, "1")
                .with_aggregate(AggregationType::Sum, "1")
                .with_aggregate(AggregationType::First, "1")
                .with_aggregate(AggregationType::Last, "1"),
        );
        let rows = vec![vec!["k", "1"], vec!["k", "2"], vec!["k", "4"]];

        let table = aggregate_rows(spec, EngineOptions::default(), rows).unwrap();

        assert_eq!(
            table.header,
            Some(strings(&["0", "1-Sum", "1-Cnt", "1-Fst", "1-Lst"]))
        );
        assert_eq!(table.rows, vec![strings(&["k", "7", "3", "1", "4"])]);
    }

    #[test]
    fn test_no_keys_is_one_group() {
        let spec = build_spec(AggregationConfig::new().with_aggregate(AggregationType::Average, "0"));
        let rows = vec![vec!["1"], vec!["2"], vec!["6"]];

        let table = aggregate_rows(spec, EngineOptions::default(), rows).unwrap();

        assert_eq!(table.header, Some(strings(&["0-Avg"])));
        assert_eq!(table.rows, vec![strings(&["3"])]);
    }

    #[test]
    fn test_empty_stream_yields_header_only() {
        let spec = build_spec(
            AggregationConfig::new()
                .with_keys("0")
                .with_aggregate(AggregationType::Sum, "1"),
        );
        let rows: Vec<Vec<&str>> = Vec::new();

        let table = aggregate_rows(spec.clone(), EngineOptions::default(), rows.clone()).unwrap();
        assert_eq!(table.header, Some(strings(&["0", "1-Sum"])));
        assert!(table.is_empty());

        let options = EngineOptions { header: false, ..EngineOptions::default() };
        let table = aggregate_rows(spec, options, rows).unwrap();
        assert_eq!(table.header, None);
        assert_eq!(table.lines().count(), 0);
    }

    #[test]
    fn test_malformed_rows_are_skipped_and_counted() {
        let spec = build_spec(
            AggregationConfig::new()
                .with_keys("0")
                .with_aggregate(AggregationType::Sum, "2"),
        );
        let mut engine = GroupEngine::new(spec, EngineOptions::default());

        assert!(engine.process_row(&["a", "x", "1"]).unwrap());
        assert!(!engine.process_row(&["a", "x"]).unwrap());
        assert!(engine.process_row(&["a", "x", "2", "extra"]).unwrap());

        let table = engine.finalize();
        assert_eq!(table.rows, vec![strings(&["a", "3"])]);
        assert_eq!(table.stats.rows_seen, 3);
        assert_eq!(table.stats.rows_processed, 2);
        assert_eq!(table.stats.rows_skipped, 1);
    }

    #[test]
    fn test_malformed_row_aborts_when_configured() {
        let spec = build_spec(AggregationConfig::new().with_keys("1"));
        let options = EngineOptions {
            malformed_rows: MalformedRowPolicy::Abort,
            ..EngineOptions::default()
        };
        let rows = vec![vec!["a", "b"], vec!["c"], vec!["d", "e"]];

        let err = aggregate_rows(spec, options, rows).unwrap_err();

        assert_eq!(err, EngineError::MalformedRow { row: 2, required: 2, found: 1 });
    }

    #[test]
    fn test_rejected_values_are_reported() {
        let spec = build_spec(
            AggregationConfig::new()
                .with_keys("0")
                .with_aggregate(AggregationType::Sum, "1")
                .with_aggregate(AggregationType::Min, "1"),
        );
        let rows = vec![vec!["a", "n/a"], vec!["a", "3"], vec!["b", "?"]];

        let table = aggregate_rows(spec, EngineOptions::default(), rows).unwrap();

        assert_eq!(table.rows, vec![strings(&["a", "3", "3"]), strings(&["b", "0", ""])]);
        assert_eq!(table.stats.rejected_values, 4);
    }

    #[test]
    fn test_finalize_is_repeatable_and_allows_more_rows() {
        let spec = build_spec(
            AggregationConfig::new()
                .with_keys("0")
                .with_aggregate(AggregationType::Count, "0"),
        );
        let mut engine = GroupEngine::new(spec, EngineOptions::default());

        engine.process(vec![vec!["a"], vec!["a"]]).unwrap();
        let partial = engine.finalize();
        assert_eq!(partial, engine.finalize());
        assert_eq!(partial.rows, vec![strings(&["a", "2"])]);

        engine.process(vec![vec!["a"]]).unwrap();
        assert_eq!(engine.finalize().rows, vec![strings(&["a", "3"])]);
    }

    #[test]
    fn test_keys_compare_by_exact_bytes() {
        let spec = build_spec(
            AggregationConfig::new()
                .with_keys("0")
                .with_aggregate(AggregationType::Count, "0"),
        );
        let rows: Vec<Vec<&[u8]>> = vec![
            vec![&b"a"[..]],
            vec![&b"A"[..]],
            vec![&b"a "[..]],
            vec![&b"a"[..]],
        ];

        let table = aggregate_rows(spec, EngineOptions::default(), rows).unwrap();

        assert_eq!(table.stats.groups, 3);
        assert_eq!(table.rows[0], strings(&["a", "2"]));
    }
}
