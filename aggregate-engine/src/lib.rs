//! FILENAME: aggregate-engine/src/lib.rs
//! Streaming group-by/pivot aggregation over delimited records.
//!
//! Rows arrive already split into byte fields. Some fields form a grouping
//! key, some form pivot columns, and the rest feed aggregate functions
//! (sum, count, min, max, average, first, last, concat, stddev, median, MAD)
//! per distinct (key, pivot) pair.
//!
//! Layers:
//! - `definition`: Configuration and the resolved specification (what to compute)
//! - `aggregator`: Per-cell accumulators (HOW each value is folded)
//! - `engine`: Grouping/pivot engine (HOW rows are routed)
//! - `view`: Finished result table (WHAT the writer receives)

pub mod aggregator;
pub mod definition;
pub mod engine;
pub mod error;
pub mod view;

pub use aggregator::Aggregator;
pub use definition::*;
pub use engine::{aggregate_rows, GroupEngine};
pub use error::{EngineError, FieldRole, SpecError};
pub use view::{ResultTable, RunStats};
