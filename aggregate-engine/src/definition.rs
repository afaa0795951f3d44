//! FILENAME: aggregate-engine/src/definition.rs
//! Aggregation Definition - what a run computes.
//!
//! `AggregationConfig` is the serializable, unresolved user intent (field
//! names or positions as typed). `AggregationSpec` is the resolved,
//! immutable form the engine consumes: plain field indices, one
//! `ValueField` per output aggregate, and their labels.

use std::collections::BTreeMap;

use log::debug;
use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};

use crate::aggregator::{
    Aggregator, Average, Concat, Count, First, Last, Max, MedianAbsDev, Median, Min, StdDev, Sum,
};
use crate::error::{FieldRole, SpecError};

/// Index into the fields of a row (0-based).
pub type FieldIndex = usize;

/// Header name to field index. Empty means positional references only.
pub type HeaderMap = FxHashMap<String, FieldIndex>;

// ============================================================================
// AGGREGATION
// ============================================================================

/// Supported aggregate functions.
///
/// Declaration order is significant: it is the order in which aggregate
/// columns are laid out when several functions are configured.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum AggregationType {
    Sum,
    Count,
    Min,
    Max,
    Average,
    First,
    Last,
    Concat,
    StdDev,
    Median,
    MedianAbsDev,
}

impl AggregationType {
    pub const ALL: [AggregationType; 11] = [
        AggregationType::Sum,
        AggregationType::Count,
        AggregationType::Min,
        AggregationType::Max,
        AggregationType::Average,
        AggregationType::First,
        AggregationType::Last,
        AggregationType::Concat,
        AggregationType::StdDev,
        AggregationType::Median,
        AggregationType::MedianAbsDev,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            AggregationType::Sum => "sum",
            AggregationType::Count => "count",
            AggregationType::Min => "min",
            AggregationType::Max => "max",
            AggregationType::Average => "average",
            AggregationType::First => "first",
            AggregationType::Last => "last",
            AggregationType::Concat => "concat",
            AggregationType::StdDev => "stddev",
            AggregationType::Median => "median",
            AggregationType::MedianAbsDev => "median absolute deviation",
        }
    }

    /// Suffix appended to the field reference to form the column label.
    pub fn suffix(&self) -> &'static str {
        match self {
            AggregationType::Sum => "-Sum",
            AggregationType::Count => "-Cnt",
            AggregationType::Min => "-Min",
            AggregationType::Max => "-Max",
            AggregationType::Average => "-Avg",
            AggregationType::First => "-Fst",
            AggregationType::Last => "-Lst",
            AggregationType::Concat => "-Cat",
            AggregationType::StdDev => "-Std",
            AggregationType::Median => "-Med",
            AggregationType::MedianAbsDev => "-MAD",
        }
    }

    /// Creates a fresh accumulator of this variant.
    pub fn create(&self, sub_delimiter: &[u8]) -> Box<dyn Aggregator> {
        match self {
            AggregationType::Sum => Box::new(Sum::default()),
            AggregationType::Count => Box::new(Count::default()),
            AggregationType::Min => Box::new(Min::default()),
            AggregationType::Max => Box::new(Max::default()),
            AggregationType::Average => Box::new(Average::default()),
            AggregationType::First => Box::new(First::default()),
            AggregationType::Last => Box::new(Last::default()),
            AggregationType::Concat => Box::new(Concat::new(sub_delimiter)),
            AggregationType::StdDev => Box::new(StdDev::default()),
            AggregationType::Median => Box::new(Median::default()),
            AggregationType::MedianAbsDev => Box::new(MedianAbsDev::default()),
        }
    }
}

// ============================================================================
// CONFIGURATION
// ============================================================================

fn default_sub_delimiter() -> String {
    "|".to_string()
}

/// Unresolved configuration, exactly as the user wrote it.
///
/// Every list is a comma-separated string of header names or 0-based field
/// positions. An empty string means "none".
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AggregationConfig {
    #[serde(default)]
    pub keys: String,

    #[serde(default)]
    pub pivots: String,

    /// Target fields per aggregate function.
    #[serde(default)]
    pub aggregates: BTreeMap<AggregationType, String>,

    /// Separator used by Concat and when joining multi-field pivot values.
    #[serde(default = "default_sub_delimiter")]
    pub sub_delimiter: String,
}

impl Default for AggregationConfig {
    fn default() -> Self {
        AggregationConfig {
            keys: String::new(),
            pivots: String::new(),
            aggregates: BTreeMap::new(),
            sub_delimiter: default_sub_delimiter(),
        }
    }
}

impl AggregationConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_keys(mut self, keys: &str) -> Self {
        self.keys = keys.to_string();
        self
    }

    pub fn with_pivots(mut self, pivots: &str) -> Self {
        self.pivots = pivots.to_string();
        self
    }

    /// Adds target fields for an aggregate, appending to any already listed.
    pub fn with_aggregate(mut self, aggregation: AggregationType, fields: &str) -> Self {
        if fields.is_empty() {
            return self;
        }
        let entry = self.aggregates.entry(aggregation).or_default();
        if !entry.is_empty() {
            entry.push(',');
        }
        entry.push_str(fields);
        self
    }

    pub fn with_sub_delimiter(mut self, sub_delimiter: &str) -> Self {
        self.sub_delimiter = sub_delimiter.to_string();
        self
    }
}

/// What to do with a row too short for the configured field indices.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum MalformedRowPolicy {
    /// Skip the row and count it in the run statistics.
    #[default]
    Skip,
    /// Stop processing with an error.
    Abort,
}

/// Engine and output behaviour that is independent of the field layout.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngineOptions {
    /// Emit a header row in the result table.
    #[serde(default = "default_true")]
    pub header: bool,

    /// Text for cells whose (key, pivot) combination never occurred.
    #[serde(default)]
    pub empty_cell_text: String,

    #[serde(default)]
    pub malformed_rows: MalformedRowPolicy,
}

fn default_true() -> bool {
    true
}

impl Default for EngineOptions {
    fn default() -> Self {
        EngineOptions {
            header: true,
            empty_cell_text: String::new(),
            malformed_rows: MalformedRowPolicy::Skip,
        }
    }
}

// ============================================================================
// RESOLVED SPECIFICATION
// ============================================================================

/// One output aggregate: a target field and the function applied to it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValueField {
    pub source_index: FieldIndex,
    pub aggregation: AggregationType,
    /// Field reference plus the aggregation suffix (e.g. "amount-Sum").
    pub label: String,
}

/// The resolved, immutable description of a run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AggregationSpec {
    keys: Vec<FieldIndex>,
    key_labels: Vec<String>,
    pivots: Vec<FieldIndex>,
    value_fields: Vec<ValueField>,
    sub_delimiter: Vec<u8>,
    required_fields: usize,
}

impl AggregationSpec {
    /// Resolves a configuration against the header names of the input.
    pub fn build(config: &AggregationConfig, headers: &HeaderMap) -> Result<Self, SpecError> {
        let mut keys = Vec::new();
        let mut key_labels = Vec::new();
        for token in split_tokens(&config.keys) {
            keys.push(resolve_field(token, headers, FieldRole::Key)?);
            key_labels.push(token.to_string());
        }

        let mut pivots = Vec::new();
        for token in split_tokens(&config.pivots) {
            pivots.push(resolve_field(token, headers, FieldRole::Pivot)?);
        }

        // BTreeMap iteration follows AggregationType declaration order.
        let mut value_fields = Vec::new();
        for (&aggregation, fields) in &config.aggregates {
            for token in split_tokens(fields) {
                let source_index = resolve_field(token, headers, FieldRole::Aggregate(aggregation))?;
                value_fields.push(ValueField {
                    source_index,
                    aggregation,
                    label: format!("{}{}", token, aggregation.suffix()),
                });
            }
        }

        let required_fields = keys
            .iter()
            .chain(pivots.iter())
            .chain(value_fields.iter().map(|vf| &vf.source_index))
            .max()
            .map_or(0, |&max| max + 1);

        debug!(
            "aggregation spec: keys={:?} pivots={:?} aggregates={} required_fields={}",
            keys,
            pivots,
            value_fields.len(),
            required_fields
        );

        Ok(AggregationSpec {
            keys,
            key_labels,
            pivots,
            value_fields,
            sub_delimiter: config.sub_delimiter.as_bytes().to_vec(),
            required_fields,
        })
    }

    pub fn keys(&self) -> &[FieldIndex] {
        &self.keys
    }

    pub fn key_labels(&self) -> &[String] {
        &self.key_labels
    }

    pub fn pivots(&self) -> &[FieldIndex] {
        &self.pivots
    }

    pub fn is_pivoting(&self) -> bool {
        !self.pivots.is_empty()
    }

    pub fn value_fields(&self) -> &[ValueField] {
        &self.value_fields
    }

    pub fn sub_delimiter(&self) -> &[u8] {
        &self.sub_delimiter
    }

    /// Minimum number of fields a row needs to be processed.
    pub fn required_fields(&self) -> usize {
        self.required_fields
    }

    /// Builds one fresh accumulator per value field, in output order.
    pub fn create_aggregators(&self) -> Vec<Box<dyn Aggregator>> {
        self.value_fields
            .iter()
            .map(|vf| vf.aggregation.create(&self.sub_delimiter))
            .collect()
    }
}

fn split_tokens(list: &str) -> impl Iterator<Item = &str> {
    // An empty list has no tokens, but "a,,b" keeps its empty middle token.
    let list = if list.is_empty() { None } else { Some(list) };
    list.into_iter().flat_map(|l| l.split(','))
}

/// Header names win over positions, so a column literally named "2" is
/// looked up by name first.
fn resolve_field(token: &str, headers: &HeaderMap, role: FieldRole) -> Result<FieldIndex, SpecError> {
    if let Some(&index) = headers.get(token) {
        return Ok(index);
    }
    // usize::MAX is refused so the required field count (max index + 1) fits.
    token
        .parse::<FieldIndex>()
        .ok()
        .filter(|&index| index < FieldIndex::MAX)
        .ok_or_else(|| SpecError::UnresolvedField {
            role,
            token: token.to_string(),
        })
}
