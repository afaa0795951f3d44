//! FILENAME: aggregate-cli/src/args.rs
//! Command-line flags and their translation into engine configuration.

use std::fs;
use std::path::PathBuf;

use aggregate_engine::{AggregationConfig, AggregationType, EngineOptions, MalformedRowPolicy};
use anyhow::{Context, Result};
use clap::Parser;

#[derive(Parser, Debug)]
#[command(
    name = "aggregate",
    about = "Group-by and pivot aggregation over delimited text.",
    long_about = "Reads delimited records, groups them by the key fields, optionally \
                  spreads them into pivot columns, and aggregates the value fields. \
                  Fields are referenced by header name or 0-based position, \
                  comma-separated."
)]
pub struct Args {
    /// Key fields.
    #[arg(short = 'k', long = "keys", default_value = "")]
    pub keys: String,

    /// Pivot fields.
    #[arg(short = 'p', long = "pivots", default_value = "")]
    pub pivots: String,

    /// Fields to sum.
    #[arg(short = 's', long = "sum", default_value = "")]
    pub sum: String,

    /// Fields to count.
    #[arg(short = 'c', long = "count", default_value = "")]
    pub count: String,

    /// Fields to take the minimum of.
    #[arg(short = 'n', long = "min", default_value = "")]
    pub min: String,

    /// Fields to take the maximum of.
    #[arg(short = 'x', long = "max", default_value = "")]
    pub max: String,

    /// Fields to average.
    #[arg(short = 'a', long = "average", default_value = "")]
    pub average: String,

    /// Fields to keep the first value of.
    #[arg(short = 'f', long = "first", default_value = "")]
    pub first: String,

    /// Fields to keep the last value of.
    #[arg(short = 'l', long = "last", default_value = "")]
    pub last: String,

    /// Fields to concatenate with the sub-delimiter.
    #[arg(short = 't', long = "concat", default_value = "")]
    pub concat: String,

    /// Fields to take the sample standard deviation of.
    #[arg(short = 'e', long = "stddev", default_value = "")]
    pub stddev: String,

    /// Fields to take the median of.
    #[arg(short = 'i', long = "median", default_value = "")]
    pub median: String,

    /// Fields to take the median absolute deviation of.
    #[arg(short = 'm', long = "mad", default_value = "")]
    pub mad: String,

    /// Field delimiter, for input and output.
    #[arg(short = 'd', long = "delimiter", default_value = ",")]
    pub delimiter: String,

    /// Sub-delimiter for concatenated values and multi-field pivot labels [default: |].
    #[arg(short = 'b', long = "sub-delimiter")]
    pub sub_delimiter: Option<String>,

    /// Input has no header row; reference fields by position only.
    #[arg(short = 'H', long = "no-header")]
    pub no_header: bool,

    /// JSON aggregation config. Flags given on the command line take precedence.
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Fail on rows too short for the referenced fields instead of skipping them.
    #[arg(long)]
    pub abort_on_malformed: bool,

    /// Text for pivot cells a group never saw.
    #[arg(long = "empty", default_value = "")]
    pub empty: String,

    /// Input file (stdin when omitted).
    pub input: Option<PathBuf>,
}

impl Args {
    /// Per-function field lists, in `AggregationType` order.
    fn aggregate_flags(&self) -> [(AggregationType, &str); 11] {
        [
            (AggregationType::Sum, self.sum.as_str()),
            (AggregationType::Count, self.count.as_str()),
            (AggregationType::Min, self.min.as_str()),
            (AggregationType::Max, self.max.as_str()),
            (AggregationType::Average, self.average.as_str()),
            (AggregationType::First, self.first.as_str()),
            (AggregationType::Last, self.last.as_str()),
            (AggregationType::Concat, self.concat.as_str()),
            (AggregationType::StdDev, self.stddev.as_str()),
            (AggregationType::Median, self.median.as_str()),
            (AggregationType::MedianAbsDev, self.mad.as_str()),
        ]
    }

    /// Loads the base config file (if any) and applies non-empty flags on top.
    pub fn aggregation_config(&self) -> Result<AggregationConfig> {
        let mut config = match &self.config {
            Some(path) => {
                let text = fs::read_to_string(path)
                    .with_context(|| format!("failed to read config {}", path.display()))?;
                serde_json::from_str::<AggregationConfig>(&text)
                    .with_context(|| format!("failed to parse config {}", path.display()))?
            }
            None => AggregationConfig::new(),
        };

        if !self.keys.is_empty() {
            config.keys = self.keys.clone();
        }
        if !self.pivots.is_empty() {
            config.pivots = self.pivots.clone();
        }
        for (aggregation, fields) in self.aggregate_flags() {
            if !fields.is_empty() {
                config.aggregates.insert(aggregation, fields.to_string());
            }
        }
        if let Some(sub_delimiter) = &self.sub_delimiter {
            config.sub_delimiter = sub_delimiter.clone();
        }

        Ok(config)
    }

    pub fn engine_options(&self) -> EngineOptions {
        EngineOptions {
            header: !self.no_header,
            empty_cell_text: self.empty.clone(),
            malformed_rows: if self.abort_on_malformed {
                MalformedRowPolicy::Abort
            } else {
                MalformedRowPolicy::Skip
            },
        }
    }
}
