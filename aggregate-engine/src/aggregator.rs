//! FILENAME: aggregate-engine/src/aggregator.rs
//! Aggregators - the stateful accumulators behind every output cell.
//!
//! Each variant is a small closed unit of state driven through the
//! `Aggregator` trait, so the engine can hold an open-ended, heterogeneous
//! array of them per group without knowing their internals.
//!
//! Numeric variants decode the raw bytes as UTF-8, trim ASCII whitespace and
//! parse an `f64`. A value that fails to parse is dropped and counted in
//! `rejected()`; it never touches the running state.

use std::fmt::Debug;

/// The update/render capability set shared by all aggregate variants.
pub trait Aggregator: Debug {
    /// Ingests one field's raw value. Never fails.
    fn update(&mut self, value: &[u8]);

    /// Renders the current result as text.
    fn render(&self) -> String;

    /// Number of values dropped because they were not numeric.
    fn rejected(&self) -> u64 {
        0
    }
}

/// Parses a raw field as a float. `None` for anything non-numeric.
pub fn parse_number(value: &[u8]) -> Option<f64> {
    std::str::from_utf8(value).ok()?.trim().parse::<f64>().ok()
}

/// Formats a float using the shortest representation that round-trips.
///
/// Magnitudes below 1e-4 or from 1e21 up switch to exponent form with a
/// signed, at least two-digit exponent (`1e+300`, `1.5e-07`).
pub fn format_number(value: f64) -> String {
    if value == 0.0 || !value.is_finite() {
        return format!("{}", value);
    }
    let scientific = format!("{:e}", value);
    let Some((mantissa, exponent)) = scientific.split_once('e') else {
        return format!("{}", value);
    };
    let exponent: i32 = match exponent.parse() {
        Ok(exponent) => exponent,
        Err(_) => return format!("{}", value),
    };
    if (-4..21).contains(&exponent) {
        format!("{}", value)
    } else {
        let sign = if exponent < 0 { '-' } else { '+' };
        format!("{}e{}{:02}", mantissa, sign, exponent.abs())
    }
}

// ============================================================================
// SUM / COUNT
// ============================================================================

#[derive(Debug, Clone, Default)]
pub struct Sum {
    total: f64,
    rejected: u64,
}

impl Aggregator for Sum {
    fn update(&mut self, value: &[u8]) {
        match parse_number(value) {
            Some(n) => self.total += n,
            None => self.rejected += 1,
        }
    }

    fn render(&self) -> String {
        format_number(self.total)
    }

    fn rejected(&self) -> u64 {
        self.rejected
    }
}

/// Counts updates; the value itself is ignored.
#[derive(Debug, Clone, Default)]
pub struct Count {
    count: u64,
}

impl Aggregator for Count {
    fn update(&mut self, _value: &[u8]) {
        self.count += 1;
    }

    fn render(&self) -> String {
        self.count.to_string()
    }
}

// ============================================================================
// MIN / MAX
// ============================================================================

/// Smallest valid number seen. Renders empty until one arrives.
#[derive(Debug, Clone, Default)]
pub struct Min {
    current: Option<f64>,
    rejected: u64,
}

impl Aggregator for Min {
    fn update(&mut self, value: &[u8]) {
        match parse_number(value) {
            Some(n) => self.current = Some(self.current.map_or(n, |m| m.min(n))),
            None => self.rejected += 1,
        }
    }

    fn render(&self) -> String {
        self.current.map(format_number).unwrap_or_default()
    }

    fn rejected(&self) -> u64 {
        self.rejected
    }
}

/// Largest valid number seen. Renders empty until one arrives.
#[derive(Debug, Clone, Default)]
pub struct Max {
    current: Option<f64>,
    rejected: u64,
}

impl Aggregator for Max {
    fn update(&mut self, value: &[u8]) {
        match parse_number(value) {
            Some(n) => self.current = Some(self.current.map_or(n, |m| m.max(n))),
            None => self.rejected += 1,
        }
    }

    fn render(&self) -> String {
        self.current.map(format_number).unwrap_or_default()
    }

    fn rejected(&self) -> u64 {
        self.rejected
    }
}

// ============================================================================
// AVERAGE / STDDEV
// ============================================================================

#[derive(Debug, Clone, Default)]
pub struct Average {
    sum: f64,
    count: u64,
    rejected: u64,
}

impl Aggregator for Average {
    fn update(&mut self, value: &[u8]) {
        match parse_number(value) {
            Some(n) => {
                self.sum += n;
                self.count += 1;
            }
            None => self.rejected += 1,
        }
    }

    fn render(&self) -> String {
        if self.count > 0 {
            format_number(self.sum / self.count as f64)
        } else {
            "0".to_string()
        }
    }

    fn rejected(&self) -> u64 {
        self.rejected
    }
}

/// Sample standard deviation (n - 1 denominator).
/// Using Welford's algorithm for numerical stability.
#[derive(Debug, Clone, Default)]
pub struct StdDev {
    count: u64,
    mean: f64,
    m2: f64,
    rejected: u64,
}

impl Aggregator for StdDev {
    fn update(&mut self, value: &[u8]) {
        let Some(n) = parse_number(value) else {
            self.rejected += 1;
            return;
        };
        self.count += 1;
        let delta = n - self.mean;
        self.mean += delta / self.count as f64;
        self.m2 += delta * (n - self.mean);
    }

    fn render(&self) -> String {
        if self.count > 1 {
            format_number((self.m2 / (self.count - 1) as f64).sqrt())
        } else {
            "0".to_string()
        }
    }

    fn rejected(&self) -> u64 {
        self.rejected
    }
}

// ============================================================================
// FIRST / LAST / CONCAT
// ============================================================================

/// Keeps the very first value, including an empty one.
#[derive(Debug, Clone, Default)]
pub struct First {
    value: Option<Vec<u8>>,
}

impl Aggregator for First {
    fn update(&mut self, value: &[u8]) {
        if self.value.is_none() {
            self.value = Some(value.to_vec());
        }
    }

    fn render(&self) -> String {
        self.value
            .as_deref()
            .map(|v| String::from_utf8_lossy(v).into_owned())
            .unwrap_or_default()
    }
}

#[derive(Debug, Clone, Default)]
pub struct Last {
    value: Vec<u8>,
}

impl Aggregator for Last {
    fn update(&mut self, value: &[u8]) {
        self.value.clear();
        self.value.extend_from_slice(value);
    }

    fn render(&self) -> String {
        String::from_utf8_lossy(&self.value).into_owned()
    }
}

/// Joins every value with the sub-delimiter, in arrival order.
#[derive(Debug, Clone)]
pub struct Concat {
    buffer: Vec<u8>,
    delimiter: Vec<u8>,
}

impl Concat {
    pub fn new(delimiter: &[u8]) -> Self {
        Concat {
            buffer: Vec::new(),
            delimiter: delimiter.to_vec(),
        }
    }
}

impl Aggregator for Concat {
    fn update(&mut self, value: &[u8]) {
        if !self.buffer.is_empty() {
            self.buffer.extend_from_slice(&self.delimiter);
        }
        self.buffer.extend_from_slice(value);
    }

    fn render(&self) -> String {
        String::from_utf8_lossy(&self.buffer).into_owned()
    }
}

// ============================================================================
// MEDIAN / MEDIAN ABSOLUTE DEVIATION
// ============================================================================

/// Median of a sample. Callers must pass a non-empty slice.
fn median_of(samples: &[f64]) -> f64 {
    let mut sorted = samples.to_vec();
    sorted.sort_by(f64::total_cmp);
    let len = sorted.len();
    if len % 2 == 0 {
        (sorted[len / 2 - 1] + sorted[len / 2]) / 2.0
    } else {
        sorted[len / 2]
    }
}

#[derive(Debug, Clone, Default)]
pub struct Median {
    samples: Vec<f64>,
    rejected: u64,
}

impl Aggregator for Median {
    fn update(&mut self, value: &[u8]) {
        match parse_number(value) {
            Some(n) => self.samples.push(n),
            None => self.rejected += 1,
        }
    }

    fn render(&self) -> String {
        if self.samples.is_empty() {
            return "0".to_string();
        }
        format_number(median_of(&self.samples))
    }

    fn rejected(&self) -> u64 {
        self.rejected
    }
}

/// Median of the absolute deviations from the sample median.
#[derive(Debug, Clone, Default)]
pub struct MedianAbsDev {
    samples: Vec<f64>,
    rejected: u64,
}

impl Aggregator for MedianAbsDev {
    fn update(&mut self, value: &[u8]) {
        match parse_number(value) {
            Some(n) => self.samples.push(n),
            None => self.rejected += 1,
        }
    }

    fn render(&self) -> String {
        if self.samples.is_empty() {
            return "0".to_string();
        }
        let center = median_of(&self.samples);
        let deviations: Vec<f64> = self.samples.iter().map(|v| (v - center).abs()).collect();
        format_number(median_of(&deviations))
    }

    fn rejected(&self) -> u64 {
        self.rejected
    }
}
