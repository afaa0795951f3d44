//! FILENAME: aggregate-engine/src/error.rs

use std::fmt;

use thiserror::Error;

use crate::definition::AggregationType;

/// Which part of the configuration a field reference came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldRole {
    Key,
    Pivot,
    Aggregate(AggregationType),
}

impl fmt::Display for FieldRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldRole::Key => write!(f, "key"),
            FieldRole::Pivot => write!(f, "pivot"),
            FieldRole::Aggregate(aggregation) => write!(f, "{} aggregate", aggregation.name()),
        }
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SpecError {
    #[error("Invalid {role} field: {token:?} is neither a header name nor a field index")]
    UnresolvedField { role: FieldRole, token: String },
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EngineError {
    #[error("Malformed row {row}: expected at least {required} fields, found {found}")]
    MalformedRow {
        row: u64,
        required: usize,
        found: usize,
    },
}
