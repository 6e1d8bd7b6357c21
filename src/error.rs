//! Error type shared by the raw table loaders and the source readers.

use chrono::NaiveDateTime;
use chrono_tz::Tz;
use std::path::PathBuf;
use thiserror::Error;

/// Failure of a single reader invocation.
///
/// Any of these aborts the read of one file; the aggregator logs it and moves
/// on to the next container.
#[derive(Debug, Error)]
pub enum ReadError {
    /// The file could not be opened or read.
    #[error("failed to read {path}: {error}")]
    Io {
        path: PathBuf,
        #[source]
        error: std::io::Error,
    },

    /// The delimited-text parser rejected the input.
    #[error("csv error: {0}")]
    Csv(#[from] csv::Error),

    /// The spreadsheet could not be opened or a sheet could not be read.
    #[error("workbook error: {0}")]
    Workbook(#[from] calamine::Error),

    /// Header row, column count or sheet structure differ from the provider's layout.
    #[error("unexpected layout: {0}")]
    Layout(String),

    /// A cell that must hold a number holds something else.
    #[error("invalid value {value:?} at row {row}, column {column}")]
    Value {
        row: usize,
        column: usize,
        value: String,
    },

    /// A date or time field could not be parsed.
    #[error("invalid timestamp {0:?}")]
    Timestamp(String),

    /// The local time falls into a spring-forward gap.
    #[error("local time {local} does not exist in {tz}")]
    Nonexistent { local: NaiveDateTime, tz: Tz },

    /// The local time appears more often than the repeated hour allows.
    #[error("local time {local} occurs more than twice in {tz}")]
    Ambiguous { local: NaiveDateTime, tz: Tz },

    /// The variable name is not one this provider publishes.
    #[error("unsupported variable {variable:?} for {provider}")]
    Variable {
        provider: &'static str,
        variable: String,
    },
}
