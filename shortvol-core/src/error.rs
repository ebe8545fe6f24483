//! Per-date failure type for the fetch → parse stage.

use crate::feed::FetchError;
use crate::records::RecordParseError;
use thiserror::Error;

/// Why one date produced no records.
///
/// Failures are isolated per date: a bad date never aborts the rest of a
/// range. The reporting layer decides whether partial failure is fatal.
#[derive(Debug, Error)]
pub enum DayError {
    #[error(transparent)]
    Fetch(#[from] FetchError),

    #[error("malformed feed file: {0}")]
    Parse(#[from] RecordParseError),
}

impl DayError {
    /// Non-trading days and unpublished files.
    pub fn is_skippable(&self) -> bool {
        match self {
            DayError::Fetch(e) => e.is_skippable(),
            DayError::Parse(_) => false,
        }
    }
}
