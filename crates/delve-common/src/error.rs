//! Error types for spatial values.

use std::num::ParseIntError;
use thiserror::Error;

/// Failure to parse a region from its `mapid/x/y/z/ex/ey/ez` text form.
#[derive(Debug, Error)]
pub enum ParseRegionError {
    /// Wrong number of `/`-separated fields
    #[error("expected 7 fields, found {0}")]
    FieldCount(usize),

    /// A field is not an integer
    #[error("field {field} is not a valid integer: {source}")]
    InvalidNumber {
        /// Zero-based field position
        field: usize,
        /// Underlying parse failure
        #[source]
        source: ParseIntError,
    },

    /// End corner lies before the start corner
    #[error("region end precedes start")]
    Inverted,
}
