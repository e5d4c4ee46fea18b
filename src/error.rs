//! Typed error taxonomy for the import pipeline.
//!
//! Preview-stage errors ([`ImportError::UnsupportedFormat`],
//! [`ImportError::SizeLimitExceeded`], [`ImportError::Decode`]) abort before
//! anything is written. Mapping errors abort a commit before the first batch.
//! [`ImportError::RowTransform`] is per-row and recovered locally; only
//! [`ImportError::StoreUnavailable`] aborts remaining batches mid-commit.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ImportError {
    #[error("unsupported file format for '{name}': expected .csv, .tsv, .xls, or .xlsx")]
    UnsupportedFormat { name: String },

    #[error("file size {size} bytes exceeds the {limit} byte import ceiling")]
    SizeLimitExceeded { size: u64, limit: u64 },

    #[error("could not decode tabular data: {reason}")]
    Decode { reason: String },

    #[error("headers {headers:?} all map to '{target}'; each field accepts one column")]
    AmbiguousMapping {
        target: String,
        headers: Vec<String>,
    },

    #[error("no identity field (fullName, email, or phoneNumber) is mapped")]
    NoIdentityFieldMapped,

    #[error("row {row}: {reason}")]
    RowTransform { row: usize, reason: String },

    #[error("dataset store unavailable: {reason}")]
    StoreUnavailable { reason: String },
}

impl ImportError {
    pub fn decode(reason: impl Into<String>) -> Self {
        ImportError::Decode {
            reason: reason.into(),
        }
    }

    pub fn store(reason: impl Into<String>) -> Self {
        ImportError::StoreUnavailable {
            reason: reason.into(),
        }
    }
}
