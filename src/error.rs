//! Unified error type.

use thiserror::Error;

/// The error type returned by stackware's fallible operations.
///
/// Enablement never fails — a policy that cannot decide returns
/// [`Decision::Disabled`](crate::Decision::Disabled). What can fail is
/// persistence: creating the output directory, opening or writing the dump
/// file, encoding the profile, or a custom saviour rejecting the results.
/// All of those propagate to the caller untouched; stackware performs no
/// local recovery.
#[derive(Debug, Error)]
pub enum Error {
    /// Directory creation or dump file open/write failed.
    #[error("i/o: {0}")]
    Io(#[from] std::io::Error),

    /// The collected profile could not be encoded into the dump file.
    #[error("profile encoding: {0}")]
    Encode(#[from] serde_json::Error),

    /// A custom saviour refused the results.
    #[error("saviour: {0}")]
    Saviour(#[source] Box<dyn std::error::Error + Send + Sync>),
}

impl Error {
    /// Wraps an arbitrary failure produced by a custom saviour.
    pub fn saviour(err: impl Into<Box<dyn std::error::Error + Send + Sync>>) -> Self {
        Self::Saviour(err.into())
    }
}
