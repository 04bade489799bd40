//! Error types for pcaptel-core.
//!
//! Per-packet anomalies (missing layers, timestamp regressions, sequence
//! gaps outside the loss window) are absorbed by the analyzers and never
//! show up here. Only run-level failures do:
//!
//! - [`Error::InvalidRecord`] - the packet sequence itself is unusable
//! - [`Error::Cancelled`] / [`Error::DeadlineExceeded`] - the caller stopped the run

use thiserror::Error;

/// Main error type for pcaptel-core operations.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum Error {
    /// A packet record cannot take part in ordered analysis
    #[error("Invalid packet record at index {index}: {reason}")]
    InvalidRecord { index: usize, reason: String },

    /// The run was cancelled through its [`CancelToken`](crate::CancelToken)
    #[error("Analysis cancelled after {processed} packet pairs")]
    Cancelled { processed: usize },

    /// The run outlived the deadline attached to its token
    #[error("Analysis deadline exceeded after {processed} packet pairs")]
    DeadlineExceeded { processed: usize },
}

/// Result type alias using our Error type.
pub type Result<T> = std::result::Result<T, Error>;
