//! Error types for pcaptel.

use thiserror::Error;

/// Main error type for pcaptel operations.
#[derive(Error, Debug)]
pub enum Error {
    /// Error reading or parsing PCAP file
    #[error("PCAP error: {0}")]
    Pcap(#[from] PcapError),

    /// The analysis run failed as a whole
    #[error("Analysis error: {0}")]
    Analysis(#[from] pcaptel_core::Error),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors related to PCAP file reading.
#[derive(Error, Debug)]
pub enum PcapError {
    /// File not found
    #[error("File not found: {path}")]
    FileNotFound { path: String },

    /// Invalid PCAP format
    #[error("Invalid PCAP format: {reason}")]
    InvalidFormat { reason: String },
}

/// Result type alias using our Error type.
pub type Result<T> = std::result::Result<T, Error>;
