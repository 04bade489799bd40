//! Convenient re-exports for common usage.
//!
//! ```rust
//! use pcaptel_core::prelude::*;
//!
//! let report = PacketAnalyzer::new(AnalysisConfig::default()).analyze(&[]).unwrap();
//! assert_eq!(report.overview.total_packets, 0);
//! ```

// Input model
pub use crate::packet::{LinkTag, PacketRecord, TcpFlags, TcpSegment};

// Engine
pub use crate::analyzer::PacketAnalyzer;
pub use crate::cancel::CancelToken;
pub use crate::config::AnalysisConfig;

// Output
pub use crate::classify::Protocol;
pub use crate::report::AnalysisReport;

// Error types
pub use crate::error::{Error, Result};
