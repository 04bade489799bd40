//! pcaptel - network performance telemetry from packet captures.
//!
//! This library reads PCAP/PCAPNG files, decodes each frame into a
//! [`PacketRecord`](pcaptel_core::PacketRecord) and hands the records to
//! the `pcaptel-core` engine, which computes protocol mix, latency, jitter,
//! TCP loss and retransmissions, and MQTT/IoT patterns.
//!
//! # Example
//!
//! ```no_run
//! use pcaptel::Capture;
//! use pcaptel_core::PacketAnalyzer;
//!
//! fn main() -> anyhow::Result<()> {
//!     let capture = Capture::load("capture.pcap")?;
//!     let report = capture.analyze(&PacketAnalyzer::default())?;
//!     println!("{} packets", report.overview.total_packets);
//!     Ok(())
//! }
//! ```

pub mod capture;
pub mod cli;
pub mod decode;
pub mod error;
pub mod pcap;

pub use capture::Capture;
pub use error::{Error, Result};
