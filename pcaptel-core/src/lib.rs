//! # pcaptel-core
//!
//! Network-performance telemetry from a decoded packet capture.
//!
//! The engine takes an ordered slice of [`PacketRecord`]s (produced by any
//! capture decoder) and computes protocol mix, inter-packet latency and
//! jitter, TCP retransmissions and sequence-gap loss, delay categories and
//! MQTT/IoT bundling patterns. It does no I/O.
//!
//! ## Quick Start
//!
//! ```rust
//! use std::net::{IpAddr, Ipv4Addr};
//! use pcaptel_core::prelude::*;
//!
//! let dev = IpAddr::V4(Ipv4Addr::new(10, 0, 0, 1));
//! let dns = IpAddr::V4(Ipv4Addr::new(10, 0, 0, 53));
//! let packets = vec![
//!     PacketRecord::new(0.000, 74).with_ip(dev, dns, 17).with_udp(40000, 53),
//!     PacketRecord::new(0.005, 90).with_ip(dns, dev, 17).with_udp(53, 40000),
//! ];
//!
//! let report = PacketAnalyzer::default().analyze(&packets).unwrap();
//! assert_eq!(report.overview.total_packets, 2);
//! assert_eq!(report.latency["DNS"].count, 1);
//! ```
//!
//! ## Architecture
//!
//! ```text
//! +---------------------------------------------------------------------+
//! |                        pcaptel-core                                 |
//! +---------------------------------------------------------------------+
//! |  packet/    - PacketRecord, IP/TCP/UDP layers, link tags            |
//! |  classify/  - port/type heuristics -> Protocol label                |
//! |  overview/  - capture-wide counters, top-N tables                   |
//! |  flow/      - per-flow sequence tracking, loss and retransmissions  |
//! |  delay/     - latency, jitter, delay categories                     |
//! |  iot/       - MQTT device/broker/cloud patterns                     |
//! |  loss/      - per-protocol loss percentages                         |
//! |  analyzer/  - PacketAnalyzer, one Run per call                      |
//! |  report/    - AnalysisReport output contract                        |
//! +---------------------------------------------------------------------+
//! ```

pub mod analyzer;
pub mod cancel;
pub mod classify;
pub mod config;
pub mod delay;
pub mod error;
pub mod flow;
pub mod iot;
pub mod loss;
pub mod overview;
pub mod packet;
pub mod prelude;
pub mod report;
pub mod stats;

pub use analyzer::PacketAnalyzer;
pub use cancel::CancelToken;
pub use classify::{classify, Protocol};
pub use config::AnalysisConfig;
pub use delay::{DelayAnalyzer, DelayBuckets, DelayCategory, DelayRecord};
pub use error::{Error, Result};
pub use flow::{FlowKey, FlowState, FlowTracker, LossEvent, RetransmissionEvent, SegmentOutcome};
pub use iot::{IotPatternDetector, MessageKind};
pub use overview::{OverviewAggregator, RankedCounter};
pub use packet::{IpLayer, LinkTag, LinkTags, PacketRecord, TcpFlags, TcpSegment, Transport, UdpDatagram};
pub use report::AnalysisReport;
pub use stats::Summary;

/// Library version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
