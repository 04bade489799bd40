//! Structured analysis report.
//!
//! This is the output contract handed to rendering layers. Every numeric
//! field is finite: empty inputs produce zeros, never NaN or a division
//! fault. Sections computed by optional sub-analyses are `Option`s and are
//! left out of serialized output when absent.

use std::collections::BTreeMap;

use serde::Serialize;

use crate::flow::{LossEvent, RetransmissionEvent};
use crate::stats::Summary;

/// A labelled count with its share of all packets.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CountShare {
    pub label: String,
    pub count: u64,
    pub percentage: f64,
}

/// One row of a top-N table.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RankedEntry<K> {
    pub key: K,
    pub count: u64,
    pub percentage: f64,
}

/// Top-N source and destination tables.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TopTalkers<K> {
    pub sources: Vec<RankedEntry<K>>,
    pub destinations: Vec<RankedEntry<K>>,
}

impl<K> Default for TopTalkers<K> {
    fn default() -> Self {
        Self {
            sources: Vec::new(),
            destinations: Vec::new(),
        }
    }
}

/// First and last capture timestamps, in seconds.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct TimeRange {
    pub start: f64,
    pub end: f64,
}

/// Packet size statistics, in bytes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct PacketSizeStats {
    pub avg: f64,
    pub min: usize,
    pub max: usize,
}

/// Capture-wide counters.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct CaptureOverview {
    pub total_packets: u64,
    pub total_bytes: u64,
    pub protocol_distribution: Vec<CountShare>,
    pub packet_type_counts: Vec<CountShare>,
    pub time_range: TimeRange,
    pub duration_seconds: f64,
    pub packet_size: PacketSizeStats,
    pub ip_stats: TopTalkers<String>,
    pub port_stats: TopTalkers<u16>,
}

/// Summary of one delay category, in milliseconds.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct CategoryStats {
    pub avg: f64,
    pub max: f64,
    pub count: usize,
}

/// Retransmissions seen during the run.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct RetransmissionReport {
    pub total: usize,
    /// The earliest events, in capture order.
    pub events: Vec<RetransmissionEvent>,
}

/// Capture-wide loss totals.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct OverallLoss {
    pub lost: u64,
    pub transmitted: u64,
    pub loss_percentage: f64,
    pub loss_events: usize,
}

/// Loss totals for one protocol.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct ProtocolLoss {
    pub lost: u64,
    pub transmitted: u64,
    pub loss_percentage: f64,
}

/// Packet loss section.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct PacketLossReport {
    pub overall: OverallLoss,
    pub per_protocol: BTreeMap<String, ProtocolLoss>,
    pub events: Vec<LossEvent>,
}

/// Small versus bundled MQTT messages sent by one device.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct DeviceMix {
    pub small: usize,
    pub bundle: usize,
    pub total: usize,
}

/// Sustained large MQTT transfers.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct UploadStats {
    pub count: usize,
    pub total_bytes: u64,
    pub delay_ms: Summary,
}

/// IoT (MQTT) traffic patterns.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct IotMetrics {
    /// Bundle payload sizes, in bytes.
    pub bundle_sizes: Summary,
    /// Time between consecutive bundles on the same flow, in seconds.
    pub aggregation_intervals: Summary,
    pub uploads: UploadStats,
    pub devices: BTreeMap<String, DeviceMix>,
}

/// Packet and bit rates over the capture duration.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Throughput {
    pub packets_per_second: f64,
    pub bandwidth_mbps: f64,
    pub protocol_rates: BTreeMap<String, f64>,
}

/// Complete result of one analysis run.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct AnalysisReport {
    #[serde(flatten)]
    pub overview: CaptureOverview,
    /// Inter-packet arrival spacing per protocol, in milliseconds.
    ///
    /// This is spacing between consecutive packets of the whole capture,
    /// attributed to the earlier packet's protocol. It is not a round trip
    /// or per-transaction latency.
    pub latency: BTreeMap<String, Summary>,
    pub jitter: BTreeMap<String, Summary>,
    /// Average packet size per protocol, in bytes.
    pub protocol_packet_size: BTreeMap<String, f64>,
    pub delay_categories: BTreeMap<String, CategoryStats>,
    pub retransmissions: RetransmissionReport,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub packet_loss: Option<PacketLossReport>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub iot_metrics: Option<IotMetrics>,
    pub throughput: Throughput,
}
