//! Analysis thresholds.
//!
//! Every cutoff the analyzers apply is a named constant here and a field
//! of [`AnalysisConfig`].

/// Gap above which a pair of IP packets counts as broker processing time.
pub const BROKER_PROCESSING_THRESHOLD_SECS: f64 = 0.1;

/// Gap below which a pair of TCP packets counts as a bundled transmission.
pub const BUNDLING_THRESHOLD_SECS: f64 = 0.001;

/// MQTT payloads strictly below this many bytes are device control/telemetry.
pub const SMALL_PAYLOAD_MAX: usize = 100;

/// MQTT payloads strictly above this many bytes are broker-aggregated bundles.
pub const BUNDLE_PAYLOAD_MIN: usize = 1000;

/// MQTT payloads strictly above this many bytes may be cloud uploads.
pub const UPLOAD_PAYLOAD_MIN: usize = 5000;

/// A flow with more than this many earlier payload-bearing packets is sustained.
pub const SUSTAINED_FLOW_MIN_PACKETS: u64 = 5;

/// Sequence gaps of this many bytes or more are treated as reordering or
/// sequence resets, never as loss.
pub const MAX_LOSS_GAP_BYTES: u32 = 10_000;

/// Number of entries kept in the top source/destination tables.
pub const TOP_N: usize = 10;

/// Number of retransmission events listed in the report.
pub const MAX_REPORTED_RETRANSMISSIONS: usize = 10;

/// TCP ports carrying MQTT (plain and TLS).
pub const MQTT_PORTS: [u16; 2] = [1883, 8883];

/// Thresholds for one analysis run.
#[derive(Debug, Clone, PartialEq)]
pub struct AnalysisConfig {
    pub broker_processing_threshold_secs: f64,
    pub bundling_threshold_secs: f64,
    pub small_payload_max: usize,
    pub bundle_payload_min: usize,
    pub upload_payload_min: usize,
    pub sustained_flow_min_packets: u64,
    pub max_loss_gap_bytes: u32,
    pub top_n: usize,
    pub max_reported_retransmissions: usize,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            broker_processing_threshold_secs: BROKER_PROCESSING_THRESHOLD_SECS,
            bundling_threshold_secs: BUNDLING_THRESHOLD_SECS,
            small_payload_max: SMALL_PAYLOAD_MAX,
            bundle_payload_min: BUNDLE_PAYLOAD_MIN,
            upload_payload_min: UPLOAD_PAYLOAD_MIN,
            sustained_flow_min_packets: SUSTAINED_FLOW_MIN_PACKETS,
            max_loss_gap_bytes: MAX_LOSS_GAP_BYTES,
            top_n: TOP_N,
            max_reported_retransmissions: MAX_REPORTED_RETRANSMISSIONS,
        }
    }
}

impl AnalysisConfig {
    /// Override the size of the top source/destination tables.
    pub fn with_top_n(mut self, top_n: usize) -> Self {
        self.top_n = top_n;
        self
    }
}
