//! Inter-packet delay, jitter and delay categorization.
//!
//! "Latency" here is the arrival spacing between consecutive packets of the
//! capture, attributed to the earlier packet's protocol. Unrelated flows
//! interleave in that spacing; it is not a round-trip measurement.

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::net::IpAddr;

use serde::Serialize;

use crate::classify::Protocol;
use crate::config::AnalysisConfig;
use crate::packet::PacketRecord;
use crate::report::CategoryStats;
use crate::stats::{mean, Summary};

/// Named delay bucket.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum DelayCategory {
    Bundling,
    BrokerProcessing,
    DeviceToBroker,
    BrokerAggregation,
    CloudUpload,
}

impl DelayCategory {
    pub const ALL: [DelayCategory; 5] = [
        DelayCategory::Bundling,
        DelayCategory::BrokerProcessing,
        DelayCategory::DeviceToBroker,
        DelayCategory::BrokerAggregation,
        DelayCategory::CloudUpload,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            DelayCategory::Bundling => "bundling_delays",
            DelayCategory::BrokerProcessing => "broker_processing_delays",
            DelayCategory::DeviceToBroker => "device_to_broker_delays",
            DelayCategory::BrokerAggregation => "broker_aggregation_delays",
            DelayCategory::CloudUpload => "cloud_upload_delays",
        }
    }
}

impl fmt::Display for DelayCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One delay sample. `delay_ms` is never negative.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DelayRecord {
    pub timestamp: f64,
    pub delay_ms: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub src: Option<IpAddr>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dst: Option<IpAddr>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub size: Option<usize>,
}

impl DelayRecord {
    pub fn new(timestamp: f64, delay_ms: f64) -> Self {
        Self {
            timestamp,
            delay_ms: delay_ms.max(0.0),
            src: None,
            dst: None,
            size: None,
        }
    }

    pub fn between(mut self, src: IpAddr, dst: IpAddr) -> Self {
        self.src = Some(src);
        self.dst = Some(dst);
        self
    }

    pub fn with_size(mut self, size: usize) -> Self {
        self.size = Some(size);
        self
    }
}

/// Append-only delay buckets for one run.
#[derive(Debug, Default)]
pub struct DelayBuckets {
    buckets: HashMap<DelayCategory, Vec<DelayRecord>>,
}

impl DelayBuckets {
    pub fn push(&mut self, category: DelayCategory, record: DelayRecord) {
        self.buckets.entry(category).or_default().push(record);
    }

    pub fn get(&self, category: DelayCategory) -> &[DelayRecord] {
        self.buckets.get(&category).map(Vec::as_slice).unwrap_or(&[])
    }

    /// `{avg, max, count}` for every category, empty ones included.
    pub fn stats(&self) -> BTreeMap<String, CategoryStats> {
        DelayCategory::ALL
            .iter()
            .map(|category| {
                let delays: Vec<f64> = self.get(*category).iter().map(|r| r.delay_ms).collect();
                let stats = CategoryStats {
                    avg: mean(&delays),
                    max: delays.iter().copied().fold(0.0, f64::max),
                    count: delays.len(),
                };
                (category.as_str().to_string(), stats)
            })
            .collect()
    }
}

/// Per-protocol latency, jitter and delay categorization.
#[derive(Debug)]
pub struct DelayAnalyzer {
    broker_processing_threshold_secs: f64,
    bundling_threshold_secs: f64,
    latencies: HashMap<Protocol, Vec<f64>>,
    jitter: HashMap<Protocol, Vec<f64>>,
    packet_sizes: HashMap<Protocol, Vec<usize>>,
    buckets: DelayBuckets,
}

impl DelayAnalyzer {
    pub fn new(config: &AnalysisConfig) -> Self {
        Self {
            broker_processing_threshold_secs: config.broker_processing_threshold_secs,
            bundling_threshold_secs: config.bundling_threshold_secs,
            latencies: HashMap::new(),
            jitter: HashMap::new(),
            packet_sizes: HashMap::new(),
            buckets: DelayBuckets::default(),
        }
    }

    /// Record the spacing between two consecutive packets.
    ///
    /// Returns the delay in milliseconds, clamped to zero.
    pub fn observe_pair(
        &mut self,
        earlier: &PacketRecord,
        later: &PacketRecord,
        protocol: Protocol,
    ) -> f64 {
        let delay_sec = (later.timestamp - earlier.timestamp).max(0.0);
        let delay_ms = delay_sec * 1000.0;

        let latencies = self.latencies.entry(protocol).or_default();
        if let Some(previous) = latencies.last() {
            self.jitter
                .entry(protocol)
                .or_default()
                .push((delay_ms - previous).abs());
        }
        latencies.push(delay_ms);
        self.packet_sizes
            .entry(protocol)
            .or_default()
            .push(earlier.length);

        // Categories need IP on both sides; endpoints come from the earlier packet.
        if let Some(a) = earlier.ip.as_ref().filter(|_| later.has_ip()) {
            if delay_sec > self.broker_processing_threshold_secs {
                self.buckets.push(
                    DelayCategory::BrokerProcessing,
                    DelayRecord::new(earlier.timestamp, delay_ms).between(a.src, a.dst),
                );
            }
            if earlier.tcp().is_some()
                && later.tcp().is_some()
                && delay_sec < self.bundling_threshold_secs
            {
                self.buckets.push(
                    DelayCategory::Bundling,
                    DelayRecord::new(earlier.timestamp, delay_ms)
                        .between(a.src, a.dst)
                        .with_size(earlier.length),
                );
            }
        }

        delay_ms
    }

    pub fn latencies(&self, protocol: Protocol) -> &[f64] {
        self.latencies.get(&protocol).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn jitter(&self, protocol: Protocol) -> &[f64] {
        self.jitter.get(&protocol).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn buckets(&self) -> &DelayBuckets {
        &self.buckets
    }

    pub fn buckets_mut(&mut self) -> &mut DelayBuckets {
        &mut self.buckets
    }

    pub fn latency_summary(&self) -> BTreeMap<String, Summary> {
        summarize(&self.latencies)
    }

    /// Protocols with no second latency sample have no jitter entry.
    pub fn jitter_summary(&self) -> BTreeMap<String, Summary> {
        summarize(&self.jitter)
    }

    pub fn average_packet_size(&self) -> BTreeMap<String, f64> {
        self.packet_sizes
            .iter()
            .map(|(protocol, sizes)| {
                let sizes: Vec<f64> = sizes.iter().map(|&s| s as f64).collect();
                (protocol.as_str().to_string(), mean(&sizes))
            })
            .collect()
    }
}

fn summarize(samples: &HashMap<Protocol, Vec<f64>>) -> BTreeMap<String, Summary> {
    samples
        .iter()
        .filter(|(_, values)| !values.is_empty())
        .map(|(protocol, values)| (protocol.as_str().to_string(), Summary::of(values)))
        .collect()
}
