//! One analysis run over a decoded capture.
//!
//! The run makes two passes. The first classifies every packet and fills
//! the capture overview. The second walks consecutive packet pairs in
//! capture order and feeds the delay analyzer, the IoT pattern detector and
//! the flow tracker, which share the pair's protocol label, delay and flow
//! key. Loss percentages are summarized from the flow tracker at the end.
//!
//! All accumulators live in a [`Run`] created per call, so a
//! [`PacketAnalyzer`] can be shared between threads and reused without one
//! run leaking into the next.

use std::collections::BTreeMap;

use tracing::debug;

use crate::cancel::CancelToken;
use crate::classify::{classify, Protocol};
use crate::config::AnalysisConfig;
use crate::delay::DelayAnalyzer;
use crate::error::{Error, Result};
use crate::flow::FlowTracker;
use crate::iot::IotPatternDetector;
use crate::loss;
use crate::overview::OverviewAggregator;
use crate::packet::PacketRecord;
use crate::report::{AnalysisReport, RetransmissionReport, Throughput};
use crate::stats::rate;

/// Entry point of the engine.
#[derive(Debug, Clone, Default)]
pub struct PacketAnalyzer {
    config: AnalysisConfig,
    cancel: CancelToken,
}

impl PacketAnalyzer {
    pub fn new(config: AnalysisConfig) -> Self {
        Self {
            config,
            cancel: CancelToken::new(),
        }
    }

    /// Check `token` between packet pairs and stop the run when it trips.
    pub fn with_cancel_token(mut self, token: CancelToken) -> Self {
        self.cancel = token;
        self
    }

    pub fn config(&self) -> &AnalysisConfig {
        &self.config
    }

    /// Analyze packets in capture order.
    ///
    /// Fails only for records that cannot be ordered in time (non-finite
    /// timestamps) or when the cancel token trips. Per-packet anomalies are
    /// absorbed.
    pub fn analyze(&self, packets: &[PacketRecord]) -> Result<AnalysisReport> {
        validate(packets)?;

        let mut run = Run::new(&self.config);
        let labels = run.overview_pass(packets);
        run.pair_pass(packets, &labels, &self.cancel)?;
        Ok(run.finish(&self.config))
    }
}

fn validate(packets: &[PacketRecord]) -> Result<()> {
    match packets.iter().position(|p| !p.timestamp.is_finite()) {
        Some(index) => Err(Error::InvalidRecord {
            index,
            reason: format!("non-finite timestamp {}", packets[index].timestamp),
        }),
        None => Ok(()),
    }
}

/// Accumulators owned by a single run.
struct Run {
    overview: OverviewAggregator,
    delays: DelayAnalyzer,
    flows: FlowTracker,
    iot: IotPatternDetector,
}

impl Run {
    fn new(config: &AnalysisConfig) -> Self {
        Self {
            overview: OverviewAggregator::new(config.top_n),
            delays: DelayAnalyzer::new(config),
            flows: FlowTracker::with_max_loss_gap(config.max_loss_gap_bytes),
            iot: IotPatternDetector::new(config),
        }
    }

    fn overview_pass(&mut self, packets: &[PacketRecord]) -> Vec<Protocol> {
        packets
            .iter()
            .map(|packet| {
                self.overview.observe(packet);
                classify(packet)
            })
            .collect()
    }

    fn pair_pass(
        &mut self,
        packets: &[PacketRecord],
        labels: &[Protocol],
        cancel: &CancelToken,
    ) -> Result<()> {
        for (i, pair) in packets.windows(2).enumerate() {
            cancel.check(i)?;

            let (earlier, later) = (&pair[0], &pair[1]);
            let protocol = labels[i];
            let delay_ms = self.delays.observe_pair(earlier, later, protocol);

            if earlier.has_ip() && later.has_ip() {
                let flow_packets = earlier
                    .flow_key()
                    .map(|flow| self.flows.payload_packets(&flow))
                    .unwrap_or(0);
                self.iot.observe_pair(
                    earlier,
                    later,
                    delay_ms,
                    flow_packets,
                    self.delays.buckets_mut(),
                );
            }

            self.flows.observe(earlier, protocol);
        }

        // The final packet has no successor but still moves its flow
        if let (Some(last), Some(&protocol)) = (packets.last(), labels.last()) {
            self.flows.observe(last, protocol);
        }

        debug!(
            flows = self.flows.flow_count(),
            loss_events = self.flows.loss_events().len(),
            retransmissions = self.flows.retransmissions().len(),
            "pair pass complete"
        );
        Ok(())
    }

    fn finish(self, config: &AnalysisConfig) -> AnalysisReport {
        let overview = self.overview.finish();
        let duration = overview.duration_seconds;

        let protocol_rates: BTreeMap<String, f64> = self
            .overview
            .protocols()
            .into_iter()
            .map(|(protocol, count)| (protocol.as_str().to_string(), rate(count as f64, duration)))
            .collect();
        let throughput = Throughput {
            packets_per_second: rate(overview.total_packets as f64, duration),
            bandwidth_mbps: rate(overview.total_bytes as f64 * 8.0 / 1_000_000.0, duration),
            protocol_rates,
        };

        let retransmissions = self.flows.retransmissions();
        let retransmissions = RetransmissionReport {
            total: retransmissions.len(),
            events: retransmissions
                .iter()
                .take(config.max_reported_retransmissions)
                .cloned()
                .collect(),
        };

        AnalysisReport {
            latency: self.delays.latency_summary(),
            jitter: self.delays.jitter_summary(),
            protocol_packet_size: self.delays.average_packet_size(),
            delay_categories: self.delays.buckets().stats(),
            retransmissions,
            packet_loss: loss::summarize(&self.flows),
            iot_metrics: self.iot.finish(),
            throughput,
            overview,
        }
    }
}
