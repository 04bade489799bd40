//! Capture-wide counters gathered in one pass.
//!
//! Top-N tables are ordered by count, descending. Ties keep first-seen
//! order: an entry that appeared earlier in the capture ranks higher. This
//! is the canonical tie-break and keeps reports reproducible across runs.

use std::collections::HashMap;
use std::hash::Hash;

use crate::classify::{classify, Protocol};
use crate::packet::{LinkTag, PacketRecord};
use crate::report::{CaptureOverview, CountShare, PacketSizeStats, RankedEntry, TimeRange, TopTalkers};
use crate::stats::percentage;

/// Counter that remembers the order in which keys were first seen.
#[derive(Debug, Clone)]
pub struct RankedCounter<K> {
    index: HashMap<K, usize>,
    entries: Vec<(K, u64)>,
}

impl<K: Hash + Eq + Clone> RankedCounter<K> {
    pub fn new() -> Self {
        Self {
            index: HashMap::new(),
            entries: Vec::new(),
        }
    }

    /// Add one to `key`, starting from zero on first sight.
    pub fn increment(&mut self, key: K) {
        match self.index.get(&key) {
            Some(&slot) => self.entries[slot].1 += 1,
            None => {
                self.index.insert(key.clone(), self.entries.len());
                self.entries.push((key, 1));
            }
        }
    }

    pub fn get(&self, key: &K) -> u64 {
        self.index
            .get(key)
            .map(|&slot| self.entries[slot].1)
            .unwrap_or(0)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Entries by count descending, ties in first-seen order.
    pub fn ranked(&self) -> Vec<(K, u64)> {
        let mut ranked = self.entries.clone();
        // sort_by is stable, which is what preserves first-seen order on ties
        ranked.sort_by(|a, b| b.1.cmp(&a.1));
        ranked
    }

    /// The first `n` entries of [`ranked`](Self::ranked).
    pub fn top(&self, n: usize) -> Vec<(K, u64)> {
        let mut ranked = self.ranked();
        ranked.truncate(n);
        ranked
    }
}

impl<K: Hash + Eq + Clone> Default for RankedCounter<K> {
    fn default() -> Self {
        Self::new()
    }
}

/// Layer-presence labels counted in `packet_type_counts`.
pub mod packet_type {
    pub const IP: &str = "IP";
    pub const TCP: &str = "TCP";
    pub const UDP: &str = "UDP";
    pub const ARP: &str = "ARP";
    pub const IPV6: &str = "IPv6";
}

/// Single-pass capture overview.
#[derive(Debug, Clone)]
pub struct OverviewAggregator {
    top_n: usize,
    total_packets: u64,
    total_bytes: u64,
    protocols: RankedCounter<Protocol>,
    packet_types: RankedCounter<&'static str>,
    src_ips: RankedCounter<String>,
    dst_ips: RankedCounter<String>,
    src_ports: RankedCounter<u16>,
    dst_ports: RankedCounter<u16>,
    first_timestamp: Option<f64>,
    last_timestamp: Option<f64>,
    min_timestamp: f64,
    max_timestamp: f64,
    min_size: usize,
    max_size: usize,
}

impl OverviewAggregator {
    pub fn new(top_n: usize) -> Self {
        Self {
            top_n,
            total_packets: 0,
            total_bytes: 0,
            protocols: RankedCounter::new(),
            packet_types: RankedCounter::new(),
            src_ips: RankedCounter::new(),
            dst_ips: RankedCounter::new(),
            src_ports: RankedCounter::new(),
            dst_ports: RankedCounter::new(),
            first_timestamp: None,
            last_timestamp: None,
            min_timestamp: f64::INFINITY,
            max_timestamp: f64::NEG_INFINITY,
            min_size: usize::MAX,
            max_size: 0,
        }
    }

    /// Count one packet.
    pub fn observe(&mut self, packet: &PacketRecord) {
        self.total_packets += 1;
        self.total_bytes += packet.length as u64;

        if self.first_timestamp.is_none() {
            self.first_timestamp = Some(packet.timestamp);
        }
        self.last_timestamp = Some(packet.timestamp);
        self.min_timestamp = self.min_timestamp.min(packet.timestamp);
        self.max_timestamp = self.max_timestamp.max(packet.timestamp);

        self.min_size = self.min_size.min(packet.length);
        self.max_size = self.max_size.max(packet.length);

        self.protocols.increment(classify(packet));

        if let Some(ip) = &packet.ip {
            self.packet_types.increment(packet_type::IP);
            self.src_ips.increment(ip.src.to_string());
            self.dst_ips.increment(ip.dst.to_string());

            if packet.tcp().is_some() {
                self.packet_types.increment(packet_type::TCP);
            } else if packet.udp().is_some() {
                self.packet_types.increment(packet_type::UDP);
            }
            if let Some((src, dst)) = packet.ports() {
                self.src_ports.increment(src);
                self.dst_ports.increment(dst);
            }
        } else if packet.tags.contains(LinkTag::Arp) {
            self.packet_types.increment(packet_type::ARP);
        } else if packet.tags.contains(LinkTag::Ipv6) {
            self.packet_types.increment(packet_type::IPV6);
        }
    }

    /// Protocols with their packet counts, most frequent first.
    pub fn protocols(&self) -> Vec<(Protocol, u64)> {
        self.protocols.ranked()
    }

    /// `last - first` timestamp in capture order, clamped to zero.
    pub fn duration_seconds(&self) -> f64 {
        match (self.first_timestamp, self.last_timestamp) {
            (Some(first), Some(last)) => (last - first).max(0.0),
            _ => 0.0,
        }
    }

    fn shares<K, F>(&self, counter: &RankedCounter<K>, label: F) -> Vec<CountShare>
    where
        K: Hash + Eq + Clone,
        F: Fn(&K) -> String,
    {
        counter
            .ranked()
            .into_iter()
            .map(|(key, count)| CountShare {
                label: label(&key),
                count,
                percentage: percentage(count, self.total_packets),
            })
            .collect()
    }

    fn top_talkers<K: Hash + Eq + Clone>(
        &self,
        sources: &RankedCounter<K>,
        destinations: &RankedCounter<K>,
    ) -> TopTalkers<K> {
        let rank = |counter: &RankedCounter<K>| {
            counter
                .top(self.top_n)
                .into_iter()
                .map(|(key, count)| RankedEntry {
                    key,
                    count,
                    percentage: percentage(count, self.total_packets),
                })
                .collect()
        };
        TopTalkers {
            sources: rank(sources),
            destinations: rank(destinations),
        }
    }

    /// Build the overview section of the report.
    pub fn finish(&self) -> CaptureOverview {
        if self.total_packets == 0 {
            return CaptureOverview::default();
        }

        CaptureOverview {
            total_packets: self.total_packets,
            total_bytes: self.total_bytes,
            protocol_distribution: self.shares(&self.protocols, |p| p.as_str().to_string()),
            packet_type_counts: self.shares(&self.packet_types, |t| t.to_string()),
            time_range: TimeRange {
                start: self.min_timestamp,
                end: self.max_timestamp,
            },
            duration_seconds: self.duration_seconds(),
            packet_size: PacketSizeStats {
                avg: self.total_bytes as f64 / self.total_packets as f64,
                min: self.min_size,
                max: self.max_size,
            },
            ip_stats: self.top_talkers(&self.src_ips, &self.dst_ips),
            port_stats: self.top_talkers(&self.src_ports, &self.dst_ports),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::packet::TcpSegment;
    use std::net::{IpAddr, Ipv4Addr};

    fn ip(last: u8) -> IpAddr {
        IpAddr::V4(Ipv4Addr::new(10, 0, 0, last))
    }

    fn tcp(ts: f64, src: u8, dst: u8, dport: u16) -> PacketRecord {
        PacketRecord::new(ts, 100)
            .with_ip(ip(src), ip(dst), 6)
            .with_tcp(TcpSegment::new(40000, dport, 0, 0))
    }

    #[test]
    fn test_ranked_counter_tie_break_is_first_seen() {
        let mut counter = RankedCounter::new();
        for key in ["b", "a", "c", "a", "b", "d"] {
            counter.increment(key);
        }
        let ranked: Vec<_> = counter.ranked().into_iter().map(|(k, _)| k).collect();
        assert_eq!(ranked, vec!["b", "a", "c", "d"]);
        assert_eq!(counter.get(&"a"), 2);
        assert_eq!(counter.get(&"z"), 0);
    }

    #[test]
    fn test_top_n_truncates() {
        let mut agg = OverviewAggregator::new(2);
        for last in 1..=5 {
            agg.observe(&tcp(0.0, last, 100, 80));
        }
        let overview = agg.finish();
        assert_eq!(overview.ip_stats.sources.len(), 2);
        assert_eq!(overview.ip_stats.sources[0].key, "10.0.0.1");
        assert_eq!(overview.ip_stats.sources[1].key, "10.0.0.2");
        assert_eq!(overview.ip_stats.destinations.len(), 1);
        assert_eq!(overview.ip_stats.destinations[0].count, 5);
        assert_eq!(overview.ip_stats.destinations[0].percentage, 100.0);
    }

    #[test]
    fn test_packet_type_counts_are_layer_presence() {
        let mut agg = OverviewAggregator::new(10);
        agg.observe(&tcp(0.0, 1, 2, 1883));
        agg.observe(
            &PacketRecord::new(0.1, 80)
                .with_ip(ip(1), ip(2), 17)
                .with_udp(5353, 53),
        );
        agg.observe(&PacketRecord::new(0.2, 42).with_tag(LinkTag::Arp));
        agg.observe(&PacketRecord::new(0.3, 90).with_tag(LinkTag::Ipv6));

        let overview = agg.finish();
        let count = |label: &str| {
            overview
                .packet_type_counts
                .iter()
                .find(|c| c.label == label)
                .map(|c| c.count)
                .unwrap_or(0)
        };
        assert_eq!(count("IP"), 2);
        assert_eq!(count("TCP"), 1);
        assert_eq!(count("UDP"), 1);
        assert_eq!(count("ARP"), 1);
        assert_eq!(count("IPv6"), 1);

        assert_eq!(overview.port_stats.destinations.len(), 2);
        assert_eq!(overview.port_stats.destinations[0].key, 1883);
    }

    #[test]
    fn test_time_range_and_duration() {
        let mut agg = OverviewAggregator::new(10);
        agg.observe(&tcp(10.0, 1, 2, 80));
        agg.observe(&tcp(12.5, 1, 2, 80));
        agg.observe(&tcp(12.0, 1, 2, 80));

        let overview = agg.finish();
        assert_eq!(overview.time_range.start, 10.0);
        assert_eq!(overview.time_range.end, 12.5);
        assert_eq!(overview.duration_seconds, 2.0);
    }

    #[test]
    fn test_duration_clamped_on_regression() {
        let mut agg = OverviewAggregator::new(10);
        agg.observe(&tcp(5.0, 1, 2, 80));
        agg.observe(&tcp(4.0, 1, 2, 80));
        assert_eq!(agg.duration_seconds(), 0.0);
    }

    #[test]
    fn test_sizes() {
        let mut agg = OverviewAggregator::new(10);
        agg.observe(&PacketRecord::new(0.0, 60));
        agg.observe(&PacketRecord::new(0.0, 1500));
        let overview = agg.finish();
        assert_eq!(overview.total_bytes, 1560);
        assert_eq!(overview.packet_size.min, 60);
        assert_eq!(overview.packet_size.max, 1500);
        assert_eq!(overview.packet_size.avg, 780.0);
    }

    #[test]
    fn test_empty() {
        let agg = OverviewAggregator::new(10);
        let overview = agg.finish();
        assert_eq!(overview.total_packets, 0);
        assert_eq!(overview.duration_seconds, 0.0);
        assert_eq!(overview.packet_size.avg, 0.0);
        assert!(overview.protocol_distribution.is_empty());
    }
}
