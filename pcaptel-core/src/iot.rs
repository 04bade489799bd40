//! MQTT device/broker/cloud traffic patterns.
//!
//! Only pairs whose earlier packet is IP/TCP on an MQTT port are looked at.
//! The earlier packet's payload size decides the pattern:
//!
//! | payload                         | pattern                          |
//! |---------------------------------|----------------------------------|
//! | `< 100`                         | device-to-broker (small message) |
//! | `> 1000`                        | broker aggregation (bundle)      |
//! | `> 5000` on a sustained flow    | cloud upload                     |

use std::collections::{BTreeMap, HashMap};
use std::net::IpAddr;

use serde::Serialize;

use crate::config::{AnalysisConfig, MQTT_PORTS};
use crate::delay::{DelayBuckets, DelayCategory, DelayRecord};
use crate::flow::FlowKey;
use crate::packet::PacketRecord;
use crate::report::{DeviceMix, IotMetrics, UploadStats};
use crate::stats::Summary;

/// Kind of MQTT message a device sent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageKind {
    Small,
    Bundle,
}

/// One classified MQTT message from a device.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DeviceMessage {
    pub timestamp: f64,
    pub size: usize,
    pub kind: MessageKind,
}

/// A broker-aggregated bundle.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Bundle {
    pub timestamp: f64,
    pub size: usize,
    pub flow: FlowKey,
}

/// A large transfer on a sustained flow.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UploadSample {
    pub timestamp: f64,
    pub size: usize,
    pub flow: FlowKey,
    pub delay_ms: f64,
}

/// Detects IoT traffic patterns over consecutive packet pairs.
#[derive(Debug)]
pub struct IotPatternDetector {
    small_payload_max: usize,
    bundle_payload_min: usize,
    upload_payload_min: usize,
    sustained_flow_min_packets: u64,
    mqtt_pairs: usize,
    bundles: Vec<Bundle>,
    bundle_sizes: Vec<f64>,
    aggregation_intervals: Vec<f64>,
    last_bundle_time: HashMap<FlowKey, f64>,
    uploads: Vec<UploadSample>,
    devices: HashMap<IpAddr, Vec<DeviceMessage>>,
}

impl IotPatternDetector {
    pub fn new(config: &AnalysisConfig) -> Self {
        Self {
            small_payload_max: config.small_payload_max,
            bundle_payload_min: config.bundle_payload_min,
            upload_payload_min: config.upload_payload_min,
            sustained_flow_min_packets: config.sustained_flow_min_packets,
            mqtt_pairs: 0,
            bundles: Vec::new(),
            bundle_sizes: Vec::new(),
            aggregation_intervals: Vec::new(),
            last_bundle_time: HashMap::new(),
            uploads: Vec::new(),
            devices: HashMap::new(),
        }
    }

    /// Inspect one packet pair.
    ///
    /// `flow_packets` is the number of payload-bearing packets the flow
    /// tracker had already seen on the earlier packet's flow. Returns
    /// `false` when the pair is not MQTT traffic.
    pub fn observe_pair(
        &mut self,
        earlier: &PacketRecord,
        later: &PacketRecord,
        delay_ms: f64,
        flow_packets: u64,
        buckets: &mut DelayBuckets,
    ) -> bool {
        let (Some(ip), Some(tcp), Some(flow)) = (&earlier.ip, earlier.tcp(), earlier.flow_key())
        else {
            return false;
        };
        if !later.has_ip() || !tcp.uses_port(&MQTT_PORTS) {
            return false;
        }
        self.mqtt_pairs += 1;

        let now = earlier.timestamp;
        let payload_size = tcp.payload_len;
        let record = || {
            DelayRecord::new(now, delay_ms)
                .between(flow.src_ip, flow.dst_ip)
                .with_size(payload_size)
        };
        let mut classified = false;

        if payload_size < self.small_payload_max {
            buckets.push(DelayCategory::DeviceToBroker, record());
            classified = true;
        }

        if payload_size > self.bundle_payload_min {
            buckets.push(DelayCategory::BrokerAggregation, record());
            self.bundles.push(Bundle {
                timestamp: now,
                size: payload_size,
                flow,
            });
            self.bundle_sizes.push(payload_size as f64);
            if let Some(previous) = self.last_bundle_time.insert(flow, now) {
                self.aggregation_intervals.push((now - previous).max(0.0));
            }
            classified = true;
        }

        if payload_size > self.upload_payload_min && flow_packets > self.sustained_flow_min_packets {
            buckets.push(DelayCategory::CloudUpload, record());
            self.uploads.push(UploadSample {
                timestamp: now,
                size: payload_size,
                flow,
                delay_ms: delay_ms.max(0.0),
            });
        }

        if classified {
            let kind = if payload_size < self.small_payload_max {
                MessageKind::Small
            } else {
                MessageKind::Bundle
            };
            self.devices.entry(ip.src).or_default().push(DeviceMessage {
                timestamp: now,
                size: payload_size,
                kind,
            });
        }

        true
    }

    pub fn bundles(&self) -> &[Bundle] {
        &self.bundles
    }

    pub fn aggregation_intervals(&self) -> &[f64] {
        &self.aggregation_intervals
    }

    pub fn uploads(&self) -> &[UploadSample] {
        &self.uploads
    }

    pub fn device_messages(&self, device: &IpAddr) -> &[DeviceMessage] {
        self.devices.get(device).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Small/bundle counts per device.
    pub fn device_mix(&self) -> BTreeMap<String, DeviceMix> {
        self.devices
            .iter()
            .map(|(device, messages)| {
                let small = messages
                    .iter()
                    .filter(|m| m.kind == MessageKind::Small)
                    .count();
                let mix = DeviceMix {
                    small,
                    bundle: messages.len() - small,
                    total: messages.len(),
                };
                (device.to_string(), mix)
            })
            .collect()
    }

    /// IoT section of the report, absent when the capture had no MQTT traffic.
    pub fn finish(&self) -> Option<IotMetrics> {
        if self.mqtt_pairs == 0 {
            return None;
        }

        let upload_delays: Vec<f64> = self.uploads.iter().map(|u| u.delay_ms).collect();
        Some(IotMetrics {
            bundle_sizes: Summary::of(&self.bundle_sizes),
            aggregation_intervals: Summary::of(&self.aggregation_intervals),
            uploads: UploadStats {
                count: self.uploads.len(),
                total_bytes: self.uploads.iter().map(|u| u.size as u64).sum(),
                delay_ms: Summary::of(&upload_delays),
            },
            devices: self.device_mix(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::packet::TcpSegment;
    use std::net::Ipv4Addr;

    fn device() -> IpAddr {
        IpAddr::V4(Ipv4Addr::new(192, 168, 0, 10))
    }

    fn broker() -> IpAddr {
        IpAddr::V4(Ipv4Addr::new(192, 168, 0, 1))
    }

    fn mqtt(ts: f64, seq: u32, payload: usize) -> PacketRecord {
        PacketRecord::new(ts, 54 + payload)
            .with_ip(device(), broker(), 6)
            .with_tcp(TcpSegment::new(40000, 1883, seq, payload))
    }

    fn detector() -> IotPatternDetector {
        IotPatternDetector::new(&AnalysisConfig::default())
    }

    #[test]
    fn test_small_message() {
        let mut iot = detector();
        let mut buckets = DelayBuckets::default();
        assert!(iot.observe_pair(&mqtt(0.0, 1, 40), &mqtt(0.01, 41, 40), 10.0, 0, &mut buckets));
        assert_eq!(buckets.get(DelayCategory::DeviceToBroker).len(), 1);
        assert_eq!(iot.device_messages(&device())[0].kind, MessageKind::Small);
    }

    #[test]
    fn test_medium_payload_only_counts_pair() {
        let mut iot = detector();
        let mut buckets = DelayBuckets::default();
        assert!(iot.observe_pair(&mqtt(0.0, 1, 500), &mqtt(0.01, 501, 40), 10.0, 0, &mut buckets));
        assert!(iot.device_messages(&device()).is_empty());
        assert!(buckets.get(DelayCategory::DeviceToBroker).is_empty());
        assert!(buckets.get(DelayCategory::BrokerAggregation).is_empty());
        assert!(iot.finish().is_some());
    }

    #[test]
    fn test_bundle_and_aggregation_interval() {
        let mut iot = detector();
        let mut buckets = DelayBuckets::default();
        iot.observe_pair(&mqtt(10.0, 1, 1500), &mqtt(10.5, 1501, 10), 500.0, 0, &mut buckets);
        iot.observe_pair(&mqtt(12.0, 1511, 1500), &mqtt(12.5, 3011, 10), 500.0, 2, &mut buckets);

        assert_eq!(buckets.get(DelayCategory::BrokerAggregation).len(), 2);
        assert_eq!(iot.bundles().len(), 2);
        assert_eq!(iot.aggregation_intervals(), &[2.0]);

        let metrics = iot.finish().unwrap();
        assert_eq!(metrics.bundle_sizes.count, 2);
        assert_eq!(metrics.bundle_sizes.avg, 1500.0);
        assert_eq!(metrics.aggregation_intervals.avg, 2.0);
        let mix = metrics.devices["192.168.0.10"];
        assert_eq!(mix, DeviceMix { small: 0, bundle: 2, total: 2 });
    }

    #[test]
    fn test_upload_needs_sustained_flow() {
        let mut iot = detector();
        let mut buckets = DelayBuckets::default();
        iot.observe_pair(&mqtt(0.0, 1, 6000), &mqtt(0.1, 6001, 10), 100.0, 5, &mut buckets);
        assert!(iot.uploads().is_empty());

        iot.observe_pair(&mqtt(0.1, 6001, 6000), &mqtt(0.2, 12001, 10), 100.0, 6, &mut buckets);
        assert_eq!(iot.uploads().len(), 1);
        assert_eq!(buckets.get(DelayCategory::CloudUpload).len(), 1);
        // Uploads are bundles too
        assert_eq!(buckets.get(DelayCategory::BrokerAggregation).len(), 2);

        let metrics = iot.finish().unwrap();
        assert_eq!(metrics.uploads.count, 1);
        assert_eq!(metrics.uploads.total_bytes, 6000);
    }

    #[test]
    fn test_non_mqtt_ignored() {
        let mut iot = detector();
        let mut buckets = DelayBuckets::default();
        let http = PacketRecord::new(0.0, 100)
            .with_ip(device(), broker(), 6)
            .with_tcp(TcpSegment::new(40000, 80, 1, 40));
        assert!(!iot.observe_pair(&http, &http, 0.0, 0, &mut buckets));
        assert!(iot.finish().is_none());
    }

    #[test]
    fn test_tls_broker_source_port() {
        let mut iot = detector();
        let mut buckets = DelayBuckets::default();
        let reply = PacketRecord::new(0.0, 100)
            .with_ip(broker(), device(), 6)
            .with_tcp(TcpSegment::new(8883, 40000, 1, 40));
        assert!(iot.observe_pair(&reply, &mqtt(0.01, 1, 40), 10.0, 0, &mut buckets));
        assert_eq!(buckets.get(DelayCategory::DeviceToBroker).len(), 1);
        assert_eq!(iot.device_messages(&broker()).len(), 1);
    }

    #[test]
    fn test_later_packet_needs_ip() {
        let mut iot = detector();
        let mut buckets = DelayBuckets::default();
        let arp = PacketRecord::new(0.1, 42);
        assert!(!iot.observe_pair(&mqtt(0.0, 1, 40), &arp, 100.0, 0, &mut buckets));
    }
}
