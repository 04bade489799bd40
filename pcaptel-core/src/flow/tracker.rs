use std::collections::HashMap;
use std::fmt;
use std::net::IpAddr;

use serde::Serialize;
use tracing::trace;

use super::seq::{seq_add, seq_distance};
use crate::classify::Protocol;
use crate::config::MAX_LOSS_GAP_BYTES;
use crate::packet::{PacketRecord, TcpSegment};

/// Directional flow key. `A -> B` and `B -> A` are different flows.
#[derive(Debug, Clone, Copy, Hash, Eq, PartialEq, Serialize)]
pub struct FlowKey {
    pub src_ip: IpAddr,
    pub src_port: u16,
    pub dst_ip: IpAddr,
    pub dst_port: u16,
}

impl FlowKey {
    pub fn new(src_ip: IpAddr, src_port: u16, dst_ip: IpAddr, dst_port: u16) -> Self {
        Self {
            src_ip,
            src_port,
            dst_ip,
            dst_port,
        }
    }
}

impl fmt::Display for FlowKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}:{} -> {}:{}",
            self.src_ip, self.src_port, self.dst_ip, self.dst_port
        )
    }
}

/// Sequence state for one flow.
///
/// `next_expected_seq` is always `last_seq + last_payload_len` modulo 2^32.
/// Only payload-bearing segments move the state; pure ACKs, SYNs and FINs
/// without data leave it untouched.
#[derive(Debug, Clone, PartialEq)]
pub struct FlowState {
    pub last_seq: u32,
    pub last_payload_len: usize,
    pub next_expected_seq: u32,
    pub last_timestamp: f64,
    /// Payload-bearing segments seen so far.
    pub payload_packets: u64,
}

impl FlowState {
    fn new(seq: u32, payload_len: usize, timestamp: f64) -> Self {
        Self {
            last_seq: seq,
            last_payload_len: payload_len,
            next_expected_seq: seq_add(seq, payload_len),
            last_timestamp: timestamp,
            payload_packets: 1,
        }
    }

    fn advance(&mut self, seq: u32, payload_len: usize, timestamp: f64) {
        self.last_seq = seq;
        self.last_payload_len = payload_len;
        self.next_expected_seq = seq_add(seq, payload_len);
        self.last_timestamp = timestamp;
        self.payload_packets += 1;
    }
}

/// A detected gap between the expected and the observed sequence number.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LossEvent {
    pub timestamp: f64,
    pub flow: FlowKey,
    pub protocol: Protocol,
    /// First missing sequence number.
    pub missing_start: u32,
    /// Sequence number the flow resumed at (exclusive end of the gap).
    pub missing_end: u32,
    pub bytes_lost: u32,
}

/// A payload-bearing segment that repeats the previous segment's sequence number.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RetransmissionEvent {
    pub timestamp: f64,
    pub flow: FlowKey,
    pub protocol: Protocol,
    pub seq: u32,
}

/// What the tracker concluded about one segment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SegmentOutcome {
    /// First data segment of a flow.
    FirstSegment,
    /// Segment without payload; state unchanged.
    NoPayload,
    /// Segment starts exactly where the flow left off.
    InOrder,
    Retransmission,
    /// One-byte zero-window probe repeating the last sequence number.
    KeepAlive,
    Loss { bytes: u32 },
    /// Discontinuity outside the loss window, treated as reordering.
    OutOfWindow,
}

/// Transmit and loss tallies for one protocol.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ProtocolCounters {
    pub transmitted: u64,
    pub lost: u64,
}

/// Tracks per-flow sequence state for one analysis run.
#[derive(Debug)]
pub struct FlowTracker {
    flows: HashMap<FlowKey, FlowState>,
    counters: HashMap<Protocol, ProtocolCounters>,
    loss_events: Vec<LossEvent>,
    retransmissions: Vec<RetransmissionEvent>,
    max_loss_gap: u32,
}

impl FlowTracker {
    pub fn new() -> Self {
        Self::with_max_loss_gap(MAX_LOSS_GAP_BYTES)
    }

    /// Gaps of `max_loss_gap` bytes or more are not counted as loss.
    pub fn with_max_loss_gap(max_loss_gap: u32) -> Self {
        Self {
            flows: HashMap::new(),
            counters: HashMap::new(),
            loss_events: Vec::new(),
            retransmissions: Vec::new(),
            max_loss_gap,
        }
    }

    /// Process one packet in capture order.
    ///
    /// Returns `None` for packets that do not carry both IP and TCP.
    pub fn observe(&mut self, packet: &PacketRecord, protocol: Protocol) -> Option<SegmentOutcome> {
        let flow = packet.flow_key()?;
        let tcp = packet.tcp()?;

        self.counters.entry(protocol).or_default().transmitted += 1;

        let payload_len = tcp.payload_len;
        if payload_len == 0 {
            return Some(SegmentOutcome::NoPayload);
        }

        let state = match self.flows.get_mut(&flow) {
            Some(state) => state,
            None => {
                self.flows
                    .insert(flow, FlowState::new(tcp.seq, payload_len, packet.timestamp));
                return Some(SegmentOutcome::FirstSegment);
            }
        };

        let outcome = if tcp.seq == state.last_seq {
            if is_keep_alive(tcp) {
                SegmentOutcome::KeepAlive
            } else {
                trace!(%flow, seq = tcp.seq, "retransmission");
                self.retransmissions.push(RetransmissionEvent {
                    timestamp: packet.timestamp,
                    flow,
                    protocol,
                    seq: tcp.seq,
                });
                SegmentOutcome::Retransmission
            }
        } else if tcp.seq != state.next_expected_seq {
            let missing = seq_distance(state.next_expected_seq, tcp.seq);
            if missing > 0 && missing < self.max_loss_gap {
                trace!(%flow, expected = state.next_expected_seq, seq = tcp.seq, missing, "sequence gap");
                self.loss_events.push(LossEvent {
                    timestamp: packet.timestamp,
                    flow,
                    protocol,
                    missing_start: state.next_expected_seq,
                    missing_end: tcp.seq,
                    bytes_lost: missing,
                });
                self.counters.entry(protocol).or_default().lost += 1;
                SegmentOutcome::Loss { bytes: missing }
            } else {
                SegmentOutcome::OutOfWindow
            }
        } else {
            SegmentOutcome::InOrder
        };

        state.advance(tcp.seq, payload_len, packet.timestamp);
        Some(outcome)
    }

    /// Payload-bearing packets seen so far on `flow`.
    pub fn payload_packets(&self, flow: &FlowKey) -> u64 {
        self.flows.get(flow).map(|s| s.payload_packets).unwrap_or(0)
    }

    pub fn state(&self, flow: &FlowKey) -> Option<&FlowState> {
        self.flows.get(flow)
    }

    pub fn flow_count(&self) -> usize {
        self.flows.len()
    }

    pub fn counters(&self) -> &HashMap<Protocol, ProtocolCounters> {
        &self.counters
    }

    pub fn loss_events(&self) -> &[LossEvent] {
        &self.loss_events
    }

    pub fn retransmissions(&self) -> &[RetransmissionEvent] {
        &self.retransmissions
    }
}

impl Default for FlowTracker {
    fn default() -> Self {
        Self::new()
    }
}

fn is_keep_alive(tcp: &TcpSegment) -> bool {
    tcp.payload_len == 1 && tcp.window == 0
}
