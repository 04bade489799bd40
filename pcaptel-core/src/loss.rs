//! Packet loss percentages from flow tracker tallies.
//!
//! `loss_percentage = lost / (transmitted + lost) * 100`, per protocol and
//! overall. A protocol with nothing transmitted reports 0.0.

use std::collections::BTreeMap;

use crate::flow::FlowTracker;
use crate::report::{OverallLoss, PacketLossReport, ProtocolLoss};
use crate::stats::percentage;

/// Summarize the loss counters of a finished flow tracker.
///
/// Returns `None` when no TCP flow was tracked at all.
pub fn summarize(tracker: &FlowTracker) -> Option<PacketLossReport> {
    let counters = tracker.counters();
    if counters.is_empty() {
        return None;
    }

    let per_protocol: BTreeMap<String, ProtocolLoss> = counters
        .iter()
        .map(|(protocol, c)| {
            let loss_percentage = if c.transmitted > 0 {
                percentage(c.lost, c.transmitted + c.lost)
            } else {
                0.0
            };
            let loss = ProtocolLoss {
                lost: c.lost,
                transmitted: c.transmitted,
                loss_percentage,
            };
            (protocol.as_str().to_string(), loss)
        })
        .collect();

    let lost: u64 = counters.values().map(|c| c.lost).sum();
    let transmitted: u64 = counters.values().map(|c| c.transmitted).sum();

    Some(PacketLossReport {
        overall: OverallLoss {
            lost,
            transmitted,
            loss_percentage: percentage(lost, transmitted + lost),
            loss_events: tracker.loss_events().len(),
        },
        per_protocol,
        events: tracker.loss_events().to_vec(),
    })
}
