//! Directional TCP flow tracking.
//!
//! The [`FlowTracker`] keeps one [`FlowState`] per [`FlowKey`] and watches
//! sequence numbers for retransmissions and for gaps that indicate a
//! dropped segment. Sequence arithmetic is modulo 2^32 throughout.

mod seq;
mod tracker;

pub use seq::{seq_add, seq_distance};
pub use tracker::{
    FlowKey, FlowState, FlowTracker, LossEvent, ProtocolCounters, RetransmissionEvent,
    SegmentOutcome,
};
