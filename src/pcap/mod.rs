//! Capture file reading.
//!
//! Reads PCAP and PCAPNG files (optionally gzipped) and exposes raw frames
//! for decoding.

mod packet;
mod reader;

pub use packet::RawPacket;
pub use reader::{is_gzip_extension, PcapReader};
