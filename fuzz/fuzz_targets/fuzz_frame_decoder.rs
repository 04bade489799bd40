//! Fuzz target for frame decoding and analysis.
//!
//! Splits the input into frames, decodes each under every supported link
//! type and analyzes the result. Neither step should ever panic.

#![no_main]

use libfuzzer_sys::fuzz_target;
use pcaptel::decode::{linktype, FrameDecoder};
use pcaptel::pcap::RawPacket;
use pcaptel_core::PacketAnalyzer;

const LINK_TYPES: [u16; 4] = [
    linktype::ETHERNET,
    linktype::LINUX_SLL,
    linktype::RAW,
    linktype::IPV4,
];

fuzz_target!(|data: &[u8]| {
    let mut decoder = FrameDecoder::new();
    let mut records = Vec::new();

    // Each chunk is prefixed by a one-byte length.
    let mut rest = data;
    let mut frame_number = 0u64;
    while let Some((&len, tail)) = rest.split_first() {
        let len = usize::from(len).min(tail.len());
        let (frame, tail) = tail.split_at(len);
        rest = tail;

        for link_type in LINK_TYPES {
            frame_number += 1;
            let raw = RawPacket::new(
                frame_number,
                frame_number as i64 * 1_000_000,
                len as u32,
                len as u32,
                link_type,
                frame.to_vec(),
            );
            records.push(decoder.decode(&raw));
        }
    }

    let _ = PacketAnalyzer::default().analyze(&records);
});
