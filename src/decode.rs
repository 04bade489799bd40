//! Frame decoding into engine records.
//!
//! Turns a [`RawPacket`] into a [`PacketRecord`]: the IPv4 layer, the TCP or
//! UDP header and the non-IP layers the classifier looks at (ARP, IPv6, LLC
//! and STP). Decoding never fails. A frame that cannot be parsed past some
//! layer keeps whatever was decoded before it and is counted as partial.

use std::net::{IpAddr, Ipv4Addr};

use etherparse::{Ethernet2HeaderSlice, Ipv4HeaderSlice, TcpHeaderSlice, UdpHeaderSlice};
use pcaptel_core::packet::ip_proto;
use pcaptel_core::{IpLayer, LinkTag, PacketRecord, TcpFlags, TcpSegment, Transport, UdpDatagram};
use tracing::trace;

use crate::pcap::RawPacket;

/// Link types the decoder understands.
pub mod linktype {
    pub const ETHERNET: u16 = 1;
    pub const RAW: u16 = 101;
    pub const LINUX_SLL: u16 = 113;
    pub const IPV4: u16 = 228;
}

/// Well-known EtherTypes.
pub mod ethertype {
    pub const IPV4: u16 = 0x0800;
    pub const ARP: u16 = 0x0806;
    pub const VLAN: u16 = 0x8100;
    pub const QINQ: u16 = 0x88A8;
    pub const IPV6: u16 = 0x86DD;
}

/// Largest value of the Ethernet type field that is an 802.3 length.
const MAX_8023_LENGTH: u16 = 1500;

/// LLC SAP used by spanning tree BPDUs.
const LLC_SAP_STP: u8 = 0x42;

/// Linux cooked capture header length.
const SLL_HEADER_LEN: usize = 16;

/// Linux cooked capture protocol value for 802.2 LLC frames.
const SLL_PROTO_802_2: u16 = 0x0004;

/// How far decoding of one frame got.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// Every layer present was decoded.
    Complete,
    /// A header was truncated or malformed.
    Partial,
    /// The capture link type is not supported.
    UnsupportedLink,
}

/// Frame counters kept by [`FrameDecoder`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DecodeStats {
    pub frames: u64,
    pub partial: u64,
    pub unsupported_link: u64,
}

/// Stateful decoder that tallies what it could not decode.
#[derive(Debug, Default)]
pub struct FrameDecoder {
    stats: DecodeStats,
}

impl FrameDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn decode(&mut self, raw: &RawPacket) -> PacketRecord {
        let (record, outcome) = decode_frame(raw);
        self.stats.frames += 1;
        match outcome {
            Outcome::Complete => {}
            Outcome::Partial => {
                trace!(frame = raw.frame_number, "frame partially decoded");
                self.stats.partial += 1;
            }
            Outcome::UnsupportedLink => {
                trace!(frame = raw.frame_number, link_type = raw.link_type, "unsupported link type");
                self.stats.unsupported_link += 1;
            }
        }
        record
    }

    pub fn stats(&self) -> DecodeStats {
        self.stats
    }
}

/// Decode one frame.
pub fn decode_frame(raw: &RawPacket) -> (PacketRecord, Outcome) {
    let mut record = PacketRecord::new(raw.timestamp_secs(), raw.original_length as usize);
    let data = raw.data.as_slice();

    let outcome = match raw.link_type {
        linktype::ETHERNET => decode_ethernet(data, &mut record),
        linktype::RAW => decode_raw_ip(data, &mut record),
        linktype::IPV4 => decode_ipv4(data, &mut record),
        linktype::LINUX_SLL => decode_sll(data, &mut record),
        _ => Outcome::UnsupportedLink,
    };

    (record, outcome)
}

fn decode_ethernet(data: &[u8], record: &mut PacketRecord) -> Outcome {
    let eth = match Ethernet2HeaderSlice::from_slice(data) {
        Ok(eth) => eth,
        Err(_) => return Outcome::Partial,
    };

    let mut ether_type = eth.ether_type().0;
    let mut payload = &data[eth.slice().len()..];

    // TCI (2 bytes) then the inner EtherType (2 bytes)
    while ether_type == ethertype::VLAN || ether_type == ethertype::QINQ {
        if payload.len() < 4 {
            return Outcome::Partial;
        }
        ether_type = u16::from_be_bytes([payload[2], payload[3]]);
        payload = &payload[4..];
    }

    if ether_type <= MAX_8023_LENGTH {
        return decode_llc(payload, record);
    }
    decode_ethertype(ether_type, payload, record)
}

fn decode_sll(data: &[u8], record: &mut PacketRecord) -> Outcome {
    if data.len() < SLL_HEADER_LEN {
        return Outcome::Partial;
    }
    let protocol = u16::from_be_bytes([data[14], data[15]]);
    let payload = &data[SLL_HEADER_LEN..];

    if protocol == SLL_PROTO_802_2 {
        decode_llc(payload, record)
    } else {
        decode_ethertype(protocol, payload, record)
    }
}

fn decode_raw_ip(data: &[u8], record: &mut PacketRecord) -> Outcome {
    match data.first().map(|b| b >> 4) {
        Some(4) => decode_ipv4(data, record),
        Some(6) => {
            record.tags.insert(LinkTag::Ipv6);
            Outcome::Complete
        }
        _ => Outcome::Partial,
    }
}

fn decode_ethertype(ether_type: u16, payload: &[u8], record: &mut PacketRecord) -> Outcome {
    match ether_type {
        ethertype::IPV4 => decode_ipv4(payload, record),
        ethertype::ARP => {
            record.tags.insert(LinkTag::Arp);
            Outcome::Complete
        }
        ethertype::IPV6 => {
            record.tags.insert(LinkTag::Ipv6);
            Outcome::Complete
        }
        // Other EtherTypes carry nothing the classifier distinguishes.
        _ => Outcome::Complete,
    }
}

/// 802.2 LLC header: DSAP, SSAP, control.
fn decode_llc(payload: &[u8], record: &mut PacketRecord) -> Outcome {
    if payload.len() < 3 {
        return Outcome::Partial;
    }
    record.tags.insert(LinkTag::Llc);
    if payload[0] == LLC_SAP_STP && payload[1] == LLC_SAP_STP {
        record.tags.insert(LinkTag::Stp);
    }
    Outcome::Complete
}

fn decode_ipv4(data: &[u8], record: &mut PacketRecord) -> Outcome {
    let ipv4 = match Ipv4HeaderSlice::from_slice(data) {
        Ok(ipv4) => ipv4,
        Err(_) => return Outcome::Partial,
    };

    let protocol = ipv4.protocol().0;
    record.ip = Some(IpLayer {
        src: IpAddr::V4(Ipv4Addr::from(ipv4.source())),
        dst: IpAddr::V4(Ipv4Addr::from(ipv4.destination())),
        protocol,
    });

    // Later fragments carry no transport header.
    if ipv4.fragments_offset().value() != 0 {
        return Outcome::Complete;
    }

    let header_len = ipv4.slice().len();
    // Segmentation offload leaves total length at zero.
    let total_len = match usize::from(ipv4.total_len()) {
        0 => data.len(),
        len => len,
    };
    let end = total_len.clamp(header_len, data.len().max(header_len));
    let payload = data.get(header_len..end).unwrap_or(&[]);

    match protocol {
        ip_proto::TCP => match TcpHeaderSlice::from_slice(payload) {
            Ok(tcp) => {
                // Taken from the IP header so truncated captures keep the
                // on-wire payload length.
                let payload_len = total_len
                    .saturating_sub(header_len)
                    .saturating_sub(tcp.slice().len());
                record.transport = Some(Transport::Tcp(TcpSegment {
                    src_port: tcp.source_port(),
                    dst_port: tcp.destination_port(),
                    seq: tcp.sequence_number(),
                    ack: tcp.acknowledgment_number(),
                    flags: TcpFlags {
                        syn: tcp.syn(),
                        ack: tcp.ack(),
                        fin: tcp.fin(),
                        rst: tcp.rst(),
                        psh: tcp.psh(),
                    },
                    window: tcp.window_size(),
                    payload_len,
                }));
                Outcome::Complete
            }
            Err(_) => Outcome::Partial,
        },
        ip_proto::UDP => match UdpHeaderSlice::from_slice(payload) {
            Ok(udp) => {
                record.transport = Some(Transport::Udp(UdpDatagram {
                    src_port: udp.source_port(),
                    dst_port: udp.destination_port(),
                }));
                Outcome::Complete
            }
            Err(_) => Outcome::Partial,
        },
        _ => Outcome::Complete,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pcaptel_core::{classify, Protocol};

    fn ethernet(ether_type: u16, payload: &[u8]) -> Vec<u8> {
        let mut frame = vec![
            0xff, 0xff, 0xff, 0xff, 0xff, 0xff, // Dst MAC
            0x00, 0x11, 0x22, 0x33, 0x44, 0x55, // Src MAC
        ];
        frame.extend_from_slice(&ether_type.to_be_bytes());
        frame.extend_from_slice(payload);
        frame
    }

    fn ipv4(protocol: u8, payload: &[u8]) -> Vec<u8> {
        let total_len = (20 + payload.len()) as u16;
        let mut packet = vec![0x45, 0x00];
        packet.extend_from_slice(&total_len.to_be_bytes());
        packet.extend_from_slice(&[0x00, 0x01, 0x00, 0x00, 64, protocol, 0x00, 0x00]);
        packet.extend_from_slice(&[192, 168, 1, 10]);
        packet.extend_from_slice(&[10, 0, 0, 1]);
        packet.extend_from_slice(payload);
        packet
    }

    fn tcp(src_port: u16, dst_port: u16, seq: u32, payload_len: usize) -> Vec<u8> {
        let mut segment = Vec::new();
        segment.extend_from_slice(&src_port.to_be_bytes());
        segment.extend_from_slice(&dst_port.to_be_bytes());
        segment.extend_from_slice(&seq.to_be_bytes());
        segment.extend_from_slice(&0u32.to_be_bytes()); // Ack
        segment.extend_from_slice(&[0x50, 0x18]); // Data offset 5, PSH+ACK
        segment.extend_from_slice(&8192u16.to_be_bytes()); // Window
        segment.extend_from_slice(&[0x00, 0x00, 0x00, 0x00]); // Checksum, urgent
        segment.extend(std::iter::repeat(0xAB).take(payload_len));
        segment
    }

    fn udp(src_port: u16, dst_port: u16) -> Vec<u8> {
        let mut datagram = Vec::new();
        datagram.extend_from_slice(&src_port.to_be_bytes());
        datagram.extend_from_slice(&dst_port.to_be_bytes());
        datagram.extend_from_slice(&8u16.to_be_bytes());
        datagram.extend_from_slice(&0u16.to_be_bytes());
        datagram
    }

    fn raw(link_type: u16, data: Vec<u8>) -> RawPacket {
        let len = data.len() as u32;
        RawPacket::new(1, 2_500_000_000, len, len, link_type, data)
    }

    // Test 1: Ethernet/IPv4/TCP decodes every field
    #[test]
    fn test_decode_tcp() {
        let frame = ethernet(ethertype::IPV4, &ipv4(6, &tcp(51000, 1883, 1000, 32)));
        let (record, outcome) = decode_frame(&raw(linktype::ETHERNET, frame));

        assert_eq!(outcome, Outcome::Complete);
        assert!((record.timestamp - 2.5).abs() < 1e-12);
        assert_eq!(record.length, 14 + 20 + 20 + 32);

        let ip = record.ip.unwrap();
        assert_eq!(ip.src, IpAddr::V4(Ipv4Addr::new(192, 168, 1, 10)));
        assert_eq!(ip.dst, IpAddr::V4(Ipv4Addr::new(10, 0, 0, 1)));

        let seg = record.tcp().unwrap();
        assert_eq!(seg.src_port, 51000);
        assert_eq!(seg.dst_port, 1883);
        assert_eq!(seg.seq, 1000);
        assert_eq!(seg.payload_len, 32);
        assert_eq!(seg.window, 8192);
        assert!(seg.flags.ack && seg.flags.psh && !seg.flags.syn);
        assert_eq!(classify(&record), Protocol::Mqtt);
    }

    // Test 2: UDP ports
    #[test]
    fn test_decode_udp() {
        let frame = ethernet(ethertype::IPV4, &ipv4(17, &udp(40000, 53)));
        let (record, outcome) = decode_frame(&raw(linktype::ETHERNET, frame));

        assert_eq!(outcome, Outcome::Complete);
        assert_eq!(record.ports(), Some((40000, 53)));
        assert_eq!(classify(&record), Protocol::Dns);
    }

    // Test 3: zero total length falls back to the captured length
    #[test]
    fn test_zero_total_length() {
        let mut packet = ipv4(6, &tcp(51000, 1883, 1000, 32));
        packet[2..4].copy_from_slice(&[0, 0]);
        let frame = ethernet(ethertype::IPV4, &packet);
        let (record, outcome) = decode_frame(&raw(linktype::ETHERNET, frame));

        assert_eq!(outcome, Outcome::Complete);
        let seg = record.tcp().unwrap();
        assert_eq!(seg.seq, 1000);
        assert_eq!(seg.payload_len, 32);
    }

    // Test 4: snaplen truncation keeps the on-wire payload length
    #[test]
    fn test_truncated_payload_length() {
        let mut frame = ethernet(ethertype::IPV4, &ipv4(6, &tcp(443, 50000, 7, 1000)));
        frame.truncate(14 + 20 + 20 + 10);
        let (record, outcome) = decode_frame(&raw(linktype::ETHERNET, frame));

        assert_eq!(outcome, Outcome::Complete);
        assert_eq!(record.payload_len(), 1000);
    }

    // Test 5: truncated TCP header keeps the IP layer only
    #[test]
    fn test_truncated_tcp_header() {
        let mut frame = ethernet(ethertype::IPV4, &ipv4(6, &tcp(443, 50000, 7, 0)));
        frame.truncate(14 + 20 + 8);
        let (record, outcome) = decode_frame(&raw(linktype::ETHERNET, frame));

        assert_eq!(outcome, Outcome::Partial);
        assert!(record.has_ip());
        assert!(record.transport.is_none());
        assert_eq!(classify(&record), Protocol::Other);
    }

    // Test 6: ARP and IPv6 become tags
    #[test]
    fn test_link_tags() {
        let (arp, _) = decode_frame(&raw(linktype::ETHERNET, ethernet(ethertype::ARP, &[0; 28])));
        assert!(arp.tags.contains(LinkTag::Arp));
        assert_eq!(classify(&arp), Protocol::Arp);

        let (v6, _) = decode_frame(&raw(linktype::ETHERNET, ethernet(ethertype::IPV6, &[0x60; 40])));
        assert!(v6.tags.contains(LinkTag::Ipv6));
        assert!(!v6.has_ip());
        assert_eq!(classify(&v6), Protocol::Ipv6);
    }

    // Test 7: 802.3 frames with STP BPDU SAPs
    #[test]
    fn test_llc_and_stp() {
        let (stp, outcome) =
            decode_frame(&raw(linktype::ETHERNET, ethernet(38, &[0x42, 0x42, 0x03, 0x00])));
        assert_eq!(outcome, Outcome::Complete);
        assert!(stp.tags.contains(LinkTag::Llc));
        assert!(stp.tags.contains(LinkTag::Stp));

        let (llc, _) = decode_frame(&raw(linktype::ETHERNET, ethernet(38, &[0xAA, 0xAA, 0x03])));
        assert!(llc.tags.contains(LinkTag::Llc));
        assert!(!llc.tags.contains(LinkTag::Stp));
        assert_eq!(classify(&llc), Protocol::Llc);
    }

    // Test 8: 802.1Q tag is skipped
    #[test]
    fn test_vlan() {
        let mut payload = vec![0x00, 0x64, 0x08, 0x00]; // VLAN 100, IPv4
        payload.extend_from_slice(&ipv4(17, &udp(40000, 161)));
        let (record, outcome) =
            decode_frame(&raw(linktype::ETHERNET, ethernet(ethertype::VLAN, &payload)));

        assert_eq!(outcome, Outcome::Complete);
        assert_eq!(classify(&record), Protocol::Snmp);
    }

    // Test 9: raw IPv4 and Linux cooked link types
    #[test]
    fn test_other_link_types() {
        let (record, _) = decode_frame(&raw(linktype::RAW, ipv4(17, &udp(1000, 123))));
        assert_eq!(classify(&record), Protocol::Ntp);

        let mut sll = vec![0u8; 14];
        sll.extend_from_slice(&ethertype::IPV4.to_be_bytes());
        sll.extend_from_slice(&ipv4(1, &[8, 0, 0, 0]));
        let (record, outcome) = decode_frame(&raw(linktype::LINUX_SLL, sll));
        assert_eq!(outcome, Outcome::Complete);
        assert_eq!(classify(&record), Protocol::Icmp);
    }

    // Test 10: stats count partial and unsupported frames
    #[test]
    fn test_decoder_stats() {
        let mut decoder = FrameDecoder::new();
        decoder.decode(&raw(linktype::ETHERNET, ethernet(ethertype::IPV4, &ipv4(17, &udp(1, 2)))));
        decoder.decode(&raw(linktype::ETHERNET, vec![0x00; 6]));
        let unknown = decoder.decode(&raw(147, vec![0x00; 20]));

        assert_eq!(
            decoder.stats(),
            DecodeStats {
                frames: 3,
                partial: 1,
                unsupported_link: 1,
            }
        );
        assert_eq!(classify(&unknown), Protocol::Other);
        assert_eq!(unknown.length, 20);
    }
}
