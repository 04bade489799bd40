//! Decoded packet records.
//!
//! A [`PacketRecord`] is the read-only view of one captured packet that the
//! capture decoder hands to the engine. It carries only what the analyzers
//! look at: timing, size, the IPv4 layer, the transport layer and a set of
//! non-IP layer tags.

use std::net::IpAddr;

use crate::flow::FlowKey;

/// IP protocol numbers the classifier and decoder care about.
pub mod ip_proto {
    pub const ICMP: u8 = 1;
    pub const IGMP: u8 = 2;
    pub const TCP: u8 = 6;
    pub const UDP: u8 = 17;
    pub const ESP: u8 = 50;
    pub const AH: u8 = 51;
    pub const OSPF: u8 = 89;
    pub const PIM: u8 = 103;
}

/// IP layer of a packet.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IpLayer {
    pub src: IpAddr,
    pub dst: IpAddr,
    pub protocol: u8,
}

/// TCP flags.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TcpFlags {
    pub syn: bool,
    pub ack: bool,
    pub fin: bool,
    pub rst: bool,
    pub psh: bool,
}

/// TCP header fields plus the length of the segment payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TcpSegment {
    pub src_port: u16,
    pub dst_port: u16,
    pub seq: u32,
    pub ack: u32,
    pub flags: TcpFlags,
    pub window: u16,
    pub payload_len: usize,
}

impl TcpSegment {
    /// A bare data segment with the ACK flag set and an open window.
    pub fn new(src_port: u16, dst_port: u16, seq: u32, payload_len: usize) -> Self {
        Self {
            src_port,
            dst_port,
            seq,
            ack: 0,
            flags: TcpFlags {
                ack: true,
                ..Default::default()
            },
            window: u16::MAX,
            payload_len,
        }
    }

    pub fn with_window(mut self, window: u16) -> Self {
        self.window = window;
        self
    }

    /// Check whether either port is in `ports`.
    pub fn uses_port(&self, ports: &[u16]) -> bool {
        ports.contains(&self.src_port) || ports.contains(&self.dst_port)
    }
}

/// UDP header fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UdpDatagram {
    pub src_port: u16,
    pub dst_port: u16,
}

/// Transport layer of a packet.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transport {
    Tcp(TcpSegment),
    Udp(UdpDatagram),
}

/// Non-IP layers a packet may carry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkTag {
    Arp,
    Ipv6,
    Llc,
    Stp,
}

impl LinkTag {
    fn bit(self) -> u8 {
        match self {
            LinkTag::Arp => 0x01,
            LinkTag::Ipv6 => 0x02,
            LinkTag::Llc => 0x04,
            LinkTag::Stp => 0x08,
        }
    }
}

/// Set of [`LinkTag`]s present on a packet.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LinkTags(u8);

impl LinkTags {
    pub fn insert(&mut self, tag: LinkTag) {
        self.0 |= tag.bit();
    }

    pub fn contains(&self, tag: LinkTag) -> bool {
        self.0 & tag.bit() != 0
    }

    pub fn is_empty(&self) -> bool {
        self.0 == 0
    }
}

/// One captured packet, as seen by the engine.
#[derive(Debug, Clone, PartialEq)]
pub struct PacketRecord {
    /// Capture timestamp in seconds.
    pub timestamp: f64,
    /// Total frame length in bytes.
    pub length: usize,
    pub ip: Option<IpLayer>,
    pub transport: Option<Transport>,
    pub tags: LinkTags,
}

impl PacketRecord {
    /// A packet with no decoded layers.
    pub fn new(timestamp: f64, length: usize) -> Self {
        Self {
            timestamp,
            length,
            ip: None,
            transport: None,
            tags: LinkTags::default(),
        }
    }

    pub fn with_ip(mut self, src: IpAddr, dst: IpAddr, protocol: u8) -> Self {
        self.ip = Some(IpLayer { src, dst, protocol });
        self
    }

    pub fn with_tcp(mut self, segment: TcpSegment) -> Self {
        if let Some(ip) = self.ip.as_mut() {
            ip.protocol = ip_proto::TCP;
        }
        self.transport = Some(Transport::Tcp(segment));
        self
    }

    pub fn with_udp(mut self, src_port: u16, dst_port: u16) -> Self {
        if let Some(ip) = self.ip.as_mut() {
            ip.protocol = ip_proto::UDP;
        }
        self.transport = Some(Transport::Udp(UdpDatagram { src_port, dst_port }));
        self
    }

    pub fn with_tag(mut self, tag: LinkTag) -> Self {
        self.tags.insert(tag);
        self
    }

    pub fn has_ip(&self) -> bool {
        self.ip.is_some()
    }

    /// TCP segment, if the packet carries both IP and TCP.
    pub fn tcp(&self) -> Option<&TcpSegment> {
        match (&self.ip, &self.transport) {
            (Some(_), Some(Transport::Tcp(tcp))) => Some(tcp),
            _ => None,
        }
    }

    /// UDP datagram, if the packet carries both IP and UDP.
    pub fn udp(&self) -> Option<&UdpDatagram> {
        match (&self.ip, &self.transport) {
            (Some(_), Some(Transport::Udp(udp))) => Some(udp),
            _ => None,
        }
    }

    /// TCP payload length; zero for anything that is not IP/TCP.
    pub fn payload_len(&self) -> usize {
        self.tcp().map(|tcp| tcp.payload_len).unwrap_or(0)
    }

    /// Source and destination ports for IP/TCP and IP/UDP packets.
    pub fn ports(&self) -> Option<(u16, u16)> {
        if let Some(tcp) = self.tcp() {
            Some((tcp.src_port, tcp.dst_port))
        } else {
            self.udp().map(|udp| (udp.src_port, udp.dst_port))
        }
    }

    /// Directional TCP flow this packet belongs to.
    pub fn flow_key(&self) -> Option<FlowKey> {
        let ip = self.ip.as_ref()?;
        let tcp = self.tcp()?;
        Some(FlowKey::new(ip.src, tcp.src_port, ip.dst, tcp.dst_port))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::Ipv4Addr;

    fn ip(a: u8, b: u8, c: u8, d: u8) -> IpAddr {
        IpAddr::V4(Ipv4Addr::new(a, b, c, d))
    }

    #[test]
    fn test_tcp_requires_ip_layer() {
        let pkt = PacketRecord::new(0.0, 60).with_tcp(TcpSegment::new(1234, 80, 1, 10));
        assert!(pkt.tcp().is_none());
        assert_eq!(pkt.payload_len(), 0);
        assert!(pkt.flow_key().is_none());
    }

    #[test]
    fn test_with_tcp_sets_ip_protocol() {
        let pkt = PacketRecord::new(0.0, 60)
            .with_ip(ip(10, 0, 0, 1), ip(10, 0, 0, 2), 0)
            .with_tcp(TcpSegment::new(1234, 80, 1, 10));
        assert_eq!(pkt.ip.map(|l| l.protocol), Some(ip_proto::TCP));
        assert_eq!(pkt.payload_len(), 10);
        assert_eq!(pkt.ports(), Some((1234, 80)));
    }

    #[test]
    fn test_link_tags() {
        let pkt = PacketRecord::new(0.0, 60)
            .with_tag(LinkTag::Llc)
            .with_tag(LinkTag::Stp);
        assert!(pkt.tags.contains(LinkTag::Llc));
        assert!(pkt.tags.contains(LinkTag::Stp));
        assert!(!pkt.tags.contains(LinkTag::Arp));
        assert!(!pkt.tags.is_empty());
    }

    #[test]
    fn test_flow_key_is_directional() {
        let a = PacketRecord::new(0.0, 60)
            .with_ip(ip(10, 0, 0, 1), ip(10, 0, 0, 2), 6)
            .with_tcp(TcpSegment::new(5000, 1883, 1, 0));
        let b = PacketRecord::new(0.0, 60)
            .with_ip(ip(10, 0, 0, 2), ip(10, 0, 0, 1), 6)
            .with_tcp(TcpSegment::new(1883, 5000, 1, 0));
        assert_ne!(a.flow_key(), b.flow_key());
    }
}
