//! Port and layer heuristics mapping a packet to a protocol label.
//!
//! [`classify`] is total: every packet gets exactly one [`Protocol`], and
//! packets missing the layers a rule needs fall through to the next rule
//! and finally to [`Protocol::Other`].

use std::fmt;

use serde::{Serialize, Serializer};

use crate::packet::{ip_proto, LinkTag, PacketRecord, Transport};

/// Well-known port tables, checked in order.
pub mod ports {
    pub const MQTT: &[u16] = &[1883, 8883];
    pub const HTTP: &[u16] = &[80, 8080];
    pub const HTTPS: &[u16] = &[443];
    pub const FTP: &[u16] = &[20, 21];
    pub const SSH: &[u16] = &[22];
    pub const SMTP: &[u16] = &[25];
    pub const DNS: &[u16] = &[53];
    pub const TELNET: &[u16] = &[23];
    pub const DHCP: &[u16] = &[67, 68];
    pub const SNMP: &[u16] = &[161];
    pub const NTP: &[u16] = &[123];
    pub const TFTP: &[u16] = &[69];
}

/// Protocol label assigned to a packet.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Protocol {
    Mqtt,
    Http,
    Https,
    Ftp,
    Ssh,
    Smtp,
    DnsTcp,
    Telnet,
    Tcp,
    Dns,
    Dhcp,
    Snmp,
    Ntp,
    Tftp,
    Udp,
    Icmp,
    Igmp,
    Esp,
    Ah,
    Ospf,
    Pim,
    Arp,
    Ipv6,
    Llc,
    Stp,
    Other,
}

impl Protocol {
    /// Return the report label for this protocol.
    pub fn as_str(&self) -> &'static str {
        match self {
            Protocol::Mqtt => "MQTT",
            Protocol::Http => "HTTP",
            Protocol::Https => "HTTPS",
            Protocol::Ftp => "FTP",
            Protocol::Ssh => "SSH",
            Protocol::Smtp => "SMTP",
            Protocol::DnsTcp => "DNS-TCP",
            Protocol::Telnet => "Telnet",
            Protocol::Tcp => "TCP",
            Protocol::Dns => "DNS",
            Protocol::Dhcp => "DHCP",
            Protocol::Snmp => "SNMP",
            Protocol::Ntp => "NTP",
            Protocol::Tftp => "TFTP",
            Protocol::Udp => "UDP",
            Protocol::Icmp => "ICMP",
            Protocol::Igmp => "IGMP",
            Protocol::Esp => "ESP",
            Protocol::Ah => "AH",
            Protocol::Ospf => "OSPF",
            Protocol::Pim => "PIM",
            Protocol::Arp => "ARP",
            Protocol::Ipv6 => "IPv6",
            Protocol::Llc => "LLC",
            Protocol::Stp => "STP",
            Protocol::Other => "Other",
        }
    }
}

impl Serialize for Protocol {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl fmt::Display for Protocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

const TCP_TABLE: &[(&[u16], Protocol)] = &[
    (ports::MQTT, Protocol::Mqtt),
    (ports::HTTP, Protocol::Http),
    (ports::HTTPS, Protocol::Https),
    (ports::FTP, Protocol::Ftp),
    (ports::SSH, Protocol::Ssh),
    (ports::SMTP, Protocol::Smtp),
    (ports::DNS, Protocol::DnsTcp),
    (ports::TELNET, Protocol::Telnet),
];

const UDP_TABLE: &[(&[u16], Protocol)] = &[
    (ports::DNS, Protocol::Dns),
    (ports::DHCP, Protocol::Dhcp),
    (ports::SNMP, Protocol::Snmp),
    (ports::NTP, Protocol::Ntp),
    (ports::TFTP, Protocol::Tftp),
];

fn match_ports(table: &[(&[u16], Protocol)], src: u16, dst: u16) -> Option<Protocol> {
    table
        .iter()
        .find(|(ports, _)| ports.contains(&dst) || ports.contains(&src))
        .map(|(_, proto)| *proto)
}

/// Classify a packet.
pub fn classify(packet: &PacketRecord) -> Protocol {
    if let Some(ip) = &packet.ip {
        match &packet.transport {
            Some(Transport::Tcp(tcp)) => {
                return match_ports(TCP_TABLE, tcp.src_port, tcp.dst_port)
                    .unwrap_or(Protocol::Tcp);
            }
            Some(Transport::Udp(udp)) => {
                return match_ports(UDP_TABLE, udp.src_port, udp.dst_port)
                    .unwrap_or(Protocol::Udp);
            }
            None => {
                let by_number = match ip.protocol {
                    ip_proto::ICMP => Some(Protocol::Icmp),
                    ip_proto::IGMP => Some(Protocol::Igmp),
                    ip_proto::ESP => Some(Protocol::Esp),
                    ip_proto::AH => Some(Protocol::Ah),
                    ip_proto::OSPF => Some(Protocol::Ospf),
                    ip_proto::PIM => Some(Protocol::Pim),
                    _ => None,
                };
                if let Some(proto) = by_number {
                    return proto;
                }
            }
        }
    }

    // IP packets with an unknown protocol number still get a look at the tags
    [
        (LinkTag::Arp, Protocol::Arp),
        (LinkTag::Ipv6, Protocol::Ipv6),
        (LinkTag::Llc, Protocol::Llc),
        (LinkTag::Stp, Protocol::Stp),
    ]
    .into_iter()
    .find(|(tag, _)| packet.tags.contains(*tag))
    .map(|(_, proto)| proto)
    .unwrap_or(Protocol::Other)
}
