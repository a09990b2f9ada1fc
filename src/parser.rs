use std::fmt;
use std::net::Ipv4Addr;

use chrono::{DateTime, Local};
use pnet_packet::Packet;
use pnet_packet::ethernet::{EtherTypes, EthernetPacket};
use pnet_packet::ip::IpNextHeaderProtocols;
use pnet_packet::ipv4::Ipv4Packet;
use pnet_packet::tcp::TcpPacket;
use pnet_packet::udp::UdpPacket;

use crate::error::{Error, Result};

/// A raw Ethernet frame handed over by a packet source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CapturedPacket {
    pub data: Vec<u8>,
}

impl CapturedPacket {
    pub fn new(data: Vec<u8>) -> Self {
        CapturedPacket { data }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Protocol {
    Tcp,
    Udp,
}

impl fmt::Display for Protocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Protocol::Tcp => f.write_str("tcp"),
            Protocol::Udp => f.write_str("udp"),
        }
    }
}

/// A packet that satisfied the match predicate, frozen into a record.
#[derive(Debug, Clone, PartialEq)]
pub struct MatchedEvent {
    pub timestamp: DateTime<Local>,
    pub src_ip: Ipv4Addr,
    pub dst_ip: Ipv4Addr,
    pub src_port: u16,
    pub dst_port: u16,
    pub protocol: Protocol,
    /// The line used for alerts, verbose output and the capture log.
    pub summary: String,
}

impl fmt::Display for MatchedEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.summary)
    }
}

/// Turns a frame that already passed the match filter into a `MatchedEvent`.
///
/// The filter only needs the first four bytes of the transport header, so a
/// frame cut short by the capture snaplen can match and still be unusable
/// here. Those come back as `MalformedPacket` and the caller skips them.
pub fn extract(packet: &CapturedPacket, timestamp: DateTime<Local>) -> Result<MatchedEvent> {
    let ethernet = EthernetPacket::new(&packet.data).ok_or(Error::MalformedPacket("truncated ethernet header"))?;
    if ethernet.get_ethertype() != EtherTypes::Ipv4 {
        return Err(Error::MalformedPacket("not an IPv4 frame"));
    }

    let ipv4 = Ipv4Packet::new(ethernet.payload()).ok_or(Error::MalformedPacket("truncated IPv4 header"))?;
    if ipv4.get_version() != 4 || ipv4.get_header_length() < 5 {
        return Err(Error::MalformedPacket("bad IPv4 header"));
    }
    let src_ip = ipv4.get_source();
    let dst_ip = ipv4.get_destination();

    let (protocol, src_port, dst_port) = match ipv4.get_next_level_protocol() {
        IpNextHeaderProtocols::Tcp => {
            let tcp = TcpPacket::new(ipv4.payload()).ok_or(Error::MalformedPacket("truncated TCP header"))?;
            (Protocol::Tcp, tcp.get_source(), tcp.get_destination())
        }
        IpNextHeaderProtocols::Udp => {
            let udp = UdpPacket::new(ipv4.payload()).ok_or(Error::MalformedPacket("truncated UDP header"))?;
            (Protocol::Udp, udp.get_source(), udp.get_destination())
        }
        _ => return Err(Error::MalformedPacket("no TCP or UDP header")),
    };

    let summary = format!(
        "[{}] Source IP: {}, Destination IP: {}, Source Port: {}, Destination Port: {}",
        timestamp.format("%Y-%m-%d %H:%M:%S"),
        src_ip,
        dst_ip,
        src_port,
        dst_port
    );

    Ok(MatchedEvent {
        timestamp,
        src_ip,
        dst_ip,
        src_port,
        dst_port,
        protocol,
        summary,
    })
}
