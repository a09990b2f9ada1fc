use std::net::Ipv4Addr;

use pnet_packet::Packet;
use pnet_packet::ethernet::{EtherTypes, EthernetPacket};
use pnet_packet::ip::IpNextHeaderProtocols;
use pnet_packet::ipv4::Ipv4Packet;

use crate::parser::CapturedPacket;
use crate::session::Target;

/// Does this frame come *from* the target IP and go *to* the target port?
///
/// One-directional on purpose: replies travelling back towards the target
/// never match. Anything that is not TCP or UDP over IPv4 is `false`.
pub fn matches(packet: &CapturedPacket, target: &Target) -> bool {
    match source_and_destination_port(&packet.data) {
        Some((src_ip, dst_port)) => src_ip == target.ip && dst_port == target.port,
        None => false,
    }
}

// TCP and UDP both carry the destination port in bytes 2..4, so a partial
// transport header is enough to decide a match.
fn source_and_destination_port(data: &[u8]) -> Option<(Ipv4Addr, u16)> {
    let ethernet = EthernetPacket::new(data)?;
    if ethernet.get_ethertype() != EtherTypes::Ipv4 {
        return None;
    }

    let ipv4 = Ipv4Packet::new(ethernet.payload())?;
    if ipv4.get_version() != 4 || ipv4.get_header_length() < 5 {
        return None;
    }
    match ipv4.get_next_level_protocol() {
        IpNextHeaderProtocols::Tcp | IpNextHeaderProtocols::Udp => {
            let transport = ipv4.payload();
            if transport.len() < 4 {
                return None;
            }
            let dst_port = u16::from_be_bytes([transport[2], transport[3]]);
            Some((ipv4.get_source(), dst_port))
        }
        _ => None,
    }
}
