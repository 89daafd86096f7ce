//! Ethernet and IPv6 header encoding/decoding on caller-owned buffers.
use std::net::Ipv6Addr;

use pnet::packet::ethernet::{EtherType, EthernetPacket, MutableEthernetPacket};
use pnet::packet::ip::{IpNextHeaderProtocol, IpNextHeaderProtocols};
use pnet::packet::ipv6::{Ipv6Packet, MutableIpv6Packet};
use pnet::util::MacAddr;

pub const FRAME_ETH_SIZE: usize = 14;
pub const FRAME_IP_SIZE: usize = 40;

const HOP_LIMIT: u8 = 64;

/// Source and destination hardware addresses stamped on every frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LinkAddrs {
    pub source: MacAddr,
    pub destination: MacAddr,
}

impl LinkAddrs {
    pub const fn new(source: MacAddr, destination: MacAddr) -> Self {
        Self {
            source,
            destination,
        }
    }
}

/// Writes an Ethernet header at the start of `buf`.
pub fn eth_prepare(buf: &mut [u8], link: &LinkAddrs, ethertype: EtherType) {
    if let Some(mut eth) = MutableEthernetPacket::new(buf) {
        eth.set_source(link.source);
        eth.set_destination(link.destination);
        eth.set_ethertype(ethertype);
    }
}

/// Returns the payload type of the Ethernet header at the start of `buf`.
pub fn eth_decode(buf: &[u8]) -> Option<EtherType> {
    EthernetPacket::new(buf).map(|eth| eth.get_ethertype())
}

/// Writes an IPv6 header carrying TCP from `source` at the start of `buf`.
pub fn ip_prepare(buf: &mut [u8], source: Ipv6Addr) {
    if let Some(mut ip) = MutableIpv6Packet::new(buf) {
        ip.set_version(6);
        ip.set_traffic_class(0);
        ip.set_flow_label(0);
        ip.set_next_header(IpNextHeaderProtocols::Tcp);
        ip.set_hop_limit(HOP_LIMIT);
        ip.set_source(source);
    }
}

/// Restamps payload length and destination of a prepared IPv6 header.
pub fn ip_modify(buf: &mut [u8], payload_length: u16, destination: Ipv6Addr) {
    if let Some(mut ip) = MutableIpv6Packet::new(buf) {
        ip.set_payload_length(payload_length);
        ip.set_destination(destination);
    }
}

/// The IPv6 header fields the receive path looks at.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IpHeader {
    pub next_header: IpNextHeaderProtocol,
    pub payload_length: u16,
    pub hop_limit: u8,
    pub source: Ipv6Addr,
    pub destination: Ipv6Addr,
}

/// Decodes the IPv6 header at the start of `buf`, `None` if it is too short
/// or not version 6.
pub fn ip_decode(buf: &[u8]) -> Option<IpHeader> {
    let ip = Ipv6Packet::new(buf)?;
    if ip.get_version() != 6 {
        return None;
    }
    Some(IpHeader {
        next_header: ip.get_next_header(),
        payload_length: ip.get_payload_length(),
        hop_limit: ip.get_hop_limit(),
        source: ip.get_source(),
        destination: ip.get_destination(),
    })
}
