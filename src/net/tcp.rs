//! TCP segment template handling for probes and banner-grab replies.
use std::net::Ipv6Addr;

use pnet::packet::tcp::{ipv6_checksum, MutableTcpPacket, TcpFlags, TcpPacket};

pub const TCP_HEADER_SIZE: usize = 20;

/// Initial sequence number of every probe. Replies acknowledge
/// `FIRST_SEQNUM + 1`, which is how the responder recognises its own SYNs.
pub const FIRST_SEQNUM: u32 = 0x5eed_c0de;

const WINDOW: u16 = 32_768;

/// Control flag combinations the scanner puts on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Control {
    Syn,
    SynAck,
    Ack,
    PshAck,
    FinAck,
    Rst,
    RstAck,
}

impl Control {
    fn apply(self, tcp: &mut MutableTcpPacket<'_>) {
        match self {
            Self::Syn => tcp.set_flags(TcpFlags::SYN),
            Self::SynAck => tcp.set_flags(TcpFlags::SYN | TcpFlags::ACK),
            Self::Ack => tcp.set_flags(TcpFlags::ACK),
            Self::PshAck => tcp.set_flags(TcpFlags::PSH | TcpFlags::ACK),
            Self::FinAck => tcp.set_flags(TcpFlags::FIN | TcpFlags::ACK),
            Self::Rst => tcp.set_flags(TcpFlags::RST),
            Self::RstAck => tcp.set_flags(TcpFlags::RST | TcpFlags::ACK),
        }
    }
}

/// Decoded fields of a captured segment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[allow(clippy::struct_excessive_bools)]
pub struct TcpHeader {
    pub source: u16,
    pub destination: u16,
    pub sequence: u32,
    pub acknowledgement: u32,
    pub header_len: usize,
    pub syn: bool,
    pub ack: bool,
    pub rst: bool,
    pub fin: bool,
}

/// Clears the first 20 bytes of `seg` and fills in the constant fields.
pub fn prepare(seg: &mut [u8]) {
    let len = seg.len().min(TCP_HEADER_SIZE);
    seg[..len].fill(0);
    if let Some(mut tcp) = MutableTcpPacket::new(seg) {
        tcp.set_data_offset((TCP_HEADER_SIZE / 4) as u8);
        tcp.set_window(WINDOW);
    }
}

/// Turns a prepared template into a SYN with sequence number `seq`.
pub fn make_syn(seg: &mut [u8], seq: u32) {
    if let Some(mut tcp) = MutableTcpPacket::new(seg) {
        Control::Syn.apply(&mut tcp);
        tcp.set_sequence(seq);
        tcp.set_acknowledgement(0);
    }
}

/// Restamps the port pair of a segment.
pub fn modify(seg: &mut [u8], source_port: u16, destination_port: u16) {
    if let Some(mut tcp) = MutableTcpPacket::new(seg) {
        tcp.set_source(source_port);
        tcp.set_destination(destination_port);
    }
}

/// Sets sequence, acknowledgement and control flags of a prepared segment.
pub fn set_control(seg: &mut [u8], sequence: u32, acknowledgement: u32, control: Control) {
    if let Some(mut tcp) = MutableTcpPacket::new(seg) {
        tcp.set_sequence(sequence);
        tcp.set_acknowledgement(acknowledgement);
        control.apply(&mut tcp);
    }
}

/// Computes the checksum over the whole of `seg` (header plus whatever
/// payload follows it) using the IPv6 pseudo header. For a payload-less
/// probe `seg` is exactly the 20 byte header.
pub fn checksum(seg: &mut [u8], source: &Ipv6Addr, destination: &Ipv6Addr) {
    let Some(sum) = TcpPacket::new(seg).map(|tcp| ipv6_checksum(&tcp, source, destination)) else {
        return;
    };
    if let Some(mut tcp) = MutableTcpPacket::new(seg) {
        tcp.set_checksum(sum);
    }
}

/// Decodes the fixed header of a captured segment. Fails if `seg` is
/// shorter than a header or the data offset points outside of it.
pub fn decode(seg: &[u8]) -> Option<TcpHeader> {
    let tcp = TcpPacket::new(seg)?;
    let header_len = usize::from(tcp.get_data_offset()) * 4;
    if header_len < TCP_HEADER_SIZE || header_len > seg.len() {
        return None;
    }
    let flags = tcp.get_flags();
    Some(TcpHeader {
        source: tcp.get_source(),
        destination: tcp.get_destination(),
        sequence: tcp.get_sequence(),
        acknowledgement: tcp.get_acknowledgement(),
        header_len,
        syn: flags & TcpFlags::SYN != 0,
        ack: flags & TcpFlags::ACK != 0,
        rst: flags & TcpFlags::RST != 0,
        fin: flags & TcpFlags::FIN != 0,
    })
}
