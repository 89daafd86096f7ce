//! The receive engine: classify captured replies, feed the responder.
use std::fmt;

use log::{debug, error, warn};
use pnet::packet::ethernet::EtherTypes;
use pnet::packet::ip::IpNextHeaderProtocols;

use super::config::ScanConfig;
use super::counters::Counters;
use crate::net::frame::{self, IpHeader};
use crate::net::tcp::{self, TcpHeader};
use crate::net::{Transport, FRAME_ETH_SIZE, FRAME_IP_SIZE, TCP_HEADER_SIZE};
use crate::output::{OutputSink, PortStatus, StatusRecord};
use crate::responder::Responder;

/// Why a captured frame was not looked at further.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DropReason {
    /// Shorter than the headers it claims to carry.
    Truncated(usize),
    NotIpv6,
    NotTcp,
    BadTcpHeader,
}

impl fmt::Display for DropReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Truncated(len) => write!(f, "truncated at {len} bytes"),
            Self::NotIpv6 => f.write_str("not IPv6"),
            Self::NotTcp => f.write_str("not TCP"),
            Self::BadTcpHeader => f.write_str("invalid TCP header"),
        }
    }
}

/// A captured frame that decoded down to its TCP header.
#[derive(Debug, Clone, Copy)]
pub struct Reply<'a> {
    pub ip: IpHeader,
    pub tcp: TcpHeader,
    /// The packet from the IPv6 header on.
    pub packet: &'a [u8],
}

impl Reply<'_> {
    /// SYN+ACK is open, RST+ACK is closed, anything else is not a reply to
    /// one of our probes.
    pub const fn status(&self) -> Option<PortStatus> {
        if !self.tcp.ack {
            return None;
        }
        if self.tcp.syn {
            Some(PortStatus::Open)
        } else if self.tcp.rst {
            Some(PortStatus::Closed)
        } else {
            None
        }
    }
}

/// Decodes a captured frame. Frames from interfaces without link headers
/// start directly with the IPv6 header; lengths are accounted as if the
/// 14 byte Ethernet header were there.
pub fn decode_reply(frame: &[u8], link_headers: bool) -> Result<Reply<'_>, DropReason> {
    let packet = if link_headers {
        if frame.len() < FRAME_ETH_SIZE {
            return Err(DropReason::Truncated(frame.len()));
        }
        if frame::eth_decode(frame) != Some(EtherTypes::Ipv6) {
            return Err(DropReason::NotIpv6);
        }
        &frame[FRAME_ETH_SIZE..]
    } else {
        frame
    };
    let len = packet.len() + FRAME_ETH_SIZE;

    if packet.len() < FRAME_IP_SIZE {
        return Err(DropReason::Truncated(len));
    }
    let ip = frame::ip_decode(packet).ok_or(DropReason::NotIpv6)?;
    if ip.next_header != IpNextHeaderProtocols::Tcp {
        return Err(DropReason::NotTcp);
    }
    if packet.len() < FRAME_IP_SIZE + TCP_HEADER_SIZE {
        return Err(DropReason::Truncated(len));
    }
    let tcp = tcp::decode(&packet[FRAME_IP_SIZE..]).ok_or(DropReason::BadTcpHeader)?;

    Ok(Reply { ip, tcp, packet })
}

/// Consumes frames until the transport's capture loop returns.
pub struct ReceiveEngine<'a> {
    config: &'a ScanConfig,
    transport: &'a dyn Transport,
    counters: &'a Counters,
    output: &'a mut dyn OutputSink,
    responder: Option<&'a mut Responder>,
}

impl<'a> ReceiveEngine<'a> {
    pub fn new(
        config: &'a ScanConfig,
        transport: &'a dyn Transport,
        counters: &'a Counters,
        output: &'a mut dyn OutputSink,
        responder: Option<&'a mut Responder>,
    ) -> Self {
        Self {
            config,
            transport,
            counters,
            output,
            responder,
        }
    }

    pub fn run(mut self) {
        let transport = self.transport;
        let link_headers = transport.has_link_headers();

        match transport.capture_loop(&mut |ts, frame| self.handle(ts, frame, link_headers)) {
            Ok(()) => debug!("Capture loop stopped"),
            Err(e) => error!("An error occurred in packet capture: {e}"),
        }
    }

    fn handle(&mut self, ts: u64, frame: &[u8], link_headers: bool) {
        self.counters.record_received();

        let reply = match decode_reply(frame, link_headers) {
            Ok(reply) => reply,
            Err(reason) => {
                debug!("Dropped frame of {} bytes: {reason}", frame.len());
                return;
            }
        };

        if let Some(status) = reply.status() {
            if status == PortStatus::Open || self.config.show_closed {
                let record = StatusRecord {
                    timestamp: ts,
                    address: reply.ip.source,
                    port: reply.tcp.source,
                    local_port: reply.tcp.destination,
                    ttl: reply.ip.hop_limit,
                    status,
                };
                if let Err(e) = self.output.status(&record) {
                    warn!("Failed to write result: {e}");
                }
            }
        }

        if let Some(responder) = self.responder.as_deref_mut() {
            responder.process(ts, reply.packet, self.transport, &mut *self.output);
        }
    }
}
