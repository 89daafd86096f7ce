//! Raw frame transport and the header codecs the scan engines are built on.
//!
//! Everything in here deals in whole frames: a 14 byte Ethernet header,
//! a 40 byte IPv6 header and a 20 byte TCP header, optionally followed by
//! payload. The engines never see sockets, only the [`Transport`] trait.
pub mod datalink;
pub mod frame;
pub mod tcp;

use std::io;
use std::net::Ipv6Addr;

use pnet::packet::ethernet::EtherTypes;
use pnet::packet::ip::IpNextHeaderProtocols;

pub use frame::{LinkAddrs, FRAME_ETH_SIZE, FRAME_IP_SIZE};
pub use tcp::TCP_HEADER_SIZE;

/// Size of a payload-less probe: link + network + transport header.
pub const PROBE_SIZE: usize = FRAME_ETH_SIZE + FRAME_IP_SIZE + TCP_HEADER_SIZE;

/// Errors raised by a [`Transport`].
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("no network interface named {0:?}")]
    NoSuchInterface(String),

    #[error("interface {0} does not provide an ethernet channel")]
    UnsupportedChannel(String),

    #[error("failed to open capture on {interface}: {source}")]
    Open {
        interface: String,
        #[source]
        source: io::Error,
    },

    #[error("invalid capture filter: {0}")]
    Filter(String),

    #[error("packet send failed: {0}")]
    Send(#[source] io::Error),

    #[error("packet capture failed: {0}")]
    Capture(#[source] io::Error),
}

/// Selects which captured frames reach the receive engine.
///
/// Frames must be IPv6/TCP, addressed to `destination` and, when set,
/// to `destination_port`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CaptureFilter {
    pub destination: Ipv6Addr,
    pub destination_port: Option<u16>,
}

impl CaptureFilter {
    pub const fn new(destination: Ipv6Addr, destination_port: Option<u16>) -> Self {
        Self {
            destination,
            destination_port,
        }
    }

    /// Whether `frame` passes the filter. `link_headers` tells if the frame
    /// starts with an Ethernet header or directly with the IPv6 header.
    pub fn matches(&self, frame: &[u8], link_headers: bool) -> bool {
        let ip = if link_headers {
            match frame::eth_decode(frame) {
                Some(ty) if ty == EtherTypes::Ipv6 => &frame[FRAME_ETH_SIZE..],
                _ => return false,
            }
        } else {
            frame
        };

        let Some(header) = frame::ip_decode(ip) else {
            return false;
        };
        if header.next_header != IpNextHeaderProtocols::Tcp || header.destination != self.destination
        {
            return false;
        }

        match self.destination_port {
            None => true,
            Some(port) => tcp::decode(&ip[FRAME_IP_SIZE..])
                .is_some_and(|segment| segment.destination == port),
        }
    }
}

/// The packet I/O a scan runs on.
///
/// Implementations are shared by reference between the send and receive
/// engines, so every method takes `&self` apart from filter installation,
/// which happens before any engine starts. Dropping the transport closes it.
pub trait Transport: Send + Sync {
    /// Interface name, for diagnostics.
    fn name(&self) -> &str;

    /// Whether captured and sent frames carry an Ethernet header.
    fn has_link_headers(&self) -> bool;

    /// Hardware address of the interface, when it has one.
    fn link_address(&self) -> Option<pnet::util::MacAddr> {
        None
    }

    fn set_filter(&mut self, filter: CaptureFilter) -> Result<(), TransportError>;

    /// Transmits one frame. Frames are always built with a link header;
    /// transports without link headers strip it.
    fn send(&self, frame: &[u8]) -> Result<(), TransportError>;

    /// Blocks, handing every captured frame and its Unix timestamp to
    /// `handler`, until [`Transport::break_loop`] is called or capture fails.
    fn capture_loop(&self, handler: &mut dyn FnMut(u64, &[u8])) -> Result<(), TransportError>;

    /// Makes a running [`Transport::capture_loop`] return.
    fn break_loop(&self);
}
