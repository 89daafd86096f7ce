//! [`Transport`] backed by a pnet datalink channel.
use std::io;
use std::net::Ipv6Addr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use log::debug;
use pnet::datalink::{self, Channel, DataLinkReceiver, DataLinkSender, NetworkInterface};
use pnet::util::MacAddr;

use super::{CaptureFilter, Transport, TransportError, FRAME_ETH_SIZE};

/// How long a blocked read waits before re-checking the stop flag.
const READ_TIMEOUT: Duration = Duration::from_millis(100);

pub struct DatalinkTransport {
    interface: NetworkInterface,
    tx: Mutex<Box<dyn DataLinkSender>>,
    rx: Mutex<Box<dyn DataLinkReceiver>>,
    filter: Option<CaptureFilter>,
    link_headers: bool,
    stop: AtomicBool,
}

impl DatalinkTransport {
    /// Opens an ethernet channel on `interface` with a read buffer of
    /// `snaplen` bytes.
    pub fn open(interface: &str, snaplen: usize) -> Result<Self, TransportError> {
        let iface = find_interface(interface)?;
        let config = datalink::Config {
            read_buffer_size: snaplen,
            read_timeout: Some(READ_TIMEOUT),
            ..Default::default()
        };

        let (tx, rx) = match datalink::channel(&iface, config) {
            Ok(Channel::Ethernet(tx, rx)) => (tx, rx),
            Ok(_) => return Err(TransportError::UnsupportedChannel(iface.name)),
            Err(source) => {
                return Err(TransportError::Open {
                    interface: iface.name,
                    source,
                })
            }
        };

        let link_headers =
            uses_link_headers(iface.is_loopback(), iface.is_point_to_point(), iface.mac);
        debug!(
            "Opened {} (link headers: {link_headers}, mac: {:?})",
            iface.name, iface.mac
        );

        Ok(Self {
            interface: iface,
            tx: Mutex::new(tx),
            rx: Mutex::new(rx),
            filter: None,
            link_headers,
            stop: AtomicBool::new(false),
        })
    }
}

/// Loopback frames carry a zeroed ethernet header; tun and other
/// point-to-point devices hand us bare IP packets.
fn uses_link_headers(loopback: bool, point_to_point: bool, mac: Option<MacAddr>) -> bool {
    loopback || (!point_to_point && mac.is_some_and(|mac| mac != MacAddr::zero()))
}

impl Transport for DatalinkTransport {
    fn name(&self) -> &str {
        &self.interface.name
    }

    fn has_link_headers(&self) -> bool {
        self.link_headers
    }

    fn link_address(&self) -> Option<MacAddr> {
        self.interface.mac
    }

    fn set_filter(&mut self, filter: CaptureFilter) -> Result<(), TransportError> {
        if filter.destination.is_unspecified() {
            return Err(TransportError::Filter(
                "destination address must be specified".to_owned(),
            ));
        }
        self.filter = Some(filter);
        Ok(())
    }

    fn send(&self, frame: &[u8]) -> Result<(), TransportError> {
        let frame = if self.link_headers {
            frame
        } else {
            frame.get(FRAME_ETH_SIZE..).unwrap_or_default()
        };
        let mut tx = self
            .tx
            .lock()
            .map_err(|_| TransportError::Send(io::Error::other("sender lock poisoned")))?;
        match tx.send_to(frame, None) {
            Some(result) => result.map_err(TransportError::Send),
            None => Err(TransportError::Send(io::Error::other(
                "channel does not support sending",
            ))),
        }
    }

    fn capture_loop(&self, handler: &mut dyn FnMut(u64, &[u8])) -> Result<(), TransportError> {
        let mut rx = self
            .rx
            .lock()
            .map_err(|_| TransportError::Capture(io::Error::other("receiver lock poisoned")))?;

        while !self.stop.load(Ordering::Acquire) {
            match rx.next() {
                Ok(frame) => {
                    if self
                        .filter
                        .is_some_and(|f| !f.matches(frame, self.link_headers))
                    {
                        continue;
                    }
                    let ts = u64::try_from(chrono::Utc::now().timestamp()).unwrap_or_default();
                    handler(ts, frame);
                }
                Err(e)
                    if matches!(
                        e.kind(),
                        io::ErrorKind::TimedOut | io::ErrorKind::WouldBlock | io::ErrorKind::Interrupted
                    ) => {}
                Err(e) => return Err(TransportError::Capture(e)),
            }
        }
        Ok(())
    }

    fn break_loop(&self) {
        self.stop.store(true, Ordering::Release);
    }
}

fn find_interface(name: &str) -> Result<NetworkInterface, TransportError> {
    datalink::interfaces()
        .into_iter()
        .find(|iface| iface.name == name)
        .ok_or_else(|| TransportError::NoSuchInterface(name.to_owned()))
}

/// Picks the first interface that is up, not a loopback and has a global
/// IPv6 address.
pub fn default_interface() -> Option<String> {
    datalink::interfaces()
        .into_iter()
        .find(|iface| iface.is_up() && !iface.is_loopback() && global_ipv6(iface).is_some())
        .map(|iface| iface.name)
}

/// First global IPv6 address configured on `interface`.
pub fn interface_ipv6(interface: &str) -> Result<Option<Ipv6Addr>, TransportError> {
    find_interface(interface).map(|iface| global_ipv6(&iface))
}

fn global_ipv6(iface: &NetworkInterface) -> Option<Ipv6Addr> {
    iface.ips.iter().find_map(|net| match net.ip() {
        std::net::IpAddr::V6(addr) if !is_link_local(addr) && !addr.is_loopback() => Some(addr),
        _ => None,
    })
}

const fn is_link_local(addr: Ipv6Addr) -> bool {
    (addr.segments()[0] & 0xffc0) == 0xfe80
}
