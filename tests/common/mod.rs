//! An in-memory network and result sink for driving whole scans.
#![allow(dead_code)]

use std::collections::{HashMap, HashSet, VecDeque};
use std::io::{self, Write};
use std::net::Ipv6Addr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

use pnet::packet::ethernet::EtherTypes;
use pnet::util::MacAddr;

use sixscan::address::Targets;
use sixscan::input::ScanOrder;
use sixscan::net::frame::{eth_prepare, ip_decode, ip_modify, ip_prepare};
use sixscan::net::tcp::{self, Control, TcpHeader};
use sixscan::net::{
    CaptureFilter, LinkAddrs, Transport, TransportError, FRAME_ETH_SIZE, FRAME_IP_SIZE,
    TCP_HEADER_SIZE,
};
use sixscan::output::{BannerRecord, OutputSink, StatusRecord};
use sixscan::port_strategy::PortStrategy;
use sixscan::scanner::ScanConfig;

pub const LOCAL_MAC: MacAddr = MacAddr(2, 0, 0, 0, 0, 1);
pub const ROUTER_MAC: MacAddr = MacAddr(2, 0, 0, 0, 0, 0xfe);
pub const REMOTE_ISN: u32 = 0x1000;
pub const CAPTURE_TS: u64 = 1_700_000_000;

const TCP_OFFSET: usize = FRAME_ETH_SIZE + FRAME_IP_SIZE;

pub fn local() -> Ipv6Addr {
    "2001:db8::1".parse().unwrap()
}

pub fn targets_base() -> Ipv6Addr {
    "2001:db8::100".parse().unwrap()
}

/// `count` consecutive targets starting at [`targets_base`].
pub fn targets(count: u16) -> Targets {
    let base = u128::from(targets_base());
    (0..count)
        .map(|i| Ipv6Addr::from(base + u128::from(i)))
        .collect()
}

/// A config that finishes quickly against the mock network.
pub fn config(ports: &[u16], order: ScanOrder) -> ScanConfig {
    ScanConfig {
        router_mac: Some(ROUTER_MAC),
        stats_interval: Duration::from_millis(20),
        finish_wait: Duration::from_millis(200),
        ..ScanConfig::new(local(), PortStrategy::pick(ports, order))
    }
}

/// How an open port behaves once the handshake is complete.
#[derive(Debug, Clone, Copy)]
pub enum Service {
    /// Sends its banner right away.
    Greets(&'static [u8]),
    /// Answers the first payload it receives.
    Answers(&'static [u8]),
}

/// A frame the scanner sent, decoded.
#[derive(Debug, Clone)]
pub struct Sent {
    pub source: Ipv6Addr,
    pub destination: Ipv6Addr,
    pub header: TcpHeader,
    pub payload: Vec<u8>,
}

#[derive(Default)]
struct Hosts {
    open: HashSet<u16>,
    services: HashMap<u16, Service>,
    inbox: Mutex<VecDeque<Vec<u8>>>,
    sent: Mutex<Vec<Sent>>,
    stop: AtomicBool,
}

/// Every target answers like a real host: SYN+ACK from open ports, RST+ACK
/// from the rest, and services talk once connected.
#[derive(Clone)]
pub struct MockNetwork {
    link_headers: bool,
    filter: Option<CaptureFilter>,
    hosts: Arc<Hosts>,
}

impl MockNetwork {
    pub fn new(open: &[u16], services: &[(u16, Service)]) -> Self {
        Self {
            link_headers: true,
            filter: None,
            hosts: Arc::new(Hosts {
                open: open.iter().copied().collect(),
                services: services.iter().copied().collect(),
                ..Hosts::default()
            }),
        }
    }

    /// Behaves like a tun device: bare IPv6 packets in both directions.
    pub fn without_link_headers(mut self) -> Self {
        self.link_headers = false;
        self
    }

    pub fn sent(&self) -> Vec<Sent> {
        self.hosts.sent.lock().unwrap().clone()
    }

    /// Sent SYN probes only.
    pub fn probes(&self) -> Vec<Sent> {
        self.sent()
            .into_iter()
            .filter(|s| s.header.syn && !s.header.ack)
            .collect()
    }

    fn deliver(&self, to: &Sent, control: Control, seq: u32, ack: u32, payload: &[u8]) {
        let mut buf = vec![0u8; TCP_OFFSET + TCP_HEADER_SIZE + payload.len()];
        eth_prepare(&mut buf, &LinkAddrs::new(ROUTER_MAC, LOCAL_MAC), EtherTypes::Ipv6);
        ip_prepare(&mut buf[FRAME_ETH_SIZE..], to.destination);
        ip_modify(
            &mut buf[FRAME_ETH_SIZE..],
            (TCP_HEADER_SIZE + payload.len()) as u16,
            to.source,
        );
        let seg = &mut buf[TCP_OFFSET..];
        tcp::prepare(seg);
        tcp::modify(seg, to.header.destination, to.header.source);
        tcp::set_control(seg, seq, ack, control);
        seg[TCP_HEADER_SIZE..].copy_from_slice(payload);
        tcp::checksum(seg, &to.destination, &to.source);

        if !self.link_headers {
            buf.drain(..FRAME_ETH_SIZE);
        }
        self.hosts.inbox.lock().unwrap().push_back(buf);
    }

    fn talk(&self, to: &Sent, text: &[u8]) {
        let ack = to.header.sequence.wrapping_add(to.payload.len() as u32);
        self.deliver(to, Control::PshAck, REMOTE_ISN + 1, ack, text);
        self.deliver(to, Control::FinAck, REMOTE_ISN + 1 + text.len() as u32, ack, &[]);
    }
}

impl Transport for MockNetwork {
    fn name(&self) -> &str {
        "mock0"
    }

    fn has_link_headers(&self) -> bool {
        self.link_headers
    }

    fn link_address(&self) -> Option<MacAddr> {
        Some(LOCAL_MAC)
    }

    fn set_filter(&mut self, filter: CaptureFilter) -> Result<(), TransportError> {
        self.filter = Some(filter);
        Ok(())
    }

    fn send(&self, frame: &[u8]) -> Result<(), TransportError> {
        let bad = || TransportError::Send(io::Error::other("malformed frame"));
        let ip = ip_decode(&frame[FRAME_ETH_SIZE..]).ok_or_else(bad)?;
        let header = tcp::decode(&frame[TCP_OFFSET..]).ok_or_else(bad)?;
        let sent = Sent {
            source: ip.source,
            destination: ip.destination,
            header,
            payload: frame[TCP_OFFSET + header.header_len..].to_vec(),
        };

        let port = header.destination;
        if header.syn && !header.ack {
            let ack = header.sequence.wrapping_add(1);
            if self.hosts.open.contains(&port) {
                self.deliver(&sent, Control::SynAck, REMOTE_ISN, ack, &[]);
            } else {
                self.deliver(&sent, Control::RstAck, 0, ack, &[]);
            }
        } else if header.ack && !header.rst {
            match self.hosts.services.get(&port) {
                Some(Service::Greets(text))
                    if sent.payload.is_empty() && header.acknowledgement == REMOTE_ISN + 1 =>
                {
                    self.talk(&sent, text);
                }
                Some(Service::Answers(text)) if !sent.payload.is_empty() => {
                    self.talk(&sent, text);
                }
                _ => {}
            }
        }

        self.hosts.sent.lock().unwrap().push(sent);
        Ok(())
    }

    fn capture_loop(&self, handler: &mut dyn FnMut(u64, &[u8])) -> Result<(), TransportError> {
        while !self.hosts.stop.load(Ordering::Acquire) {
            let next = self.hosts.inbox.lock().unwrap().pop_front();
            match next {
                Some(frame) => {
                    if self
                        .filter
                        .map_or(true, |f| f.matches(&frame, self.link_headers))
                    {
                        handler(CAPTURE_TS, &frame);
                    }
                }
                None => thread::sleep(Duration::from_millis(1)),
            }
        }
        Ok(())
    }

    fn break_loop(&self) {
        self.hosts.stop.store(true, Ordering::Release);
    }
}

#[derive(Debug, Default)]
pub struct Recorded {
    pub began: bool,
    pub ended: bool,
    pub statuses: Vec<StatusRecord>,
    pub banners: Vec<BannerRecord>,
}

/// Keeps every record for inspection after the scan.
#[derive(Clone, Default)]
pub struct MemorySink(pub Arc<Mutex<Recorded>>);

impl MemorySink {
    pub fn boxed(&self) -> Box<dyn OutputSink> {
        Box::new(self.clone())
    }

    pub fn take(&self) -> Recorded {
        std::mem::take(&mut *self.0.lock().unwrap())
    }
}

impl OutputSink for MemorySink {
    fn begin(&mut self) -> io::Result<()> {
        self.0.lock().unwrap().began = true;
        Ok(())
    }

    fn status(&mut self, record: &StatusRecord) -> io::Result<()> {
        self.0.lock().unwrap().statuses.push(*record);
        Ok(())
    }

    fn banner(&mut self, record: &BannerRecord) -> io::Result<()> {
        self.0.lock().unwrap().banners.push(record.clone());
        Ok(())
    }

    fn end(&mut self) -> io::Result<()> {
        self.0.lock().unwrap().ended = true;
        Ok(())
    }
}

/// A writer whose bytes stay readable after it has been boxed away.
#[derive(Clone, Default)]
pub struct SharedBuf(pub Arc<Mutex<Vec<u8>>>);

impl SharedBuf {
    pub fn contents(&self) -> String {
        String::from_utf8(self.0.lock().unwrap().clone()).unwrap()
    }
}

impl Write for SharedBuf {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}
