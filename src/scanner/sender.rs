//! The send engine: one SYN per (target, port), throttled, then done.
use std::net::Ipv6Addr;
use std::sync::{Mutex, PoisonError};

use log::{debug, warn};
use pnet::packet::ethernet::EtherTypes;
use rand::Rng;

use super::config::{ScanConfig, SourcePort};
use super::counters::{CompletionFlag, RateLimiter};
use crate::address::TargetSource;
use crate::net::frame::{eth_prepare, ip_modify, ip_prepare};
use crate::net::tcp::{self, FIRST_SEQNUM};
use crate::net::{LinkAddrs, Transport, FRAME_ETH_SIZE, FRAME_IP_SIZE, PROBE_SIZE, TCP_HEADER_SIZE};
use crate::port_strategy::PortIterator;

const TCP_OFFSET: usize = FRAME_ETH_SIZE + FRAME_IP_SIZE;

/// Draws a source port that is never zero and never below 4096.
pub fn random_source_port<R: Rng + ?Sized>(rng: &mut R) -> u16 {
    rng.random::<u16>() | 4096
}

/// A SYN frame template restamped in place for every probe.
#[derive(Debug, Clone)]
pub struct Probe {
    frame: [u8; PROBE_SIZE],
    source: Ipv6Addr,
    destination: Ipv6Addr,
}

impl Probe {
    pub fn new(link: &LinkAddrs, source: Ipv6Addr) -> Self {
        let mut frame = [0u8; PROBE_SIZE];
        eth_prepare(&mut frame, link, EtherTypes::Ipv6);
        ip_prepare(&mut frame[FRAME_ETH_SIZE..], source);
        let seg = &mut frame[TCP_OFFSET..];
        tcp::prepare(seg);
        tcp::make_syn(seg, FIRST_SEQNUM);

        Self {
            frame,
            source,
            destination: Ipv6Addr::UNSPECIFIED,
        }
    }

    pub fn set_destination(&mut self, destination: Ipv6Addr) {
        self.destination = destination;
        ip_modify(
            &mut self.frame[FRAME_ETH_SIZE..],
            TCP_HEADER_SIZE as u16,
            destination,
        );
    }

    /// Stamps the port pair and recomputes the checksum.
    pub fn stamp(&mut self, source_port: u16, destination_port: u16) {
        let seg = &mut self.frame[TCP_OFFSET..];
        tcp::modify(seg, source_port, destination_port);
        tcp::checksum(seg, &self.source, &self.destination);
    }

    pub fn frame(&self) -> &[u8] {
        &self.frame
    }
}

/// Walks the target × port space once.
pub struct SendEngine<'a> {
    config: &'a ScanConfig,
    transport: &'a dyn Transport,
    targets: &'a Mutex<Box<dyn TargetSource>>,
    limiter: RateLimiter<'a>,
    done: &'a CompletionFlag,
    link: LinkAddrs,
}

impl<'a> SendEngine<'a> {
    pub fn new(
        config: &'a ScanConfig,
        transport: &'a dyn Transport,
        targets: &'a Mutex<Box<dyn TargetSource>>,
        limiter: RateLimiter<'a>,
        done: &'a CompletionFlag,
        link: LinkAddrs,
    ) -> Self {
        Self {
            config,
            transport,
            targets,
            limiter,
            done,
            link,
        }
    }

    fn next_target(&self) -> Option<Ipv6Addr> {
        self.targets
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .next_target()
    }

    /// Sends every probe, sets the completion flag and returns the number of
    /// probes the transport accepted.
    pub fn run(self) -> u64 {
        let sent = self.send_all();
        self.done.set();
        debug!("Send engine finished after {sent} probes");
        sent
    }

    fn send_all(&self) -> u64 {
        let mut probe = Probe::new(&self.link, self.config.source_addr);
        let Some(first) = self.next_target() else {
            return 0;
        };
        probe.set_destination(first);

        let mut ports = PortIterator::new(self.config.ports.clone());
        ports.begin();
        let mut rng = rand::rng();
        let mut sent = 0u64;
        let mut failures = 0u64;

        loop {
            let Some(port) = ports.next_port() else {
                let Some(target) = self.next_target() else {
                    break;
                };
                probe.set_destination(target);
                ports.begin();
                continue;
            };

            let source_port = match self.config.source_port {
                SourcePort::Fixed(port) => port,
                SourcePort::Random => random_source_port(&mut rng),
            };
            probe.stamp(source_port, port);

            match self.transport.send(probe.frame()) {
                Ok(()) => {
                    sent += 1;
                    self.limiter.record_send();
                }
                Err(e) => {
                    if failures == 0 {
                        warn!("Sending probes failed: {e}");
                    } else {
                        debug!("Send to [{}]:{port} failed: {e}", probe.destination);
                    }
                    failures += 1;
                }
            }
        }

        if failures > 0 {
            warn!("{failures} probes could not be sent");
        }
        sent
    }
}
