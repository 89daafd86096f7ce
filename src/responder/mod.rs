//! Banner grabbing on top of the stateless scan.
//!
//! The receive engine hands every decoded TCP packet to the [`Responder`].
//! A SYN+ACK answering one of our probes on a port with a known protocol
//! opens a slot in the [`TcpStateTable`]: the handshake is completed, the
//! protocol's probe is sent and in-order payload is collected. A slot is
//! closed by FIN or RST from the remote, a full buffer, the banner timeout
//! or [`Responder::finish`]. Closing resets the connection and emits the
//! postprocessed banner, if any is left.
mod table;

pub use table::{ConnKey, Connection, TableFull, TcpStateTable, BANNER_CAPACITY};

use std::net::Ipv6Addr;
use std::time::{Duration, Instant};

use log::{debug, warn};
use pnet::packet::ethernet::EtherTypes;

use crate::banner;
use crate::net::frame::{self, eth_prepare, ip_modify, ip_prepare};
use crate::net::tcp::{self, Control, TcpHeader, FIRST_SEQNUM};
use crate::net::{LinkAddrs, Transport, FRAME_ETH_SIZE, FRAME_IP_SIZE, PROBE_SIZE, TCP_HEADER_SIZE};
use crate::output::{BannerRecord, OutputSink};

/// Minimum time between two scans of the table for expired slots.
const SWEEP_INTERVAL: Duration = Duration::from_millis(100);

const TCP_OFFSET: usize = FRAME_ETH_SIZE + FRAME_IP_SIZE;

pub struct Responder {
    table: TcpStateTable,
    source: Ipv6Addr,
    link: LinkAddrs,
    timeout: Duration,
    last_sweep: Option<Instant>,
    frame: Vec<u8>,
}

impl Responder {
    /// Sets up a responder with room for `capacity` concurrent grabs,
    /// sending from `source` with the given link addresses.
    pub fn init(capacity: usize, source: Ipv6Addr, link: LinkAddrs, timeout: Duration) -> Self {
        debug!("Banner responder with {capacity} slots, timeout {timeout:?}");
        Self {
            table: TcpStateTable::with_capacity(capacity),
            source,
            link,
            timeout,
            last_sweep: None,
            frame: Vec::with_capacity(PROBE_SIZE + BANNER_CAPACITY),
        }
    }

    /// Number of grabs in progress.
    pub fn pending(&self) -> usize {
        self.table.len()
    }

    pub const fn capacity(&self) -> usize {
        self.table.capacity()
    }

    /// Ingests one captured packet, starting at its IPv6 header.
    pub fn process(
        &mut self,
        ts: u64,
        packet: &[u8],
        transport: &dyn Transport,
        output: &mut dyn OutputSink,
    ) {
        self.process_at(Instant::now(), ts, packet, transport, output);
    }

    /// [`Responder::process`] with an explicit clock reading.
    pub fn process_at(
        &mut self,
        now: Instant,
        ts: u64,
        packet: &[u8],
        transport: &dyn Transport,
        output: &mut dyn OutputSink,
    ) {
        self.sweep(now, ts, transport, output);

        let Some(ip) = frame::ip_decode(packet) else {
            return;
        };
        // trailing link padding is not payload
        let end = (FRAME_IP_SIZE + usize::from(ip.payload_length)).min(packet.len());
        let Some(tcp) = packet.get(FRAME_IP_SIZE..end).and_then(tcp::decode) else {
            return;
        };
        let payload = &packet[FRAME_IP_SIZE + tcp.header_len..end];
        let key = ConnKey {
            remote: ip.source,
            remote_port: tcp.source,
            local_port: tcp.destination,
        };

        if self.table.get_mut(&key).is_some() {
            self.advance(key, &tcp, payload, ts, transport, output);
        } else {
            self.open(now, key, &tcp, transport);
        }
    }

    /// Closes every grab still in progress.
    pub fn finish(&mut self, transport: &dyn Transport, output: &mut dyn OutputSink) {
        let ts = u64::try_from(chrono::Utc::now().timestamp()).unwrap_or_default();
        let pending = self.table.drain();
        debug!("Flushing {} banner grabs", pending.len());
        for (key, conn) in pending {
            self.close(key, conn, ts, transport, output);
        }
    }

    fn open(&mut self, now: Instant, key: ConnKey, tcp: &TcpHeader, transport: &dyn Transport) {
        if !(tcp.syn && tcp.ack) || tcp.rst || tcp.acknowledgement != FIRST_SEQNUM.wrapping_add(1)
        {
            return;
        }
        let Some(probe) = banner::probe(key.remote_port) else {
            return;
        };

        let local = FIRST_SEQNUM.wrapping_add(1);
        let remote_next = tcp.sequence.wrapping_add(1);
        let conn = Connection::new(now, remote_next, local.wrapping_add(probe.len() as u32));
        if self.table.insert(key, conn).is_err() {
            debug!(
                "TCP state table full, not grabbing [{}]:{}",
                key.remote, key.remote_port
            );
            return;
        }

        self.send(key, local, remote_next, Control::Ack, &[], transport);
        if !probe.is_empty() {
            self.send(key, local, remote_next, Control::PshAck, probe, transport);
        }
    }

    fn advance(
        &mut self,
        key: ConnKey,
        tcp: &TcpHeader,
        payload: &[u8],
        ts: u64,
        transport: &dyn Transport,
        output: &mut dyn OutputSink,
    ) {
        if tcp.syn {
            // retransmitted SYN+ACK, our ACK is already out
            return;
        }
        let Some(conn) = self.table.get_mut(&key) else {
            return;
        };

        let mut done = tcp.rst || tcp.fin;
        if !payload.is_empty() && !tcp.rst && tcp.sequence == conn.remote_next {
            conn.append(payload);
            conn.remote_next = conn.remote_next.wrapping_add(payload.len() as u32);
            done |= conn.is_full();
            let (seq, ack) = (conn.local_next, conn.remote_next);
            self.send(key, seq, ack, Control::Ack, &[], transport);
        }

        if done {
            if let Some(conn) = self.table.remove(&key) {
                self.close(key, conn, ts, transport, output);
            }
        }
    }

    fn sweep(&mut self, now: Instant, ts: u64, transport: &dyn Transport, output: &mut dyn OutputSink) {
        if self
            .last_sweep
            .is_some_and(|last| now.saturating_duration_since(last) < SWEEP_INTERVAL)
        {
            return;
        }
        self.last_sweep = Some(now);

        for key in self.table.expired(now, self.timeout) {
            if let Some(conn) = self.table.remove(&key) {
                debug!("Banner grab from [{}]:{} timed out", key.remote, key.remote_port);
                self.close(key, conn, ts, transport, output);
            }
        }
    }

    fn close(
        &mut self,
        key: ConnKey,
        conn: Connection,
        ts: u64,
        transport: &dyn Transport,
        output: &mut dyn OutputSink,
    ) {
        self.send(key, conn.local_next, conn.remote_next, Control::RstAck, &[], transport);

        let mut banner = conn.buffer;
        banner::postprocess(key.remote_port, &mut banner);
        if banner.is_empty() {
            return;
        }
        let record = BannerRecord {
            timestamp: ts,
            address: key.remote,
            port: key.remote_port,
            service: banner::service_name(key.remote_port),
            banner,
        };
        if let Err(e) = output.banner(&record) {
            warn!("Failed to write banner: {e}");
        }
    }

    fn send(
        &mut self,
        key: ConnKey,
        sequence: u32,
        acknowledgement: u32,
        control: Control,
        payload: &[u8],
        transport: &dyn Transport,
    ) {
        self.frame.clear();
        self.frame.resize(PROBE_SIZE + payload.len(), 0);

        eth_prepare(&mut self.frame, &self.link, EtherTypes::Ipv6);
        let ip = &mut self.frame[FRAME_ETH_SIZE..];
        ip_prepare(ip, self.source);
        ip_modify(ip, (TCP_HEADER_SIZE + payload.len()) as u16, key.remote);

        let seg = &mut self.frame[TCP_OFFSET..];
        tcp::prepare(seg);
        tcp::modify(seg, key.local_port, key.remote_port);
        tcp::set_control(seg, sequence, acknowledgement, control);
        seg[TCP_HEADER_SIZE..].copy_from_slice(payload);
        tcp::checksum(seg, &self.source, &key.remote);

        if let Err(e) = transport.send(&self.frame) {
            debug!("Reply to [{}]:{} not sent: {e}", key.remote, key.remote_port);
        }
    }
}
