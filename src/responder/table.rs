//! Bounded connection table for banner grabs.
use std::collections::HashMap;
use std::net::Ipv6Addr;
use std::time::{Duration, Instant};

/// Most bytes kept per connection.
pub const BANNER_CAPACITY: usize = 4096;

/// Identifies a grab by the remote endpoint and the local port it was
/// probed from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConnKey {
    pub remote: Ipv6Addr,
    pub remote_port: u16,
    pub local_port: u16,
}

/// State of one banner grab in progress.
#[derive(Debug, Clone)]
pub struct Connection {
    pub opened: Instant,
    /// Next sequence number expected from the remote.
    pub remote_next: u32,
    /// Our sequence number after the probe payload.
    pub local_next: u32,
    pub buffer: Vec<u8>,
}

impl Connection {
    pub fn new(opened: Instant, remote_next: u32, local_next: u32) -> Self {
        Self {
            opened,
            remote_next,
            local_next,
            buffer: Vec::new(),
        }
    }

    /// Appends in-order payload, returning how many bytes were kept.
    pub fn append(&mut self, payload: &[u8]) -> usize {
        let room = BANNER_CAPACITY - self.buffer.len();
        let kept = payload.len().min(room);
        self.buffer.extend_from_slice(&payload[..kept]);
        kept
    }

    pub fn is_full(&self) -> bool {
        self.buffer.len() >= BANNER_CAPACITY
    }
}

/// Returned when every slot is taken.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TableFull;

#[derive(Debug, Default)]
pub struct TcpStateTable {
    slots: HashMap<ConnKey, Connection>,
    capacity: usize,
}

impl TcpStateTable {
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            slots: HashMap::with_capacity(capacity),
            capacity,
        }
    }

    pub fn insert(&mut self, key: ConnKey, conn: Connection) -> Result<(), TableFull> {
        if self.slots.len() >= self.capacity && !self.slots.contains_key(&key) {
            return Err(TableFull);
        }
        self.slots.insert(key, conn);
        Ok(())
    }

    pub fn get_mut(&mut self, key: &ConnKey) -> Option<&mut Connection> {
        self.slots.get_mut(key)
    }

    pub fn remove(&mut self, key: &ConnKey) -> Option<Connection> {
        self.slots.remove(key)
    }

    /// Keys of the connections opened at least `timeout` before `now`.
    pub fn expired(&self, now: Instant, timeout: Duration) -> Vec<ConnKey> {
        self.slots
            .iter()
            .filter(|(_, conn)| now.saturating_duration_since(conn.opened) >= timeout)
            .map(|(key, _)| *key)
            .collect()
    }

    /// Removes and returns every connection.
    pub fn drain(&mut self) -> Vec<(ConnKey, Connection)> {
        self.slots.drain().collect()
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    pub const fn capacity(&self) -> usize {
        self.capacity
    }
}
