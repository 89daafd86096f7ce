//! Result records and the sinks that serialise them.
//!
//! A sink sees `begin`, any number of `status` and `banner` records, then
//! `end`. Sinks are driven from the receive thread only.
mod json;
mod list;

pub use json::JsonOutput;
pub use list::ListOutput;

use std::io::{self, LineWriter, Write};
use std::net::Ipv6Addr;

use serde_derive::Serialize;

use crate::input::OutputFormat;

/// Classification of a scanned port.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum PortStatus {
    Open,
    Closed,
}

impl PortStatus {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Open => "open",
            Self::Closed => "closed",
        }
    }
}

/// One classified reply.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct StatusRecord {
    /// Capture time, Unix seconds.
    #[serde(rename = "ts")]
    pub timestamp: u64,
    #[serde(rename = "ip")]
    pub address: Ipv6Addr,
    /// Port on the target.
    pub port: u16,
    /// Port the probe was sent from.
    #[serde(skip)]
    pub local_port: u16,
    /// Hop limit of the reply as received.
    pub ttl: u8,
    pub status: PortStatus,
}

/// Service identification text grabbed from an open port.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BannerRecord {
    pub timestamp: u64,
    pub address: Ipv6Addr,
    pub port: u16,
    pub service: &'static str,
    /// Postprocessed response bytes, never empty.
    pub banner: Vec<u8>,
}

/// Destination for scan results.
pub trait OutputSink: Send {
    /// Writes any opening framing.
    fn begin(&mut self) -> io::Result<()>;

    fn status(&mut self, record: &StatusRecord) -> io::Result<()>;

    fn banner(&mut self, record: &BannerRecord) -> io::Result<()>;

    /// Writes closing framing and flushes.
    fn end(&mut self) -> io::Result<()>;
}

/// Builds the sink for `format` on top of `writer`. Output is line
/// buffered, so every finished record reaches `writer` right away.
pub fn sink_for<W>(format: OutputFormat, writer: W) -> Box<dyn OutputSink>
where
    W: Write + Send + 'static,
{
    let writer = LineWriter::new(writer);
    match format {
        OutputFormat::List => Box::new(ListOutput::new(writer)),
        OutputFormat::Json => Box::new(JsonOutput::new(writer)),
    }
}
