use std::io::{self, Write};
use std::net::Ipv6Addr;

use serde_derive::Serialize;

use super::{BannerRecord, OutputSink, StatusRecord};
use crate::banner;

/// Writes all records as one JSON array, one object per line.
pub struct JsonOutput<W> {
    writer: W,
    first: bool,
}

#[derive(Serialize)]
struct JsonBanner<'a> {
    ts: u64,
    ip: Ipv6Addr,
    port: u16,
    service: &'a str,
    banner: String,
}

impl<W: Write> JsonOutput<W> {
    pub fn new(writer: W) -> Self {
        Self {
            writer,
            first: true,
        }
    }

    pub fn into_inner(self) -> W {
        self.writer
    }

    fn separator(&mut self) -> io::Result<()> {
        if self.first {
            self.first = false;
            Ok(())
        } else {
            self.writer.write_all(b",\n")
        }
    }
}

impl<W: Write + Send> OutputSink for JsonOutput<W> {
    fn begin(&mut self) -> io::Result<()> {
        self.writer.write_all(b"[\n")
    }

    fn status(&mut self, record: &StatusRecord) -> io::Result<()> {
        self.separator()?;
        serde_json::to_writer(&mut self.writer, record).map_err(io::Error::from)
    }

    fn banner(&mut self, record: &BannerRecord) -> io::Result<()> {
        self.separator()?;
        let view = JsonBanner {
            ts: record.timestamp,
            ip: record.address,
            port: record.port,
            service: record.service,
            banner: banner::escape(&record.banner),
        };
        serde_json::to_writer(&mut self.writer, &view).map_err(io::Error::from)
    }

    fn end(&mut self) -> io::Result<()> {
        self.writer.write_all(b"\n]\n")?;
        self.writer.flush()
    }
}
