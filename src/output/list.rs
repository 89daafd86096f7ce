use std::io::{self, Write};

use super::{BannerRecord, OutputSink, StatusRecord};
use crate::banner;

/// Line based output, one record per line:
///
/// ```text
/// open tcp 22 2001:db8::1 1700000000
/// banner tcp 22 2001:db8::1 1700000001 ssh SSH-2.0-OpenSSH_9.6
/// ```
pub struct ListOutput<W> {
    writer: W,
}

impl<W: Write> ListOutput<W> {
    pub fn new(writer: W) -> Self {
        Self { writer }
    }

    pub fn into_inner(self) -> W {
        self.writer
    }
}

impl<W: Write + Send> OutputSink for ListOutput<W> {
    fn begin(&mut self) -> io::Result<()> {
        Ok(())
    }

    fn status(&mut self, record: &StatusRecord) -> io::Result<()> {
        writeln!(
            self.writer,
            "{} tcp {} {} {}",
            record.status.as_str(),
            record.port,
            record.address,
            record.timestamp
        )
    }

    fn banner(&mut self, record: &BannerRecord) -> io::Result<()> {
        writeln!(
            self.writer,
            "banner tcp {} {} {} {} {}",
            record.port,
            record.address,
            record.timestamp,
            record.service,
            banner::escape(&record.banner)
        )
    }

    fn end(&mut self) -> io::Result<()> {
        self.writer.flush()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::output::tests::{banner, status};
    use crate::output::PortStatus;

    #[test]
    fn list_lines() {
        let mut out = ListOutput::new(Vec::new());
        out.begin().unwrap();
        out.status(&status(PortStatus::Open)).unwrap();
        out.status(&status(PortStatus::Closed)).unwrap();
        out.banner(&banner(b"SSH-2.0-x\r\n")).unwrap();
        out.end().unwrap();

        let text = String::from_utf8(out.into_inner()).unwrap();
        assert_eq!(
            text,
            "open tcp 22 2001:db8::1 1700000000\n\
             closed tcp 22 2001:db8::1 1700000000\n\
             banner tcp 22 2001:db8::1 1700000001 ssh SSH-2.0-x\\r\\n\n"
        );
    }
}
