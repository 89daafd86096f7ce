//! Per-service knowledge used for banner grabbing.
//!
//! Every supported service is described once by a [`Protocol`]: its name,
//! the bytes sent once the handshake completes, and how the raw response is
//! cut down to a presentable banner. Lookups are keyed by port.
//!
//! ```rust
//! use sixscan::banner;
//!
//! assert_eq!(banner::service_name(8080), "http");
//! assert_eq!(banner::probe(22), Some(&b""[..]));
//!
//! let mut raw = b"SSH-2.0-OpenSSH_9.6\r\nextra".to_vec();
//! banner::postprocess(22, &mut raw);
//! assert_eq!(raw, b"SSH-2.0-OpenSSH_9.6");
//! ```
pub mod cursor;
pub mod dns;

use std::collections::HashMap;

use once_cell::sync::Lazy;

use dns::DnsReply;

/// Service name reported for ports without a descriptor.
pub const UNKNOWN_SERVICE: &str = "unknown";

/// Literal banner for DNS servers that refuse the version query.
pub const SERVFAIL_BANNER: &[u8] = b"<SERVFAIL>";

const FTP_PROBE: &[u8] = b"HELP\r\nFEAT\r\n";

const DNS_PROBE: &[u8] = b"\x00\x1e\
\x12\x34\
\x01\x00\
\x00\x01\x00\x00\x00\x00\x00\x00\
\x07version\x04bind\x00\x00\x10\x00\x03";

const HTTP_PROBE: &[u8] = b"GET / HTTP/1.0\r\n\
Accept: */*\r\n\
User-Agent: sixscan/0.3\r\n\
\r\n";

/// How a captured response is turned into a banner.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Postprocess {
    /// Keep the response as captured.
    Verbatim,
    /// Cut at the first CRLF, else at the first NUL.
    FirstLine,
    /// Cut at the end of the HTTP header block.
    HttpHeaders,
    /// Extract the TXT answer of a `version.bind` reply.
    DnsVersion,
}

/// Everything known about one service.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Protocol {
    pub service: &'static str,
    /// Bytes sent after the handshake. Empty for services that greet first.
    pub probe: &'static [u8],
    pub postprocess: Postprocess,
}

const FTP: Protocol = Protocol {
    service: "ftp",
    probe: FTP_PROBE,
    postprocess: Postprocess::Verbatim,
};

const SSH: Protocol = Protocol {
    service: "ssh",
    probe: b"",
    postprocess: Postprocess::FirstLine,
};

const TELNET: Protocol = Protocol {
    service: "telnet",
    probe: b"",
    postprocess: Postprocess::Verbatim,
};

const DOMAIN: Protocol = Protocol {
    service: "domain",
    probe: DNS_PROBE,
    postprocess: Postprocess::DnsVersion,
};

const HTTP: Protocol = Protocol {
    service: "http",
    probe: HTTP_PROBE,
    postprocess: Postprocess::HttpHeaders,
};

static PROTOCOLS: Lazy<HashMap<u16, Protocol>> = Lazy::new(|| {
    HashMap::from([
        (21, FTP),
        (22, SSH),
        (23, TELNET),
        (53, DOMAIN),
        (80, HTTP),
        // alternate http
        (8080, HTTP),
    ])
});

/// Descriptor for `port`, if banner grabbing is defined for it.
pub fn protocol(port: u16) -> Option<&'static Protocol> {
    PROTOCOLS.get(&port)
}

/// Service name for `port`, or [`UNKNOWN_SERVICE`].
pub fn service_name(port: u16) -> &'static str {
    protocol(port).map_or(UNKNOWN_SERVICE, |p| p.service)
}

/// Bytes to send once connected to `port`. `None` means no grab is defined.
pub fn probe(port: u16) -> Option<&'static [u8]> {
    protocol(port).map(|p| p.probe)
}

/// All ports with a descriptor, ascending.
pub fn ports() -> Vec<u16> {
    let mut ports: Vec<u16> = PROTOCOLS.keys().copied().collect();
    ports.sort_unstable();
    ports
}

/// Cleans a raw response captured from `port` in place. The banner is only
/// ever shortened or replaced, and an empty result means nothing usable
/// was received.
pub fn postprocess(port: u16, banner: &mut Vec<u8>) {
    let rule = protocol(port).map_or(Postprocess::Verbatim, |p| p.postprocess);
    match rule {
        Postprocess::Verbatim => {}
        Postprocess::FirstLine => {
            if let Some(end) = find(banner, b"\r\n").or_else(|| banner.iter().position(|&b| b == 0))
            {
                banner.truncate(end);
            }
        }
        Postprocess::HttpHeaders => {
            if let Some(end) = find(banner, b"\r\n\r\n").or_else(|| find(banner, b"\n\n")) {
                banner.truncate(end);
            }
        }
        Postprocess::DnsVersion => match dns::parse_reply(banner) {
            DnsReply::Text(range) => {
                let len = range.len();
                banner.copy_within(range, 0);
                banner.truncate(len);
            }
            DnsReply::ServFail => {
                banner.clear();
                banner.extend_from_slice(SERVFAIL_BANNER);
            }
            DnsReply::Malformed => banner.clear(),
        },
    }
}

fn find(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack.windows(needle.len()).position(|w| w == needle)
}

/// Renders a banner for line-based output: printable ASCII is kept,
/// everything else becomes a `\xNN` escape.
pub fn escape(banner: &[u8]) -> String {
    banner
        .iter()
        .flat_map(|&b| std::ascii::escape_default(b))
        .map(char::from)
        .collect()
}
