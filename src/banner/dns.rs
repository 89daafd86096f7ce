//! Extraction of the `version.bind` TXT answer from a TCP-framed DNS reply.
use std::ops::Range;

use super::cursor::ByteCursor;

const HEADER_LEN: usize = 12;
const FLAG_RESPONSE: u16 = 0x8000;
const RCODE_MASK: u16 = 0x000f;
const TYPE_TXT: u16 = 16;

/// What a DNS reply turned out to contain.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DnsReply {
    /// Position of the first TXT string of the answer within the buffer.
    Text(Range<usize>),
    /// The server answered, but not with a successful response.
    ServFail,
    /// Truncated or structurally invalid message.
    Malformed,
}

/// Walks a reply to the query sent by the domain probe: a two byte TCP
/// length prefix, the header, one question and at least one answer.
pub fn parse_reply(buf: &[u8]) -> DnsReply {
    let mut cur = ByteCursor::new(buf);
    if cur.skip(2).is_none() || cur.remaining() < HEADER_LEN {
        return DnsReply::Malformed;
    }

    let Some(header) = read_header(&mut cur) else {
        return DnsReply::Malformed;
    };
    if header.flags & FLAG_RESPONSE == 0 || header.flags & RCODE_MASK != 0 {
        return DnsReply::ServFail;
    }
    if header.qdcount != 1 || header.ancount < 1 {
        return DnsReply::Malformed;
    }

    read_answer(&mut cur).map_or(DnsReply::Malformed, DnsReply::Text)
}

struct Header {
    flags: u16,
    qdcount: u16,
    ancount: u16,
}

fn read_header(cur: &mut ByteCursor<'_>) -> Option<Header> {
    let _id = cur.read_u16()?;
    let flags = cur.read_u16()?;
    let qdcount = cur.read_u16()?;
    let ancount = cur.read_u16()?;
    cur.skip(4)?; // NSCOUNT, ARCOUNT
    Some(Header {
        flags,
        qdcount,
        ancount,
    })
}

fn read_answer(cur: &mut ByteCursor<'_>) -> Option<Range<usize>> {
    // question: name, type, class
    cur.skip_name()?;
    cur.skip(4)?;

    cur.skip_name()?;
    let rr_type = cur.read_u16()?;
    let _class = cur.read_u16()?;
    let _ttl = cur.read_u32()?;
    let rdlength = usize::from(cur.read_u16()?);
    if rr_type != TYPE_TXT || rdlength < 2 {
        return None;
    }

    // Only the first character-string is reported, minus its length byte.
    let start = cur.position() + 1;
    cur.skip(rdlength)?;
    Some(start..cur.position())
}
