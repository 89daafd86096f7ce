//! Bounds-checked reader over untrusted response bytes.

/// A forward-only cursor whose reads fail instead of running off the end.
///
/// Every read returns `None` once the buffer is exhausted and leaves the
/// position untouched in that case, so callers can bail out with `?`.
#[derive(Debug, Clone)]
pub struct ByteCursor<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> ByteCursor<'a> {
    pub const fn new(buf: &'a [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    pub const fn position(&self) -> usize {
        self.pos
    }

    pub const fn remaining(&self) -> usize {
        self.buf.len() - self.pos
    }

    /// Returns the next `n` bytes and advances past them.
    pub fn take(&mut self, n: usize) -> Option<&'a [u8]> {
        let end = self.pos.checked_add(n)?;
        let bytes = self.buf.get(self.pos..end)?;
        self.pos = end;
        Some(bytes)
    }

    pub fn skip(&mut self, n: usize) -> Option<()> {
        self.take(n).map(|_| ())
    }

    pub fn read_u8(&mut self) -> Option<u8> {
        self.take(1).map(|b| b[0])
    }

    pub fn read_u16(&mut self) -> Option<u16> {
        self.take(2).map(|b| u16::from_be_bytes([b[0], b[1]]))
    }

    pub fn read_u32(&mut self) -> Option<u32> {
        self.take(4).map(|b| u32::from_be_bytes([b[0], b[1], b[2], b[3]]))
    }

    /// Skips an encoded DNS name.
    ///
    /// A length byte with both top bits set starts a two byte compression
    /// pointer, which ends the name. Any other nonzero byte is an ordinary
    /// label of that length, and a zero byte is the root label.
    pub fn skip_name(&mut self) -> Option<()> {
        let start = self.pos;
        let result = self.walk_labels();
        if result.is_none() {
            self.pos = start;
        }
        result
    }

    fn walk_labels(&mut self) -> Option<()> {
        loop {
            let len = self.read_u8()?;
            if len & 0xc0 == 0xc0 {
                return self.skip(1);
            }
            if len == 0 {
                return Some(());
            }
            self.skip(usize::from(len))?;
        }
    }
}
