//! A tiny fixed-capacity line buffer so the diagnostic dump code can use
//! `core::fmt::Write` without an allocator.

use core::fmt;

pub(crate) struct Line<const CAPACITY: usize = 160> {
    buf: [u8; CAPACITY],
    len: usize,
}

impl<const CAPACITY: usize> Line<CAPACITY> {
    pub(crate) fn new() -> Self {
        Self {
            buf: [0; CAPACITY],
            len: 0,
        }
    }

    pub(crate) fn as_str(&self) -> &str {
        core::str::from_utf8(&self.buf[..self.len]).unwrap_or("")
    }
}

impl<const CAPACITY: usize> fmt::Write for Line<CAPACITY> {
    fn write_str(&mut self, s: &str) -> fmt::Result {
        let bytes = s.as_bytes();
        let remaining = self.buf.len() - self.len;
        let n = bytes.len().min(remaining);
        self.buf[self.len..self.len + n].copy_from_slice(&bytes[..n]);
        self.len += n;
        Ok(())
    }
}
