//! Newline framing shared by the console, the companion UART and the BLE
//! serial pipe.

use alloc::vec::Vec;

/// Accumulates bytes and hands back complete `\n`-terminated lines.
///
/// A tail longer than `limit` without a terminator is discarded so a
/// peer that never sends `\n` cannot grow the buffer without bound.
#[derive(Clone, Debug)]
pub struct LineBuffer {
    buf: Vec<u8>,
    limit: usize,
}

impl LineBuffer {
    pub const fn new(limit: usize) -> Self {
        Self {
            buf: Vec::new(),
            limit,
        }
    }

    /// Bytes waiting for a terminator.
    pub fn pending(&self) -> usize {
        self.buf.len()
    }

    pub fn clear(&mut self) {
        self.buf.clear();
    }

    /// Append `data`; return the complete lines it finished, without
    /// their terminators. Empty lines are skipped.
    pub fn push(&mut self, data: &[u8]) -> Vec<Vec<u8>> {
        self.buf.extend_from_slice(data);

        let mut lines = Vec::new();
        let mut start = 0;
        while let Some(offset) = self.buf[start..].iter().position(|&b| b == b'\n') {
            if offset > 0 {
                lines.push(self.buf[start..start + offset].to_vec());
            }
            start += offset + 1;
        }
        self.buf.drain(..start);

        if self.buf.len() > self.limit {
            warn!("lines: {} bytes without a newline, discarding", self.buf.len());
            self.buf.clear();
        }
        lines
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn splits_and_keeps_tail() {
        let mut lb = LineBuffer::new(64);
        let lines = lb.push(b"ab\n\ncd\nef");
        assert_eq!(lines, [b"ab".to_vec(), b"cd".to_vec()]);
        assert_eq!(lb.pending(), 2);
        assert_eq!(lb.push(b"\n"), [b"ef".to_vec()]);
        assert_eq!(lb.pending(), 0);
    }

    #[test]
    fn runaway_tail_discarded() {
        let mut lb = LineBuffer::new(4);
        assert!(lb.push(b"12345").is_empty());
        assert_eq!(lb.pending(), 0);
        assert_eq!(lb.push(b"ok\n"), [b"ok".to_vec()]);
    }
}
