//! Companion-MCU link.
//!
//! Outbound, the bridge pushes [`display::DisplayState`] records. Inbound,
//! it frames the byte stream into lines and classifies each one as
//! [`telemetry::Telemetry`] for relay to the control channel.

pub mod display;
pub mod telemetry;

#[cfg(feature = "embedded")]
pub mod port;

use alloc::vec::Vec;

use crate::config::UART_LINE_LIMIT;
use crate::error::Error;
use crate::lines::LineBuffer;
use display::DisplayState;
use telemetry::{classify, Telemetry};

/// Non-blocking byte link (companion UART, USB console).
pub trait SerialLink {
    /// Copy whatever has arrived into `buf` without waiting. Returns the
    /// number of bytes copied.
    fn read_available(&mut self, buf: &mut [u8]) -> usize;

    /// Queue `data` for transmission, whole or not at all.
    fn write_all(&mut self, data: &[u8]) -> Result<(), Error>;
}

/// Queue `data` whole or not at all. `free` is the room left in the
/// queue; `push` writes a prefix and returns how much it took. A ring
/// buffer stops short at its wraparound, so `push` may run twice.
pub fn queue_whole(data: &[u8], free: usize, mut push: impl FnMut(&[u8]) -> usize) -> bool {
    if data.len() > free {
        return false;
    }
    let mut rest = data;
    while !rest.is_empty() {
        let n = push(rest);
        if n == 0 {
            return false;
        }
        rest = &rest[n..];
    }
    true
}

/// Longest display record: three strings of at most 255 bytes plus framing.
const DISPLAY_RECORD_MAX: usize = 1 + 3 * 256 + 3;

pub struct UartBridge<L: SerialLink> {
    link: L,
    lines: LineBuffer,
}

impl<L: SerialLink> UartBridge<L> {
    pub fn new(link: L) -> Self {
        Self {
            link,
            lines: LineBuffer::new(UART_LINE_LIMIT),
        }
    }

    pub fn link(&self) -> &L {
        &self.link
    }

    pub fn link_mut(&mut self) -> &mut L {
        &mut self.link
    }

    pub fn send_display(&mut self, state: &DisplayState<'_>) -> Result<(), Error> {
        let mut buf = [0u8; DISPLAY_RECORD_MAX];
        let n = state.serialize(&mut buf);
        if n == 0 {
            return Err(Error::BufferOverflow);
        }
        trace!(
            "uart: display update mode={} keys={} last={}",
            state.mode.as_str(),
            state.key_count,
            state.last_key
        );
        self.link.write_all(&buf[..n])
    }

    /// Drain pending input and classify every completed line.
    pub fn poll(&mut self) -> Vec<Telemetry> {
        let mut out = Vec::new();
        let mut chunk = [0u8; 64];
        loop {
            let n = self.link.read_available(&mut chunk);
            if n == 0 {
                break;
            }
            for line in self.lines.push(&chunk[..n]) {
                if let Some(t) = classify(&line) {
                    out.push(t);
                }
            }
        }
        out
    }
}
