//! Per-connection line reassembly for the serial characteristic.
//!
//! Centrals split long JSON messages across several ATT writes. Bytes are
//! buffered per connection until a `\n` arrives; whatever follows the
//! last terminator stays buffered for the next write.

use alloc::string::String;
use alloc::vec::Vec;
use heapless::LinearMap;

use super::ConnHandle;
use crate::config::{BLE_MAX_CONNECTIONS, BLE_REASSEMBLY_LIMIT};
use crate::lines::LineBuffer;

#[derive(Default)]
pub struct Reassembler {
    buffers: LinearMap<ConnHandle, LineBuffer, BLE_MAX_CONNECTIONS>,
}

impl Reassembler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start a fresh, empty buffer for a new connection.
    pub fn open(&mut self, handle: ConnHandle) {
        let fresh = LineBuffer::new(BLE_REASSEMBLY_LIMIT);
        if self.buffers.insert(handle, fresh).is_err() {
            warn!("ble: no reassembly slot for conn {}", handle);
        }
    }

    /// Discard the connection's buffer.
    pub fn close(&mut self, handle: ConnHandle) {
        self.buffers.remove(&handle);
    }

    pub fn pending(&self, handle: ConnHandle) -> usize {
        self.buffers.get(&handle).map_or(0, |b| b.pending())
    }

    /// Append one write and return every complete, non-blank line it
    /// finished. Lines that are not valid UTF-8 are dropped.
    pub fn push(&mut self, handle: ConnHandle, data: &[u8]) -> Vec<String> {
        if !self.buffers.contains_key(&handle) {
            self.open(handle);
        }
        let Some(buffer) = self.buffers.get_mut(&handle) else {
            return Vec::new();
        };

        buffer
            .push(data)
            .into_iter()
            .filter_map(|line| match String::from_utf8(line) {
                Ok(text) => {
                    let text = text.trim();
                    (!text.is_empty()).then(|| String::from(text))
                }
                Err(e) => {
                    debug!("ble: dropped undecodable line ({} bytes)", e.as_bytes().len());
                    None
                }
            })
            .collect()
    }
}
