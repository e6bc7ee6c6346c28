//! Active central connections, shared by the HID and serial characteristics.

use heapless::Vec;

use super::ConnHandle;
use crate::config::BLE_MAX_CONNECTIONS;

#[derive(Clone, Debug, Default)]
pub struct ConnectionSet {
    handles: Vec<ConnHandle, BLE_MAX_CONNECTIONS>,
}

impl ConnectionSet {
    pub const fn new() -> Self {
        Self { handles: Vec::new() }
    }

    /// Returns `false` if the set is full. Re-inserting is a no-op.
    pub fn insert(&mut self, handle: ConnHandle) -> bool {
        if self.contains(handle) {
            return true;
        }
        self.handles.push(handle).is_ok()
    }

    /// Returns `true` if the handle was present.
    pub fn remove(&mut self, handle: ConnHandle) -> bool {
        match self.handles.iter().position(|&h| h == handle) {
            Some(i) => {
                self.handles.swap_remove(i);
                true
            }
            None => false,
        }
    }

    pub fn contains(&self, handle: ConnHandle) -> bool {
        self.handles.contains(&handle)
    }

    pub fn len(&self) -> usize {
        self.handles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handles.is_empty()
    }

    pub fn is_full(&self) -> bool {
        self.handles.is_full()
    }

    /// Snapshot, so callers can prune while iterating.
    pub fn snapshot(&self) -> Vec<ConnHandle, BLE_MAX_CONNECTIONS> {
        self.handles.clone()
    }
}
