//! Bluetooth Low Energy subsystem.
//!
//! The device runs the Nordic SoftDevice S140 in **Peripheral** role and
//! exposes two GATT services:
//!
//! 1. **HID-over-GATT** - keyboard and consumer-control input reports.
//! 2. **Serial** - a vendor read/write/notify characteristic carrying the
//!    JSON control channel as newline-delimited UTF-8.
//!
//! Stack callbacks never touch runtime state. They push [`BleEvent`]s
//! into a bounded queue which the scheduler drains once per tick and
//! feeds to [`peripheral::BlePeripheral`].

pub mod advertise;
pub mod connections;
pub mod gatt;
pub mod peripheral;
pub mod reassembly;

#[cfg(feature = "embedded")]
pub mod server;

use heapless::Vec;

use crate::config::BLE_SERIAL_MAX_WRITE;

/// SoftDevice connection handle.
pub type ConnHandle = u16;

/// Depth of the callback-to-scheduler event queue.
pub const BLE_EVENT_QUEUE_DEPTH: usize = 8;

/// Events the stack reports to the scheduler.
#[derive(Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum BleEvent {
    /// A central connected.
    Connected { handle: ConnHandle },
    /// The link is gone.
    Disconnected { handle: ConnHandle },
    /// The central wrote the serial characteristic.
    SerialWrite {
        handle: ConnHandle,
        data: Vec<u8, BLE_SERIAL_MAX_WRITE>,
    },
}

impl BleEvent {
    /// Build a serial-write event, truncating to the characteristic size.
    pub fn serial_write(handle: ConnHandle, data: &[u8]) -> Self {
        let len = data.len().min(BLE_SERIAL_MAX_WRITE);
        let mut buf = Vec::new();
        let _ = buf.extend_from_slice(&data[..len]);
        BleEvent::SerialWrite { handle, data: buf }
    }
}
