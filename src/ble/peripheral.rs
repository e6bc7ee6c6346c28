//! HID-over-GATT peripheral: connection lifecycle, report delivery and the
//! serial pipe.
//!
//! Every delay here is a deadline checked from [`BlePeripheral::poll`];
//! nothing blocks the scheduler.

use alloc::string::String;
use alloc::vec::Vec;

use super::advertise::{advertising_payload, scan_response, AdvPayload};
use super::connections::ConnectionSet;
use super::gatt::Characteristic;
use super::reassembly::Reassembler;
use super::{BleEvent, ConnHandle};
use crate::clock::{is_due, Millis, Periodic};
use crate::config::{
    BLE_ADVERTISE_RESTART_MS, BLE_CONSUMER_RELEASE_MS, BLE_KEEPALIVE_MS, BLE_MAX_CONNECTIONS,
    BLE_SERIAL_MAX_WRITE, BLE_WARMUP_DELAY_MS,
};
use crate::error::{Error, TransportError};
use crate::gateway::HidOutput;
use crate::hid::consumer::{ConsumerReport, ConsumerUsage};
use crate::hid::keyboard::KeyboardReport;

/// The GATT operations the peripheral needs from the stack.
pub trait GattRadio {
    /// Update the local attribute value (what a read returns).
    fn set_value(&mut self, characteristic: Characteristic, value: &[u8])
        -> Result<(), TransportError>;

    /// Notify one connection.
    fn notify(
        &mut self,
        conn: ConnHandle,
        characteristic: Characteristic,
        value: &[u8],
    ) -> Result<(), TransportError>;

    /// (Re)start connectable advertising.
    fn advertise(&mut self, adv_data: &[u8], scan_data: &[u8]) -> Result<(), TransportError>;
}

pub struct BlePeripheral<R: GattRadio> {
    radio: R,
    connections: ConnectionSet,
    reassembly: Reassembler,
    warmups: heapless::Vec<(ConnHandle, Millis), BLE_MAX_CONNECTIONS>,
    consumer_release_at: Option<Millis>,
    advertise_at: Option<Millis>,
    keepalive: Periodic,
    adv_data: AdvPayload,
    scan_data: AdvPayload,
}

impl<R: GattRadio> BlePeripheral<R> {
    /// Pre-write an idle input report and start advertising.
    pub fn new(mut radio: R, name: &str, now: Millis) -> Result<Self, TransportError> {
        radio.set_value(Characteristic::InputReport, &KeyboardReport::empty().to_bytes())?;

        let adv_data = advertising_payload(name);
        let scan_data = scan_response();
        radio.advertise(&adv_data, &scan_data)?;
        info!("ble: advertising as {} ({} bytes)", name, adv_data.len());

        Ok(Self {
            radio,
            connections: ConnectionSet::new(),
            reassembly: Reassembler::new(),
            warmups: heapless::Vec::new(),
            consumer_release_at: None,
            advertise_at: None,
            keepalive: Periodic::new(BLE_KEEPALIVE_MS, now),
            adv_data,
            scan_data,
        })
    }

    pub fn connections(&self) -> &ConnectionSet {
        &self.connections
    }

    pub fn connection_count(&self) -> usize {
        self.connections.len()
    }

    pub fn reassembly(&self) -> &Reassembler {
        &self.reassembly
    }

    pub fn radio(&self) -> &R {
        &self.radio
    }

    pub fn radio_mut(&mut self) -> &mut R {
        &mut self.radio
    }

    /// Apply one stack event. Returns the control-channel lines it completed.
    pub fn handle_event(&mut self, event: BleEvent, now: Millis) -> Vec<String> {
        match event {
            BleEvent::Connected { handle } => {
                self.on_connect(handle, now);
                Vec::new()
            }
            BleEvent::Disconnected { handle } => {
                self.on_disconnect(handle, now);
                Vec::new()
            }
            BleEvent::SerialWrite { handle, data } => self.reassembly.push(handle, &data),
        }
    }

    fn on_connect(&mut self, handle: ConnHandle, now: Millis) {
        if !self.connections.insert(handle) {
            warn!("ble: conn {} rejected, table full", handle);
            return;
        }
        self.reassembly.open(handle);
        self.warmups.retain(|(h, _)| *h != handle);
        let _ = self.warmups.push((handle, now.wrapping_add(BLE_WARMUP_DELAY_MS)));
        info!("ble: connected, handle {} ({} active)", handle, self.connections.len());

        // Keep accepting a second central while there is room.
        if !self.connections.is_full() {
            self.advertise_at = Some(now);
        }
    }

    fn on_disconnect(&mut self, handle: ConnHandle, now: Millis) {
        self.forget(handle);
        info!("ble: disconnected, handle {} ({} left)", handle, self.connections.len());
        self.advertise_at = Some(now.wrapping_add(BLE_ADVERTISE_RESTART_MS));
    }

    fn forget(&mut self, handle: ConnHandle) {
        self.connections.remove(handle);
        self.reassembly.close(handle);
        self.warmups.retain(|(h, _)| *h != handle);
    }

    /// Run due deadlines: connection warm-ups, consumer release,
    /// keep-alive and advertising restart.
    pub fn poll(&mut self, now: Millis) {
        let mut i = 0;
        while i < self.warmups.len() {
            let (handle, due) = self.warmups[i];
            if is_due(now, due) {
                self.warmups.swap_remove(i);
                self.warm_up(handle);
            } else {
                i += 1;
            }
        }

        if self.consumer_release_at.is_some_and(|t| is_due(now, t)) {
            self.consumer_release_at = None;
            let _ = self.broadcast(Characteristic::InputReport, &ConsumerReport::release().to_bytes());
        }

        if self.connections.is_empty() {
            self.keepalive.reset(now);
        } else if self.keepalive.poll(now) {
            trace!("ble: keep-alive");
            let _ = self.broadcast(Characteristic::InputReport, &KeyboardReport::empty().to_bytes());
        }

        if self.advertise_at.is_some_and(|t| is_due(now, t)) {
            self.advertise_at = None;
            match self.radio.advertise(&self.adv_data, &self.scan_data) {
                Ok(()) => debug!("ble: advertising restarted"),
                Err(e) => warn!("ble: advertising restart failed: {:?}", e),
            }
        }
    }

    fn warm_up(&mut self, handle: ConnHandle) {
        if !self.connections.contains(handle) {
            return;
        }
        let idle = KeyboardReport::empty().to_bytes();
        let result = self
            .radio
            .set_value(Characteristic::InputReport, &idle)
            .and_then(|()| self.radio.notify(handle, Characteristic::InputReport, &idle));
        match result {
            Ok(()) => debug!("ble: conn {} HID session warmed up", handle),
            Err(e) if e.is_stale() => {
                warn!("ble: conn {} lost during warm-up", handle);
                self.forget(handle);
            }
            Err(e) => warn!("ble: warm-up on conn {} failed: {:?}", handle, e),
        }
    }

    /// Write `value` once, then notify every connection, pruning those
    /// that turn out to be stale. Succeeds if at least one notify landed.
    fn broadcast(&mut self, characteristic: Characteristic, value: &[u8]) -> Result<(), Error> {
        if self.connections.is_empty() {
            return Err(Error::Transport(TransportError::Disconnected));
        }
        self.radio.set_value(characteristic, value)?;

        let mut delivered = false;
        let mut last_err = TransportError::Disconnected;
        for handle in self.connections.snapshot() {
            match self.radio.notify(handle, characteristic, value) {
                Ok(()) => delivered = true,
                Err(e) if e.is_stale() => {
                    warn!("ble: pruning conn {}: {:?}", handle, e);
                    self.forget(handle);
                    last_err = e;
                }
                Err(e) => {
                    debug!("ble: notify on conn {} failed: {:?}", handle, e);
                    last_err = e;
                }
            }
        }

        if delivered {
            Ok(())
        } else {
            Err(Error::Transport(last_err))
        }
    }

    /// Send one control-channel message to every connection, newline
    /// terminated and split to the characteristic size.
    pub fn send_serial(&mut self, message: &str) {
        if self.connections.is_empty() {
            return;
        }
        let mut bytes = Vec::with_capacity(message.len() + 1);
        bytes.extend_from_slice(message.as_bytes());
        bytes.push(b'\n');
        for chunk in bytes.chunks(BLE_SERIAL_MAX_WRITE) {
            if let Err(e) = self.broadcast(Characteristic::Serial, chunk) {
                debug!("ble: serial send failed: {:?}", e);
                return;
            }
        }
    }
}

impl<R: GattRadio> HidOutput for BlePeripheral<R> {
    fn is_available(&self) -> bool {
        !self.connections.is_empty()
    }

    fn send_keyboard(&mut self, report: KeyboardReport, _now: Millis) -> Result<(), Error> {
        self.broadcast(Characteristic::InputReport, &report.to_bytes())
    }

    /// Press now; the all-zero release follows from [`BlePeripheral::poll`].
    fn send_consumer(&mut self, usage: ConsumerUsage, now: Millis) -> Result<(), Error> {
        let result = self.broadcast(
            Characteristic::InputReport,
            &ConsumerReport::new(usage).to_bytes(),
        );
        self.consumer_release_at = Some(now.wrapping_add(BLE_CONSUMER_RELEASE_MS));
        result
    }
}
