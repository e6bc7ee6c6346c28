//! USB side of the HID gateway.
//!
//! The nRF52840's built-in full-speed controller is driven by
//! `embassy-usb` as a composite device: one HID interface carrying the
//! shared keyboard/consumer report map, plus a CDC-ACM console for the
//! control channel. The scheduler never touches the endpoints directly;
//! it hands serialized reports to a [`ReportSink`] that the USB task
//! drains.

#[cfg(feature = "embedded")]
pub mod hid_device;

use crate::clock::Millis;
use crate::error::{Error, TransportError};
use crate::gateway::HidOutput;
use crate::hid::consumer::{ConsumerReport, ConsumerUsage};
use crate::hid::keyboard::KeyboardReport;
use crate::hid::{HidReport, MAX_REPORT_SIZE};

/// Non-blocking handoff of serialized reports to the USB endpoint task.
pub trait ReportSink {
    /// The host has configured the device.
    fn is_ready(&self) -> bool;

    /// Queue one report (report ID first). Fails when the queue is full.
    fn try_send(&mut self, report: &[u8]) -> Result<(), TransportError>;
}

/// [`HidOutput`] over a [`ReportSink`].
pub struct UsbHidOutput<S: ReportSink> {
    sink: S,
}

impl<S: ReportSink> UsbHidOutput<S> {
    pub fn new(sink: S) -> Self {
        Self { sink }
    }

    pub fn sink(&self) -> &S {
        &self.sink
    }

    fn send(&mut self, report: HidReport) -> Result<(), Error> {
        let mut buf = [0u8; MAX_REPORT_SIZE];
        let n = report.serialize(&mut buf);
        if n == 0 {
            return Err(Error::BufferOverflow);
        }
        self.sink.try_send(&buf[..n]).map_err(|e| {
            warn!("hid: usb report dropped: {:?}", e);
            Error::Transport(e)
        })
    }
}

impl<S: ReportSink> HidOutput for UsbHidOutput<S> {
    fn is_available(&self) -> bool {
        self.sink.is_ready()
    }

    fn send_keyboard(&mut self, report: KeyboardReport, _now: Millis) -> Result<(), Error> {
        self.send(HidReport::Keyboard(report))
    }

    /// USB endpoints are paced by the host, so the release is queued
    /// right behind the press.
    fn send_consumer(&mut self, usage: ConsumerUsage, _now: Millis) -> Result<(), Error> {
        self.send(HidReport::Consumer(ConsumerReport::new(usage)))?;
        self.send(HidReport::Consumer(ConsumerReport::release()))
    }
}
