//! HID output gateway: one interface, two transports.
//!
//! USB is preferred whenever a host has configured it; otherwise BLE is
//! used while at least one central is connected. The choice is made on
//! every call because either transport can come or go between calls.

use crate::clock::Millis;
use crate::error::Error;
use crate::hid::consumer::ConsumerUsage;
use crate::hid::keyboard::KeyboardReport;
use crate::hid::keycode::Keystroke;

/// A transport able to carry keyboard and consumer-control reports.
pub trait HidOutput {
    /// Ready to deliver reports right now.
    fn is_available(&self) -> bool;

    fn send_keyboard(&mut self, report: KeyboardReport, now: Millis) -> Result<(), Error>;

    /// Send a momentary consumer usage; the transport schedules the release.
    fn send_consumer(&mut self, usage: ConsumerUsage, now: Millis) -> Result<(), Error>;

    fn press(&mut self, key: Keystroke, now: Millis) -> Result<(), Error> {
        self.send_keyboard(KeyboardReport::single(key.keycode, key.modifier), now)
    }

    fn release(&mut self, now: Millis) -> Result<(), Error> {
        self.send_keyboard(KeyboardReport::empty(), now)
    }

    fn volume_up(&mut self, now: Millis) -> Result<(), Error> {
        self.send_consumer(ConsumerUsage::VolumeUp, now)
    }

    fn volume_down(&mut self, now: Millis) -> Result<(), Error> {
        self.send_consumer(ConsumerUsage::VolumeDown, now)
    }

    fn mute(&mut self, now: Millis) -> Result<(), Error> {
        self.send_consumer(ConsumerUsage::Mute, now)
    }
}

/// Which transport carried a report.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Transport {
    Usb,
    Ble,
}

/// Borrowed view of whichever transports initialised successfully.
pub struct Gateway<'a> {
    usb: Option<&'a mut dyn HidOutput>,
    ble: Option<&'a mut dyn HidOutput>,
}

impl<'a> Gateway<'a> {
    pub fn new(usb: Option<&'a mut dyn HidOutput>, ble: Option<&'a mut dyn HidOutput>) -> Self {
        Self { usb, ble }
    }

    /// Transport the next report would go to.
    pub fn active(&self) -> Option<Transport> {
        if self.usb.as_ref().is_some_and(|u| u.is_available()) {
            Some(Transport::Usb)
        } else if self.ble.as_ref().is_some_and(|b| b.is_available()) {
            Some(Transport::Ble)
        } else {
            None
        }
    }

    fn with_active(
        &mut self,
        f: impl FnOnce(&mut dyn HidOutput) -> Result<(), Error>,
    ) -> Result<Transport, Error> {
        let transport = self.active().ok_or(Error::NotInitialized)?;
        let output = match transport {
            Transport::Usb => self.usb.as_deref_mut(),
            Transport::Ble => self.ble.as_deref_mut(),
        }
        .ok_or(Error::NotInitialized)?;
        f(output).map(|()| transport)
    }

    pub fn press(&mut self, key: Keystroke, now: Millis) -> Result<Transport, Error> {
        self.with_active(|out| out.press(key, now))
    }

    pub fn release(&mut self, now: Millis) -> Result<Transport, Error> {
        self.with_active(|out| out.release(now))
    }

    pub fn consumer(&mut self, usage: ConsumerUsage, now: Millis) -> Result<Transport, Error> {
        self.with_active(|out| out.send_consumer(usage, now))
    }

    pub fn volume_up(&mut self, now: Millis) -> Result<Transport, Error> {
        self.with_active(|out| out.volume_up(now))
    }

    pub fn volume_down(&mut self, now: Millis) -> Result<Transport, Error> {
        self.with_active(|out| out.volume_down(now))
    }

    pub fn mute(&mut self, now: Millis) -> Result<Transport, Error> {
        self.with_active(|out| out.mute(now))
    }
}
