//! The cooperative scheduler body.
//!
//! [`Runtime`] owns every piece of mutable device state. The platform
//! calls [`Runtime::tick`] every few milliseconds with the current time
//! and whatever BLE events arrived since the last tick; nothing inside
//! blocks or sleeps beyond the matrix column settle.

use embedded_hal::delay::DelayNs;
use embedded_hal::digital::{InputPin, OutputPin};

use crate::backlight::{Backlight, Dimmer};
use crate::ble::peripheral::{BlePeripheral, GattRadio};
use crate::ble::BleEvent;
use crate::clock::{is_due, Millis};
use crate::config::{
    BLE_DEVICE_NAME, DISPLAY_PROFILE_NAME, DISPLAY_REFRESH_MS, INITIAL_DISPLAY_DELAY_MS,
};
use crate::control::{self, Console, Context};
use crate::encoder::{Encoder, EncoderIntent};
use crate::error::Error;
use crate::gateway::{Gateway, HidOutput};
use crate::hid::keycode::{resolve, KeyAction};
use crate::keymap::{Keymap, Symbol};
use crate::matrix::{KeyEvent, Matrix};
use crate::ota::{FirmwareStore, OtaSession};
use crate::uart::display::{DisplayState, OutputMode};
use crate::uart::{SerialLink, UartBridge};
use crate::usb::{ReportSink, UsbHidOutput};

/// Concrete peripheral types for one target.
pub trait Platform {
    type Column: OutputPin;
    type Row: InputPin;
    type Delay: DelayNs;
    type EncoderPin: InputPin;
    type UsbSink: ReportSink;
    type Radio: GattRadio;
    type Console: SerialLink;
    type Uart: SerialLink;
    type Store: FirmwareStore;
    type Dimmer: Dimmer;
}

/// Everything the runtime is built from. A `None` transport failed to
/// initialise and is left out.
pub struct Parts<P: Platform> {
    pub matrix: Matrix<P::Column, P::Row, P::Delay>,
    pub encoder: Encoder<P::EncoderPin, P::EncoderPin, P::EncoderPin>,
    pub usb: Option<P::UsbSink>,
    pub radio: Option<P::Radio>,
    pub console: Option<P::Console>,
    pub uart: Option<P::Uart>,
    pub store: P::Store,
    pub dimmer: P::Dimmer,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum TickOutcome {
    Continue,
    /// A verified update is installed; reset the device now.
    Reset,
}

pub struct Runtime<P: Platform> {
    matrix: Matrix<P::Column, P::Row, P::Delay>,
    encoder: Encoder<P::EncoderPin, P::EncoderPin, P::EncoderPin>,
    usb: Option<UsbHidOutput<P::UsbSink>>,
    ble: Option<BlePeripheral<P::Radio>>,
    console: Option<Console<P::Console>>,
    uart: Option<UartBridge<P::Uart>>,
    store: P::Store,
    backlight: Backlight<P::Dimmer>,
    keymap: Keymap,
    ota: OtaSession,
    last_key: Symbol,
    next_display: Millis,
}

fn gateway<'a, S: ReportSink, R: GattRadio>(
    usb: &'a mut Option<UsbHidOutput<S>>,
    ble: &'a mut Option<BlePeripheral<R>>,
) -> Gateway<'a> {
    Gateway::new(
        usb.as_mut().map(|u| u as &mut dyn HidOutput),
        ble.as_mut().map(|b| b as &mut dyn HidOutput),
    )
}

impl<P: Platform> Runtime<P> {
    pub fn new(parts: Parts<P>, now: Millis) -> Self {
        let ble = parts.radio.and_then(|radio| {
            BlePeripheral::new(radio, BLE_DEVICE_NAME, now)
                .map_err(|e| error!("ble: init failed: {:?}", e))
                .ok()
        });
        if parts.usb.is_none() {
            error!("usb: HID unavailable");
        }
        if parts.uart.is_none() {
            error!("uart: companion link unavailable");
        }
        if parts.usb.is_none() && ble.is_none() {
            warn!("hid: no transport, keys will be scanned but not delivered");
        }

        Self {
            matrix: parts.matrix,
            encoder: parts.encoder,
            usb: parts.usb.map(UsbHidOutput::new),
            ble,
            console: parts.console.map(Console::new),
            uart: parts.uart.map(UartBridge::new),
            store: parts.store,
            backlight: Backlight::new(parts.dimmer),
            keymap: Keymap::default(),
            ota: OtaSession::new(),
            last_key: Symbol::new(),
            next_display: now.wrapping_add(INITIAL_DISPLAY_DELAY_MS),
        }
    }

    /// One pass of the scheduler.
    pub fn tick(&mut self, now: Millis, ble_events: impl IntoIterator<Item = BleEvent>) -> TickOutcome {
        self.scan_matrix(now);
        self.poll_console(now);
        self.poll_encoder(now);
        self.poll_uart();

        for event in ble_events {
            self.handle_ble_event(event, now);
        }
        if let Some(ble) = self.ble.as_mut() {
            ble.poll(now);
        }

        if is_due(now, self.next_display) {
            self.next_display = now.wrapping_add(DISPLAY_REFRESH_MS);
            self.push_display();
        }

        if self.ota.reset_due(now) {
            info!("ota: resetting into the new image");
            return TickOutcome::Reset;
        }
        TickOutcome::Continue
    }

    fn scan_matrix(&mut self, now: Millis) {
        let mut events = heapless::Vec::new();
        self.matrix.scan(now, &mut events);
        for event in events {
            self.on_key(event, now);
        }
    }

    fn on_key(&mut self, event: KeyEvent, now: Millis) {
        let Some(Ok(symbol)) = self.keymap.get(event.row, event.col).map(Symbol::try_from) else {
            return;
        };

        if let Some(json) = control::keypress(event.row, event.col) {
            self.broadcast(&json);
        }

        let action = resolve(&symbol);
        let mut gw = gateway(&mut self.usb, &mut self.ble);
        let result = match (action, event.pressed) {
            (Some(KeyAction::Key(key)), true) => {
                debug!("key: down {}", symbol.as_str());
                let result = gw.press(key, now);
                drop(gw);
                self.last_key = symbol.clone();
                self.push_display();
                result.map(|_| ())
            }
            (Some(KeyAction::Key(_)), false) => {
                debug!("key: up {}", symbol.as_str());
                gw.release(now).map(|_| ())
            }
            (Some(KeyAction::Consumer(usage)), true) => gw.consumer(usage, now).map(|_| ()),
            (Some(KeyAction::Profile), true) => {
                info!("key: profile switch requested");
                Ok(())
            }
            (Some(_), false) => Ok(()),
            (None, pressed) => {
                if pressed {
                    warn!("key: no keycode for {}", symbol.as_str());
                }
                Ok(())
            }
        };
        report_hid(result);
    }

    fn poll_encoder(&mut self, now: Millis) {
        for intent in self.encoder.poll(now) {
            let mut gw = gateway(&mut self.usb, &mut self.ble);
            let result = match intent {
                EncoderIntent::VolumeUp => gw.volume_up(now),
                EncoderIntent::VolumeDown => gw.volume_down(now),
                EncoderIntent::Mute => gw.mute(now),
            };
            report_hid(result.map(|_| ()));
        }
    }

    fn poll_console(&mut self, now: Millis) {
        let lines = match self.console.as_mut() {
            Some(console) => console.poll(),
            None => return,
        };
        for line in lines {
            self.handle_control_line(&line, now);
        }
    }

    fn poll_uart(&mut self) {
        let telemetry = match self.uart.as_mut() {
            Some(uart) => uart.poll(),
            None => return,
        };
        for t in &telemetry {
            if let Some(json) = control::telemetry(t) {
                self.broadcast(&json);
            }
        }
    }

    /// Apply one BLE stack event; complete serial lines go to the control channel.
    pub fn handle_ble_event(&mut self, event: BleEvent, now: Millis) {
        let lines = match self.ble.as_mut() {
            Some(ble) => ble.handle_event(event, now),
            None => return,
        };
        for line in lines {
            self.handle_control_line(&line, now);
        }
    }

    /// Dispatch one control-channel line and broadcast the responses.
    pub fn handle_control_line(&mut self, line: &str, now: Millis) {
        let output_mode = self.output_mode();
        let mut ctx = Context {
            keymap: &mut self.keymap,
            backlight: &mut self.backlight,
            ota: &mut self.ota,
            store: &mut self.store,
            output_mode,
        };
        let responses = control::handle_line(line, &mut ctx, now);
        for json in responses {
            self.broadcast(&json);
        }
    }

    /// Send to the USB console and every BLE serial subscriber.
    fn broadcast(&mut self, json: &str) {
        if let Some(console) = self.console.as_mut() {
            console.send(json);
        }
        if let Some(ble) = self.ble.as_mut() {
            ble.send_serial(json);
        }
    }

    fn output_mode(&self) -> OutputMode {
        OutputMode::from_ble_connections(self.ble.as_ref().map_or(0, |b| b.connection_count()))
    }

    /// Push the display record to the companion MCU.
    pub fn push_display(&mut self) {
        let state = DisplayState {
            profile: DISPLAY_PROFILE_NAME,
            mode: self.output_mode(),
            key_count: self.keymap.bound_count().min(u8::MAX as usize) as u8,
            last_key: &self.last_key,
            backlight_enabled: self.backlight.enabled(),
            brightness: self.backlight.brightness(),
        };
        if let Some(uart) = self.uart.as_mut() {
            if let Err(e) = uart.send_display(&state) {
                warn!("uart: display update failed: {:?}", e);
            }
        }
    }

    pub fn keymap(&self) -> &Keymap {
        &self.keymap
    }

    pub fn last_key(&self) -> &str {
        &self.last_key
    }

    pub fn backlight(&self) -> &Backlight<P::Dimmer> {
        &self.backlight
    }

    pub fn ota(&self) -> &OtaSession {
        &self.ota
    }

    pub fn store(&self) -> &P::Store {
        &self.store
    }

    pub fn usb(&self) -> Option<&UsbHidOutput<P::UsbSink>> {
        self.usb.as_ref()
    }

    pub fn ble(&self) -> Option<&BlePeripheral<P::Radio>> {
        self.ble.as_ref()
    }

    pub fn ble_mut(&mut self) -> Option<&mut BlePeripheral<P::Radio>> {
        self.ble.as_mut()
    }

    pub fn console(&self) -> Option<&Console<P::Console>> {
        self.console.as_ref()
    }

    pub fn console_mut(&mut self) -> Option<&mut Console<P::Console>> {
        self.console.as_mut()
    }

    pub fn uart(&self) -> Option<&UartBridge<P::Uart>> {
        self.uart.as_ref()
    }

    pub fn uart_mut(&mut self) -> Option<&mut UartBridge<P::Uart>> {
        self.uart.as_mut()
    }
}

fn report_hid(result: Result<(), Error>) {
    match result {
        Ok(()) => {}
        Err(Error::NotInitialized) => debug!("hid: no transport available, dropped"),
        Err(e) => warn!("hid: delivery failed: {:?}", e),
    }
}
