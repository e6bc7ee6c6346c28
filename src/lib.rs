//! Firmware logic for a 5×4 macropad with a rotary encoder.
//!
//! The pad reports keys over USB HID when a host has configured it, and
//! over BLE HID otherwise. A JSON control channel (USB CDC console and a
//! BLE serial characteristic) edits the keymap, drives the backlight and
//! receives firmware updates. A companion MCU on the UART renders the
//! status display.
//!
//! Everything else builds on the host and is unit-tested there. The
//! SoftDevice, USB, UARTE and PWM bindings only compile with the
//! `embedded` feature; `src/main.rs` wires them to [`runtime::Runtime`].
//!
//! Usage: `cargo test` on the host, `cargo run --release --features embedded`
//! on the target.

#![cfg_attr(not(test), no_std)]

extern crate alloc;

#[macro_use]
mod fmt;

pub mod backlight;
pub mod ble;
pub mod clock;
pub mod config;
pub mod control;
pub mod encoder;
pub mod error;
pub mod gateway;
pub mod hid;
pub mod keymap;
pub mod lines;
pub mod matrix;
pub mod ota;
pub mod runtime;
pub mod storage;
pub mod uart;
pub mod usb;

pub use error::{Error, OtaError, StoreError, TransportError};
pub use runtime::{Parts, Platform, Runtime, TickOutcome};
