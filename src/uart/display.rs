//! Display-update record pushed to the companion MCU.
//!
//! ```text
//! [0x04][len][profile][len][mode][keycount][len][lastkey][backlight 0|1][brightness]
//! ```
//! Strings are UTF-8 with a one-byte length prefix.

use crate::config::UART_DISPLAY_COMMAND;

/// Which transport the host sees the macropad on.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum OutputMode {
    Bluetooth,
    Usb,
}

impl OutputMode {
    /// Bluetooth while any central is connected, USB otherwise.
    pub fn from_ble_connections(count: usize) -> Self {
        if count > 0 {
            OutputMode::Bluetooth
        } else {
            OutputMode::Usb
        }
    }

    pub const fn as_str(self) -> &'static str {
        match self {
            OutputMode::Bluetooth => "bluetooth",
            OutputMode::Usb => "usb",
        }
    }
}

/// Snapshot of everything the companion display shows.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct DisplayState<'a> {
    pub profile: &'a str,
    pub mode: OutputMode,
    pub key_count: u8,
    pub last_key: &'a str,
    pub backlight_enabled: bool,
    pub brightness: u8,
}

impl DisplayState<'_> {
    /// Encoded size of this record.
    pub fn encoded_len(&self) -> usize {
        1 + 1
            + field(self.profile).len()
            + 1
            + field(self.mode.as_str()).len()
            + 1
            + 1
            + field(self.last_key).len()
            + 2
    }

    /// Serialize into `buf`. Returns bytes written, or 0 if `buf` is too small.
    pub fn serialize(&self, buf: &mut [u8]) -> usize {
        let len = self.encoded_len();
        if buf.len() < len {
            return 0;
        }

        let mut at = 0;
        let mut put = |bytes: &[u8]| {
            buf[at..at + bytes.len()].copy_from_slice(bytes);
            at += bytes.len();
        };
        put(&[UART_DISPLAY_COMMAND]);
        put_prefixed(&mut put, self.profile);
        put_prefixed(&mut put, self.mode.as_str());
        put(&[self.key_count]);
        put_prefixed(&mut put, self.last_key);
        put(&[u8::from(self.backlight_enabled), self.brightness]);
        len
    }
}

/// A length prefix is one byte, so longer strings are cut at 255 bytes.
fn field(s: &str) -> &[u8] {
    let bytes = s.as_bytes();
    &bytes[..bytes.len().min(u8::MAX as usize)]
}

fn put_prefixed(put: &mut impl FnMut(&[u8]), s: &str) {
    let bytes = field(s);
    put(&[bytes.len() as u8]);
    put(bytes);
}
