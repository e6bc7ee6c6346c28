//! Keyboard input report (report ID 1).
//!
//! Layout (9 bytes):
//! ```text
//! Byte 0: Report ID (0x01)
//! Byte 1: Modifier keys (bitfield)
//!         Bit 0 = Left Ctrl,  Bit 1 = Left Shift,
//!         Bit 2 = Left Alt,   Bit 3 = Left GUI,
//!         Bit 4 = Right Ctrl, Bit 5 = Right Shift,
//!         Bit 6 = Right Alt,  Bit 7 = Right GUI
//! Byte 2: Reserved (0x00)
//! Byte 3-8: Up to 6 key codes (only the first is used by the pad)
//! ```

/// Report ID of the keyboard collection in [`super::HID_REPORT_MAP`].
pub const KEYBOARD_REPORT_ID: u8 = 0x01;

/// Keyboard report size in bytes, report ID included.
pub const KEYBOARD_REPORT_SIZE: usize = 9;

/// Left Shift modifier bit.
pub const MODIFIER_LEFT_SHIFT: u8 = 0x02;

/// Keyboard input report with an explicit report ID.
#[derive(Clone, Copy, Default, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct KeyboardReport {
    /// Modifier key bitfield.
    pub modifier: u8,
    /// Reserved byte (always 0x00 per HID spec).
    pub reserved: u8,
    /// Up to 6 simultaneously pressed key codes.
    pub keycodes: [u8; 6],
}

impl KeyboardReport {
    /// All keys released.
    pub const fn empty() -> Self {
        Self {
            modifier: 0,
            reserved: 0,
            keycodes: [0; 6],
        }
    }

    /// One key, optionally with modifiers.
    pub const fn single(keycode: u8, modifier: u8) -> Self {
        Self {
            modifier,
            reserved: 0,
            keycodes: [keycode, 0, 0, 0, 0, 0],
        }
    }

    /// Serialise into a byte slice, report ID first.
    /// Returns the number of bytes written (0 if `buf` is too small).
    pub fn serialize(&self, buf: &mut [u8]) -> usize {
        if buf.len() < KEYBOARD_REPORT_SIZE {
            return 0;
        }
        buf[0] = KEYBOARD_REPORT_ID;
        buf[1] = self.modifier;
        buf[2] = self.reserved;
        buf[3..9].copy_from_slice(&self.keycodes);
        KEYBOARD_REPORT_SIZE
    }

    /// Fixed-size wire form.
    pub fn to_bytes(&self) -> [u8; KEYBOARD_REPORT_SIZE] {
        let mut buf = [0u8; KEYBOARD_REPORT_SIZE];
        self.serialize(&mut buf);
        buf
    }

    /// Returns `true` if no keys are pressed (release event).
    pub fn is_empty(&self) -> bool {
        self.modifier == 0 && self.keycodes.iter().all(|&k| k == 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_report_wire_form() {
        assert_eq!(
            KeyboardReport::empty().to_bytes(),
            [0x01, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00]
        );
        assert!(KeyboardReport::empty().is_empty());
    }

    #[test]
    fn single_key_with_shift() {
        let report = KeyboardReport::single(0x2E, MODIFIER_LEFT_SHIFT);
        assert_eq!(
            report.to_bytes(),
            [0x01, 0x02, 0x00, 0x2E, 0x00, 0x00, 0x00, 0x00, 0x00]
        );
        assert!(!report.is_empty());
    }

    #[test]
    fn serialize_buffer_too_small() {
        let mut buf = [0u8; 8];
        assert_eq!(KeyboardReport::empty().serialize(&mut buf), 0);
    }
}
