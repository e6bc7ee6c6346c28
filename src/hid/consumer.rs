//! Consumer Control report (report ID 2) - volume and mute.
//!
//! Consumer keys are momentary: every non-zero report is followed by an
//! all-zero report of the same length.

/// Report ID of the consumer collection in [`super::HID_REPORT_MAP`].
pub const CONSUMER_REPORT_ID: u8 = 0x02;

/// Consumer report size in bytes (report ID + 16-bit usage).
pub const CONSUMER_REPORT_SIZE: usize = 3;

/// Consumer usages the pad can emit (Usage Page 0x0C).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(u16)]
pub enum ConsumerUsage {
    VolumeUp = 0x00E9,
    VolumeDown = 0x00EA,
    Mute = 0x00E2,
}

impl ConsumerUsage {
    pub const fn code(self) -> u16 {
        self as u16
    }
}

/// Consumer Control HID report holding a single usage.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct ConsumerReport {
    /// Active usage (little-endian on the wire), 0 when released.
    pub usage: u16,
}

impl ConsumerReport {
    pub const fn release() -> Self {
        Self { usage: 0 }
    }

    pub const fn new(usage: ConsumerUsage) -> Self {
        Self {
            usage: usage.code(),
        }
    }

    /// Serialize to report bytes, report ID first.
    pub fn serialize(&self, buf: &mut [u8]) -> usize {
        if buf.len() < CONSUMER_REPORT_SIZE {
            return 0;
        }
        let bytes = self.usage.to_le_bytes();
        buf[0] = CONSUMER_REPORT_ID;
        buf[1] = bytes[0];
        buf[2] = bytes[1];
        CONSUMER_REPORT_SIZE
    }

    pub fn to_bytes(&self) -> [u8; CONSUMER_REPORT_SIZE] {
        let mut buf = [0u8; CONSUMER_REPORT_SIZE];
        self.serialize(&mut buf);
        buf
    }

    pub fn is_empty(&self) -> bool {
        self.usage == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn volume_up_is_little_endian() {
        let report = ConsumerReport::new(ConsumerUsage::VolumeUp);
        assert_eq!(report.to_bytes(), [0x02, 0xE9, 0x00]);
    }

    #[test]
    fn release_is_all_zero_payload() {
        let report = ConsumerReport::release();
        assert!(report.is_empty());
        assert_eq!(report.to_bytes(), [0x02, 0x00, 0x00]);
    }

    #[test]
    fn serialize_buffer_too_small() {
        let mut buf = [0u8; 2];
        assert_eq!(ConsumerReport::new(ConsumerUsage::Mute).serialize(&mut buf), 0);
    }
}
