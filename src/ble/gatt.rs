//! GATT profile constants: HID-over-GATT plus the vendor serial service.

/// HID service (HOGP).
pub const HID_SERVICE_UUID16: u16 = 0x1812;

/// HID service characteristics.
#[repr(u16)]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum HidCharacteristic {
    HidInformation = 0x2A4A,
    ReportMap = 0x2A4B,
    HidControlPoint = 0x2A4C,
    Report = 0x2A4D,
    ProtocolMode = 0x2A4E,
}

impl HidCharacteristic {
    pub const fn uuid16(self) -> u16 {
        self as u16
    }
}

/// Report Reference descriptor attached to the input report.
pub const REPORT_REFERENCE_UUID16: u16 = 0x2908;

/// Report Reference value: report ID 1, input report.
pub const INPUT_REPORT_REFERENCE: [u8; 2] = [0x01, 0x01];

/// HID Information: bcdHID 1.11, not localized, remote wake.
pub const HID_INFORMATION: [u8; 4] = [0x11, 0x01, 0x00, 0x01];

/// Protocol Mode: report protocol.
pub const PROTOCOL_MODE_REPORT: u8 = 0x01;

/// Vendor serial service `0000ffe0-0000-1000-8000-00805f9b34fb`, little-endian.
pub const SERIAL_SERVICE_UUID128: [u8; 16] = [
    0xFB, 0x34, 0x9B, 0x5F, 0x80, 0x00, 0x00, 0x80, 0x00, 0x10, 0x00, 0x00, 0xE0, 0xFF, 0x00, 0x00,
];

/// Serial characteristic `0000ffe1-0000-1000-8000-00805f9b34fb`, little-endian.
pub const SERIAL_CHAR_UUID128: [u8; 16] = [
    0xFB, 0x34, 0x9B, 0x5F, 0x80, 0x00, 0x00, 0x80, 0x00, 0x10, 0x00, 0x00, 0xE1, 0xFF, 0x00, 0x00,
];

/// Characteristics the peripheral writes and notifies at runtime.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Characteristic {
    /// HID input report (keyboard and consumer share it, told apart by report ID).
    InputReport,
    /// Vendor serial byte pipe.
    Serial,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn serial_uuids_differ_only_in_short_id() {
        let diff: usize = SERIAL_SERVICE_UUID128
            .iter()
            .zip(SERIAL_CHAR_UUID128.iter())
            .filter(|(a, b)| a != b)
            .count();
        assert_eq!(diff, 1);
        assert_eq!(&SERIAL_SERVICE_UUID128[12..14], &[0xE0, 0xFF]);
    }

    #[test]
    fn hid_uuids() {
        assert_eq!(HidCharacteristic::Report.uuid16(), 0x2A4D);
        assert_eq!(HidCharacteristic::ReportMap.uuid16(), 0x2A4B);
    }
}
