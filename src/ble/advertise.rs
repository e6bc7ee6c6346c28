//! Advertising and scan-response payloads.
//!
//! Advertising data carries flags, the local name and the 16-bit HID
//! service UUID. The 128-bit serial service UUID does not fit alongside
//! them and goes in the scan response.

use heapless::Vec;

use super::gatt::{HID_SERVICE_UUID16, SERIAL_SERVICE_UUID128};

/// Legacy advertising PDU payload limit.
pub const MAX_ADV_LEN: usize = 31;

pub type AdvPayload = Vec<u8, MAX_ADV_LEN>;

const AD_FLAGS: u8 = 0x01;
const AD_UUID16_COMPLETE: u8 = 0x03;
const AD_UUID128_COMPLETE: u8 = 0x07;
const AD_NAME_SHORT: u8 = 0x08;
const AD_NAME_COMPLETE: u8 = 0x09;

/// LE General Discoverable, BR/EDR not supported.
const FLAGS_GENERAL_DISCOVERABLE: u8 = 0x06;

/// Room left for name bytes after flags (3), the name header (2) and the
/// HID UUID (4).
pub const MAX_NAME_LEN: usize = MAX_ADV_LEN - 3 - 2 - 4;

/// Build the advertising payload for `name`.
///
/// A name longer than [`MAX_NAME_LEN`] bytes is cut at the last char
/// boundary that fits and advertised as a shortened name.
pub fn advertising_payload(name: &str) -> AdvPayload {
    let (name, ad_type) = if name.len() > MAX_NAME_LEN {
        (truncate_to_boundary(name, MAX_NAME_LEN), AD_NAME_SHORT)
    } else {
        (name, AD_NAME_COMPLETE)
    };

    let mut adv = AdvPayload::new();
    // Every piece is bounded above, so these pushes cannot overflow.
    let _ = adv.extend_from_slice(&[0x02, AD_FLAGS, FLAGS_GENERAL_DISCOVERABLE]);
    let _ = adv.push(name.len() as u8 + 1);
    let _ = adv.push(ad_type);
    let _ = adv.extend_from_slice(name.as_bytes());
    let _ = adv.push(0x03);
    let _ = adv.push(AD_UUID16_COMPLETE);
    let _ = adv.extend_from_slice(&HID_SERVICE_UUID16.to_le_bytes());
    adv
}

/// Scan response: the complete list of 128-bit service UUIDs.
pub fn scan_response() -> AdvPayload {
    let mut scan = AdvPayload::new();
    let _ = scan.push(SERIAL_SERVICE_UUID128.len() as u8 + 1);
    let _ = scan.push(AD_UUID128_COMPLETE);
    let _ = scan.extend_from_slice(&SERIAL_SERVICE_UUID128);
    scan
}

fn truncate_to_boundary(s: &str, max: usize) -> &str {
    let mut end = max.min(s.len());
    while !s.is_char_boundary(end) {
        end -= 1;
    }
    &s[..end]
}

/// Iterate `(ad_type, data)` pairs of an AD structure list. Stops at the
/// first malformed length.
pub fn ad_structures(data: &[u8]) -> impl Iterator<Item = (u8, &[u8])> + '_ {
    let mut i = 0;
    core::iter::from_fn(move || {
        let len = *data.get(i)? as usize;
        if len == 0 || i + len >= data.len() {
            return None;
        }
        let ad_type = data[i + 1];
        let body = &data[i + 2..i + 1 + len];
        i += len + 1;
        Some((ad_type, body))
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn name_of(adv: &[u8]) -> Option<(u8, &[u8])> {
        ad_structures(adv).find(|(t, _)| *t == AD_NAME_COMPLETE || *t == AD_NAME_SHORT)
    }

    #[test]
    fn default_name_layout() {
        let adv = advertising_payload("Macropad");
        assert_eq!(adv.len(), 3 + 2 + 8 + 4);
        assert_eq!(&adv[..3], &[0x02, 0x01, 0x06]);
        assert_eq!(name_of(&adv), Some((AD_NAME_COMPLETE, &b"Macropad"[..])));
        assert_eq!(&adv[adv.len() - 4..], &[0x03, 0x03, 0x12, 0x18]);
    }

    #[test]
    fn name_at_limit_is_complete() {
        let name = "A".repeat(MAX_NAME_LEN);
        let adv = advertising_payload(&name);
        assert_eq!(adv.len(), MAX_ADV_LEN);
        assert_eq!(name_of(&adv).map(|(t, _)| t), Some(AD_NAME_COMPLETE));
    }

    #[test]
    fn long_name_truncated_deterministically() {
        let name = "Macropad With A Very Long Product Name";
        let a = advertising_payload(name);
        let b = advertising_payload(name);
        assert_eq!(a, b);
        assert!(a.len() <= MAX_ADV_LEN);
        let (ad_type, body) = name_of(&a).unwrap();
        assert_eq!(ad_type, AD_NAME_SHORT);
        assert_eq!(body, &name.as_bytes()[..MAX_NAME_LEN]);
        // HID UUID survives truncation.
        assert!(ad_structures(&a).any(|(t, d)| t == AD_UUID16_COMPLETE && d == [0x12, 0x18]));
    }

    #[test]
    fn truncation_respects_utf8() {
        // 21 ASCII bytes then a 2-byte char straddling the limit.
        let name = "abcdefghijklmnopqrstué!";
        let adv = advertising_payload(name);
        let (_, body) = name_of(&adv).unwrap();
        assert!(core::str::from_utf8(body).is_ok());
        assert_eq!(body.len(), 21);
    }

    #[test]
    fn scan_response_carries_full_uuid() {
        let scan = scan_response();
        assert_eq!(scan.len(), 18);
        let (t, body) = ad_structures(&scan).next().unwrap();
        assert_eq!(t, AD_UUID128_COMPLETE);
        assert_eq!(body, &SERIAL_SERVICE_UUID128);
    }

    #[test]
    fn malformed_length_stops_iteration() {
        let data = [0x02, 0x01, 0x06, 0x09, 0x09, b'x'];
        assert_eq!(ad_structures(&data).count(), 1);
    }
}
