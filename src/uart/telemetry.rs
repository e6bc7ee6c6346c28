//! Classification of companion-MCU telemetry lines.

use alloc::string::String;
use alloc::vec::Vec;
use core::fmt::Write;

/// A telemetry line worth forwarding to the UI.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Telemetry {
    /// A hex dump, re-rendered as grouped upper-case hex plus a printable preview.
    Hex { hex: String, ascii: String },
    /// Anything else that decodes to non-blank text.
    Text(String),
}

const SEPARATORS: &[u8] = b"\x00\r\n\t ";

/// Classify one line (terminator already removed). `None` means noise.
pub fn classify(line: &[u8]) -> Option<Telemetry> {
    if strip(line).is_empty() {
        return None;
    }

    let text = decode(line);
    let text = text.trim_matches(|c: char| c.is_whitespace() || c == '\0');
    if text.is_empty() {
        return None;
    }

    if let Some(bytes) = parse_hex(text) {
        return Some(render_hex(&bytes));
    }
    Some(Telemetry::Text(String::from(text)))
}

fn strip(line: &[u8]) -> &[u8] {
    let start = line.iter().position(|b| !SEPARATORS.contains(b));
    let end = line.iter().rposition(|b| !SEPARATORS.contains(b));
    match (start, end) {
        (Some(s), Some(e)) => &line[s..=e],
        _ => &[],
    }
}

/// UTF-8, falling back to Latin-1 (every byte is a code point).
fn decode(line: &[u8]) -> String {
    match core::str::from_utf8(line) {
        Ok(s) => String::from(s),
        Err(_) => line.iter().map(|&b| char::from(b)).collect(),
    }
}

/// Even-length run of at least four hex digits (spaces ignored) that is
/// not all zeros.
fn parse_hex(text: &str) -> Option<Vec<u8>> {
    let digits: Vec<u8> = text.bytes().filter(|&b| b != b' ').collect();
    if digits.len() % 2 != 0 || digits.len() <= 2 {
        return None;
    }

    let bytes = digits
        .chunks_exact(2)
        .map(|pair| Some((hex_val(pair[0])? << 4) | hex_val(pair[1])?))
        .collect::<Option<Vec<u8>>>()?;

    if bytes.iter().all(|&b| b == 0) {
        return None;
    }
    Some(bytes)
}

fn hex_val(digit: u8) -> Option<u8> {
    match digit {
        b'0'..=b'9' => Some(digit - b'0'),
        b'a'..=b'f' => Some(digit - b'a' + 10),
        b'A'..=b'F' => Some(digit - b'A' + 10),
        _ => None,
    }
}

fn render_hex(bytes: &[u8]) -> Telemetry {
    let mut hex = String::with_capacity(bytes.len() * 3);
    for (i, b) in bytes.iter().enumerate() {
        if i > 0 {
            hex.push(' ');
        }
        let _ = write!(hex, "{:02X}", b);
    }
    let ascii = bytes
        .iter()
        .map(|&b| if (32..127).contains(&b) { char::from(b) } else { '.' })
        .collect();
    Telemetry::Hex { hex, ascii }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keepalive_noise_discarded() {
        assert_eq!(classify(b"\x00\x00\r"), None);
        assert_eq!(classify(b"  \t"), None);
        assert_eq!(classify(b""), None);
    }

    #[test]
    fn hex_dump_rendered() {
        assert_eq!(
            classify(b"48 65 6c 6C 6f 0a"),
            Some(Telemetry::Hex {
                hex: String::from("48 65 6C 6C 6F 0A"),
                ascii: String::from("Hello."),
            })
        );
    }

    #[test]
    fn all_zero_hex_is_text() {
        assert_eq!(classify(b"0000"), Some(Telemetry::Text(String::from("0000"))));
    }

    #[test]
    fn short_or_odd_hex_is_text() {
        assert_eq!(classify(b"ab"), Some(Telemetry::Text(String::from("ab"))));
        assert_eq!(classify(b"abc"), Some(Telemetry::Text(String::from("abc"))));
    }

    #[test]
    fn plain_text_trimmed() {
        assert_eq!(
            classify(b" display ready \r"),
            Some(Telemetry::Text(String::from("display ready")))
        );
    }

    #[test]
    fn latin1_fallback() {
        assert_eq!(
            classify(b"temp 21\xB0C"),
            Some(Telemetry::Text(String::from("temp 21°C")))
        );
    }
}
