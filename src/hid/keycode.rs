//! Symbol to HID usage mapping.
//!
//! Keymap cells hold short symbols ("7", "+", "VOL_UP", ...). Digits and
//! operators use the main keyboard block, not the keypad, so they type
//! the same character on every host layout we care about.

use super::consumer::ConsumerUsage;
use super::keyboard::MODIFIER_LEFT_SHIFT;

/// A keycode plus the modifiers it must be sent with.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Keystroke {
    pub keycode: u8,
    pub modifier: u8,
}

impl Keystroke {
    const fn plain(keycode: u8) -> Self {
        Self {
            keycode,
            modifier: 0,
        }
    }

    const fn shifted(keycode: u8) -> Self {
        Self {
            keycode,
            modifier: MODIFIER_LEFT_SHIFT,
        }
    }
}

/// What a keymap symbol does when its key goes down.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum KeyAction {
    /// Keyboard report, released on key-up.
    Key(Keystroke),
    /// Momentary consumer control, nothing happens on key-up.
    Consumer(ConsumerUsage),
    /// Profile switch request (only one profile exists; logged).
    Profile,
}

/// Keyboard usage for a plain symbol.
fn base_keycode(symbol: &str) -> Option<u8> {
    let code = match symbol {
        "1" => 0x1E,
        "2" => 0x1F,
        "3" => 0x20,
        "4" => 0x21,
        "5" => 0x22,
        "6" => 0x23,
        "7" => 0x24,
        "8" => 0x25,
        "9" => 0x26,
        "0" => 0x27,
        "-" => 0x2D,
        "=" => 0x2E,
        "/" => 0x38,
        "." => 0x37,
        _ => return None,
    };
    Some(code)
}

/// Keystroke for a symbol. "+" and "*" have no key of their own and are
/// typed as Shift + "=" and Shift + "8".
pub fn keystroke(symbol: &str) -> Option<Keystroke> {
    match symbol {
        "+" => base_keycode("=").map(Keystroke::shifted),
        "*" => base_keycode("8").map(Keystroke::shifted),
        _ => base_keycode(symbol).map(Keystroke::plain),
    }
}

/// Resolve a keymap symbol. `None` means the symbol is bound but unknown.
pub fn resolve(symbol: &str) -> Option<KeyAction> {
    match symbol {
        "VOL_UP" => Some(KeyAction::Consumer(ConsumerUsage::VolumeUp)),
        "VOL_DOWN" => Some(KeyAction::Consumer(ConsumerUsage::VolumeDown)),
        "MUTE" => Some(KeyAction::Consumer(ConsumerUsage::Mute)),
        "PROFILE" => Some(KeyAction::Profile),
        _ => keystroke(symbol).map(KeyAction::Key),
    }
}
