//! Control-channel wire format: one JSON object per line, tagged by `type`.

use alloc::collections::BTreeMap;
use alloc::format;
use alloc::string::String;
use serde::ser::{SerializeMap, SerializeStruct};
use serde::{Deserialize, Serialize, Serializer};
use serde_json::Value;

use crate::keymap::Keymap;

/// Messages the UI sends.
#[derive(Debug, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Inbound {
    /// Bulk keymap edit: `"row-col"` -> `{"value": symbol}`; an empty value clears.
    Config {
        #[serde(default)]
        keys: BTreeMap<String, Value>,
    },
    Backlight {
        #[serde(default)]
        enabled: Option<bool>,
        #[serde(default)]
        brightness: Option<Value>,
    },
    Display {},
    GetConfig,
    GetLight,
    Status,
    OtaStart {
        #[serde(default)]
        filename: Option<String>,
        #[serde(default)]
        size: u32,
        #[serde(default)]
        chunks: u32,
    },
    OtaChunk {
        #[serde(default)]
        index: Option<i64>,
        #[serde(default)]
        data: String,
        #[serde(default)]
        encoded: bool,
    },
    OtaEnd {},
    /// Any other tag; intentionally ignored.
    #[serde(other)]
    Unknown,
}

impl Inbound {
    /// `None` for anything that is not a well-formed message, which is
    /// what a fragment of a longer line looks like.
    pub fn parse(line: &str) -> Option<Self> {
        let line = line.trim();
        if line.len() < 2 {
            return None;
        }
        serde_json::from_str(line).ok()
    }
}

/// Symbol carried by a config cell, if it is a usable one. A cell
/// object without a `value` clears the key; anything other than an
/// object is skipped.
pub fn cell_value(cell: &Value) -> Option<String> {
    let Value::Object(fields) = cell else {
        return None;
    };
    match fields.get("value") {
        None | Some(Value::Null) => Some(String::new()),
        Some(Value::String(s)) => Some(s.clone()),
        Some(Value::Number(n)) => Some(format!("{}", n)),
        Some(_) => None,
    }
}

/// Brightness as sent by the UI: a number, or a numeric string.
pub fn brightness_value(v: &Value) -> Option<i64> {
    match v {
        Value::Number(n) => n.as_i64().or_else(|| n.as_f64().map(|f| f as i64)),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

/// Messages the device sends.
#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Outbound<'a> {
    Config {
        rows: usize,
        cols: usize,
        keys: KeyTable<'a>,
        #[serde(rename = "activeProfile")]
        active_profile: &'a str,
        profiles: Profiles<'a>,
        #[serde(rename = "outputMode")]
        output_mode: &'a str,
    },
    Status {
        message: &'a str,
    },
    Light {
        level: u32,
    },
    Keypress {
        row: usize,
        col: usize,
    },
    AtmegaLog {
        mode: &'a str,
        #[serde(skip_serializing_if = "Option::is_none")]
        hex: Option<&'a str>,
        #[serde(skip_serializing_if = "Option::is_none")]
        ascii: Option<&'a str>,
        #[serde(skip_serializing_if = "Option::is_none")]
        text: Option<&'a str>,
    },
    OtaStatus {
        status: &'a str,
        #[serde(skip_serializing_if = "Option::is_none")]
        message: Option<&'a str>,
        #[serde(skip_serializing_if = "Option::is_none")]
        progress: Option<u32>,
        #[serde(skip_serializing_if = "Option::is_none")]
        chunk: Option<u32>,
        #[serde(skip_serializing_if = "Option::is_none")]
        total: Option<u32>,
    },
}

impl Outbound<'_> {
    pub fn to_json(&self) -> Option<String> {
        match serde_json::to_string(self) {
            Ok(s) => Some(s),
            Err(_) => {
                warn!("control: response serialization failed");
                None
            }
        }
    }
}

/// Bound cells as `{"r-c": {"type": "key", "value": symbol}}`.
#[derive(Debug, Clone, Copy)]
pub struct KeyTable<'a>(pub &'a Keymap);

impl Serialize for KeyTable<'_> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.0.bound_count()))?;
        for (row, col, symbol) in self.0.bindings() {
            map.serialize_entry(&format!("{}-{}", row, col), &KeyEntry(symbol))?;
        }
        map.end()
    }
}

struct KeyEntry<'a>(&'a str);

impl Serialize for KeyEntry<'_> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut entry = serializer.serialize_struct("KeyEntry", 2)?;
        entry.serialize_field("type", "key")?;
        entry.serialize_field("value", self.0)?;
        entry.end()
    }
}

/// The single fixed profile: `{name: {"keys": ...}}`.
#[derive(Debug, Clone, Copy)]
pub struct Profiles<'a> {
    pub name: &'a str,
    pub keys: KeyTable<'a>,
}

impl Serialize for Profiles<'_> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        #[derive(Serialize)]
        struct Profile<'a> {
            keys: KeyTable<'a>,
        }

        let mut map = serializer.serialize_map(Some(1))?;
        map.serialize_entry(self.name, &Profile { keys: self.keys })?;
        map.end()
    }
}
