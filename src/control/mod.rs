//! JSON control channel shared by the USB console and the BLE serial pipe.
//!
//! Each inbound line is decoded into an [`Inbound`] and handled against a
//! [`Context`] borrowed from the runtime. Handlers never fail outward:
//! malformed input is dropped and errors become `status` messages.
//! Responses are returned as JSON lines for the caller to broadcast.

pub mod message;

use alloc::string::String;
use alloc::vec::Vec;

use crate::backlight::{Backlight, Dimmer};
use crate::clock::Millis;
use crate::config::{
    CONFIG_PROFILE_NAME, CONSOLE_LINE_LIMIT, LIGHT_LEVEL_PLACEHOLDER, MATRIX_COLS, MATRIX_ROWS,
};
use crate::keymap::{parse_cell_id, Keymap};
use crate::lines::LineBuffer;
use crate::ota::{FirmwareStore, OtaSession};
use crate::uart::display::OutputMode;
use crate::uart::telemetry::Telemetry;
use crate::uart::SerialLink;
use message::{brightness_value, cell_value, Inbound, KeyTable, Outbound, Profiles};

/// Runtime state the control channel may read or change.
pub struct Context<'a, S: FirmwareStore, D: Dimmer> {
    pub keymap: &'a mut Keymap,
    pub backlight: &'a mut Backlight<D>,
    pub ota: &'a mut OtaSession,
    pub store: &'a mut S,
    pub output_mode: OutputMode,
}

/// Outgoing JSON lines, in send order.
pub type Responses = Vec<String>;

fn push(out: &mut Responses, msg: Outbound<'_>) {
    if let Some(json) = msg.to_json() {
        out.push(json);
    }
}

fn status(out: &mut Responses, message: &str) {
    push(out, Outbound::Status { message });
}

/// Decode and handle one line.
pub fn handle_line<S: FirmwareStore, D: Dimmer>(
    line: &str,
    ctx: &mut Context<'_, S, D>,
    now: Millis,
) -> Responses {
    let mut out = Responses::new();
    match Inbound::parse(line) {
        Some(msg) => handle(msg, ctx, now, &mut out),
        None => trace!("control: dropped malformed line ({} bytes)", line.len()),
    }
    out
}

pub fn handle<S: FirmwareStore, D: Dimmer>(
    msg: Inbound,
    ctx: &mut Context<'_, S, D>,
    now: Millis,
    out: &mut Responses,
) {
    match msg {
        Inbound::Config { keys } => {
            let mut applied = 0usize;
            for (id, cell) in keys.iter() {
                let (Some((row, col)), Some(value)) = (parse_cell_id(id), cell_value(cell)) else {
                    debug!("control: skipped key {}", id.as_str());
                    continue;
                };
                if ctx.keymap.set(row, col, Some(value.as_str())) {
                    applied += 1;
                }
            }
            info!("control: keymap updated ({} cells)", applied);
            status(out, "Configuration updated");
        }
        Inbound::Backlight {
            enabled,
            brightness,
        } => {
            if let Some(enabled) = enabled {
                ctx.backlight.set_enabled(enabled);
            }
            if let Some(level) = brightness.as_ref().and_then(brightness_value) {
                ctx.backlight.set_brightness(level);
            }
            status(out, "Backlight config updated");
        }
        Inbound::Display {} => {
            info!("control: display config received");
            status(out, "Display config updated");
        }
        Inbound::GetConfig => {
            let keys = KeyTable(&*ctx.keymap);
            push(
                out,
                Outbound::Config {
                    rows: MATRIX_ROWS,
                    cols: MATRIX_COLS,
                    keys,
                    active_profile: CONFIG_PROFILE_NAME,
                    profiles: Profiles {
                        name: CONFIG_PROFILE_NAME,
                        keys,
                    },
                    output_mode: ctx.output_mode.as_str(),
                },
            );
        }
        Inbound::GetLight => push(
            out,
            Outbound::Light {
                level: LIGHT_LEVEL_PLACEHOLDER,
            },
        ),
        Inbound::Status => status(out, "Macropad ready"),
        Inbound::OtaStart {
            filename,
            size,
            chunks,
        } => {
            if let Some(name) = filename.as_deref() {
                debug!("control: ota image {}", name);
            }
            match ctx.ota.start(ctx.store, size, chunks) {
                Ok(()) => {
                    status(out, "OTA: Starting update...");
                    push(
                        out,
                        Outbound::OtaStatus {
                            status: "started",
                            message: Some("OTA update started"),
                            progress: None,
                            chunk: None,
                            total: None,
                        },
                    );
                }
                Err(e) => status(out, &e.status_message()),
            }
        }
        Inbound::OtaChunk {
            index,
            data,
            encoded,
        } => {
            if let Some(index) = index {
                trace!("control: ota chunk index {}", index);
            }
            match ctx.ota.chunk(ctx.store, &data, encoded) {
                Ok(p) => push(
                    out,
                    Outbound::OtaStatus {
                        status: "progress",
                        message: None,
                        progress: Some(p.percent),
                        chunk: Some(p.chunk),
                        total: Some(p.total),
                    },
                ),
                Err(e) => status(out, &e.status_message()),
            }
        }
        Inbound::OtaEnd {} => match ctx.ota.end(ctx.store, now) {
            Ok(()) => {
                status(out, "OTA: Update completed! Restarting...");
                push(
                    out,
                    Outbound::OtaStatus {
                        status: "completed",
                        message: Some("Update completed, restarting..."),
                        progress: None,
                        chunk: None,
                        total: None,
                    },
                );
            }
            Err(e) => status(out, &e.status_message()),
        },
        Inbound::Unknown => debug!("control: ignored unknown message type"),
    }
}

/// `keypress` echo for an accepted matrix transition.
pub fn keypress(row: usize, col: usize) -> Option<String> {
    Outbound::Keypress { row, col }.to_json()
}

/// `atmega_log` relay of one telemetry line.
pub fn telemetry(t: &Telemetry) -> Option<String> {
    let msg = match t {
        Telemetry::Hex { hex, ascii } => Outbound::AtmegaLog {
            mode: "hex",
            hex: Some(hex.as_str()),
            ascii: Some(ascii.as_str()),
            text: None,
        },
        Telemetry::Text(text) => Outbound::AtmegaLog {
            mode: "text",
            hex: None,
            ascii: None,
            text: Some(text.as_str()),
        },
    };
    msg.to_json()
}

/// Line framing for the USB console.
pub struct Console<L: SerialLink> {
    link: L,
    lines: LineBuffer,
}

impl<L: SerialLink> Console<L> {
    pub fn new(link: L) -> Self {
        Self {
            link,
            lines: LineBuffer::new(CONSOLE_LINE_LIMIT),
        }
    }

    pub fn link(&self) -> &L {
        &self.link
    }

    pub fn link_mut(&mut self) -> &mut L {
        &mut self.link
    }

    /// Complete UTF-8 lines received since the last poll.
    pub fn poll(&mut self) -> Vec<String> {
        let mut out = Vec::new();
        let mut chunk = [0u8; 64];
        loop {
            let n = self.link.read_available(&mut chunk);
            if n == 0 {
                break;
            }
            for line in self.lines.push(&chunk[..n]) {
                match String::from_utf8(line) {
                    Ok(text) if !text.trim().is_empty() => out.push(String::from(text.trim())),
                    Ok(_) => {}
                    Err(_) => debug!("control: dropped undecodable console line"),
                }
            }
        }
        out
    }

    /// Write one response line. Dropped silently when no host is listening.
    pub fn send(&mut self, json: &str) {
        let mut line = Vec::with_capacity(json.len() + 1);
        line.extend_from_slice(json.as_bytes());
        line.push(b'\n');
        if self.link.write_all(&line).is_err() {
            trace!("control: console write dropped");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ota::tests::MemStore;
    use crate::ota::{OtaState, Slot};
    use serde_json::Value;

    struct NullDimmer;

    impl Dimmer for NullDimmer {
        fn set_duty(&mut self, _duty: u16) {}
    }

    struct Fixture {
        keymap: Keymap,
        backlight: Backlight<NullDimmer>,
        ota: OtaSession,
        store: MemStore,
    }

    impl Fixture {
        fn new() -> Self {
            Self {
                keymap: Keymap::default(),
                backlight: Backlight::new(NullDimmer),
                ota: OtaSession::new(),
                store: MemStore::with_program(b"old"),
            }
        }

        fn send(&mut self, line: &str) -> Vec<Value> {
            let mut ctx = Context {
                keymap: &mut self.keymap,
                backlight: &mut self.backlight,
                ota: &mut self.ota,
                store: &mut self.store,
                output_mode: OutputMode::Usb,
            };
            handle_line(line, &mut ctx, 0)
                .iter()
                .map(|s| serde_json::from_str(s).unwrap())
                .collect()
        }
    }

    #[test]
    fn config_then_get_config_echoes() {
        let mut f = Fixture::new();
        let acks = f.send(r#"{"type":"config","keys":{"0-0":{"value":"9"},"2-3":{"value":"VOL_UP"}}}"#);
        assert_eq!(acks[0]["message"], "Configuration updated");

        let cfg = f.send(r#"{"type":"get_config"}"#);
        assert_eq!(cfg.len(), 1);
        assert_eq!(cfg[0]["type"], "config");
        assert_eq!(cfg[0]["keys"]["0-0"]["value"], "9");
        assert_eq!(cfg[0]["keys"]["2-3"]["value"], "VOL_UP");
        assert_eq!(cfg[0]["rows"], 5);
        assert_eq!(cfg[0]["cols"], 4);
        assert_eq!(cfg[0]["outputMode"], "usb");
        assert_eq!(cfg[0]["profiles"]["Profil 1"]["keys"]["0-0"]["value"], "9");
    }

    #[test]
    fn empty_value_clears_and_bad_ids_skipped() {
        let mut f = Fixture::new();
        f.send(r#"{"type":"config","keys":{"0-1":{"value":""},"9-9":{"value":"1"},"x":{}}}"#);
        assert_eq!(f.keymap.get(0, 1), None);
        assert_eq!(f.keymap.bound_count(), 16);
    }

    #[test]
    fn bare_cell_leaves_binding_alone() {
        let mut f = Fixture::new();
        let acks = f.send(r#"{"type":"config","keys":{"1-0":"9","1-1":{"value":"5"}}}"#);
        assert_eq!(acks[0]["message"], "Configuration updated");
        assert_eq!(f.keymap.get(1, 0), Some("7"));
        assert_eq!(f.keymap.get(1, 1), Some("5"));
    }

    #[test]
    fn truncated_message_changes_nothing() {
        let mut f = Fixture::new();
        let before = f.keymap.clone();
        assert!(f.send(r#"{"type":"confi"#).is_empty());
        assert!(f.send(r#"{"type":"config","keys":{"0-0":{"val"#).is_empty());
        assert_eq!(f.keymap, before);
        assert_eq!(f.ota.state(), OtaState::Idle);
    }

    #[test]
    fn unknown_type_ignored() {
        let mut f = Fixture::new();
        assert!(f.send(r#"{"type":"self_destruct"}"#).is_empty());
    }

    #[test]
    fn simple_acks() {
        let mut f = Fixture::new();
        assert_eq!(f.send(r#"{"type":"status"}"#)[0]["message"], "Macropad ready");
        assert_eq!(f.send(r#"{"type":"get_light"}"#)[0]["level"], 500);
        assert_eq!(
            f.send(r#"{"type":"display","mode":"x"}"#)[0]["message"],
            "Display config updated"
        );
    }

    #[test]
    fn backlight_updates() {
        let mut f = Fixture::new();
        let r = f.send(r#"{"type":"backlight","enabled":false,"brightness":300}"#);
        assert_eq!(r[0]["message"], "Backlight config updated");
        assert!(!f.backlight.enabled());
        assert_eq!(f.backlight.brightness(), 255);
    }

    #[test]
    fn ota_round_trip_over_json() {
        let mut f = Fixture::new();
        let r = f.send(r#"{"type":"ota_start","filename":"main.py","size":10,"chunks":2}"#);
        assert_eq!(r[0]["message"], "OTA: Starting update...");
        assert_eq!(r[1]["type"], "ota_status");
        assert_eq!(r[1]["status"], "started");

        let r = f.send(r#"{"type":"ota_chunk","index":0,"data":"aGVsbG8=","encoded":true}"#);
        assert_eq!(r[0]["progress"], 50);
        assert_eq!(r[0]["chunk"], 1);
        assert_eq!(r[0]["total"], 2);
        f.send(r#"{"type":"ota_chunk","index":1,"data":"world"}"#);

        let r = f.send(r#"{"type":"ota_end"}"#);
        assert_eq!(r[0]["message"], "OTA: Update completed! Restarting...");
        assert_eq!(r[1]["status"], "completed");
        assert_eq!(f.store.image(Slot::Program), Some(&b"helloworld"[..]));
        assert_eq!(f.store.image(Slot::Backup), Some(&b"old"[..]));
        assert!(f.ota.reset_due(500));
    }

    #[test]
    fn ota_errors_become_status() {
        let mut f = Fixture::new();
        let r = f.send(r#"{"type":"ota_chunk","data":"x"}"#);
        assert_eq!(r[0]["message"], "OTA: No update in progress");

        f.send(r#"{"type":"ota_start","size":3,"chunks":2}"#);
        let r = f.send(r#"{"type":"ota_start","size":3,"chunks":2}"#);
        assert_eq!(r[0]["message"], "OTA already in progress");

        f.send(r#"{"type":"ota_chunk","data":"abc"}"#);
        let r = f.send(r#"{"type":"ota_end"}"#);
        assert_eq!(r[0]["message"], "OTA: Incomplete update (1 < 2)");
        assert_eq!(f.store.image(Slot::Program), Some(&b"old"[..]));
        assert!(!f.store.images.contains_key(&(Slot::Staging as u8)));
    }

    #[test]
    fn telemetry_relay_shapes() {
        let hex = telemetry(&Telemetry::Hex {
            hex: "0A 1B".into(),
            ascii: "..".into(),
        })
        .unwrap();
        assert_eq!(
            hex,
            r#"{"type":"atmega_log","mode":"hex","hex":"0A 1B","ascii":".."}"#
        );
        let text = telemetry(&Telemetry::Text("hi".into())).unwrap();
        assert_eq!(text, r#"{"type":"atmega_log","mode":"text","text":"hi"}"#);
    }

    /// Link with a fixed amount of room that takes whole writes only.
    struct Bounded {
        room: usize,
        writes: Vec<Vec<u8>>,
    }

    impl SerialLink for Bounded {
        fn read_available(&mut self, _buf: &mut [u8]) -> usize {
            0
        }

        fn write_all(&mut self, data: &[u8]) -> Result<(), crate::error::Error> {
            if data.len() > self.room {
                return Err(crate::error::Error::BufferOverflow);
            }
            self.room -= data.len();
            self.writes.push(data.to_vec());
            Ok(())
        }
    }

    #[test]
    fn console_lines_written_whole() {
        let mut console = Console::new(Bounded {
            room: 40,
            writes: Vec::new(),
        });
        console.send(r#"{"type":"status","message":"ok"}"#);
        // 7 bytes left for a 33-byte line: none of it goes out.
        console.send(r#"{"type":"status","message":"ok"}"#);
        console.send("{}");

        let writes = &console.link().writes;
        assert_eq!(writes.len(), 2);
        assert_eq!(writes[0], b"{\"type\":\"status\",\"message\":\"ok\"}\n");
        assert_eq!(writes[1], b"{}\n");
    }
}
