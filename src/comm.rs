/// Communication layer: serial NDJSON transport.
///
/// The device streams session events as newline-delimited JSON through the
/// logger (which the firmware binds to the serial console) and accepts
/// commands as NDJSON lines on the same port.
use crate::control::{Control, DiagnosticsText, StartError};
use crate::defaults::{DEFAULT_DETECT_SECS, DEFAULT_SCAN_SECS, DEFAULT_TRACK_CHANNELS, DEFAULT_TRACK_SECS};
use crate::platform::{BeepConfig, ConfigStore};
use crate::protocol::{ChannelText, DeviceMessage, HostCommand, RawCommand, MAX_MSG_LEN};
use crate::radio::RadioMode;
use crate::session::{FloodKind, ResultText, SessionRequest};
use crate::watchlist::WatchlistText;

/// Serial baud rate
pub const SERIAL_BAUD: u32 = 115200;

// ── Serialization helpers ──────────────────────────────────────────────

/// Serialize a DeviceMessage to JSON bytes and write to the output buffer.
/// Returns the number of bytes written, or None if serialization failed.
pub fn serialize_message(msg: &DeviceMessage, buf: &mut [u8]) -> Option<usize> {
    match serde_json_core::to_slice(msg, buf) {
        Ok(len) => {
            // Append newline for NDJSON
            if len < buf.len() {
                buf[len] = b'\n';
                Some(len + 1)
            } else {
                Some(len)
            }
        }
        Err(_) => None,
    }
}

/// Emit one NDJSON line through the logger.
pub fn emit(msg: &DeviceMessage) {
    let mut buf = [0u8; MAX_MSG_LEN];
    match serde_json_core::to_slice(msg, &mut buf) {
        Ok(len) => {
            if let Ok(line) = core::str::from_utf8(&buf[..len]) {
                log::info!("{}", line);
            }
        }
        Err(_) => log::warn!("Event too large to serialize"),
    }
}

/// Deserialize a HostCommand from a JSON byte slice.
pub fn parse_command(data: &[u8]) -> Option<HostCommand> {
    // Strip trailing newline/whitespace
    let trimmed = trim_trailing_whitespace(data);
    if trimmed.is_empty() {
        return None;
    }
    let (raw, _) = serde_json_core::from_slice::<RawCommand>(trimmed).ok()?;
    command_from_raw(raw)
}

/// Apply defaults and validate the flat wire form.
fn command_from_raw(raw: RawCommand) -> Option<HostCommand> {
    let mode = match raw.mode.as_deref() {
        Some(m) => RadioMode::parse(m)?,
        None => RadioMode::Wifi,
    };
    let forever = raw.forever == Some(true);
    let given_secs = raw.secs;
    let secs = |default: i64| {
        if forever {
            0
        } else {
            given_secs.map_or(default, i64::from)
        }
    };

    let cmd = match raw.cmd.as_str() {
        "scan" => HostCommand::Scan {
            mode,
            secs: secs(DEFAULT_SCAN_SECS),
            channels: raw.ch.unwrap_or_default(),
        },
        "track" => HostCommand::Track {
            mac: raw.mac?,
            mode,
            secs: secs(DEFAULT_TRACK_SECS),
            channels: raw
                .ch
                .unwrap_or_else(|| ChannelText::try_from(DEFAULT_TRACK_CHANNELS).unwrap_or_default()),
        },
        "detect" => HostCommand::Detect {
            kind: FloodKind::parse(raw.kind.as_deref().unwrap_or("deauth"))?,
            secs: secs(DEFAULT_DETECT_SECS),
        },
        "stop" => HostCommand::Stop,
        "status" => HostCommand::Status,
        "results" => HostCommand::Results,
        "targets" => HostCommand::Targets { list: raw.list },
        "beep_config" => HostCommand::BeepConfig {
            beeps: raw.beeps,
            gap_ms: raw.gap,
        },
        "mesh" => HostCommand::Mesh {
            enabled: raw.enabled?,
        },
        _ => return None,
    };
    Some(cmd)
}

/// What the console should print after a command.
#[derive(Debug)]
pub enum Response {
    /// Session accepted; hand the request to the session worker.
    Start(SessionRequest),
    Ack {
        cmd: &'static str,
        ok: bool,
        msg: Option<&'static str>,
    },
    Diagnostics(DiagnosticsText),
    Results(ResultText),
    Targets(WatchlistText),
}

impl Response {
    fn ack(cmd: &'static str, ok: bool, msg: Option<&'static str>) -> Self {
        Response::Ack { cmd, ok, msg }
    }
}

/// Process a received host command and update state accordingly.
pub fn handle_command<S: ConfigStore + ?Sized>(
    cmd: HostCommand,
    control: &Control,
    store: &mut S,
    now_ms: u32,
) -> Response {
    let start = |name: &'static str, result: Result<SessionRequest, StartError>| match result {
        Ok(req) => Response::Start(req),
        Err(e) => Response::ack(name, false, Some(e.message())),
    };
    match cmd {
        HostCommand::Scan { mode, secs, channels } => {
            start("scan", control.start_session(mode, secs, &channels, now_ms))
        }
        HostCommand::Track {
            mac,
            mode,
            secs,
            channels,
        } => start("track", control.start_tracker(&mac, mode, secs, &channels, now_ms)),
        HostCommand::Detect { kind, secs } => {
            start("detect", control.start_flood_detector(kind, secs, now_ms))
        }
        HostCommand::Stop => {
            control.stop();
            Response::ack("stop", true, None)
        }
        HostCommand::Status => Response::Diagnostics(control.diagnostics_text(now_ms)),
        HostCommand::Results => Response::Results(control.last_result_text()),
        HostCommand::Targets { list: None } => Response::Targets(control.watchlist_text()),
        HostCommand::Targets { list: Some(list) } => {
            control.save_watchlist(store, &watchlist_lines(&list));
            Response::Targets(control.watchlist_text())
        }
        HostCommand::BeepConfig { beeps, gap_ms } => {
            let current = control.beep_config();
            control.set_beep_config(
                store,
                BeepConfig {
                    beeps_per_hit: beeps.unwrap_or(current.beeps_per_hit),
                    gap_ms: gap_ms.unwrap_or(current.gap_ms),
                },
            );
            Response::ack("beep_config", true, None)
        }
        HostCommand::Mesh { enabled } => {
            control.set_mesh_enabled(enabled);
            Response::ack("mesh", true, None)
        }
    }
}

/// Watchlist entries arrive on one line, separated by `;` or `,`.
fn watchlist_lines(list: &str) -> WatchlistText {
    let mut text = WatchlistText::new();
    for entry in list.split([';', ',']) {
        let entry = entry.trim();
        if !entry.is_empty() && (text.push_str(entry).is_err() || text.push('\n').is_err()) {
            break;
        }
    }
    text
}

// ── Serial NDJSON reader ───────────────────────────────────────────────

/// Serial NDJSON reader state machine.
/// Accumulates bytes until a newline is found, then yields the line.
pub struct LineReader {
    buf: [u8; MAX_MSG_LEN],
    pos: usize,
}

impl LineReader {
    pub const fn new() -> Self {
        Self {
            buf: [0; MAX_MSG_LEN],
            pos: 0,
        }
    }

    /// Feed a byte into the reader. Returns a complete line (without newline)
    /// when one is detected.
    pub fn feed(&mut self, byte: u8) -> Option<&[u8]> {
        if byte == b'\n' || byte == b'\r' {
            if self.pos > 0 {
                let line = &self.buf[..self.pos];
                self.pos = 0;
                Some(line)
            } else {
                None
            }
        } else if self.pos < self.buf.len() {
            self.buf[self.pos] = byte;
            self.pos += 1;
            None
        } else {
            // Overflow, discard and reset
            self.pos = 0;
            None
        }
    }
}

impl Default for LineReader {
    fn default() -> Self {
        Self::new()
    }
}

fn trim_trailing_whitespace(data: &[u8]) -> &[u8] {
    let mut end = data.len();
    while end > 0 && (data[end - 1] == b' ' || data[end - 1] == b'\n' || data[end - 1] == b'\r' || data[end - 1] == b'\t') {
        end -= 1;
    }
    &data[..end]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::control::tests::MemStore;
    use crate::mac::MacString;

    fn parse(json: &str) -> Option<HostCommand> {
        parse_command(json.as_bytes())
    }

    // ── Command parsing ────────────────────────────────────────────

    #[test]
    fn parse_scan_defaults() {
        assert_eq!(
            parse(r#"{"cmd":"scan"}"#),
            Some(HostCommand::Scan {
                mode: RadioMode::Wifi,
                secs: 60,
                channels: ChannelText::new(),
            })
        );
    }

    #[test]
    fn parse_scan_with_fields() {
        assert_eq!(
            parse(r#"{"cmd":"scan","mode":"both","secs":30,"ch":"1..3"}"#),
            Some(HostCommand::Scan {
                mode: RadioMode::Both,
                secs: 30,
                channels: ChannelText::try_from("1..3").unwrap(),
            })
        );
    }

    #[test]
    fn parse_forever_overrides_secs() {
        match parse(r#"{"cmd":"scan","secs":30,"forever":true}"#) {
            Some(HostCommand::Scan { secs, .. }) => assert_eq!(secs, 0),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn parse_track_needs_mac() {
        assert_eq!(parse(r#"{"cmd":"track"}"#), None);
        assert_eq!(
            parse(r#"{"cmd":"track","mac":"aa:bb:cc:dd:ee:ff","mode":"ble"}"#),
            Some(HostCommand::Track {
                mac: MacString::try_from("aa:bb:cc:dd:ee:ff").unwrap(),
                mode: RadioMode::Ble,
                secs: 180,
                channels: ChannelText::try_from("6").unwrap(),
            })
        );
    }

    #[test]
    fn parse_detect_kinds() {
        assert_eq!(
            parse(r#"{"cmd":"detect","kind":"beacon-flood","secs":0}"#),
            Some(HostCommand::Detect {
                kind: FloodKind::BeaconFlood,
                secs: 0,
            })
        );
        assert_eq!(
            parse(r#"{"cmd":"detect"}"#),
            Some(HostCommand::Detect {
                kind: FloodKind::Deauth,
                secs: 300,
            })
        );
        assert_eq!(parse(r#"{"cmd":"detect","kind":"evil-twin"}"#), None);
    }

    #[test]
    fn parse_simple_commands() {
        assert_eq!(parse("{\"cmd\":\"stop\"}\r\n"), Some(HostCommand::Stop));
        assert_eq!(parse(r#"{"cmd":"status"}"#), Some(HostCommand::Status));
        assert_eq!(parse(r#"{"cmd":"results"}"#), Some(HostCommand::Results));
        assert_eq!(
            parse(r#"{"cmd":"mesh","enabled":false}"#),
            Some(HostCommand::Mesh { enabled: false })
        );
        assert_eq!(
            parse(r#"{"cmd":"beep_config","beeps":3}"#),
            Some(HostCommand::BeepConfig {
                beeps: Some(3),
                gap_ms: None,
            })
        );
    }

    #[test]
    fn parse_rejects_garbage() {
        assert_eq!(parse(""), None);
        assert_eq!(parse("   \n"), None);
        assert_eq!(parse("not json"), None);
        assert_eq!(parse(r#"{"cmd":"reboot"}"#), None);
        assert_eq!(parse(r#"{"cmd":"scan","mode":"lora"}"#), None);
    }

    // ── Command handling ───────────────────────────────────────────

    #[test]
    fn scan_command_claims_session() {
        let control = Control::new();
        let mut store = MemStore::default();
        let first = handle_command(parse(r#"{"cmd":"scan","secs":10}"#).unwrap(), &control, &mut store, 5);
        assert!(matches!(first, Response::Start(_)));
        let second = handle_command(parse(r#"{"cmd":"scan"}"#).unwrap(), &control, &mut store, 9);
        assert!(matches!(
            second,
            Response::Ack {
                cmd: "scan",
                ok: false,
                ..
            }
        ));
    }

    #[test]
    fn targets_command_replaces_watchlist() {
        let control = Control::new();
        let mut store = MemStore::default();
        let cmd = parse(r#"{"cmd":"targets","list":"AA:BB:CC:DD:EE:FF; 11:22:33"}"#).unwrap();
        match handle_command(cmd, &control, &mut store, 0) {
            Response::Targets(text) => assert_eq!(text.as_str(), "AA:BB:CC:DD:EE:FF\n11:22:33\n"),
            other => panic!("unexpected {:?}", other),
        }
        assert_eq!(store.watchlist.as_str(), "AA:BB:CC:DD:EE:FF\n11:22:33\n");
    }

    #[test]
    fn beep_config_merges_and_clamps() {
        let control = Control::new();
        let mut store = MemStore::default();
        handle_command(
            HostCommand::BeepConfig {
                beeps: Some(40),
                gap_ms: None,
            },
            &control,
            &mut store,
            0,
        );
        assert_eq!(control.beep_config().beeps_per_hit, 10);
        assert_eq!(control.beep_config().gap_ms, 80);
        assert_eq!(store.beeps, control.beep_config());
    }

    // ── Serialization / line reader ────────────────────────────────

    #[test]
    fn serialize_appends_newline() {
        let msg = DeviceMessage::Ack {
            cmd: "stop",
            ok: true,
            msg: None,
        };
        let mut buf = [0u8; 64];
        let len = serialize_message(&msg, &mut buf).unwrap();
        assert_eq!(&buf[..len], b"{\"type\":\"ack\",\"cmd\":\"stop\",\"ok\":true}\n");
    }

    #[test]
    fn line_reader_splits_lines() {
        let mut reader = LineReader::new();
        let mut lines = 0;
        for &b in b"{\"cmd\":\"stop\"}\r\n\n{\"cmd\":\"status\"}\n" {
            if let Some(line) = reader.feed(b) {
                assert!(parse_command(line).is_some());
                lines += 1;
            }
        }
        assert_eq!(lines, 2);
    }
}
