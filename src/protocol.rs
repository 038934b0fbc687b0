/// JSON message protocol for the serial console.
///
/// All messages are newline-delimited JSON (NDJSON).
/// Uses `heapless` types for no_std/no-alloc operation.
use heapless::String;
use serde::{Deserialize, Serialize};

use crate::mac::MacString;
use crate::radio::RadioMode;
use crate::session::FloodKind;

/// Channel list text as typed by the operator ("1,6,11" or "1..13").
pub type ChannelText = String<48>;

/// Watchlist text carried by a `targets` command, entries separated by `;`.
pub type TargetsText = String<MAX_MSG_LEN>;

/// Messages sent from the device to the console
#[derive(Debug, Serialize)]
#[serde(tag = "type")]
pub enum DeviceMessage<'a> {
    /// Watchlist match during a list scan
    #[serde(rename = "hit")]
    Hit {
        mac: &'a MacString,
        /// "WiFi" or "BLE"
        radio: &'static str,
        rssi: i8,
        /// 0 for BLE
        ch: u8,
        name: &'a str,
        /// Uptime in milliseconds when dequeued
        ts: u32,
    },
    /// Deauthentication or disassociation frame
    #[serde(rename = "deauth")]
    Deauth {
        /// "DEAUTH" or "DISASSOC"
        kind: &'static str,
        src: &'a MacString,
        dst: &'a MacString,
        bssid: &'a MacString,
        rssi: i8,
        ch: u8,
        reason: u16,
        ts: u32,
    },
    /// Suspicious beacon
    #[serde(rename = "beacon")]
    Beacon {
        src: &'a MacString,
        bssid: &'a MacString,
        ssid: &'a str,
        rssi: i8,
        ch: u8,
        /// Declared beacon interval in time units
        interval: u16,
        /// Beacons seen from this source so far
        count: u32,
        ts: u32,
    },
    /// Tracker reading, sent with every status line while tracking
    #[serde(rename = "tracker")]
    Tracker {
        mac: &'a MacString,
        rssi: i8,
        /// Smoothed RSSI, whole dBm
        avg: i16,
        #[serde(skip_serializing_if = "Option::is_none")]
        seen_ago_ms: Option<u32>,
        pkts: u32,
    },
    /// Session status, once per second while a session runs
    #[serde(rename = "status")]
    Status {
        scanning: bool,
        mode: &'static str,
        /// Seconds since the session started
        elapsed: u32,
        wifi_frames: u32,
        ble_frames: u32,
        hits: u32,
        unique: u32,
        deauth: u32,
        disassoc: u32,
        beacons: u32,
        suspicious: u32,
        dropped: u32,
        board: &'static str,
        version: &'static str,
    },
    /// Reply to a console command
    #[serde(rename = "ack")]
    Ack {
        cmd: &'a str,
        ok: bool,
        #[serde(skip_serializing_if = "Option::is_none")]
        msg: Option<&'a str>,
    },
}

/// Commands sent from the console to the device.
///
/// Deserialized manually via [`RawCommand`] in `comm::parse_command()` because
/// `serde_json_core` does not support internally tagged enums (`deserialize_any`).
/// Missing fields already carry their defaults here.
#[derive(Debug, Clone, PartialEq)]
pub enum HostCommand {
    /// Start a watchlist scan
    Scan {
        mode: RadioMode,
        /// `<= 0` runs until stopped
        secs: i64,
        /// Empty selects the default channels
        channels: ChannelText,
    },
    /// Start tracking one device
    Track {
        mac: MacString,
        mode: RadioMode,
        secs: i64,
        channels: ChannelText,
    },
    /// Start a deauth or beacon-flood detector
    Detect { kind: FloodKind, secs: i64 },
    /// Stop the running session
    Stop,
    /// Request diagnostics
    Status,
    /// Request the last session's result summary
    Results,
    /// Read the watchlist, or replace it when `list` is given
    Targets { list: Option<TargetsText> },
    /// Update list-scan beep settings; a missing field keeps its value
    BeepConfig {
        beeps: Option<u8>,
        gap_ms: Option<u32>,
    },
    /// Enable or disable mesh notifications
    Mesh { enabled: bool },
}

/// Wire format for host commands: a flat struct that `serde_json_core` can
/// deserialize without `deserialize_any`. Converted to [`HostCommand`] in
/// `comm::parse_command()`.
#[derive(Deserialize)]
pub(crate) struct RawCommand {
    pub cmd: String<16>,
    #[serde(default)]
    pub mode: Option<String<12>>,
    #[serde(default)]
    pub secs: Option<i32>,
    #[serde(default)]
    pub forever: Option<bool>,
    #[serde(default)]
    pub ch: Option<ChannelText>,
    #[serde(default)]
    pub mac: Option<MacString>,
    #[serde(default)]
    pub kind: Option<String<16>>,
    #[serde(default)]
    pub list: Option<TargetsText>,
    #[serde(default)]
    pub beeps: Option<u8>,
    #[serde(default)]
    pub gap: Option<u32>,
    #[serde(default)]
    pub enabled: Option<bool>,
}

/// Firmware version string
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Maximum size of a serialized JSON message
pub const MAX_MSG_LEN: usize = 512;

#[cfg(test)]
mod tests {
    use super::*;

    fn to_json<'b>(msg: &DeviceMessage, buf: &'b mut [u8]) -> &'b str {
        let len = serde_json_core::to_slice(msg, buf).unwrap();
        core::str::from_utf8(&buf[..len]).unwrap()
    }

    #[test]
    fn host_command_equality() {
        assert_eq!(HostCommand::Stop, HostCommand::Stop);
        assert_eq!(
            HostCommand::Mesh { enabled: false },
            HostCommand::Mesh { enabled: false }
        );
        assert_ne!(HostCommand::Status, HostCommand::Results);
    }

    #[test]
    fn serialize_status_message() {
        let msg = DeviceMessage::Status {
            scanning: true,
            mode: "WiFi",
            elapsed: 12,
            wifi_frames: 3400,
            ble_frames: 0,
            hits: 2,
            unique: 1,
            deauth: 0,
            disassoc: 0,
            beacons: 0,
            suspicious: 0,
            dropped: 0,
            board: "test_board",
            version: "0.1.0",
        };
        let mut buf = [0u8; 512];
        let json = to_json(&msg, &mut buf);
        assert!(json.starts_with(r#"{"type":"status""#));
        assert!(json.contains(r#""scanning":true"#));
        assert!(json.contains(r#""mode":"WiFi""#));
        assert!(json.contains(r#""wifi_frames":3400"#));
        assert!(json.contains(r#""board":"test_board""#));
    }

    #[test]
    fn serialize_hit_message() {
        let mac = MacString::try_from("AA:BB:CC:DD:EE:FF").unwrap();
        let msg = DeviceMessage::Hit {
            mac: &mac,
            radio: "BLE",
            rssi: -61,
            ch: 0,
            name: "Tile",
            ts: 1000,
        };
        let mut buf = [0u8; 256];
        let json = to_json(&msg, &mut buf);
        assert!(json.contains(r#""type":"hit""#));
        assert!(json.contains(r#""mac":"AA:BB:CC:DD:EE:FF""#));
        assert!(json.contains(r#""radio":"BLE""#));
        assert!(json.contains(r#""rssi":-61"#));
        assert!(json.contains(r#""name":"Tile""#));
    }

    #[test]
    fn serialize_deauth_message() {
        let src = MacString::try_from("DE:AD:BE:EF:00:01").unwrap();
        let dst = MacString::try_from("FF:FF:FF:FF:FF:FF").unwrap();
        let msg = DeviceMessage::Deauth {
            kind: "DISASSOC",
            src: &src,
            dst: &dst,
            bssid: &src,
            rssi: -50,
            ch: 11,
            reason: 7,
            ts: 5,
        };
        let mut buf = [0u8; 256];
        let json = to_json(&msg, &mut buf);
        assert!(json.contains(r#""type":"deauth""#));
        assert!(json.contains(r#""kind":"DISASSOC""#));
        assert!(json.contains(r#""dst":"FF:FF:FF:FF:FF:FF""#));
        assert!(json.contains(r#""reason":7"#));
    }

    #[test]
    fn tracker_omits_unseen_age() {
        let mac = MacString::try_from("00:11:22:33:44:55").unwrap();
        let msg = DeviceMessage::Tracker {
            mac: &mac,
            rssi: -90,
            avg: -90,
            seen_ago_ms: None,
            pkts: 0,
        };
        let mut buf = [0u8; 256];
        let json = to_json(&msg, &mut buf);
        assert!(json.contains(r#""avg":-90"#));
        assert!(!json.contains("seen_ago_ms"));
    }

    #[test]
    fn ack_with_message() {
        let msg = DeviceMessage::Ack {
            cmd: "track",
            ok: false,
            msg: Some("Invalid MAC"),
        };
        let mut buf = [0u8; 128];
        assert_eq!(
            to_json(&msg, &mut buf),
            r#"{"type":"ack","cmd":"track","ok":false,"msg":"Invalid MAC"}"#
        );
    }

    #[test]
    fn version_is_semver() {
        let parts: heapless::Vec<&str, 4> = VERSION.split('.').collect();
        assert_eq!(
            parts.len(),
            3,
            "VERSION should be semver (major.minor.patch)"
        );
        for part in &parts {
            assert!(part.parse::<u32>().is_ok(), "'{part}' is not a number");
        }
    }
}
