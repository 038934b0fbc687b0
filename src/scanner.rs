/// Capture-context dispatch for WiFi frames and BLE advertisements.
///
/// WiFi: the promiscuous callback hands every raw frame to
/// [`CaptureShared::on_wifi_frame`], which runs the flood detectors, extracts
/// candidate addresses and either feeds the tracker or queues watchlist hits.
/// BLE: each advertisement report goes through
/// [`CaptureShared::on_ble_advert`].
///
/// Everything here runs in the capture context: no blocking, no allocation,
/// and only atomics, short critical sections and `try_send` toward the worker.
use core::cell::RefCell;
use core::sync::atomic::{AtomicU32, Ordering};

use critical_section::Mutex;
use heapless::{String, Vec};

use crate::bridge::{CaptureBridge, EventKind};
use crate::defaults::RESULT_TOP_SOURCES;
use crate::detect::{BeaconFloodDetector, DeauthDetector};
use crate::frame::extract_candidates;
use crate::mac::Mac;
use crate::tracker::TrackerProbe;
use crate::watchlist::SharedWatchlist;

/// Display name carried by a hit.
pub type NameString = String<32>;

/// Name given to WiFi hits.
pub const WIFI_HIT_NAME: &str = "WiFi";
/// Name given to BLE hits whose advertisement carries no local name.
pub const UNKNOWN_BLE_NAME: &str = "Unknown";

/// A watchlist match from one frame or advertisement.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Hit {
    pub mac: Mac,
    pub rssi: i8,
    /// WiFi channel, 0 for BLE.
    pub channel: u8,
    pub name: NameString,
    pub is_ble: bool,
}

impl Hit {
    pub fn wifi(mac: Mac, rssi: i8, channel: u8) -> Self {
        let mut name = NameString::new();
        let _ = name.push_str(WIFI_HIT_NAME);
        Self {
            mac,
            rssi,
            channel,
            name,
            is_ble: false,
        }
    }

    pub fn ble(mac: Mac, rssi: i8, local_name: Option<&str>) -> Self {
        let mut name = NameString::new();
        match local_name {
            Some(n) if !n.is_empty() => push_truncated(&mut name, n),
            _ => {
                let _ = name.push_str(UNKNOWN_BLE_NAME);
            }
        }
        Self {
            mac,
            rssi,
            channel: 0,
            name,
            is_ble: true,
        }
    }

    pub fn radio(&self) -> &'static str {
        if self.is_ble {
            "BLE"
        } else {
            "WiFi"
        }
    }
}

/// Copy as much of `s` as fits, never splitting a character.
pub(crate) fn push_truncated<const N: usize>(out: &mut String<N>, s: &str) {
    for c in s.chars() {
        if out.push(c).is_err() {
            break;
        }
    }
}

/// Extract the local name from BLE advertisement data.
///
/// AD structure format: [length] [type] [data...]
///   0x08 = Shortened local name
///   0x09 = Complete local name (preferred)
pub fn ble_local_name(ad_data: &[u8]) -> Option<&str> {
    let mut shortened = None;
    let mut pos = 0;
    while pos < ad_data.len() {
        let len = ad_data[pos] as usize;
        if len == 0 || pos + 1 + len > ad_data.len() {
            break;
        }

        let ad_type = ad_data[pos + 1];
        let data = &ad_data[pos + 2..pos + 1 + len];

        match ad_type {
            0x09 => {
                if let Ok(name) = core::str::from_utf8(data) {
                    return Some(name);
                }
            }
            0x08 => {
                if let Ok(name) = core::str::from_utf8(data) {
                    shortened = Some(name);
                }
            }
            _ => {}
        }

        pos += 1 + len;
    }
    shortened
}

/// Raw capture counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CaptureCounters {
    pub wifi_frames: u32,
    pub ble_frames: u32,
    pub deauth: u32,
    pub disassoc: u32,
    pub beacons: u32,
    pub suspicious_beacons: u32,
    pub beacon_sources: u32,
}

/// State shared between the capture context and the session worker.
pub struct CaptureShared {
    pub watchlist: SharedWatchlist,
    pub tracker: TrackerProbe,
    pub deauth: DeauthDetector,
    pub bridge: CaptureBridge,
    beacon: Mutex<RefCell<BeaconFloodDetector>>,
    wifi_frames: AtomicU32,
    ble_frames: AtomicU32,
    beacons: AtomicU32,
    suspicious_beacons: AtomicU32,
    beacon_sources: AtomicU32,
}

impl CaptureShared {
    pub const fn new() -> Self {
        Self {
            watchlist: SharedWatchlist::new(),
            tracker: TrackerProbe::new(),
            deauth: DeauthDetector::new(),
            bridge: CaptureBridge::new(),
            beacon: Mutex::new(RefCell::new(BeaconFloodDetector::new())),
            wifi_frames: AtomicU32::new(0),
            ble_frames: AtomicU32::new(0),
            beacons: AtomicU32::new(0),
            suspicious_beacons: AtomicU32::new(0),
            beacon_sources: AtomicU32::new(0),
        }
    }

    /// Handle one promiscuous WiFi frame.
    pub fn on_wifi_frame(&self, frame: &[u8], rssi: i8, channel: u8, now_ms: u32) {
        if self.bridge.is_open(EventKind::Deauth) {
            if let Some(hit) = self.deauth.inspect(frame, rssi, channel, now_ms) {
                self.bridge.push_deauth(hit);
            }
        }
        if self.bridge.is_open(EventKind::Beacon) {
            self.inspect_beacon(frame, rssi, channel, now_ms);
        }
        self.wifi_frames.fetch_add(1, Ordering::Relaxed);

        let Some(candidates) = extract_candidates(frame) else {
            return;
        };

        if self.tracker.is_armed() {
            for mac in candidates.iter() {
                if self.tracker.is_target(mac) {
                    self.tracker.record(rssi, now_ms);
                }
            }
        } else if self.bridge.is_open(EventKind::Hit) {
            for mac in candidates.iter() {
                if self.watchlist.matches(mac) {
                    self.bridge.push_hit(Hit::wifi(*mac, rssi, channel));
                }
            }
        }
    }

    fn inspect_beacon(&self, frame: &[u8], rssi: i8, channel: u8, now_ms: u32) {
        let seen = critical_section::with(|cs| {
            let mut det = self.beacon.borrow_ref_mut(cs);
            let obs = det.inspect(frame, rssi, channel, now_ms);
            obs.map(|o| (o, det.source_count()))
        });
        let Some((obs, sources)) = seen else {
            return;
        };
        self.beacons.fetch_add(1, Ordering::Relaxed);
        self.beacon_sources.store(sources as u32, Ordering::Relaxed);
        if obs.suspicion.any() {
            self.suspicious_beacons.fetch_add(1, Ordering::Relaxed);
            self.bridge.push_beacon(obs.hit);
        }
    }

    /// Handle one BLE advertisement report.
    pub fn on_ble_advert(&self, addr: &Mac, rssi: i8, ad_data: &[u8], now_ms: u32) {
        self.ble_frames.fetch_add(1, Ordering::Relaxed);

        if self.tracker.is_armed() {
            if self.tracker.is_target(addr) {
                self.tracker.record(rssi, now_ms);
            }
        } else if self.bridge.is_open(EventKind::Hit) && self.watchlist.matches(addr) {
            self.bridge
                .push_hit(Hit::ble(*addr, rssi, ble_local_name(ad_data)));
        }
    }

    /// Zero every capture counter and forget beacon state.
    pub fn reset_counters(&self) {
        self.wifi_frames.store(0, Ordering::Relaxed);
        self.ble_frames.store(0, Ordering::Relaxed);
        self.beacons.store(0, Ordering::Relaxed);
        self.suspicious_beacons.store(0, Ordering::Relaxed);
        self.beacon_sources.store(0, Ordering::Relaxed);
        self.deauth.reset();
        critical_section::with(|cs| self.beacon.borrow_ref_mut(cs).reset());
    }

    pub fn counters(&self) -> CaptureCounters {
        CaptureCounters {
            wifi_frames: self.wifi_frames.load(Ordering::Relaxed),
            ble_frames: self.ble_frames.load(Ordering::Relaxed),
            deauth: self.deauth.deauth_count(),
            disassoc: self.deauth.disassoc_count(),
            beacons: self.beacons.load(Ordering::Relaxed),
            suspicious_beacons: self.suspicious_beacons.load(Ordering::Relaxed),
            beacon_sources: self.beacon_sources.load(Ordering::Relaxed),
        }
    }

    /// Busiest beacon sources, highest count first.
    pub fn top_beacon_sources(&self) -> Vec<(Mac, u32), RESULT_TOP_SOURCES> {
        critical_section::with(|cs| self.beacon.borrow_ref(cs).top_sources())
    }
}

impl Default for CaptureShared {
    fn default() -> Self {
        Self::new()
    }
}
