/// Mesh notifications: short text lines for the long-range link.
///
/// The link is slow and caps line length, so every message is pre-built into a
/// fixed [`MeshLine`] and each kind is rate-limited here before the transport
/// ever sees it.
use core::fmt::Write;

use heapless::String;

use crate::defaults::{MAX_MESH_LEN, MESH_HIT_INTERVAL_MS, MESH_TRACKER_INTERVAL_MS};
use crate::mac::{format_mac_lower, MacString};
use crate::platform::MeshLink;
use crate::scanner::{push_truncated, Hit, WIFI_HIT_NAME};
use crate::tracker::TrackerState;

pub type MeshLine = String<MAX_MESH_LEN>;

/// Reported as seconds-since-seen when the target was never heard.
const NEVER_SEEN_SECS: u32 = 999;

/// Minimum-interval gate. The first call always passes.
#[derive(Debug, Clone, Copy)]
pub struct RateLimit {
    interval_ms: u32,
    last_ms: Option<u32>,
}

impl RateLimit {
    pub const fn new(interval_ms: u32) -> Self {
        Self {
            interval_ms,
            last_ms: None,
        }
    }

    /// True (and the window restarts) if at least the interval has passed.
    pub fn ready(&mut self, now_ms: u32) -> bool {
        match self.last_ms {
            Some(last) if now_ms.wrapping_sub(last) < self.interval_ms => false,
            _ => {
                self.last_ms = Some(now_ms);
                true
            }
        }
    }

    pub fn reset(&mut self) {
        self.last_ms = None;
    }
}

/// `Target: <WiFi|BLE> <mac> RSSI:<n>[ Name:<name>]`
pub fn hit_line(hit: &Hit) -> MeshLine {
    let mut mac = MacString::new();
    format_mac_lower(&hit.mac, &mut mac);
    let mut line = MeshLine::new();
    let _ = write!(line, "Target: {} {} RSSI:{}", hit.radio(), mac, hit.rssi);
    if !hit.name.is_empty() && hit.name != WIFI_HIT_NAME && line.push_str(" Name:").is_ok() {
        push_truncated(&mut line, &hit.name);
    }
    line
}

/// `Tracking: <mac> RSSI:<n>dBm LastSeen:<s>s Pkts:<n>`
pub fn tracker_line(state: &TrackerState, now_ms: u32) -> MeshLine {
    let mut mac = MacString::new();
    format_mac_lower(&state.target, &mut mac);
    let ago = state.seen_ago_secs(now_ms).unwrap_or(NEVER_SEEN_SECS);
    let mut line = MeshLine::new();
    let _ = write!(
        line,
        "Tracking: {} RSSI:{}dBm LastSeen:{}s Pkts:{}",
        mac, state.last_rssi, ago, state.packets
    );
    line
}

/// Rate-limited mesh sender owned by the session worker.
#[derive(Debug, Clone, Copy)]
pub struct MeshNotifier {
    hits: RateLimit,
    tracker: RateLimit,
}

impl MeshNotifier {
    pub const fn new() -> Self {
        Self {
            hits: RateLimit::new(MESH_HIT_INTERVAL_MS),
            tracker: RateLimit::new(MESH_TRACKER_INTERVAL_MS),
        }
    }

    pub fn reset(&mut self) {
        self.hits.reset();
        self.tracker.reset();
    }

    /// Send a hit notification if enabled and not rate-limited.
    pub fn notify_hit<L: MeshLink + ?Sized>(&mut self, link: &mut L, enabled: bool, hit: &Hit, now_ms: u32) -> bool {
        if !enabled || !self.hits.ready(now_ms) {
            return false;
        }
        let line = hit_line(hit);
        log::info!("[MESH] {}", line);
        link.send_line(&line)
    }

    /// Send a tracker update if enabled and not rate-limited.
    pub fn notify_tracker<L: MeshLink + ?Sized>(
        &mut self,
        link: &mut L,
        enabled: bool,
        state: &TrackerState,
        now_ms: u32,
    ) -> bool {
        if !enabled || !self.tracker.ready(now_ms) {
            return false;
        }
        let line = tracker_line(state, now_ms);
        log::info!("[MESH] {}", line);
        link.send_line(&line)
    }
}

impl Default for MeshNotifier {
    fn default() -> Self {
        Self::new()
    }
}
