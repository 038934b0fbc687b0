/// Deauthentication / disassociation and beacon-flood detectors.
///
/// Both run inside the capture callback. The deauth detector is a pure
/// classifier with two atomic counters. The beacon detector keeps bounded
/// per-source timing state and only reports beacons it judges suspicious.
use core::sync::atomic::{AtomicU32, Ordering};

use heapless::index_map::FnvIndexMap;
use heapless::{Deque, String};
use ieee80211::match_frames;
use ieee80211::mgmt_frame::{BeaconFrame, DeauthenticationFrame, DisassociationFrame};

use crate::defaults::{
    BEACON_FLOOD_THRESHOLD, BEACON_MAX_SOURCES, BEACON_MIN_FRAME_LEN, BEACON_PRUNE_AGE_MS,
    BEACON_PRUNE_INTERVAL_MS, BEACON_RING_LEN, BEACON_TIMING_WINDOW_MS, DEAUTH_MIN_FRAME_LEN,
    MIN_BEACON_GAP_MS, MIN_BEACON_INTERVAL_TU,
};
use crate::mac::Mac;

/// SSID as carried in a beacon (at most 32 bytes).
pub type SsidString = String<32>;

/// First tagged element in a beacon body.
const BEACON_TAGS_OFFSET: usize = 36;
const TAG_SSID: u8 = 0;
const MAX_SSID_LEN: usize = 32;

/// One deauth or disassoc frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeauthHit {
    pub src: Mac,
    pub dest: Mac,
    pub bssid: Mac,
    pub rssi: i8,
    pub channel: u8,
    pub reason_code: u16,
    pub timestamp_ms: u32,
    pub is_disassoc: bool,
}

impl DeauthHit {
    pub fn kind(&self) -> &'static str {
        if self.is_disassoc {
            "DISASSOC"
        } else {
            "DEAUTH"
        }
    }
}

/// Classify a frame as deauth (subtype 12) or disassoc (subtype 10).
pub fn classify_deauth(frame: &[u8], rssi: i8, channel: u8, now_ms: u32) -> Option<DeauthHit> {
    if frame.len() < DEAUTH_MIN_FRAME_LEN {
        return None;
    }
    let hit = |dest: Mac, src: Mac, bssid: Mac, reason_code: u16, is_disassoc: bool| DeauthHit {
        src,
        dest,
        bssid,
        rssi,
        channel,
        reason_code,
        timestamp_ms: now_ms,
        is_disassoc,
    };
    let result = match_frames! {
        frame,
        deauth = DeauthenticationFrame<'_> => {
            hit(
                deauth.header.receiver_address.0,
                deauth.header.transmitter_address.0,
                deauth.header.bssid.0,
                deauth.body.reason.into_bits(),
                false,
            )
        }
        disassoc = DisassociationFrame<'_> => {
            hit(
                disassoc.header.receiver_address.0,
                disassoc.header.transmitter_address.0,
                disassoc.header.bssid.0,
                disassoc.body.reason.into_bits(),
                true,
            )
        }
    };
    result.ok()
}

/// Deauth/disassoc classifier with monotonically increasing counters.
pub struct DeauthDetector {
    deauth: AtomicU32,
    disassoc: AtomicU32,
}

impl DeauthDetector {
    pub const fn new() -> Self {
        Self {
            deauth: AtomicU32::new(0),
            disassoc: AtomicU32::new(0),
        }
    }

    /// Classify `frame` and count it. Safe to call from the capture callback.
    pub fn inspect(&self, frame: &[u8], rssi: i8, channel: u8, now_ms: u32) -> Option<DeauthHit> {
        let hit = classify_deauth(frame, rssi, channel, now_ms)?;
        if hit.is_disassoc {
            self.disassoc.fetch_add(1, Ordering::Relaxed);
        } else {
            self.deauth.fetch_add(1, Ordering::Relaxed);
        }
        Some(hit)
    }

    pub fn deauth_count(&self) -> u32 {
        self.deauth.load(Ordering::Relaxed)
    }

    pub fn disassoc_count(&self) -> u32 {
        self.disassoc.load(Ordering::Relaxed)
    }

    /// Zero both counters at session start.
    pub fn reset(&self) {
        self.deauth.store(0, Ordering::Relaxed);
        self.disassoc.store(0, Ordering::Relaxed);
    }
}

impl Default for DeauthDetector {
    fn default() -> Self {
        Self::new()
    }
}

/// A beacon judged suspicious.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BeaconHit {
    pub src: Mac,
    pub bssid: Mac,
    pub rssi: i8,
    pub channel: u8,
    pub timestamp_ms: u32,
    pub ssid: SsidString,
    /// Declared beacon interval in time units (1 TU = 1.024 ms), 0 if absent.
    pub beacon_interval: u16,
    /// Beacons seen from this source so far, including this one.
    pub source_count: u32,
}

/// Why a beacon was flagged.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Suspicion {
    pub short_gap: bool,
    pub flood: bool,
    pub short_interval: bool,
}

impl Suspicion {
    pub fn any(&self) -> bool {
        self.short_gap || self.flood || self.short_interval
    }
}

/// Result of running one qualifying beacon through the detector.
#[derive(Debug, Clone)]
pub struct BeaconObservation {
    pub hit: BeaconHit,
    pub suspicion: Suspicion,
}

/// One more than the flood threshold: the ring is full exactly when the
/// threshold has been crossed at some point.
const FLOOD_RING_LEN: usize = BEACON_FLOOD_THRESHOLD as usize + 1;

/// Timing state for one beacon source.
#[derive(Debug, Clone)]
pub struct FloodWindow {
    pub count: u32,
    pub last_seen_ms: u32,
    recent: Deque<u32, BEACON_RING_LEN>,
    flood: Deque<u32, FLOOD_RING_LEN>,
}

impl FloodWindow {
    fn new() -> Self {
        Self {
            count: 0,
            last_seen_ms: 0,
            recent: Deque::new(),
            flood: Deque::new(),
        }
    }

    /// Record a beacon at `now_ms` and evaluate the timing rules.
    fn observe(&mut self, now_ms: u32) -> Suspicion {
        self.count = self.count.saturating_add(1);
        self.last_seen_ms = now_ms;

        if self.recent.is_full() {
            self.recent.pop_front();
        }
        let _ = self.recent.push_back(now_ms);

        let mut s = Suspicion::default();
        let mut newest = self.recent.iter().rev();
        if let (Some(&cur), Some(&prev)) = (newest.next(), newest.next()) {
            if cur.wrapping_sub(prev) < MIN_BEACON_GAP_MS {
                s.short_gap = true;
            }
        }

        if self.flood.is_full() {
            self.flood.pop_front();
        }
        let _ = self.flood.push_back(now_ms);
        // More than the threshold within the window: the oldest of the last
        // threshold + 1 beacons is still inside it.
        if let (true, Some(&oldest)) = (self.flood.is_full(), self.flood.front()) {
            if now_ms.wrapping_sub(oldest) <= BEACON_TIMING_WINDOW_MS {
                s.flood = true;
            }
        }
        s
    }

    /// Timestamps currently held in the ring.
    pub fn recent_len(&self) -> usize {
        self.recent.len()
    }

    /// Drop ring entries older than `max_age_ms`. Returns true if the ring
    /// is now empty.
    fn prune(&mut self, now_ms: u32, max_age_ms: u32) -> bool {
        while let Some(&oldest) = self.flood.front() {
            if now_ms.wrapping_sub(oldest) > max_age_ms {
                self.flood.pop_front();
            } else {
                break;
            }
        }
        while let Some(&oldest) = self.recent.front() {
            if now_ms.wrapping_sub(oldest) > max_age_ms {
                self.recent.pop_front();
            } else {
                break;
            }
        }
        self.recent.is_empty()
    }
}

/// Stateful beacon-flood heuristic.
pub struct BeaconFloodDetector {
    sources: FnvIndexMap<Mac, FloodWindow, BEACON_MAX_SOURCES>,
    last_prune_ms: Option<u32>,
}

impl BeaconFloodDetector {
    pub const fn new() -> Self {
        Self {
            sources: FnvIndexMap::new(),
            last_prune_ms: None,
        }
    }

    /// Forget every source.
    pub fn reset(&mut self) {
        self.sources.clear();
        self.last_prune_ms = None;
    }

    /// Number of sources currently tracked.
    pub fn source_count(&self) -> usize {
        self.sources.len()
    }

    pub fn window(&self, src: &Mac) -> Option<&FloodWindow> {
        self.sources.get(src)
    }

    /// The `K` sources with the most beacons, highest first.
    pub fn top_sources<const K: usize>(&self) -> heapless::Vec<(Mac, u32), K> {
        let mut all: heapless::Vec<(Mac, u32), BEACON_MAX_SOURCES> =
            self.sources.iter().map(|(k, w)| (*k, w.count)).collect();
        all.sort_unstable_by(|a, b| b.1.cmp(&a.1).then(a.0.cmp(&b.0)));
        all.iter().take(K).copied().collect()
    }

    /// Run one frame through the detector.
    ///
    /// Returns `None` unless the frame is a management beacon of at least
    /// [`BEACON_MIN_FRAME_LEN`] bytes. Every qualifying beacon updates the
    /// source's state; `suspicion.any()` tells whether it should be reported.
    pub fn inspect(&mut self, frame: &[u8], rssi: i8, channel: u8, now_ms: u32) -> Option<BeaconObservation> {
        if frame.len() < BEACON_MIN_FRAME_LEN {
            return None;
        }
        let parsed = match_frames! {
            frame,
            beacon = BeaconFrame<'_> => {
                (
                    beacon.header.transmitter_address.0,
                    beacon.header.bssid.0,
                    beacon.body.beacon_interval,
                    beacon_ssid(frame, beacon.body.ssid()),
                )
            }
        };
        let (src, bssid, beacon_interval, ssid) = parsed.ok()?;

        self.maybe_prune(now_ms);

        let (mut suspicion, source_count) = match self.window_for(src) {
            Some(w) => {
                let s = w.observe(now_ms);
                (s, w.count)
            }
            // No room even after eviction; only the interval rule applies.
            None => (Suspicion::default(), 1),
        };
        if beacon_interval > 0 && beacon_interval < MIN_BEACON_INTERVAL_TU {
            suspicion.short_interval = true;
        }

        Some(BeaconObservation {
            hit: BeaconHit {
                src,
                bssid,
                rssi,
                channel,
                timestamp_ms: now_ms,
                ssid,
                beacon_interval,
                source_count,
            },
            suspicion,
        })
    }

    /// Prune stale timing state if the prune interval has elapsed.
    fn maybe_prune(&mut self, now_ms: u32) {
        match self.last_prune_ms {
            None => self.last_prune_ms = Some(now_ms),
            Some(last) if now_ms.wrapping_sub(last) > BEACON_PRUNE_INTERVAL_MS => {
                self.prune(now_ms);
            }
            Some(_) => {}
        }
    }

    /// Drop timestamps older than the prune age and sources left empty.
    pub fn prune(&mut self, now_ms: u32) {
        self.sources
            .retain(|_, w| !w.prune(now_ms, BEACON_PRUNE_AGE_MS));
        self.last_prune_ms = Some(now_ms);
    }

    /// Look up the window for `src`, creating it (evicting the stalest
    /// source if the table is full).
    fn window_for(&mut self, src: Mac) -> Option<&mut FloodWindow> {
        if !self.sources.contains_key(&src) {
            if self.sources.len() == self.sources.capacity() {
                let stalest = self
                    .sources
                    .iter()
                    .min_by_key(|(_, w)| w.last_seen_ms)
                    .map(|(k, _)| *k);
                if let Some(victim) = stalest {
                    self.sources.retain(|k, _| *k != victim);
                }
            }
            if self.sources.insert(src, FloodWindow::new()).is_err() {
                return None;
            }
        }
        self.sources.get_mut(&src)
    }
}

impl Default for BeaconFloodDetector {
    fn default() -> Self {
        Self::new()
    }
}

/// SSID for the report. Only taken when the first tagged element is the SSID
/// element; a non-UTF-8 SSID is rendered with `?` for each invalid byte.
fn beacon_ssid(frame: &[u8], parsed: Option<&str>) -> SsidString {
    let mut ssid = SsidString::new();
    let Some(tags) = frame.get(BEACON_TAGS_OFFSET..) else {
        return ssid;
    };
    if tags.len() < 2 || tags[0] != TAG_SSID {
        return ssid;
    }
    let len = tags[1] as usize;
    if len == 0 || len > MAX_SSID_LEN || len + 2 > tags.len() {
        return ssid;
    }
    match parsed {
        Some(text) => {
            let _ = ssid.push_str(text);
        }
        None => {
            for chunk in tags[2..2 + len].utf8_chunks() {
                let _ = ssid.push_str(chunk.valid());
                for _ in chunk.invalid() {
                    let _ = ssid.push('?');
                }
            }
        }
    }
    ssid
}
