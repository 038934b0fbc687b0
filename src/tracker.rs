/// Single-target proximity tracking.
///
/// [`TrackerProbe`] is the capture-side half: it holds the target and the raw
/// per-frame statistics, all updated with atomics from the capture callback.
/// [`Proximity`] is the worker-side half: it smooths the signal and turns it
/// into an audible cue.
use core::cell::Cell;
use core::sync::atomic::{AtomicBool, AtomicI8, AtomicU32, Ordering};

use critical_section::Mutex;

use crate::defaults::{
    TRACKER_BEEP_MS, TRACKER_DECAY_STEP_DB, TRACKER_EMA_ALPHA, TRACKER_FLOOR_DBM,
    TRACKER_FREQ_FAR_HZ, TRACKER_FREQ_NEAR_HZ, TRACKER_INITIAL_DBM, TRACKER_LOST_BEEP_MS,
    TRACKER_LOST_FREQ_HZ, TRACKER_LOST_PERIOD_MS, TRACKER_PERIOD_FAR_MS, TRACKER_PERIOD_NEAR_MS,
    TRACKER_RECENT_MS, TRACKER_RSSI_MAX, TRACKER_RSSI_MIN,
};
use crate::mac::Mac;

/// Reported RSSI before the target has been heard.
const UNSEEN_RSSI: i8 = -90;

/// Frozen view of the tracker, read by diagnostics and the mesh link.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TrackerState {
    pub target: Mac,
    pub last_rssi: i8,
    /// Uptime of the last frame from the target, `None` if never seen.
    pub last_seen_ms: Option<u32>,
    pub packets: u32,
    pub smoothed_dbm: f32,
}

impl TrackerState {
    /// Seconds since the target was last heard, `None` if never.
    pub fn seen_ago_secs(&self, now_ms: u32) -> Option<u32> {
        self.last_seen_ms.map(|t| now_ms.wrapping_sub(t) / 1000)
    }

    /// True if the target was heard within [`TRACKER_RECENT_MS`].
    pub fn is_recent(&self, now_ms: u32) -> bool {
        matches!(self.last_seen_ms, Some(t) if now_ms.wrapping_sub(t) < TRACKER_RECENT_MS)
    }
}

/// Capture-side tracker state.
pub struct TrackerProbe {
    target: Mutex<Cell<Mac>>,
    armed: AtomicBool,
    seen: AtomicBool,
    last_rssi: AtomicI8,
    last_seen_ms: AtomicU32,
    packets: AtomicU32,
}

impl TrackerProbe {
    pub const fn new() -> Self {
        Self {
            target: Mutex::new(Cell::new([0; 6])),
            armed: AtomicBool::new(false),
            seen: AtomicBool::new(false),
            last_rssi: AtomicI8::new(UNSEEN_RSSI),
            last_seen_ms: AtomicU32::new(0),
            packets: AtomicU32::new(0),
        }
    }

    /// Swap in a new target and zero the statistics, then start matching.
    pub fn arm(&self, target: Mac) {
        self.armed.store(false, Ordering::Release);
        critical_section::with(|cs| self.target.borrow(cs).set(target));
        self.seen.store(false, Ordering::Relaxed);
        self.last_rssi.store(UNSEEN_RSSI, Ordering::Relaxed);
        self.last_seen_ms.store(0, Ordering::Relaxed);
        self.packets.store(0, Ordering::Relaxed);
        self.armed.store(true, Ordering::Release);
    }

    /// Stop matching. Statistics stay readable until the next [`arm`](Self::arm).
    pub fn disarm(&self) {
        self.armed.store(false, Ordering::Release);
    }

    pub fn is_armed(&self) -> bool {
        self.armed.load(Ordering::Acquire)
    }

    pub fn target(&self) -> Mac {
        critical_section::with(|cs| self.target.borrow(cs).get())
    }

    /// True if `mac` is the armed target.
    #[inline]
    pub fn is_target(&self, mac: &Mac) -> bool {
        self.is_armed() && self.target() == *mac
    }

    /// Record one frame from the target. Called from the capture callback.
    pub fn record(&self, rssi: i8, now_ms: u32) {
        self.last_rssi.store(rssi, Ordering::Relaxed);
        self.last_seen_ms.store(now_ms, Ordering::Relaxed);
        self.seen.store(true, Ordering::Release);
        self.packets.fetch_add(1, Ordering::Relaxed);
    }

    pub fn last_rssi(&self) -> i8 {
        self.last_rssi.load(Ordering::Relaxed)
    }

    pub fn last_seen_ms(&self) -> Option<u32> {
        if self.seen.load(Ordering::Acquire) {
            Some(self.last_seen_ms.load(Ordering::Relaxed))
        } else {
            None
        }
    }

    pub fn packets(&self) -> u32 {
        self.packets.load(Ordering::Relaxed)
    }

    pub fn snapshot(&self, smoothed_dbm: f32) -> TrackerState {
        TrackerState {
            target: self.target(),
            last_rssi: self.last_rssi(),
            last_seen_ms: self.last_seen_ms(),
            packets: self.packets(),
            smoothed_dbm,
        }
    }
}

impl Default for TrackerProbe {
    fn default() -> Self {
        Self::new()
    }
}

/// Next audible cue for the tracker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BeepCue {
    /// Time until the following beep.
    pub period_ms: u32,
    pub freq_hz: u32,
    pub duration_ms: u32,
}

/// Smoothed signal estimate for the tracked target.
#[derive(Debug, Clone, Copy)]
pub struct Proximity {
    ema: f32,
}

impl Proximity {
    pub const fn new() -> Self {
        Self {
            ema: TRACKER_INITIAL_DBM,
        }
    }

    pub fn reset(&mut self) {
        self.ema = TRACKER_INITIAL_DBM;
    }

    pub fn smoothed(&self) -> f32 {
        self.ema
    }

    /// Advance one tick. `recent` carries the latest RSSI if the target was
    /// heard recently; otherwise the estimate decays toward the floor.
    pub fn update(&mut self, recent: Option<i8>) -> BeepCue {
        match recent {
            Some(rssi) => {
                self.ema = (1.0 - TRACKER_EMA_ALPHA) * self.ema + TRACKER_EMA_ALPHA * rssi as f32;
                let (period_ms, freq_hz) = map_proximity(self.ema);
                BeepCue {
                    period_ms,
                    freq_hz,
                    duration_ms: TRACKER_BEEP_MS,
                }
            }
            None => {
                self.ema -= TRACKER_DECAY_STEP_DB;
                if self.ema < TRACKER_FLOOR_DBM {
                    self.ema = TRACKER_FLOOR_DBM;
                }
                BeepCue {
                    period_ms: TRACKER_LOST_PERIOD_MS,
                    freq_hz: TRACKER_LOST_FREQ_HZ,
                    duration_ms: TRACKER_LOST_BEEP_MS,
                }
            }
        }
    }
}

impl Default for Proximity {
    fn default() -> Self {
        Self::new()
    }
}

/// Map a smoothed RSSI onto (beep period, tone frequency).
///
/// The estimate is truncated to whole dBm and clamped to
/// [`TRACKER_RSSI_MIN`]..=[`TRACKER_RSSI_MAX`]; stronger means a shorter
/// period and a higher pitch.
pub fn map_proximity(dbm: f32) -> (u32, u32) {
    let r = (dbm as i32).clamp(TRACKER_RSSI_MIN as i32, TRACKER_RSSI_MAX as i32) as f32;
    let a = (r - TRACKER_RSSI_MIN) / (TRACKER_RSSI_MAX - TRACKER_RSSI_MIN);
    let span_p = (TRACKER_PERIOD_FAR_MS - TRACKER_PERIOD_NEAR_MS) as f32;
    let span_f = (TRACKER_FREQ_NEAR_HZ - TRACKER_FREQ_FAR_HZ) as f32;
    let period = (TRACKER_PERIOD_FAR_MS as f32 - a * span_p) as u32;
    let freq = (TRACKER_FREQ_FAR_HZ as f32 + a * span_f) as u32;
    (period, freq)
}

#[cfg(test)]
mod tests {
    use super::*;

    const TARGET: Mac = [0x10, 0x20, 0x30, 0x40, 0x50, 0x60];

    #[test]
    fn mapping_endpoints() {
        assert_eq!(map_proximity(-90.0), (1000, 2000));
        assert_eq!(map_proximity(-30.0), (120, 4500));
        assert_eq!(map_proximity(-120.0), (1000, 2000));
        assert_eq!(map_proximity(-10.0), (120, 4500));
        assert_eq!(map_proximity(-60.0), (560, 3250));
    }

    #[test]
    fn ema_converges_and_period_shrinks() {
        let mut p = Proximity::new();
        let mut last_period = u32::MAX;
        let mut strictly_decreasing = true;
        for _ in 0..30 {
            let cue = p.update(Some(-40));
            if cue.period_ms > last_period {
                strictly_decreasing = false;
            }
            last_period = cue.period_ms;
        }
        assert!(strictly_decreasing);
        assert!((p.smoothed() - -40.0) < 0.5 && (p.smoothed() - -40.0) > -0.5);
        assert_eq!(last_period, map_proximity(-40.0).0);
    }

    #[test]
    fn period_strictly_decreases_with_signal() {
        let mut prev = map_proximity(-90.0).0;
        for dbm in -89..=-30 {
            let (period, _) = map_proximity(dbm as f32);
            assert!(period < prev, "period did not shrink at {dbm}");
            prev = period;
        }
    }

    #[test]
    fn lost_target_uses_fallback_and_floors() {
        let mut p = Proximity::new();
        p.update(Some(-50));
        let cue = p.update(None);
        assert_eq!(
            cue,
            BeepCue {
                period_ms: TRACKER_LOST_PERIOD_MS,
                freq_hz: TRACKER_LOST_FREQ_HZ,
                duration_ms: TRACKER_LOST_BEEP_MS,
            }
        );
        for _ in 0..10_000 {
            p.update(None);
        }
        assert_eq!(p.smoothed(), TRACKER_FLOOR_DBM);
    }

    #[test]
    fn probe_records_only_when_armed() {
        let probe = TrackerProbe::new();
        assert!(!probe.is_target(&TARGET));
        probe.arm(TARGET);
        assert!(probe.is_target(&TARGET));
        assert!(!probe.is_target(&[0; 6]));
        assert_eq!(probe.last_seen_ms(), None);

        probe.record(-55, 1200);
        probe.record(-52, 1300);
        let s = probe.snapshot(-60.0);
        assert_eq!(s.target, TARGET);
        assert_eq!(s.packets, 2);
        assert_eq!(s.last_rssi, -52);
        assert_eq!(s.last_seen_ms, Some(1300));
        assert!(s.is_recent(2000));
        assert!(!s.is_recent(3300));
        assert_eq!(s.seen_ago_secs(4300), Some(3));

        probe.disarm();
        assert!(!probe.is_target(&TARGET));
        assert_eq!(probe.packets(), 2);
    }

    #[test]
    fn rearm_resets_statistics() {
        let probe = TrackerProbe::new();
        probe.arm(TARGET);
        probe.record(-40, 10);
        probe.arm([1, 2, 3, 4, 5, 6]);
        assert_eq!(probe.packets(), 0);
        assert_eq!(probe.last_seen_ms(), None);
        assert_eq!(probe.target(), [1, 2, 3, 4, 5, 6]);
    }
}
