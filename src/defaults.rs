/// Default tuning for capture, detection, tracking and reporting.
///
/// Every threshold the engine uses is named here once. Values follow the
/// field-tested Antihunter firmware so logs stay comparable between builds.

// ── Radio ────────────────────────────────────────────────────────────

/// Channel list used when the operator's channel spec yields nothing usable.
pub const DEFAULT_CHANNELS: &[u8] = &[1, 6, 11];

/// Highest 2.4 GHz channel accepted in a channel spec.
pub const MAX_CHANNEL: u8 = 14;

/// Channel hop timer period in milliseconds.
pub const HOP_PERIOD_MS: u32 = 300;

/// BLE scans run in short bursts so the worker loop keeps turning.
pub const BLE_SCAN_WINDOW_MS: u32 = 1000;
/// A new BLE burst is issued this long after the previous one started.
pub const BLE_SCAN_REISSUE_MS: u32 = 1100;

/// Regulatory domain applied on capture entry (first channel, channel count).
pub const REGULATORY_FIRST_CHANNEL: u8 = 1;
pub const REGULATORY_CHANNEL_COUNT: u8 = 13;
/// Max TX power in 0.25 dBm units.
pub const REGULATORY_MAX_TX_POWER: i8 = 78;

// ── Deauth / disassoc ────────────────────────────────────────────────

/// Minimum length of a deauth/disassoc frame (header + reason code).
pub const DEAUTH_MIN_FRAME_LEN: usize = 26;
/// Audio alert throttle while deauth detection runs.
pub const DEAUTH_ALERT_INTERVAL_MS: u32 = 3000;
pub const DEAUTH_ALERT_BEEPS: u8 = 4;
pub const DEAUTH_ALERT_GAP_MS: u32 = 80;

// ── Beacon flood ─────────────────────────────────────────────────────

/// Minimum length of a beacon worth analysing (header + fixed fields).
pub const BEACON_MIN_FRAME_LEN: usize = 36;
/// More than this many beacons from one source inside the window is a flood.
pub const BEACON_FLOOD_THRESHOLD: u32 = 50;
/// Trailing window for the flood count, in milliseconds.
pub const BEACON_TIMING_WINDOW_MS: u32 = 10_000;
/// Two beacons closer together than this are suspicious.
pub const MIN_BEACON_GAP_MS: u32 = 50;
/// A declared beacon interval below this (in TU) is suspicious.
pub const MIN_BEACON_INTERVAL_TU: u16 = 50;
/// Per-source timestamp ring length.
pub const BEACON_RING_LEN: usize = 20;
/// Number of distinct beacon sources tracked at once (power of two).
pub const BEACON_MAX_SOURCES: usize = 64;
/// How often stale per-source state is pruned.
pub const BEACON_PRUNE_INTERVAL_MS: u32 = 30_000;
/// Timestamps older than this are pruned.
pub const BEACON_PRUNE_AGE_MS: u32 = BEACON_TIMING_WINDOW_MS * 3;
/// Audio alert throttle while beacon-flood detection runs.
pub const BEACON_ALERT_INTERVAL_MS: u32 = 5000;
pub const BEACON_ALERT_BEEPS: u8 = 3;
pub const BEACON_ALERT_GAP_MS: u32 = 100;

// ── Tracker ──────────────────────────────────────────────────────────

/// A target frame seen within this many ms counts as "recent".
pub const TRACKER_RECENT_MS: u32 = 2000;
/// EMA blend weight toward the newest sample.
pub const TRACKER_EMA_ALPHA: f32 = 0.25;
/// Decay applied to the average per tick while the target is not recent.
pub const TRACKER_DECAY_STEP_DB: f32 = 0.05;
/// Floor the decaying average never drops below.
pub const TRACKER_FLOOR_DBM: f32 = -90.0;
/// Initial average at session start.
pub const TRACKER_INITIAL_DBM: f32 = -90.0;
/// RSSI range mapped onto the beep period / pitch.
pub const TRACKER_RSSI_MIN: f32 = -90.0;
pub const TRACKER_RSSI_MAX: f32 = -30.0;
pub const TRACKER_PERIOD_FAR_MS: u32 = 1000;
pub const TRACKER_PERIOD_NEAR_MS: u32 = 120;
pub const TRACKER_FREQ_FAR_HZ: u32 = 2000;
pub const TRACKER_FREQ_NEAR_HZ: u32 = 4500;
/// Fallback cue when the target has not been seen recently.
pub const TRACKER_LOST_PERIOD_MS: u32 = 1400;
pub const TRACKER_LOST_FREQ_HZ: u32 = 2200;
pub const TRACKER_BEEP_MS: u32 = 60;
pub const TRACKER_LOST_BEEP_MS: u32 = 40;
/// Delay before the first tracker beep.
pub const TRACKER_FIRST_BEEP_MS: u32 = 400;
/// Worker loop sleep between tracker ticks.
pub const TRACKER_TICK_MS: u32 = 10;

// ── Sessions ─────────────────────────────────────────────────────────

/// Longest finite session, in seconds.
pub const MAX_SESSION_SECS: u32 = 86_400;
/// Durations used when a start request names none.
pub const DEFAULT_SCAN_SECS: i64 = 60;
pub const DEFAULT_TRACK_SECS: i64 = 180;
pub const DEFAULT_DETECT_SECS: i64 = 300;
/// Tracker sessions sit on one channel unless told otherwise.
pub const DEFAULT_TRACK_CHANNELS: &str = "6";
/// Status line period.
pub const STATUS_INTERVAL_MS: u32 = 1000;
/// Longest blocking wait for a queued event before re-checking the stop flag.
pub const QUEUE_WAIT_MS: u32 = 100;
/// Sleep slice while polling an empty queue.
pub const QUEUE_POLL_MS: u32 = 10;

/// Result log capacities (oldest half is evicted on overflow).
pub const HIT_LOG_LEN: usize = 500;
pub const DEAUTH_LOG_LEN: usize = 500;
pub const BEACON_LOG_LEN: usize = 200;
/// Distinct devices remembered per list scan (power of two).
pub const UNIQUE_DEVICES_LEN: usize = 256;

/// Entries reproduced in result summaries.
pub const RESULT_HIT_SAMPLE: usize = 500;
pub const RESULT_DEAUTH_SAMPLE: usize = 100;
pub const RESULT_BEACON_SAMPLE: usize = 50;
pub const RESULT_TOP_SOURCES: usize = 10;
/// Size of the stored result summary and the diagnostics text.
pub const RESULT_TEXT_LEN: usize = 8192;
pub const DIAGNOSTICS_TEXT_LEN: usize = 1024;

// ── Capture bridge ───────────────────────────────────────────────────

pub const HIT_QUEUE_LEN: usize = 128;
pub const DEAUTH_QUEUE_LEN: usize = 256;
pub const BEACON_QUEUE_LEN: usize = 128;

// ── Control surface ──────────────────────────────────────────────────

/// Attempts to bring the control surface back after a session.
pub const RESTORE_ATTEMPTS: u8 = 3;
/// Base backoff between restore attempts; attempt `n` (from 1) waits `n` times this.
pub const RESTORE_BACKOFF_MS: u32 = 500;

// ── Audio ────────────────────────────────────────────────────────────

pub const DEFAULT_BEEPS_PER_HIT: u8 = 2;
pub const DEFAULT_BEEP_GAP_MS: u32 = 80;
pub const BEEPS_PER_HIT_RANGE: (u8, u8) = (1, 10);
pub const BEEP_GAP_RANGE_MS: (u32, u32) = (20, 2000);
/// Tone used by hit patterns.
pub const PATTERN_FREQ_HZ: u32 = 3200;
pub const PATTERN_BEEP_MS: u32 = 80;

// ── Mesh ─────────────────────────────────────────────────────────────

/// Longest line accepted by the mesh radio.
pub const MAX_MESH_LEN: usize = 230;
pub const MESH_HIT_INTERVAL_MS: u32 = 10_000;
pub const MESH_TRACKER_INTERVAL_MS: u32 = 15_000;

// ── Watchlist ────────────────────────────────────────────────────────

/// Maximum number of watchlist targets.
pub const MAX_TARGETS: usize = 128;
/// Maximum size of the persisted watchlist text: a full list of
/// `AA:BB:CC:DD:EE:FF\n` lines.
pub const WATCHLIST_TEXT_LEN: usize = MAX_TARGETS * 18;
