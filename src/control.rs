/// Control-surface operations.
///
/// [`Control`] is the one process-wide object the firmware keeps in a static.
/// Start requests validate their input and claim the session slot here; the
/// claimed [`SessionRequest`] is then run by the session worker through
/// [`Control::run`]. Everything else is read-only reporting plus the
/// persisted watchlist and beep settings.
use core::cell::{Cell, RefCell};
use core::fmt::{self, Write};
use core::sync::atomic::{AtomicBool, Ordering};

use critical_section::Mutex;
use heapless::String;

use crate::board::COUNTRY;
use crate::defaults::DIAGNOSTICS_TEXT_LEN;
use crate::mac::{mac_string, parse_mac};
use crate::platform::{BeepConfig, ConfigStore, Hardware};
use crate::radio::{parse_channels, ChannelHopper, ChannelList, RadioMode};
use crate::scanner::CaptureShared;
use crate::session::{
    run_session, FloodKind, ResultText, SessionContext, SessionDuration, SessionInfo, SessionKind,
    SessionRequest, SessionSlot, SessionState, StopFlag,
};
use crate::watchlist::{Watchlist, WatchlistText};

pub type DiagnosticsText = String<DIAGNOSTICS_TEXT_LEN>;

/// Why a start request was refused. Nothing changed in either case.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StartError {
    /// A session is already running; it keeps running.
    Busy,
    InvalidMac,
}

impl StartError {
    pub fn message(self) -> &'static str {
        match self {
            StartError::Busy => "Scan already running",
            StartError::InvalidMac => "Invalid MAC",
        }
    }
}

impl fmt::Display for StartError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.message())
    }
}

pub struct Control {
    pub capture: CaptureShared,
    pub hopper: ChannelHopper,
    pub slot: SessionSlot,
    pub stop: StopFlag,
    mesh_enabled: AtomicBool,
    beeps: Mutex<Cell<BeepConfig>>,
    last_result: Mutex<RefCell<ResultText>>,
}

impl Control {
    pub const fn new() -> Self {
        Self {
            capture: CaptureShared::new(),
            hopper: ChannelHopper::new(),
            slot: SessionSlot::new(),
            stop: StopFlag::new(),
            mesh_enabled: AtomicBool::new(true),
            beeps: Mutex::new(Cell::new(BeepConfig::new())),
            last_result: Mutex::new(RefCell::new(ResultText::new())),
        }
    }

    /// Apply the persisted watchlist and beep settings.
    pub fn load_config<S: ConfigStore + ?Sized>(&self, store: &mut S) {
        let list = Watchlist::load(&store.load_watchlist_text());
        log::info!("Loaded {} watchlist targets", list.len());
        self.capture.watchlist.replace(list);
        let beeps = store.load_beep_config().clamped();
        critical_section::with(|cs| self.beeps.borrow(cs).set(beeps));
    }

    // ── Session control ────────────────────────────────────────────

    pub fn start_session(
        &self,
        mode: RadioMode,
        secs: i64,
        channels: &str,
        now_ms: u32,
    ) -> Result<SessionRequest, StartError> {
        self.claim(SessionKind::ListScan(mode), secs, parse_channels(channels), now_ms)
    }

    /// The MAC is checked before anything else is touched.
    pub fn start_tracker(
        &self,
        mac: &str,
        mode: RadioMode,
        secs: i64,
        channels: &str,
        now_ms: u32,
    ) -> Result<SessionRequest, StartError> {
        let Some(target) = parse_mac(mac) else {
            log::warn!("Tracker start refused: invalid MAC {:?}", mac);
            return Err(StartError::InvalidMac);
        };
        self.claim(SessionKind::Tracker { target, mode }, secs, parse_channels(channels), now_ms)
    }

    /// Detectors keep the current hop list.
    pub fn start_flood_detector(&self, kind: FloodKind, secs: i64, now_ms: u32) -> Result<SessionRequest, StartError> {
        self.claim(SessionKind::Flood(kind), secs, self.hopper.channels(), now_ms)
    }

    fn claim(&self, kind: SessionKind, secs: i64, channels: ChannelList, now_ms: u32) -> Result<SessionRequest, StartError> {
        let duration = SessionDuration::from_secs(secs);
        let info = SessionInfo {
            kind,
            started_ms: now_ms,
            duration,
        };
        if !self.slot.try_claim(info) {
            log::warn!("{} refused: a session is already running", kind.label());
            return Err(StartError::Busy);
        }
        self.stop.clear();
        log::info!("{} accepted ({})", kind.label(), duration);
        Ok(SessionRequest {
            kind,
            duration,
            channels,
            beeps: self.beep_config(),
        })
    }

    /// Ask the running session to finish.
    pub fn stop(&self) {
        if self.slot.is_active() {
            log::info!("Stop requested");
        }
        self.stop.request();
    }

    /// Run a claimed session on the calling task, keep its summary and free
    /// the slot. Returns whether the control surface came back.
    pub fn run<H: Hardware>(&self, hw: &mut H, state: &mut SessionState, req: &SessionRequest) -> bool {
        let ctx = SessionContext {
            capture: &self.capture,
            hopper: &self.hopper,
            slot: &self.slot,
            stop: &self.stop,
            mesh_enabled: &self.mesh_enabled,
        };
        let outcome = run_session(&ctx, hw, state, req);
        critical_section::with(|cs| *self.last_result.borrow_ref_mut(cs) = outcome.result);
        // Clear before release: once the slot is free the next session's
        // stop may land at any moment.
        self.stop.clear();
        self.slot.release();
        outcome.restored
    }

    // ── Reporting ──────────────────────────────────────────────────

    pub fn diagnostics_text(&self, now_ms: u32) -> DiagnosticsText {
        let mut out = DiagnosticsText::new();
        let c = self.capture.counters();
        let active = self.slot.current();
        let shown = active.or_else(|| self.slot.last());
        let mode = shown.map_or(RadioMode::Wifi, |info| info.kind.radio_mode());

        let _ = writeln!(out, "Scan Mode: {}", mode.label());
        let _ = writeln!(out, "Scanning: {}", if active.is_some() { "yes" } else { "no" });
        if let Some(info) = active {
            let _ = writeln!(
                out,
                "Session: {} ({}s elapsed)",
                info.kind.label(),
                now_ms.wrapping_sub(info.started_ms) / 1000
            );
        }
        let _ = writeln!(out, "WiFi Frames seen: {}", c.wifi_frames);
        let _ = writeln!(out, "BLE Frames seen: {}", c.ble_frames);
        let _ = writeln!(out, "Total hits: {}", self.slot.hits());
        let _ = writeln!(out, "Country: {}", COUNTRY);
        let _ = writeln!(out, "Unique devices: {}", self.slot.unique());
        let _ = writeln!(out, "Targets: {}", self.capture.watchlist.len());

        if let Some(SessionInfo {
            kind: SessionKind::Tracker { .. },
            ..
        }) = active
        {
            let probe = &self.capture.tracker;
            let _ = write!(
                out,
                "Tracker: target={} lastRSSI={}dBm  lastSeen(ms ago)=",
                mac_string(&probe.target()),
                probe.last_rssi()
            );
            let _ = match probe.last_seen_ms() {
                Some(t) => write!(out, "{}", now_ms.wrapping_sub(t)),
                None => out.write_str("never"),
            };
            let _ = writeln!(out, " pkts={}", probe.packets());
        }

        let _ = writeln!(out, "Deauth frames: {}  Disassoc frames: {}", c.deauth, c.disassoc);
        let _ = writeln!(
            out,
            "Beacons: {}  Suspicious: {}  Sources: {}",
            c.beacons, c.suspicious_beacons, c.beacon_sources
        );
        let _ = writeln!(out, "Dropped events: {}", self.capture.bridge.dropped().total());
        if let Some(info) = shown {
            let _ = write!(out, "Last scan secs: {}", info.duration.secs());
            if info.duration.is_forever() {
                let _ = out.write_str(" (forever)");
            }
            let _ = writeln!(out);
        }
        let beeps = self.beep_config();
        let _ = writeln!(out, "Beeps/Hit: {}  Gap(ms): {}", beeps.beeps_per_hit, beeps.gap_ms);
        let _ = writeln!(out, "Mesh: {}", if self.mesh_enabled() { "on" } else { "off" });
        let _ = out.write_str("WiFi Channels:");
        for ch in self.hopper.channels() {
            let _ = write!(out, " {}", ch);
        }
        let _ = writeln!(out);
        out
    }

    /// Summary of the most recent finished session, empty before the first.
    pub fn last_result_text(&self) -> ResultText {
        critical_section::with(|cs| self.last_result.borrow_ref(cs).clone())
    }

    // ── Settings ───────────────────────────────────────────────────

    pub fn watchlist_text(&self) -> WatchlistText {
        self.capture.watchlist.serialize()
    }

    /// Replace and persist the watchlist. Returns the number of targets kept.
    pub fn save_watchlist<S: ConfigStore + ?Sized>(&self, store: &mut S, text: &str) -> usize {
        let list = Watchlist::load(text);
        let count = list.len();
        store.save_watchlist_text(&list.serialize());
        self.capture.watchlist.replace(list);
        log::info!("Watchlist saved: {} targets", count);
        count
    }

    pub fn beep_config(&self) -> BeepConfig {
        critical_section::with(|cs| self.beeps.borrow(cs).get())
    }

    /// Clamp, persist and apply. Takes effect from the next session.
    pub fn set_beep_config<S: ConfigStore + ?Sized>(&self, store: &mut S, config: BeepConfig) -> BeepConfig {
        let config = config.clamped();
        store.save_beep_config(config);
        critical_section::with(|cs| self.beeps.borrow(cs).set(config));
        log::info!("Beeps/hit {} gap {} ms", config.beeps_per_hit, config.gap_ms);
        config
    }

    pub fn mesh_enabled(&self) -> bool {
        self.mesh_enabled.load(Ordering::Relaxed)
    }

    pub fn set_mesh_enabled(&self, enabled: bool) {
        self.mesh_enabled.store(enabled, Ordering::Relaxed);
        log::info!("Mesh notifications {}", if enabled { "enabled" } else { "disabled" });
    }
}

impl Default for Control {
    fn default() -> Self {
        Self::new()
    }
}
