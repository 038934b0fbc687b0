/// Scan sessions: one worker-owned run from start request to result summary.
///
/// A session is `Idle → Running → Idle` and only one exists system-wide,
/// enforced by [`SessionSlot`]. [`run_session`] takes the control surface
/// offline, brings the radios up for the requested mode, drains the capture
/// queues until the duration elapses or [`StopFlag`] is raised, then builds
/// the result summary and brings the control surface back.
use core::cell::Cell;
use core::fmt::{self, Write};
use core::sync::atomic::{AtomicBool, AtomicU32, Ordering};

use critical_section::Mutex;
use heapless::index_set::FnvIndexSet;
use heapless::String;

use crate::board::BOARD_NAME;
use crate::bridge::{EventKind, EventKinds};
use crate::comm::emit;
use crate::defaults::{
    BEACON_ALERT_BEEPS, BEACON_ALERT_GAP_MS, BEACON_ALERT_INTERVAL_MS, BEACON_LOG_LEN,
    DEAUTH_ALERT_BEEPS, DEAUTH_ALERT_GAP_MS, DEAUTH_ALERT_INTERVAL_MS, DEAUTH_LOG_LEN,
    HIT_LOG_LEN, MAX_SESSION_SECS, QUEUE_POLL_MS, QUEUE_WAIT_MS, RESTORE_ATTEMPTS,
    RESTORE_BACKOFF_MS, RESULT_BEACON_SAMPLE, RESULT_DEAUTH_SAMPLE, RESULT_HIT_SAMPLE,
    RESULT_TEXT_LEN, STATUS_INTERVAL_MS, TRACKER_FIRST_BEEP_MS, TRACKER_TICK_MS,
    UNIQUE_DEVICES_LEN,
};
use crate::detect::{BeaconHit, DeauthHit};
use crate::eventlog::EventLog;
use crate::mac::{mac_string, Mac};
use crate::mesh::{MeshNotifier, RateLimit};
use crate::platform::{BeepConfig, Clock, ControlSurface, Hardware};
use crate::protocol::{DeviceMessage, VERSION};
use crate::radio::{ChannelHopper, ChannelList, RadioError, RadioLifecycle, RadioMode};
use crate::scanner::{CaptureShared, Hit, WIFI_HIT_NAME};
use crate::tracker::{Proximity, TrackerState};

/// Result summary of one session.
pub type ResultText = String<RESULT_TEXT_LEN>;

/// One formatted summary line.
type Line = String<160>;

/// Room kept free in a summary for the `... (N more)` trailer.
const TRAILER_RESERVE: usize = 32;

/// Which flood detector a detection session runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FloodKind {
    Deauth,
    BeaconFlood,
}

impl FloodKind {
    /// Accepts `deauth` and `beacon-flood` (or `beacon`).
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim() {
            "deauth" => Some(FloodKind::Deauth),
            "beacon-flood" | "beacon" => Some(FloodKind::BeaconFlood),
            _ => None,
        }
    }
}

/// What a session does.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionKind {
    /// Report every watchlist match.
    ListScan(RadioMode),
    /// Follow one device by signal strength.
    Tracker { target: Mac, mode: RadioMode },
    /// Watch for deauth or beacon floods. WiFi only.
    Flood(FloodKind),
}

impl SessionKind {
    pub fn radio_mode(self) -> RadioMode {
        match self {
            SessionKind::ListScan(mode) | SessionKind::Tracker { mode, .. } => mode,
            SessionKind::Flood(_) => RadioMode::Wifi,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            SessionKind::ListScan(_) => "List scan",
            SessionKind::Tracker { .. } => "Tracker",
            SessionKind::Flood(FloodKind::Deauth) => "Deauth detection",
            SessionKind::Flood(FloodKind::BeaconFlood) => "Beacon flood detection",
        }
    }

    /// Capture queues the session drains. Tracking needs none.
    pub fn event_kinds(self) -> EventKinds {
        match self {
            SessionKind::ListScan(_) => EventKinds::only(EventKind::Hit),
            SessionKind::Tracker { .. } => EventKinds::NONE,
            SessionKind::Flood(FloodKind::Deauth) => EventKinds::only(EventKind::Deauth),
            SessionKind::Flood(FloodKind::BeaconFlood) => EventKinds::only(EventKind::Beacon),
        }
    }
}

/// How long a session runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionDuration {
    Forever,
    Secs(u32),
}

impl SessionDuration {
    /// `secs <= 0` means forever; finite durations are capped at
    /// [`MAX_SESSION_SECS`].
    pub fn from_secs(secs: i64) -> Self {
        if secs <= 0 {
            SessionDuration::Forever
        } else {
            SessionDuration::Secs(secs.min(MAX_SESSION_SECS as i64) as u32)
        }
    }

    pub fn is_forever(self) -> bool {
        self == SessionDuration::Forever
    }

    /// Seconds, 0 for forever.
    pub fn secs(self) -> u32 {
        match self {
            SessionDuration::Forever => 0,
            SessionDuration::Secs(s) => s,
        }
    }

    fn expired(self, elapsed_ms: u32) -> bool {
        match self {
            SessionDuration::Forever => false,
            SessionDuration::Secs(s) => elapsed_ms >= s.saturating_mul(1000),
        }
    }
}

impl fmt::Display for SessionDuration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SessionDuration::Forever => f.write_str("forever"),
            SessionDuration::Secs(s) => write!(f, "{}s", s),
        }
    }
}

/// A validated start request, handed to the session worker.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionRequest {
    pub kind: SessionKind,
    pub duration: SessionDuration,
    pub channels: ChannelList,
    pub beeps: BeepConfig,
}

/// Process-wide cooperative cancellation.
pub struct StopFlag(AtomicBool);

impl StopFlag {
    pub const fn new() -> Self {
        Self(AtomicBool::new(false))
    }

    pub fn request(&self) {
        self.0.store(true, Ordering::Release);
    }

    pub fn clear(&self) {
        self.0.store(false, Ordering::Release);
    }

    pub fn is_set(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }
}

impl Default for StopFlag {
    fn default() -> Self {
        Self::new()
    }
}

/// Identity of a claimed session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionInfo {
    pub kind: SessionKind,
    pub started_ms: u32,
    pub duration: SessionDuration,
}

/// The single session slot. Claiming it is the "worker already active" guard.
pub struct SessionSlot {
    current: Mutex<Cell<Option<SessionInfo>>>,
    last: Mutex<Cell<Option<SessionInfo>>>,
    hits: AtomicU32,
    unique: AtomicU32,
}

impl SessionSlot {
    pub const fn new() -> Self {
        Self {
            current: Mutex::new(Cell::new(None)),
            last: Mutex::new(Cell::new(None)),
            hits: AtomicU32::new(0),
            unique: AtomicU32::new(0),
        }
    }

    /// Claim the slot for `info`. Fails, leaving the running session
    /// untouched, if one is already active.
    pub fn try_claim(&self, info: SessionInfo) -> bool {
        let claimed = critical_section::with(|cs| {
            let current = self.current.borrow(cs);
            if current.get().is_some() {
                false
            } else {
                current.set(Some(info));
                true
            }
        });
        if claimed {
            self.publish(0, 0);
        }
        claimed
    }

    /// Free the slot; the released session becomes [`last`](Self::last).
    pub fn release(&self) {
        critical_section::with(|cs| {
            if let Some(info) = self.current.borrow(cs).take() {
                self.last.borrow(cs).set(Some(info));
            }
        });
    }

    pub fn current(&self) -> Option<SessionInfo> {
        critical_section::with(|cs| self.current.borrow(cs).get())
    }

    pub fn last(&self) -> Option<SessionInfo> {
        critical_section::with(|cs| self.last.borrow(cs).get())
    }

    pub fn is_active(&self) -> bool {
        self.current().is_some()
    }

    /// Hit counters exposed to diagnostics, written by the worker.
    pub fn publish(&self, hits: u32, unique: u32) {
        self.hits.store(hits, Ordering::Relaxed);
        self.unique.store(unique, Ordering::Relaxed);
    }

    pub fn hits(&self) -> u32 {
        self.hits.load(Ordering::Relaxed)
    }

    pub fn unique(&self) -> u32 {
        self.unique.load(Ordering::Relaxed)
    }
}

impl Default for SessionSlot {
    fn default() -> Self {
        Self::new()
    }
}

/// Worker-owned session state. Nothing else mutates it while a session runs.
pub struct SessionState {
    hits: EventLog<Hit, HIT_LOG_LEN>,
    deauths: EventLog<DeauthHit, DEAUTH_LOG_LEN>,
    beacons: EventLog<BeaconHit, BEACON_LOG_LEN>,
    unique: FnvIndexSet<Mac, UNIQUE_DEVICES_LEN>,
    total_hits: u32,
    proximity: Proximity,
    next_beep_ms: u32,
    mesh: MeshNotifier,
    alert: RateLimit,
    radio: RadioLifecycle,
}

impl SessionState {
    pub const fn new() -> Self {
        Self {
            hits: EventLog::new(),
            deauths: EventLog::new(),
            beacons: EventLog::new(),
            unique: FnvIndexSet::new(),
            total_hits: 0,
            proximity: Proximity::new(),
            next_beep_ms: 0,
            mesh: MeshNotifier::new(),
            alert: RateLimit::new(DEAUTH_ALERT_INTERVAL_MS),
            radio: RadioLifecycle::new(),
        }
    }

    fn reset(&mut self, kind: SessionKind) {
        self.hits.clear();
        self.deauths.clear();
        self.beacons.clear();
        self.unique.clear();
        self.total_hits = 0;
        self.proximity.reset();
        self.mesh.reset();
        self.alert = match kind {
            SessionKind::Flood(FloodKind::BeaconFlood) => RateLimit::new(BEACON_ALERT_INTERVAL_MS),
            _ => RateLimit::new(DEAUTH_ALERT_INTERVAL_MS),
        };
    }

    pub fn total_hits(&self) -> u32 {
        self.total_hits
    }

    pub fn unique_devices(&self) -> usize {
        self.unique.len()
    }

    fn on_hit<H: Hardware>(&mut self, ctx: &SessionContext<'_>, hw: &mut H, req: &SessionRequest, hit: Hit) {
        let now = hw.now_ms();
        self.total_hits = self.total_hits.saturating_add(1);
        // A full set keeps counting hits, just not new devices.
        let _ = self.unique.insert(hit.mac);
        ctx.slot.publish(self.total_hits, self.unique.len() as u32);

        emit(&DeviceMessage::Hit {
            mac: &mac_string(&hit.mac),
            radio: hit.radio(),
            rssi: hit.rssi,
            ch: hit.channel,
            name: &hit.name,
            ts: now,
        });
        hw.beep_pattern(req.beeps.beeps_per_hit, req.beeps.gap_ms);
        self.mesh
            .notify_hit(hw, ctx.mesh_enabled.load(Ordering::Relaxed), &hit, now);
        self.hits.push(hit);
    }

    fn on_deauth<H: Hardware>(&mut self, hw: &mut H, hit: DeauthHit) {
        let now = hw.now_ms();
        emit(&DeviceMessage::Deauth {
            kind: hit.kind(),
            src: &mac_string(&hit.src),
            dst: &mac_string(&hit.dest),
            bssid: &mac_string(&hit.bssid),
            rssi: hit.rssi,
            ch: hit.channel,
            reason: hit.reason_code,
            ts: hit.timestamp_ms,
        });
        if self.alert.ready(now) {
            hw.beep_pattern(DEAUTH_ALERT_BEEPS, DEAUTH_ALERT_GAP_MS);
        }
        self.deauths.push(hit);
    }

    fn on_beacon<H: Hardware>(&mut self, hw: &mut H, hit: BeaconHit) {
        let now = hw.now_ms();
        emit(&DeviceMessage::Beacon {
            src: &mac_string(&hit.src),
            bssid: &mac_string(&hit.bssid),
            ssid: &hit.ssid,
            rssi: hit.rssi,
            ch: hit.channel,
            interval: hit.beacon_interval,
            count: hit.source_count,
            ts: hit.timestamp_ms,
        });
        if self.alert.ready(now) {
            hw.beep_pattern(BEACON_ALERT_BEEPS, BEACON_ALERT_GAP_MS);
        }
        self.beacons.push(hit);
    }

    /// One tracker tick: smooth the signal, beep when due, update the mesh.
    fn tracker_tick<H: Hardware>(&mut self, ctx: &SessionContext<'_>, hw: &mut H, now: u32) {
        let mut snapshot = ctx.capture.tracker.snapshot(self.proximity.smoothed());
        let recent = snapshot.is_recent(now).then_some(snapshot.last_rssi);
        let cue = self.proximity.update(recent);
        if is_due(now, self.next_beep_ms) {
            hw.beep(cue.freq_hz, cue.duration_ms);
            self.next_beep_ms = now.wrapping_add(cue.period_ms);
        }
        snapshot.smoothed_dbm = self.proximity.smoothed();
        self.mesh
            .notify_tracker(hw, ctx.mesh_enabled.load(Ordering::Relaxed), &snapshot, now);
    }
}

impl Default for SessionState {
    fn default() -> Self {
        Self::new()
    }
}

/// Shared pieces a session works against.
pub struct SessionContext<'a> {
    pub capture: &'a CaptureShared,
    pub hopper: &'a ChannelHopper,
    pub slot: &'a SessionSlot,
    pub stop: &'a StopFlag,
    pub mesh_enabled: &'a AtomicBool,
}

/// What a finished session leaves behind.
#[derive(Debug)]
pub struct SessionOutcome {
    pub result: ResultText,
    /// Set if the radios never came up; the session ended immediately.
    pub radio_error: Option<RadioError>,
    /// Whether the control surface came back.
    pub restored: bool,
}

/// Run one session to completion on the calling task.
pub fn run_session<H: Hardware>(
    ctx: &SessionContext<'_>,
    hw: &mut H,
    state: &mut SessionState,
    req: &SessionRequest,
) -> SessionOutcome {
    let kind = req.kind;
    let mode = kind.radio_mode();
    log::info!(
        "[SESSION] {} starting: mode={} duration={}",
        kind.label(),
        mode.label(),
        req.duration
    );

    hw.shut_down();
    state.reset(kind);
    ctx.capture.reset_counters();
    ctx.hopper.load(&req.channels);
    match kind {
        SessionKind::Tracker { target, .. } => ctx.capture.tracker.arm(target),
        _ => ctx.capture.tracker.disarm(),
    }
    ctx.capture.bridge.open(kind.event_kinds());

    let started = hw.now_ms();
    let radio_error = match state.radio.enter(hw, ctx.hopper, mode, started) {
        Ok(_) => {
            run_loop(ctx, hw, state, req, started);
            None
        }
        Err(e) => {
            log::error!("[SESSION] radio start failed: {}", e);
            Some(e)
        }
    };

    state.radio.exit(hw);
    ctx.capture.bridge.close();
    let tracker = ctx.capture.tracker.snapshot(state.proximity.smoothed());
    ctx.capture.tracker.disarm();

    let elapsed = hw.now_ms().wrapping_sub(started);
    let dropped = ctx.capture.bridge.dropped().total();
    if dropped > 0 {
        log::warn!("[SESSION] {} events dropped on full queues", dropped);
    }
    log::info!("[SESSION] {} finished after {} ms", kind.label(), elapsed);

    let mut result = summarize(ctx, state, req, &tracker);
    if let Some(e) = radio_error {
        let _ = writeln!(result, "Radio start failed: {}", e);
    }
    let restored = restore_control_surface(hw);

    SessionOutcome {
        result,
        radio_error,
        restored,
    }
}

fn run_loop<H: Hardware>(
    ctx: &SessionContext<'_>,
    hw: &mut H,
    state: &mut SessionState,
    req: &SessionRequest,
    started: u32,
) {
    let mut next_status = started;
    state.next_beep_ms = started.wrapping_add(TRACKER_FIRST_BEEP_MS);

    loop {
        let now = hw.now_ms();
        if ctx.stop.is_set() {
            log::info!("[SESSION] stop requested");
            break;
        }
        if req.duration.expired(now.wrapping_sub(started)) {
            break;
        }
        if is_due(now, next_status) {
            emit_status(ctx, state, req, started, now);
            next_status = now.wrapping_add(STATUS_INTERVAL_MS);
        }
        state.radio.poll_ble(hw, now);

        match req.kind {
            SessionKind::ListScan(_) => {
                if let Some(hit) = recv_within(hw, ctx.stop, || ctx.capture.bridge.try_recv_hit()) {
                    state.on_hit(ctx, hw, req, hit);
                }
            }
            SessionKind::Flood(FloodKind::Deauth) => {
                if let Some(hit) = recv_within(hw, ctx.stop, || ctx.capture.bridge.try_recv_deauth()) {
                    state.on_deauth(hw, hit);
                }
            }
            SessionKind::Flood(FloodKind::BeaconFlood) => {
                if let Some(hit) = recv_within(hw, ctx.stop, || ctx.capture.bridge.try_recv_beacon()) {
                    state.on_beacon(hw, hit);
                }
            }
            SessionKind::Tracker { .. } => {
                state.tracker_tick(ctx, hw, now);
                hw.sleep_ms(TRACKER_TICK_MS);
            }
        }
    }
}

/// Poll `recv` until it yields or [`QUEUE_WAIT_MS`] passes. Returns early on
/// a stop request.
fn recv_within<C, T, F>(clock: &mut C, stop: &StopFlag, mut recv: F) -> Option<T>
where
    C: Clock,
    F: FnMut() -> Option<T>,
{
    let mut waited = 0;
    loop {
        if let Some(event) = recv() {
            return Some(event);
        }
        if waited >= QUEUE_WAIT_MS || stop.is_set() {
            return None;
        }
        clock.sleep_ms(QUEUE_POLL_MS);
        waited += QUEUE_POLL_MS;
    }
}

fn is_due(now: u32, at: u32) -> bool {
    (now.wrapping_sub(at) as i32) >= 0
}

fn emit_status(ctx: &SessionContext<'_>, state: &SessionState, req: &SessionRequest, started: u32, now: u32) {
    let c = ctx.capture.counters();
    emit(&DeviceMessage::Status {
        scanning: true,
        mode: req.kind.radio_mode().label(),
        elapsed: now.wrapping_sub(started) / 1000,
        wifi_frames: c.wifi_frames,
        ble_frames: c.ble_frames,
        hits: state.total_hits,
        unique: state.unique.len() as u32,
        deauth: c.deauth,
        disassoc: c.disassoc,
        beacons: c.beacons,
        suspicious: c.suspicious_beacons,
        dropped: ctx.capture.bridge.dropped().total(),
        board: BOARD_NAME,
        version: VERSION,
    });
    if let SessionKind::Tracker { .. } = req.kind {
        let snap = ctx.capture.tracker.snapshot(state.proximity.smoothed());
        emit(&DeviceMessage::Tracker {
            mac: &mac_string(&snap.target),
            rssi: snap.last_rssi,
            avg: snap.smoothed_dbm as i16,
            seen_ago_ms: snap.last_seen_ms.map(|t| now.wrapping_sub(t)),
            pkts: snap.packets,
        });
    }
}

/// Bring the control surface back, reinitializing the radio between
/// attempts. Returns false once every attempt has failed.
pub fn restore_control_surface<H: Clock + ControlSurface + ?Sized>(hw: &mut H) -> bool {
    for attempt in 1..=RESTORE_ATTEMPTS {
        hw.sleep_ms(RESTORE_BACKOFF_MS * attempt as u32);
        if hw.try_bring_up() {
            log::info!("[AP] control surface up (attempt {})", attempt);
            return true;
        }
        log::warn!("[AP] restore attempt {}/{} failed", attempt, RESTORE_ATTEMPTS);
        if attempt < RESTORE_ATTEMPTS {
            hw.reset_radio();
        }
    }
    log::error!("[AP] control surface still down after {} attempts", RESTORE_ATTEMPTS);
    false
}

// ── Result summaries ───────────────────────────────────────────────────

fn summarize(ctx: &SessionContext<'_>, state: &SessionState, req: &SessionRequest, tracker: &TrackerState) -> ResultText {
    let mut out = ResultText::new();
    let c = ctx.capture.counters();
    let _ = writeln!(
        out,
        "{} - Mode: {} Duration: {}",
        req.kind.label(),
        req.kind.radio_mode().label(),
        req.duration
    );
    let _ = writeln!(out, "WiFi Frames seen: {}", c.wifi_frames);

    match req.kind {
        SessionKind::ListScan(_) => {
            let _ = writeln!(out, "BLE Frames seen: {}", c.ble_frames);
            let _ = writeln!(out, "Total hits: {}", state.total_hits);
            let _ = writeln!(out, "Unique devices: {}", state.unique.len());
            let _ = writeln!(out);
            push_lines(&mut out, state.hits.iter(), state.hits.len(), RESULT_HIT_SAMPLE, hit_line);
        }
        SessionKind::Tracker { .. } => {
            let _ = writeln!(out, "BLE Frames seen: {}", c.ble_frames);
            let _ = writeln!(out, "Target: {}", mac_string(&tracker.target));
            let _ = writeln!(out, "Packets from target: {}", tracker.packets);
            let _ = writeln!(out, "Last RSSI: {}dBm", tracker.last_rssi);
        }
        SessionKind::Flood(FloodKind::Deauth) => {
            let _ = writeln!(out, "Deauth frames detected: {}", c.deauth);
            let _ = writeln!(out, "Disassoc frames detected: {}", c.disassoc);
            let _ = writeln!(out);
            push_lines(
                &mut out,
                state.deauths.iter(),
                state.deauths.len(),
                RESULT_DEAUTH_SAMPLE,
                deauth_line,
            );
        }
        SessionKind::Flood(FloodKind::BeaconFlood) => {
            let _ = writeln!(out, "Total beacons: {}", c.beacons);
            let _ = writeln!(out, "Suspicious beacons: {}", c.suspicious_beacons);
            let _ = writeln!(out, "Unique sources: {}", c.beacon_sources);
            let _ = writeln!(out);
            let _ = writeln!(out, "Top beacon sources:");
            for (mac, count) in ctx.capture.top_beacon_sources() {
                let _ = writeln!(out, "{}: {} beacons", mac_string(&mac), count);
            }
            let _ = writeln!(out);
            let _ = writeln!(out, "Recent suspicious beacons:");
            // Newest entries, oldest first.
            let skip = state.beacons.len().saturating_sub(RESULT_BEACON_SAMPLE);
            push_lines(
                &mut out,
                state.beacons.iter().skip(skip),
                state.beacons.len(),
                RESULT_BEACON_SAMPLE,
                beacon_line,
            );
        }
    }

    let dropped = ctx.capture.bridge.dropped().total();
    if dropped > 0 {
        let _ = writeln!(out, "Dropped events: {}", dropped);
    }
    out
}

/// Append up to `cap` entries, one line each, then `... (N more)` for
/// whatever did not fit.
fn push_lines<'e, T: 'e, I, F>(out: &mut ResultText, entries: I, total: usize, cap: usize, mut format: F)
where
    I: Iterator<Item = &'e T>,
    F: FnMut(&mut Line, &T),
{
    let mut written = 0;
    for entry in entries.take(cap) {
        let mut line = Line::new();
        format(&mut line, entry);
        let _ = line.push('\n');
        if out.capacity() - out.len() < line.len() + TRAILER_RESERVE {
            break;
        }
        let _ = out.push_str(&line);
        written += 1;
    }
    if total > written {
        let _ = writeln!(out, "... ({} more)", total - written);
    }
}

fn hit_line(line: &mut Line, hit: &Hit) {
    let _ = write!(line, "{:<4} {}  RSSI={}dBm", hit.radio(), mac_string(&hit.mac), hit.rssi);
    if !hit.is_ble {
        let _ = write!(line, "  ch={}", hit.channel);
    }
    if !hit.name.is_empty() && hit.name != WIFI_HIT_NAME {
        let _ = write!(line, "  name={}", hit.name);
    }
}

fn deauth_line(line: &mut Line, hit: &DeauthHit) {
    let _ = write!(
        line,
        "{} {} -> {} BSSID:{} RSSI:{}dBm CH:{} Reason:{}",
        hit.kind(),
        mac_string(&hit.src),
        mac_string(&hit.dest),
        mac_string(&hit.bssid),
        hit.rssi,
        hit.channel,
        hit.reason_code
    );
}

fn beacon_line(line: &mut Line, hit: &BeaconHit) {
    let _ = write!(
        line,
        "{} '{}' RSSI:{}dBm CH:{} Int:{}",
        mac_string(&hit.src),
        hit.ssid,
        hit.rssi,
        hit.channel,
        hit.beacon_interval
    );
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::detect::tests::{beacon_frame, deauth_frame, ATTACKER};
    use crate::frame::tests::{header, A1, A2, A3};
    use crate::frame::SUBTYPE_DEAUTH;
    use crate::mesh::MeshLine;
    use crate::platform::{AudioOut, MeshLink};
    use crate::radio::tests::FakeRadio;
    use crate::radio::RadioDriver;
    use crate::watchlist::Watchlist;

    /// Everything a session shares, owned by the test.
    pub struct Env {
        pub capture: CaptureShared,
        pub hopper: ChannelHopper,
        pub slot: SessionSlot,
        pub stop: StopFlag,
        pub mesh: AtomicBool,
    }

    impl Env {
        pub fn new() -> Self {
            Self {
                capture: CaptureShared::new(),
                hopper: ChannelHopper::new(),
                slot: SessionSlot::new(),
                stop: StopFlag::new(),
                mesh: AtomicBool::new(true),
            }
        }

        pub fn ctx(&self) -> SessionContext<'_> {
            SessionContext {
                capture: &self.capture,
                hopper: &self.hopper,
                slot: &self.slot,
                stop: &self.stop,
                mesh_enabled: &self.mesh,
            }
        }
    }

    /// Board double. Time only moves when the session sleeps, and `script`
    /// runs after every sleep to play the capture side.
    pub struct FakeHw<'a> {
        pub env: &'a Env,
        pub script: fn(&Env, u32),
        pub now: u32,
        pub radio: FakeRadio,
        pub beeps: heapless::Vec<(u32, u32), 512>,
        pub patterns: heapless::Vec<(u8, u32), 32>,
        pub mesh: heapless::Vec<MeshLine, 8>,
        pub surface_up: bool,
        pub bring_up_failures: u8,
        pub bring_up_calls: u8,
        pub radio_resets: u8,
    }

    impl<'a> FakeHw<'a> {
        pub fn new(env: &'a Env, script: fn(&Env, u32)) -> Self {
            Self {
                env,
                script,
                now: 0,
                radio: FakeRadio::default(),
                beeps: heapless::Vec::new(),
                patterns: heapless::Vec::new(),
                mesh: heapless::Vec::new(),
                surface_up: true,
                bring_up_failures: 0,
                bring_up_calls: 0,
                radio_resets: 0,
            }
        }
    }

    pub fn idle(_: &Env, _: u32) {}

    impl Clock for FakeHw<'_> {
        fn now_ms(&self) -> u32 {
            self.now
        }
        fn sleep_ms(&mut self, ms: u32) {
            self.now += ms;
            (self.script)(self.env, self.now);
        }
    }

    impl AudioOut for FakeHw<'_> {
        fn beep(&mut self, freq_hz: u32, duration_ms: u32) {
            let _ = self.beeps.push((freq_hz, duration_ms));
        }
        fn beep_pattern(&mut self, count: u8, gap_ms: u32) {
            let _ = self.patterns.push((count, gap_ms));
        }
    }

    impl MeshLink for FakeHw<'_> {
        fn send_line(&mut self, line: &str) -> bool {
            let mut l = MeshLine::new();
            let _ = l.push_str(line);
            self.mesh.push(l).is_ok()
        }
    }

    impl ControlSurface for FakeHw<'_> {
        fn shut_down(&mut self) {
            self.surface_up = false;
        }
        fn try_bring_up(&mut self) -> bool {
            self.bring_up_calls += 1;
            if self.bring_up_failures > 0 {
                self.bring_up_failures -= 1;
                return false;
            }
            self.surface_up = true;
            true
        }
        fn reset_radio(&mut self) {
            self.radio_resets += 1;
        }
    }

    impl RadioDriver for FakeHw<'_> {
        fn set_country(&mut self) -> Result<(), RadioError> {
            self.radio.set_country()
        }
        fn start_promiscuous(&mut self) -> Result<(), RadioError> {
            // Capture is only possible with the control surface down.
            assert!(!self.surface_up);
            self.radio.start_promiscuous()
        }
        fn stop_promiscuous(&mut self) {
            self.radio.stop_promiscuous()
        }
        fn set_channel(&mut self, channel: u8) -> Result<(), RadioError> {
            self.radio.set_channel(channel)
        }
        fn start_hop_timer(&mut self, period_ms: u32) -> Result<(), RadioError> {
            self.radio.start_hop_timer(period_ms)
        }
        fn stop_hop_timer(&mut self) {
            self.radio.stop_hop_timer()
        }
        fn set_coex_balanced(&mut self) -> Result<(), RadioError> {
            self.radio.set_coex_balanced()
        }
        fn init_ble_scan(&mut self) -> Result<(), RadioError> {
            self.radio.init_ble_scan()
        }
        fn ble_scan_burst(&mut self, window_ms: u32) -> Result<(), RadioError> {
            self.radio.ble_scan_burst(window_ms)
        }
        fn stop_ble_scan(&mut self) {
            self.radio.stop_ble_scan()
        }
    }

    pub fn request(kind: SessionKind, secs: i64) -> SessionRequest {
        SessionRequest {
            kind,
            duration: SessionDuration::from_secs(secs),
            channels: crate::radio::parse_channels("1,6,11"),
            beeps: BeepConfig::new(),
        }
    }

    /// Data frame toward the AP, sent by `A2`.
    fn frame_from_a2() -> [u8; 24] {
        header(2, 0, true, false, A1, A2, A3)
    }

    #[test]
    fn durations() {
        assert_eq!(SessionDuration::from_secs(0), SessionDuration::Forever);
        assert_eq!(SessionDuration::from_secs(-5), SessionDuration::Forever);
        assert_eq!(SessionDuration::from_secs(60), SessionDuration::Secs(60));
        assert_eq!(SessionDuration::from_secs(1_000_000), SessionDuration::Secs(MAX_SESSION_SECS));
        assert!(!SessionDuration::Forever.expired(u32::MAX));
        assert!(SessionDuration::Secs(2).expired(2000));
        assert!(!SessionDuration::Secs(2).expired(1999));
    }

    #[test]
    fn slot_claim_is_exclusive() {
        let slot = SessionSlot::new();
        let first = SessionInfo {
            kind: SessionKind::ListScan(RadioMode::Wifi),
            started_ms: 100,
            duration: SessionDuration::Secs(60),
        };
        assert!(slot.try_claim(first));
        let second = SessionInfo {
            kind: SessionKind::ListScan(RadioMode::Ble),
            started_ms: 900,
            duration: SessionDuration::Forever,
        };
        assert!(!slot.try_claim(second));
        assert_eq!(slot.current(), Some(first));
        slot.release();
        assert_eq!(slot.current(), None);
        assert_eq!(slot.last(), Some(first));
        assert!(slot.try_claim(second));
    }

    #[test]
    fn list_scan_reports_watchlist_hit() {
        fn script(env: &Env, now: u32) {
            if now == 200 {
                env.capture.on_wifi_frame(&frame_from_a2(), -40, 6, now);
            }
        }
        let env = Env::new();
        env.capture.watchlist.replace(Watchlist::load("22:22:22:22:22:22"));
        let mut hw = FakeHw::new(&env, script);
        let mut state = SessionState::new();
        let req = request(SessionKind::ListScan(RadioMode::Wifi), 1);

        let out = run_session(&env.ctx(), &mut hw, &mut state, &req);

        assert_eq!(state.total_hits(), 1);
        assert_eq!(state.unique_devices(), 1);
        assert_eq!(env.slot.hits(), 1);
        assert_eq!(hw.patterns.as_slice(), &[(2, 80)]);
        assert_eq!(hw.mesh.len(), 1);
        assert_eq!(hw.mesh[0].as_str(), "Target: WiFi 22:22:22:22:22:22 RSSI:-40");
        assert!(out.restored && hw.surface_up);
        assert!(out.radio_error.is_none());
        assert!(out.result.starts_with("List scan - Mode: WiFi Duration: 1s\n"));
        assert!(out.result.contains("Total hits: 1\n"));
        assert!(out.result.contains("WiFi 22:22:22:22:22:22  RSSI=-40dBm  ch=6\n"));
        assert!(hw.radio.called("promisc_off") && hw.radio.called("hop_off"));
        assert!(!env.capture.bridge.is_open(EventKind::Hit));
    }

    #[test]
    fn stop_flag_ends_forever_session() {
        fn script(env: &Env, now: u32) {
            if now == 300 {
                env.stop.request();
            }
        }
        let env = Env::new();
        let mut hw = FakeHw::new(&env, script);
        let mut state = SessionState::new();
        let req = request(SessionKind::ListScan(RadioMode::Wifi), 0);

        let out = run_session(&env.ctx(), &mut hw, &mut state, &req);

        assert!(out.result.contains("Duration: forever"));
        // Stopped within one queue wait, plus the restore backoff.
        assert!(hw.now <= 300 + QUEUE_WAIT_MS + RESTORE_BACKOFF_MS);
    }

    #[test]
    fn ble_session_bursts() {
        let env = Env::new();
        let mut hw = FakeHw::new(&env, idle);
        let mut state = SessionState::new();
        let req = request(SessionKind::ListScan(RadioMode::Ble), 3);

        run_session(&env.ctx(), &mut hw, &mut state, &req);

        assert!(!hw.radio.called("promisc_on"));
        assert!(hw.radio.count("ble_burst") >= 2);
        assert!(hw.radio.called("ble_off"));
    }

    #[test]
    fn tracker_converges_and_beeps_faster() {
        fn script(env: &Env, now: u32) {
            if now % 100 == 0 {
                env.capture.on_wifi_frame(&frame_from_a2(), -40, 6, now);
            }
        }
        let env = Env::new();
        let mut hw = FakeHw::new(&env, script);
        let mut state = SessionState::new();
        let req = request(
            SessionKind::Tracker {
                target: A2,
                mode: RadioMode::Wifi,
            },
            2,
        );

        let out = run_session(&env.ctx(), &mut hw, &mut state, &req);

        assert!(!env.capture.tracker.is_armed());
        assert!(env.capture.tracker.packets() >= 15);
        assert!(hw.beeps.len() >= 3);
        let (freq, dur) = *hw.beeps.last().unwrap();
        assert!(freq > 4000);
        assert_eq!(dur, crate::defaults::TRACKER_BEEP_MS);
        assert!(state.proximity.smoothed() > -41.0);
        assert!(out.result.contains("Target: 22:22:22:22:22:22\n"));
        assert!(out.result.contains("Last RSSI: -40dBm\n"));
        // First tick goes out before the target is heard; the next is 15 s away.
        assert_eq!(hw.mesh.len(), 1);
        assert!(hw.mesh[0].starts_with("Tracking: 22:22:22:22:22:22 RSSI:-90dBm LastSeen:999s"));
    }

    #[test]
    fn deauth_session_throttles_alerts() {
        fn script(env: &Env, now: u32) {
            if now == 100 || now == 150 {
                env.capture
                    .on_wifi_frame(&deauth_frame(SUBTYPE_DEAUTH, 7), -55, 6, now);
            }
        }
        let env = Env::new();
        let mut hw = FakeHw::new(&env, script);
        let mut state = SessionState::new();
        let req = request(SessionKind::Flood(FloodKind::Deauth), 1);

        let out = run_session(&env.ctx(), &mut hw, &mut state, &req);

        assert_eq!(hw.patterns.as_slice(), &[(DEAUTH_ALERT_BEEPS, DEAUTH_ALERT_GAP_MS)]);
        assert!(out.result.contains("Deauth frames detected: 2\n"));
        assert!(out
            .result
            .contains("DEAUTH DE:AD:BE:EF:00:01 -> 02:00:00:00:00:02 BSSID:02:00:00:00:00:03 RSSI:-55dBm CH:6 Reason:7\n"));
    }

    #[test]
    fn beacon_session_lists_sources() {
        fn script(env: &Env, now: u32) {
            if now % 100 == 0 && now < 1000 {
                env.capture
                    .on_wifi_frame(&beacon_frame(ATTACKER, 10, b"free"), -30, 1, now);
            }
        }
        let env = Env::new();
        let mut hw = FakeHw::new(&env, script);
        let mut state = SessionState::new();
        let req = request(SessionKind::Flood(FloodKind::BeaconFlood), 1);

        let out = run_session(&env.ctx(), &mut hw, &mut state, &req);

        assert_eq!(hw.patterns.as_slice(), &[(BEACON_ALERT_BEEPS, BEACON_ALERT_GAP_MS)]);
        assert!(out.result.contains("Unique sources: 1\n"));
        assert!(out.result.contains("Top beacon sources:\nDE:AD:BE:EF:00:01: "));
        assert!(out.result.contains("DE:AD:BE:EF:00:01 'free' RSSI:-30dBm CH:1 Int:10\n"));
    }

    #[test]
    fn radio_failure_ends_session_and_restores() {
        let env = Env::new();
        let mut hw = FakeHw::new(&env, idle);
        hw.radio.fail_promiscuous = true;
        let mut state = SessionState::new();
        let req = request(SessionKind::ListScan(RadioMode::Wifi), 60);

        let out = run_session(&env.ctx(), &mut hw, &mut state, &req);

        assert_eq!(out.radio_error, Some(RadioError::Driver(-1)));
        assert!(out.result.contains("Radio start failed"));
        assert!(out.restored);
        assert!(hw.now < 60_000);
    }

    #[test]
    fn restore_retries_with_radio_reset() {
        let env = Env::new();
        let mut hw = FakeHw::new(&env, idle);
        hw.surface_up = false;
        hw.bring_up_failures = 2;
        assert!(restore_control_surface(&mut hw));
        assert_eq!(hw.bring_up_calls, 3);
        assert_eq!(hw.radio_resets, 2);
        assert_eq!(hw.now, RESTORE_BACKOFF_MS * 6);

        hw.bring_up_failures = 10;
        hw.bring_up_calls = 0;
        assert!(!restore_control_surface(&mut hw));
        assert_eq!(hw.bring_up_calls, RESTORE_ATTEMPTS);
    }

    #[test]
    fn summary_truncates_with_trailer() {
        let env = Env::new();
        let mut state = SessionState::new();
        for i in 0..RESULT_HIT_SAMPLE as u32 + 20 {
            let b = i.to_le_bytes();
            state.hits.push(Hit::ble([0xAA, 0, b[0], b[1], 0, 1], -70, Some("a-rather-long-device-name")));
        }
        let req = request(SessionKind::ListScan(RadioMode::Ble), 10);
        let tracker = env.capture.tracker.snapshot(-90.0);
        let text = summarize(&env.ctx(), &state, &req, &tracker);
        let shown = text.lines().filter(|l| l.starts_with("BLE ")).count();
        assert!(shown > 0 && shown < state.hits.len());
        let trailer = text.lines().last().unwrap();
        assert!(trailer.starts_with("... ("));
        assert!(trailer.ends_with(" more)"));
    }
}
