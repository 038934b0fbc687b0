/// Capture → worker event queues.
///
/// One bounded channel per event kind. The capture callback only ever calls
/// `try_send`; a full or closed queue drops the event and bumps that queue's
/// drop counter. A session opens exactly the kinds it consumes and closes
/// them on exit; both transitions drain the queues so nothing leaks from one
/// session into the next.
use core::sync::atomic::{AtomicU32, AtomicU8, Ordering};

use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::channel::Channel;

use crate::defaults::{BEACON_QUEUE_LEN, DEAUTH_QUEUE_LEN, HIT_QUEUE_LEN};
use crate::detect::{BeaconHit, DeauthHit};
use crate::scanner::Hit;

pub type HitChannel = Channel<CriticalSectionRawMutex, Hit, HIT_QUEUE_LEN>;
pub type DeauthChannel = Channel<CriticalSectionRawMutex, DeauthHit, DEAUTH_QUEUE_LEN>;
pub type BeaconChannel = Channel<CriticalSectionRawMutex, BeaconHit, BEACON_QUEUE_LEN>;

/// Event kind carried by one bridge queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind {
    Hit,
    Deauth,
    Beacon,
}

impl EventKind {
    const fn bit(self) -> u8 {
        match self {
            EventKind::Hit => 1 << 0,
            EventKind::Deauth => 1 << 1,
            EventKind::Beacon => 1 << 2,
        }
    }

    const fn index(self) -> usize {
        match self {
            EventKind::Hit => 0,
            EventKind::Deauth => 1,
            EventKind::Beacon => 2,
        }
    }
}

/// Set of open queues.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EventKinds(u8);

impl EventKinds {
    pub const NONE: Self = Self(0);

    pub const fn only(kind: EventKind) -> Self {
        Self(kind.bit())
    }

    pub const fn contains(self, kind: EventKind) -> bool {
        self.0 & kind.bit() != 0
    }
}

/// Per-queue drop totals since the last open.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DropCounts {
    pub hits: u32,
    pub deauth: u32,
    pub beacons: u32,
}

impl DropCounts {
    pub fn total(&self) -> u32 {
        self.hits
            .saturating_add(self.deauth)
            .saturating_add(self.beacons)
    }
}

pub struct CaptureBridge {
    hits: HitChannel,
    deauth: DeauthChannel,
    beacons: BeaconChannel,
    open: AtomicU8,
    dropped: [AtomicU32; 3],
}

impl CaptureBridge {
    pub const fn new() -> Self {
        Self {
            hits: Channel::new(),
            deauth: Channel::new(),
            beacons: Channel::new(),
            open: AtomicU8::new(0),
            dropped: [AtomicU32::new(0), AtomicU32::new(0), AtomicU32::new(0)],
        }
    }

    /// Start accepting `kinds`. Leftovers from any earlier session are
    /// discarded and drop counters reset.
    pub fn open(&self, kinds: EventKinds) {
        self.open.store(0, Ordering::Release);
        self.drain();
        for d in &self.dropped {
            d.store(0, Ordering::Relaxed);
        }
        self.open.store(kinds.0, Ordering::Release);
    }

    /// Stop accepting events and discard anything still queued.
    pub fn close(&self) {
        self.open.store(0, Ordering::Release);
        self.drain();
    }

    pub fn is_open(&self, kind: EventKind) -> bool {
        EventKinds(self.open.load(Ordering::Acquire)).contains(kind)
    }

    fn drain(&self) {
        while self.hits.try_receive().is_ok() {}
        while self.deauth.try_receive().is_ok() {}
        while self.beacons.try_receive().is_ok() {}
    }

    fn note_drop(&self, kind: EventKind) {
        self.dropped[kind.index()].fetch_add(1, Ordering::Relaxed);
    }

    /// Queue a watchlist hit. Never blocks; returns false if dropped.
    pub fn push_hit(&self, hit: Hit) -> bool {
        let ok = self.is_open(EventKind::Hit) && self.hits.try_send(hit).is_ok();
        if !ok {
            self.note_drop(EventKind::Hit);
        }
        ok
    }

    pub fn push_deauth(&self, hit: DeauthHit) -> bool {
        let ok = self.is_open(EventKind::Deauth) && self.deauth.try_send(hit).is_ok();
        if !ok {
            self.note_drop(EventKind::Deauth);
        }
        ok
    }

    pub fn push_beacon(&self, hit: BeaconHit) -> bool {
        let ok = self.is_open(EventKind::Beacon) && self.beacons.try_send(hit).is_ok();
        if !ok {
            self.note_drop(EventKind::Beacon);
        }
        ok
    }

    pub fn try_recv_hit(&self) -> Option<Hit> {
        self.hits.try_receive().ok()
    }

    pub fn try_recv_deauth(&self) -> Option<DeauthHit> {
        self.deauth.try_receive().ok()
    }

    pub fn try_recv_beacon(&self) -> Option<BeaconHit> {
        self.beacons.try_receive().ok()
    }

    pub fn dropped(&self) -> DropCounts {
        DropCounts {
            hits: self.dropped[EventKind::Hit.index()].load(Ordering::Relaxed),
            deauth: self.dropped[EventKind::Deauth.index()].load(Ordering::Relaxed),
            beacons: self.dropped[EventKind::Beacon.index()].load(Ordering::Relaxed),
        }
    }
}

impl Default for CaptureBridge {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scanner::NameString;

    fn hit(n: u8) -> Hit {
        Hit {
            mac: [0x02, 0, 0, 0, 0, n],
            rssi: -50,
            channel: 6,
            name: NameString::new(),
            is_ble: false,
        }
    }

    #[test]
    fn closed_queue_drops_and_counts() {
        let bridge = CaptureBridge::new();
        assert!(!bridge.push_hit(hit(1)));
        assert_eq!(bridge.dropped().hits, 1);
        assert!(bridge.try_recv_hit().is_none());
    }

    #[test]
    fn open_queue_preserves_order() {
        let bridge = CaptureBridge::new();
        bridge.open(EventKinds::only(EventKind::Hit));
        assert!(bridge.push_hit(hit(1)));
        assert!(bridge.push_hit(hit(2)));
        assert_eq!(bridge.try_recv_hit().map(|h| h.mac[5]), Some(1));
        assert_eq!(bridge.try_recv_hit().map(|h| h.mac[5]), Some(2));
        assert!(bridge.try_recv_hit().is_none());
        assert_eq!(bridge.dropped(), DropCounts::default());
    }

    #[test]
    fn full_queue_never_blocks() {
        let bridge = CaptureBridge::new();
        bridge.open(EventKinds::only(EventKind::Hit));
        for i in 0..HIT_QUEUE_LEN {
            assert!(bridge.push_hit(hit(i as u8)));
        }
        assert!(!bridge.push_hit(hit(0xFF)));
        assert!(!bridge.push_hit(hit(0xFE)));
        assert_eq!(bridge.dropped().hits, 2);
        assert_eq!(bridge.dropped().total(), 2);
    }

    #[test]
    fn only_opened_kinds_accept_events() {
        let bridge = CaptureBridge::new();
        bridge.open(EventKinds::only(EventKind::Hit));
        assert!(bridge.is_open(EventKind::Hit));
        assert!(!bridge.is_open(EventKind::Deauth));
        assert!(!bridge.is_open(EventKind::Beacon));
    }

    #[test]
    fn reopen_discards_previous_session() {
        let bridge = CaptureBridge::new();
        bridge.open(EventKinds::only(EventKind::Hit));
        bridge.push_hit(hit(1));
        bridge.close();
        bridge.push_hit(hit(2));
        bridge.open(EventKinds::only(EventKind::Hit));
        assert!(bridge.try_recv_hit().is_none());
        assert_eq!(bridge.dropped().hits, 0);
    }
}
