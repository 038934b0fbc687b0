/// Collaborators the engine drives but does not implement.
///
/// The firmware binds these to ESP-IDF services; tests bind them to fakes.
use crate::radio::RadioDriver;
use crate::watchlist::WatchlistText;

/// Monotonic millisecond clock and task sleep.
pub trait Clock {
    fn now_ms(&self) -> u32;
    fn sleep_ms(&mut self, ms: u32);
}

/// Audio feedback. Calls may block for the duration of the sound and are
/// never made from the capture context.
pub trait AudioOut {
    fn beep(&mut self, freq_hz: u32, duration_ms: u32);
    /// `count` short beeps separated by `gap_ms`.
    fn beep_pattern(&mut self, count: u8, gap_ms: u32);
}

/// Long-range mesh text link. Accepts short pre-built lines.
pub trait MeshLink {
    /// Returns false if the line could not be handed to the transport.
    fn send_line(&mut self, line: &str) -> bool;
}

/// Beep settings applied to list-scan hits.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BeepConfig {
    pub beeps_per_hit: u8,
    pub gap_ms: u32,
}

impl BeepConfig {
    pub const fn new() -> Self {
        Self {
            beeps_per_hit: crate::defaults::DEFAULT_BEEPS_PER_HIT,
            gap_ms: crate::defaults::DEFAULT_BEEP_GAP_MS,
        }
    }

    /// Clamp both fields into their accepted ranges.
    pub fn clamped(self) -> Self {
        let (bmin, bmax) = crate::defaults::BEEPS_PER_HIT_RANGE;
        let (gmin, gmax) = crate::defaults::BEEP_GAP_RANGE_MS;
        Self {
            beeps_per_hit: self.beeps_per_hit.clamp(bmin, bmax),
            gap_ms: self.gap_ms.clamp(gmin, gmax),
        }
    }
}

impl Default for BeepConfig {
    fn default() -> Self {
        Self::new()
    }
}

/// Durable key/value settings.
pub trait ConfigStore {
    /// Stored watchlist text, empty if none.
    fn load_watchlist_text(&mut self) -> WatchlistText;
    fn save_watchlist_text(&mut self, text: &str);
    /// Stored beep config, defaults if none.
    fn load_beep_config(&mut self) -> BeepConfig;
    fn save_beep_config(&mut self, config: BeepConfig);
}

/// The network control surface that shares the radio with capture.
pub trait ControlSurface {
    /// Take the control surface fully offline.
    fn shut_down(&mut self);
    /// Try to bring it back. Returns true once it is reachable.
    fn try_bring_up(&mut self) -> bool;
    /// Reinitialize the radio before another bring-up attempt.
    fn reset_radio(&mut self);
}

/// Everything a session worker needs.
pub trait Hardware: Clock + AudioOut + MeshLink + ControlSurface + RadioDriver {}

impl<T> Hardware for T where T: Clock + AudioOut + MeshLink + ControlSurface + RadioDriver {}
