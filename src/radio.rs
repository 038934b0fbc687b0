/// Radio mode lifecycle: WiFi promiscuous capture, BLE scan bursts, channel
/// hopping and coexistence.
///
/// The state machine is `Idle → WifiCapturing | BleScanning | Both → Idle`.
/// Driver calls go through [`RadioDriver`] so the sequencing can be tested on
/// the host; the firmware binds it to ESP-IDF.
use core::fmt;
use core::sync::atomic::{AtomicU8, Ordering};

use heapless::Vec;

use crate::defaults::{
    BLE_SCAN_REISSUE_MS, BLE_SCAN_WINDOW_MS, DEFAULT_CHANNELS, HOP_PERIOD_MS, MAX_CHANNEL,
};

/// Channel hop list.
pub type ChannelList = Vec<u8, { MAX_CHANNEL as usize }>;

/// Which radios a session uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RadioMode {
    Wifi,
    Ble,
    Both,
}

impl RadioMode {
    pub fn uses_wifi(self) -> bool {
        matches!(self, RadioMode::Wifi | RadioMode::Both)
    }

    pub fn uses_ble(self) -> bool {
        matches!(self, RadioMode::Ble | RadioMode::Both)
    }

    pub fn label(self) -> &'static str {
        match self {
            RadioMode::Wifi => "WiFi",
            RadioMode::Ble => "BLE",
            RadioMode::Both => "WiFi+BLE",
        }
    }

    /// Accepts `wifi`, `ble`, `both` (any case) or the numeric codes 0/1/2.
    pub fn parse(s: &str) -> Option<Self> {
        let s = s.trim();
        if s.eq_ignore_ascii_case("wifi") || s == "0" {
            Some(RadioMode::Wifi)
        } else if s.eq_ignore_ascii_case("ble") || s == "1" {
            Some(RadioMode::Ble)
        } else if s.eq_ignore_ascii_case("both") || s.eq_ignore_ascii_case("wifi+ble") || s == "2" {
            Some(RadioMode::Both)
        } else {
            None
        }
    }

    pub fn state(self) -> RadioState {
        match self {
            RadioMode::Wifi => RadioState::WifiCapturing,
            RadioMode::Ble => RadioState::BleScanning,
            RadioMode::Both => RadioState::Both,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RadioState {
    Idle,
    WifiCapturing,
    BleScanning,
    Both,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RadioError {
    /// A transition was requested while not idle.
    Busy,
    /// The driver reported a failure code.
    Driver(i32),
}

impl fmt::Display for RadioError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RadioError::Busy => f.write_str("radio busy"),
            RadioError::Driver(code) => write!(f, "radio driver error {}", code),
        }
    }
}

/// Low-level radio operations the lifecycle sequences.
pub trait RadioDriver {
    /// Apply the regulatory domain before capture.
    fn set_country(&mut self) -> Result<(), RadioError>;
    /// Start the WiFi station, filter management + data frames, install the
    /// capture callback and enable promiscuous mode.
    fn start_promiscuous(&mut self) -> Result<(), RadioError>;
    /// Disable promiscuous mode and stop the WiFi station.
    fn stop_promiscuous(&mut self);
    fn set_channel(&mut self, channel: u8) -> Result<(), RadioError>;
    /// Start the periodic hop timer. Each tick calls [`ChannelHopper::advance`].
    fn start_hop_timer(&mut self, period_ms: u32) -> Result<(), RadioError>;
    /// Stop and delete the hop timer.
    fn stop_hop_timer(&mut self);
    /// Prefer balanced WiFi/BLE time sharing.
    fn set_coex_balanced(&mut self) -> Result<(), RadioError>;
    /// Bring up active BLE scanning with the advertisement callback installed.
    fn init_ble_scan(&mut self) -> Result<(), RadioError>;
    /// Run one scan burst of `window_ms`.
    fn ble_scan_burst(&mut self, window_ms: u32) -> Result<(), RadioError>;
    /// Stop scanning and release scan handles.
    fn stop_ble_scan(&mut self);
}

/// Channel list walked by the hop timer.
///
/// Atomics only, so the timer callback can advance it while the control
/// path reads it for diagnostics.
pub struct ChannelHopper {
    channels: [AtomicU8; MAX_CHANNEL as usize],
    len: AtomicU8,
    index: AtomicU8,
}

impl ChannelHopper {
    pub const fn new() -> Self {
        Self {
            channels: [
                AtomicU8::new(1),
                AtomicU8::new(6),
                AtomicU8::new(11),
                AtomicU8::new(0),
                AtomicU8::new(0),
                AtomicU8::new(0),
                AtomicU8::new(0),
                AtomicU8::new(0),
                AtomicU8::new(0),
                AtomicU8::new(0),
                AtomicU8::new(0),
                AtomicU8::new(0),
                AtomicU8::new(0),
                AtomicU8::new(0),
            ],
            len: AtomicU8::new(3),
            index: AtomicU8::new(0),
        }
    }

    /// Replace the list (empty falls back to the default) and rewind.
    pub fn load(&self, list: &[u8]) {
        let list = if list.is_empty() { DEFAULT_CHANNELS } else { list };
        let n = list.len().min(self.channels.len());
        self.len.store(0, Ordering::Release);
        for (slot, &ch) in self.channels.iter().zip(list[..n].iter()) {
            slot.store(ch, Ordering::Relaxed);
        }
        self.index.store(0, Ordering::Relaxed);
        self.len.store(n as u8, Ordering::Release);
    }

    /// First channel of the list.
    pub fn first(&self) -> u8 {
        self.channels[0].load(Ordering::Relaxed)
    }

    /// Step to the next channel (wrapping) and return it.
    pub fn advance(&self) -> u8 {
        let len = self.len.load(Ordering::Acquire).max(1);
        let next = (self.index.load(Ordering::Relaxed) + 1) % len;
        self.index.store(next, Ordering::Relaxed);
        self.channels[next as usize].load(Ordering::Relaxed)
    }

    pub fn channels(&self) -> ChannelList {
        let len = self.len.load(Ordering::Acquire) as usize;
        self.channels[..len]
            .iter()
            .map(|c| c.load(Ordering::Relaxed))
            .collect()
    }
}

impl Default for ChannelHopper {
    fn default() -> Self {
        Self::new()
    }
}

/// Parse a channel spec: comma-separated numbers or one inclusive `a..b`
/// range. Channels outside 1..=14 are dropped; an empty result falls back to
/// the default list.
pub fn parse_channels(spec: &str) -> ChannelList {
    let mut out = ChannelList::new();
    let valid = |ch: i32| (1..=MAX_CHANNEL as i32).contains(&ch);

    if let Some((a, b)) = spec.split_once("..") {
        let lo = parse_int(a).max(1);
        let hi = parse_int(b).min(MAX_CHANNEL as i32);
        for ch in lo..=hi {
            if out.push(ch as u8).is_err() {
                break;
            }
        }
    } else {
        for part in spec.split(',') {
            let ch = parse_int(part);
            if valid(ch) && out.push(ch as u8).is_err() {
                break;
            }
        }
    }

    if out.is_empty() {
        // DEFAULT_CHANNELS is shorter than the list capacity.
        let _ = out.extend_from_slice(DEFAULT_CHANNELS);
    }
    out
}

/// Leading-integer parse; anything unparseable is 0 (and thus invalid).
fn parse_int(s: &str) -> i32 {
    let s = s.trim();
    let digits = s
        .char_indices()
        .take_while(|(i, c)| c.is_ascii_digit() || (*i == 0 && *c == '-'))
        .count();
    s[..digits].parse().unwrap_or(0)
}

/// Radio lifecycle owned by the session worker.
pub struct RadioLifecycle {
    state: RadioState,
    next_ble_burst_ms: u32,
}

impl RadioLifecycle {
    pub const fn new() -> Self {
        Self {
            state: RadioState::Idle,
            next_ble_burst_ms: 0,
        }
    }

    pub fn state(&self) -> RadioState {
        self.state
    }

    /// Bring the radios up for `mode`. Only allowed from `Idle`; on a driver
    /// failure everything started so far is torn down again.
    pub fn enter<D: RadioDriver>(
        &mut self,
        driver: &mut D,
        hopper: &ChannelHopper,
        mode: RadioMode,
        now_ms: u32,
    ) -> Result<RadioState, RadioError> {
        if self.state != RadioState::Idle {
            return Err(RadioError::Busy);
        }
        // Marked busy first so a failed entry still tears down in `exit`.
        self.state = mode.state();
        if let Err(e) = self.bring_up(driver, hopper, mode, now_ms) {
            log::warn!("Radio start for {} failed: {}", mode.label(), e);
            self.exit(driver);
            return Err(e);
        }
        log::info!("Radio up: {:?}", self.state);
        Ok(self.state)
    }

    fn bring_up<D: RadioDriver>(
        &mut self,
        driver: &mut D,
        hopper: &ChannelHopper,
        mode: RadioMode,
        now_ms: u32,
    ) -> Result<(), RadioError> {
        if mode == RadioMode::Both {
            driver.set_coex_balanced()?;
        }
        if mode.uses_wifi() {
            driver.set_country()?;
            driver.start_promiscuous()?;
            driver.set_channel(hopper.first())?;
            driver.start_hop_timer(HOP_PERIOD_MS)?;
            log::info!("WiFi capture on channels {:?}", hopper.channels().as_slice());
        }
        if mode.uses_ble() {
            driver.init_ble_scan()?;
            self.next_ble_burst_ms = now_ms;
        }
        Ok(())
    }

    /// Issue a BLE scan burst if one is due. Returns true if one was issued.
    pub fn poll_ble<D: RadioDriver>(&mut self, driver: &mut D, now_ms: u32) -> bool {
        if !matches!(self.state, RadioState::BleScanning | RadioState::Both) {
            return false;
        }
        if (now_ms.wrapping_sub(self.next_ble_burst_ms) as i32) < 0 {
            return false;
        }
        if let Err(e) = driver.ble_scan_burst(BLE_SCAN_WINDOW_MS) {
            log::warn!("BLE scan burst failed: {}", e);
        }
        self.next_ble_burst_ms = now_ms.wrapping_add(BLE_SCAN_REISSUE_MS);
        true
    }

    /// Tear down whatever the current state started and return to `Idle`.
    pub fn exit<D: RadioDriver>(&mut self, driver: &mut D) {
        let state = self.state;
        if matches!(state, RadioState::WifiCapturing | RadioState::Both) {
            driver.stop_hop_timer();
            driver.stop_promiscuous();
        }
        if matches!(state, RadioState::BleScanning | RadioState::Both) {
            driver.stop_ble_scan();
        }
        self.state = RadioState::Idle;
        if state != RadioState::Idle {
            log::info!("Radio idle");
        }
    }
}

impl Default for RadioLifecycle {
    fn default() -> Self {
        Self::new()
    }
}
