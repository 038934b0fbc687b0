/// Operator watchlist: full MACs and OUI prefixes to hunt for.
///
/// The list is parsed from free-form text (one entry per line), matched from
/// the capture callback, and replaced wholesale on save. [`SharedWatchlist`]
/// swaps the whole list inside a critical section so a matcher always sees
/// either the old or the new list.
use core::cell::RefCell;
use core::fmt::Write;

use critical_section::Mutex;
use heapless::{String, Vec};

use crate::defaults::{MAX_TARGETS, WATCHLIST_TEXT_LEN};
use crate::mac::{hex_nibbles, Mac};

/// Text form of a watchlist, as persisted and as rendered.
pub type WatchlistText = String<WATCHLIST_TEXT_LEN>;

/// A single watchlist entry: a full MAC or a 3-byte OUI prefix.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Target {
    Mac(Mac),
    Oui([u8; 3]),
}

impl Target {
    /// Parse one line. Non-hex characters are stripped first; exactly 12
    /// digits make a MAC, exactly 6 an OUI, anything else is rejected.
    pub fn parse(line: &str) -> Option<Self> {
        let mut nib = [0u8; 12];
        let n = hex_nibbles(line, &mut nib);
        let byte = |i: usize| (nib[i * 2] << 4) | nib[i * 2 + 1];
        match n {
            12 => Some(Target::Mac([byte(0), byte(1), byte(2), byte(3), byte(4), byte(5)])),
            6 => Some(Target::Oui([byte(0), byte(1), byte(2)])),
            _ => None,
        }
    }

    /// Number of significant bytes (6 or 3).
    pub fn prefix_len(&self) -> usize {
        match self {
            Target::Mac(_) => 6,
            Target::Oui(_) => 3,
        }
    }

    pub fn bytes(&self) -> &[u8] {
        match self {
            Target::Mac(m) => m,
            Target::Oui(o) => o,
        }
    }

    #[inline]
    pub fn matches(&self, mac: &Mac) -> bool {
        match self {
            Target::Mac(m) => m == mac,
            Target::Oui(o) => mac[..3] == o[..],
        }
    }
}

impl core::fmt::Display for Target {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        for (i, b) in self.bytes().iter().enumerate() {
            if i > 0 {
                f.write_char(':')?;
            }
            write!(f, "{:02X}", b)?;
        }
        Ok(())
    }
}

/// Ordered set of targets, in load order.
#[derive(Debug, Clone)]
pub struct Watchlist {
    targets: Vec<Target, MAX_TARGETS>,
}

impl Watchlist {
    pub const fn new() -> Self {
        Self { targets: Vec::new() }
    }

    /// Parse newline-separated text. Malformed lines are skipped silently,
    /// as are entries beyond [`MAX_TARGETS`].
    pub fn load(text: &str) -> Self {
        let mut list = Self::new();
        for line in text.lines() {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            if let Some(target) = Target::parse(line) {
                if list.targets.push(target).is_err() {
                    log::warn!("Watchlist full, ignoring entries past {}", MAX_TARGETS);
                    break;
                }
            }
        }
        list
    }

    /// True if any full-MAC entry equals `mac`, or any OUI entry equals its
    /// first three bytes.
    pub fn matches(&self, mac: &Mac) -> bool {
        self.targets.iter().any(|t| t.matches(mac))
    }

    /// Canonical rendering: uppercase colon-hex, one target per line.
    /// Entries that do not fit the text buffer are left out.
    pub fn serialize(&self) -> WatchlistText {
        let mut out = WatchlistText::new();
        for t in &self.targets {
            let mut line: String<18> = String::new();
            let _ = write!(line, "{}", t);
            if out.len() + line.len() + 1 > out.capacity() {
                break;
            }
            let _ = out.push_str(&line);
            let _ = out.push('\n');
        }
        out
    }

    pub fn targets(&self) -> &[Target] {
        &self.targets
    }

    pub fn len(&self) -> usize {
        self.targets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.targets.is_empty()
    }
}

impl Default for Watchlist {
    fn default() -> Self {
        Self::new()
    }
}

/// Watchlist shared between the capture callback and the control path.
pub struct SharedWatchlist {
    inner: Mutex<RefCell<Watchlist>>,
}

impl SharedWatchlist {
    pub const fn new() -> Self {
        Self {
            inner: Mutex::new(RefCell::new(Watchlist::new())),
        }
    }

    /// Swap in a complete new list.
    pub fn replace(&self, list: Watchlist) {
        critical_section::with(|cs| {
            *self.inner.borrow_ref_mut(cs) = list;
        });
    }

    pub fn matches(&self, mac: &Mac) -> bool {
        critical_section::with(|cs| self.inner.borrow_ref(cs).matches(mac))
    }

    pub fn len(&self) -> usize {
        critical_section::with(|cs| self.inner.borrow_ref(cs).len())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn serialize(&self) -> WatchlistText {
        critical_section::with(|cs| self.inner.borrow_ref(cs).serialize())
    }
}

impl Default for SharedWatchlist {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MAC: Mac = [0xAA, 0xBB, 0xCC, 0xDD, 0xEE, 0xFF];

    #[test]
    fn parse_full_mac_and_oui() {
        assert_eq!(Target::parse("AA:BB:CC:DD:EE:FF"), Some(Target::Mac(MAC)));
        assert_eq!(Target::parse("aabbccddeeff"), Some(Target::Mac(MAC)));
        assert_eq!(Target::parse("aa-bb-cc"), Some(Target::Oui([0xAA, 0xBB, 0xCC])));
    }

    #[test]
    fn parse_rejects_other_lengths() {
        assert_eq!(Target::parse("AA:BB"), None);
        assert_eq!(Target::parse("AA:BB:CC:DD"), None);
        assert_eq!(Target::parse("AA:BB:CC:DD:EE:FF:00"), None);
        assert_eq!(Target::parse("zz:zz:zz"), None);
    }

    #[test]
    fn load_skips_malformed_lines() {
        let list = Watchlist::load("AA:BB:CC:DD:EE:FF\n\ngarbage\n11:22:33\r\n  12345\n");
        assert_eq!(list.len(), 2);
        assert_eq!(list.targets()[0], Target::Mac(MAC));
        assert_eq!(list.targets()[1], Target::Oui([0x11, 0x22, 0x33]));
    }

    #[test]
    fn matches_exact_mac() {
        let list = Watchlist::load("AA:BB:CC:DD:EE:FF");
        assert!(list.matches(&MAC));
        assert!(!list.matches(&[0xAA, 0xBB, 0xCC, 0xDD, 0xEE, 0xFE]));
    }

    #[test]
    fn matches_oui_prefix() {
        let list = Watchlist::load("AA:BB:CC");
        assert!(list.matches(&MAC));
        assert!(list.matches(&[0xAA, 0xBB, 0xCC, 0x00, 0x00, 0x01]));
        assert!(!list.matches(&[0xAA, 0xBB, 0xCD, 0xDD, 0xEE, 0xFF]));
    }

    #[test]
    fn empty_list_matches_nothing() {
        let list = Watchlist::load("");
        assert!(list.is_empty());
        assert!(!list.matches(&MAC));
    }

    #[test]
    fn serialize_is_canonical_and_ordered() {
        let list = Watchlist::load("11:22:33\naabbccddeeff\n");
        assert_eq!(list.serialize().as_str(), "11:22:33\nAA:BB:CC:DD:EE:FF\n");
    }

    #[test]
    fn serialize_load_preserves_valid_entries() {
        let list = Watchlist::load("de:ad:be:ef:00:01\nnope\nf0-0d-00\nC0FFEE\n");
        let again = Watchlist::load(&list.serialize());
        assert_eq!(again.targets(), list.targets());
        assert_eq!(again.len(), 3);
    }

    #[test]
    fn load_stops_at_capacity() {
        let mut text: String<4096> = String::new();
        for i in 0..(MAX_TARGETS + 5) {
            let _ = writeln!(text, "00:00:{:02X}", i as u8);
        }
        assert_eq!(Watchlist::load(&text).len(), MAX_TARGETS);
    }

    #[test]
    fn full_list_of_macs_survives_serialize() {
        let mut text: String<4096> = String::new();
        for i in 0..MAX_TARGETS {
            let _ = writeln!(text, "02:00:00:00:{:02X}:{:02X}", (i >> 8) as u8, i as u8);
        }
        let list = Watchlist::load(&text);
        assert_eq!(list.len(), MAX_TARGETS);
        let again = Watchlist::load(&list.serialize());
        assert_eq!(again.len(), MAX_TARGETS);
        assert_eq!(again.targets(), list.targets());
    }

    #[test]
    fn shared_list_replaced_atomically() {
        let shared = SharedWatchlist::new();
        assert!(!shared.matches(&MAC));
        shared.replace(Watchlist::load("AA:BB:CC:DD:EE:FF"));
        assert!(shared.matches(&MAC));
        assert_eq!(shared.len(), 1);
        shared.replace(Watchlist::load("11:22:33"));
        assert!(!shared.matches(&MAC));
        assert_eq!(shared.serialize().as_str(), "11:22:33\n");
    }
}
