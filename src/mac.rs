/// MAC address helpers shared by the capture path, watchlist and reports.
use core::fmt::Write;

/// A 6-byte IEEE 802 MAC address.
pub type Mac = [u8; 6];

/// Maximum length for MAC address strings ("AA:BB:CC:DD:EE:FF")
pub type MacString = heapless::String<18>;

/// True for the all-zero and all-ones (broadcast) addresses.
#[inline]
pub fn is_zero_or_broadcast(mac: &Mac) -> bool {
    mac.iter().all(|&b| b == 0x00) || mac.iter().all(|&b| b == 0xFF)
}

/// Format a 6-byte MAC address into "AA:BB:CC:DD:EE:FF" string
pub fn format_mac(mac: &Mac, buf: &mut MacString) {
    buf.clear();
    let _ = write!(
        buf,
        "{:02X}:{:02X}:{:02X}:{:02X}:{:02X}:{:02X}",
        mac[0], mac[1], mac[2], mac[3], mac[4], mac[5]
    );
}

/// Same as [`format_mac`] but lowercase, as used on the mesh link.
pub fn format_mac_lower(mac: &Mac, buf: &mut MacString) {
    buf.clear();
    let _ = write!(
        buf,
        "{:02x}:{:02x}:{:02x}:{:02x}:{:02x}:{:02x}",
        mac[0], mac[1], mac[2], mac[3], mac[4], mac[5]
    );
}

/// Convenience wrapper returning an owned [`MacString`].
pub fn mac_string(mac: &Mac) -> MacString {
    let mut s = MacString::new();
    format_mac(mac, &mut s);
    s
}

/// Collect the hex digits of `text`, ignoring every other character.
///
/// Returns the nibbles and how many were seen (which may exceed the buffer,
/// so callers can reject over-long input).
pub(crate) fn hex_nibbles(text: &str, out: &mut [u8]) -> usize {
    let mut n = 0;
    for c in text.chars() {
        if let Some(v) = c.to_digit(16) {
            if n < out.len() {
                out[n] = v as u8;
            }
            n += 1;
        }
    }
    n
}

/// Parse a full MAC from any notation with exactly 12 hex digits
/// ("aa:bb:cc:dd:ee:ff", "AABB.CCDD.EEFF", "aabbccddeeff", ...).
pub fn parse_mac(text: &str) -> Option<Mac> {
    let mut nib = [0u8; 12];
    if hex_nibbles(text, &mut nib) != 12 {
        return None;
    }
    let mut mac = [0u8; 6];
    for (i, byte) in mac.iter_mut().enumerate() {
        *byte = (nib[i * 2] << 4) | nib[i * 2 + 1];
    }
    Some(mac)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_and_broadcast_detected() {
        assert!(is_zero_or_broadcast(&[0; 6]));
        assert!(is_zero_or_broadcast(&[0xFF; 6]));
        assert!(!is_zero_or_broadcast(&[0, 0, 0, 0, 0, 1]));
        assert!(!is_zero_or_broadcast(&[0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFE]));
    }

    #[test]
    fn format_is_uppercase_colon_hex() {
        let mut s = MacString::new();
        format_mac(&[0xAA, 0xBB, 0xCC, 0x01, 0x02, 0x0F], &mut s);
        assert_eq!(s.as_str(), "AA:BB:CC:01:02:0F");
        format_mac_lower(&[0xAA, 0xBB, 0xCC, 0x01, 0x02, 0x0F], &mut s);
        assert_eq!(s.as_str(), "aa:bb:cc:01:02:0f");
    }

    #[test]
    fn parse_accepts_any_separator() {
        let expected = [0xAA, 0xBB, 0xCC, 0xDD, 0xEE, 0xFF];
        assert_eq!(parse_mac("AA:BB:CC:DD:EE:FF"), Some(expected));
        assert_eq!(parse_mac("aa-bb-cc-dd-ee-ff"), Some(expected));
        assert_eq!(parse_mac("aabb.ccdd.eeff"), Some(expected));
        assert_eq!(parse_mac(" aabbccddeeff\r"), Some(expected));
    }

    #[test]
    fn parse_rejects_wrong_digit_count() {
        assert_eq!(parse_mac(""), None);
        assert_eq!(parse_mac("AA:BB:CC"), None);
        assert_eq!(parse_mac("AA:BB:CC:DD:EE:FF:00"), None);
        assert_eq!(parse_mac("not a mac"), None);
    }
}
