/// Raw 802.11 header decoding and candidate address extraction.
///
/// Works directly on the promiscuous payload at fixed offsets, so it is safe
/// to call from the capture callback: no allocation, no blocking, and every
/// read is bounds-checked against the captured length.
use ieee80211::common::FrameControlField;

use crate::mac::{is_zero_or_broadcast, Mac};

/// Shortest frame carrying frame control, duration and three addresses.
pub const MIN_HEADER_LEN: usize = 24;

/// Address field offsets.
pub const ADDR1_OFFSET: usize = 4;
pub const ADDR2_OFFSET: usize = 10;
pub const ADDR3_OFFSET: usize = 16;
/// Only present in four-address (WDS) data frames; never used as a candidate.
pub const ADDR4_OFFSET: usize = 24;

/// Management subtypes the detectors care about.
pub const SUBTYPE_BEACON: u8 = 8;
pub const SUBTYPE_DISASSOC: u8 = 10;
pub const SUBTYPE_DEAUTH: u8 = 12;

/// 802.11 frame type from the frame-control field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameType {
    Management,
    Control,
    Data,
    Extension,
}

/// Decoded frame-control field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameControl {
    pub frame_type: FrameType,
    pub subtype: u8,
    pub to_ds: bool,
    pub from_ds: bool,
}

impl FrameControl {
    /// Decode the little-endian frame-control field at the start of `frame`.
    pub fn parse(frame: &[u8]) -> Option<Self> {
        let fcf = FrameControlField::from_bits(read_u16_le(frame, 0)?);
        // Type in the low two bits, subtype in the upper four.
        let type_bits = fcf.frame_type().into_bits();
        let frame_type = match type_bits & 0x3 {
            0 => FrameType::Management,
            1 => FrameType::Control,
            2 => FrameType::Data,
            _ => FrameType::Extension,
        };
        let flags = fcf.flags();
        Some(Self {
            frame_type,
            subtype: type_bits >> 2,
            to_ds: flags.to_ds(),
            from_ds: flags.from_ds(),
        })
    }

    pub fn is_management(&self, subtype: u8) -> bool {
        self.frame_type == FrameType::Management && self.subtype == subtype
    }
}

/// Which way a data frame travels relative to the distribution system.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DataDirection {
    /// Neither bit set: ad-hoc or STA to STA.
    Direct,
    /// ToDS only: station to AP.
    ToAp,
    /// FromDS only: AP to station.
    FromAp,
    /// Both bits: four-address WDS bridge.
    Wds,
}

impl DataDirection {
    pub fn from_bits(to_ds: bool, from_ds: bool) -> Self {
        match (to_ds, from_ds) {
            (false, false) => DataDirection::Direct,
            (true, false) => DataDirection::ToAp,
            (false, true) => DataDirection::FromAp,
            (true, true) => DataDirection::Wds,
        }
    }
}

/// Classification of a frame that survived extraction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameClass {
    /// Management frame with its subtype.
    Management { subtype: u8 },
    Data(DataDirection),
}

/// Up to two candidate addresses pulled out of one frame.
///
/// `source` is the address most likely to belong to the transmitting device,
/// `bssid` the one most likely to identify the network. Zero and broadcast
/// addresses are never reported.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Candidates {
    pub class: FrameClass,
    pub source: Option<Mac>,
    pub bssid: Option<Mac>,
}

impl Candidates {
    /// Iterate the present candidates, source first.
    pub fn iter(&self) -> impl Iterator<Item = &Mac> {
        self.source.iter().chain(self.bssid.iter())
    }

    pub fn is_empty(&self) -> bool {
        self.source.is_none() && self.bssid.is_none()
    }
}

/// Extract candidate addresses from a raw 802.11 frame.
///
/// | frame      | ToDS | FromDS | source | bssid |
/// |------------|------|--------|--------|-------|
/// | management |  -   |   -    | addr2  | addr3 |
/// | data       |  0   |   0    | addr2  | addr3 |
/// | data       |  1   |   0    | addr2  | addr1 |
/// | data       |  0   |   1    | addr3  | addr2 |
/// | data       |  1   |   1    | addr2  | addr3 |
///
/// Control and extension frames, and anything shorter than
/// [`MIN_HEADER_LEN`], yield `None`.
pub fn extract_candidates(frame: &[u8]) -> Option<Candidates> {
    if frame.len() < MIN_HEADER_LEN {
        return None;
    }
    let fc = FrameControl::parse(frame)?;

    let (class, source_at, bssid_at) = match fc.frame_type {
        FrameType::Management => (
            FrameClass::Management { subtype: fc.subtype },
            ADDR2_OFFSET,
            ADDR3_OFFSET,
        ),
        FrameType::Data => {
            let dir = DataDirection::from_bits(fc.to_ds, fc.from_ds);
            let (s, b) = match dir {
                DataDirection::Direct => (ADDR2_OFFSET, ADDR3_OFFSET),
                DataDirection::ToAp => (ADDR2_OFFSET, ADDR1_OFFSET),
                DataDirection::FromAp => (ADDR3_OFFSET, ADDR2_OFFSET),
                DataDirection::Wds => (ADDR2_OFFSET, ADDR3_OFFSET),
            };
            (FrameClass::Data(dir), s, b)
        }
        FrameType::Control | FrameType::Extension => return None,
    };

    Some(Candidates {
        class,
        source: usable_addr(frame, source_at),
        bssid: usable_addr(frame, bssid_at),
    })
}

/// Read the 6-byte address at `offset`, or `None` if it is out of bounds.
#[inline]
pub fn read_addr(frame: &[u8], offset: usize) -> Option<Mac> {
    frame.get(offset..offset + 6)?.try_into().ok()
}

#[inline]
fn usable_addr(frame: &[u8], offset: usize) -> Option<Mac> {
    read_addr(frame, offset).filter(|mac| !is_zero_or_broadcast(mac))
}

/// Little-endian u16 at `offset`, bounds-checked.
#[inline]
pub fn read_u16_le(frame: &[u8], offset: usize) -> Option<u16> {
    let b = frame.get(offset..offset + 2)?;
    Some(u16::from_le_bytes([b[0], b[1]]))
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    pub const A1: Mac = [0x11, 0x11, 0x11, 0x11, 0x11, 0x11];
    pub const A2: Mac = [0x22, 0x22, 0x22, 0x22, 0x22, 0x22];
    pub const A3: Mac = [0x33, 0x33, 0x33, 0x33, 0x33, 0x33];

    /// Build a 24-byte header (plus `extra` zero bytes) for tests.
    pub fn header(ftype: u8, subtype: u8, to_ds: bool, from_ds: bool, a1: Mac, a2: Mac, a3: Mac) -> [u8; 24] {
        let mut f = [0u8; 24];
        f[0] = (ftype << 2) | (subtype << 4);
        f[1] = (to_ds as u8) | ((from_ds as u8) << 1);
        f[4..10].copy_from_slice(&a1);
        f[10..16].copy_from_slice(&a2);
        f[16..22].copy_from_slice(&a3);
        f
    }

    #[test]
    fn frame_control_decodes_bits() {
        let f = header(2, 8, true, false, A1, A2, A3);
        let fc = FrameControl::parse(&f).unwrap();
        assert_eq!(fc.frame_type, FrameType::Data);
        assert_eq!(fc.subtype, 8);
        assert!(fc.to_ds);
        assert!(!fc.from_ds);
    }

    #[test]
    fn management_uses_addr2_and_addr3() {
        let f = header(0, SUBTYPE_BEACON, false, false, A1, A2, A3);
        let c = extract_candidates(&f).unwrap();
        assert_eq!(c.class, FrameClass::Management { subtype: SUBTYPE_BEACON });
        assert_eq!(c.source, Some(A2));
        assert_eq!(c.bssid, Some(A3));
    }

    #[test]
    fn data_direct_uses_addr2_and_addr3() {
        let c = extract_candidates(&header(2, 0, false, false, A1, A2, A3)).unwrap();
        assert_eq!(c.class, FrameClass::Data(DataDirection::Direct));
        assert_eq!((c.source, c.bssid), (Some(A2), Some(A3)));
    }

    #[test]
    fn data_to_ap_uses_addr2_and_addr1() {
        let c = extract_candidates(&header(2, 0, true, false, A1, A2, A3)).unwrap();
        assert_eq!(c.class, FrameClass::Data(DataDirection::ToAp));
        assert_eq!((c.source, c.bssid), (Some(A2), Some(A1)));
    }

    #[test]
    fn data_from_ap_uses_addr3_and_addr2() {
        let c = extract_candidates(&header(2, 0, false, true, A1, A2, A3)).unwrap();
        assert_eq!(c.class, FrameClass::Data(DataDirection::FromAp));
        assert_eq!((c.source, c.bssid), (Some(A3), Some(A2)));
    }

    #[test]
    fn data_wds_uses_addr2_and_addr3() {
        let mut f = [0u8; 30];
        f[..24].copy_from_slice(&header(2, 0, true, true, A1, A2, A3));
        f[ADDR4_OFFSET..30].copy_from_slice(&[0x44; 6]);
        let c = extract_candidates(&f).unwrap();
        assert_eq!(c.class, FrameClass::Data(DataDirection::Wds));
        assert_eq!((c.source, c.bssid), (Some(A2), Some(A3)));
    }

    #[test]
    fn broadcast_and_zero_candidates_dropped() {
        let c = extract_candidates(&header(0, 4, false, false, A1, A2, [0xFF; 6])).unwrap();
        assert_eq!(c.source, Some(A2));
        assert_eq!(c.bssid, None);

        let c = extract_candidates(&header(2, 0, true, false, [0xFF; 6], [0; 6], A3)).unwrap();
        assert!(c.is_empty());
        assert_eq!(c.iter().count(), 0);
    }

    #[test]
    fn control_frames_ignored() {
        assert!(extract_candidates(&header(1, 11, false, false, A1, A2, A3)).is_none());
    }

    #[test]
    fn short_frames_ignored() {
        let f = header(0, 0, false, false, A1, A2, A3);
        assert!(extract_candidates(&f[..23]).is_none());
        assert!(extract_candidates(&[]).is_none());
    }

    #[test]
    fn candidates_iterate_source_first() {
        let c = extract_candidates(&header(2, 0, false, true, A1, A2, A3)).unwrap();
        let order: heapless::Vec<Mac, 2> = c.iter().copied().collect();
        assert_eq!(order.as_slice(), &[A3, A2]);
    }
}
