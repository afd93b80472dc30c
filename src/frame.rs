// Canonical frame record and the active range filter

use serde::{Deserialize, Serialize};
use std::fmt;

/// Largest valid identifier: the 29-bit extended addressing space.
pub const MAX_EXTENDED_ID: u32 = 0x1FFF_FFFF;

/// Standard (11-bit) identifiers end here; anything above is extended.
pub const MAX_STANDARD_ID: u32 = 0x7FF;

/// Frame direction as seen by the logger. Sources that do not report a
/// direction are treated as transmissions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "UPPERCASE")]
pub enum Direction {
    #[default]
    Tx,
    Rx,
}

impl Direction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Direction::Tx => "TX",
            Direction::Rx => "RX",
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One normalized bus event record.
///
/// Every frame that reaches the display layer has this shape, no matter
/// which wire representation (JSON object or delimited text) it arrived
/// in.
///
/// # Field semantics
///
/// - `id`: identifier clamped to `[0, 0x1FFFFFFF]`.
/// - `id_hex`: canonical `0x`-prefixed uppercase rendering of `id`,
///   3-digit padded for standard ids, 8-digit padded for extended ones.
/// - `data`: payload bytes as an uppercase hex string, possibly empty.
/// - `direction`: `TX` or `RX`; `TX` when the source gave nothing usable.
/// - `timestamp`: epoch milliseconds; falls back to the receive time when
///   the source supplied nothing parseable.
/// - `source_timestamp`: the original timestamp text when the source
///   supplied one, kept for display and debugging only.
/// - `raw`: the original wire text, kept for audit and debugging.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Frame {
    pub id: u32,
    pub id_hex: String,
    pub data: String,
    pub direction: Direction,
    pub timestamp: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_timestamp: Option<String>,
    pub raw: String,
}

impl Frame {
    /// Signature used for duplicate suppression: two frames with the same
    /// id, direction and payload are the same logical event.
    pub(crate) fn dedup_signature(&self) -> String {
        format!("{:X}:{}:{}", self.id, self.direction, self.data)
    }

    /// Payload grouped into space-separated byte pairs for display.
    pub fn data_display(&self) -> String {
        format_bytes(&self.data)
    }
}

/// Canonical `0x`-prefixed uppercase hex rendering of an identifier.
///
/// Standard ids pad to three digits, extended ids to eight:
///
/// ```
/// # use canmon::frame::format_id;
/// assert_eq!(format_id(0x27B), "0x27B");
/// assert_eq!(format_id(0x800), "0x00000800");
/// ```
pub fn format_id(id: u32) -> String {
    if id > MAX_STANDARD_ID {
        format!("0x{:08X}", id)
    } else {
        format!("0x{:03X}", id)
    }
}

/// Group a hex payload string into space-separated byte pairs.
pub fn format_bytes(hex: &str) -> String {
    hex.as_bytes()
        .chunks(2)
        .map(|pair| std::str::from_utf8(pair).unwrap_or_default())
        .collect::<Vec<_>>()
        .join(" ")
}

/// Active identifier filter. A `None` bound is unbounded on that side.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct FrameRange {
    pub min: Option<u32>,
    pub max: Option<u32>,
}

impl FrameRange {
    /// Unbounded range: every id passes.
    pub fn unbounded() -> Self {
        Self::default()
    }

    pub fn new(min: Option<u32>, max: Option<u32>) -> Self {
        Self { min, max }.normalized()
    }

    /// Swap the bounds when both are set the wrong way around.
    pub fn normalized(self) -> Self {
        match (self.min, self.max) {
            (Some(lo), Some(hi)) if lo > hi => Self {
                min: Some(hi),
                max: Some(lo),
            },
            _ => self,
        }
    }

    /// Inclusive bound check on both sides.
    pub fn contains(&self, id: u32) -> bool {
        if let Some(min) = self.min {
            if id < min {
                return false;
            }
        }
        if let Some(max) = self.max {
            if id > max {
                return false;
            }
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn format_id_pads_standard_to_three_digits() {
        assert_eq!(format_id(635), "0x27B");
        assert_eq!(format_id(0), "0x000");
        assert_eq!(format_id(0x7FF), "0x7FF");
    }

    #[test]
    fn format_id_pads_extended_to_eight_digits() {
        assert_eq!(format_id(2048), "0x00000800");
        assert_eq!(format_id(MAX_EXTENDED_ID), "0x1FFFFFFF");
    }

    #[test]
    fn format_bytes_groups_pairs() {
        assert_eq!(format_bytes("AABBCCDD"), "AA BB CC DD");
        assert_eq!(format_bytes(""), "");
        assert_eq!(format_bytes("AB"), "AB");
    }

    #[test]
    fn range_is_inclusive_on_both_bounds() {
        let range = FrameRange::new(Some(0x200), Some(0x2FF));
        assert!(range.contains(0x200));
        assert!(range.contains(0x27B));
        assert!(range.contains(0x2FF));
        assert!(!range.contains(0x1FF));
        assert!(!range.contains(0x300));
    }

    #[test]
    fn range_none_side_is_unbounded() {
        let above = FrameRange::new(Some(0x300), None);
        assert!(!above.contains(0x27B));
        assert!(above.contains(0x300));
        assert!(above.contains(MAX_EXTENDED_ID));

        assert!(FrameRange::unbounded().contains(0));
        assert!(FrameRange::unbounded().contains(MAX_EXTENDED_ID));
    }

    #[test]
    fn range_swaps_inverted_bounds() {
        let range = FrameRange::new(Some(0x500), Some(0x100));
        assert_eq!(range.min, Some(0x100));
        assert_eq!(range.max, Some(0x500));
    }

    #[test]
    fn direction_serializes_uppercase() {
        assert_eq!(serde_json::to_string(&Direction::Rx).unwrap(), "\"RX\"");
        assert_eq!(serde_json::to_string(&Direction::Tx).unwrap(), "\"TX\"");
    }
}
