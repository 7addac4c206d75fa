//! Stroke decoding
//!
//! Turns the 4 chord bytes of a stroke unit into symbolic key names using the
//! writer's 4-row by 6-column key chart.

use std::fmt;

use super::codec::{CodecError, CodecResult};

/// Key chart, row-major. Each chord byte selects keys from one row; within a
/// byte the low 6 bits map to columns left to right, highest bit first.
pub const STENO_KEY_CHART: [[&str; 6]; 4] = [
    ["^", "#", "S-", "T-", "K-", "P-"],
    ["W-", "H-", "R-", "A-", "O-", "*"],
    ["-E", "-U", "-F", "-R", "-P", "-B"],
    ["-L", "-G", "-T", "-S", "-D", "-Z"],
];

/// One chord of key presses, in chart order
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Stroke {
    pub keys: Vec<&'static str>,
}

impl Stroke {
    /// Decode 4 chord bytes into a stroke.
    ///
    /// Every chord byte must carry both high bits (`>= 0b1100_0000`); a byte
    /// without them means the stream is out of sync with the packet framing,
    /// which has to fail loudly rather than drop data.
    pub fn decode(chord: &[u8]) -> CodecResult<Self> {
        debug_assert_eq!(chord.len(), STENO_KEY_CHART.len());
        let mut keys = Vec::new();
        for (&byte, row) in chord.iter().zip(STENO_KEY_CHART.iter()) {
            if byte & 0b1100_0000 != 0b1100_0000 {
                return Err(CodecError::BadChordByte(byte));
            }
            for (column, &key) in row.iter().enumerate() {
                if byte & (0b10_0000 >> column) != 0 {
                    keys.push(key);
                }
            }
        }
        Ok(Self { keys })
    }

    /// A chord with no bits set carries no keys; whether to skip it is the
    /// caller's decision.
    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }
}

impl fmt::Display for Stroke {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.keys.join(" "))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_caret_and_star() {
        let stroke = Stroke::decode(&[0b1110_0000, 0b1100_0001, 0b1100_0000, 0b1100_0000]).unwrap();
        assert_eq!(stroke.keys, vec!["^", "*"]);
    }

    #[test]
    fn test_decode_preserves_row_and_column_order() {
        // All bits set selects the entire chart, row-major.
        let stroke = Stroke::decode(&[0xFF, 0xFF, 0xFF, 0xFF]).unwrap();
        let expected: Vec<&str> = STENO_KEY_CHART.iter().flatten().copied().collect();
        assert_eq!(stroke.keys, expected);
        assert_eq!(stroke.keys.len(), 24);
    }

    #[test]
    fn test_decode_empty_chord() {
        let stroke = Stroke::decode(&[0xC0, 0xC0, 0xC0, 0xC0]).unwrap();
        assert!(stroke.is_empty());
    }

    #[test]
    fn test_decode_rejects_missing_high_bits() {
        let result = Stroke::decode(&[0b1110_0000, 0b0100_0001, 0xC0, 0xC0]);
        assert!(matches!(result, Err(CodecError::BadChordByte(0b0100_0001))));
    }

    #[test]
    fn test_display_joins_keys() {
        let stroke = Stroke::decode(&[0b1110_0000, 0b1100_0001, 0xC0, 0xC0]).unwrap();
        assert_eq!(stroke.to_string(), "^ *");
    }
}
