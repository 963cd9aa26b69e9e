use crate::error::PatternError;

use super::WORD_BITS;

/// A compiled bit-pattern rule.
///
/// Trailing wildcards are shifted away so that matching needs one shift, one
/// mask and one compare.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Pattern {
    pub key: u64,
    pub mask: u64,
    pub shift: u32,
}

impl Pattern {
    /// Compiles a pattern of `0`, `1` and `?`, one character per bit. Spaces
    /// are ignored.
    pub fn compile(pattern: &str) -> Result<Self, PatternError> {
        Self::build(pattern, 1, |c| match c {
            '0' => Some(Some(0)),
            '1' => Some(Some(1)),
            '?' => Some(None),
            _ => None,
        })
    }

    /// Compiles a pattern of hex nibbles and `?`, four bits per character.
    pub fn compile_hex(pattern: &str) -> Result<Self, PatternError> {
        Self::build(pattern, 4, |c| match c {
            '?' => Some(None),
            '0'..='9' | 'a'..='f' => c.to_digit(16).map(|d| Some(d as u64)),
            _ => None,
        })
    }

    fn build(
        pattern: &str,
        unit: u32,
        digit: impl Fn(char) -> Option<Option<u64>>,
    ) -> Result<Self, PatternError> {
        let unit_mask = (1u64 << unit) - 1;
        let (mut key, mut mask, mut shift, mut bits) = (0u64, 0u64, 0u32, 0u32);
        for c in pattern.chars().filter(|c| *c != ' ') {
            let Some(value) = digit(c) else {
                return Err(PatternError::InvalidChar {
                    pattern: pattern.to_string(),
                    found: c,
                });
            };
            bits += unit;
            if bits > WORD_BITS {
                return Err(PatternError::TooLong {
                    pattern: pattern.to_string(),
                    bits: pattern.chars().filter(|c| *c != ' ').count() as u32 * unit,
                });
            }
            key = (key << unit) | value.unwrap_or(0);
            mask = (mask << unit) | if value.is_some() { unit_mask } else { 0 };
            shift = if value.is_some() { 0 } else { shift + unit };
        }
        Ok(Self {
            key: key >> shift,
            mask: mask >> shift,
            shift,
        })
    }

    pub fn matches(&self, inst: u32) -> bool {
        ((inst as u64 >> self.shift) & self.mask) == self.key
    }
}
