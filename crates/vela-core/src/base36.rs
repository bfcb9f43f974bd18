//! # Base-36 Codec
//!
//! The 36-symbol alphabet behind every offline document number.
//!
//! ## Alphabet
//! ```text
//! value:   0 1 2 ... 25 26 27 ... 35
//! symbol:  A B C ...  Z  0  1 ...  9
//! ```
//!
//! Letters come first so that the zero symbol is `A` — a padded number like
//! `AAB7` sorts lexicographically in the same order as its numeric value,
//! which keeps document numbers sortable as plain strings.
//!
//! ## Contract
//! - `decode(encode(n)) == n` for every `n: u64`
//! - `encode(0) == "A"`, never the empty string
//! - `decode` is case-insensitive and rejects symbols outside the alphabet

use crate::error::{CoreError, CoreResult};

/// The codec alphabet: `A-Z` for 0-25, `0-9` for 26-35.
const ALPHABET: [char; 36] = [
    'A', 'B', 'C', 'D', 'E', 'F', 'G', 'H', 'I', 'J', 'K', 'L', 'M', 'N', 'O', 'P', 'Q', 'R', 'S',
    'T', 'U', 'V', 'W', 'X', 'Y', 'Z', '0', '1', '2', '3', '4', '5', '6', '7', '8', '9',
];

/// Encodes a non-negative integer in base-36, left-padded with the zero
/// symbol (`A`) to at least `min_len` symbols.
///
/// Negative inputs are unrepresentable by construction: the argument is `u64`.
pub fn encode(mut value: u64, min_len: usize) -> String {
    let mut symbols = Vec::new();
    loop {
        symbols.push(ALPHABET[(value % 36) as usize]);
        value /= 36;
        if value == 0 {
            break;
        }
    }
    while symbols.len() < min_len {
        symbols.push(ALPHABET[0]);
    }
    symbols.iter().rev().collect()
}

/// Decodes a base-36 string back to its integer value.
///
/// Case-insensitive; fails on the empty string and on any symbol outside
/// the alphabet.
pub fn decode(input: &str) -> CoreResult<u64> {
    if input.is_empty() {
        return Err(CoreError::EmptyBase36);
    }

    let mut value: u64 = 0;
    for ch in input.chars() {
        let upper = ch.to_ascii_uppercase();
        let digit = match upper {
            'A'..='Z' => upper as u64 - 'A' as u64,
            '0'..='9' => 26 + (upper as u64 - '0' as u64),
            _ => {
                return Err(CoreError::InvalidBase36Symbol {
                    symbol: ch,
                    input: input.to_string(),
                })
            }
        };
        value = value
            .checked_mul(36)
            .and_then(|v| v.checked_add(digit))
            .ok_or_else(|| CoreError::Base36Overflow(input.to_string()))?;
    }

    Ok(value)
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_zero_is_a_not_empty() {
        assert_eq!(encode(0, 0), "A");
    }

    #[test]
    fn test_known_anchors() {
        assert_eq!(encode(36, 0), "BA");
        assert_eq!(decode("BA").unwrap(), 36);
        assert_eq!(encode(35, 0), "9");
        assert_eq!(decode("9").unwrap(), 35);
    }

    #[test]
    fn test_round_trip() {
        for n in [0u64, 1, 25, 26, 35, 36, 1295, 1296, 20260830, u32::MAX as u64] {
            for width in [0usize, 2, 8] {
                let encoded = encode(n, width);
                assert!(encoded.len() >= width);
                assert_eq!(decode(&encoded).unwrap(), n, "n={n} width={width}");
            }
        }
    }

    #[test]
    fn test_padding() {
        assert_eq!(encode(1, 2), "AB");
        assert_eq!(encode(0, 4), "AAAA");
    }

    #[test]
    fn test_decode_case_insensitive() {
        assert_eq!(decode("ba").unwrap(), 36);
        assert_eq!(decode("Ba").unwrap(), 36);
    }

    #[test]
    fn test_decode_rejects_bad_symbols() {
        assert!(matches!(
            decode("A-B"),
            Err(CoreError::InvalidBase36Symbol { symbol: '-', .. })
        ));
        assert_eq!(decode(""), Err(CoreError::EmptyBase36));
    }
}
