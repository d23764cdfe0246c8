//! # Hex Encoding/Decoding Utilities
//!
//! Thin wrappers over the `hex` crate with the validation flavors the rest
//! of the pipeline needs: strict validation for keys and telegram input,
//! and a flexible variant that tolerates the separators people paste into
//! config files and simulation logs.

use thiserror::Error;

/// Errors that can occur during hex operations
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum HexError {
    #[error("Invalid hex character: {0}")]
    InvalidCharacter(char),

    #[error("Odd number of hex characters: {0}")]
    OddLength(usize),

    #[error("Empty hex string")]
    EmptyString,
}

/// Encode bytes to a lowercase hex string.
///
/// This is the canonical representation used for meter ids and logged
/// payloads throughout the crate.
pub fn bin2hex(data: &[u8]) -> String {
    hex::encode(data)
}

/// Encode bytes to an uppercase hex string (DV keys use this form).
pub fn bin2hex_upper(data: &[u8]) -> String {
    hex::encode_upper(data)
}

/// Decode a hex string to bytes.
///
/// Accepts upper and lower case; whitespace is stripped first.
pub fn hex2bin(s: &str) -> Result<Vec<u8>, HexError> {
    let cleaned: String = s.chars().filter(|c| !c.is_whitespace()).collect();

    if cleaned.is_empty() {
        return Err(HexError::EmptyString);
    }
    if cleaned.len() % 2 != 0 {
        return Err(HexError::OddLength(cleaned.len()));
    }
    if let Some(c) = cleaned.chars().find(|c| !c.is_ascii_hexdigit()) {
        return Err(HexError::InvalidCharacter(c));
    }

    Ok(hex::decode(&cleaned).expect("validated hex"))
}

/// Strict hex validation: every character must be a hex digit.
///
/// Returns `(ok, odd)` where `ok` is true when no foreign characters were
/// seen and `odd` is true when the digit count is odd (a syntactically
/// hex-looking string that cannot form whole bytes).
pub fn is_hex_string_strict(s: &str) -> (bool, bool) {
    let ok = s.chars().all(|c| c.is_ascii_hexdigit());
    (ok, ok && s.len() % 2 != 0)
}

/// Flexible hex validation: spaces and `#` `|` `:` `-` separators are
/// ignored, everything else must be a hex digit.
pub fn is_hex_string_flex(s: &str) -> (bool, bool) {
    let mut digits = 0usize;
    for c in s.chars() {
        if c.is_ascii_hexdigit() {
            digits += 1;
        } else if !matches!(c, ' ' | '#' | '|' | ':' | '-') {
            return (false, false);
        }
    }
    (true, digits % 2 != 0)
}

/// Lenient parse: strips all non-hex characters before decoding.
pub fn hex2bin_lenient(s: &str) -> Result<Vec<u8>, HexError> {
    let digits: String = s.chars().filter(|c| c.is_ascii_hexdigit()).collect();

    if digits.is_empty() {
        return Err(HexError::EmptyString);
    }
    if digits.len() % 2 != 0 {
        return Err(HexError::OddLength(digits.len()));
    }

    Ok(hex::decode(&digits).expect("validated hex"))
}

/// Test helper: decode or panic. Only for test data.
pub fn hex_to_bytes(s: &str) -> Vec<u8> {
    hex2bin_lenient(s).expect("invalid hex in test data")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_roundtrip() {
        let data = vec![0x68, 0x31, 0x31, 0x68, 0x08, 0x00, 0x72, 0x45];
        assert_eq!(hex2bin(&bin2hex(&data)).unwrap(), data);
    }

    #[test]
    fn test_case() {
        let data = vec![0xAB, 0xCD, 0xEF];
        assert_eq!(bin2hex(&data), "abcdef");
        assert_eq!(bin2hex_upper(&data), "ABCDEF");
    }

    #[test]
    fn test_strict() {
        assert_eq!(is_hex_string_strict("00112233445566778899aabbccddeeff"), (true, false));
        assert_eq!(is_hex_string_strict("00112233445566778899AABBCCDDEEFF"), (true, false));
        assert_eq!(is_hex_string_strict("00112233445566778899AABBCCDDEEF"), (true, true));
        assert_eq!(is_hex_string_strict("00112233445566778899AABBCCDDEEFG"), (false, false));
    }

    #[test]
    fn test_flex() {
        assert_eq!(is_hex_string_flex("00 11 22 33#44|55#66 778899aabbccddeeff"), (true, false));
        assert_eq!(is_hex_string_flex("00 11 22 33#4|55#66 778899aabbccddeeff"), (true, true));
    }

    #[test]
    fn test_errors() {
        assert_eq!(hex2bin(""), Err(HexError::EmptyString));
        assert_eq!(hex2bin("1"), Err(HexError::OddLength(1)));
        assert_eq!(hex2bin("GG"), Err(HexError::InvalidCharacter('G')));
    }
}
