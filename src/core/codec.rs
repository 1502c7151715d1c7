//! Encoding and decoding of step payloads
//!
//! Script steps carry their payload as a literal string or a hex-pair
//! string. Decoding is strict: after stripping whitespace the string must
//! have even length and contain only hex digits.

use thiserror::Error;

/// Payload conversion error
#[derive(Error, Debug, PartialEq, Eq)]
pub enum CodecError {
    /// Hex string has an odd number of digits
    #[error("hex string must have an even number of digits")]
    OddLength,

    /// Hex string contains a non-hex character
    #[error("invalid hex character: {0:?}")]
    InvalidDigit(char),
}

/// Convert step content to the bytes to send.
///
/// Blank content yields an empty payload. Non-hex content is taken as its
/// raw byte form; hex content goes through [`decode_hex`].
pub fn to_bytes(content: &str, is_hex: bool) -> Result<Vec<u8>, CodecError> {
    if content.trim().is_empty() {
        return Ok(Vec::new());
    }
    if is_hex {
        decode_hex(content)
    } else {
        Ok(content.as_bytes().to_vec())
    }
}

/// Decode a hex-pair string such as `"AA 0B FF"` into bytes.
pub fn decode_hex(text: &str) -> Result<Vec<u8>, CodecError> {
    let cleaned: String = text.chars().filter(|c| !c.is_whitespace()).collect();

    if let Some(bad) = cleaned.chars().find(|c| !c.is_ascii_hexdigit()) {
        return Err(CodecError::InvalidDigit(bad));
    }
    if cleaned.len() % 2 != 0 {
        return Err(CodecError::OddLength);
    }

    let mut bytes = Vec::with_capacity(cleaned.len() / 2);
    let mut digits = cleaned.chars();
    while let (Some(hi), Some(lo)) = (digits.next(), digits.next()) {
        let hi = hi.to_digit(16).ok_or(CodecError::InvalidDigit(hi))?;
        let lo = lo.to_digit(16).ok_or(CodecError::InvalidDigit(lo))?;
        bytes.push((hi * 16 + lo) as u8);
    }
    Ok(bytes)
}

/// Format bytes as uppercase space-separated hex pairs.
pub fn encode_hex(bytes: &[u8]) -> String {
    bytes
        .iter()
        .map(|b| format!("{b:02X}"))
        .collect::<Vec<_>>()
        .join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_spaced_pairs() {
        assert_eq!(decode_hex("AA 0B ff").unwrap(), vec![0xAA, 0x0B, 0xFF]);
    }

    #[test]
    fn test_decode_unspaced() {
        assert_eq!(decode_hex("48454C").unwrap(), vec![0x48, 0x45, 0x4C]);
    }

    #[test]
    fn test_decode_odd_length_fails() {
        assert_eq!(decode_hex("ABC").unwrap_err(), CodecError::OddLength);
    }

    #[test]
    fn test_decode_invalid_digit_fails() {
        assert_eq!(decode_hex("AA GZ").unwrap_err(), CodecError::InvalidDigit('G'));
    }

    #[test]
    fn test_encode_round() {
        assert_eq!(encode_hex(&[0xAA, 0x0B]), "AA 0B");
        assert_eq!(encode_hex(&[]), "");
    }

    #[test]
    fn test_to_bytes_text() {
        assert_eq!(to_bytes("AT\r\n", false).unwrap(), b"AT\r\n".to_vec());
    }

    #[test]
    fn test_to_bytes_blank_is_empty() {
        assert_eq!(to_bytes("   ", true).unwrap(), Vec::<u8>::new());
        assert_eq!(to_bytes("", false).unwrap(), Vec::<u8>::new());
    }
}
