//! Base64 helpers
//!
//! Subscriptions and share links use every Base64 flavour in the wild:
//! standard, URL-safe, padded or not, wrapped across lines. Decoding tries
//! each variant in turn; encoding always produces one canonical form.

use base64::Engine;
use base64::engine::general_purpose::{STANDARD, URL_SAFE, URL_SAFE_NO_PAD};
use tracing::trace;

use super::error::{ParseError, ParseResult};

// ============================================================================
// Decoding
// ============================================================================

/// Decodes Base64 content, trying multiple variants
///
/// Whitespace in the input is removed before decoding.
pub fn decode_base64(content: &str) -> ParseResult<Vec<u8>> {
    let cleaned: String = content.chars().filter(|c| !c.is_whitespace()).collect();
    trace!("Attempting Base64 decode of {} bytes", cleaned.len());

    for (variant, engine) in [
        ("standard", &STANDARD),
        ("url-safe", &URL_SAFE),
        ("url-safe unpadded", &URL_SAFE_NO_PAD),
    ] {
        if let Ok(decoded) = engine.decode(&cleaned) {
            trace!("Decoded using {} Base64", variant);
            return Ok(decoded);
        }
    }

    let padded = add_base64_padding(&cleaned);
    if let Ok(decoded) = STANDARD.decode(&padded) {
        trace!("Decoded using standard Base64 with added padding");
        return Ok(decoded);
    }
    if let Ok(decoded) = URL_SAFE.decode(&padded) {
        trace!("Decoded using URL-safe Base64 with added padding");
        return Ok(decoded);
    }

    Err(ParseError::InvalidBase64)
}

/// Decodes Base64 and interprets the bytes as UTF-8
pub fn decode_base64_utf8(content: &str) -> ParseResult<String> {
    let bytes = decode_base64(content)?;
    Ok(String::from_utf8(bytes)?)
}

/// Adds `=` padding so the length is a multiple of 4
pub fn add_base64_padding(s: &str) -> String {
    let mut result = s.to_string();
    while !result.len().is_multiple_of(4) {
        result.push('=');
    }
    result
}

// ============================================================================
// Encoding
// ============================================================================

/// Standard padded Base64 of the UTF-8 bytes of `text`
pub fn encode_base64(text: &str) -> String {
    STANDARD.encode(text.as_bytes())
}

/// URL-safe unpadded Base64, used inside SS userinfo and SSR links
pub fn encode_base64_url(text: &str) -> String {
    URL_SAFE_NO_PAD.encode(text.as_bytes())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_base64_standard() {
        let decoded = decode_base64("aGVsbG8gd29ybGQ=").unwrap();
        assert_eq!(String::from_utf8(decoded).unwrap(), "hello world");
    }

    #[test]
    fn test_decode_base64_with_linebreaks() {
        let decoded = decode_base64_utf8("aGVs\nbG8g\r\nd29y\tbGQ=").unwrap();
        assert_eq!(decoded, "hello world");
    }

    #[test]
    fn test_decode_base64_without_padding() {
        assert_eq!(decode_base64_utf8("aGVsbG8gd29ybGQ").unwrap(), "hello world");
    }

    #[test]
    fn test_decode_base64_invalid() {
        assert!(matches!(
            decode_base64("not valid base64!!!"),
            Err(ParseError::InvalidBase64)
        ));
    }

    #[test]
    fn test_non_ascii_round_trip() {
        let name = "香港 01 🇭🇰";
        assert_eq!(decode_base64_utf8(&encode_base64(name)).unwrap(), name);
        assert_eq!(decode_base64_utf8(&encode_base64_url(name)).unwrap(), name);
    }

    #[test]
    fn test_invalid_utf8_is_reported() {
        let encoded = STANDARD.encode([0xff, 0xfe, 0xfd]);
        assert!(matches!(
            decode_base64_utf8(&encoded),
            Err(ParseError::InvalidUtf8(_))
        ));
    }

    #[test]
    fn test_add_base64_padding() {
        assert_eq!(add_base64_padding("abcd"), "abcd");
        assert_eq!(add_base64_padding("abc"), "abc=");
        assert_eq!(add_base64_padding("ab"), "ab==");
        assert_eq!(add_base64_padding(""), "");
    }
}
