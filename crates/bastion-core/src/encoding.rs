//! Conversions between UTF-8 and UTF-16 text.

use crate::error::{CoreError, Result};

/// Decodes UTF-16 code units into a string.
///
/// # Errors
///
/// Fails with `StringEncodingError` on unpaired surrogates.
pub fn utf16_to_utf8(units: &[u16]) -> Result<String> {
    String::from_utf16(units)
        .map_err(|error| CoreError::string_encoding(format!("invalid UTF-16 text: {error}")))
}

/// Decodes UTF-16LE bytes into a string.
///
/// # Errors
///
/// Fails with `StringEncodingError` on odd lengths and unpaired surrogates.
pub fn utf16le_bytes_to_utf8(bytes: &[u8]) -> Result<String> {
    let chunks = bytes.chunks_exact(2);
    if !chunks.remainder().is_empty() {
        return Err(CoreError::string_encoding(format!(
            "UTF-16 data has an odd length of {} bytes",
            bytes.len()
        )));
    }
    let units: Vec<u16> = chunks
        .map(|pair| match pair {
            [low, high] => u16::from(*low) | (u16::from(*high) << 8),
            _ => 0,
        })
        .collect();
    utf16_to_utf8(&units)
}

/// Validates UTF-8 bytes and encodes them as UTF-16 code units.
///
/// # Errors
///
/// Fails with `StringEncodingError` when `bytes` is not valid UTF-8.
pub fn utf8_to_utf16(bytes: &[u8]) -> Result<Vec<u16>> {
    let text = std::str::from_utf8(bytes)
        .map_err(|error| CoreError::string_encoding(format!("invalid UTF-8 text: {error}")))?;
    Ok(text.encode_utf16().collect())
}
