//! # Text-Safe Encoder
//!
//! Maps bytes onto the standard base64 alphabet (`A-Z a-z 0-9 + /`, `=` padding)
//! so a serialized callable can sit inside a single-quoted script literal. None of
//! `'`, `"`, `\` or a newline can appear in the output.

use base64::DecodeError;
use base64::Engine;
use base64::engine::general_purpose::STANDARD;

use crate::error::EncodingError;

/// Encodes `bytes` as padded standard base64.
pub fn encode(bytes: &[u8]) -> String {
    STANDARD.encode(bytes)
}

/// Decodes text produced by [`encode`].
pub fn decode(text: &str) -> Result<Vec<u8>, EncodingError> {
    STANDARD.decode(text).map_err(|e| match e {
        DecodeError::InvalidByte(offset, byte) | DecodeError::InvalidLastSymbol(offset, byte) => {
            EncodingError::InvalidSymbol { offset, byte }
        }
        DecodeError::InvalidPadding => EncodingError::InvalidPadding,
        _ => EncodingError::InvalidLength,
    })
}

/// True if every character of `text` belongs to the encoder's alphabet.
pub fn is_text_safe(text: &str) -> bool {
    text.bytes().all(is_text_safe_byte)
}

pub(crate) fn is_text_safe_byte(b: u8) -> bool {
    b.is_ascii_alphanumeric() || matches!(b, b'+' | b'/' | b'=')
}
