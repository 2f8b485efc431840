//! Text form of token bytes and key fingerprints: URL-safe base64 without
//! padding, so tokens can travel in JSON, query strings and headers as is.

use data_encoding::{BASE64URL_NOPAD, DecodeError};

pub(crate) fn base64_encode(bytes: &[u8]) -> String {
    BASE64URL_NOPAD.encode(bytes)
}

pub(crate) fn base64_decode(text: &str) -> Result<Vec<u8>, DecodeError> {
    BASE64URL_NOPAD.decode(text.as_bytes())
}
