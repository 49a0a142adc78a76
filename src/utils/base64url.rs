// src/utils/base64url.rs
use base64::Engine;
use base64::alphabet;
use base64::engine::{DecodePaddingMode, GeneralPurpose, GeneralPurposeConfig};

/// URL-safe alphabet that accepts input with or without `=` padding.
const URL_SAFE_LENIENT: GeneralPurpose = GeneralPurpose::new(
    &alphabet::URL_SAFE,
    GeneralPurposeConfig::new().with_decode_padding_mode(DecodePaddingMode::Indifferent),
);

/// Decodes a server-supplied VAPID key.
///
/// Keys are usually unpadded base64url, but some backends hand out the
/// standard alphabet; `+` and `/` are folded into `-` and `_` first.
pub fn decode_key(raw: &str) -> Option<Vec<u8>> {
    let normalized: String = raw
        .trim()
        .chars()
        .map(|c| match c {
            '+' => '-',
            '/' => '_',
            c => c,
        })
        .collect();

    if normalized.is_empty() {
        return None;
    }

    match URL_SAFE_LENIENT.decode(normalized.as_bytes()) {
        Ok(bytes) => Some(bytes),
        Err(e) => {
            tracing::warn!("Failed to decode server push key: {}", e);
            None
        }
    }
}

pub fn encode(bytes: &[u8]) -> String {
    base64::engine::general_purpose::URL_SAFE_NO_PAD.encode(bytes)
}
