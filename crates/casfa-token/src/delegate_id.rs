//! Crockford-Base32 encoding for 16-byte delegate identities.
//!
//! Rendered form is `dlt_` followed by 26 characters drawn from the
//! Crockford alphabet (digits + uppercase letters, excluding `I`, `L`,
//! `O`, `U` to avoid visual ambiguity). Decoding is case-insensitive.

use crate::TokenCodecError;

const ALPHABET: &[u8; 32] = b"0123456789ABCDEFGHJKMNPQRSTVWXYZ";
const PREFIX: &str = "dlt_";
const ENCODED_LEN: usize = 26;

/// A 16-byte delegate identity.
pub type DelegateIdBytes = [u8; 16];

/// Render 16 raw bytes as `dlt_<26 Crockford-Base32 chars>`.
pub fn id_bytes_to_string(id: &DelegateIdBytes) -> String {
    let mut out = String::with_capacity(PREFIX.len() + ENCODED_LEN);
    out.push_str(PREFIX);
    out.push_str(&encode(id));
    out
}

/// Parse a `dlt_…` string back into its 16 raw bytes.
///
/// Accepts upper- or lower-case encodings of the suffix.
pub fn string_to_id_bytes(s: &str) -> Result<DelegateIdBytes, TokenCodecError> {
    let suffix = s
        .strip_prefix(PREFIX)
        .ok_or(TokenCodecError::MalformedDelegateId)?;
    if suffix.len() != ENCODED_LEN {
        return Err(TokenCodecError::MalformedDelegateId);
    }
    decode(suffix)
}

/// Crockford-Base32-encode 16 raw bytes with no prefix, for callers
/// that need the same alphabet for a non-delegate identity (e.g. a
/// scope-set node id).
pub fn encode_raw(bytes: &DelegateIdBytes) -> String {
    encode(bytes)
}

fn encode(bytes: &DelegateIdBytes) -> String {
    let mut output = String::with_capacity(ENCODED_LEN);
    let mut buffer: u64 = 0;
    let mut bits_in_buffer: u32 = 0;

    for &byte in bytes {
        buffer = (buffer << 8) | u64::from(byte);
        bits_in_buffer += 8;
        while bits_in_buffer >= 5 {
            bits_in_buffer -= 5;
            let index = ((buffer >> bits_in_buffer) & 0x1F) as usize;
            output.push(ALPHABET[index] as char);
        }
    }
    if bits_in_buffer > 0 {
        let index = ((buffer << (5 - bits_in_buffer)) & 0x1F) as usize;
        output.push(ALPHABET[index] as char);
    }
    output
}

fn decode(s: &str) -> Result<DelegateIdBytes, TokenCodecError> {
    let mut buffer: u64 = 0;
    let mut bits_in_buffer: u32 = 0;
    let mut out = Vec::with_capacity(16);

    for c in s.chars() {
        let value = char_value(c).ok_or(TokenCodecError::MalformedDelegateId)?;
        buffer = (buffer << 5) | u64::from(value);
        bits_in_buffer += 5;
        if bits_in_buffer >= 8 {
            bits_in_buffer -= 8;
            out.push(((buffer >> bits_in_buffer) & 0xFF) as u8);
        }
    }

    if out.len() != 16 {
        return Err(TokenCodecError::MalformedDelegateId);
    }
    out.try_into().map_err(|_| TokenCodecError::MalformedDelegateId)
}

fn char_value(c: char) -> Option<u8> {
    let upper = c.to_ascii_uppercase();
    ALPHABET.iter().position(|&a| a == upper as u8).map(|p| p as u8)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn round_trips_known_bytes() {
        let bytes: DelegateIdBytes = [
            0x01, 0x23, 0x45, 0x67, 0x89, 0xab, 0xcd, 0xef, 0x00, 0x11, 0x22, 0x33, 0x44, 0x55,
            0x66, 0x77,
        ];
        let rendered = id_bytes_to_string(&bytes);
        assert!(rendered.starts_with(PREFIX));
        assert_eq!(rendered.len(), PREFIX.len() + ENCODED_LEN);
        assert_eq!(string_to_id_bytes(&rendered).unwrap(), bytes);
    }

    #[test]
    fn decode_is_case_insensitive() {
        let bytes: DelegateIdBytes = [0xff; 16];
        let rendered = id_bytes_to_string(&bytes);
        let lower = rendered.to_ascii_lowercase();
        assert_eq!(string_to_id_bytes(&lower).unwrap(), bytes);
    }

    #[test]
    fn rejects_missing_prefix_and_bad_length() {
        assert!(string_to_id_bytes("not-a-delegate-id").is_err());
        assert!(string_to_id_bytes("dlt_tooshort").is_err());
    }

    proptest! {
        #[test]
        fn round_trip_prop(bytes in any::<[u8; 16]>()) {
            let rendered = id_bytes_to_string(&bytes);
            prop_assert_eq!(string_to_id_bytes(&rendered).unwrap(), bytes);
        }
    }
}
