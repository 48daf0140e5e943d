//! Keyed token-hash used to store a verifier for the current refresh
//! token without keeping the token itself at rest.
//!
//! The digest is BLAKE3's keyed hash truncated to 128 bits (`dkLen=16`)
//! and rendered as 32 lowercase hex characters, matching `causal_hash`'s
//! use of `blake3::Hasher` elsewhere in this workspace for content
//! addressing.

/// Length, in hex characters, of a rendered token hash.
pub const TOKEN_HASH_HEX_LEN: usize = 32;

const DIGEST_BYTES: usize = 16;

/// Hash `token_bytes` under `key`, returning a 32-character lowercase
/// hex string.
///
/// `key` must be exactly 32 bytes, as required by `blake3::keyed_hash`.
pub fn keyed_token_hash(key: &[u8; 32], token_bytes: &[u8]) -> String {
    let digest = blake3::keyed_hash(key, token_bytes);
    let truncated = &digest.as_bytes()[..DIGEST_BYTES];
    let mut out = String::with_capacity(TOKEN_HASH_HEX_LEN);
    for byte in truncated {
        out.push_str(&format!("{:02x}", byte));
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hash_is_32_lowercase_hex_chars() {
        let key = [9u8; 32];
        let hash = keyed_token_hash(&key, b"some-refresh-token-bytes");
        assert_eq!(hash.len(), TOKEN_HASH_HEX_LEN);
        assert!(hash.chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase()));
    }

    #[test]
    fn hash_is_deterministic() {
        let key = [1u8; 32];
        let a = keyed_token_hash(&key, b"token-a");
        let b = keyed_token_hash(&key, b"token-a");
        assert_eq!(a, b);
    }

    #[test]
    fn different_keys_produce_different_hashes() {
        let a = keyed_token_hash(&[1u8; 32], b"same-bytes");
        let b = keyed_token_hash(&[2u8; 32], b"same-bytes");
        assert_ne!(a, b);
    }

    #[test]
    fn different_tokens_produce_different_hashes() {
        let key = [5u8; 32];
        let a = keyed_token_hash(&key, b"token-one");
        let b = keyed_token_hash(&key, b"token-two");
        assert_ne!(a, b);
    }
}
