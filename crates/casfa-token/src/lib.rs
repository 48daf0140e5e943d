//! Opaque binary access/refresh token codec and delegate-id encoding.
//!
//! This crate has no knowledge of storage or HTTP; it only turns byte
//! buffers into typed tokens and back, and renders/parses delegate
//! identities. See `casfa-delegation` and `casfa-store` for the layers
//! that give these bytes meaning.

pub mod codec;
pub mod delegate_id;
pub mod hash;

pub use codec::{decode, encode_access_token, encode_refresh_token, DecodedToken};
pub use delegate_id::{encode_raw, id_bytes_to_string, string_to_id_bytes, DelegateIdBytes};
pub use hash::{keyed_token_hash, TOKEN_HASH_HEX_LEN};

use thiserror::Error;

/// Errors raised while encoding or decoding tokens and delegate ids.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum TokenCodecError {
    /// The delegate-id string was missing its prefix, had the wrong
    /// length, or contained a character outside the Crockford alphabet.
    #[error("malformed delegate id")]
    MalformedDelegateId,

    /// A raw token buffer was neither 32 bytes (access) nor 24 bytes
    /// (refresh).
    #[error("invalid token length: {len} bytes")]
    InvalidLength {
        /// The length actually observed.
        len: usize,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_messages_are_stable() {
        assert_eq!(
            TokenCodecError::InvalidLength { len: 5 }.to_string(),
            "invalid token length: 5 bytes"
        );
        assert_eq!(
            TokenCodecError::MalformedDelegateId.to_string(),
            "malformed delegate id"
        );
    }
}
