//! Wire layout for the opaque access/refresh token pair.
//!
//! Access Token (32 bytes): `delegateId[16] ‖ expiresAt_ms[8] ‖ nonce[8]`.
//! Refresh Token (24 bytes): `delegateId[16] ‖ nonce[8]`.
//! Both integers are little-endian; the nonce is uniformly random.

use rand::RngCore;

use crate::{DelegateIdBytes, TokenCodecError};

/// Length in bytes of an encoded access token.
pub const ACCESS_TOKEN_LEN: usize = 32;
/// Length in bytes of an encoded refresh token.
pub const REFRESH_TOKEN_LEN: usize = 24;

/// A decoded token, typed by its wire length.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecodedToken {
    /// 32-byte access token.
    Access {
        /// Owning delegate.
        delegate_id: DelegateIdBytes,
        /// Absolute expiry, epoch milliseconds.
        expires_at_ms: i64,
    },
    /// 24-byte refresh token.
    Refresh {
        /// Owning delegate.
        delegate_id: DelegateIdBytes,
    },
}

impl DecodedToken {
    /// The delegate id embedded in this token, regardless of type.
    pub fn delegate_id(&self) -> DelegateIdBytes {
        match self {
            DecodedToken::Access { delegate_id, .. } => *delegate_id,
            DecodedToken::Refresh { delegate_id } => *delegate_id,
        }
    }

    /// True if this is an access token.
    pub fn is_access(&self) -> bool {
        matches!(self, DecodedToken::Access { .. })
    }

    /// True if this is a refresh token.
    pub fn is_refresh(&self) -> bool {
        matches!(self, DecodedToken::Refresh { .. })
    }
}

/// Encode a fresh access token for `delegate_id`, expiring at `expires_at_ms`.
pub fn encode_access_token(delegate_id: &DelegateIdBytes, expires_at_ms: i64) -> [u8; ACCESS_TOKEN_LEN] {
    let mut out = [0u8; ACCESS_TOKEN_LEN];
    out[0..16].copy_from_slice(delegate_id);
    out[16..24].copy_from_slice(&expires_at_ms.to_le_bytes());
    rand::thread_rng().fill_bytes(&mut out[24..32]);
    out
}

/// Encode a fresh refresh token for `delegate_id`.
pub fn encode_refresh_token(delegate_id: &DelegateIdBytes) -> [u8; REFRESH_TOKEN_LEN] {
    let mut out = [0u8; REFRESH_TOKEN_LEN];
    out[0..16].copy_from_slice(delegate_id);
    rand::thread_rng().fill_bytes(&mut out[16..24]);
    out
}

/// Decode a raw token, dispatching on its byte length.
pub fn decode(bytes: &[u8]) -> Result<DecodedToken, TokenCodecError> {
    match bytes.len() {
        ACCESS_TOKEN_LEN => {
            let mut delegate_id = [0u8; 16];
            delegate_id.copy_from_slice(&bytes[0..16]);
            let mut exp_bytes = [0u8; 8];
            exp_bytes.copy_from_slice(&bytes[16..24]);
            Ok(DecodedToken::Access {
                delegate_id,
                expires_at_ms: i64::from_le_bytes(exp_bytes),
            })
        }
        REFRESH_TOKEN_LEN => {
            let mut delegate_id = [0u8; 16];
            delegate_id.copy_from_slice(&bytes[0..16]);
            Ok(DecodedToken::Refresh { delegate_id })
        }
        other => Err(TokenCodecError::InvalidLength { len: other }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn access_token_round_trips_id_and_expiry() {
        let id = [7u8; 16];
        let raw = encode_access_token(&id, 1_700_000_000_000);
        match decode(&raw).unwrap() {
            DecodedToken::Access { delegate_id, expires_at_ms } => {
                assert_eq!(delegate_id, id);
                assert_eq!(expires_at_ms, 1_700_000_000_000);
            }
            DecodedToken::Refresh { .. } => panic!("expected access token"),
        }
    }

    #[test]
    fn refresh_token_round_trips_id() {
        let id = [3u8; 16];
        let raw = encode_refresh_token(&id);
        match decode(&raw).unwrap() {
            DecodedToken::Refresh { delegate_id } => assert_eq!(delegate_id, id),
            DecodedToken::Access { .. } => panic!("expected refresh token"),
        }
    }

    #[test]
    fn wrong_length_is_rejected() {
        let err = decode(&[0u8; 10]).unwrap_err();
        assert!(matches!(err, TokenCodecError::InvalidLength { len: 10 }));
    }

    #[test]
    fn nonces_differ_across_calls() {
        let id = [1u8; 16];
        let a = encode_refresh_token(&id);
        let b = encode_refresh_token(&id);
        assert_ne!(a[16..24], b[16..24]);
    }
}
