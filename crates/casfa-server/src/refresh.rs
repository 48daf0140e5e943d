//! C7: consumes a refresh token and atomically rotates it (and its
//! paired access token) to a fresh generation.
//!
//! This is a free function rather than a type so both the plain
//! `/api/refresh` endpoint and the OAuth `grant_type=refresh_token`
//! branch of the token endpoint can share it without going through
//! HTTP-shaped types.

use std::sync::Arc;

use axum::extract::State;
use axum::http::header::AUTHORIZATION;
use axum::http::HeaderMap;
use axum::Json;
use base64::Engine;
use serde::Serialize;

use casfa_store::{DelegateStore, RotateTokensInput};
use casfa_token::{decode, encode_access_token, encode_refresh_token, id_bytes_to_string, keyed_token_hash, DecodedToken};

use crate::dto::b64;
use crate::error::{ApiError, RefreshError};
use crate::state::AppState;

/// The fresh pair handed back to the caller on a successful rotation.
#[derive(Debug, Clone)]
pub struct RefreshOutput {
    /// Newly minted access-token bytes.
    pub access_token: Vec<u8>,
    /// Newly minted refresh-token bytes.
    pub refresh_token: Vec<u8>,
    /// Absolute expiry of `access_token`, epoch-ms.
    pub access_token_expires_at: i64,
    /// The delegate these tokens belong to.
    pub delegate_id: String,
}

/// Run the spec §4.7 refresh algorithm against `rt_bytes`.
pub async fn refresh(
    delegates: &dyn DelegateStore,
    hash_key: &[u8; 32],
    rt_bytes: &[u8],
    now_ms: i64,
    at_ttl_seconds: i64,
) -> Result<RefreshOutput, RefreshError> {
    let delegate_id_bytes = match decode(rt_bytes) {
        Ok(DecodedToken::Refresh { delegate_id }) => delegate_id,
        Ok(DecodedToken::Access { .. }) | Err(_) => return Err(RefreshError::NotRefreshToken),
    };
    let delegate_id = id_bytes_to_string(&delegate_id_bytes);

    let delegate = delegates
        .get(&delegate_id)
        .await?
        .ok_or(RefreshError::Unauthorized("DELEGATE_NOT_FOUND"))?;
    if delegate.is_revoked {
        return Err(RefreshError::Unauthorized("DELEGATE_REVOKED"));
    }
    if delegate.expires_at.is_some_and(|exp| exp <= now_ms) {
        return Err(RefreshError::Unauthorized("DELEGATE_EXPIRED"));
    }

    let rt_hash = keyed_token_hash(hash_key, rt_bytes);
    if rt_hash != delegate.current_rt_hash {
        return Err(RefreshError::TokenInvalid);
    }

    let new_at_expires_at = now_ms + at_ttl_seconds * 1000;
    let new_rt = encode_refresh_token(&delegate_id_bytes);
    let new_at = encode_access_token(&delegate_id_bytes, new_at_expires_at);
    let new_rt_hash = keyed_token_hash(hash_key, &new_rt);
    let new_at_hash = keyed_token_hash(hash_key, &new_at);

    let rotated = delegates
        .rotate_tokens(RotateTokensInput {
            delegate_id: delegate_id.clone(),
            expected_rt_hash: rt_hash,
            new_rt_hash,
            new_at_hash,
            new_at_expires_at,
        })
        .await?;
    if !rotated {
        return Err(RefreshError::ConcurrentRotation);
    }

    Ok(RefreshOutput {
        access_token: new_at.to_vec(),
        refresh_token: new_rt.to_vec(),
        access_token_expires_at: new_at_expires_at,
        delegate_id,
    })
}

/// `POST /api/refresh` response body.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RefreshResponse {
    pub refresh_token: String,
    pub access_token: String,
    pub access_token_expires_at: i64,
    pub delegate_id: String,
}

fn extract_rt_bytes(headers: &HeaderMap) -> Result<Vec<u8>, ApiError> {
    let header = headers
        .get(AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .ok_or_else(|| ApiError::new(axum::http::StatusCode::BAD_REQUEST, "NOT_REFRESH_TOKEN", "missing Authorization header"))?;
    let encoded = header
        .strip_prefix("Bearer ")
        .ok_or_else(|| ApiError::new(axum::http::StatusCode::BAD_REQUEST, "NOT_REFRESH_TOKEN", "malformed Authorization header"))?;
    base64::engine::general_purpose::STANDARD
        .decode(encoded)
        .or_else(|_| base64::engine::general_purpose::URL_SAFE_NO_PAD.decode(encoded))
        .map_err(|_| ApiError::new(axum::http::StatusCode::BAD_REQUEST, "NOT_REFRESH_TOKEN", "token is not valid base64"))
}

/// `POST /api/refresh`. Header `Authorization: Bearer <base64 RT>`.
pub async fn refresh_handler(State(state): State<Arc<AppState>>, headers: HeaderMap) -> Result<Json<RefreshResponse>, ApiError> {
    let rt_bytes = extract_rt_bytes(&headers)?;

    let now = state.now_ms();
    let out = refresh(state.delegates.as_ref(), &state.config.token.hash_key, &rt_bytes, now, state.config.token.at_ttl_seconds)
        .await?;

    Ok(Json(RefreshResponse {
        refresh_token: b64(&out.refresh_token),
        access_token: b64(&out.access_token),
        access_token_expires_at: out.access_token_expires_at,
        delegate_id: out.delegate_id,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use casfa_store::MemoryDelegateStore;
    use casfa_token::delegate_id::DelegateIdBytes;

    fn root_with_tokens(id: &str, rt: &[u8], at_hash: &str, key: &[u8; 32]) -> casfa_store::Delegate {
        casfa_store::Delegate {
            delegate_id: id.to_string(),
            realm: "usr_alice".to_string(),
            parent_id: casfa_store::ROOT_SENTINEL.to_string(),
            chain: vec![id.to_string()],
            depth: 0,
            can_upload: true,
            can_manage_depot: true,
            delegated_depots: None,
            scope_node_hash: None,
            scope_set_node_id: None,
            expires_at: None,
            is_revoked: false,
            revoked_at: None,
            revoked_by: None,
            created_at: 0,
            current_rt_hash: keyed_token_hash(key, rt),
            current_at_hash: at_hash.to_string(),
            at_expires_at: 1_000_000,
        }
    }

    #[tokio::test]
    async fn rejects_access_token_presented_as_refresh() {
        let store = MemoryDelegateStore::new();
        let id: DelegateIdBytes = [1u8; 16];
        let at = encode_access_token(&id, 1_000);
        let key = [0u8; 32];
        let err = refresh(&store, &key, &at, 0, 3600).await.unwrap_err();
        assert!(matches!(err, RefreshError::NotRefreshToken));
    }

    #[tokio::test]
    async fn rotates_and_invalidates_old_refresh_token() {
        let store = MemoryDelegateStore::new();
        let id: DelegateIdBytes = [2u8; 16];
        let rt = encode_refresh_token(&id);
        let key = [9u8; 32];
        let delegate = root_with_tokens(&id_bytes_to_string(&id), &rt, "whatever", &key);
        store.create(&delegate).await.unwrap();

        let out = refresh(&store, &key, &rt, 0, 3600).await.unwrap();
        assert_eq!(out.delegate_id, id_bytes_to_string(&id));

        let err = refresh(&store, &key, &rt, 0, 3600).await.unwrap_err();
        assert!(matches!(err, RefreshError::TokenInvalid));
    }

    #[tokio::test]
    async fn replaying_a_stale_refresh_token_is_rejected() {
        let store = MemoryDelegateStore::new();
        let id: DelegateIdBytes = [3u8; 16];
        let rt = encode_refresh_token(&id);
        let key = [1u8; 32];
        let delegate = root_with_tokens(&id_bytes_to_string(&id), &rt, "whatever", &key);
        store.create(&delegate).await.unwrap();

        let first = refresh(&store, &key, &rt, 0, 3600).await;
        let second = refresh(&store, &key, &rt, 0, 3600).await;
        assert!(first.is_ok());
        assert!(matches!(second.unwrap_err(), RefreshError::TokenInvalid));
    }

    #[tokio::test]
    async fn truly_concurrent_refresh_calls_yield_exactly_one_success() {
        use std::sync::Arc;

        let store: Arc<MemoryDelegateStore> = Arc::new(MemoryDelegateStore::new());
        let id: DelegateIdBytes = [5u8; 16];
        let rt = encode_refresh_token(&id);
        let key = [7u8; 32];
        let delegate = root_with_tokens(&id_bytes_to_string(&id), &rt, "whatever", &key);
        store.create(&delegate).await.unwrap();

        let store_a = store.clone();
        let rt_a = rt;
        let store_b = store.clone();
        let rt_b = rt;
        let (a, b) = tokio::join!(
            async move { refresh(store_a.as_ref(), &key, &rt_a, 0, 3600).await },
            async move { refresh(store_b.as_ref(), &key, &rt_b, 0, 3600).await },
        );
        let successes = [a.is_ok(), b.is_ok()].into_iter().filter(|x| *x).count();
        assert_eq!(successes, 1);
        let concurrent_rejection = [&a, &b]
            .into_iter()
            .any(|r| matches!(r, Err(RefreshError::ConcurrentRotation) | Err(RefreshError::TokenInvalid)));
        assert!(concurrent_rejection);
    }

    #[tokio::test]
    async fn revoked_delegate_rejects_refresh() {
        let store = MemoryDelegateStore::new();
        let id: DelegateIdBytes = [4u8; 16];
        let rt = encode_refresh_token(&id);
        let key = [2u8; 32];
        let mut delegate = root_with_tokens(&id_bytes_to_string(&id), &rt, "whatever", &key);
        delegate.is_revoked = true;
        store.create(&delegate).await.unwrap();

        let err = refresh(&store, &key, &rt, 0, 3600).await.unwrap_err();
        assert!(matches!(err, RefreshError::Unauthorized("DELEGATE_REVOKED")));
    }
}
