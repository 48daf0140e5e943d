//! C6: Bearer access-token middleware, plus the parallel JWT
//! extractor, both modeled as axum `FromRequestParts` extractors so
//! handlers simply name the auth they require in their signature.

use std::sync::Arc;

use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use base64::Engine;
use tracing::warn;

use casfa_token::decode as decode_token;
use casfa_token::DecodedToken;

use crate::error::ApiError;
use crate::state::AppState;

/// What a request is authenticated as, once C6 or the JWT middleware
/// has run.
#[derive(Debug, Clone)]
pub enum AuthContext {
    /// Authenticated via a 32-byte access token bound to a delegate.
    Access {
        /// The delegate the access token belongs to.
        delegate_id: String,
        /// The delegate's realm.
        realm: String,
        /// The delegate's upload capability.
        can_upload: bool,
        /// The delegate's depot-management capability.
        can_manage_depot: bool,
        /// Ancestor chain, root to self.
        issuer_chain: Vec<String>,
        /// The raw token bytes, for handlers that need to re-hash them.
        token_bytes: Vec<u8>,
    },
    /// Authenticated via a user's session JWT.
    Jwt {
        /// The authenticated user's id.
        user_id: String,
        /// The user's realm (equal to `user_id` in this model).
        realm: String,
        /// Optional coarse role from the token.
        role: Option<String>,
    },
}

/// Extractor that runs the full C6 pipeline: parse `Authorization:
/// Bearer <base64>`, decode, look up the delegate, and check liveness.
#[derive(Debug, Clone)]
pub struct AccessAuth(pub AuthContext);

#[async_trait::async_trait]
impl FromRequestParts<Arc<AppState>> for AccessAuth {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &Arc<AppState>) -> Result<Self, Self::Rejection> {
        let header = parts
            .headers
            .get(axum::http::header::AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .ok_or_else(|| ApiError::new(axum::http::StatusCode::UNAUTHORIZED, "UNAUTHORIZED", "missing Authorization header"))?;

        let encoded = header
            .strip_prefix("Bearer ")
            .ok_or_else(|| ApiError::new(axum::http::StatusCode::UNAUTHORIZED, "UNAUTHORIZED", "malformed Authorization header"))?;

        let token_bytes = base64::engine::general_purpose::STANDARD
            .decode(encoded)
            .or_else(|_| base64::engine::general_purpose::URL_SAFE_NO_PAD.decode(encoded))
            .map_err(|_| ApiError::new(axum::http::StatusCode::UNAUTHORIZED, "INVALID_TOKEN_FORMAT", "token is not valid base64"))?;

        if token_bytes.len() != casfa_token::codec::ACCESS_TOKEN_LEN {
            return Err(ApiError::new(axum::http::StatusCode::UNAUTHORIZED, "INVALID_TOKEN_FORMAT", "wrong token length"));
        }

        let decoded = decode_token(&token_bytes)
            .map_err(|_| ApiError::new(axum::http::StatusCode::UNAUTHORIZED, "INVALID_TOKEN_FORMAT", "malformed token"))?;
        let DecodedToken::Access { delegate_id, .. } = decoded else {
            return Err(ApiError::new(axum::http::StatusCode::FORBIDDEN, "ACCESS_TOKEN_REQUIRED", "a refresh token was presented where an access token is required"));
        };
        let delegate_id_str = casfa_token::id_bytes_to_string(&delegate_id);

        let delegate = state
            .delegates
            .get(&delegate_id_str)
            .await?
            .ok_or_else(|| ApiError::new(axum::http::StatusCode::UNAUTHORIZED, "DELEGATE_NOT_FOUND", "unknown delegate"))?;

        if delegate.is_revoked {
            return Err(ApiError::new(axum::http::StatusCode::UNAUTHORIZED, "DELEGATE_REVOKED", "delegate has been revoked"));
        }
        let now = state.now_ms();
        if delegate.expires_at.is_some_and(|exp| exp <= now) {
            return Err(ApiError::new(axum::http::StatusCode::UNAUTHORIZED, "DELEGATE_EXPIRED", "delegate has expired"));
        }

        let hash = casfa_token::keyed_token_hash(&state.config.token.hash_key, &token_bytes);
        if hash != delegate.current_at_hash {
            warn!(delegate_id = %delegate_id_str, "access token hash mismatch");
            return Err(ApiError::new(axum::http::StatusCode::UNAUTHORIZED, "TOKEN_INVALID", "access token does not match the live token"));
        }
        if delegate.at_expires_at < now {
            return Err(ApiError::new(axum::http::StatusCode::UNAUTHORIZED, "TOKEN_EXPIRED", "access token has expired"));
        }

        Ok(AccessAuth(AuthContext::Access {
            delegate_id: delegate_id_str,
            realm: delegate.realm,
            can_upload: delegate.can_upload,
            can_manage_depot: delegate.can_manage_depot,
            issuer_chain: delegate.chain,
            token_bytes,
        }))
    }
}

/// Extractor that authenticates the caller directly via a user JWT
/// (`Authorization: Bearer <jwt>`), independent of the delegate tree.
#[derive(Debug, Clone)]
pub struct JwtAuth(pub AuthContext);

#[async_trait::async_trait]
impl FromRequestParts<Arc<AppState>> for JwtAuth {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &Arc<AppState>) -> Result<Self, Self::Rejection> {
        let header = parts
            .headers
            .get(axum::http::header::AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .ok_or_else(|| ApiError::new(axum::http::StatusCode::UNAUTHORIZED, "UNAUTHORIZED", "missing Authorization header"))?;
        let token = header
            .strip_prefix("Bearer ")
            .ok_or_else(|| ApiError::new(axum::http::StatusCode::UNAUTHORIZED, "UNAUTHORIZED", "malformed Authorization header"))?;

        let claims = state
            .jwt
            .validate(token)
            .map_err(|_| ApiError::new(axum::http::StatusCode::UNAUTHORIZED, "UNAUTHORIZED", "invalid or expired JWT"))?;

        Ok(JwtAuth(AuthContext::Jwt {
            user_id: claims.sub.clone(),
            realm: claims.sub,
            role: claims.role,
        }))
    }
}
