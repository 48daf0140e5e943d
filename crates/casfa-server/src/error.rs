//! HTTP-facing error type for the non-OAuth, non-JSON-RPC surface
//! (C6-C9). Unlike the teacher's handlers, which return a bare
//! `StatusCode`, every error here carries the `KIND` string from spec
//! §7 so clients can match on it without parsing prose.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use tracing::error;

use casfa_delegation::DelegationError;
use casfa_store::StoreError;

/// `{error: KIND, message}` response body, with the HTTP status spec
/// §7 assigns to that kind in the context it was raised.
#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    kind: &'static str,
    message: String,
}

#[derive(Serialize)]
struct ApiErrorBody<'a> {
    error: &'a str,
    message: &'a str,
}

impl ApiError {
    /// Build an error with an explicit status, kind, and message.
    pub fn new(status: StatusCode, kind: &'static str, message: impl Into<String>) -> Self {
        Self { status, kind, message: message.into() }
    }

    /// A backend/transport failure; never exposes the underlying
    /// message to the client, only logs it.
    pub fn internal(context: &str, err: impl std::fmt::Display) -> Self {
        error!(context, %err, "internal error");
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR", "internal error")
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = ApiErrorBody { error: self.kind, message: &self.message };
        (self.status, Json(body)).into_response()
    }
}

impl From<StoreError> for ApiError {
    fn from(err: StoreError) -> Self {
        ApiError::internal("store", err)
    }
}

/// Map a C5 permission-algebra / C4 scope-resolution failure onto the
/// 400 responses spec §7 assigns them.
impl From<DelegationError> for ApiError {
    fn from(err: DelegationError) -> Self {
        match err {
            DelegationError::PermissionEscalation(_) => {
                ApiError::new(StatusCode::BAD_REQUEST, "PERMISSION_ESCALATION", err.to_string())
            }
            DelegationError::DepthExceeded => {
                ApiError::new(StatusCode::BAD_REQUEST, "DEPTH_EXCEEDED", err.to_string())
            }
            DelegationError::InvalidScope => {
                ApiError::new(StatusCode::BAD_REQUEST, "INVALID_SCOPE", err.to_string())
            }
        }
    }
}

/// Errors the C7 refresh service raises; the caller picks the status
/// (401 for a normal mismatch, 409 for a lost CAS race).
#[derive(Debug)]
pub enum RefreshError {
    /// Length check or type check failed.
    NotRefreshToken,
    /// Delegate missing, revoked, or expired.
    Unauthorized(&'static str),
    /// Hash mismatch against `current_rt_hash`.
    TokenInvalid,
    /// `RotateTokens` lost the compare-and-swap to a concurrent call.
    ConcurrentRotation,
    /// The backing store failed.
    Store(StoreError),
}

impl From<StoreError> for RefreshError {
    fn from(err: StoreError) -> Self {
        RefreshError::Store(err)
    }
}

impl From<RefreshError> for ApiError {
    fn from(err: RefreshError) -> Self {
        match err {
            RefreshError::NotRefreshToken => {
                ApiError::new(StatusCode::BAD_REQUEST, "NOT_REFRESH_TOKEN", "token is not a refresh token")
            }
            RefreshError::Unauthorized(kind) => {
                ApiError::new(StatusCode::UNAUTHORIZED, kind, "refresh rejected")
            }
            RefreshError::TokenInvalid => {
                ApiError::new(StatusCode::UNAUTHORIZED, "TOKEN_INVALID", "refresh token is stale or unknown")
            }
            RefreshError::ConcurrentRotation => {
                ApiError::new(StatusCode::CONFLICT, "TOKEN_INVALID", "a concurrent refresh already rotated this delegate")
            }
            RefreshError::Store(err) => ApiError::internal("refresh", err),
        }
    }
}
