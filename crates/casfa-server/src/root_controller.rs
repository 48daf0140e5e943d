//! C9: `POST /api/tokens/root` - ensures a realm's root delegate
//! exists and returns its metadata. Root delegates carry no live
//! RT/AT; the owning user authenticates henceforth with the JWT
//! itself.

use std::sync::Arc;

use axum::extract::State;
use axum::http::StatusCode;
use axum::Json;
use rand::RngCore;
use serde::{Deserialize, Serialize};

use casfa_delegation::new_root_delegate;
use casfa_token::id_bytes_to_string;

use crate::auth_context::{AuthContext, JwtAuth};
use crate::dto::DelegateView;
use crate::error::ApiError;
use crate::state::AppState;

#[derive(Debug, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct RootRequest {
    #[serde(default)]
    pub realm: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RootResponse {
    pub delegate: DelegateView,
}

/// `POST /api/tokens/root`
pub async fn get_or_create_root(
    State(state): State<Arc<AppState>>,
    JwtAuth(auth): JwtAuth,
    body: Option<Json<RootRequest>>,
) -> Result<(StatusCode, Json<RootResponse>), ApiError> {
    let AuthContext::Jwt { user_id, .. } = auth else {
        return Err(ApiError::new(StatusCode::UNAUTHORIZED, "UNAUTHORIZED", "a user JWT is required"));
    };
    let requested_realm = body.and_then(|Json(b)| b.realm);
    let realm = requested_realm.unwrap_or_else(|| user_id.clone());
    if realm != user_id {
        return Err(ApiError::new(StatusCode::BAD_REQUEST, "INVALID_REALM", "realm must equal the authenticated user's id"));
    }

    let mut proposed_id = [0u8; 16];
    rand::thread_rng().fill_bytes(&mut proposed_id);
    let proposed = new_root_delegate(&realm, id_bytes_to_string(&proposed_id), state.now_ms());

    let (delegate, created) = state.delegates.get_or_create_root(&realm, &proposed).await?;
    if delegate.is_revoked {
        return Err(ApiError::new(StatusCode::FORBIDDEN, "ROOT_DELEGATE_REVOKED", "the realm's root delegate has been revoked"));
    }

    let status = if created { StatusCode::CREATED } else { StatusCode::OK };
    Ok((status, Json(RootResponse { delegate: DelegateView::from(&delegate) })))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_request_has_no_realm_override() {
        let req = RootRequest::default();
        assert!(req.realm.is_none());
    }
}
