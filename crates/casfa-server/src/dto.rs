//! Wire-shaped request/response bodies shared across controllers.
//!
//! Internal records (`casfa_store::Delegate` and friends) stay
//! snake_case Rust; everything that crosses the HTTP boundary is
//! rendered camelCase to match spec §6's literal field names.

use base64::Engine;
use serde::{Deserialize, Serialize};

use casfa_store::Delegate;

/// A delegate as returned to API callers - never includes the token
/// hash fields.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DelegateView {
    pub delegate_id: String,
    pub realm: String,
    pub parent_id: String,
    pub chain: Vec<String>,
    pub depth: u32,
    pub can_upload: bool,
    pub can_manage_depot: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub delegated_depots: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scope_node_hash: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scope_set_node_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<i64>,
    pub is_revoked: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub revoked_at: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub revoked_by: Option<String>,
    pub created_at: i64,
}

impl From<&Delegate> for DelegateView {
    fn from(d: &Delegate) -> Self {
        Self {
            delegate_id: d.delegate_id.clone(),
            realm: d.realm.clone(),
            parent_id: d.parent_id.clone(),
            chain: d.chain.clone(),
            depth: d.depth,
            can_upload: d.can_upload,
            can_manage_depot: d.can_manage_depot,
            delegated_depots: d.delegated_depots.clone(),
            scope_node_hash: d.scope_node_hash.clone(),
            scope_set_node_id: d.scope_set_node_id.clone(),
            expires_at: d.expires_at,
            is_revoked: d.is_revoked,
            revoked_at: d.revoked_at,
            revoked_by: d.revoked_by.clone(),
            created_at: d.created_at,
        }
    }
}

/// Standard base64 (not URL-safe) rendering used for token bytes on
/// the non-OAuth surface, matching spec §6.1's `Bearer <base64>`.
pub fn b64(bytes: &[u8]) -> String {
    base64::engine::general_purpose::STANDARD.encode(bytes)
}

/// A freshly issued or rotated token pair, rendered exactly once.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenPairView {
    pub access_token: String,
    pub refresh_token: String,
    pub access_token_expires_at: i64,
}

/// Query parameters accepted by `GET .../delegates`.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListDelegatesQuery {
    pub limit: Option<u32>,
    pub cursor: Option<String>,
    #[serde(default)]
    pub include_revoked: bool,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ListDelegatesResponse {
    pub items: Vec<DelegateView>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub next_cursor: Option<String>,
}
