//! C8: the `/api/realm/{realmId}/delegates` HTTP surface - create,
//! list, get, and cascading revoke over the delegate tree.

use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::Json;
use rand::RngCore;
use serde::Deserialize;
use tracing::info;

use casfa_delegation::{
    attach_scope_set_node, new_child_delegate, resolve_scope, scope_set_node_id, validate_child, NewChild,
    ParentCapabilities, RequestedCapabilities, ResolvedScope,
};
use casfa_store::{ChildPage, Delegate};
use casfa_token::{encode_access_token, encode_refresh_token, id_bytes_to_string, keyed_token_hash};

use crate::auth_context::{AccessAuth, AuthContext};
use crate::dto::{b64, DelegateView, ListDelegatesQuery, ListDelegatesResponse, TokenPairView};
use crate::error::ApiError;
use crate::scope_roots::scope_roots;
use crate::state::AppState;

/// Request body for `POST /api/realm/{realmId}/delegates`.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateDelegateRequest {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub can_upload: bool,
    #[serde(default)]
    pub can_manage_depot: bool,
    #[serde(default)]
    pub delegated_depots: Option<Vec<String>>,
    #[serde(default)]
    pub scope: Option<Vec<String>>,
    #[serde(default)]
    pub expires_in: Option<i64>,
    #[serde(default)]
    pub token_ttl_seconds: Option<i64>,
}

#[derive(Debug, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateDelegateResponse {
    pub delegate: DelegateView,
    #[serde(flatten)]
    pub tokens: TokenPairView,
}

fn require_access(auth: &AuthContext) -> Result<(&str, &str, bool, bool), ApiError> {
    match auth {
        AuthContext::Access { delegate_id, realm, can_upload, can_manage_depot, .. } => {
            Ok((delegate_id, realm, *can_upload, *can_manage_depot))
        }
        AuthContext::Jwt { .. } => Err(ApiError::new(
            StatusCode::FORBIDDEN,
            "ACCESS_TOKEN_REQUIRED",
            "this endpoint requires an access token, not a user JWT",
        )),
    }
}

fn random_delegate_id() -> (casfa_token::DelegateIdBytes, String) {
    let mut bytes = [0u8; 16];
    rand::thread_rng().fill_bytes(&mut bytes);
    let s = id_bytes_to_string(&bytes);
    (bytes, s)
}

/// `POST /api/realm/{realmId}/delegates`
pub async fn create_delegate(
    State(state): State<Arc<AppState>>,
    AccessAuth(auth): AccessAuth,
    Path(realm_id): Path<String>,
    Json(body): Json<CreateDelegateRequest>,
) -> Result<(StatusCode, Json<CreateDelegateResponse>), ApiError> {
    let (caller_id, caller_realm, _, _) = require_access(&auth)?;
    if realm_id != caller_realm {
        return Err(ApiError::new(StatusCode::FORBIDDEN, "REALM_MISMATCH", "realm in path does not match the caller's token"));
    }

    let parent = state
        .delegates
        .get(caller_id)
        .await?
        .ok_or_else(|| ApiError::new(StatusCode::NOT_FOUND, "DELEGATE_NOT_FOUND", "caller delegate no longer exists"))?;
    if parent.is_revoked {
        return Err(ApiError::new(StatusCode::FORBIDDEN, "DELEGATE_REVOKED", "caller delegate has been revoked"));
    }

    let now = state.now_ms();
    let requested_expires_at = body.expires_in.map(|secs| now + secs * 1000);
    validate_child(
        ParentCapabilities {
            can_upload: parent.can_upload,
            can_manage_depot: parent.can_manage_depot,
            depth: parent.depth,
            expires_at: parent.expires_at,
            delegated_depots: parent.delegated_depots.as_deref(),
        },
        RequestedCapabilities {
            can_upload: body.can_upload,
            can_manage_depot: body.can_manage_depot,
            expires_at: requested_expires_at,
            delegated_depots: body.delegated_depots.as_deref(),
        },
        state.config.token.max_delegate_depth,
    )?;

    let parent_roots = scope_roots(&parent, state.scope_sets.as_ref()).await?;
    let resolved = resolve_scope(&body.scope.unwrap_or_default(), &parent_roots, state.node_reader.as_ref()).await?;

    let (id_bytes, id_string) = random_delegate_id();
    let token_ttl_seconds = body.token_ttl_seconds.unwrap_or(state.config.token.at_ttl_seconds);
    let at_expires_at = now + token_ttl_seconds * 1000;
    let rt = encode_refresh_token(&id_bytes);
    let at = encode_access_token(&id_bytes, at_expires_at);
    let rt_hash = keyed_token_hash(&state.config.token.hash_key, &rt);
    let at_hash = keyed_token_hash(&state.config.token.hash_key, &at);

    let mut child = new_child_delegate(
        &parent,
        NewChild {
            delegate_id: id_string.clone(),
            can_upload: body.can_upload,
            can_manage_depot: body.can_manage_depot,
            delegated_depots: body.delegated_depots,
            resolved_scope: resolved.clone(),
            expires_at: requested_expires_at,
            current_rt_hash: rt_hash,
            current_at_hash: at_hash,
            at_expires_at,
        },
        now,
    );

    if let ResolvedScope::Multi(roots) = &resolved {
        let node_id = scope_set_node_id(roots);
        let node = state.scope_sets.create_or_increment(&node_id, roots, now).await?;
        attach_scope_set_node(&mut child, &node);
    }

    let created = state.delegates.create(&child).await?;
    if !created {
        return Err(ApiError::internal("delegate create", "delegate id collision"));
    }
    info!(delegate_id = %id_string, parent_id = %parent.delegate_id, "created child delegate");

    Ok((
        StatusCode::CREATED,
        Json(CreateDelegateResponse {
            delegate: DelegateView::from(&child),
            tokens: TokenPairView {
                access_token: b64(&at),
                refresh_token: b64(&rt),
                access_token_expires_at: at_expires_at,
            },
        }),
    ))
}

/// `GET /api/realm/{realmId}/delegates`
pub async fn list_delegates(
    State(state): State<Arc<AppState>>,
    AccessAuth(auth): AccessAuth,
    Path(realm_id): Path<String>,
    Query(query): Query<ListDelegatesQuery>,
) -> Result<Json<ListDelegatesResponse>, ApiError> {
    let (caller_id, caller_realm, _, _) = require_access(&auth)?;
    if realm_id != caller_realm {
        return Err(ApiError::new(StatusCode::FORBIDDEN, "REALM_MISMATCH", "realm in path does not match the caller's token"));
    }
    let limit = query.limit.unwrap_or(20).clamp(1, 200);
    let ChildPage { items, next_cursor } = state.delegates.list_children(caller_id, limit, query.cursor).await?;
    let items = items
        .into_iter()
        .filter(|d| query.include_revoked || !d.is_revoked)
        .map(|d| DelegateView::from(&d))
        .collect();
    Ok(Json(ListDelegatesResponse { items, next_cursor }))
}

/// True if `ancestor_id` appears anywhere in `target.chain` (spec §4.8
/// "the caller's delegate id must appear in the target's chain").
fn is_ancestor_of(ancestor_id: &str, target: &Delegate) -> bool {
    target.chain.iter().any(|id| id == ancestor_id)
}

async fn load_visible_delegate(state: &AppState, caller_id: &str, id: &str) -> Result<Delegate, ApiError> {
    let target = state
        .delegates
        .get(id)
        .await?
        .ok_or_else(not_found)?;
    if !is_ancestor_of(caller_id, &target) {
        // Deliberately identical to "not found" - spec §4.8, §7.
        return Err(not_found());
    }
    Ok(target)
}

fn not_found() -> ApiError {
    ApiError::new(StatusCode::NOT_FOUND, "DELEGATE_NOT_FOUND", "no such delegate")
}

/// `GET /api/realm/{realmId}/delegates/{id}`
pub async fn get_delegate(
    State(state): State<Arc<AppState>>,
    AccessAuth(auth): AccessAuth,
    Path((realm_id, id)): Path<(String, String)>,
) -> Result<Json<DelegateView>, ApiError> {
    let (caller_id, caller_realm, _, _) = require_access(&auth)?;
    if realm_id != caller_realm {
        return Err(ApiError::new(StatusCode::FORBIDDEN, "REALM_MISMATCH", "realm in path does not match the caller's token"));
    }
    let target = load_visible_delegate(&state, caller_id, &id).await?;
    Ok(Json(DelegateView::from(&target)))
}

#[derive(Debug, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RevokeResponse {
    pub delegate_id: String,
    pub revoked_at: i64,
}

/// `POST /api/realm/{realmId}/delegates/{id}/revoke`
pub async fn revoke_delegate(
    State(state): State<Arc<AppState>>,
    AccessAuth(auth): AccessAuth,
    Path((realm_id, id)): Path<(String, String)>,
) -> Result<Json<RevokeResponse>, ApiError> {
    let (caller_id, caller_realm, _, _) = require_access(&auth)?;
    if realm_id != caller_realm {
        return Err(ApiError::new(StatusCode::FORBIDDEN, "REALM_MISMATCH", "realm in path does not match the caller's token"));
    }
    let target = load_visible_delegate(&state, caller_id, &id).await?;
    if target.is_revoked {
        return Err(ApiError::new(StatusCode::CONFLICT, "DELEGATE_ALREADY_REVOKED", "delegate is already revoked"));
    }

    let now = state.now_ms();
    let revoked = state.delegates.revoke(&id, caller_id, now).await?;
    if !revoked {
        return Err(ApiError::new(StatusCode::CONFLICT, "DELEGATE_ALREADY_REVOKED", "a concurrent revoke won the race"));
    }
    info!(delegate_id = %id, by = %caller_id, "revoked delegate");

    cascade_revoke(state.delegates.as_ref(), &id, caller_id, now).await?;

    Ok(Json(RevokeResponse { delegate_id: id, revoked_at: now }))
}

/// Best-effort cascade: revoke every non-revoked descendant of
/// `root_id`, walking the tree breadth-first via an explicit work
/// queue (no recursion needed across `.await` points). Revoking an
/// already-revoked descendant is a no-op thanks to the store's CAS, so
/// a partially-applied cascade (e.g. after a transient backend error
/// on one branch) is safe to retry from the top.
async fn cascade_revoke(
    delegates: &dyn casfa_store::DelegateStore,
    root_id: &str,
    by: &str,
    now_ms: i64,
) -> Result<(), ApiError> {
    let mut pending = vec![root_id.to_string()];
    while let Some(parent_id) = pending.pop() {
        let mut cursor = None;
        loop {
            let page = delegates.list_children(&parent_id, 100, cursor).await?;
            for child in &page.items {
                if !child.is_revoked {
                    let _ = delegates.revoke(&child.delegate_id, by, now_ms).await?;
                }
                pending.push(child.delegate_id.clone());
            }
            cursor = page.next_cursor;
            if cursor.is_none() {
                break;
            }
        }
    }
    Ok(())
}
