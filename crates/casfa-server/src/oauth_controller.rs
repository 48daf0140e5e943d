//! C10: RFC 8414 metadata, the authorize/approve consent dance, and
//! the `/api/auth/token` endpoint (authorization-code+PKCE and
//! refresh-token grants).

use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::{Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use base64::Engine;
use rand::RngCore;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::{error, info, warn};

use casfa_delegation::{new_child_delegate, new_root_delegate, NewChild, ResolvedScope};
use casfa_store::{AuthCode, Delegate, GrantedPermissions, StoreError};
use casfa_token::{encode_access_token, encode_refresh_token, id_bytes_to_string};

use crate::auth_context::{AuthContext, JwtAuth};
use crate::dto::b64;
use crate::error::RefreshError;
use crate::known_clients::{self, KnownClient};
use crate::refresh;
use crate::state::AppState;

const SUPPORTED_SCOPES: &[&str] = &["cas:read", "cas:write", "depot:manage"];

/// `{error, error_description}` body for every OAuth failure mode in
/// spec §7's OAuth row.
#[derive(Debug)]
pub struct OAuthError {
    status: StatusCode,
    code: &'static str,
    description: String,
}

impl OAuthError {
    fn new(status: StatusCode, code: &'static str, description: impl Into<String>) -> Self {
        Self { status, code, description: description.into() }
    }
    fn invalid_request(desc: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, "invalid_request", desc)
    }
    fn invalid_client(desc: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, "invalid_client", desc)
    }
    fn invalid_grant(desc: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, "invalid_grant", desc)
    }
    fn invalid_scope(desc: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, "invalid_scope", desc)
    }
    fn unsupported_response_type(desc: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, "unsupported_response_type", desc)
    }
    fn unsupported_grant_type(desc: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, "unsupported_grant_type", desc)
    }
    fn internal(context: &str, err: impl std::fmt::Display) -> Self {
        error!(context, %err, "internal error");
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, "server_error", "internal error")
    }
}

impl From<StoreError> for OAuthError {
    fn from(err: StoreError) -> Self {
        OAuthError::internal("store", err)
    }
}

#[derive(Serialize)]
struct OAuthErrorBody<'a> {
    error: &'a str,
    error_description: &'a str,
}

impl IntoResponse for OAuthError {
    fn into_response(self) -> Response {
        let body = OAuthErrorBody { error: self.code, error_description: &self.description };
        (self.status, Json(body)).into_response()
    }
}

/// `GET /.well-known/oauth-authorization-server/api/auth`
pub async fn metadata(State(state): State<Arc<AppState>>) -> Json<serde_json::Value> {
    let issuer = &state.config.oauth.issuer;
    Json(serde_json::json!({
        "issuer": issuer,
        "authorization_endpoint": format!("{issuer}/api/auth/authorize"),
        "token_endpoint": format!("{issuer}/api/auth/token"),
        "registration_endpoint": format!("{issuer}/api/auth/register"),
        "token_endpoint_auth_methods_supported": ["none"],
        "response_types_supported": ["code"],
        "grant_types_supported": ["authorization_code", "refresh_token"],
        "code_challenge_methods_supported": ["S256"],
        "scopes_supported": SUPPORTED_SCOPES,
    }))
}

#[derive(Debug, Deserialize)]
pub struct AuthorizeParams {
    pub response_type: String,
    pub client_id: String,
    pub redirect_uri: String,
    #[serde(default)]
    pub scope: String,
    pub state: String,
    pub code_challenge: String,
    pub code_challenge_method: String,
    #[serde(default)]
    pub expires_in: Option<i64>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConsentClient {
    pub client_id: String,
    pub name: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConsentPayload {
    pub client: ConsentClient,
    pub scopes: Vec<String>,
    pub state: String,
    pub redirect_uri: String,
    pub code_challenge: String,
    pub code_challenge_method: String,
}

fn parse_scopes(scope: &str) -> Vec<String> {
    scope.split_whitespace().map(str::to_string).collect()
}

fn validate_known_client_and_redirect(client_id: &str, redirect_uri: &str) -> Result<KnownClient, OAuthError> {
    let client = known_clients::lookup(client_id).ok_or_else(|| OAuthError::invalid_client("unknown client_id"))?;
    if !client.allows_redirect(redirect_uri) {
        return Err(OAuthError::invalid_request("redirect_uri is not registered for this client"));
    }
    Ok(client)
}

fn validate_scope_subset(scopes: &[String]) -> Result<(), OAuthError> {
    if scopes.iter().any(|s| !SUPPORTED_SCOPES.contains(&s.as_str())) {
        return Err(OAuthError::invalid_scope("requested scope includes an unsupported value"));
    }
    Ok(())
}

/// `GET /api/auth/authorize`
pub async fn authorize(
    JwtAuth(_auth): JwtAuth,
    Query(params): Query<AuthorizeParams>,
) -> Result<Json<ConsentPayload>, OAuthError> {
    if params.response_type != "code" {
        return Err(OAuthError::unsupported_response_type("only response_type=code is supported"));
    }
    let client = validate_known_client_and_redirect(&params.client_id, &params.redirect_uri)?;
    let scopes = parse_scopes(&params.scope);
    validate_scope_subset(&scopes)?;
    if params.state.is_empty() {
        return Err(OAuthError::invalid_request("state is required"));
    }
    if params.code_challenge.is_empty() {
        return Err(OAuthError::invalid_request("code_challenge is required"));
    }
    if params.code_challenge_method != "S256" {
        return Err(OAuthError::invalid_request("code_challenge_method must be S256"));
    }

    Ok(Json(ConsentPayload {
        client: ConsentClient { client_id: client.client_id, name: client.name },
        scopes,
        state: params.state,
        redirect_uri: params.redirect_uri,
        code_challenge: params.code_challenge,
        code_challenge_method: params.code_challenge_method,
    }))
}

#[derive(Debug, Deserialize)]
pub struct ApproveRequest {
    pub client_id: String,
    pub redirect_uri: String,
    /// The scope the client originally requested at `/authorize`.
    #[serde(default)]
    pub requested_scope: String,
    /// The scopes the user actually approved; must be a subset of
    /// `requested_scope` (spec §4.10 "the user may only subtract").
    #[serde(default)]
    pub approved_scope: String,
    pub state: String,
    pub code_challenge: String,
    pub code_challenge_method: String,
    #[serde(default)]
    pub expires_in: Option<i64>,
}

#[derive(Debug, Serialize)]
pub struct ApproveResponse {
    pub redirect_uri: String,
}

fn append_query(redirect_uri: &str, pairs: &[(&str, &str)]) -> String {
    let separator = if redirect_uri.contains('?') { '&' } else { '?' };
    let query = pairs
        .iter()
        .map(|(k, v)| format!("{k}={}", urlencoding_light(v)))
        .collect::<Vec<_>>()
        .join("&");
    format!("{redirect_uri}{separator}{query}")
}

/// Minimal percent-encoding for the handful of characters that show up
/// in authorization codes and opaque state values.
fn urlencoding_light(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for b in value.bytes() {
        match b {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'_' | b'.' | b'~' => out.push(b as char),
            _ => out.push_str(&format!("%{:02X}", b)),
        }
    }
    out
}

/// `POST /api/auth/approve`
pub async fn approve(
    State(state): State<Arc<AppState>>,
    JwtAuth(auth): JwtAuth,
    Json(body): Json<ApproveRequest>,
) -> Result<Json<ApproveResponse>, OAuthError> {
    let AuthContext::Jwt { user_id, realm, .. } = auth else {
        return Err(OAuthError::invalid_request("a user JWT is required"));
    };
    validate_known_client_and_redirect(&body.client_id, &body.redirect_uri)?;

    let requested = parse_scopes(&body.requested_scope);
    let approved = parse_scopes(&body.approved_scope);
    validate_scope_subset(&requested)?;
    validate_scope_subset(&approved)?;
    if !approved.iter().all(|s| requested.contains(s)) {
        return Err(OAuthError::invalid_scope("approved scope is not a subset of the requested scope"));
    }
    if body.code_challenge_method != "S256" {
        return Err(OAuthError::invalid_request("code_challenge_method must be S256"));
    }

    let can_upload = approved.iter().any(|s| s == "cas:write");
    let can_manage_depot = approved.iter().any(|s| s == "depot:manage");
    let granted_permissions = GrantedPermissions {
        can_upload,
        can_manage_depot,
        delegated_depots: None,
        scope_node_hash: None,
        expires_in: body.expires_in,
    };

    let mut code_bytes = [0u8; 18];
    rand::thread_rng().fill_bytes(&mut code_bytes);
    let code = base64::engine::general_purpose::URL_SAFE_NO_PAD.encode(code_bytes);

    let now = state.now_ms();
    let record = AuthCode {
        code: code.clone(),
        client_id: body.client_id,
        redirect_uri: body.redirect_uri.clone(),
        user_id,
        realm,
        scopes: approved,
        code_challenge: body.code_challenge,
        code_challenge_method: body.code_challenge_method,
        granted_permissions,
        created_at: now,
        expires_at: now + state.config.token.auth_code_ttl_ms,
        used: false,
    };
    state.auth_codes.create(&record).await?;
    info!(client_id = %record.client_id, "issued authorization code");

    Ok(Json(ApproveResponse {
        redirect_uri: append_query(&body.redirect_uri, &[("code", &code), ("state", &body.state)]),
    }))
}

#[derive(Debug, Deserialize)]
pub struct TokenRequest {
    pub grant_type: String,
    #[serde(default)]
    pub code: Option<String>,
    #[serde(default)]
    pub redirect_uri: Option<String>,
    #[serde(default)]
    pub client_id: Option<String>,
    #[serde(default)]
    pub code_verifier: Option<String>,
    #[serde(default)]
    pub refresh_token: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct TokenResponse {
    pub access_token: String,
    pub token_type: &'static str,
    pub expires_in: i64,
    pub refresh_token: String,
    pub scope: String,
    pub delegate_id: String,
}

fn capabilities_to_scope(can_upload: bool, can_manage_depot: bool) -> String {
    let mut parts = vec!["cas:read"];
    if can_upload {
        parts.push("cas:write");
    }
    if can_manage_depot {
        parts.push("depot:manage");
    }
    parts.join(" ")
}

fn pkce_matches(verifier: &str, challenge: &str) -> bool {
    let digest = Sha256::digest(verifier.as_bytes());
    let computed = base64::engine::general_purpose::URL_SAFE_NO_PAD.encode(digest);
    computed == challenge
}

/// `POST /api/auth/token`. Accepts both form-urlencoded and JSON
/// bodies (spec §4.10 content negotiation).
pub async fn token(State(state): State<Arc<AppState>>, headers: HeaderMap, body: Bytes) -> Result<Json<TokenResponse>, OAuthError> {
    let content_type = headers
        .get(axum::http::header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("");

    let req: TokenRequest = if content_type.contains("application/json") {
        serde_json::from_slice(&body).map_err(|e| OAuthError::invalid_request(format!("malformed JSON body: {e}")))?
    } else {
        serde_urlencoded::from_bytes(&body).map_err(|e| OAuthError::invalid_request(format!("malformed form body: {e}")))?
    };

    match req.grant_type.as_str() {
        "authorization_code" => authorization_code_grant(&state, req).await,
        "refresh_token" => refresh_token_grant(&state, req).await,
        other => Err(OAuthError::unsupported_grant_type(format!("unsupported grant_type: {other}"))),
    }
}

async fn authorization_code_grant(state: &AppState, req: TokenRequest) -> Result<Json<TokenResponse>, OAuthError> {
    let code = req.code.ok_or_else(|| OAuthError::invalid_request("code is required"))?;
    let redirect_uri = req.redirect_uri.ok_or_else(|| OAuthError::invalid_request("redirect_uri is required"))?;
    let client_id = req.client_id.ok_or_else(|| OAuthError::invalid_request("client_id is required"))?;
    let code_verifier = req.code_verifier.ok_or_else(|| OAuthError::invalid_request("code_verifier is required"))?;

    let now = state.now_ms();
    let record = state
        .auth_codes
        .consume(&code, now)
        .await?
        .ok_or_else(|| OAuthError::invalid_grant("code is unknown, already used, or expired"))?;

    if record.redirect_uri != redirect_uri || record.client_id != client_id {
        warn!(client_id = %client_id, "token exchange redirect/client mismatch");
        return Err(OAuthError::invalid_grant("redirect_uri or client_id does not match the authorization request"));
    }
    if !pkce_matches(&code_verifier, &record.code_challenge) {
        warn!(client_id = %client_id, "PKCE verification failed");
        return Err(OAuthError::invalid_grant("code_verifier does not match the code_challenge"));
    }

    let mut proposed_root_id = [0u8; 16];
    rand::thread_rng().fill_bytes(&mut proposed_root_id);
    let proposed_root = new_root_delegate(&record.realm, id_bytes_to_string(&proposed_root_id), now);
    let (root, _) = state.delegates.get_or_create_root(&record.realm, &proposed_root).await?;

    let mut child_id = [0u8; 16];
    rand::thread_rng().fill_bytes(&mut child_id);
    let at_ttl_seconds = state.config.token.at_ttl_seconds;
    let at_expires_at = now + at_ttl_seconds * 1000;
    let rt = encode_refresh_token(&child_id);
    let at = encode_access_token(&child_id, at_expires_at);
    let rt_hash = casfa_token::keyed_token_hash(&state.config.token.hash_key, &rt);
    let at_hash = casfa_token::keyed_token_hash(&state.config.token.hash_key, &at);

    let expires_at = record.granted_permissions.expires_in.map(|secs| now + secs * 1000);
    let resolved_scope = match &record.granted_permissions.scope_node_hash {
        Some(hash) => ResolvedScope::Single(hash.clone()),
        None => ResolvedScope::None,
    };

    let child = new_child_delegate(
        &root,
        NewChild {
            delegate_id: id_bytes_to_string(&child_id),
            can_upload: record.granted_permissions.can_upload,
            can_manage_depot: record.granted_permissions.can_manage_depot,
            delegated_depots: record.granted_permissions.delegated_depots.clone(),
            resolved_scope,
            expires_at,
            current_rt_hash: rt_hash,
            current_at_hash: at_hash,
            at_expires_at,
        },
        now,
    );

    if !state.delegates.create(&child).await? {
        return Err(OAuthError::internal("oauth-create-child", "delegate id collision"));
    }
    info!(client_id = %record.client_id, delegate_id = %child.delegate_id, "minted OAuth delegate \"MCP: {}\"", record.client_id);

    Ok(Json(TokenResponse {
        access_token: b64(&at),
        token_type: "Bearer",
        expires_in: at_ttl_seconds,
        refresh_token: b64(&rt),
        scope: capabilities_to_scope(child.can_upload, child.can_manage_depot),
        delegate_id: child.delegate_id,
    }))
}

async fn refresh_token_grant(state: &AppState, req: TokenRequest) -> Result<Json<TokenResponse>, OAuthError> {
    let raw = req.refresh_token.ok_or_else(|| OAuthError::invalid_request("refresh_token is required"))?;
    let bytes = base64::engine::general_purpose::STANDARD
        .decode(&raw)
        .or_else(|_| base64::engine::general_purpose::URL_SAFE_NO_PAD.decode(&raw))
        .map_err(|_| OAuthError::invalid_grant("refresh_token is not valid base64"))?;

    let now = state.now_ms();
    let out = refresh::refresh(state.delegates.as_ref(), &state.config.token.hash_key, &bytes, now, state.config.token.at_ttl_seconds)
        .await
        .map_err(|err: RefreshError| match err {
            RefreshError::Store(e) => OAuthError::internal("oauth-refresh", e),
            _ => OAuthError::invalid_grant("refresh token is invalid, stale, or belongs to a revoked delegate"),
        })?;

    let delegate: Delegate = state
        .delegates
        .get(&out.delegate_id)
        .await?
        .ok_or_else(|| OAuthError::invalid_grant("delegate vanished during refresh"))?;

    Ok(Json(TokenResponse {
        access_token: b64(&out.access_token),
        token_type: "Bearer",
        expires_in: state.config.token.at_ttl_seconds,
        refresh_token: b64(&out.refresh_token),
        scope: capabilities_to_scope(delegate.can_upload, delegate.can_manage_depot),
        delegate_id: out.delegate_id,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pkce_verifier_must_match_challenge() {
        let verifier = "dBjftJeZ4CVP-mB92K27uhbUJU1p1r_wW1gFWFOEjXk";
        let digest = Sha256::digest(verifier.as_bytes());
        let challenge = base64::engine::general_purpose::URL_SAFE_NO_PAD.encode(digest);
        assert!(pkce_matches(verifier, &challenge));
        assert!(!pkce_matches("wrong-verifier", &challenge));
    }

    #[test]
    fn scope_reflects_issued_capabilities() {
        assert_eq!(capabilities_to_scope(false, false), "cas:read");
        assert_eq!(capabilities_to_scope(true, false), "cas:read cas:write");
        assert_eq!(capabilities_to_scope(true, true), "cas:read cas:write depot:manage");
    }

    #[test]
    fn append_query_respects_existing_query_string() {
        assert_eq!(
            append_query("http://localhost/cb", &[("code", "abc"), ("state", "xyz")]),
            "http://localhost/cb?code=abc&state=xyz"
        );
        assert_eq!(
            append_query("http://localhost/cb?foo=1", &[("code", "abc")]),
            "http://localhost/cb?foo=1&code=abc"
        );
    }
}
