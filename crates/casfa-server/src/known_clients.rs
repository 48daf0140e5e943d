//! Static OAuth client registry (spec §4.10). No dynamic client
//! registration is supported - clients are provisioned out of band and
//! loaded once at startup into a `std::sync::OnceLock`, mirroring the
//! teacher's static registries.

use std::sync::OnceLock;

use serde::Deserialize;

/// A single known OAuth client.
#[derive(Debug, Clone, Deserialize)]
pub struct KnownClient {
    /// The client identifier presented in `client_id`.
    pub client_id: String,
    /// Human-readable name, shown on the consent screen.
    pub name: String,
    /// Redirect URIs this client may request, each either an exact URI
    /// or a `"<scheme>://<host>:*"` port-wildcard pattern.
    pub allowed_redirect_patterns: Vec<String>,
    /// Grant types this client may use.
    pub grant_types: Vec<String>,
    /// Always `"none"` - CASFA does not hand out client secrets.
    #[serde(default = "default_auth_method")]
    pub token_endpoint_auth_method: String,
}

fn default_auth_method() -> String {
    "none".to_string()
}

impl KnownClient {
    /// True if `redirect_uri` is allowed by any of this client's
    /// patterns.
    pub fn allows_redirect(&self, redirect_uri: &str) -> bool {
        self.allowed_redirect_patterns
            .iter()
            .any(|pattern| redirect_matches(pattern, redirect_uri))
    }
}

/// `true` if `candidate` matches `pattern`.
///
/// A pattern ending in `:*` matches any URI with the same scheme and
/// host and a non-empty port, regardless of path - left loose per
/// design note (see DESIGN.md). A pattern without a `:*` suffix must
/// match `candidate` exactly.
pub fn redirect_matches(pattern: &str, candidate: &str) -> bool {
    match pattern.strip_suffix(":*") {
        Some(scheme_host_prefix) => match scheme_host(candidate) {
            Some((scheme_host, has_port)) => has_port && scheme_host == scheme_host_prefix,
            None => false,
        },
        None => pattern == candidate,
    }
}

fn scheme_host(uri: &str) -> Option<(String, bool)> {
    let scheme_end = uri.find("://")?;
    let scheme = &uri[..scheme_end + 3];
    let after = &uri[scheme_end + 3..];
    let authority_end = after.find('/').unwrap_or(after.len());
    let authority = &after[..authority_end];
    match authority.rsplit_once(':') {
        Some((host, port)) if !port.is_empty() && port.chars().all(|c| c.is_ascii_digit()) => {
            Some((format!("{scheme}{host}"), true))
        }
        _ => Some((format!("{scheme}{authority}"), false)),
    }
}

/// Returns the built-in development client used when no
/// `known_clients_path` is configured.
fn dev_client() -> Vec<KnownClient> {
    vec![KnownClient {
        client_id: "vscode-casfa-mcp".to_string(),
        name: "CASFA MCP (development)".to_string(),
        allowed_redirect_patterns: vec!["http://127.0.0.1:*".to_string(), "http://localhost:*".to_string()],
        grant_types: vec!["authorization_code".to_string(), "refresh_token".to_string()],
        token_endpoint_auth_method: default_auth_method(),
    }]
}

static REGISTRY: OnceLock<Vec<KnownClient>> = OnceLock::new();

/// Load the registry from `path` (a JSON array of [`KnownClient`]), or
/// fall back to [`dev_client`] if `path` is `None` or unreadable.
///
/// Must be called exactly once, before the first [`lookup`] - typically
/// from `main` during startup.
pub fn init(path: Option<&str>) {
    let clients = path
        .and_then(|p| std::fs::read_to_string(p).ok())
        .and_then(|body| serde_json::from_str::<Vec<KnownClient>>(&body).ok())
        .unwrap_or_else(dev_client);
    let _ = REGISTRY.set(clients);
}

/// Look up a known client by id. Returns `None` if [`init`] was never
/// called or the id is unregistered.
pub fn lookup(client_id: &str) -> Option<KnownClient> {
    REGISTRY
        .get()
        .into_iter()
        .flatten()
        .find(|c| c.client_id == client_id)
        .cloned()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wildcard_pattern_matches_any_port_same_scheme_host() {
        assert!(redirect_matches(
            "http://127.0.0.1:*",
            "http://127.0.0.1:54321/callback"
        ));
        assert!(!redirect_matches("http://127.0.0.1:*", "https://127.0.0.1:54321/callback"));
        assert!(!redirect_matches("http://127.0.0.1:*", "http://evil.example/callback"));
    }

    #[test]
    fn wildcard_pattern_requires_a_port() {
        assert!(!redirect_matches("http://127.0.0.1:*", "http://127.0.0.1/callback"));
    }

    #[test]
    fn exact_pattern_requires_exact_match() {
        assert!(redirect_matches(
            "https://app.example.com/cb",
            "https://app.example.com/cb"
        ));
        assert!(!redirect_matches(
            "https://app.example.com/cb",
            "https://app.example.com/cb2"
        ));
    }
}
