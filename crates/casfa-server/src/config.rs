//! Service configuration: a struct-plus-`Default`-plus-`validate`-plus-
//! `from_env` shape, matching the teacher's `AuthConfig`.

use std::env;

/// Top-level configuration for the CASFA delegation/token/OAuth
/// service.
#[derive(Debug, Clone)]
pub struct CasfaConfig {
    /// HTTP listen address and CORS policy.
    pub server: ServerConfig,
    /// Token lifetimes and depth policy.
    pub token: TokenConfig,
    /// OAuth issuer and known-client registry location.
    pub oauth: OAuthConfig,
    /// Root/user JWT validation settings.
    pub jwt: JwtConfig,
    /// Backing store selection.
    pub storage: StorageConfig,
    /// Optional delegate-lookup cache (spec §5).
    pub cache: CacheConfig,
}

/// HTTP server bind address and CORS policy.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Interface to bind to.
    pub host: String,
    /// Port to bind to.
    pub port: u16,
    /// Origins allowed by the CORS layer; empty means "allow any".
    pub cors_allowed_origins: Vec<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8089,
            cors_allowed_origins: Vec::new(),
        }
    }
}

/// Token lifetime and delegation-depth policy.
#[derive(Debug, Clone)]
pub struct TokenConfig {
    /// Access-token lifetime, in seconds.
    pub at_ttl_seconds: i64,
    /// Authorization-code lifetime, in milliseconds.
    pub auth_code_ttl_ms: i64,
    /// Optional hard cap on chain depth; `None` means unbounded.
    pub max_delegate_depth: Option<u32>,
    /// Key for the BLAKE3-keyed token hash (spec §4.1 `hash`).
    /// Distinct from `jwt.secret` - this key never leaves the process
    /// and is not a JWT signing key.
    pub hash_key: [u8; 32],
}

impl Default for TokenConfig {
    fn default() -> Self {
        Self {
            at_ttl_seconds: 3600,
            auth_code_ttl_ms: 600_000,
            max_delegate_depth: None,
            hash_key: [0u8; 32],
        }
    }
}

/// OAuth issuer identity and known-client registry source.
#[derive(Debug, Clone)]
pub struct OAuthConfig {
    /// Base URL this service is reachable at; used in the RFC 8414
    /// metadata document and as the issuer claim's audience.
    pub issuer: String,
    /// Path to a TOML/JSON file describing known clients; `None` falls
    /// back to the built-in development client.
    pub known_clients_path: Option<String>,
}

impl Default for OAuthConfig {
    fn default() -> Self {
        Self {
            issuer: "http://localhost:8089".to_string(),
            known_clients_path: None,
        }
    }
}

/// HS256 JWT validation settings for root/user-authenticated routes.
#[derive(Debug, Clone)]
pub struct JwtConfig {
    /// Shared secret; must be at least 32 bytes.
    pub secret: String,
    /// Expected `iss` claim.
    pub issuer: String,
    /// Expected `aud` claim.
    pub audience: String,
}

impl Default for JwtConfig {
    fn default() -> Self {
        Self {
            secret: String::new(),
            issuer: "casfa".to_string(),
            audience: "casfa-api".to_string(),
        }
    }
}

/// Selects which [`casfa_store`] backend the service wires up.
#[derive(Debug, Clone)]
pub enum StorageBackend {
    /// `RwLock<HashMap>`-backed, process-local, no durability.
    Memory,
    /// `sqlx`-backed SQLite database at the given URL.
    Sqlite { database_url: String },
}

/// Wraps [`StorageBackend`] so `CasfaConfig` has one field per concern.
#[derive(Debug, Clone)]
pub struct StorageConfig {
    /// The selected backend.
    pub backend: StorageBackend,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            backend: StorageBackend::Memory,
        }
    }
}

impl Default for CasfaConfig {
    fn default() -> Self {
        Self {
            server: ServerConfig::default(),
            token: TokenConfig::default(),
            oauth: OAuthConfig::default(),
            jwt: JwtConfig::default(),
            storage: StorageConfig::default(),
            cache: CacheConfig::default(),
        }
    }
}

/// Delegate-lookup cache configuration (spec §5, §6.5 `REDIS_URL`).
///
/// The spec describes this cache against a Redis-shaped backend, but no
/// `redis` client is anywhere in this workspace's dependency tree; the
/// service instead runs a process-local TTL cache
/// ([`casfa_store::CachingDelegateStore`]) whenever `REDIS_URL` is set,
/// and a bare pass-through otherwise, which satisfies the spec's "when
/// absent, the cache is a pass-through" requirement exactly.
#[derive(Debug, Clone)]
pub struct CacheConfig {
    /// Presence enables the cache; the URL itself is only recorded for
    /// parity with the spec's config surface; connectivity uses the
    /// in-process cache, not an actual Redis connection.
    pub redis_url: Option<String>,
    /// How long a positive lookup stays cached.
    pub ttl_seconds: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self { redis_url: None, ttl_seconds: 30 }
    }
}

impl CasfaConfig {
    /// Validate the combination of fields that can't be checked at
    /// construction time (secret length, reachable port, db url
    /// requirement).
    pub fn validate(&self) -> Result<(), String> {
        if self.jwt.secret.len() < 32 {
            return Err("jwt.secret must be at least 32 bytes".to_string());
        }
        if self.server.port == 0 {
            return Err("server.port must be nonzero".to_string());
        }
        if let StorageBackend::Sqlite { database_url } = &self.storage.backend {
            if database_url.is_empty() {
                return Err("storage.backend Sqlite requires a non-empty database_url".to_string());
            }
        }
        if !self.oauth.issuer.starts_with("http://") && !self.oauth.issuer.starts_with("https://") {
            return Err("oauth.issuer must be an http(s) URL".to_string());
        }
        Ok(())
    }

    /// Build configuration from environment variables, falling back to
    /// [`Default`] values for anything unset.
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Ok(host) = env::var("CASFA_HOST") {
            config.server.host = host;
        }
        if let Ok(port) = env::var("CASFA_PORT") {
            if let Ok(port) = port.parse() {
                config.server.port = port;
            }
        }
        if let Ok(origins) = env::var("CASFA_CORS_ALLOWED_ORIGINS") {
            config.server.cors_allowed_origins =
                origins.split(',').map(str::trim).map(str::to_string).collect();
        }

        if let Ok(ttl) = env::var("CASFA_AT_TTL_SECONDS") {
            if let Ok(ttl) = ttl.parse() {
                config.token.at_ttl_seconds = ttl;
            }
        }
        if let Ok(ttl) = env::var("CASFA_AUTH_CODE_TTL_MS") {
            if let Ok(ttl) = ttl.parse() {
                config.token.auth_code_ttl_ms = ttl;
            }
        }
        if let Ok(depth) = env::var("CASFA_MAX_DELEGATE_DEPTH") {
            config.token.max_delegate_depth = depth.parse().ok();
        }
        if let Ok(hex_key) = env::var("CASFA_TOKEN_HASH_KEY") {
            if let Some(key) = parse_hex_key(&hex_key) {
                config.token.hash_key = key;
            }
        }

        if let Ok(issuer) = env::var("CASFA_OAUTH_ISSUER") {
            config.oauth.issuer = issuer;
        }
        if let Ok(path) = env::var("CASFA_KNOWN_CLIENTS") {
            config.oauth.known_clients_path = Some(path);
        }

        if let Ok(secret) = env::var("CASFA_JWT_SECRET") {
            config.jwt.secret = secret;
        }
        if let Ok(issuer) = env::var("CASFA_JWT_ISSUER") {
            config.jwt.issuer = issuer;
        }
        if let Ok(audience) = env::var("CASFA_JWT_AUDIENCE") {
            config.jwt.audience = audience;
        }

        if let Ok(database_url) = env::var("CASFA_DATABASE_URL") {
            config.storage.backend = StorageBackend::Sqlite { database_url };
        }

        if let Ok(redis_url) = env::var("REDIS_URL") {
            config.cache.redis_url = Some(redis_url);
        }
        if let Ok(ttl) = env::var("CASFA_CACHE_TTL_SECONDS") {
            if let Ok(ttl) = ttl.parse() {
                config.cache.ttl_seconds = ttl;
            }
        }

        config
    }
}

fn parse_hex_key(hex: &str) -> Option<[u8; 32]> {
    if hex.len() != 64 {
        return None;
    }
    let mut key = [0u8; 32];
    for (i, byte) in key.iter_mut().enumerate() {
        *byte = u8::from_str_radix(&hex[i * 2..i * 2 + 2], 16).ok()?;
    }
    Some(key)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_fails_validation_on_empty_jwt_secret() {
        let config = CasfaConfig::default();
        assert!(config.validate().is_err());
    }

    #[test]
    fn config_with_long_secret_validates() {
        let mut config = CasfaConfig::default();
        config.jwt.secret = "x".repeat(32);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn sqlite_backend_requires_nonempty_url() {
        let mut config = CasfaConfig::default();
        config.jwt.secret = "x".repeat(32);
        config.storage.backend = StorageBackend::Sqlite { database_url: String::new() };
        assert!(config.validate().is_err());
    }

    #[test]
    fn cache_is_pass_through_by_default() {
        let config = CasfaConfig::default();
        assert!(config.cache.redis_url.is_none());
    }
}
