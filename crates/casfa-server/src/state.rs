//! Shared application state, wired once at startup and handed to every
//! handler via axum's `State` extractor.

use std::sync::Arc;

use casfa_delegation::NodeReader;
use casfa_store::{AuthCodeStore, DelegateStore, ScopeSetStore};

use crate::config::CasfaConfig;
use crate::jwt::JwtValidator;
use crate::mcp::ToolRegistry;

/// Everything a handler needs beyond the request itself.
pub struct AppState {
    /// C2: the delegate tree.
    pub delegates: Arc<dyn DelegateStore>,
    /// C3: one-shot OAuth authorization codes.
    pub auth_codes: Arc<dyn AuthCodeStore>,
    /// Multi-root scope-set deduplication.
    pub scope_sets: Arc<dyn ScopeSetStore>,
    /// C4's read-only view into the CAS node tree.
    pub node_reader: Arc<dyn NodeReader>,
    /// Validates user JWTs for the root/OAuth-consent surface.
    pub jwt: JwtValidator,
    /// Effective configuration.
    pub config: CasfaConfig,
    /// C11's static tool registry.
    pub tools: ToolRegistry,
}

impl AppState {
    /// Current time, epoch-ms. A thin wrapper so handlers never reach
    /// for `chrono::Utc::now()` directly and every timestamp in the
    /// service is easy to grep for.
    pub fn now_ms(&self) -> i64 {
        chrono::Utc::now().timestamp_millis()
    }
}
