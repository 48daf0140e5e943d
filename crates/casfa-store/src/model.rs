//! Persisted record shapes for delegates, scope-set nodes, and
//! authorization codes.

use serde::{Deserialize, Serialize};

/// Sentinel `parentId` used for root delegates, both as a literal value
/// on the record and as the key under the parent-id secondary index.
pub const ROOT_SENTINEL: &str = "ROOT";

/// A capability-holding node in a realm's delegation tree.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Delegate {
    /// `dlt_`-prefixed Crockford-Base32 identity; primary key.
    pub delegate_id: String,
    /// Opaque owning-user identifier.
    pub realm: String,
    /// Parent delegate id, or [`ROOT_SENTINEL`] for the root.
    pub parent_id: String,
    /// Ordered ancestor chain from root to self, self included.
    pub chain: Vec<String>,
    /// `chain.len() - 1`; zero for the root.
    pub depth: u32,
    /// Whether this delegate may write content.
    pub can_upload: bool,
    /// Whether this delegate may manage depots.
    pub can_manage_depot: bool,
    /// Depot ids this delegate is restricted to, if constrained.
    pub delegated_depots: Option<Vec<String>>,
    /// Single CAS scope root, mutually exclusive with `scope_set_node_id`.
    pub scope_node_hash: Option<String>,
    /// Reference into a multi-root [`ScopeSetNode`].
    pub scope_set_node_id: Option<String>,
    /// Absolute expiry, epoch-ms; `None` means never.
    pub expires_at: Option<i64>,
    /// Monotonic false-to-true revocation flag.
    pub is_revoked: bool,
    /// When revoked, epoch-ms.
    pub revoked_at: Option<i64>,
    /// The delegate id that performed the revoke.
    pub revoked_by: Option<String>,
    /// Creation time, epoch-ms.
    pub created_at: i64,
    /// Hex hash of the live refresh token; empty for the root.
    pub current_rt_hash: String,
    /// Hex hash of the live access token; empty for the root.
    pub current_at_hash: String,
    /// Access-token expiry, epoch-ms; zero for the root.
    pub at_expires_at: i64,
}

impl Delegate {
    /// True if this is a realm's depth-0 node.
    pub fn is_root(&self) -> bool {
        self.parent_id == ROOT_SENTINEL
    }
}

/// A reference-counted record deduplicating a multi-root scope set.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScopeSetNode {
    /// Deterministic id derived from the sorted child-hash list.
    pub id: String,
    /// Ordered, deduplicated CAS node hashes.
    pub children: Vec<String>,
    /// Number of delegates currently pointing at this node.
    pub ref_count: u64,
    /// Creation time, epoch-ms.
    pub created_at: i64,
}

/// Capabilities a freshly exchanged authorization code grants to the
/// delegate it mints.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GrantedPermissions {
    /// Upload capability to grant.
    pub can_upload: bool,
    /// Depot-management capability to grant.
    pub can_manage_depot: bool,
    /// Depot restriction to grant, if any.
    pub delegated_depots: Option<Vec<String>>,
    /// Scope root to grant, if any.
    pub scope_node_hash: Option<String>,
    /// Lifetime of the minted delegate, in seconds, if bounded.
    pub expires_in: Option<i64>,
}

/// A one-shot ticket for the OAuth authorization-code exchange.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuthCode {
    /// The code value itself (>=128-bit, URL-safe random).
    pub code: String,
    /// The client this code was issued to.
    pub client_id: String,
    /// The redirect URI the client presented at authorize time.
    pub redirect_uri: String,
    /// The authenticated user this code will mint a delegate for.
    pub user_id: String,
    /// The user's realm.
    pub realm: String,
    /// Scopes granted by the user during consent.
    pub scopes: Vec<String>,
    /// PKCE code challenge, base64url(SHA-256(verifier)).
    pub code_challenge: String,
    /// Always `"S256"`.
    pub code_challenge_method: String,
    /// Capabilities to apply to the minted delegate.
    pub granted_permissions: GrantedPermissions,
    /// Creation time, epoch-ms.
    pub created_at: i64,
    /// `created_at + 10 minutes`, epoch-ms.
    pub expires_at: i64,
    /// Monotonic false-to-true consumption flag.
    pub used: bool,
}

/// An opaque pagination cursor for [`super::delegate_store::DelegateStore::list_children`].
pub type Cursor = String;
