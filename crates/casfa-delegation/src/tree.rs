//! Constructors that build root and child [`Delegate`] records with
//! the chain/depth invariants of spec §3 already satisfied by
//! construction, so callers cannot accidentally produce a malformed
//! record.

use casfa_store::{Delegate, ScopeSetNode, ROOT_SENTINEL};

use crate::scope::ResolvedScope;

/// Build a fresh root delegate for `realm`.
///
/// Root delegates always have `can_upload = can_manage_depot = true`,
/// `depth = 0`, and empty token fields; they are authenticated
/// directly by the owning user's JWT and never carry a live RT/AT.
pub fn new_root_delegate(realm: &str, delegate_id: String, now_ms: i64) -> Delegate {
    Delegate {
        chain: vec![delegate_id.clone()],
        delegate_id,
        realm: realm.to_string(),
        parent_id: ROOT_SENTINEL.to_string(),
        depth: 0,
        can_upload: true,
        can_manage_depot: true,
        delegated_depots: None,
        scope_node_hash: None,
        scope_set_node_id: None,
        expires_at: None,
        is_revoked: false,
        revoked_at: None,
        revoked_by: None,
        created_at: now_ms,
        current_rt_hash: String::new(),
        current_at_hash: String::new(),
        at_expires_at: 0,
    }
}

/// Fields a caller supplies to mint a child delegate; permission and
/// scope validation happen before this is called; this function only
/// assembles the record.
pub struct NewChild {
    /// Freshly minted id for the child.
    pub delegate_id: String,
    /// Requested upload capability (already validated against parent).
    pub can_upload: bool,
    /// Requested depot-management capability (already validated).
    pub can_manage_depot: bool,
    /// Requested depot restriction (already validated as a subset).
    pub delegated_depots: Option<Vec<String>>,
    /// Resolved scope, from [`crate::scope::resolve_scope`].
    pub resolved_scope: ResolvedScope,
    /// Requested absolute expiry, epoch-ms (already validated).
    pub expires_at: Option<i64>,
    /// Hash of the freshly issued refresh token.
    pub current_rt_hash: String,
    /// Hash of the freshly issued access token.
    pub current_at_hash: String,
    /// Access-token expiry, epoch-ms.
    pub at_expires_at: i64,
}

/// Build a child delegate under `parent`, extending its chain by one.
pub fn new_child_delegate(parent: &Delegate, child: NewChild, now_ms: i64) -> Delegate {
    let mut chain = parent.chain.clone();
    chain.push(child.delegate_id.clone());

    let (scope_node_hash, scope_set_node_id) = match child.resolved_scope {
        ResolvedScope::None => (None, None),
        ResolvedScope::Single(hash) => (Some(hash), None),
        ResolvedScope::Multi(_) => (None, None), // set by caller once the ScopeSetNode is persisted
    };

    Delegate {
        delegate_id: child.delegate_id,
        realm: parent.realm.clone(),
        parent_id: parent.delegate_id.clone(),
        chain,
        depth: parent.depth + 1,
        can_upload: child.can_upload,
        can_manage_depot: child.can_manage_depot,
        delegated_depots: child.delegated_depots,
        scope_node_hash,
        scope_set_node_id,
        expires_at: child.expires_at,
        is_revoked: false,
        revoked_at: None,
        revoked_by: None,
        created_at: now_ms,
        current_rt_hash: child.current_rt_hash,
        current_at_hash: child.current_at_hash,
        at_expires_at: child.at_expires_at,
    }
}

/// Attach a persisted [`ScopeSetNode`]'s id to `delegate` when the
/// resolved scope had more than one root. A no-op for single-root or
/// unscoped delegates.
pub fn attach_scope_set_node(delegate: &mut Delegate, node: &ScopeSetNode) {
    delegate.scope_set_node_id = Some(node.id.clone());
    delegate.scope_node_hash = None;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn root_delegate_satisfies_chain_invariant() {
        let root = new_root_delegate("usr_alice", "dlt_root".to_string(), 0);
        assert_eq!(root.chain, vec!["dlt_root".to_string()]);
        assert_eq!(root.depth, 0);
        assert_eq!(root.parent_id, ROOT_SENTINEL);
        assert!(root.can_upload && root.can_manage_depot);
        assert!(root.current_rt_hash.is_empty());
    }

    #[test]
    fn child_delegate_extends_parent_chain() {
        let root = new_root_delegate("usr_alice", "dlt_root".to_string(), 0);
        let child = new_child_delegate(
            &root,
            NewChild {
                delegate_id: "dlt_child".to_string(),
                can_upload: true,
                can_manage_depot: false,
                delegated_depots: None,
                resolved_scope: ResolvedScope::None,
                expires_at: Some(1_000),
                current_rt_hash: "rt".to_string(),
                current_at_hash: "at".to_string(),
                at_expires_at: 2_000,
            },
            100,
        );
        assert_eq!(child.chain, vec!["dlt_root".to_string(), "dlt_child".to_string()]);
        assert_eq!(child.depth, 1);
        assert_eq!(*child.chain.last().unwrap(), child.delegate_id);
        assert_eq!(child.chain.len() as u32, child.depth + 1);
    }
}
