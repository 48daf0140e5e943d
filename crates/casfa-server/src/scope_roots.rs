//! Reconstructs the list of CAS scope roots a delegate carries, since
//! the persisted record only stores either a single hash or a
//! reference into a [`ScopeSetNode`] (spec §3 "mutually exclusive").

use casfa_store::{Delegate, ScopeSetStore, StoreResult};

/// Return `delegate`'s scope roots: empty if unscoped, one element for
/// a single root, or the deduplicated list behind its scope-set node.
pub async fn scope_roots(delegate: &Delegate, scope_sets: &dyn ScopeSetStore) -> StoreResult<Vec<String>> {
    if let Some(hash) = &delegate.scope_node_hash {
        return Ok(vec![hash.clone()]);
    }
    if let Some(set_id) = &delegate.scope_set_node_id {
        if let Some(node) = scope_sets.get(set_id).await? {
            return Ok(node.children);
        }
    }
    Ok(Vec::new())
}
