//! In-memory store implementations, the default fixture for tests and
//! for deployments that do not need durability across restarts.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::RwLock;
use tracing::{debug, warn};

use crate::auth_code_store::AuthCodeStore;
use crate::delegate_store::{ChildPage, DelegateStore, RotateTokensInput};
use crate::error::StoreResult;
use crate::model::{AuthCode, Cursor, Delegate, ScopeSetNode, ROOT_SENTINEL};
use crate::scope_set_store::ScopeSetStore;

/// `RwLock<HashMap>`-backed [`DelegateStore`].
///
/// Children are tracked via a secondary index keyed by `parent_id`
/// (root delegates index under [`ROOT_SENTINEL`]) so `list_children`
/// and `get_or_create_root` don't scan the whole table.
#[derive(Debug, Default)]
pub struct MemoryDelegateStore {
    by_id: Arc<RwLock<HashMap<String, Delegate>>>,
    children_index: Arc<RwLock<HashMap<String, Vec<String>>>>,
}

impl MemoryDelegateStore {
    /// Construct an empty store.
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl DelegateStore for MemoryDelegateStore {
    async fn create(&self, delegate: &Delegate) -> StoreResult<bool> {
        let mut by_id = self.by_id.write().await;
        if by_id.contains_key(&delegate.delegate_id) {
            warn!(delegate_id = %delegate.delegate_id, "create: already exists");
            return Ok(false);
        }
        by_id.insert(delegate.delegate_id.clone(), delegate.clone());
        drop(by_id);

        let mut index = self.children_index.write().await;
        index
            .entry(delegate.parent_id.clone())
            .or_default()
            .push(delegate.delegate_id.clone());
        debug!(delegate_id = %delegate.delegate_id, parent_id = %delegate.parent_id, "created delegate");
        Ok(true)
    }

    async fn get(&self, delegate_id: &str) -> StoreResult<Option<Delegate>> {
        Ok(self.by_id.read().await.get(delegate_id).cloned())
    }

    async fn rotate_tokens(&self, input: RotateTokensInput) -> StoreResult<bool> {
        let mut by_id = self.by_id.write().await;
        let Some(delegate) = by_id.get_mut(&input.delegate_id) else {
            warn!(delegate_id = %input.delegate_id, "rotate_tokens: no such delegate");
            return Ok(false);
        };
        if delegate.current_rt_hash != input.expected_rt_hash {
            warn!(delegate_id = %input.delegate_id, "rotate_tokens: CAS mismatch");
            return Ok(false);
        }
        delegate.current_rt_hash = input.new_rt_hash;
        delegate.current_at_hash = input.new_at_hash;
        delegate.at_expires_at = input.new_at_expires_at;
        debug!(delegate_id = %input.delegate_id, "rotated tokens");
        Ok(true)
    }

    async fn revoke(&self, delegate_id: &str, by: &str, now_ms: i64) -> StoreResult<bool> {
        let mut by_id = self.by_id.write().await;
        let Some(delegate) = by_id.get_mut(delegate_id) else {
            warn!(delegate_id, "revoke: no such delegate");
            return Ok(false);
        };
        if delegate.is_revoked {
            return Ok(false);
        }
        delegate.is_revoked = true;
        delegate.revoked_at = Some(now_ms);
        delegate.revoked_by = Some(by.to_string());
        debug!(delegate_id, by, "revoked delegate");
        Ok(true)
    }

    async fn list_children(
        &self,
        parent_id: &str,
        limit: u32,
        cursor: Option<Cursor>,
    ) -> StoreResult<ChildPage> {
        let index = self.children_index.read().await;
        let Some(ids) = index.get(parent_id) else {
            return Ok(ChildPage::default());
        };
        let start = cursor
            .and_then(|c| c.parse::<usize>().ok())
            .unwrap_or(0);
        let by_id = self.by_id.read().await;
        let mut items = Vec::new();
        let mut i = start;
        while i < ids.len() && items.len() < limit as usize {
            if let Some(d) = by_id.get(&ids[i]) {
                items.push(d.clone());
            }
            i += 1;
        }
        let next_cursor = if i < ids.len() { Some(i.to_string()) } else { None };
        Ok(ChildPage { items, next_cursor })
    }

    async fn get_or_create_root(
        &self,
        realm: &str,
        proposed: &Delegate,
    ) -> StoreResult<(Delegate, bool)> {
        // Holds `by_id` across the existence check and the insert so two
        // concurrent first-time calls for the same realm can't both pass
        // the check before either has written (spec §3: one root per realm).
        let mut by_id = self.by_id.write().await;
        if let Some(existing) = by_id.values().find(|d| d.parent_id == ROOT_SENTINEL && d.realm == realm) {
            return Ok((existing.clone(), false));
        }
        if by_id.contains_key(&proposed.delegate_id) {
            warn!(delegate_id = %proposed.delegate_id, "get_or_create_root: id collision with unrelated record");
            return Ok((proposed.clone(), false));
        }
        by_id.insert(proposed.delegate_id.clone(), proposed.clone());
        drop(by_id);

        let mut index = self.children_index.write().await;
        index
            .entry(proposed.parent_id.clone())
            .or_default()
            .push(proposed.delegate_id.clone());
        debug!(delegate_id = %proposed.delegate_id, realm, "created root delegate");
        Ok((proposed.clone(), true))
    }
}

/// `RwLock<HashMap>`-backed [`AuthCodeStore`].
#[derive(Debug, Default)]
pub struct MemoryAuthCodeStore {
    codes: Arc<RwLock<HashMap<String, AuthCode>>>,
}

impl MemoryAuthCodeStore {
    /// Construct an empty store.
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl AuthCodeStore for MemoryAuthCodeStore {
    async fn create(&self, record: &AuthCode) -> StoreResult<()> {
        let mut codes = self.codes.write().await;
        codes.insert(record.code.clone(), record.clone());
        debug!(code = %record.code, "stored auth code");
        Ok(())
    }

    async fn consume(&self, code: &str, now_ms: i64) -> StoreResult<Option<AuthCode>> {
        let mut codes = self.codes.write().await;
        let Some(record) = codes.get_mut(code) else {
            return Ok(None);
        };
        if record.used || record.expires_at <= now_ms {
            warn!(code, "consume: used or expired");
            return Ok(None);
        }
        record.used = true;
        debug!(code, "consumed auth code");
        Ok(Some(record.clone()))
    }
}

/// `RwLock<HashMap>`-backed [`ScopeSetStore`].
#[derive(Debug, Default)]
pub struct MemoryScopeSetStore {
    nodes: Arc<RwLock<HashMap<String, ScopeSetNode>>>,
}

impl MemoryScopeSetStore {
    /// Construct an empty store.
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ScopeSetStore for MemoryScopeSetStore {
    async fn create_or_increment(
        &self,
        id: &str,
        children: &[String],
        now_ms: i64,
    ) -> StoreResult<ScopeSetNode> {
        let mut nodes = self.nodes.write().await;
        let node = nodes
            .entry(id.to_string())
            .and_modify(|n| n.ref_count += 1)
            .or_insert_with(|| ScopeSetNode {
                id: id.to_string(),
                children: children.to_vec(),
                ref_count: 1,
                created_at: now_ms,
            });
        Ok(node.clone())
    }

    async fn get(&self, id: &str) -> StoreResult<Option<ScopeSetNode>> {
        Ok(self.nodes.read().await.get(id).cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn delegate(id: &str, realm: &str, parent: &str) -> Delegate {
        Delegate {
            delegate_id: id.to_string(),
            realm: realm.to_string(),
            parent_id: parent.to_string(),
            chain: vec![id.to_string()],
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
            created_at: 0,
            current_rt_hash: String::new(),
            current_at_hash: String::new(),
            at_expires_at: 0,
        }
    }

    #[tokio::test]
    async fn create_rejects_duplicate_primary_key() {
        let store = MemoryDelegateStore::new();
        let d = delegate("dlt_a", "usr_alice", ROOT_SENTINEL);
        assert!(store.create(&d).await.unwrap());
        assert!(!store.create(&d).await.unwrap());
    }

    #[tokio::test]
    async fn rotate_tokens_requires_matching_expected_hash() {
        let store = MemoryDelegateStore::new();
        let mut d = delegate("dlt_a", "usr_alice", ROOT_SENTINEL);
        d.current_rt_hash = "h1".to_string();
        store.create(&d).await.unwrap();

        let ok = store
            .rotate_tokens(RotateTokensInput {
                delegate_id: "dlt_a".to_string(),
                expected_rt_hash: "wrong".to_string(),
                new_rt_hash: "h2".to_string(),
                new_at_hash: "a2".to_string(),
                new_at_expires_at: 100,
            })
            .await
            .unwrap();
        assert!(!ok);

        let ok = store
            .rotate_tokens(RotateTokensInput {
                delegate_id: "dlt_a".to_string(),
                expected_rt_hash: "h1".to_string(),
                new_rt_hash: "h2".to_string(),
                new_at_hash: "a2".to_string(),
                new_at_expires_at: 100,
            })
            .await
            .unwrap();
        assert!(ok);
        assert_eq!(store.get("dlt_a").await.unwrap().unwrap().current_rt_hash, "h2");
    }

    #[tokio::test]
    async fn revoke_is_monotonic() {
        let store = MemoryDelegateStore::new();
        let d = delegate("dlt_a", "usr_alice", ROOT_SENTINEL);
        store.create(&d).await.unwrap();
        assert!(store.revoke("dlt_a", "dlt_a", 10).await.unwrap());
        assert!(!store.revoke("dlt_a", "dlt_a", 20).await.unwrap());
        assert!(store.get("dlt_a").await.unwrap().unwrap().is_revoked);
    }

    #[tokio::test]
    async fn get_or_create_root_is_idempotent_per_realm() {
        let store = MemoryDelegateStore::new();
        let proposed = delegate("dlt_root", "usr_alice", ROOT_SENTINEL);
        let (first, created1) = store.get_or_create_root("usr_alice", &proposed).await.unwrap();
        assert!(created1);
        let (second, created2) = store.get_or_create_root("usr_alice", &proposed).await.unwrap();
        assert!(!created2);
        assert_eq!(first.delegate_id, second.delegate_id);
    }

    #[tokio::test]
    async fn truly_concurrent_get_or_create_root_yields_exactly_one_winner() {
        let store = Arc::new(MemoryDelegateStore::new());
        let a = delegate("dlt_a", "usr_alice", ROOT_SENTINEL);
        let b = delegate("dlt_b", "usr_alice", ROOT_SENTINEL);

        let store_a = store.clone();
        let store_b = store.clone();
        let (ra, rb) = tokio::join!(
            async move { store_a.get_or_create_root("usr_alice", &a).await.unwrap() },
            async move { store_b.get_or_create_root("usr_alice", &b).await.unwrap() },
        );
        let created_count = [ra.1, rb.1].into_iter().filter(|c| *c).count();
        assert_eq!(created_count, 1, "exactly one caller must win the race");
        assert_eq!(ra.0.delegate_id, rb.0.delegate_id, "both callers must observe the same root");
    }

    #[tokio::test]
    async fn auth_code_consume_is_one_shot() {
        let store = MemoryAuthCodeStore::new();
        let record = AuthCode {
            code: "abc".to_string(),
            client_id: "client".to_string(),
            redirect_uri: "http://localhost/cb".to_string(),
            user_id: "usr_alice".to_string(),
            realm: "usr_alice".to_string(),
            scopes: vec!["cas:read".to_string()],
            code_challenge: "chal".to_string(),
            code_challenge_method: "S256".to_string(),
            granted_permissions: crate::model::GrantedPermissions {
                can_upload: false,
                can_manage_depot: false,
                delegated_depots: None,
                scope_node_hash: None,
                expires_in: None,
            },
            created_at: 0,
            expires_at: 600_000,
            used: false,
        };
        store.create(&record).await.unwrap();
        assert!(store.consume("abc", 1_000).await.unwrap().is_some());
        assert!(store.consume("abc", 1_000).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn auth_code_consume_rejects_expired() {
        let store = MemoryAuthCodeStore::new();
        let record = AuthCode {
            code: "xyz".to_string(),
            client_id: "client".to_string(),
            redirect_uri: "http://localhost/cb".to_string(),
            user_id: "usr_alice".to_string(),
            realm: "usr_alice".to_string(),
            scopes: vec![],
            code_challenge: "chal".to_string(),
            code_challenge_method: "S256".to_string(),
            granted_permissions: crate::model::GrantedPermissions {
                can_upload: false,
                can_manage_depot: false,
                delegated_depots: None,
                scope_node_hash: None,
                expires_in: None,
            },
            created_at: 0,
            expires_at: 500,
            used: false,
        };
        store.create(&record).await.unwrap();
        assert!(store.consume("xyz", 501).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn scope_set_store_increments_ref_count_on_collision() {
        let store = MemoryScopeSetStore::new();
        let children = vec!["h1".to_string(), "h2".to_string()];
        let a = store.create_or_increment("set1", &children, 0).await.unwrap();
        assert_eq!(a.ref_count, 1);
        let b = store.create_or_increment("set1", &children, 0).await.unwrap();
        assert_eq!(b.ref_count, 2);
    }
}
