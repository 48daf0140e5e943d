//! Optional TTL-caching decorator over a [`DelegateStore`] (spec §5
//! "Shared caches", §6.5 `REDIS_URL`).
//!
//! No `redis` client appears anywhere in this workspace's dependency
//! stack, and the spec treats the backing store as an opaque detail
//! ("a delegate lookup cache *may* wrap C2 with TTL semantics"), so
//! this is a process-local `tokio::sync::Mutex<HashMap<...>>` cache -
//! when no external cache is configured the spec calls for a
//! pass-through, which is exactly what omitting this wrapper gives you.
//! Wiring a real `redis`-backed implementation behind the same trait is
//! a deployment concern, not a delegation-core one.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use tokio::sync::Mutex;

use crate::delegate_store::{ChildPage, DelegateStore, RotateTokensInput};
use crate::error::StoreResult;
use crate::model::{Cursor, Delegate};

struct Entry {
    delegate: Delegate,
    inserted_at: Instant,
}

/// Wraps an inner [`DelegateStore`] with a TTL cache keyed by delegate
/// id.
///
/// Invariants (spec §5): entries are evicted on `revoke` and
/// `rotate_tokens`; a miss (including an expired entry) always falls
/// through to the inner store; negative lookups (the delegate does not
/// exist) are never cached, so a just-created delegate is visible on
/// the next `get` without waiting out a TTL.
pub struct CachingDelegateStore {
    inner: Arc<dyn DelegateStore>,
    ttl: Duration,
    entries: Mutex<HashMap<String, Entry>>,
}

impl CachingDelegateStore {
    /// Wrap `inner`, caching positive `get` results for `ttl`.
    pub fn new(inner: Arc<dyn DelegateStore>, ttl: Duration) -> Self {
        Self { inner, ttl, entries: Mutex::new(HashMap::new()) }
    }

    async fn evict(&self, delegate_id: &str) {
        self.entries.lock().await.remove(delegate_id);
    }
}

#[async_trait]
impl DelegateStore for CachingDelegateStore {
    async fn create(&self, delegate: &Delegate) -> StoreResult<bool> {
        self.inner.create(delegate).await
    }

    async fn get(&self, delegate_id: &str) -> StoreResult<Option<Delegate>> {
        {
            let entries = self.entries.lock().await;
            if let Some(entry) = entries.get(delegate_id) {
                if entry.inserted_at.elapsed() < self.ttl {
                    return Ok(Some(entry.delegate.clone()));
                }
            }
        }

        let fetched = self.inner.get(delegate_id).await?;
        if let Some(delegate) = &fetched {
            self.entries.lock().await.insert(
                delegate_id.to_string(),
                Entry { delegate: delegate.clone(), inserted_at: Instant::now() },
            );
        }
        Ok(fetched)
    }

    async fn rotate_tokens(&self, input: RotateTokensInput) -> StoreResult<bool> {
        let delegate_id = input.delegate_id.clone();
        let rotated = self.inner.rotate_tokens(input).await?;
        self.evict(&delegate_id).await;
        Ok(rotated)
    }

    async fn revoke(&self, delegate_id: &str, by: &str, now_ms: i64) -> StoreResult<bool> {
        let revoked = self.inner.revoke(delegate_id, by, now_ms).await?;
        self.evict(delegate_id).await;
        Ok(revoked)
    }

    async fn list_children(
        &self,
        parent_id: &str,
        limit: u32,
        cursor: Option<Cursor>,
    ) -> StoreResult<ChildPage> {
        self.inner.list_children(parent_id, limit, cursor).await
    }

    async fn get_or_create_root(
        &self,
        realm: &str,
        proposed: &Delegate,
    ) -> StoreResult<(Delegate, bool)> {
        self.inner.get_or_create_root(realm, proposed).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryDelegateStore;
    use crate::model::ROOT_SENTINEL;

    fn delegate(id: &str) -> Delegate {
        Delegate {
            delegate_id: id.to_string(),
            realm: "usr_alice".to_string(),
            parent_id: ROOT_SENTINEL.to_string(),
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
            current_rt_hash: "h1".to_string(),
            current_at_hash: "a1".to_string(),
            at_expires_at: 1_000,
        }
    }

    #[tokio::test]
    async fn cached_get_survives_until_evicted() {
        let store = CachingDelegateStore::new(Arc::new(MemoryDelegateStore::new()), Duration::from_secs(60));
        store.create(&delegate("dlt_a")).await.unwrap();
        assert!(store.get("dlt_a").await.unwrap().is_some());
        assert!(store.get("dlt_a").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn revoke_evicts_cache_entry() {
        let store = CachingDelegateStore::new(Arc::new(MemoryDelegateStore::new()), Duration::from_secs(60));
        store.create(&delegate("dlt_a")).await.unwrap();
        store.get("dlt_a").await.unwrap();
        store.revoke("dlt_a", "dlt_a", 5).await.unwrap();
        let cached = store.get("dlt_a").await.unwrap().unwrap();
        assert!(cached.is_revoked);
    }

    #[tokio::test]
    async fn rotate_tokens_evicts_cache_entry() {
        let store = CachingDelegateStore::new(Arc::new(MemoryDelegateStore::new()), Duration::from_secs(60));
        store.create(&delegate("dlt_a")).await.unwrap();
        store.get("dlt_a").await.unwrap();
        store
            .rotate_tokens(RotateTokensInput {
                delegate_id: "dlt_a".to_string(),
                expected_rt_hash: "h1".to_string(),
                new_rt_hash: "h2".to_string(),
                new_at_hash: "a2".to_string(),
                new_at_expires_at: 2_000,
            })
            .await
            .unwrap();
        let refreshed = store.get("dlt_a").await.unwrap().unwrap();
        assert_eq!(refreshed.current_rt_hash, "h2");
    }

    #[tokio::test]
    async fn negative_lookups_are_never_cached() {
        let store = CachingDelegateStore::new(Arc::new(MemoryDelegateStore::new()), Duration::from_secs(60));
        assert!(store.get("dlt_missing").await.unwrap().is_none());
        store.create(&delegate("dlt_missing")).await.unwrap();
        assert!(store.get("dlt_missing").await.unwrap().is_some());
    }
}
