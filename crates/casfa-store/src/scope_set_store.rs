use async_trait::async_trait;

use crate::error::StoreResult;
use crate::model::ScopeSetNode;

/// Reference-counted create/lookup contract for multi-root scope sets.
#[async_trait]
pub trait ScopeSetStore: Send + Sync {
    /// Insert a new node with `ref_count = 1`, or increment the
    /// `ref_count` of the existing node with this `id`.
    async fn create_or_increment(&self, id: &str, children: &[String], now_ms: i64) -> StoreResult<ScopeSetNode>;

    /// Point lookup by node id.
    async fn get(&self, id: &str) -> StoreResult<Option<ScopeSetNode>>;
}
