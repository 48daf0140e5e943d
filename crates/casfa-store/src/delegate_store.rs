use async_trait::async_trait;

use crate::error::StoreResult;
use crate::model::{Cursor, Delegate};

/// Inputs to an atomic token-rotation compare-and-swap.
#[derive(Debug, Clone)]
pub struct RotateTokensInput {
    /// The delegate whose live token generation is rotating.
    pub delegate_id: String,
    /// The rotation only applies if this matches the stored
    /// `current_rt_hash`.
    pub expected_rt_hash: String,
    /// New refresh-token hash to install.
    pub new_rt_hash: String,
    /// New access-token hash to install.
    pub new_at_hash: String,
    /// New access-token expiry, epoch-ms.
    pub new_at_expires_at: i64,
}

/// A page of a parent's direct children.
#[derive(Debug, Clone, Default)]
pub struct ChildPage {
    /// Children returned by this page, in index order.
    pub items: Vec<Delegate>,
    /// Opaque cursor for the next page, if more remain.
    pub next_cursor: Option<Cursor>,
}

/// Conditional create/lookup/mutate contract over the delegate tree.
///
/// Every mutating method here is expected to be atomic at the single-key
/// granularity described in spec §5: rotation is a compare-and-swap on
/// `current_rt_hash`, and revoke is a compare-and-swap on `is_revoked`.
#[async_trait]
pub trait DelegateStore: Send + Sync {
    /// Insert `delegate`. Returns `Ok(false)` (never an error) if the
    /// primary key already exists.
    async fn create(&self, delegate: &Delegate) -> StoreResult<bool>;

    /// Point lookup by delegate id.
    async fn get(&self, delegate_id: &str) -> StoreResult<Option<Delegate>>;

    /// Atomically install new token hashes and expiry, but only if the
    /// stored `current_rt_hash` still equals `expected_rt_hash`.
    async fn rotate_tokens(&self, input: RotateTokensInput) -> StoreResult<bool>;

    /// Atomically mark `delegate_id` revoked by `by`, but only if it was
    /// not already revoked.
    async fn revoke(&self, delegate_id: &str, by: &str, now_ms: i64) -> StoreResult<bool>;

    /// Paginated query of `parent_id`'s direct children via the
    /// parent-id secondary index.
    async fn list_children(
        &self,
        parent_id: &str,
        limit: u32,
        cursor: Option<Cursor>,
    ) -> StoreResult<ChildPage>;

    /// Return `realm`'s root delegate, creating it with `proposed_id` if
    /// none exists yet. The `bool` is true iff this call created it.
    ///
    /// On a create race, the losing writer re-reads the index and
    /// returns the winner instead of erroring.
    async fn get_or_create_root(
        &self,
        realm: &str,
        proposed: &Delegate,
    ) -> StoreResult<(Delegate, bool)>;
}
