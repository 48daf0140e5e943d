use async_trait::async_trait;

use crate::error::StoreResult;
use crate::model::AuthCode;

/// One-shot create/consume contract for OAuth authorization codes.
#[async_trait]
pub trait AuthCodeStore: Send + Sync {
    /// Unconditionally store a freshly minted code.
    async fn create(&self, record: &AuthCode) -> StoreResult<()>;

    /// Atomically read and mark `code` used.
    ///
    /// Returns `None` - never an error - if the code is missing,
    /// already used, or expired as of `now_ms`. This is the sole
    /// correctness boundary for "a code redeems at most once".
    async fn consume(&self, code: &str, now_ms: i64) -> StoreResult<Option<AuthCode>>;
}
