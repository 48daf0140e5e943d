use thiserror::Error;

/// Errors surfaced by the delegate, auth-code, and scope-set stores.
///
/// Condition failures (already-exists, CAS mismatch, already-revoked)
/// are modeled as ordinary `Ok` return values, never as variants here;
/// this enum is reserved for transport/backend failures that the caller
/// cannot reasonably recover from beyond a 5xx.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The primary key already existed on an unconditional or
    /// conditional create that requires absence.
    #[error("record already exists: {0}")]
    AlreadyExists(String),

    /// The backing store (in-memory lock, SQL connection, etc.) failed.
    #[error("store backend error: {0}")]
    Backend(String),

    /// A stored record failed to (de)serialize.
    #[error("serialization error: {0}")]
    Serialization(String),
}

/// Convenience alias for store operations.
pub type StoreResult<T> = Result<T, StoreError>;
