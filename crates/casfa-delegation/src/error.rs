use thiserror::Error;

/// Errors raised while narrowing a child's capabilities against its
/// parent's, or while resolving a requested scope.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum DelegationError {
    /// The child requested a capability, depot, or expiry its parent
    /// does not hold.
    #[error("permission escalation: {0}")]
    PermissionEscalation(&'static str),

    /// The proposed child would exceed the configured maximum chain
    /// depth.
    #[error("delegate depth exceeded")]
    DepthExceeded,

    /// A requested scope path was malformed or did not resolve within
    /// the parent's reachable roots.
    #[error("invalid scope")]
    InvalidScope,
}
