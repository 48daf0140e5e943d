//! Abstract key-value contracts for delegates, authorization codes, and
//! scope-set nodes, with an in-memory default and an optional
//! `sqlx`/SQLite implementation.
//!
//! Conditional semantics (create, CAS-rotate, CAS-revoke, one-shot
//! consume) are expressed as boolean/`Option` return values, never as
//! thrown errors the caller must pattern-match by string - see spec
//! §4.2-§4.3.

pub mod auth_code_store;
pub mod cache;
pub mod delegate_store;
pub mod error;
pub mod memory;
pub mod model;
pub mod scope_set_store;

#[cfg(feature = "sql-storage")]
pub mod sql;

pub use auth_code_store::AuthCodeStore;
pub use cache::CachingDelegateStore;
pub use delegate_store::{ChildPage, DelegateStore, RotateTokensInput};
pub use error::{StoreError, StoreResult};
pub use memory::{MemoryAuthCodeStore, MemoryDelegateStore, MemoryScopeSetStore};
pub use model::{AuthCode, Cursor, Delegate, GrantedPermissions, ScopeSetNode, ROOT_SENTINEL};
pub use scope_set_store::ScopeSetStore;

#[cfg(feature = "sql-storage")]
pub use sql::{SqliteAuthCodeStore, SqliteDelegateStore, SqliteScopeSetStore};
