//! The delegate/scope-set/auth-code data model plus the pure
//! algorithms that govern how the delegation tree grows: scope
//! resolution (C4) and permission narrowing (C5).
//!
//! Storage and token bytes live in [`casfa_store`] and [`casfa_token`]
//! respectively; this crate only decides whether a proposed child is
//! *allowed*, never how it is persisted.

pub mod error;
pub mod permission;
pub mod scope;
pub mod tree;

pub use error::DelegationError;
pub use permission::{validate_child, ParentCapabilities, RequestedCapabilities};
pub use scope::{resolve_scope, scope_set_node_id, NodeReader, ResolvedScope};
pub use tree::{attach_scope_set_node, new_child_delegate, new_root_delegate, NewChild};
