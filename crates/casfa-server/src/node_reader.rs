//! Stub for the CAS node store the scope resolver reads through.
//!
//! The CAS filesystem and its Merkle-DAG semantics are out of scope
//! (spec §1); this is the seam a real deployment wires a CAS client
//! into via [`casfa_delegation::NodeReader`].

use async_trait::async_trait;
use casfa_delegation::NodeReader;

/// A [`NodeReader`] with no backing store - every lookup misses.
///
/// Suitable only for scope requests that inherit the parent verbatim
/// (`[]` or `["."]`), which never call `children_of`. Any deployment
/// that resolves relative `"~N"` scopes must supply a real CAS-backed
/// reader instead.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullNodeReader;

#[async_trait]
impl NodeReader for NullNodeReader {
    async fn children_of(&self, _hash: &str) -> Option<Vec<String>> {
        None
    }
}
