//! C4: resolves a child's requested scope against its parent's scope
//! roots (spec §4.4).
//!
//! The CAS node store itself is an external collaborator (out of
//! scope); [`NodeReader`] is the minimal read-only seam this resolver
//! needs from it.

use async_trait::async_trait;

use crate::error::DelegationError;

/// Read-only access to a CAS node's children, by node hash.
///
/// This is the resolver's only dependency on the content-addressable
/// store; it never reads or writes node payloads itself.
#[async_trait]
pub trait NodeReader: Send + Sync {
    /// Return the ordered child-hash list stored at `hash`, or `None`
    /// if no such node exists.
    async fn children_of(&self, hash: &str) -> Option<Vec<String>>;
}

/// The outcome of resolving a requested scope.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResolvedScope {
    /// No scope roots at all (parent is itself unscoped).
    None,
    /// Exactly one resolved root; becomes `scopeNodeHash`.
    Single(String),
    /// More than one resolved root, sorted and deduplicated; becomes a
    /// `ScopeSetNode` via `ScopeSetStore::create_or_increment`.
    Multi(Vec<String>),
}

/// Resolve `requested` against `parent_roots`.
///
/// `requested` is either empty/`["."]` (inherit the parent's scope
/// verbatim) or a list of relative `"~N/~N/..."` paths, each walked
/// from every parent root. A path is valid if it resolves from at
/// least one parent root; an unresolvable or malformed path fails the
/// whole request with `InvalidScope`.
pub async fn resolve_scope(
    requested: &[String],
    parent_roots: &[String],
    reader: &dyn NodeReader,
) -> Result<ResolvedScope, DelegationError> {
    let inherits = requested.is_empty() || (requested.len() == 1 && requested[0] == ".");
    if inherits {
        return Ok(match parent_roots.len() {
            0 => ResolvedScope::None,
            1 => ResolvedScope::Single(parent_roots[0].clone()),
            _ => {
                let mut roots = parent_roots.to_vec();
                roots.sort();
                roots.dedup();
                ResolvedScope::Multi(roots)
            }
        });
    }

    let mut resolved = Vec::new();
    for path in requested {
        let segments = parse_path(path)?;
        let mut found_any = false;
        for root in parent_roots {
            if let Some(node) = walk(root, &segments, reader).await {
                resolved.push(node);
                found_any = true;
            }
        }
        if !found_any {
            return Err(DelegationError::InvalidScope);
        }
    }

    resolved.sort();
    resolved.dedup();
    Ok(match resolved.len() {
        0 => ResolvedScope::None,
        1 => ResolvedScope::Single(resolved.remove(0)),
        _ => ResolvedScope::Multi(resolved),
    })
}

fn parse_path(path: &str) -> Result<Vec<usize>, DelegationError> {
    path.split('/')
        .map(|segment| {
            segment
                .strip_prefix('~')
                .and_then(|n| n.parse::<usize>().ok())
                .ok_or(DelegationError::InvalidScope)
        })
        .collect()
}

async fn walk(root: &str, segments: &[usize], reader: &dyn NodeReader) -> Option<String> {
    let mut current = root.to_string();
    for &index in segments {
        let children = reader.children_of(&current).await?;
        current = children.get(index)?.clone();
    }
    Some(current)
}

/// Compute the deterministic id for a multi-root [`ScopeSetNode`].
///
/// `BLAKE3(sorted-hashes joined by ",")[:16]`, rendered with the same
/// Crockford-Base32 alphabet as delegate ids (prefixed `ssn_` instead
/// of `dlt_` so the two id spaces stay visually distinct).
pub fn scope_set_node_id(sorted_roots: &[String]) -> String {
    let joined = sorted_roots.join(",");
    let digest = blake3::hash(joined.as_bytes());
    let mut truncated = [0u8; 16];
    truncated.copy_from_slice(&digest.as_bytes()[..16]);
    format!("ssn_{}", casfa_token::encode_raw(&truncated))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    struct FakeReader(HashMap<String, Vec<String>>);

    #[async_trait]
    impl NodeReader for FakeReader {
        async fn children_of(&self, hash: &str) -> Option<Vec<String>> {
            self.0.get(hash).cloned()
        }
    }

    #[tokio::test]
    async fn empty_request_inherits_single_parent_root() {
        let reader = FakeReader(HashMap::new());
        let resolved = resolve_scope(&[], &["root1".to_string()], &reader).await.unwrap();
        assert_eq!(resolved, ResolvedScope::Single("root1".to_string()));
    }

    #[tokio::test]
    async fn dot_request_inherits_multiple_parent_roots_sorted() {
        let reader = FakeReader(HashMap::new());
        let roots = vec!["b".to_string(), "a".to_string()];
        let resolved = resolve_scope(&[".".to_string()], &roots, &reader).await.unwrap();
        assert_eq!(resolved, ResolvedScope::Multi(vec!["a".to_string(), "b".to_string()]));
    }

    #[tokio::test]
    async fn relative_path_walks_into_parent_subtree() {
        let mut nodes = HashMap::new();
        nodes.insert("root".to_string(), vec!["child0".to_string(), "child1".to_string()]);
        let reader = FakeReader(nodes);
        let resolved = resolve_scope(
            &["~1".to_string()],
            &["root".to_string()],
            &reader,
        )
        .await
        .unwrap();
        assert_eq!(resolved, ResolvedScope::Single("child1".to_string()));
    }

    #[tokio::test]
    async fn unreachable_path_is_invalid_scope() {
        let reader = FakeReader(HashMap::new());
        let err = resolve_scope(&["~0".to_string()], &["root".to_string()], &reader)
            .await
            .unwrap_err();
        assert_eq!(err, DelegationError::InvalidScope);
    }

    #[tokio::test]
    async fn malformed_segment_is_invalid_scope() {
        let reader = FakeReader(HashMap::new());
        let err = resolve_scope(&["not-a-path".to_string()], &["root".to_string()], &reader)
            .await
            .unwrap_err();
        assert_eq!(err, DelegationError::InvalidScope);
    }

    #[tokio::test]
    async fn multiple_paths_collapse_into_sorted_multi_root() {
        let mut nodes = HashMap::new();
        nodes.insert("root".to_string(), vec!["z".to_string(), "a".to_string()]);
        let reader = FakeReader(nodes);
        let resolved = resolve_scope(
            &["~0".to_string(), "~1".to_string()],
            &["root".to_string()],
            &reader,
        )
        .await
        .unwrap();
        assert_eq!(resolved, ResolvedScope::Multi(vec!["a".to_string(), "z".to_string()]));
    }

    #[test]
    fn scope_set_node_id_is_deterministic_and_order_sensitive_to_input() {
        let a = scope_set_node_id(&["h1".to_string(), "h2".to_string()]);
        let b = scope_set_node_id(&["h1".to_string(), "h2".to_string()]);
        assert_eq!(a, b);
        assert!(a.starts_with("ssn_"));
    }
}
