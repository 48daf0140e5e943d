//! C5: validates that a proposed child's capabilities never exceed its
//! parent's (spec §4.5).

use crate::error::DelegationError;

/// The parent-side facts a permission check is evaluated against.
#[derive(Debug, Clone, Copy)]
pub struct ParentCapabilities<'a> {
    /// Parent's upload capability.
    pub can_upload: bool,
    /// Parent's depot-management capability.
    pub can_manage_depot: bool,
    /// Parent's chain depth.
    pub depth: u32,
    /// Parent's absolute expiry, epoch-ms, if bounded.
    pub expires_at: Option<i64>,
    /// Parent's depot restriction, if constrained.
    pub delegated_depots: Option<&'a [String]>,
}

/// The capabilities a caller is requesting for a new child.
#[derive(Debug, Clone, Copy)]
pub struct RequestedCapabilities<'a> {
    /// Requested upload capability.
    pub can_upload: bool,
    /// Requested depot-management capability.
    pub can_manage_depot: bool,
    /// Requested absolute expiry, epoch-ms, if the caller supplied one.
    pub expires_at: Option<i64>,
    /// Requested depot restriction, if the caller supplied one.
    pub delegated_depots: Option<&'a [String]>,
}

/// Validate `requested` against `parent`, per spec §4.5.
///
/// Depth enforcement is the caller's responsibility - pass
/// `max_depth` to additionally reject children that would exceed it.
/// The `expires_at` comparison only applies when the child supplies a
/// value (the conservative reading of spec §9's open question; an
/// inheriting variant is a sound tightening left to future work).
pub fn validate_child(
    parent: ParentCapabilities,
    requested: RequestedCapabilities,
    max_depth: Option<u32>,
) -> Result<(), DelegationError> {
    if requested.can_upload && !parent.can_upload {
        return Err(DelegationError::PermissionEscalation("canUpload"));
    }
    if requested.can_manage_depot && !parent.can_manage_depot {
        return Err(DelegationError::PermissionEscalation("canManageDepot"));
    }
    if let (Some(child_depots), Some(parent_depots)) =
        (requested.delegated_depots, parent.delegated_depots)
    {
        if !parent_depots.is_empty()
            && !child_depots.is_empty()
            && !child_depots.iter().all(|d| parent_depots.contains(d))
        {
            return Err(DelegationError::PermissionEscalation("delegatedDepots"));
        }
    }
    if let (Some(child_exp), Some(parent_exp)) = (requested.expires_at, parent.expires_at) {
        if child_exp > parent_exp {
            return Err(DelegationError::PermissionEscalation("expiresAt"));
        }
    }
    if let Some(max_depth) = max_depth {
        if parent.depth + 1 > max_depth {
            return Err(DelegationError::DepthExceeded);
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parent(can_upload: bool, can_manage_depot: bool) -> ParentCapabilities<'static> {
        ParentCapabilities {
            can_upload,
            can_manage_depot,
            depth: 0,
            expires_at: None,
            delegated_depots: None,
        }
    }

    #[test]
    fn child_cannot_gain_upload_parent_lacks() {
        let req = RequestedCapabilities {
            can_upload: true,
            can_manage_depot: false,
            expires_at: None,
            delegated_depots: None,
        };
        let err = validate_child(parent(false, true), req, None).unwrap_err();
        assert_eq!(err, DelegationError::PermissionEscalation("canUpload"));
    }

    #[test]
    fn child_can_narrow_to_subset_of_depots() {
        let parent_depots = vec!["d1".to_string(), "d2".to_string()];
        let p = ParentCapabilities {
            can_upload: true,
            can_manage_depot: true,
            depth: 0,
            expires_at: None,
            delegated_depots: Some(&parent_depots),
        };
        let child_depots = vec!["d1".to_string()];
        let req = RequestedCapabilities {
            can_upload: true,
            can_manage_depot: false,
            expires_at: None,
            delegated_depots: Some(&child_depots),
        };
        assert!(validate_child(p, req, None).is_ok());
    }

    #[test]
    fn child_cannot_request_depot_outside_parent_set() {
        let parent_depots = vec!["d1".to_string()];
        let p = ParentCapabilities {
            can_upload: true,
            can_manage_depot: true,
            depth: 0,
            expires_at: None,
            delegated_depots: Some(&parent_depots),
        };
        let child_depots = vec!["d1".to_string(), "d2".to_string()];
        let req = RequestedCapabilities {
            can_upload: false,
            can_manage_depot: false,
            expires_at: None,
            delegated_depots: Some(&child_depots),
        };
        let err = validate_child(p, req, None).unwrap_err();
        assert_eq!(err, DelegationError::PermissionEscalation("delegatedDepots"));
    }

    #[test]
    fn child_expiry_cannot_exceed_parent_expiry() {
        let p = ParentCapabilities {
            can_upload: true,
            can_manage_depot: true,
            depth: 0,
            expires_at: Some(1_000),
            delegated_depots: None,
        };
        let req = RequestedCapabilities {
            can_upload: false,
            can_manage_depot: false,
            expires_at: Some(2_000),
            delegated_depots: None,
        };
        let err = validate_child(p, req, None).unwrap_err();
        assert_eq!(err, DelegationError::PermissionEscalation("expiresAt"));
    }

    #[test]
    fn child_without_expiry_is_not_bounded_by_parent() {
        let p = ParentCapabilities {
            can_upload: true,
            can_manage_depot: true,
            depth: 0,
            expires_at: Some(1_000),
            delegated_depots: None,
        };
        let req = RequestedCapabilities {
            can_upload: false,
            can_manage_depot: false,
            expires_at: None,
            delegated_depots: None,
        };
        assert!(validate_child(p, req, None).is_ok());
    }

    #[test]
    fn depth_limit_is_enforced_when_configured() {
        let p = parent(true, true);
        let req = RequestedCapabilities {
            can_upload: false,
            can_manage_depot: false,
            expires_at: None,
            delegated_depots: None,
        };
        assert_eq!(
            validate_child(p, req, Some(0)).unwrap_err(),
            DelegationError::DepthExceeded
        );
    }
}
