//! Effective permissions of a virtual folder.
//!
//! The storage service stores raw `r`/`w`/`d` tokens. What the operator may
//! actually do is derived from them: write access implies read access, while
//! delete stands on its own.

use protocol::{PermissionSet, PermissionToken, VirtualFolder};

/// Check whether `permission` grants `requested`.
///
/// A token grants itself; `write` additionally grants `read`.
pub fn has_capability(permission: &PermissionSet, requested: PermissionToken) -> bool {
    if permission.contains(requested) {
        return true;
    }
    requested == PermissionToken::Read && permission.contains(PermissionToken::Write)
}

/// Capability set derived from a folder's raw permission tokens.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct EffectivePermission {
    pub can_read: bool,
    pub can_write: bool,
    pub can_delete: bool,
}

impl EffectivePermission {
    pub fn from_set(permission: &PermissionSet) -> Self {
        Self {
            can_read: has_capability(permission, PermissionToken::Read),
            can_write: has_capability(permission, PermissionToken::Write),
            can_delete: has_capability(permission, PermissionToken::Delete),
        }
    }

    pub fn of(folder: &VirtualFolder) -> Self {
        Self::from_set(&folder.permission)
    }

    /// Check a single capability.
    pub fn allows(&self, capability: PermissionToken) -> bool {
        match capability {
            PermissionToken::Read => self.can_read,
            PermissionToken::Write => self.can_write,
            PermissionToken::Delete => self.can_delete,
        }
    }
}
