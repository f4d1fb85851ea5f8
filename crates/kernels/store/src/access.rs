//! Access control metadata carried by every element.
//!
//! An element is owned by the master that created it. The owner always has
//! full access; other masters are admitted according to the element's
//! [`AccessMode`] and its explicit read / read-write id lists. Elements owned
//! by the nil id are public.

use indexmap::IndexSet;
use serde::{Deserialize, Serialize};

use jac_foundation::ElementId;

/// Visibility of an element to masters other than its owner.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum AccessMode {
    /// Only the owner and listed masters.
    #[default]
    Private,
    /// Anyone may read, only the owner and listed masters may write.
    ReadOnly,
    /// Anyone may read and write.
    Public,
}

impl AccessMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            AccessMode::Private => "private",
            AccessMode::ReadOnly => "read_only",
            AccessMode::Public => "public",
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AccessControl {
    pub mode: AccessMode,
    /// Masters granted read access.
    pub read_ids: IndexSet<ElementId>,
    /// Masters granted read-write access.
    pub write_ids: IndexSet<ElementId>,
}

impl AccessControl {
    pub fn can_read(&self, owner: ElementId, caller: ElementId) -> bool {
        owner == caller
            || owner.is_nil()
            || matches!(self.mode, AccessMode::ReadOnly | AccessMode::Public)
            || self.read_ids.contains(&caller)
            || self.write_ids.contains(&caller)
    }

    pub fn can_write(&self, owner: ElementId, caller: ElementId) -> bool {
        owner == caller
            || owner.is_nil()
            || self.mode == AccessMode::Public
            || self.write_ids.contains(&caller)
    }

    /// Grant `master` read (or read-write) access.
    pub fn give_access(&mut self, master: ElementId, read_write: bool) {
        if read_write {
            self.read_ids.shift_remove(&master);
            self.write_ids.insert(master);
        } else {
            self.write_ids.shift_remove(&master);
            self.read_ids.insert(master);
        }
    }

    /// Revoke any access granted to `master`.
    pub fn remove_access(&mut self, master: ElementId) -> bool {
        let r = self.read_ids.shift_remove(&master);
        let w = self.write_ids.shift_remove(&master);
        r || w
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_private_denies_strangers() {
        let owner = ElementId::new();
        let other = ElementId::new();
        let acl = AccessControl::default();
        assert!(acl.can_read(owner, owner));
        assert!(acl.can_write(owner, owner));
        assert!(!acl.can_read(owner, other));
        assert!(!acl.can_write(owner, other));
    }

    #[test]
    fn test_read_only_and_public() {
        let owner = ElementId::new();
        let other = ElementId::new();
        let mut acl = AccessControl {
            mode: AccessMode::ReadOnly,
            ..Default::default()
        };
        assert!(acl.can_read(owner, other));
        assert!(!acl.can_write(owner, other));
        acl.mode = AccessMode::Public;
        assert!(acl.can_write(owner, other));
    }

    #[test]
    fn test_grants_move_between_lists() {
        let owner = ElementId::new();
        let other = ElementId::new();
        let mut acl = AccessControl::default();
        acl.give_access(other, false);
        assert!(acl.can_read(owner, other));
        assert!(!acl.can_write(owner, other));
        acl.give_access(other, true);
        assert!(acl.can_write(owner, other));
        assert!(acl.read_ids.is_empty());
        assert!(acl.remove_access(other));
        assert!(!acl.can_read(owner, other));
    }

    #[test]
    fn test_nil_owner_is_public() {
        let acl = AccessControl::default();
        assert!(acl.can_write(ElementId::nil(), ElementId::new()));
    }
}
