//! Unique identifiers for Jac elements
//!
//! Every persisted element (node, edge, walker, architype, sentinel, master)
//! is addressed by a random 128-bit id. Cross references between elements are
//! always stored as ids, never as owning pointers.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Prefixes accepted when parsing a textual element reference.
const REF_PREFIXES: [&str; 2] = ["urn:uuid:", "jac:uuid:"];

/// Globally unique identifier of a persisted element.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ElementId(Uuid);

impl ElementId {
    /// Allocate a fresh random id.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// The all-zero id.
    ///
    /// Used as the owning master of public elements.
    pub const fn nil() -> Self {
        Self(Uuid::nil())
    }

    /// Check whether this is the all-zero id.
    pub fn is_nil(&self) -> bool {
        self.0.is_nil()
    }

    /// Reference form handed to programs by the `&` operator.
    pub fn urn(&self) -> String {
        format!("urn:uuid:{}", self.0)
    }

    /// Parse a bare or prefixed (`urn:uuid:`, `jac:uuid:`) reference.
    pub fn parse_ref(text: &str) -> Option<Self> {
        let bare = REF_PREFIXES
            .iter()
            .find_map(|prefix| text.strip_prefix(prefix))
            .unwrap_or(text);
        Uuid::parse_str(bare).ok().map(Self)
    }
}

impl Default for ElementId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ElementId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for ElementId {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse_ref(s).ok_or_else(|| format!("'{s}' is not a valid element reference"))
    }
}

impl From<Uuid> for ElementId {
    fn from(id: Uuid) -> Self {
        Self(id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fresh_ids_are_distinct() {
        assert_ne!(ElementId::new(), ElementId::new());
    }

    #[test]
    fn test_parse_ref_accepts_prefixes() {
        let id = ElementId::new();
        assert_eq!(ElementId::parse_ref(&id.urn()), Some(id));
        assert_eq!(ElementId::parse_ref(&format!("jac:uuid:{id}")), Some(id));
        assert_eq!(ElementId::parse_ref(&id.to_string()), Some(id));
        assert_eq!(ElementId::parse_ref("urn:uuid:not-a-uuid"), None);
    }

    #[test]
    fn test_nil_is_public_owner() {
        assert!(ElementId::nil().is_nil());
        assert!(!ElementId::new().is_nil());
    }
}
