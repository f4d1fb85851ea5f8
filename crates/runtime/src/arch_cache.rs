//! Compiled architype cache.
//!
//! Lookups are keyed by the sentinel the program runs under, so switching a
//! master's active sentinel never serves architypes from the old one.

use std::collections::HashMap;
use std::sync::Arc;

use tracing::debug;

use jac_foundation::{ArchKind, ElementId};

use crate::architype::Architype;

type Key = (ElementId, ArchKind, String);

#[derive(Debug, Default)]
pub struct ArchCache {
    entries: HashMap<Key, Arc<Architype>>,
}

impl ArchCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, context: ElementId, kind: ArchKind, name: &str) -> Option<Arc<Architype>> {
        self.entries.get(&(context, kind, name.to_string())).cloned()
    }

    pub fn insert(&mut self, context: ElementId, arch: Arc<Architype>) {
        self.entries
            .insert((context, arch.kind, arch.name.clone()), arch);
    }

    /// Drop everything resolved under, or provided by, `sentinel`.
    pub fn invalidate_sentinel(&mut self, sentinel: ElementId) -> usize {
        let before = self.entries.len();
        self.entries
            .retain(|(context, _, _), arch| *context != sentinel && arch.sentinel != sentinel);
        let dropped = before - self.entries.len();
        debug!(%sentinel, dropped, "architype cache invalidated");
        dropped
    }

    /// Empty the cache. Returns the number of entries dropped.
    pub fn flush(&mut self) -> usize {
        let dropped = self.entries.len();
        self.entries.clear();
        dropped
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn arch(name: &str, sentinel: ElementId) -> Arc<Architype> {
        Arc::new(Architype::builtin(ArchKind::Node, name, ElementId::new(), sentinel))
    }

    #[test]
    fn test_keyed_by_context_sentinel() {
        let (a, b) = (ElementId::new(), ElementId::new());
        let mut cache = ArchCache::new();
        cache.insert(a, arch("person", a));
        assert!(cache.get(a, ArchKind::Node, "person").is_some());
        assert!(cache.get(b, ArchKind::Node, "person").is_none());
        assert!(cache.get(a, ArchKind::Edge, "person").is_none());
    }

    #[test]
    fn test_invalidate_and_flush() {
        let (a, b) = (ElementId::new(), ElementId::new());
        let mut cache = ArchCache::new();
        cache.insert(a, arch("x", a));
        // resolved under b through a's owner fallback
        cache.insert(b, arch("y", a));
        cache.insert(b, arch("z", b));
        assert_eq!(cache.invalidate_sentinel(a), 2);
        assert_eq!(cache.len(), 1);
        assert_eq!(cache.flush(), 1);
        assert!(cache.is_empty());
    }
}
