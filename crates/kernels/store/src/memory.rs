//! In-memory store with a write-behind durable tier.
//!
//! Reads are served from the in-memory map and fall through to the
//! [`Backend`] on a miss. Writes land in memory immediately and, when asked
//! to reach all caches, are queued in the pending-save list until
//! [`commit`](GraphStore::commit) encodes them into the backend.

use std::collections::{HashMap, HashSet};

use indexmap::{IndexMap, IndexSet};
use tracing::{debug, error, warn};

use jac_foundation::ElementId;

use crate::element::Element;
use crate::error::{Result, StoreError};
use crate::store::GraphStore;

/// Durable key-value tier behind a [`MemoryStore`].
pub trait Backend {
    fn put(&mut self, id: ElementId, record: Vec<u8>) -> Result<()>;
    fn fetch(&self, id: ElementId) -> Result<Option<Vec<u8>>>;
    fn delete(&mut self, id: ElementId) -> Result<()>;
    fn put_glob(&mut self, name: &str, value: &str) -> Result<()>;
    fn fetch_glob(&self, name: &str) -> Result<Option<String>>;
    fn delete_glob(&mut self, name: &str) -> Result<()>;
    fn glob_names(&self) -> Result<Vec<String>>;
}

/// Backend that keeps encoded records in a map.
#[derive(Debug, Default, Clone)]
pub struct MemoryBackend {
    records: HashMap<ElementId, Vec<u8>>,
    globs: IndexMap<String, String>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

impl Backend for MemoryBackend {
    fn put(&mut self, id: ElementId, record: Vec<u8>) -> Result<()> {
        self.records.insert(id, record);
        Ok(())
    }

    fn fetch(&self, id: ElementId) -> Result<Option<Vec<u8>>> {
        Ok(self.records.get(&id).cloned())
    }

    fn delete(&mut self, id: ElementId) -> Result<()> {
        self.records.remove(&id);
        Ok(())
    }

    fn put_glob(&mut self, name: &str, value: &str) -> Result<()> {
        self.globs.insert(name.to_string(), value.to_string());
        Ok(())
    }

    fn fetch_glob(&self, name: &str) -> Result<Option<String>> {
        Ok(self.globs.get(name).cloned())
    }

    fn delete_glob(&mut self, name: &str) -> Result<()> {
        self.globs.shift_remove(name);
        Ok(())
    }

    fn glob_names(&self) -> Result<Vec<String>> {
        Ok(self.globs.keys().cloned().collect())
    }
}

pub struct MemoryStore<B: Backend = MemoryBackend> {
    mem: IndexMap<ElementId, Element>,
    globs: IndexMap<String, String>,
    save_obj_list: IndexSet<ElementId>,
    save_glob_list: IndexSet<String>,
    destroyed: HashSet<ElementId>,
    supers: HashSet<ElementId>,
    backend: B,
}

impl MemoryStore<MemoryBackend> {
    pub fn new() -> Self {
        Self::with_backend(MemoryBackend::new())
    }
}

impl Default for MemoryStore<MemoryBackend> {
    fn default() -> Self {
        Self::new()
    }
}

impl<B: Backend> MemoryStore<B> {
    pub fn with_backend(backend: B) -> Self {
        Self {
            mem: IndexMap::new(),
            globs: IndexMap::new(),
            save_obj_list: IndexSet::new(),
            save_glob_list: IndexSet::new(),
            destroyed: HashSet::new(),
            supers: HashSet::new(),
            backend,
        }
    }

    /// Let `id` bypass every access check.
    pub fn grant_super(&mut self, id: ElementId) {
        self.supers.insert(id);
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    /// Drop the in-memory tier, keeping only what was committed.
    pub fn evict_all(&mut self) {
        self.mem.clear();
        self.globs.clear();
        self.save_obj_list.clear();
        self.save_glob_list.clear();
    }

    /// Ids currently queued for commit.
    pub fn pending_ids(&self) -> impl Iterator<Item = &ElementId> {
        self.save_obj_list.iter()
    }

    fn load(&mut self, id: ElementId) -> Option<&Element> {
        if self.destroyed.contains(&id) {
            return None;
        }
        if !self.mem.contains_key(&id) {
            let record = match self.backend.fetch(id) {
                Ok(record) => record?,
                Err(e) => {
                    error!(id = %id, error = %e, "backend fetch failed");
                    return None;
                }
            };
            match bincode::deserialize::<Element>(&record) {
                Ok(element) => {
                    debug!(id = %id, "element loaded from backend");
                    self.mem.insert(id, element);
                }
                Err(e) => {
                    error!(id = %id, error = %StoreError::from(e), "corrupt element record");
                    return None;
                }
            }
        }
        self.mem.get(&id)
    }

    fn readable(&self, caller: ElementId, element: &Element) -> bool {
        self.supers.contains(&caller) || element.access.can_read(element.master, caller)
    }

    fn writable(&self, caller: ElementId, element: &Element) -> bool {
        self.supers.contains(&caller) || element.access.can_write(element.master, caller)
    }
}

impl<B: Backend> GraphStore for MemoryStore<B> {
    fn get(&mut self, caller: ElementId, id: ElementId) -> Option<Element> {
        let element = self.load(id)?.clone();
        if self.readable(caller, &element) {
            Some(element)
        } else {
            debug!(caller = %caller, id = %id, "read access denied");
            None
        }
    }

    fn save(&mut self, caller: ElementId, element: Element, all_caches: bool) -> bool {
        let id = element.id();
        if self.destroyed.contains(&id) {
            error!(caller = %caller, id = %id, "write to destroyed element rejected");
            return false;
        }
        let allowed = match self.load(id).cloned() {
            Some(existing) => self.writable(caller, &existing),
            None => self.writable(caller, &element),
        };
        if !allowed {
            error!(caller = %caller, id = %id, name = %element.name, "write access denied");
            return false;
        }
        self.mem.insert(id, element);
        if all_caches {
            self.save_obj_list.insert(id);
        }
        true
    }

    fn remove(&mut self, caller: ElementId, id: ElementId) -> bool {
        let Some(existing) = self.load(id).cloned() else {
            return false;
        };
        if !self.writable(caller, &existing) {
            error!(caller = %caller, id = %id, name = %existing.name, "destroy access denied");
            return false;
        }
        self.mem.shift_remove(&id);
        self.save_obj_list.shift_remove(&id);
        self.destroyed.insert(id);
        if let Err(e) = self.backend.delete(id) {
            error!(id = %id, error = %e, "backend delete failed");
        }
        true
    }

    fn commit(&mut self) -> usize {
        let mut flushed = 0;
        for id in std::mem::take(&mut self.save_obj_list) {
            let Some(element) = self.mem.get(&id) else {
                continue;
            };
            let written = bincode::serialize(element)
                .map_err(StoreError::from)
                .and_then(|record| self.backend.put(id, record));
            match written {
                Ok(()) => flushed += 1,
                Err(e) => error!(id = %id, error = %e, "commit failed"),
            }
        }
        for name in std::mem::take(&mut self.save_glob_list) {
            let written = match self.globs.get(&name) {
                Some(value) => self.backend.put_glob(&name, value),
                None => continue,
            };
            match written {
                Ok(()) => flushed += 1,
                Err(e) => error!(global = %name, error = %e, "commit failed"),
            }
        }
        // deletes reached the backend in `remove`; tombstones only guard the
        // current batch
        self.destroyed.clear();
        if flushed > 0 {
            debug!(count = flushed, "committed pending writes");
        }
        flushed
    }

    fn pending_count(&self) -> usize {
        self.save_obj_list.len() + self.save_glob_list.len()
    }

    fn object_distribution(&self) -> IndexMap<String, usize> {
        let mut counts = IndexMap::new();
        for element in self.mem.values() {
            *counts.entry(element.kind().as_str().to_string()).or_insert(0) += 1;
        }
        counts.sort_keys();
        counts
    }

    fn is_super(&self, id: ElementId) -> bool {
        self.supers.contains(&id)
    }

    fn get_glob(&mut self, name: &str) -> Option<String> {
        if let Some(value) = self.globs.get(name) {
            return Some(value.clone());
        }
        match self.backend.fetch_glob(name) {
            Ok(Some(value)) => {
                self.globs.insert(name.to_string(), value.clone());
                Some(value)
            }
            Ok(None) => None,
            Err(e) => {
                error!(global = %name, error = %e, "backend fetch failed");
                None
            }
        }
    }

    fn save_glob(&mut self, name: &str, value: String) {
        self.globs.insert(name.to_string(), value);
        self.save_glob_list.insert(name.to_string());
    }

    fn destroy_glob(&mut self, name: &str) -> bool {
        let existed = self.globs.shift_remove(name).is_some();
        self.save_glob_list.shift_remove(name);
        if let Err(e) = self.backend.delete_glob(name) {
            warn!(global = %name, error = %e, "backend delete failed");
        }
        existed
    }

    fn list_glob(&mut self) -> Vec<String> {
        let mut names: IndexSet<String> = self.globs.keys().cloned().collect();
        match self.backend.glob_names() {
            Ok(stored) => names.extend(stored),
            Err(e) => error!(error = %e, "backend listing failed"),
        }
        names.into_iter().collect()
    }

    fn contains(&mut self, id: ElementId) -> bool {
        self.load(id).is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::access::AccessMode;
    use jac_foundation::Value;

    #[test]
    fn test_private_element_invisible_to_other_master() {
        let alice = ElementId::new();
        let bob = ElementId::new();
        let mut store = MemoryStore::new();
        let node = Element::node("secret", alice);
        let id = node.id();
        assert!(store.save(alice, node, true));

        assert!(store.get(alice, id).is_some());
        assert!(store.get(bob, id).is_none());
    }

    #[test]
    fn test_write_requires_grant() {
        let alice = ElementId::new();
        let bob = ElementId::new();
        let mut store = MemoryStore::new();
        let node = Element::node("shared", alice);
        let id = node.id();
        store.save(alice, node, true);

        let mut copy = store.get(alice, id).unwrap();
        copy.context.insert("x".into(), Value::Int(1));
        assert!(!store.save(bob, copy.clone(), true));

        let mut granted = store.get(alice, id).unwrap();
        granted.access.give_access(bob, true);
        assert!(store.save(alice, granted, true));
        assert!(store.save(bob, copy, true));
        assert_eq!(store.get(bob, id).unwrap().context["x"], Value::Int(1));
    }

    #[test]
    fn test_read_only_blocks_foreign_destroy() {
        let alice = ElementId::new();
        let bob = ElementId::new();
        let mut store = MemoryStore::new();
        let mut node = Element::node("board", alice);
        node.set_access(AccessMode::ReadOnly);
        let id = node.id();
        store.save(alice, node, true);
        assert!(store.get(bob, id).is_some());
        assert!(!store.destroy(bob, id));
        assert!(store.destroy(alice, id));
    }

    #[test]
    fn test_destroyed_ids_cannot_be_rewritten() {
        let alice = ElementId::new();
        let mut store = MemoryStore::new();
        let node = Element::node("gone", alice);
        let id = node.id();
        store.save(alice, node.clone(), true);
        assert!(store.destroy(alice, id));
        assert!(!store.save(alice, node, true));
        assert!(!store.contains(id));
    }

    #[test]
    fn test_commit_drops_tombstones() {
        let alice = ElementId::new();
        let mut store = MemoryStore::new();
        let ids: Vec<ElementId> = (0..3)
            .map(|_| {
                let node = Element::node("brief", alice);
                let id = node.id();
                store.save(alice, node, true);
                id
            })
            .collect();
        store.commit();
        for id in ids {
            assert!(store.destroy(alice, id));
        }
        assert_eq!(store.destroyed.len(), 3);
        store.commit();
        assert!(store.destroyed.is_empty());
        assert!(store.backend().is_empty());
    }

    #[test]
    fn test_commit_flushes_and_reloads() {
        let alice = ElementId::new();
        let mut store = MemoryStore::new();
        let mut node = Element::node("kept", alice);
        node.context.insert("n".into(), Value::Int(7));
        let id = node.id();
        store.save(alice, node, true);
        store.save_glob("greeting", "hi".into());
        assert_eq!(store.pending_count(), 2);

        assert_eq!(store.commit(), 2);
        assert_eq!(store.pending_count(), 0);

        store.evict_all();
        let reloaded = store.get(alice, id).unwrap();
        assert_eq!(reloaded.context["n"], Value::Int(7));
        assert_eq!(store.get_glob("greeting").as_deref(), Some("hi"));
    }

    #[test]
    fn test_super_master_bypasses_access() {
        let alice = ElementId::new();
        let admin = ElementId::new();
        let mut store = MemoryStore::new();
        store.grant_super(admin);
        let node = Element::node("private", alice);
        let id = node.id();
        store.save(alice, node, false);
        assert!(store.get(admin, id).is_some());
        assert!(store.is_super(admin));
    }

    #[test]
    fn test_distribution_counts_kinds() {
        let alice = ElementId::new();
        let mut store = MemoryStore::new();
        store.save(alice, Element::node("a", alice), false);
        store.save(alice, Element::node("b", alice), false);
        store.save(alice, Element::walker("w", alice), false);
        let dist = store.object_distribution();
        assert_eq!(dist["node"], 2);
        assert_eq!(dist["walker"], 1);
    }
}
