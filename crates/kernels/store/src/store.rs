//! The persistence boundary used by the interpreter.

use indexmap::IndexMap;
use tracing::debug;

use jac_foundation::ElementId;

use crate::element::{Body, Element};

/// Access-checked element storage.
///
/// Reads that fail an access check return `None`; writes that fail are logged
/// and skipped. Neither is an error for the caller. Destroyed ids leave the
/// addressable id space and can never be written again.
pub trait GraphStore {
    /// Fetch a copy of an element if it exists and `caller` may read it.
    fn get(&mut self, caller: ElementId, id: ElementId) -> Option<Element>;

    /// Store `element` on behalf of `caller`.
    ///
    /// With `all_caches` the element is also queued for the next
    /// [`commit`](GraphStore::commit). Returns whether the write happened.
    fn save(&mut self, caller: ElementId, element: Element, all_caches: bool) -> bool;

    /// Remove a single element without cascading.
    fn remove(&mut self, caller: ElementId, id: ElementId) -> bool;

    /// Flush pending writes to the durable tier. Returns the number flushed.
    fn commit(&mut self) -> usize;

    /// Number of writes waiting for the next commit.
    fn pending_count(&self) -> usize;

    /// Count of cached elements per kind.
    fn object_distribution(&self) -> IndexMap<String, usize>;

    /// Whether `id` bypasses access checks.
    fn is_super(&self, id: ElementId) -> bool;

    fn get_glob(&mut self, name: &str) -> Option<String>;

    fn save_glob(&mut self, name: &str, value: String);

    fn destroy_glob(&mut self, name: &str) -> bool;

    fn list_glob(&mut self) -> Vec<String>;

    /// Whether `id` is addressable (ignores access control).
    fn contains(&mut self, id: ElementId) -> bool;

    /// Destroy an element and everything it contains.
    ///
    /// Nodes take their edges with them, sentinels their architype records,
    /// and instances spawned for a foreign master their private architype copy.
    /// Destroying an edge detaches it from both endpoints.
    fn destroy(&mut self, caller: ElementId, id: ElementId) -> bool {
        let Some(element) = self.get(caller, id) else {
            return false;
        };
        for owned in element.owned_ids() {
            self.destroy(caller, owned);
        }
        if let Some(record) = element.parent.and_then(|p| self.get(caller, p)) {
            if element.private_architype(&record) {
                self.remove(caller, record.id());
            }
        }
        if let Body::Edge(edge) = &element.body {
            for end in [edge.from, edge.to] {
                if let Some(mut node) = self.get(caller, end) {
                    if let Some(body) = node.as_node_mut() {
                        if body.edge_ids.shift_remove(&id) {
                            self.save(caller, node, true);
                        }
                    }
                }
            }
        }
        let removed = self.remove(caller, id);
        if removed {
            debug!(id = %id, kind = element.kind().as_str(), "element destroyed");
        }
        removed
    }
}
