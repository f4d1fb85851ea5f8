//! Node and edge topology on top of a [`GraphStore`].
//!
//! Edges are ordinary elements; nodes keep the ids of attached edges in
//! insertion order. All neighbour queries preserve that order.

use std::collections::{HashSet, VecDeque};

use jac_foundation::ElementId;

use crate::element::Element;
use crate::store::GraphStore;

/// Direction filter for edge queries, relative to the queried node.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EdgeDirection {
    /// Edges leaving the node, plus bidirected ones.
    Outbound,
    /// Edges entering the node, plus bidirected ones.
    Inbound,
    /// Every attached edge.
    Any,
}

/// Orientation of a newly created edge relative to `(left, right)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectDirection {
    /// `left ++> right`
    To,
    /// `left <++ right`
    From,
    /// `left <++> right`
    Any,
}

impl EdgeDirection {
    fn admits(&self, node: ElementId, edge: &Element) -> bool {
        let Some(body) = edge.as_edge() else {
            return false;
        };
        match self {
            EdgeDirection::Any => true,
            EdgeDirection::Outbound => body.bidirected || body.from == node,
            EdgeDirection::Inbound => body.bidirected || body.to == node,
        }
    }
}

/// Attach `edge` between `left` and `right`.
///
/// Returns the edge id, or `None` if any write was refused.
pub fn attach<S: GraphStore + ?Sized>(
    store: &mut S,
    caller: ElementId,
    left: ElementId,
    right: ElementId,
    mut edge: Element,
    direction: ConnectDirection,
) -> Option<ElementId> {
    let mut left_node = store.get(caller, left).filter(|e| e.as_node().is_some())?;
    let mut right_node = store.get(caller, right).filter(|e| e.as_node().is_some())?;
    let edge_id = edge.id();
    {
        let body = edge.as_edge_mut()?;
        let (from, to) = match direction {
            ConnectDirection::From => (right, left),
            ConnectDirection::To | ConnectDirection::Any => (left, right),
        };
        body.from = from;
        body.to = to;
        body.bidirected = direction == ConnectDirection::Any;
    }
    if !store.save(caller, edge, true) {
        return None;
    }
    left_node.as_node_mut()?.edge_ids.insert(edge_id);
    if left == right {
        return store.save(caller, left_node, true).then_some(edge_id);
    }
    right_node.as_node_mut()?.edge_ids.insert(edge_id);
    let saved_left = store.save(caller, left_node, true);
    let saved_right = store.save(caller, right_node, true);
    (saved_left && saved_right).then_some(edge_id)
}

/// Edges of `node` admitted by `direction`, in insertion order.
pub fn edges<S: GraphStore + ?Sized>(
    store: &mut S,
    caller: ElementId,
    node: ElementId,
    direction: EdgeDirection,
) -> Vec<Element> {
    let Some(element) = store.get(caller, node) else {
        return Vec::new();
    };
    let Some(body) = element.as_node() else {
        return Vec::new();
    };
    body.edge_ids
        .iter()
        .filter_map(|id| store.get(caller, *id))
        .filter(|edge| direction.admits(node, edge))
        .collect()
}

/// The endpoint of `edge` that is not `node`.
pub fn opposite(edge: &Element, node: ElementId) -> Option<ElementId> {
    let body = edge.as_edge()?;
    if body.from == node {
        Some(body.to)
    } else if body.to == node {
        Some(body.from)
    } else {
        None
    }
}

/// Neighbouring nodes of `node` across edges admitted by `direction`.
pub fn neighbors<S: GraphStore + ?Sized>(
    store: &mut S,
    caller: ElementId,
    node: ElementId,
    direction: EdgeDirection,
) -> Vec<ElementId> {
    edges(store, caller, node, direction)
        .iter()
        .filter_map(|edge| opposite(edge, node))
        .collect()
}

/// Destroy every edge between `left` and `right` accepted by `select`.
///
/// Returns the number of edges removed.
pub fn detach<S, F>(
    store: &mut S,
    caller: ElementId,
    left: ElementId,
    right: ElementId,
    direction: EdgeDirection,
    mut select: F,
) -> usize
where
    S: GraphStore + ?Sized,
    F: FnMut(&Element) -> bool,
{
    let doomed: Vec<ElementId> = edges(store, caller, left, direction)
        .into_iter()
        .filter(|edge| opposite(edge, left) == Some(right))
        .filter(|edge| select(edge))
        .map(|edge| edge.id())
        .collect();
    doomed
        .into_iter()
        .filter(|id| store.destroy(caller, *id))
        .count()
}

/// Every node reachable from `root` over edges in any direction, `root` first.
pub fn reachable<S: GraphStore + ?Sized>(
    store: &mut S,
    caller: ElementId,
    root: ElementId,
) -> Vec<ElementId> {
    let mut seen = HashSet::from([root]);
    let mut order = Vec::new();
    let mut queue = VecDeque::from([root]);
    while let Some(id) = queue.pop_front() {
        order.push(id);
        for next in neighbors(store, caller, id, EdgeDirection::Any) {
            if seen.insert(next) {
                queue.push_back(next);
            }
        }
    }
    order
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryStore;

    fn node(store: &mut MemoryStore, owner: ElementId, name: &str) -> ElementId {
        let element = Element::node(name, owner);
        let id = element.id();
        assert!(store.save(owner, element, true));
        id
    }

    #[test]
    fn test_attach_directions() {
        let owner = ElementId::new();
        let mut store = MemoryStore::new();
        let a = node(&mut store, owner, "a");
        let b = node(&mut store, owner, "b");
        let c = node(&mut store, owner, "c");

        attach(&mut store, owner, a, b, Element::edge("generic", owner), ConnectDirection::To).unwrap();
        attach(&mut store, owner, a, c, Element::edge("generic", owner), ConnectDirection::From).unwrap();

        assert_eq!(neighbors(&mut store, owner, a, EdgeDirection::Outbound), vec![b]);
        assert_eq!(neighbors(&mut store, owner, a, EdgeDirection::Inbound), vec![c]);
        assert_eq!(neighbors(&mut store, owner, a, EdgeDirection::Any), vec![b, c]);
        assert_eq!(neighbors(&mut store, owner, b, EdgeDirection::Inbound), vec![a]);
    }

    #[test]
    fn test_bidirected_edges_count_both_ways() {
        let owner = ElementId::new();
        let mut store = MemoryStore::new();
        let a = node(&mut store, owner, "a");
        let b = node(&mut store, owner, "b");
        attach(&mut store, owner, a, b, Element::edge("generic", owner), ConnectDirection::Any).unwrap();
        assert_eq!(neighbors(&mut store, owner, a, EdgeDirection::Inbound), vec![b]);
        assert_eq!(neighbors(&mut store, owner, b, EdgeDirection::Outbound), vec![a]);
    }

    #[test]
    fn test_detach_and_cascade() {
        let owner = ElementId::new();
        let mut store = MemoryStore::new();
        let a = node(&mut store, owner, "a");
        let b = node(&mut store, owner, "b");
        let c = node(&mut store, owner, "c");
        attach(&mut store, owner, a, b, Element::edge("likes", owner), ConnectDirection::To).unwrap();
        attach(&mut store, owner, a, b, Element::edge("knows", owner), ConnectDirection::To).unwrap();
        attach(&mut store, owner, b, c, Element::edge("generic", owner), ConnectDirection::To).unwrap();

        let removed = detach(&mut store, owner, a, b, EdgeDirection::Any, |e| e.name == "likes");
        assert_eq!(removed, 1);
        assert_eq!(edges(&mut store, owner, a, EdgeDirection::Any).len(), 1);

        assert!(store.destroy(owner, b));
        assert!(edges(&mut store, owner, a, EdgeDirection::Any).is_empty());
        assert!(edges(&mut store, owner, c, EdgeDirection::Any).is_empty());
        assert!(store.get(owner, b).is_none());
    }

    #[test]
    fn test_reachable_visits_each_node_once() {
        let owner = ElementId::new();
        let mut store = MemoryStore::new();
        let a = node(&mut store, owner, "a");
        let b = node(&mut store, owner, "b");
        let c = node(&mut store, owner, "c");
        attach(&mut store, owner, a, b, Element::edge("generic", owner), ConnectDirection::To).unwrap();
        attach(&mut store, owner, b, c, Element::edge("generic", owner), ConnectDirection::To).unwrap();
        attach(&mut store, owner, c, a, Element::edge("generic", owner), ConnectDirection::To).unwrap();
        assert_eq!(reachable(&mut store, owner, a), vec![a, b, c]);
    }
}
