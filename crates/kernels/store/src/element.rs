//! Element records held by the store.
//!
//! An [`Element`] is the common header (id, owner, access, context) plus a
//! kind-specific [`Body`]. Bodies reference other elements by id only.

use std::collections::VecDeque;

use chrono::{DateTime, Utc};
use indexmap::{IndexMap, IndexSet};
use serde::{Deserialize, Serialize};

use jac_foundation::{ArchKind, ElementId, Value};

use crate::access::{AccessControl, AccessMode};

/// Type tag of an element.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ElementKind {
    Node,
    Edge,
    Walker,
    Architype,
    Sentinel,
    Master,
}

impl ElementKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ElementKind::Node => "node",
            ElementKind::Edge => "edge",
            ElementKind::Walker => "walker",
            ElementKind::Architype => "architype",
            ElementKind::Sentinel => "sentinel",
            ElementKind::Master => "master",
        }
    }
}

/// Node topology: attached edge ids in insertion order.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NodeBody {
    pub edge_ids: IndexSet<ElementId>,
}

/// Edge endpoints.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EdgeBody {
    pub from: ElementId,
    pub to: ElementId,
    /// Traversable from either end.
    pub bidirected: bool,
}

/// Resumable traversal state of a walker.
///
/// Everything a yielded walker needs to continue on the next run lives here,
/// so the walker can be persisted between runs like any other element.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WalkerState {
    pub current_node: Option<ElementId>,
    pub next_node_ids: VecDeque<ElementId>,
    pub ignore_node_ids: IndexSet<ElementId>,
    pub destroy_node_ids: IndexSet<ElementId>,
    pub current_step: u64,
    pub yielded: bool,
    /// Bounded trail of visited nodes.
    pub history: Vec<ElementId>,
}

impl WalkerState {
    /// Append to the back of the queue.
    ///
    /// Returns whether the queue grew.
    pub fn queue_back(&mut self, id: ElementId, allow_dups: bool) -> bool {
        if !allow_dups && self.next_node_ids.contains(&id) {
            return false;
        }
        self.next_node_ids.push_back(id);
        true
    }

    /// Push to the front of the queue.
    pub fn queue_front(&mut self, id: ElementId, allow_dups: bool) -> bool {
        if !allow_dups && self.next_node_ids.contains(&id) {
            return false;
        }
        self.next_node_ids.push_front(id);
        true
    }

    /// Reset everything except the element identity.
    pub fn clear(&mut self) {
        *self = WalkerState::default();
    }
}

/// Store record of a compiled architype. The compiled body lives with the
/// owning sentinel in the runtime.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArchitypeBody {
    pub arch_kind: ArchKind,
    pub sentinel: ElementId,
    /// Canonical record this one was copied from for a foreign master.
    #[serde(default)]
    pub copy_of: Option<ElementId>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SentinelBody {
    pub arch_ids: IndexSet<ElementId>,
    pub is_active: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MasterBody {
    pub active_sentinel: Option<ElementId>,
    /// Yielded walkers kept for resumption, by walker name.
    pub yielded_walkers: IndexMap<String, ElementId>,
    /// Graph roots created by this master.
    pub graphs: IndexSet<ElementId>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Body {
    Node(NodeBody),
    Edge(EdgeBody),
    Walker(WalkerState),
    Architype(ArchitypeBody),
    Sentinel(SentinelBody),
    Master(MasterBody),
}

/// A persisted graph element.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Element {
    id: ElementId,
    /// Architype name (`generic` for untyped nodes and edges).
    pub name: String,
    /// Owning master.
    pub master: ElementId,
    /// Containing element, if any.
    pub parent: Option<ElementId>,
    pub timestamp: DateTime<Utc>,
    pub access: AccessControl,
    pub context: IndexMap<String, Value>,
    pub body: Body,
}

impl Element {
    pub fn new(name: impl Into<String>, master: ElementId, body: Body) -> Self {
        Self {
            id: ElementId::new(),
            name: name.into(),
            master,
            parent: None,
            timestamp: Utc::now(),
            access: AccessControl::default(),
            context: IndexMap::new(),
            body,
        }
    }

    pub fn node(name: impl Into<String>, master: ElementId) -> Self {
        Self::new(name, master, Body::Node(NodeBody::default()))
    }

    /// Unattached edge; endpoints are filled in on attach.
    pub fn edge(name: impl Into<String>, master: ElementId) -> Self {
        Self::new(
            name,
            master,
            Body::Edge(EdgeBody {
                from: ElementId::nil(),
                to: ElementId::nil(),
                bidirected: false,
            }),
        )
    }

    pub fn walker(name: impl Into<String>, master: ElementId) -> Self {
        Self::new(name, master, Body::Walker(WalkerState::default()))
    }

    pub fn architype(
        kind: ArchKind,
        name: impl Into<String>,
        master: ElementId,
        sentinel: ElementId,
    ) -> Self {
        let mut element = Self::new(
            name,
            master,
            Body::Architype(ArchitypeBody {
                arch_kind: kind,
                sentinel,
                copy_of: None,
            }),
        );
        element.parent = Some(sentinel);
        element
    }

    pub fn sentinel(name: impl Into<String>, master: ElementId) -> Self {
        Self::new(name, master, Body::Sentinel(SentinelBody::default()))
    }

    /// A master owns itself.
    pub fn master(name: impl Into<String>) -> Self {
        let mut element = Self::new(name, ElementId::nil(), Body::Master(MasterBody::default()));
        element.master = element.id;
        element
    }

    pub fn id(&self) -> ElementId {
        self.id
    }

    /// Copy with a fresh id and a new owner.
    ///
    /// Topology is not copied: a duplicated node starts unattached.
    pub fn duplicate(&self, master: ElementId) -> Self {
        let mut copy = self.clone();
        copy.id = ElementId::new();
        copy.master = master;
        copy.timestamp = Utc::now();
        copy.access = AccessControl::default();
        match &mut copy.body {
            Body::Node(node) => node.edge_ids.clear(),
            Body::Edge(edge) => {
                edge.from = ElementId::nil();
                edge.to = ElementId::nil();
            }
            Body::Walker(state) => state.clear(),
            Body::Architype(arch) => {
                arch.copy_of.get_or_insert(self.id);
            }
            _ => {}
        }
        copy
    }

    /// Caller-owned architype copy backing this instance, destroyed with it.
    pub fn private_architype(&self, record: &Element) -> bool {
        record.master == self.master
            && matches!(&record.body, Body::Architype(arch) if arch.copy_of.is_some())
    }

    pub fn kind(&self) -> ElementKind {
        match self.body {
            Body::Node(_) => ElementKind::Node,
            Body::Edge(_) => ElementKind::Edge,
            Body::Walker(_) => ElementKind::Walker,
            Body::Architype(_) => ElementKind::Architype,
            Body::Sentinel(_) => ElementKind::Sentinel,
            Body::Master(_) => ElementKind::Master,
        }
    }

    /// Architype kind this element is an instance of, if any.
    pub fn arch_kind(&self) -> Option<ArchKind> {
        match &self.body {
            Body::Node(_) => Some(ArchKind::Node),
            Body::Edge(_) => Some(ArchKind::Edge),
            Body::Walker(_) => Some(ArchKind::Walker),
            Body::Architype(arch) => Some(arch.arch_kind),
            _ => None,
        }
    }

    pub fn touch(&mut self) {
        self.timestamp = Utc::now();
    }

    pub fn set_access(&mut self, mode: AccessMode) {
        self.access.mode = mode;
    }

    pub fn as_node(&self) -> Option<&NodeBody> {
        match &self.body {
            Body::Node(node) => Some(node),
            _ => None,
        }
    }

    pub fn as_node_mut(&mut self) -> Option<&mut NodeBody> {
        match &mut self.body {
            Body::Node(node) => Some(node),
            _ => None,
        }
    }

    pub fn as_edge(&self) -> Option<&EdgeBody> {
        match &self.body {
            Body::Edge(edge) => Some(edge),
            _ => None,
        }
    }

    pub fn as_edge_mut(&mut self) -> Option<&mut EdgeBody> {
        match &mut self.body {
            Body::Edge(edge) => Some(edge),
            _ => None,
        }
    }

    pub fn as_walker(&self) -> Option<&WalkerState> {
        match &self.body {
            Body::Walker(state) => Some(state),
            _ => None,
        }
    }

    pub fn as_walker_mut(&mut self) -> Option<&mut WalkerState> {
        match &mut self.body {
            Body::Walker(state) => Some(state),
            _ => None,
        }
    }

    pub fn as_sentinel_mut(&mut self) -> Option<&mut SentinelBody> {
        match &mut self.body {
            Body::Sentinel(sentinel) => Some(sentinel),
            _ => None,
        }
    }

    pub fn as_master(&self) -> Option<&MasterBody> {
        match &self.body {
            Body::Master(master) => Some(master),
            _ => None,
        }
    }

    pub fn as_master_mut(&mut self) -> Option<&mut MasterBody> {
        match &mut self.body {
            Body::Master(master) => Some(master),
            _ => None,
        }
    }

    /// Ids owned through containment, destroyed together with this element.
    pub fn owned_ids(&self) -> Vec<ElementId> {
        match &self.body {
            Body::Node(node) => node.edge_ids.iter().copied().collect(),
            Body::Sentinel(sentinel) => sentinel.arch_ids.iter().copied().collect(),
            _ => Vec::new(),
        }
    }

    /// Summary used by the `.info` built-in.
    pub fn info(&self) -> IndexMap<String, Value> {
        let mut info = IndexMap::new();
        info.insert("name".to_string(), Value::str(&self.name));
        info.insert("kind".to_string(), Value::str(self.kind().as_str()));
        info.insert("jid".to_string(), Value::str(self.id.urn()));
        info.insert("j_timestamp".to_string(), Value::str(self.timestamp.to_rfc3339()));
        info.insert("j_type".to_string(), Value::str(self.kind().as_str()));
        info.insert("j_access".to_string(), Value::str(self.access.mode.as_str()));
        info
    }

    /// `.info` plus context, used by the `.details` built-in.
    pub fn details(&self) -> IndexMap<String, Value> {
        let mut details = self.info();
        details.insert("context".to_string(), Value::Dict(self.context.clone()));
        if let Body::Edge(edge) = &self.body {
            details.insert("from_node_id".to_string(), Value::str(edge.from.urn()));
            details.insert("to_node_id".to_string(), Value::str(edge.to.urn()));
            details.insert("bidirected".to_string(), Value::Bool(edge.bidirected));
        }
        details
    }
}
