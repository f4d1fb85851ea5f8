//! Jac Object Graph Store
//!
//! Holds every persisted element of a Jac program (nodes, edges, walkers,
//! architype and sentinel records, masters) in an arena keyed by
//! [`ElementId`]. Elements only reference each other through ids, so the
//! graph can be cyclic without any ownership cycles.
//!
//! All reads and writes go through the access-checked [`GraphStore`]
//! contract. [`MemoryStore`] is the in-memory implementation: a write-behind
//! cache over a pluggable durable [`Backend`].

pub mod access;
pub mod element;
pub mod error;
pub mod graph;
pub mod memory;
pub mod store;

pub use access::{AccessControl, AccessMode};
pub use element::{
    ArchitypeBody, Body, EdgeBody, Element, ElementKind, MasterBody, NodeBody, SentinelBody,
    WalkerState,
};
pub use error::{Result, StoreError};
pub use graph::{ConnectDirection, EdgeDirection};
pub use memory::{Backend, MemoryBackend, MemoryStore};
pub use store::GraphStore;

pub use jac_foundation::ElementId;
