//! Jac Foundation
//!
//! Core primitives shared by every Jac runtime crate: element identifiers,
//! the dynamic [`Value`] model, operator enums with their evaluation rules,
//! and source locations carried through the compiler pipeline.

pub mod ids;
pub mod loc;
pub mod operators;
pub mod value;

pub use ids::ElementId;
pub use loc::SourceLoc;
pub use operators::{BinaryOp, CmpOp, IncOp, LogicalOp, UnaryOp};
pub use value::{JacType, Value, ValueError};

use serde::{Deserialize, Serialize};

/// Kind of a compiled architype.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ArchKind {
    /// Graph vertex class.
    Node,
    /// Graph edge class.
    Edge,
    /// Traversal process class.
    Walker,
    /// Static sub-graph template.
    Graph,
}

impl ArchKind {
    /// Keyword used for this kind in source (`node`, `edge`, ...).
    pub fn keyword(&self) -> &'static str {
        match self {
            ArchKind::Node => "node",
            ArchKind::Edge => "edge",
            ArchKind::Walker => "walker",
            ArchKind::Graph => "graph",
        }
    }
}

impl std::fmt::Display for ArchKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.keyword())
    }
}

impl std::str::FromStr for ArchKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "node" => Ok(ArchKind::Node),
            "edge" => Ok(ArchKind::Edge),
            "walker" => Ok(ArchKind::Walker),
            "graph" => Ok(ArchKind::Graph),
            other => Err(format!("unknown architype kind '{other}'")),
        }
    }
}
