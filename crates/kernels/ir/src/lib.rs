//! Jac IR - Intermediate Representation
//!
//! Lowers the externally produced parse tree into typed IR that the runtime
//! interprets.
//!
//! Pipeline: parse tree ([`SyntaxNode`]) -> [`Program`] -> runtime architypes

pub mod build;
pub mod escape;
mod lower;
mod syntax;
mod types;

pub use lower::{lower, lower_block, lower_element, lower_expr, IrError};
pub use syntax::SyntaxNode;
pub use types::*;
