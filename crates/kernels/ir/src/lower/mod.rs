//! Parse tree to IR lowering
//!
//! Transforms the [`SyntaxNode`] tree produced by the external parser into
//! the typed [`Program`] the runtime executes.
//!
//! # Overview
//!
//! The tree is already syntactically valid, so lowering is a structural walk:
//!
//! 1. **Declarations** (`decl`): globals, architypes, graphs, walkers, tests
//! 2. **Statements** (`stmt`): control flow and walker actions
//! 3. **Expressions** (`expr`): dispatched by rule name, so any expression
//!    level rule is accepted wherever an expression is expected
//!
//! Bytecode attached to an expression node by the compiler is carried into
//! [`Expr::bytecode`](crate::Expr). A single-child wrapper rule keeps the code
//! of the outermost node that has some.
//!
//! # Errors
//!
//! Lowering fails with [`IrError`] when a rule is not part of the language
//! surface or a node does not have the shape its rule requires.

mod decl;
mod expr;
mod stmt;

#[cfg(test)]
mod tests;

use thiserror::Error;
use tracing::debug;

use jac_foundation::SourceLoc;

use crate::{Block, Decl, Expr, Program, SyntaxNode};

pub use expr::lower_expr;
pub use stmt::lower_block;

/// Errors that can occur while lowering a parse tree.
#[derive(Debug, Error)]
pub enum IrError {
    /// A rule name the lowering does not understand.
    #[error("{loc}: unknown rule '{rule}'")]
    UnknownRule { rule: String, loc: SourceLoc },

    /// A known rule whose children do not match its grammar.
    #[error("{loc}: malformed {rule}: {reason}")]
    Malformed {
        rule: String,
        loc: SourceLoc,
        reason: String,
    },

    /// A literal token that cannot be decoded.
    #[error("{loc}: invalid literal '{text}': {reason}")]
    InvalidLiteral {
        text: String,
        loc: SourceLoc,
        reason: String,
    },

    #[error("invalid parse tree: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, IrError>;

/// Lower a whole `start` tree.
pub fn lower(tree: &SyntaxNode) -> Result<Program> {
    if !tree.is("start") {
        return Err(malformed(tree, "expected a start rule at the root"));
    }
    let mut program = Program::default();
    for kid in &tree.kid {
        match kid.name.as_str() {
            "element" => {
                for element in &kid.kid {
                    program.decls.extend(decl::lower_element(element)?);
                }
            }
            "ver_label" | "EOF" => {}
            _ => program.decls.extend(decl::lower_element(kid)?),
        }
    }
    debug!(decls = program.decls.len(), "lowered program");
    Ok(program)
}

/// Lower a single top-level element.
pub fn lower_element(node: &SyntaxNode) -> Result<Vec<Decl>> {
    decl::lower_element(node)
}

pub(crate) fn malformed(node: &SyntaxNode, reason: impl Into<String>) -> IrError {
    IrError::Malformed {
        rule: node.name.clone(),
        loc: node.loc.clone(),
        reason: reason.into(),
    }
}

pub(crate) fn unknown(node: &SyntaxNode) -> IrError {
    IrError::UnknownRule {
        rule: node.name.clone(),
        loc: node.loc.clone(),
    }
}

pub(crate) fn invalid_literal(node: &SyntaxNode, reason: impl ToString) -> IrError {
    IrError::InvalidLiteral {
        text: node.text().to_string(),
        loc: node.loc.clone(),
        reason: reason.to_string(),
    }
}

/// Child at `index`, or a malformed-rule error.
pub(crate) fn kid(node: &SyntaxNode, index: usize) -> Result<&SyntaxNode> {
    node.kid
        .get(index)
        .ok_or_else(|| malformed(node, format!("missing child {index}")))
}

/// Required named child.
pub(crate) fn required<'a>(node: &'a SyntaxNode, name: &str) -> Result<&'a SyntaxNode> {
    node.child(name)
        .ok_or_else(|| malformed(node, format!("missing {name}")))
}

/// Text of the last `NAME` token among the direct children.
pub(crate) fn last_name(node: &SyntaxNode) -> Result<String> {
    node.kid
        .iter()
        .rev()
        .find(|k| k.is("NAME"))
        .map(|k| k.text().to_string())
        .ok_or_else(|| malformed(node, "missing NAME"))
}

/// `NAME (COMMA NAME)*`
pub(crate) fn name_list(node: &SyntaxNode) -> Vec<String> {
    node.children("NAME").map(|k| k.text().to_string()).collect()
}

/// Lower an optional `code_block` child.
pub(crate) fn opt_block(node: Option<&SyntaxNode>) -> Result<Option<Block>> {
    node.map(lower_block).transpose()
}

pub(crate) fn expr_at(node: &SyntaxNode, index: usize) -> Result<Expr> {
    lower_expr(kid(node, index)?)
}
