//! Statement lowering.

use super::expr::lower_expr;
use super::{expr_at, kid, malformed, name_list, opt_block, required, unknown, Result};
use crate::{Block, CtrlKind, ReportField, Stmt, StmtKind, SyntaxNode, TakeStyle};

/// Lower a `code_block` (or a lone `statement`) into a block.
pub fn lower_block(node: &SyntaxNode) -> Result<Block> {
    match node.name.as_str() {
        "code_block" => node.children("statement").map(lower_stmt).collect(),
        "statement" => Ok(vec![lower_stmt(node)?]),
        _ => Err(unknown(node)),
    }
}

pub(crate) fn lower_stmt(node: &SyntaxNode) -> Result<Stmt> {
    let inner = if node.is("statement") { kid(node, 0)? } else { node };
    Ok(Stmt {
        kind: stmt_kind(inner)?,
        loc: inner.loc.clone(),
    })
}

fn boxed(node: &SyntaxNode) -> Result<Box<Stmt>> {
    lower_stmt(node).map(Box::new)
}

fn stmt_kind(node: &SyntaxNode) -> Result<StmtKind> {
    match node.name.as_str() {
        "code_block" => Ok(StmtKind::Block(lower_block(node)?)),
        "node_ctx_block" => Ok(StmtKind::NodeContext {
            archs: name_list(required(node, "name_list")?),
            body: lower_block(required(node, "code_block")?)?,
        }),
        "expression" => Ok(StmtKind::Expr(lower_expr(node)?)),
        "if_stmt" => if_stmt(node),
        "try_stmt" => {
            let handler = node.child("else_from_try");
            Ok(StmtKind::Try {
                body: lower_block(required(node, "code_block")?)?,
                binding: handler
                    .and_then(|h| h.child("NAME"))
                    .map(|n| n.text().to_string()),
                otherwise: handler
                    .map(|h| lower_block(required(h, "code_block")?))
                    .transpose()?,
            })
        }
        "for_stmt" => for_stmt(node),
        "while_stmt" => Ok(StmtKind::While {
            cond: expr_at(node, 1)?,
            body: lower_block(required(node, "code_block")?)?,
        }),
        "ctrl_stmt" => match kid(node, 0)?.name.as_str() {
            "KW_BREAK" => Ok(StmtKind::Ctrl(CtrlKind::Break)),
            "KW_CONTINUE" => Ok(StmtKind::Ctrl(CtrlKind::Continue)),
            "KW_SKIP" => Ok(StmtKind::Ctrl(CtrlKind::Skip)),
            _ => Err(malformed(node, "unknown control keyword")),
        },
        "assert_stmt" => Ok(StmtKind::Assert(expr_at(node, 1)?)),
        "destroy_action" => Ok(StmtKind::Destroy(expr_at(node, 1)?)),
        "report_action" => report(node),
        "walker_action" => stmt_kind(kid(node, 0)?),
        "ignore_action" => Ok(StmtKind::Ignore(expr_at(node, 1)?)),
        "take_action" => take(node),
        "disengage_action" => Ok(StmtKind::Disengage(
            node.child("report_action").map(boxed).transpose()?,
        )),
        "yield_action" => {
            let action = node
                .kid
                .iter()
                .find(|k| matches!(k.name.as_str(), "report_action" | "disengage_action" | "take_action"));
            Ok(StmtKind::Yield(action.map(boxed).transpose()?))
        }
        _ => Err(unknown(node)),
    }
}

/// `KW_IF expression code_block elif_stmt* else_stmt?`
fn if_stmt(node: &SyntaxNode) -> Result<StmtKind> {
    let elifs = node
        .children("elif_stmt")
        .map(|elif| Ok((expr_at(elif, 1)?, lower_block(required(elif, "code_block")?)?)))
        .collect::<Result<Vec<_>>>()?;
    let otherwise = node
        .child("else_stmt")
        .map(|e| lower_block(required(e, "code_block")?))
        .transpose()?;
    Ok(StmtKind::If {
        cond: expr_at(node, 1)?,
        then: lower_block(required(node, "code_block")?)?,
        elifs,
        otherwise,
    })
}

fn for_stmt(node: &SyntaxNode) -> Result<StmtKind> {
    let body = lower_block(required(node, "code_block")?)?;
    if node.has("KW_TO") {
        return Ok(StmtKind::ForTo {
            init: expr_at(node, 1)?,
            cond: expr_at(node, 3)?,
            step: expr_at(node, 5)?,
            body,
        });
    }
    let iter = lower_expr(required(node, "expression")?)?;
    match name_list(node).as_slice() {
        [var] => Ok(StmtKind::ForIn {
            var: var.clone(),
            iter,
            body,
        }),
        [key, value] => Ok(StmtKind::ForKeyValue {
            key: key.clone(),
            value: value.clone(),
            iter,
            body,
        }),
        _ => Err(malformed(node, "expected one or two loop variables")),
    }
}

/// `KW_REPORT expression SEMI | KW_REPORT COLON NAME EQ expression SEMI`
fn report(node: &SyntaxNode) -> Result<StmtKind> {
    let value = lower_expr(required(node, "expression")?)?;
    let Some(field) = node.child("NAME") else {
        return Ok(StmtKind::Report(value));
    };
    let field = match field.text() {
        "status" | "status_code" => ReportField::Status,
        "custom" => ReportField::Custom,
        "file" => ReportField::File,
        "error" => ReportField::Error,
        other => return Err(malformed(node, format!("invalid report field '{other}'"))),
    };
    Ok(StmtKind::ReportField { field, value })
}

/// `KW_TAKE (COLON NAME)? expression (SEMI | else_stmt)`
fn take(node: &SyntaxNode) -> Result<StmtKind> {
    let style = match node.child("NAME").map(|n| n.text()) {
        None | Some("b") | Some("bfs") => TakeStyle::Bfs,
        Some("d") | Some("dfs") => TakeStyle::Dfs,
        Some(other) => return Err(malformed(node, format!("invalid take style '{other}'"))),
    };
    let otherwise = match node.child("else_stmt") {
        Some(e) => opt_block(e.child("code_block"))?,
        None => None,
    };
    Ok(StmtKind::Take {
        style,
        target: lower_expr(required(node, "expression")?)?,
        otherwise,
    })
}
