//! Expression lowering.

use jac_foundation::{BinaryOp, CmpOp, IncOp, JacType, LogicalOp, UnaryOp, Value};

use super::{expr_at, invalid_literal, kid, last_name, malformed, name_list, required, unknown, Result};
use crate::escape::string_token;
use crate::{
    AssignOp, Builtin, ConnectOp, Direction, Expr, ExprKind, Filter, GlobalRef, MethodFamily,
    RefStep, SpawnExpr, SyntaxNode,
};

/// Lower any expression-level rule or literal terminal.
pub fn lower_expr(node: &SyntaxNode) -> Result<Expr> {
    let mut expr = lower_node(node)?;
    if node.bytecode.is_some() {
        expr.bytecode = node.bytecode.clone();
    }
    Ok(expr)
}

fn lower_node(node: &SyntaxNode) -> Result<Expr> {
    let passthrough = matches!(
        node.name.as_str(),
        "expression" | "connect" | "logical" | "compare" | "arithmetic" | "term" | "factor" | "power"
    );
    if passthrough && node.kid.len() == 1 {
        return lower_expr(&node.kid[0]);
    }
    let kind = match node.name.as_str() {
        "expression" => return expression(node),
        "connect" => return connect(node),
        "logical" => fold(node, |op| match op.name.as_str() {
            "KW_AND" => Ok(Fold::Logical(LogicalOp::And)),
            "KW_OR" => Ok(Fold::Logical(LogicalOp::Or)),
            _ => Err(unknown(op)),
        })?,
        "compare" => {
            if kid(node, 0)?.is("NOT") {
                ExprKind::Unary {
                    op: UnaryOp::Not,
                    operand: Box::new(expr_at(node, 1)?),
                }
            } else {
                fold(node, |op| Ok(Fold::Compare(cmp_op(op)?)))?
            }
        }
        "arithmetic" | "term" | "power" => {
            fold(node, |op| Ok(Fold::Binary(binary_op(op)?)))?
        }
        "factor" => {
            let operand = expr_at(node, 1)?;
            match kid(node, 0)?.name.as_str() {
                "MINUS" => ExprKind::Unary {
                    op: UnaryOp::Neg,
                    operand: Box::new(operand),
                },
                "PLUS" => return Ok(operand),
                _ => return Err(malformed(node, "expected a sign")),
            }
        }
        "atom" => return atom(node),
        "global_ref" => ExprKind::Global(global_ref(node)?),
        "node_edge_ref" => {
            let mut steps = Vec::new();
            ref_steps(node, &mut steps)?;
            ExprKind::EdgeRef(steps)
        }
        "edge_ref" => ExprKind::EdgeRef(vec![edge_step(node)?]),
        "list_val" => ExprKind::List(match node.child("expr_list") {
            Some(list) => expr_list(list)?,
            None => Vec::new(),
        }),
        "dict_val" => ExprKind::Dict(
            node.children("kv_pair")
                .map(kv_pair)
                .collect::<Result<Vec<_>>>()?,
        ),
        "spawn" => ExprKind::Spawn(Box::new(spawn(required(node, "spawn_object")?)?)),
        "ref" => ExprKind::Ref(Box::new(last_expr(node)?)),
        "deref" => ExprKind::Deref(Box::new(last_expr(node)?)),
        "any_type" => ExprKind::Type(any_type(node)?),
        "multistring" => {
            let mut text = String::new();
            for token in &node.kid {
                text.push_str(&string_token(token.text()).map_err(|e| invalid_literal(token, e))?);
            }
            ExprKind::Literal(Value::Str(text))
        }
        "STRING" => ExprKind::Literal(Value::Str(
            string_token(node.text()).map_err(|e| invalid_literal(node, e))?,
        )),
        "INT" => ExprKind::Literal(Value::Int(
            node.text().parse().map_err(|e| invalid_literal(node, e))?,
        )),
        "FLOAT" => ExprKind::Literal(Value::Float(
            node.text().parse().map_err(|e| invalid_literal(node, e))?,
        )),
        "BOOL" => ExprKind::Literal(Value::Bool(node.text() == "true")),
        "NULL" => ExprKind::Literal(Value::Null),
        "NAME" => ExprKind::Name(node.text().to_string()),
        _ => return Err(unknown(node)),
    };
    Ok(Expr::new(kind, node.loc.clone()))
}

fn last_expr(node: &SyntaxNode) -> Result<Expr> {
    expr_at(node, node.kid.len().saturating_sub(1))
}

/// `connect (assignment | copy_assign | inc_assign)?`
fn expression(node: &SyntaxNode) -> Result<Expr> {
    let target = expr_at(node, 0)?;
    let assign = kid(node, 1)?;
    let op = match assign.name.as_str() {
        "assignment" => AssignOp::Assign,
        "copy_assign" => AssignOp::Copy,
        "inc_assign" => AssignOp::Inc(inc_op(kid(assign, 0)?)?),
        _ => return Err(unknown(assign)),
    };
    let value = expr_at(assign, 1)?;
    Ok(Expr::new(
        ExprKind::Assign {
            op,
            target: Box::new(target),
            value: Box::new(value),
        },
        node.loc.clone(),
    ))
}

fn inc_op(token: &SyntaxNode) -> Result<IncOp> {
    match token.name.as_str() {
        "PEQ" => Ok(IncOp::Add),
        "MEQ" => Ok(IncOp::Sub),
        "TEQ" => Ok(IncOp::Mul),
        "DEQ" => Ok(IncOp::Div),
        _ => Err(unknown(token)),
    }
}

/// `logical ((NOT edge_ref | connect_op) expression)?`
fn connect(node: &SyntaxNode) -> Result<Expr> {
    let lhs = Box::new(expr_at(node, 0)?);
    let op = kid(node, 1)?;
    let kind = if op.is("NOT") {
        ExprKind::Disconnect {
            lhs,
            edge: edge_step(kid(node, 2)?)?,
            rhs: Box::new(expr_at(node, 3)?),
        }
    } else {
        ExprKind::Connect {
            lhs,
            op: connect_op(op)?,
            rhs: Box::new(expr_at(node, 2)?),
        }
    };
    Ok(Expr::new(kind, node.loc.clone()))
}

enum Fold {
    Logical(LogicalOp),
    Compare(CmpOp),
    Binary(BinaryOp),
}

/// Left fold of `operand (op operand)*`.
fn fold(node: &SyntaxNode, op_of: impl Fn(&SyntaxNode) -> Result<Fold>) -> Result<ExprKind> {
    let mut acc = expr_at(node, 0)?;
    let rest = &node.kid[1..];
    if rest.len() % 2 != 0 {
        return Err(malformed(node, "operator without operand"));
    }
    for pair in rest.chunks(2) {
        let lhs = Box::new(acc);
        let rhs = Box::new(lower_expr(&pair[1])?);
        let kind = match op_of(&pair[0])? {
            Fold::Logical(op) => ExprKind::Logical { op, lhs, rhs },
            Fold::Compare(op) => ExprKind::Compare { op, lhs, rhs },
            Fold::Binary(op) => ExprKind::Binary { op, lhs, rhs },
        };
        acc = Expr::new(kind, pair[0].loc.clone());
    }
    Ok(acc.kind)
}

pub(crate) fn cmp_op(node: &SyntaxNode) -> Result<CmpOp> {
    let token = if node.is("cmp_op") { kid(node, 0)? } else { node };
    match token.name.as_str() {
        "EE" => Ok(CmpOp::Eq),
        "NE" => Ok(CmpOp::Ne),
        "LT" => Ok(CmpOp::Lt),
        "GT" => Ok(CmpOp::Gt),
        "LTE" => Ok(CmpOp::Le),
        "GTE" => Ok(CmpOp::Ge),
        "KW_IN" => Ok(CmpOp::In),
        "nin" => Ok(CmpOp::NotIn),
        _ => Err(unknown(token)),
    }
}

fn binary_op(token: &SyntaxNode) -> Result<BinaryOp> {
    match token.name.as_str() {
        "PLUS" => Ok(BinaryOp::Add),
        "MINUS" => Ok(BinaryOp::Sub),
        "STAR_MUL" => Ok(BinaryOp::Mul),
        "DIV" => Ok(BinaryOp::Div),
        "MOD" => Ok(BinaryOp::Mod),
        "POW" => Ok(BinaryOp::Pow),
        _ => Err(unknown(token)),
    }
}

fn atom(node: &SyntaxNode) -> Result<Expr> {
    let first = kid(node, 0)?;
    match first.name.as_str() {
        "LPAREN" => expr_at(node, 1),
        "KW_SYNC" => expr_at(node, 1),
        "ability_op" => Ok(Expr::new(
            ExprKind::AbilityCall {
                target: None,
                arch: ability_arch(first),
                name: last_name(node)?,
                ctx: spawn_ctx_opt(node)?,
            },
            node.loc.clone(),
        )),
        "atom" => {
            let mut base = lower_expr(first)?;
            for trailer in &node.kid[1..] {
                base = atom_trailer(base, trailer)?;
            }
            Ok(base)
        }
        _ if node.kid.len() == 1 => lower_expr(first),
        _ => Err(malformed(node, format!("unexpected {}", first.name))),
    }
}

fn atom_trailer(base: Expr, node: &SyntaxNode) -> Result<Expr> {
    let loc = node.loc.clone();
    let base = Box::new(base);
    let first = kid(node, 0)?;
    let kind = match first.name.as_str() {
        "DOT" => {
            let member = kid(node, 1)?;
            match member.name.as_str() {
                "built_in" => ExprKind::Builtin {
                    base,
                    op: built_in(member)?,
                },
                "NAME" => ExprKind::Field {
                    base,
                    name: member.text().to_string(),
                },
                _ => return Err(unknown(member)),
            }
        }
        "index_slice" => {
            let start = Box::new(expr_at(first, 1)?);
            if first.has("COLON") {
                ExprKind::Slice {
                    base,
                    start,
                    end: Box::new(expr_at(first, 3)?),
                }
            } else {
                ExprKind::Index { base, index: start }
            }
        }
        "ability_call" => {
            let op = kid(first, 0)?;
            if op.is("ability_op") {
                ExprKind::AbilityCall {
                    target: Some(base),
                    arch: ability_arch(op),
                    name: last_name(first)?,
                    ctx: spawn_ctx_opt(first)?,
                }
            } else {
                let (args, kwargs) = match first.child("param_list") {
                    Some(params) => param_list(params)?,
                    None => (Vec::new(), Vec::new()),
                };
                ExprKind::Call {
                    callee: base,
                    args,
                    kwargs,
                }
            }
        }
        _ => return Err(unknown(first)),
    };
    Ok(Expr::new(kind, loc))
}

/// `DBL_COLON | DBL_COLON NAME COLON`
fn ability_arch(node: &SyntaxNode) -> Option<String> {
    node.child("NAME").map(|n| n.text().to_string())
}

fn built_in(node: &SyntaxNode) -> Result<Builtin> {
    let inner = kid(node, 0)?;
    match inner.name.as_str() {
        "cast_built_in" => Ok(Builtin::Cast(any_type(kid(inner, 0)?)?)),
        "obj_built_in" => match kid(inner, 0)?.name.as_str() {
            "KW_CONTEXT" => Ok(Builtin::Context),
            "KW_INFO" => Ok(Builtin::Info),
            "KW_DETAILS" => Ok(Builtin::Details),
            _ => Err(malformed(inner, "unknown object built-in")),
        },
        "dict_built_in" => {
            if inner.has("KW_KEYS") {
                Ok(Builtin::Keys)
            } else if let Some(names) = inner.child("name_list") {
                Ok(Builtin::Pluck(name_list(names)))
            } else {
                method(inner, MethodFamily::Dict)
            }
        }
        "list_built_in" => {
            if inner.has("KW_LENGTH") {
                Ok(Builtin::Length)
            } else {
                method(inner, MethodFamily::List)
            }
        }
        "string_built_in" => method(inner, MethodFamily::Str),
        _ => Err(unknown(inner)),
    }
}

fn method(node: &SyntaxNode, family: MethodFamily) -> Result<Builtin> {
    let name = required(node, "NAME")?.text().to_string();
    let args = match node.child("expr_list") {
        Some(list) => Some(expr_list(list)?),
        None if node.has("LPAREN") => Some(Vec::new()),
        None => None,
    };
    Ok(Builtin::Method { family, name, args })
}

pub(crate) fn any_type(node: &SyntaxNode) -> Result<JacType> {
    let token = if node.is("any_type") { kid(node, 0)? } else { node };
    match token.name.as_str() {
        "TYP_STRING" => Ok(JacType::Str),
        "TYP_INT" => Ok(JacType::Int),
        "TYP_FLOAT" => Ok(JacType::Float),
        "TYP_LIST" => Ok(JacType::List),
        "TYP_DICT" => Ok(JacType::Dict),
        "TYP_BOOL" => Ok(JacType::Bool),
        "KW_NODE" => Ok(JacType::Node),
        "KW_EDGE" => Ok(JacType::Edge),
        "KW_TYPE" => Ok(JacType::Type),
        _ => Err(unknown(token)),
    }
}

fn global_ref(node: &SyntaxNode) -> Result<GlobalRef> {
    let target = kid(node, 2)?;
    match target.name.as_str() {
        "NAME" => Ok(GlobalRef::Var(target.text().to_string())),
        "obj_built_in" => match kid(target, 0)?.name.as_str() {
            "KW_CONTEXT" => Ok(GlobalRef::Context),
            "KW_INFO" => Ok(GlobalRef::Info),
            "KW_DETAILS" => Ok(GlobalRef::Details),
            _ => Err(malformed(target, "unknown global built-in")),
        },
        _ => Err(unknown(target)),
    }
}

/// Flatten `node_edge_ref` chains into steps.
fn ref_steps(node: &SyntaxNode, out: &mut Vec<RefStep>) -> Result<()> {
    let first = kid(node, 0)?;
    let mut next = 1;
    match first.name.as_str() {
        "node_ref" => {
            let filters = match node.kid.get(1) {
                Some(ctx) if ctx.is("filter_ctx") => {
                    next = 2;
                    filter_ctx(ctx)?
                }
                _ => Vec::new(),
            };
            out.push(RefStep::Node {
                arch: first.child("NAME").map(|n| n.text().to_string()),
                filters,
            });
        }
        "edge_ref" => out.push(edge_step(first)?),
        _ => return Err(unknown(first)),
    }
    match node.kid.get(next) {
        Some(rest) if rest.is("node_edge_ref") => ref_steps(rest, out),
        Some(other) => Err(unknown(other)),
        None => Ok(()),
    }
}

/// `edge_ref: edge_to | edge_from | edge_any`
pub(crate) fn edge_step(node: &SyntaxNode) -> Result<RefStep> {
    let inner = if node.is("edge_ref") { kid(node, 0)? } else { node };
    let direction = direction(inner)?;
    if inner.has("spawn_ctx") {
        return Err(malformed(inner, "assigning values is not allowed in an edge reference"));
    }
    Ok(RefStep::Edge {
        direction,
        arch: inner.child("NAME").map(|n| n.text().to_string()),
        filters: match inner.child("filter_ctx") {
            Some(ctx) => filter_ctx(ctx)?,
            None => Vec::new(),
        },
    })
}

fn direction(node: &SyntaxNode) -> Result<Direction> {
    match node.name.as_str() {
        "edge_to" | "connect_to" => Ok(Direction::Out),
        "edge_from" | "connect_from" => Ok(Direction::In),
        "edge_any" | "connect_any" => Ok(Direction::Any),
        _ => Err(unknown(node)),
    }
}

/// `connect_op: connect_to | connect_from | connect_any`
pub(crate) fn connect_op(node: &SyntaxNode) -> Result<ConnectOp> {
    let inner = if node.is("connect_op") { kid(node, 0)? } else { node };
    Ok(ConnectOp {
        direction: direction(inner)?,
        edge: inner.child("NAME").map(|n| n.text().to_string()),
        ctx: spawn_ctx_opt(inner)?,
    })
}

/// `filter_ctx: LPAREN filter_compare* RPAREN`
fn filter_ctx(node: &SyntaxNode) -> Result<Vec<Filter>> {
    node.children("filter_compare")
        .map(|cmp| {
            Ok(Filter {
                field: kid(cmp, 0)?.text().to_string(),
                op: cmp_op(kid(cmp, 1)?)?,
                value: expr_at(cmp, 2)?,
            })
        })
        .collect()
}

/// `spawn_ctx: LPAREN spawn_assign* RPAREN`
pub(crate) fn spawn_ctx(node: &SyntaxNode) -> Result<Vec<(String, Expr)>> {
    node.children("spawn_assign")
        .map(|assign| Ok((kid(assign, 0)?.text().to_string(), expr_at(assign, 2)?)))
        .collect()
}

/// Assignments of an optional `spawn_ctx` child.
pub(crate) fn spawn_ctx_opt(node: &SyntaxNode) -> Result<Vec<(String, Expr)>> {
    match node.child("spawn_ctx") {
        Some(ctx) => spawn_ctx(ctx),
        None => Ok(Vec::new()),
    }
}

/// `expr_list: connect (COMMA connect)*`
pub(crate) fn expr_list(node: &SyntaxNode) -> Result<Vec<Expr>> {
    node.kid
        .iter()
        .filter(|k| !k.is("COMMA"))
        .map(lower_expr)
        .collect()
}

/// `param_list: expr_list | kw_expr_list | expr_list COMMA kw_expr_list`
pub(crate) fn param_list(node: &SyntaxNode) -> Result<(Vec<Expr>, Vec<(String, Expr)>)> {
    let args = match node.child("expr_list") {
        Some(list) => expr_list(list)?,
        None => Vec::new(),
    };
    let mut kwargs = Vec::new();
    if let Some(list) = node.child("kw_expr_list") {
        let items: Vec<&SyntaxNode> = list.kid.iter().filter(|k| !k.is("COMMA")).collect();
        for triple in items.chunks(3) {
            match triple {
                [name, _eq, value] => kwargs.push((name.text().to_string(), lower_expr(value)?)),
                _ => return Err(malformed(list, "keyword argument without value")),
            }
        }
    }
    Ok((args, kwargs))
}

/// `kv_pair: (STRING | expression) COLON expression`
fn kv_pair(node: &SyntaxNode) -> Result<(Expr, Expr)> {
    Ok((expr_at(node, 0)?, expr_at(node, 2)?))
}

fn spawn(node: &SyntaxNode) -> Result<SpawnExpr> {
    let inner = kid(node, 0)?;
    let from = match inner.child("spawn_edge") {
        Some(edge) => Some((expr_at(edge, 0)?, connect_op(kid(edge, 1)?)?)),
        None => None,
    };
    match inner.name.as_str() {
        "node_spawn" => Ok(SpawnExpr::Node {
            from,
            arch: last_name(required(inner, "node_ref")?)?,
            ctx: spawn_ctx_opt(inner)?,
        }),
        "graph_spawn" => Ok(SpawnExpr::Graph {
            from,
            name: last_name(required(inner, "graph_ref")?)?,
        }),
        "walker_spawn" => Ok(SpawnExpr::Walker {
            location: expr_at(inner, 0)?,
            name: last_name(required(inner, "walker_ref")?)?,
            ctx: spawn_ctx_opt(inner)?,
        }),
        _ => Err(unknown(inner)),
    }
}
