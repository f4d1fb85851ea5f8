//! Bytecode compiler
//!
//! Attribute-grammar pass over the parse tree. Every expression-level rule
//! whose whole subtree compiles gets its code attached to
//! [`SyntaxNode::bytecode`]; everything else stays with the tree walker.
//!
//! Operands are emitted right to left so the leftmost operand ends on top of
//! the stack, then one opcode follows per operator token. Single-child
//! wrappers and parenthesized atoms pass their child's code through.

use tracing::debug;

use jac_foundation::{BinaryOp, CmpOp, IncOp, JacType, LogicalOp, SourceLoc, Value};
use jac_ir::escape::string_token;
use jac_ir::SyntaxNode;

use crate::bytecode::{seal, Instr};

/// Compiles parse trees in place.
#[derive(Debug, Default)]
pub struct CodeGenerator {
    debug_info: bool,
    last_loc: Option<(u32, String)>,
}

impl CodeGenerator {
    /// `debug_info` emits `DEBUG_INFO` markers whenever the source line or
    /// file changes.
    pub fn new(debug_info: bool) -> Self {
        Self {
            debug_info,
            last_loc: None,
        }
    }

    /// Compile `tree`, replacing any code already attached. Returns the
    /// number of nodes that received code.
    pub fn compile(&mut self, tree: &mut SyntaxNode) -> usize {
        self.visit(tree, 0);
        let mut compiled = 0;
        tree.walk_post_mut(&mut |node| {
            if let Some(raw) = node.bytecode.take() {
                node.bytecode = Some(seal(&raw));
                compiled += 1;
            }
        });
        debug!(compiled, debug_info = self.debug_info, "bytecode attached");
        compiled
    }

    fn visit(&mut self, node: &mut SyntaxNode, create_var: u32) {
        node.bytecode = None;
        if node.is_terminal() {
            return;
        }
        // Only the target of a plain assignment may create a variable.
        let assigns = node.is("expression")
            && node.kid.len() == 2
            && node.kid[1].is("assignment");
        for (i, kid) in node.kid.iter_mut().enumerate() {
            let depth = if assigns && i == 0 { create_var + 1 } else { create_var };
            self.visit(kid, depth);
        }
        if !complete(node) {
            return;
        }
        let code = self.exit(node, create_var > 0);
        node.bytecode = code;
    }

    fn exit(&mut self, node: &SyntaxNode, create: bool) -> Option<Vec<u8>> {
        match node.name.as_str() {
            "atom" => self.atom(node, create),
            "multistring" => {
                let mut text = String::new();
                for token in &node.kid {
                    text.push_str(&string_token(token.text()).ok()?);
                }
                self.emit_one(&node.loc, Instr::LoadConst(Value::Str(text)))
            }
            "any_type" => {
                let ty = type_token(node.kid.first()?)?;
                self.emit_one(&node.loc, Instr::LoadConst(Value::Type(ty)))
            }
            "expression" => self.expression(node),
            "assignment" | "copy_assign" | "inc_assign" => node.kid.get(1)?.bytecode.clone(),
            "connect" | "logical" | "compare" | "arithmetic" | "term" | "power" | "factor" => {
                self.operators(node)
            }
            _ => None,
        }
    }

    fn atom(&mut self, node: &SyntaxNode, create: bool) -> Option<Vec<u8>> {
        match node.kid.as_slice() {
            [only] if only.is_terminal() => {
                let text = only.text();
                let instr = match only.name.as_str() {
                    "INT" => Instr::LoadConst(Value::Int(text.parse().ok()?)),
                    "FLOAT" => Instr::LoadConst(Value::Float(text.parse().ok()?)),
                    "STRING" => Instr::LoadConst(Value::Str(string_token(text).ok()?)),
                    "BOOL" => Instr::LoadConst(Value::Bool(text == "true")),
                    "NULL" => Instr::LoadConst(Value::Null),
                    "NAME" if create => Instr::CreateVar(text.to_string()),
                    "NAME" => Instr::LoadVar(text.to_string()),
                    _ => return None,
                };
                self.emit_one(&node.loc, instr)
            }
            [only] => only.bytecode.clone(),
            [open, inner, close] if open.is("LPAREN") && close.is("RPAREN") => inner.bytecode.clone(),
            _ => None,
        }
    }

    /// `connect (assignment | copy_assign | inc_assign)?`: value, then target,
    /// then the assignment opcode.
    fn expression(&mut self, node: &SyntaxNode) -> Option<Vec<u8>> {
        match node.kid.as_slice() {
            [only] => only.bytecode.clone(),
            [target, assign] => {
                let instr = match assign.name.as_str() {
                    "assignment" => Instr::Assign,
                    "copy_assign" => Instr::CopyFields,
                    "inc_assign" => Instr::Increment(inc_token(assign.kid.first()?)?),
                    _ => return None,
                };
                let mut code = assign.bytecode.clone()?;
                code.extend_from_slice(target.bytecode.as_deref()?);
                self.emit(&node.loc, &mut code, instr)?;
                Some(code)
            }
            _ => None,
        }
    }

    fn operators(&mut self, node: &SyntaxNode) -> Option<Vec<u8>> {
        match node.kid.as_slice() {
            [only] => return only.bytecode.clone(),
            [sign, operand] if sign.is_terminal() => {
                let mut code = operand.bytecode.clone()?;
                match (node.name.as_str(), sign.name.as_str()) {
                    ("factor", "MINUS") => self.emit(&node.loc, &mut code, Instr::Negate)?,
                    ("factor", "PLUS") => {}
                    ("compare", "NOT") => self.emit(&node.loc, &mut code, Instr::Not)?,
                    _ => return None,
                }
                return Some(code);
            }
            _ => {}
        }
        // Edge connections run in the tree walker.
        if node.is("connect") || node.kid.len() % 2 == 0 {
            return None;
        }
        let mut code = Vec::new();
        for operand in node.kid.iter().step_by(2).rev() {
            code.extend_from_slice(operand.bytecode.as_deref()?);
        }
        for token in node.kid.iter().skip(1).step_by(2) {
            self.emit(&node.loc, &mut code, operator(token)?)?;
        }
        Some(code)
    }

    fn emit_one(&mut self, loc: &SourceLoc, instr: Instr) -> Option<Vec<u8>> {
        let mut code = Vec::new();
        self.emit(loc, &mut code, instr)?;
        Some(code)
    }

    /// Append `instr`, preceded by a location marker when the location moved.
    fn emit(&mut self, loc: &SourceLoc, code: &mut Vec<u8>, instr: Instr) -> Option<()> {
        let mut body = Vec::new();
        instr.encode(&mut body)?;
        if self.debug_info {
            let (moved, file_changed) = match &self.last_loc {
                Some((line, file)) => (*line != loc.line || *file != loc.file, *file != loc.file),
                None => (true, true),
            };
            if moved {
                let marker = Instr::DebugInfo {
                    line: loc.line,
                    file: file_changed.then(|| loc.file.clone()),
                };
                // Unencodable file names simply go unmarked.
                if marker.encode(code).is_some() {
                    self.last_loc = Some((loc.line, loc.file.clone()));
                }
            }
        }
        code.extend(body);
        Some(())
    }
}

/// Compile `tree` in place; see [`CodeGenerator::compile`].
pub fn compile_tree(tree: &mut SyntaxNode, debug_info: bool) -> usize {
    CodeGenerator::new(debug_info).compile(tree)
}

/// Every rule child has code. Tokens and `cmp_op` carry none.
fn complete(node: &SyntaxNode) -> bool {
    node.kid
        .iter()
        .all(|k| k.is_terminal() || k.is("cmp_op") || k.bytecode.is_some())
}

fn operator(token: &SyntaxNode) -> Option<Instr> {
    Some(match token.name.as_str() {
        "PLUS" => Instr::Binary(BinaryOp::Add),
        "MINUS" => Instr::Binary(BinaryOp::Sub),
        "STAR_MUL" => Instr::Binary(BinaryOp::Mul),
        "DIV" => Instr::Binary(BinaryOp::Div),
        "MOD" => Instr::Binary(BinaryOp::Mod),
        "POW" => Instr::Binary(BinaryOp::Pow),
        "KW_AND" => Instr::Logical(LogicalOp::And),
        "KW_OR" => Instr::Logical(LogicalOp::Or),
        "cmp_op" => Instr::Compare(cmp_token(token.kid.first()?)?),
        _ => return None,
    })
}

fn cmp_token(token: &SyntaxNode) -> Option<CmpOp> {
    Some(match token.name.as_str() {
        "EE" => CmpOp::Eq,
        "NE" => CmpOp::Ne,
        "LT" => CmpOp::Lt,
        "GT" => CmpOp::Gt,
        "LTE" => CmpOp::Le,
        "GTE" => CmpOp::Ge,
        "KW_IN" => CmpOp::In,
        "nin" => CmpOp::NotIn,
        _ => return None,
    })
}

fn inc_token(token: &SyntaxNode) -> Option<IncOp> {
    Some(match token.name.as_str() {
        "PEQ" => IncOp::Add,
        "MEQ" => IncOp::Sub,
        "TEQ" => IncOp::Mul,
        "DEQ" => IncOp::Div,
        _ => return None,
    })
}

fn type_token(token: &SyntaxNode) -> Option<JacType> {
    Some(match token.name.as_str() {
        "TYP_STRING" => JacType::Str,
        "TYP_INT" => JacType::Int,
        "TYP_FLOAT" => JacType::Float,
        "TYP_LIST" => JacType::List,
        "TYP_DICT" => JacType::Dict,
        "TYP_BOOL" => JacType::Bool,
        "KW_NODE" => JacType::Node,
        "KW_EDGE" => JacType::Edge,
        "KW_TYPE" => JacType::Type,
        _ => return None,
    })
}
