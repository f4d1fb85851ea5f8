//! Expression evaluation.

use indexmap::IndexMap;

use jac_foundation::{ElementId, JacType, LogicalOp, Value};
use jac_ir::{AssignOp, Builtin, Expr, ExprKind, GlobalRef};
use jac_vm::{execute, MachineContext, Operand, Place};

use super::scope::get_item;
use super::Interp;
use crate::actions::ActionArgs;
use crate::error::{Error, Result};

impl Interp<'_> {
    pub(crate) fn eval(&mut self, expr: &Expr) -> Result<Operand> {
        if self.env.config.use_bytecode {
            if let Some(code) = &expr.bytecode {
                let top = execute(code, self)?;
                return Ok(top.unwrap_or_else(|| Operand::value(Value::Null)));
            }
        }
        self.eval_tree(expr)
    }

    fn eval_tree(&mut self, expr: &Expr) -> Result<Operand> {
        let value = match &expr.kind {
            ExprKind::Literal(value) => value.clone(),
            ExprKind::Type(ty) => Value::Type(*ty),
            ExprKind::Name(name) => return self.lookup(name, false),
            ExprKind::Global(global) => return self.eval_global(global),
            ExprKind::List(items) => {
                let mut values = Vec::with_capacity(items.len());
                for item in items {
                    values.push(self.eval_value(item)?);
                }
                Value::List(values)
            }
            ExprKind::Dict(pairs) => {
                let mut map = IndexMap::new();
                for (key, value) in pairs {
                    let key = match self.eval_value(key)? {
                        Value::Str(key) => key,
                        other => {
                            return Err(Error::rt(format!(
                                "Key is not str type : {}!",
                                other.type_name()
                            )))
                        }
                    };
                    map.insert(key, self.eval_value(value)?);
                }
                Value::Dict(map)
            }
            ExprKind::Unary { op, operand } => op.apply(&self.eval_value(operand)?)?,
            ExprKind::Binary { op, lhs, rhs } => {
                let lhs = self.eval_value(lhs)?;
                op.apply(&lhs, &self.eval_value(rhs)?)?
            }
            ExprKind::Logical { op, lhs, rhs } => {
                let lhs = self.eval_value(lhs)?;
                match (op, lhs.is_truthy()) {
                    (LogicalOp::And, false) | (LogicalOp::Or, true) => lhs,
                    _ => self.eval_value(rhs)?,
                }
            }
            ExprKind::Compare { op, lhs, rhs } => {
                let lhs = self.eval_value(lhs)?;
                Value::Bool(op.apply(&lhs, &self.eval_value(rhs)?)?)
            }
            ExprKind::Assign { op, target, value } => {
                let src = self.eval(value)?;
                // only a plain `=` may introduce a new local
                let dest = match (target.as_name(), op) {
                    (Some(name), AssignOp::Assign) => self.lookup(name, true)?,
                    _ => self.eval(target)?,
                };
                return match op {
                    AssignOp::Assign => self.assign(dest, src),
                    AssignOp::Copy => self.copy_fields(dest, src),
                    AssignOp::Inc(inc) => self.increment(dest, src, *inc),
                };
            }
            ExprKind::Connect { lhs, op, rhs } => return self.connect(lhs, op, rhs),
            ExprKind::Disconnect { lhs, edge, rhs } => return self.disconnect(lhs, edge, rhs),
            ExprKind::EdgeRef(steps) => {
                let (nodes, _) = self.edge_ref(steps)?;
                Value::List(nodes.into_iter().map(Value::Element).collect())
            }
            ExprKind::Field { base, name } => return self.eval_field(base, name),
            ExprKind::Index { base, index } => {
                let base = self.eval(base)?;
                let key = self.eval_value(index)?;
                let value = get_item(&base.value, &key)?;
                return Ok(match (base.place, &base.value) {
                    (Some(place), Value::List(_) | Value::Dict(_)) => Operand::at(
                        value,
                        Place::Index {
                            base: Box::new(place),
                            key,
                        },
                    ),
                    _ => Operand::value(value),
                });
            }
            ExprKind::Slice { base, start, end } => {
                let base = self.eval_value(base)?;
                let start = self.eval_value(start)?;
                let end = self.eval_value(end)?;
                slice(&base, &start, &end)?
            }
            ExprKind::Call {
                callee,
                args,
                kwargs,
            } => self.eval_call(callee, args, kwargs)?,
            ExprKind::AbilityCall {
                target,
                arch,
                name,
                ctx,
            } => return self.call_ability(target.as_deref(), arch.as_deref(), name, ctx),
            ExprKind::Builtin { base, op } => return self.eval_builtin(base, op),
            ExprKind::Spawn(spawn) => self.spawn(spawn)?,
            ExprKind::Ref(target) => match self.eval_value(target)? {
                Value::Element(id) => Value::Str(id.urn()),
                other => {
                    return Err(Error::rt(format!(
                        "{} is not a graph element, cannot take its reference",
                        other.type_name()
                    )))
                }
            },
            ExprKind::Deref(target) => {
                let value = self.eval_value(target)?;
                let id = value
                    .as_str()
                    .and_then(ElementId::parse_ref)
                    .ok_or_else(|| Error::rt(format!("{value} not valid reference")))?;
                if !self.env.store.contains(id) {
                    return Err(Error::rt(format!("{value} not valid reference")));
                }
                Value::Element(id)
            }
        };
        Ok(Operand::value(value))
    }

    fn eval_global(&mut self, global: &GlobalRef) -> Result<Operand> {
        let value = match global {
            GlobalRef::Context => Value::Dict(self.globals.clone()),
            GlobalRef::Info => Value::Dict(self.sentinel_info()),
            GlobalRef::Details => {
                let mut details = self.sentinel_info();
                details.insert("context".to_string(), Value::Dict(self.globals.clone()));
                Value::Dict(details)
            }
            GlobalRef::Var(name) => {
                let Some(value) = self.globals.get(name) else {
                    return Err(Error::rt(format!("Global not defined - {name}")));
                };
                return Ok(Operand::at(value.clone(), Place::Global(name.clone())));
            }
        };
        Ok(Operand::value(value))
    }

    fn sentinel_info(&mut self) -> IndexMap<String, Value> {
        self.env
            .current_sentinel()
            .map(|s| s.info())
            .unwrap_or_default()
    }

    fn eval_field(&mut self, base: &Expr, name: &str) -> Result<Operand> {
        let base = self.eval(base)?;
        match &base.value {
            Value::Element(id) => {
                let value = self.context_of(*id)?.get(name).cloned().unwrap_or_default();
                Ok(Operand::at(
                    value,
                    Place::Field {
                        owner: *id,
                        name: name.to_string(),
                    },
                ))
            }
            Value::Dict(map) => {
                let value = map.get(name).cloned().unwrap_or_default();
                let key = Value::str(name);
                Ok(match base.place {
                    Some(place) => Operand::at(
                        value,
                        Place::Index {
                            base: Box::new(place),
                            key,
                        },
                    ),
                    None => Operand::value(value),
                })
            }
            Value::List(items) => {
                // plucks the field from every element of a node set
                let mut values = Vec::with_capacity(items.len());
                for item in items {
                    let Value::Element(id) = item else {
                        return Err(Error::rt(format!("Invalid variable {name}")));
                    };
                    let ctx = self.context_of(*id)?;
                    let value = ctx.get(name).ok_or_else(|| {
                        Error::rt(format!("Some elements in set does not have {name}"))
                    })?;
                    values.push(value.clone());
                }
                Ok(Operand::value(Value::List(values)))
            }
            _ => Err(Error::rt(format!("Invalid variable {name}"))),
        }
    }

    /// Dotted action name for `set.action(...)` when `set` is not a variable.
    fn action_name(&mut self, callee: &Expr) -> Option<String> {
        match &callee.kind {
            ExprKind::Field { base, name } => {
                let set = base.as_name()?;
                if self.is_variable(set) {
                    return None;
                }
                Some(format!("{set}.{name}"))
            }
            ExprKind::Name(name) if name.contains('.') => Some(name.clone()),
            _ => None,
        }
    }

    fn eval_call(&mut self, callee: &Expr, args: &[Expr], kwargs: &[(String, Expr)]) -> Result<Value> {
        let Some(action) = self.action_name(callee) else {
            return Err(Error::rt("Unable to call a non-action value"));
        };
        let mut call = ActionArgs::default();
        for arg in args {
            call.args.push(self.eval_value(arg)?);
        }
        for (key, arg) in kwargs {
            call.kwargs.insert(key.clone(), self.eval_value(arg)?);
        }
        self.call_action(&action, &call)
    }

    fn eval_builtin(&mut self, base: &Expr, op: &Builtin) -> Result<Operand> {
        if let (ExprKind::EdgeRef(steps), Builtin::Cast(JacType::Edge)) = (&base.kind, op) {
            let (_, edges) = self.edge_ref(steps)?;
            return Ok(Operand::value(Value::List(
                edges.into_iter().map(Value::Element).collect(),
            )));
        }
        let operand = self.eval(base)?;
        self.apply_builtin(operand, op)
    }
}

fn bound(value: &Value, len: usize, default: usize) -> Result<usize> {
    match value {
        Value::Null => Ok(default),
        Value::Int(i) => {
            let at = if *i < 0 { len as i64 + i } else { *i };
            Ok(at.clamp(0, len as i64) as usize)
        }
        other => Err(Error::rt(format!(
            "Slice indices must be int, not {}",
            other.type_name()
        ))),
    }
}

/// `base[start:end]` with out-of-range bounds clamped.
pub(crate) fn slice(base: &Value, start: &Value, end: &Value) -> Result<Value> {
    match base {
        Value::List(items) => {
            let from = bound(start, items.len(), 0)?;
            let to = bound(end, items.len(), items.len())?.max(from);
            Ok(Value::List(items[from..to].to_vec()))
        }
        Value::Str(text) => {
            let chars: Vec<char> = text.chars().collect();
            let from = bound(start, chars.len(), 0)?;
            let to = bound(end, chars.len(), chars.len())?.max(from);
            Ok(Value::Str(chars[from..to].iter().collect()))
        }
        other => Err(Error::rt(format!("{} is not sliceable", other.type_name()))),
    }
}

#[cfg(test)]
mod tests {
    use super::super::tests::{body, expr, Harness};
    use super::*;
    use jac_ir::build::*;
    use super::slice;
    use jac_store::GraphStore;

    #[test]
    fn test_arithmetic_and_precedence() {
        let mut h = Harness::new();
        let mut interp = h.interp();
        let v = interp.eval_value(&expr(add(int(1), mul(int(2), int(3))))).unwrap();
        assert_eq!(v, Value::Int(7));
        let v = interp.eval_value(&expr(div(int(7), int(2)))).unwrap();
        assert_eq!(v, Value::Float(3.5));
    }

    #[test]
    fn test_logical_short_circuits() {
        let mut h = Harness::new();
        let mut interp = h.interp();
        // the rhs would fail on an undefined name if evaluated
        let v = interp
            .eval_value(&expr(and(boolean(false), name("missing"))))
            .unwrap();
        assert_eq!(v, Value::Bool(false));
        let v = interp.eval_value(&expr(or(int(0), string("x")))).unwrap();
        assert_eq!(v, Value::str("x"));
        let v = interp.eval_value(&expr(or(int(7), name("missing")))).unwrap();
        assert_eq!(v, Value::Int(7));
        let v = interp.eval_value(&expr(and(list(Vec::new()), int(1)))).unwrap();
        assert_eq!(v, Value::List(Vec::new()));
    }

    #[test]
    fn test_bytecode_matches_tree_and_rejects_corrupt_code() {
        let mut h = Harness::new();
        let mut interp = h.interp();
        let mut tree = or(null(), int(5));
        jac_vm::compile_tree(&mut tree, false);
        let compiled = expr(tree);
        assert!(compiled.bytecode.is_some());
        let walked = Expr {
            bytecode: None,
            ..compiled.clone()
        };
        assert_eq!(interp.eval_value(&compiled).unwrap(), Value::Int(5));
        assert_eq!(interp.eval_value(&walked).unwrap(), Value::Int(5));

        let corrupt = [
            // string constant two bytes short
            jac_vm::seal(&[0x01, 0x03, 0x01, 0x05, b'a', b'b']),
            // length wider than the code
            jac_vm::seal(&[0x01, 0x03, 0x08, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff]),
            // unknown constant wire type
            jac_vm::seal(&[0x01, 0x09, 0x00]),
            // header cut off
            compiled.bytecode.clone().unwrap()[..2].to_vec(),
        ];
        for code in corrupt {
            let bad = Expr {
                bytecode: Some(code),
                ..compiled.clone()
            };
            let err = interp.eval_value(&bad).unwrap_err();
            assert!(matches!(err, Error::Machine(_)), "{err}");
            assert!(!err.is_recoverable());
        }
    }

    #[test]
    fn test_dict_index_write_through() {
        let mut h = Harness::new();
        let mut interp = h.interp();
        let code = body(vec![
            expr_stmt(assign(name("d"), dict(vec![("a", int(1))]))),
            expr_stmt(assign(index(name("d"), string("b")), int(2))),
            expr_stmt(inc_assign(index(name("d"), string("a")), "+", int(10))),
            expr_stmt(assign(name("l"), list(vec![int(1), int(2), int(3)]))),
            expr_stmt(assign(index(name("l"), int(-1)), int(30))),
        ]);
        interp.exec_block(&code).unwrap();
        assert!(interp.out.errors.is_empty(), "{:?}", interp.out.errors);
        let d = interp.scope().locals["d"].as_dict().unwrap().clone();
        assert_eq!(d["a"], Value::Int(11));
        assert_eq!(d["b"], Value::Int(2));
        assert_eq!(
            interp.scope().locals["l"],
            Value::List(vec![Value::Int(1), Value::Int(2), Value::Int(30)])
        );
    }

    #[test]
    fn test_slices_clamp() {
        let items = Value::List((0..5).map(Value::Int).collect());
        assert_eq!(
            slice(&items, &Value::Int(1), &Value::Int(3)).unwrap(),
            Value::List(vec![Value::Int(1), Value::Int(2)])
        );
        assert_eq!(
            slice(&items, &Value::Int(-2), &Value::Null).unwrap(),
            Value::List(vec![Value::Int(3), Value::Int(4)])
        );
        assert_eq!(
            slice(&Value::str("hello"), &Value::Int(1), &Value::Int(99)).unwrap(),
            Value::str("ello")
        );
    }

    #[test]
    fn test_action_call_and_shadowing() {
        let mut h = Harness::new();
        {
            let mut interp = h.interp();
            let v = interp
                .eval_value(&expr(action("std.log", vec![string("hi "), int(2)])))
                .unwrap();
            assert_eq!(v, Value::str("hi 2"));

            interp.scope_mut().locals.insert("std".into(), Value::Dict(IndexMap::new()));
            assert!(interp
                .eval_value(&expr(action("std.log", vec![string("x")])))
                .is_err());
        }
        assert_eq!(h.output.stdout(), "hi 2\n");
    }

    #[test]
    fn test_globals_are_run_local() {
        let mut h = Harness::new();
        let mut interp = h.interp();
        interp.globals.insert("g".into(), Value::Int(1));
        let code = body(vec![expr_stmt(assign(global("g"), int(5)))]);
        interp.exec_block(&code).unwrap();
        assert_eq!(interp.globals["g"], Value::Int(5));
        assert!(interp.eval_value(&expr(global("nope"))).is_err());
    }

    #[test]
    fn test_ref_and_deref() {
        let mut h = Harness::new();
        let node = jac_store::Element::node("generic", h.master);
        let id = node.id();
        h.store.save(h.master, node, true);
        let mut interp = h.interp();
        interp.scope_mut().locals.insert("n".into(), Value::Element(id));
        let urn = interp.eval_value(&expr(reference(name("n")))).unwrap();
        assert_eq!(urn, Value::Str(id.urn()));
        interp.scope_mut().locals.insert("r".into(), urn);
        assert_eq!(interp.eval_value(&expr(deref(name("r")))).unwrap(), Value::Element(id));
        interp
            .scope_mut()
            .locals
            .insert("bad".into(), Value::str("urn:uuid:nope"));
        let err = interp.eval_value(&expr(deref(name("bad")))).unwrap_err();
        assert!(err.to_string().contains("not valid reference"));
    }
}
