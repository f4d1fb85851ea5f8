//! Statement execution and the per-node walker body.

use std::sync::Arc;

use jac_foundation::{ElementId, LogicalOp, Value};
use jac_ir::{
    AbilityEvent, Block, CtrlKind, Expr, ExprKind, ReportField, Stmt, StmtKind, TakeStyle,
    WalkerItem,
};
use jac_store::GraphStore;
use jac_vm::Place;

use super::{Interp, Scope, Stop};
use crate::architype::Architype;
use crate::error::{Error, Result};

impl Interp<'_> {
    pub(crate) fn exec_block(&mut self, block: &Block) -> Result<()> {
        for stmt in block {
            if self.halted() {
                break;
            }
            self.exec_stmt(stmt)?;
        }
        Ok(())
    }

    /// Run one statement; program faults are recorded and execution moves on.
    pub(crate) fn exec_stmt(&mut self, stmt: &Stmt) -> Result<()> {
        self.loc = stmt.loc.clone();
        self.rule = stmt.kind.rule();
        match self.run_stmt(stmt) {
            Ok(()) => Ok(()),
            Err(err) => self.recover(err),
        }
    }

    fn run_stmt(&mut self, stmt: &Stmt) -> Result<()> {
        match &stmt.kind {
            StmtKind::Block(block) => self.exec_block(block),
            StmtKind::NodeContext { archs, body } => {
                let here = self.element(self.here()?)?;
                if archs.iter().any(|arch| self.is_instance(&here, arch)) {
                    self.exec_block(body)?;
                }
                Ok(())
            }
            StmtKind::Expr(expr) => {
                self.eval(expr)?;
                Ok(())
            }
            StmtKind::If {
                cond,
                then,
                elifs,
                otherwise,
            } => {
                if self.eval_value(cond)?.is_truthy() {
                    return self.exec_block(then);
                }
                for (cond, block) in elifs {
                    if self.eval_value(cond)?.is_truthy() {
                        return self.exec_block(block);
                    }
                }
                match otherwise {
                    Some(block) => self.exec_block(block),
                    None => Ok(()),
                }
            }
            StmtKind::Try {
                body,
                binding,
                otherwise,
            } => self.exec_try(body, binding.as_deref(), otherwise.as_ref()),
            StmtKind::ForTo {
                init,
                cond,
                step,
                body,
            } => {
                self.eval(init)?;
                let mut count = 0;
                while self.eval_value(cond)?.is_truthy() {
                    if !self.iterate(body, &mut count)? {
                        break;
                    }
                    self.eval(step)?;
                }
                Ok(())
            }
            StmtKind::ForIn { var, iter, body } => {
                let items = match self.eval_value(iter)? {
                    Value::List(items) => items,
                    Value::Dict(map) => map.into_keys().map(Value::Str).collect(),
                    _ => return Err(Error::rt("Not a list/dict for iteration!")),
                };
                let mut count = 0;
                for item in items {
                    self.bind(var, item)?;
                    if !self.iterate(body, &mut count)? {
                        break;
                    }
                }
                Ok(())
            }
            StmtKind::ForKeyValue {
                key,
                value,
                iter,
                body,
            } => {
                let pairs: Vec<(Value, Value)> = match self.eval_value(iter)? {
                    Value::Dict(map) => map.into_iter().map(|(k, v)| (Value::Str(k), v)).collect(),
                    Value::List(items) => items
                        .into_iter()
                        .enumerate()
                        .map(|(i, v)| (Value::Int(i as i64), v))
                        .collect(),
                    _ => return Err(Error::rt("Not a list/dict for iteration!")),
                };
                let mut count = 0;
                for (k, v) in pairs {
                    self.bind(key, k)?;
                    self.bind(value, v)?;
                    if !self.iterate(body, &mut count)? {
                        break;
                    }
                }
                Ok(())
            }
            StmtKind::While { cond, body } => {
                let mut count = 0;
                while self.eval_value(cond)?.is_truthy() {
                    if !self.iterate(body, &mut count)? {
                        break;
                    }
                }
                Ok(())
            }
            StmtKind::Ctrl(CtrlKind::Skip) => {
                self.stopped = Some(Stop::Skip);
                Ok(())
            }
            StmtKind::Ctrl(kind) => {
                self.loop_ctrl = Some(*kind);
                Ok(())
            }
            StmtKind::Assert(cond) => {
                if self.eval_value(cond)?.is_truthy() {
                    Ok(())
                } else {
                    Err(Error::AssertFailed(source_text(cond)))
                }
            }
            StmtKind::Destroy(target) => self.exec_destroy(target),
            StmtKind::Report(value) => {
                let value = self.eval_value(value)?;
                let json = self.report_json(&value);
                self.out.report.push(json);
                Ok(())
            }
            StmtKind::ReportField { field, value } => self.exec_report_field(*field, value),
            StmtKind::Take {
                style,
                target,
                otherwise,
            } => self.exec_take(*style, target, otherwise.as_ref()),
            StmtKind::Ignore(target) => {
                let value = self.eval_value(target)?;
                let ids = self
                    .node_ids(&value)
                    .map_err(|_| Error::rt(format!("{value} is not ignorable type (i.e., nodes)")))?;
                self.walker_state()?.ignore_node_ids.extend(ids);
                Ok(())
            }
            StmtKind::Disengage(nested) => {
                if let Some(nested) = nested {
                    self.exec_stmt(nested)?;
                }
                self.stopped = Some(Stop::Disengage);
                if self.walker.is_some() {
                    self.walker_state()?.next_node_ids.clear();
                }
                Ok(())
            }
            StmtKind::Yield(nested) => {
                if let Some(nested) = nested {
                    self.exec_stmt(nested)?;
                }
                self.walker_state()?.yielded = true;
                Ok(())
            }
        }
    }

    /// One loop iteration. Returns whether the loop should go on.
    fn iterate(&mut self, body: &Block, count: &mut usize) -> Result<bool> {
        *count += 1;
        let limit = self.env.config.loop_limit;
        if *count > limit {
            return Err(Error::rt(format!("Hit loop limit [{limit}]!")));
        }
        self.exec_block(body)?;
        if self.stopped.is_some() {
            return Ok(false);
        }
        Ok(self.loop_ctrl.take() != Some(CtrlKind::Break))
    }

    fn exec_try(&mut self, body: &Block, binding: Option<&str>, otherwise: Option<&Block>) -> Result<()> {
        match self.try_mode(|interp| interp.exec_block(body)) {
            Err(err) if err.is_recoverable() => {
                if let Some(name) = binding {
                    let dict = self.error_dict(&err);
                    self.bind(name, dict)?;
                }
                match otherwise {
                    Some(block) => self.exec_block(block),
                    None => Ok(()),
                }
            }
            other => other,
        }
    }

    fn exec_destroy(&mut self, target: &Expr) -> Result<()> {
        let operand = self.eval(target)?;
        let elements = match &operand.value {
            Value::Element(id) => Some(vec![*id]),
            Value::List(items) if !items.is_empty() => operand.value.element_ids(),
            _ => None,
        };
        let Some(ids) = elements else {
            return match &operand.place {
                Some(place) => self.delete_place(place),
                None => Err(Error::rt(format!("{} is not destroyable", operand.value))),
            };
        };
        if self.walker.is_some() {
            self.walker_state()?.destroy_node_ids.extend(ids);
        } else {
            for id in ids {
                self.env.store.destroy(self.env.master, id);
            }
        }
        match &operand.place {
            // the field itself stays; only the element goes
            Some(Place::Field { .. }) | None => Ok(()),
            Some(place) => self.delete_place(place),
        }
    }

    fn exec_report_field(&mut self, field: ReportField, value: &Expr) -> Result<()> {
        let value = self.eval_value(value)?;
        match field {
            ReportField::Status => {
                let code = value
                    .as_int()
                    .ok_or_else(|| Error::rt(format!("Status code must be an int, not {value}")))?;
                self.out.status_code = Some(code);
            }
            ReportField::Custom => self.out.custom = Some(self.report_json(&value)),
            ReportField::File => self.out.file = Some(self.report_json(&value)),
            ReportField::Error => match &value {
                Value::Dict(map) => {
                    let get = |key: &str| map.get(key).map(Value::to_string).unwrap_or_default();
                    self.out.errors.push(format!(
                        "{}:{} - line {}, col {} - rule {} - {}",
                        get("mod"),
                        get("name"),
                        get("line"),
                        get("col"),
                        get("rule"),
                        get("msg")
                    ));
                    if let Some(trace) = map.get("stack_trace") {
                        self.out.stack_trace.push(trace.to_string());
                    }
                }
                other => self.out.errors.push(other.to_string()),
            },
        }
        Ok(())
    }

    fn exec_take(&mut self, style: TakeStyle, target: &Expr, otherwise: Option<&Block>) -> Result<()> {
        let value = self.eval_value(target)?;
        let ids = if value.is_truthy() {
            self.node_ids(&value)
                .map_err(|_| Error::rt(format!("{value} is not destination type (i.e., nodes)")))?
        } else {
            Vec::new()
        };
        let state = self.walker_state()?;
        let before = state.next_node_ids.len();
        let wanted: Vec<ElementId> = ids
            .into_iter()
            .filter(|id| !state.ignore_node_ids.contains(id))
            .collect();
        match style {
            TakeStyle::Bfs => {
                for id in wanted {
                    state.queue_back(id, true);
                }
            }
            TakeStyle::Dfs => {
                for id in wanted.into_iter().rev() {
                    state.queue_front(id, true);
                }
            }
        }
        let after = state.next_node_ids.len();
        match otherwise {
            Some(block) if after <= before => self.exec_block(block),
            _ => Ok(()),
        }
    }

    /// One walker step on `node`: entry blocks on the first step, the body in
    /// source order, and exit blocks once nothing is left to visit.
    pub(crate) fn walk_node(&mut self, arch: &Arc<Architype>, node: ElementId) -> Result<()> {
        let walker = self
            .walker_id()
            .ok_or_else(|| Error::rt("walk_node needs a running walker"))?;
        let scope = Scope::new(Some(walker))
            .with_local("here", Value::Element(node))
            .with_local("visitor", Value::Element(walker));
        self.with_scope(scope, |interp| {
            let first = interp.walker_state()?.current_step == 0;
            if first {
                interp.trigger(node, AbilityEvent::Entry)?;
                for item in &arch.walker {
                    if let WalkerItem::Entry(block) = item {
                        interp.exec_block(block)?;
                    }
                }
            }
            for item in &arch.walker {
                if interp.halted() {
                    break;
                }
                match item {
                    WalkerItem::Stmt(stmt) => interp.exec_stmt(stmt)?,
                    WalkerItem::Activity(block) => interp.exec_block(block)?,
                    WalkerItem::Entry(_) | WalkerItem::Exit(_) => {}
                }
            }
            interp.loop_ctrl = None;

            let state = interp.walker_state()?;
            if state.next_node_ids.is_empty() && !state.yielded {
                for item in &arch.walker {
                    if let WalkerItem::Exit(block) = item {
                        interp.exec_block(block)?;
                    }
                }
                interp.trigger(node, AbilityEvent::Exit)?;
            }
            Ok(())
        })
    }
}

/// Readable form of an assert condition.
pub(crate) fn source_text(expr: &Expr) -> String {
    match &expr.kind {
        ExprKind::Literal(Value::Str(text)) => format!("{text:?}"),
        ExprKind::Literal(value) => value.to_string(),
        ExprKind::Type(ty) => ty.to_string(),
        ExprKind::Name(name) => name.clone(),
        ExprKind::Global(_) => "global".to_string(),
        ExprKind::Unary { op, operand } => {
            format!("{} {}", format!("{op:?}").to_lowercase(), source_text(operand))
        }
        ExprKind::Binary { op, lhs, rhs } => {
            format!("{} {} {}", source_text(lhs), op.symbol(), source_text(rhs))
        }
        ExprKind::Compare { op, lhs, rhs } => {
            format!("{} {} {}", source_text(lhs), op.symbol(), source_text(rhs))
        }
        ExprKind::Logical { op, lhs, rhs } => {
            let word = match op {
                LogicalOp::And => "and",
                LogicalOp::Or => "or",
            };
            format!("{} {word} {}", source_text(lhs), source_text(rhs))
        }
        ExprKind::Field { base, name } => format!("{}.{name}", source_text(base)),
        ExprKind::Index { base, index } => format!("{}[{}]", source_text(base), source_text(index)),
        ExprKind::Call { callee, args, .. } => format!(
            "{}({})",
            source_text(callee),
            args.iter().map(source_text).collect::<Vec<_>>().join(", ")
        ),
        ExprKind::List(items) => format!(
            "[{}]",
            items.iter().map(source_text).collect::<Vec<_>>().join(", ")
        ),
        _ => "expression".to_string(),
    }
}
