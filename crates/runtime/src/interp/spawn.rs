//! Instantiating architypes: `spawn` of nodes, graphs and walkers.

use std::sync::Arc;

use indexmap::IndexMap;

use jac_foundation::{ArchKind, ElementId, Value};
use jac_ir::{GraphBlock, SpawnExpr};
use jac_store::Element;

use super::{Interp, Scope};
use crate::architype::Architype;
use crate::error::{Error, Result};
use crate::walker::Walker;

fn is_builtin(kind: ArchKind, name: &str) -> bool {
    matches!(
        (kind, name),
        (ArchKind::Node, "root" | "generic") | (ArchKind::Edge, "generic")
    )
}

impl Interp<'_> {
    /// Fresh, unsaved instance of `kind::name` with its default context.
    pub(crate) fn instantiate(&mut self, kind: ArchKind, name: &str) -> Result<Element> {
        match self.env.arch(kind, name) {
            Ok(arch) => self.instantiate_arch(&arch),
            // untyped nodes and edges work without a registered program
            Err(Error::ArchitypeNotFound { .. }) if is_builtin(kind, name) => {
                Ok(blank(kind, name, self.env.master))
            }
            Err(err) => Err(err),
        }
    }

    /// Instance backed by the architype record the sentinel hands out, so an
    /// instance owned by a foreign master points at that master's copy.
    pub(crate) fn instantiate_arch(&mut self, arch: &Arc<Architype>) -> Result<Element> {
        if arch.kind == ArchKind::Graph {
            return Err(Error::rt(format!(
                "graph {} can only be spawned, not instantiated",
                arch.name
            )));
        }
        let mut element = if arch.record.is_nil() {
            blank(arch.kind, &arch.name, self.env.master)
        } else {
            let record = self.env.spawn_architype(arch)?;
            let kind = record
                .arch_kind()
                .ok_or_else(|| Error::rt(format!("{} is not an architype record", record.id().urn())))?;
            let mut element = blank(kind, &record.name, self.env.master);
            element.parent = Some(record.id());
            if record.id() != arch.record {
                self.arch_copies.insert(element.id(), record);
            }
            element
        };
        element.context = self.default_context(arch)?;
        Ok(element)
    }

    /// Has-vars of `arch` and its supers, supers first. Defaults may refer to
    /// the variables declared before them.
    pub(crate) fn default_context(&mut self, arch: &Arc<Architype>) -> Result<IndexMap<String, Value>> {
        let lineage = self.env.lineage(arch);
        let mut ctx = IndexMap::new();
        for layer in lineage.iter().rev() {
            for has in &layer.has_vars {
                let value = match &has.default {
                    Some(expr) => {
                        let scope = Scope {
                            locals: ctx.clone(),
                            has_obj: None,
                        };
                        self.with_scope(scope, |interp| interp.eval_value(expr))?
                    }
                    None => Value::Null,
                };
                ctx.insert(has.name.clone(), value);
            }
        }
        Ok(ctx)
    }

    /// Set context fields on an element that is not saved yet.
    pub(crate) fn apply_ctx(
        &mut self,
        element: &mut Element,
        ctx: &IndexMap<String, Value>,
        force: bool,
    ) -> Result<()> {
        for (name, value) in ctx {
            if !force && !element.context.contains_key(name) && !self.declares(element, name)? {
                return Err(Error::rt(format!(
                    "Creating variable {name} in graph element {} is not allowed, please define",
                    element.name
                )));
            }
            element.context.insert(name.clone(), value.clone());
        }
        Ok(())
    }

    fn store_new(&mut self, element: Element) -> Result<ElementId> {
        let id = element.id();
        self.save_element(element)?;
        self.spawned.push(id);
        Ok(id)
    }

    pub(crate) fn spawn(&mut self, spawn: &SpawnExpr) -> Result<Value> {
        match spawn {
            SpawnExpr::Node { from, arch, ctx } => {
                let ctx = self.eval_ctx(ctx)?;
                let Some((location, op)) = from else {
                    let mut node = self.instantiate(ArchKind::Node, arch)?;
                    self.apply_ctx(&mut node, &ctx, false)?;
                    return Ok(Value::Element(self.store_new(node)?));
                };
                let location = self.eval_value(location)?;
                let edge_ctx = self.eval_ctx(&op.ctx)?;
                let mut spawned = Vec::new();
                for at in self.node_ids(&location)? {
                    let mut node = self.instantiate(ArchKind::Node, arch)?;
                    self.apply_ctx(&mut node, &ctx, false)?;
                    let id = self.store_new(node)?;
                    self.link(at, id, op, &edge_ctx)?;
                    spawned.push(id);
                }
                Ok(collect(&location, spawned))
            }
            SpawnExpr::Graph { from, name } => {
                let root = self.spawn_graph(name)?;
                if let Some((location, op)) = from {
                    let location = self.eval_value(location)?;
                    let edge_ctx = self.eval_ctx(&op.ctx)?;
                    for at in self.node_ids(&location)? {
                        self.link(at, root, op, &edge_ctx)?;
                    }
                }
                Ok(Value::Element(root))
            }
            SpawnExpr::Walker {
                location,
                name,
                ctx,
            } => {
                let ctx = self.eval_ctx(ctx)?;
                let arch = self.env.arch(ArchKind::Walker, name)?;
                let location = self.eval_value(location)?;
                let mut anchors = Vec::new();
                for at in self.node_ids(&location)? {
                    anchors.push(self.run_child(arch.clone(), at, &ctx)?);
                }
                Ok(match (location, anchors.len()) {
                    (Value::Element(_), 1) => anchors.pop().unwrap_or_default(),
                    _ => Value::List(anchors),
                })
            }
        }
    }

    /// Run a nested walker to completion and fold its output into ours.
    fn run_child(
        &mut self,
        arch: Arc<Architype>,
        start: ElementId,
        ctx: &IndexMap<String, Value>,
    ) -> Result<Value> {
        let (anchor, output, child_id, yielded) = {
            let mut child = Walker::spawn(self.env.reborrow(), arch)?;
            child.prime(start, Some(ctx))?;
            child.walk()?;
            child.save();
            (child.anchor_value(), child.take_output(), child.id(), child.yielded())
        };
        self.out.merge(output);
        if !yielded {
            self.env.store.destroy(self.env.master, child_id);
        }
        Ok(anchor)
    }

    /// Build a graph architype's sub-graph and return its anchor node.
    pub(crate) fn spawn_graph(&mut self, name: &str) -> Result<ElementId> {
        let arch = self.env.arch(ArchKind::Graph, name)?;
        let block = arch
            .graph
            .as_ref()
            .ok_or_else(|| Error::rt(format!("graph {name} has no spawn block")))?;
        self.run_graph_block(block)
    }

    pub(crate) fn run_graph_block(&mut self, block: &GraphBlock) -> Result<ElementId> {
        let mut scope = Scope::new(None);
        for name in ["here", "visitor"] {
            if let Some(value) = self.scope().locals.get(name) {
                scope.locals.insert(name.to_string(), value.clone());
            }
        }
        let anchor = self.with_scope(scope, |interp| {
            interp.exec_block(&block.spawn)?;
            Ok(interp.scope().locals.get(&block.anchor).cloned())
        })?;
        match anchor {
            Some(Value::Element(id)) if self.element(id)?.as_node().is_some() => Ok(id),
            _ => Err(Error::rt(format!("Graph didn't produce anchor {}", block.anchor))),
        }
    }
}

fn blank(kind: ArchKind, name: &str, master: ElementId) -> Element {
    match kind {
        ArchKind::Edge => Element::edge(name, master),
        ArchKind::Walker => Element::walker(name, master),
        ArchKind::Node | ArchKind::Graph => Element::node(name, master),
    }
}

/// A single id for a single location, a list otherwise.
fn collect(location: &Value, ids: Vec<ElementId>) -> Value {
    match (location, ids.as_slice()) {
        (Value::Element(_), [one]) => Value::Element(*one),
        _ => Value::List(ids.into_iter().map(Value::Element).collect()),
    }
}
