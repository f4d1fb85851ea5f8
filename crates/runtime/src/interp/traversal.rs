//! Edge references, connect and disconnect.

use indexmap::{IndexMap, IndexSet};

use jac_foundation::{ArchKind, CmpOp, ElementId, Value};
use jac_ir::{ConnectOp, Direction, Expr, Filter, RefStep};
use jac_store::{graph, ConnectDirection, EdgeDirection, Element};
use jac_vm::Operand;

use super::Interp;
use crate::error::{Error, Result};

fn edge_direction(direction: Direction) -> EdgeDirection {
    match direction {
        Direction::Out => EdgeDirection::Outbound,
        Direction::In => EdgeDirection::Inbound,
        Direction::Any => EdgeDirection::Any,
    }
}

/// Filters with their right-hand sides already evaluated.
struct Checks(Vec<(String, CmpOp, Value)>);

impl Checks {
    /// Missing fields are errors.
    fn strict(&self, element: &Element) -> Result<bool> {
        for (field, op, value) in &self.0 {
            let Some(actual) = element.context.get(field) else {
                return Err(Error::rt(format!("{field} not present in object")));
            };
            if !op.apply(actual, value)? {
                return Ok(false);
            }
        }
        Ok(true)
    }

    /// Missing fields or incomparable values never match.
    fn lenient(&self, element: &Element) -> bool {
        self.0.iter().all(|(field, op, value)| {
            element
                .context
                .get(field)
                .is_some_and(|actual| op.apply(actual, value).unwrap_or(false))
        })
    }
}

impl Interp<'_> {
    fn checks(&mut self, filters: &[Filter]) -> Result<Checks> {
        let mut checks = Vec::with_capacity(filters.len());
        for filter in filters {
            checks.push((filter.field.clone(), filter.op, self.eval_value(&filter.value)?));
        }
        Ok(Checks(checks))
    }

    fn ignored(&self) -> IndexSet<ElementId> {
        self.walker
            .as_ref()
            .and_then(Element::as_walker)
            .map(|state| state.ignore_node_ids.clone())
            .unwrap_or_default()
    }

    /// Evaluate a chain of edge and node steps from `here`.
    ///
    /// Returns the nodes reached, in edge insertion order and deduplicated,
    /// and the edges of the last edge step that lead to them.
    pub(crate) fn edge_ref(&mut self, steps: &[RefStep]) -> Result<(Vec<ElementId>, Vec<ElementId>)> {
        let here = self.here()?;
        let master = self.env.master;
        let ignored = self.ignored();
        let mut nodes = match steps.first() {
            Some(RefStep::Node { .. }) => {
                let mut out = IndexSet::new();
                for id in graph::neighbors(&mut *self.env.store, master, here, EdgeDirection::Outbound) {
                    if !ignored.contains(&id) {
                        out.insert(id);
                    }
                }
                out
            }
            _ => IndexSet::from([here]),
        };
        let mut hops: Vec<(ElementId, ElementId)> = Vec::new();

        for step in steps {
            match step {
                RefStep::Edge {
                    direction,
                    arch,
                    filters,
                } => {
                    let checks = self.checks(filters)?;
                    let mut reached = IndexSet::new();
                    hops.clear();
                    for node in &nodes {
                        let edges =
                            graph::edges(&mut *self.env.store, master, *node, edge_direction(*direction));
                        for edge in edges {
                            if let Some(arch) = arch {
                                if !self.is_instance(&edge, arch) {
                                    continue;
                                }
                            }
                            if !checks.strict(&edge)? {
                                continue;
                            }
                            let Some(other) = graph::opposite(&edge, *node) else {
                                continue;
                            };
                            if ignored.contains(&other) {
                                continue;
                            }
                            reached.insert(other);
                            hops.push((edge.id(), other));
                        }
                    }
                    nodes = reached;
                }
                RefStep::Node { arch, filters } => {
                    let checks = self.checks(filters)?;
                    let mut kept = IndexSet::new();
                    for id in &nodes {
                        let node = self.element(*id)?;
                        if let Some(arch) = arch {
                            if !self.is_instance(&node, arch) {
                                continue;
                            }
                        }
                        if checks.strict(&node)? {
                            kept.insert(*id);
                        }
                    }
                    nodes = kept;
                }
            }
        }

        let mut edges = IndexSet::new();
        for (edge, node) in hops {
            if nodes.contains(&node) {
                edges.insert(edge);
            }
        }
        Ok((nodes.into_iter().collect(), edges.into_iter().collect()))
    }

    /// Node ids held by `value`: a node or a list of nodes.
    pub(crate) fn node_ids(&mut self, value: &Value) -> Result<Vec<ElementId>> {
        let ids = value
            .element_ids()
            .ok_or_else(|| Error::rt(format!("{} is not a node", value.type_name())))?;
        for id in &ids {
            if self.element(*id)?.as_node().is_none() {
                return Err(Error::rt(format!("{} is not a node", id.urn())));
            }
        }
        Ok(ids)
    }

    /// Create one edge between `left` and `right` as described by `op`.
    pub(crate) fn link(
        &mut self,
        left: ElementId,
        right: ElementId,
        op: &ConnectOp,
        ctx: &IndexMap<String, Value>,
    ) -> Result<ElementId> {
        let name = op.edge.as_deref().unwrap_or("generic");
        let mut edge = self.instantiate(ArchKind::Edge, name)?;
        self.apply_ctx(&mut edge, ctx, false)?;
        let direction = match op.direction {
            Direction::Out => ConnectDirection::To,
            Direction::In => ConnectDirection::From,
            Direction::Any => ConnectDirection::Any,
        };
        graph::attach(&mut *self.env.store, self.env.master, left, right, edge, direction).ok_or_else(
            || {
                Error::rt(format!(
                    "Unable to connect {} to {}",
                    left.urn(),
                    right.urn()
                ))
            },
        )
    }

    /// `lhs ++> rhs`: one edge per node pair. Evaluates to `lhs`.
    pub(crate) fn connect(&mut self, lhs: &Expr, op: &ConnectOp, rhs: &Expr) -> Result<Operand> {
        let left = self.eval(lhs)?;
        let right = self.eval_value(rhs)?;
        let ctx = self.eval_ctx(&op.ctx)?;
        for l in self.node_ids(&left.value)? {
            for r in self.node_ids(&right)? {
                self.link(l, r, op, &ctx)?;
            }
        }
        Ok(left)
    }

    /// `lhs !--> rhs`: remove matching edges between each node pair.
    pub(crate) fn disconnect(&mut self, lhs: &Expr, step: &RefStep, rhs: &Expr) -> Result<Operand> {
        let left = self.eval(lhs)?;
        let right = self.eval_value(rhs)?;
        let RefStep::Edge {
            direction,
            arch,
            filters,
        } = step
        else {
            return Err(Error::rt("Disconnect needs an edge reference"));
        };
        let family = arch.as_ref().map(|a| self.env.family(ArchKind::Edge, a));
        let checks = self.checks(filters)?;
        let master = self.env.master;
        for l in self.node_ids(&left.value)? {
            for r in self.node_ids(&right)? {
                graph::detach(
                    &mut *self.env.store,
                    master,
                    l,
                    r,
                    edge_direction(*direction),
                    |edge| {
                        family.as_ref().map_or(true, |f| f.contains(&edge.name))
                            && checks.lenient(edge)
                    },
                );
            }
        }
        Ok(left)
    }
}

#[cfg(test)]
mod tests {
    use super::super::tests::{expr, Harness};
    use super::*;
    use jac_ir::build::*;
    use jac_store::GraphStore;

    fn node(h: &mut Harness, name: &str, weight: i64) -> ElementId {
        let mut n = Element::node(name, h.master);
        n.context.insert("w".into(), Value::Int(weight));
        let id = n.id();
        h.store.save(h.master, n, true);
        id
    }

    fn edge(h: &mut Harness, from: ElementId, to: ElementId, weight: i64) {
        let mut e = Element::edge("generic", h.master);
        e.context.insert("w".into(), Value::Int(weight));
        graph::attach(&mut h.store, h.master, from, to, e, ConnectDirection::To).unwrap();
    }

    #[test]
    fn test_edge_ref_order_and_filters() {
        let mut h = Harness::new();
        let root = node(&mut h, "generic", 0);
        let a = node(&mut h, "generic", 1);
        let b = node(&mut h, "generic", 2);
        edge(&mut h, root, a, 5);
        edge(&mut h, root, b, 1);
        edge(&mut h, b, root, 9);
        let mut interp = h.interp();
        interp.scope_mut().locals.insert("here".into(), Value::Element(root));

        let (out, _) = interp.edge_ref(&[RefStep::Edge {
            direction: Direction::Out,
            arch: None,
            filters: Vec::new(),
        }]).unwrap();
        assert_eq!(out, vec![a, b]);

        let heavy = expr(traverse(vec![vec![edge_to(Some("generic"), vec![filter("w", ">", int(2))])]]));
        assert_eq!(
            interp.eval_value(&heavy).unwrap(),
            Value::List(vec![Value::Element(a)])
        );

        let back = expr(traverse(vec![vec![edge_from(None, Vec::new())]]));
        assert_eq!(
            interp.eval_value(&back).unwrap(),
            Value::List(vec![Value::Element(b)])
        );
    }

    #[test]
    fn test_missing_filter_field_is_an_error() {
        let mut h = Harness::new();
        let root = node(&mut h, "generic", 0);
        let a = node(&mut h, "generic", 1);
        edge(&mut h, root, a, 5);
        let mut interp = h.interp();
        interp.scope_mut().locals.insert("here".into(), Value::Element(root));
        let bad = expr(traverse(vec![vec![edge_to(Some("generic"), vec![filter("nope", "==", int(1))])]]));
        let err = interp.eval_value(&bad).unwrap_err();
        assert!(err.to_string().contains("nope not present in object"));
    }

    #[test]
    fn test_ignored_nodes_are_not_reached() {
        let mut h = Harness::new();
        let root = node(&mut h, "generic", 0);
        let a = node(&mut h, "generic", 1);
        let b = node(&mut h, "generic", 2);
        edge(&mut h, root, a, 1);
        edge(&mut h, root, b, 1);
        let mut walker = Element::walker("w", h.master);
        walker.as_walker_mut().unwrap().ignore_node_ids.insert(a);
        let mut interp = h.interp();
        interp.walker = Some(walker);
        interp.scope_mut().locals.insert("here".into(), Value::Element(root));
        let (out, edges) = interp.edge_ref(&[RefStep::Edge {
            direction: Direction::Any,
            arch: None,
            filters: Vec::new(),
        }]).unwrap();
        assert_eq!(out, vec![b]);
        assert_eq!(edges.len(), 1);
    }
}
