//! Compiled architypes
//!
//! An [`Architype`] is the runnable form of one `node`, `edge`, `walker` or
//! `graph` declaration, owned by the sentinel that registered it. Abilities
//! are pre-split by trigger event so dispatch never re-scans the body.

use jac_foundation::{ArchKind, ElementId, SourceLoc};
use jac_ir::{AbilityDef, AbilityEvent, ArchBody, ArchDef, GraphBlock, HasVar, WalkerItem};

/// A declaration ready to instantiate and dispatch against.
#[derive(Debug, Clone, PartialEq)]
pub struct Architype {
    /// Store record standing for this architype.
    pub record: ElementId,
    /// Owning sentinel.
    pub sentinel: ElementId,
    pub kind: ArchKind,
    pub name: String,
    pub supers: Vec<String>,
    pub has_vars: Vec<HasVar>,
    pub private_vars: Vec<String>,
    pub anchor: Option<String>,
    entry: Vec<AbilityDef>,
    exit: Vec<AbilityDef>,
    activity: Vec<AbilityDef>,
    pub walker: Vec<WalkerItem>,
    pub graph: Option<GraphBlock>,
    pub loc: SourceLoc,
}

impl Architype {
    /// Check a declaration and split its body.
    ///
    /// Errors are compile-time messages for the sentinel's error list.
    pub fn compile(def: &ArchDef, record: ElementId, sentinel: ElementId) -> Result<Self, String> {
        let anchors = def.body.has.iter().filter(|h| h.anchor).count();
        if anchors > 1 {
            return Err(format!(
                "{}: {} {} declares {anchors} anchor vars, only one is allowed",
                def.loc, def.kind, def.name
            ));
        }
        if def.kind == ArchKind::Graph && def.body.graph.is_none() {
            return Err(format!(
                "{}: graph {} has no spawn block",
                def.loc, def.name
            ));
        }
        if def.kind == ArchKind::Walker && !def.supers.is_empty() {
            return Err(format!(
                "{}: walker {} cannot inherit from other architypes",
                def.loc, def.name
            ));
        }
        for (i, has) in def.body.has.iter().enumerate() {
            if def.body.has[..i].iter().any(|h| h.name == has.name) {
                return Err(format!(
                    "{}: has variable {} declared twice in {}",
                    has.loc, has.name, def.name
                ));
            }
        }

        let mut arch = Self::empty(def.kind, &def.name, record, sentinel);
        arch.supers = def.supers.clone();
        arch.loc = def.loc.clone();
        arch.load_body(&def.body);
        Ok(arch)
    }

    /// Built-in architypes every sentinel carries (`node::root`, `node::generic`,
    /// `edge::generic`).
    pub fn builtin(kind: ArchKind, name: &str, record: ElementId, sentinel: ElementId) -> Self {
        Self::empty(kind, name, record, sentinel)
    }

    fn empty(kind: ArchKind, name: &str, record: ElementId, sentinel: ElementId) -> Self {
        Self {
            record,
            sentinel,
            kind,
            name: name.to_string(),
            supers: Vec::new(),
            has_vars: Vec::new(),
            private_vars: Vec::new(),
            anchor: None,
            entry: Vec::new(),
            exit: Vec::new(),
            activity: Vec::new(),
            walker: Vec::new(),
            graph: None,
            loc: SourceLoc::default(),
        }
    }

    fn load_body(&mut self, body: &ArchBody) {
        self.has_vars = body.has.clone();
        self.private_vars = body.private_vars().map(str::to_string).collect();
        self.anchor = body.anchor().map(str::to_string);
        for ability in &body.abilities {
            let bucket = match ability.event {
                AbilityEvent::Entry => &mut self.entry,
                AbilityEvent::Exit => &mut self.exit,
                AbilityEvent::Activity => &mut self.activity,
            };
            bucket.push(ability.clone());
        }
        self.walker = body.walker.clone();
        self.graph = body.graph.clone();
    }

    pub fn abilities(&self, event: AbilityEvent) -> &[AbilityDef] {
        match event {
            AbilityEvent::Entry => &self.entry,
            AbilityEvent::Exit => &self.exit,
            AbilityEvent::Activity => &self.activity,
        }
    }

    /// First ability with `name`, searching entry, exit then activity.
    pub fn ability(&self, name: &str) -> Option<&AbilityDef> {
        self.entry
            .iter()
            .chain(&self.exit)
            .chain(&self.activity)
            .find(|a| a.name == name)
    }

    pub fn declares(&self, var: &str) -> bool {
        self.has_vars.iter().any(|h| h.name == var)
    }

    pub fn is_private(&self, var: &str) -> bool {
        self.private_vars.iter().any(|p| p == var)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use jac_ir::{AbilityBody, Expr};

    fn has(name: &str, anchor: bool) -> HasVar {
        HasVar {
            name: name.to_string(),
            private: name.starts_with('_'),
            anchor,
            default: Some(Expr::literal(0i64)),
            loc: SourceLoc::default(),
        }
    }

    fn ability(name: &str, event: AbilityEvent) -> AbilityDef {
        AbilityDef {
            name: name.to_string(),
            event,
            access_list: Vec::new(),
            body: AbilityBody::Code(Vec::new()),
            loc: SourceLoc::default(),
        }
    }

    fn def(kind: ArchKind, body: ArchBody) -> ArchDef {
        ArchDef {
            kind,
            name: "thing".to_string(),
            supers: Vec::new(),
            body,
            loc: SourceLoc::new(3, 1, "main.jac"),
        }
    }

    #[test]
    fn test_compile_splits_abilities() {
        let body = ArchBody {
            has: vec![has("a", true), has("_secret", false)],
            abilities: vec![
                ability("greet", AbilityEvent::Entry),
                ability("bye", AbilityEvent::Exit),
                ability("work", AbilityEvent::Activity),
            ],
            ..Default::default()
        };
        let arch = Architype::compile(&def(ArchKind::Node, body), ElementId::new(), ElementId::new())
            .unwrap();
        assert_eq!(arch.abilities(AbilityEvent::Entry).len(), 1);
        assert_eq!(arch.ability("work").map(|a| a.event), Some(AbilityEvent::Activity));
        assert_eq!(arch.anchor.as_deref(), Some("a"));
        assert!(arch.is_private("_secret"));
        assert!(arch.declares("a"));
        assert!(!arch.declares("b"));
    }

    #[test]
    fn test_compile_rejects_two_anchors() {
        let body = ArchBody {
            has: vec![has("a", true), has("b", true)],
            ..Default::default()
        };
        let err = Architype::compile(&def(ArchKind::Node, body), ElementId::new(), ElementId::new())
            .unwrap_err();
        assert!(err.contains("main.jac:3:1"));
        assert!(err.contains("anchor"));
    }

    #[test]
    fn test_compile_rejects_graph_without_block() {
        let err = Architype::compile(
            &def(ArchKind::Graph, ArchBody::default()),
            ElementId::new(),
            ElementId::new(),
        )
        .unwrap_err();
        assert!(err.contains("spawn block"));
    }
}
