//! Sentinels
//!
//! A sentinel is the registered form of a whole Jac program: its compiled
//! architypes, evaluated globals and test cases. Registration is all or
//! nothing for activation. Any compile error leaves the sentinel inactive
//! and the errors are kept on it rather than returned.

use std::collections::HashSet;
use std::sync::Arc;

use indexmap::{IndexMap, IndexSet};
use serde::Serialize;
use tracing::{debug, info, warn};

use jac_foundation::{ArchKind, ElementId, Value};
use jac_ir::{ArchDef, Program, TestCase, TestGraph, TestWalker};
use jac_store::{graph, Element, GraphStore};

use crate::architype::Architype;
use crate::env::Env;
use crate::error::{Error, Result};
use crate::interp::Interp;
use crate::walker::{RunReport, Walker};

const BUILTINS: [(ArchKind, &str); 3] = [
    (ArchKind::Node, "root"),
    (ArchKind::Node, "generic"),
    (ArchKind::Edge, "generic"),
];

/// A registered program.
#[derive(Debug, Clone)]
pub struct Sentinel {
    id: ElementId,
    pub name: String,
    pub master: ElementId,
    archs: IndexMap<(ArchKind, String), Arc<Architype>>,
    pub global_vars: IndexMap<String, Value>,
    pub tests: Vec<TestCase>,
    /// Compile errors from the last registration.
    pub errors: Vec<String>,
    pub is_active: bool,
}

/// Outcome of one test case.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TestDetail {
    pub title: String,
    pub passed: bool,
    pub errors: Vec<String>,
    pub stdout: String,
    pub stderr: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct TestSummary {
    pub tests: usize,
    pub passed: usize,
    pub failed: usize,
    pub success: bool,
    pub details: Vec<TestDetail>,
}

impl Sentinel {
    pub fn new(id: ElementId, name: impl Into<String>, master: ElementId) -> Self {
        Self {
            id,
            name: name.into(),
            master,
            archs: IndexMap::new(),
            global_vars: IndexMap::new(),
            tests: Vec::new(),
            errors: Vec::new(),
            is_active: false,
        }
    }

    pub fn id(&self) -> ElementId {
        self.id
    }

    pub fn arch(&self, kind: ArchKind, name: &str) -> Option<Arc<Architype>> {
        self.archs.get(&(kind, name.to_string())).cloned()
    }

    pub fn architypes(&self) -> impl Iterator<Item = &Arc<Architype>> {
        self.archs.values()
    }

    /// Compile `program` into this sentinel, replacing whatever it held.
    ///
    /// Returns whether the sentinel ended up active.
    pub fn register(&mut self, program: &Program, env: &mut Env<'_>) -> bool {
        self.clear(env);
        for (kind, name) in BUILTINS {
            let record = self.new_record(kind, name);
            self.insert(env, Architype::builtin(kind, name, record.id(), self.id), record);
        }

        let mut defined = 0;
        for def in program.architypes() {
            if self.compile(env, def) {
                defined += 1;
            }
        }
        self.check_supers();
        self.load_globals(program, env);
        self.tests = program.tests().cloned().collect();

        for err in &self.errors {
            warn!(sentinel = %self.id, "{err}");
        }
        if defined == 0 {
            warn!(sentinel = %self.id, "program defines no architypes");
        }
        self.is_active = self.errors.is_empty() && defined > 0;
        self.persist(env);
        info!(
            sentinel = %self.id,
            name = %self.name,
            archs = self.archs.len(),
            globals = self.global_vars.len(),
            tests = self.tests.len(),
            active = self.is_active,
            "sentinel registered"
        );
        self.is_active
    }

    fn new_record(&self, kind: ArchKind, name: &str) -> Element {
        Element::architype(kind, name, self.master, self.id)
    }

    fn compile(&mut self, env: &mut Env<'_>, def: &ArchDef) -> bool {
        let key = (def.kind, def.name.clone());
        let builtin = BUILTINS.contains(&(def.kind, def.name.as_str()));
        if self.archs.contains_key(&key) && !builtin {
            self.errors
                .push(format!("{}: {} {} already defined", def.loc, def.kind, def.name));
            return false;
        }
        let record = self.new_record(def.kind, &def.name);
        match Architype::compile(def, record.id(), self.id) {
            Ok(arch) => {
                self.insert(env, arch, record);
                true
            }
            Err(msg) => {
                self.errors.push(msg);
                false
            }
        }
    }

    fn insert(&mut self, env: &mut Env<'_>, arch: Architype, record: Element) {
        if let Some(old) = self.archs.get(&(arch.kind, arch.name.clone())) {
            env.store.destroy(self.master, old.record);
        }
        env.store.save(self.master, record, true);
        self.archs
            .insert((arch.kind, arch.name.clone()), Arc::new(arch));
    }

    fn check_supers(&mut self) {
        for arch in self.archs.values() {
            for sup in &arch.supers {
                if !self.archs.contains_key(&(arch.kind, sup.clone())) {
                    self.errors.push(format!(
                        "{}: super architype {}::{} of {} not found",
                        arch.loc, arch.kind, sup, arch.name
                    ));
                }
            }
        }
    }

    fn load_globals(&mut self, program: &Program, env: &mut Env<'_>) {
        for global in program.globals() {
            if self.global_vars.contains_key(&global.name) {
                self.errors.push(format!(
                    "{}: Global {} already defined!",
                    global.loc, global.name
                ));
                continue;
            }
            let mut interp = Interp::new(env.reborrow());
            interp.globals = self.global_vars.clone();
            match interp.eval_value(&global.value) {
                Ok(value) => {
                    self.global_vars.insert(global.name.clone(), value);
                }
                Err(err) => self.errors.push(format!("{}: {err}", global.loc)),
            }
        }
    }

    fn clear(&mut self, env: &mut Env<'_>) {
        for arch in self.archs.values() {
            env.store.destroy(self.master, arch.record);
        }
        env.cache.invalidate_sentinel(self.id);
        self.archs.clear();
        self.global_vars.clear();
        self.tests.clear();
        self.errors.clear();
        self.is_active = false;
    }

    fn persist(&self, env: &mut Env<'_>) {
        let Some(mut element) = env.store.get(self.master, self.id) else {
            warn!(sentinel = %self.id, "sentinel record missing from store");
            return;
        };
        if let Some(body) = element.as_sentinel_mut() {
            body.arch_ids = self.archs.values().map(|a| a.record).collect();
            body.is_active = self.is_active;
        }
        element.touch();
        env.store.save(self.master, element, true);
    }

    /// `arch` followed by its supers, depth first, each once.
    pub fn lineage(&self, arch: &Arc<Architype>) -> Vec<Arc<Architype>> {
        let mut out = vec![arch.clone()];
        let mut seen = HashSet::from([arch.name.clone()]);
        self.collect_supers(arch, &mut out, &mut seen);
        out
    }

    fn collect_supers(
        &self,
        arch: &Architype,
        out: &mut Vec<Arc<Architype>>,
        seen: &mut HashSet<String>,
    ) {
        for name in &arch.supers {
            if !seen.insert(name.clone()) {
                continue;
            }
            if let Some(sup) = self.arch(arch.kind, name) {
                out.push(sup.clone());
                self.collect_supers(&sup, out, seen);
            }
        }
    }

    /// Names of every `kind` architype that is, or inherits from, `name`.
    pub fn family(&self, kind: ArchKind, name: &str) -> IndexSet<String> {
        let mut names = IndexSet::from([name.to_string()]);
        for arch in self.archs.values().filter(|a| a.kind == kind) {
            if self.lineage(arch).iter().any(|a| a.name == name) {
                names.insert(arch.name.clone());
            }
        }
        names
    }

    /// Record standing for a new instance of `kind::name` owned by `caller`.
    ///
    /// The sentinel's owner gets the canonical record; any other master gets
    /// an unsaved copy owned by itself.
    pub fn spawn_architype(
        &self,
        store: &mut dyn GraphStore,
        kind: ArchKind,
        name: &str,
        caller: ElementId,
    ) -> Option<Element> {
        let arch = self.archs.get(&(kind, name.to_string()))?;
        let record = store.get(self.master, arch.record)?;
        if caller == self.master {
            Some(record)
        } else {
            Some(record.duplicate(caller))
        }
    }

    /// Summary behind `global.info`.
    pub fn info(&self) -> IndexMap<String, Value> {
        let mut info = IndexMap::new();
        info.insert("name".to_string(), Value::str(&self.name));
        info.insert("jid".to_string(), Value::str(self.id.urn()));
        info.insert("master".to_string(), Value::str(self.master.urn()));
        info.insert("is_active".to_string(), Value::Bool(self.is_active));
        info.insert("architypes".to_string(), Value::Int(self.archs.len() as i64));
        info
    }

    /// Run the program's test cases, optionally only those whose title
    /// contains `filter`.
    pub fn run_tests(&self, env: &mut Env<'_>, filter: Option<&str>) -> TestSummary {
        let mut summary = TestSummary::default();
        let selected = self
            .tests
            .iter()
            .filter(|t| filter.map_or(true, |f| t.title.contains(f)));
        for test in selected {
            env.output.clear();
            let mut cleanup = Vec::new();
            let outcome = self.exercise(env, test, &mut cleanup);
            self.tear_down(env, &cleanup);
            let (stdout, stderr) = env.output.take();

            let (passed, errors) = match outcome {
                Ok(report) => {
                    let mut errors = report.errors.clone();
                    errors.extend(report.stack_trace.iter().cloned());
                    (report.success, errors)
                }
                Err(err) => (false, vec![err.to_string()]),
            };
            debug!(title = %test.title, passed, "test finished");
            summary.tests += 1;
            if passed {
                summary.passed += 1;
            } else {
                summary.failed += 1;
            }
            summary.details.push(TestDetail {
                title: test.title.clone(),
                passed,
                errors,
                stdout,
                stderr,
            });
        }
        summary.success = summary.failed == 0;
        info!(
            sentinel = %self.id,
            tests = summary.tests,
            passed = summary.passed,
            failed = summary.failed,
            "tests run"
        );
        summary
    }

    fn exercise(
        &self,
        env: &mut Env<'_>,
        test: &TestCase,
        cleanup: &mut Vec<ElementId>,
    ) -> Result<RunReport> {
        let mut interp = Interp::new(env.reborrow());
        let root = match &test.graph {
            TestGraph::Ref(name) => interp.spawn_graph(name),
            TestGraph::Inline(block) => interp.run_graph_block(block),
        };
        // a graph that fails halfway still leaves its nodes behind
        cleanup.append(&mut interp.spawned);
        let root = root?;
        cleanup.push(root);

        let (arch, ctx) = match &test.walker {
            TestWalker::Ref { name, ctx, .. } => {
                (interp.env.arch(ArchKind::Walker, name)?, interp.eval_ctx(ctx)?)
            }
            TestWalker::Inline(body) => {
                let def = ArchDef {
                    kind: ArchKind::Walker,
                    name: "test_walker".to_string(),
                    supers: Vec::new(),
                    body: body.clone(),
                    loc: test.loc.clone(),
                };
                let arch = Architype::compile(&def, ElementId::nil(), self.id).map_err(Error::Runtime)?;
                (Arc::new(arch), IndexMap::new())
            }
        };
        drop(interp);

        let mut walker = Walker::spawn(env.reborrow(), arch)?;
        cleanup.push(walker.id());
        walker.prime(root, Some(&ctx))?;
        let report = walker.run(None, None);
        if let TestWalker::Ref {
            asserts: Some(block),
            ..
        } = &test.walker
        {
            walker.run_block(block)?;
        }
        Ok(report)
    }

    /// Remove the fixture graph and walker, whatever the test outcome.
    fn tear_down(&self, env: &mut Env<'_>, cleanup: &[ElementId]) {
        let master = env.master;
        for id in cleanup {
            let nodes = match env.store.get(master, *id) {
                Some(element) if element.as_node().is_some() => {
                    graph::reachable(&mut *env.store, master, *id)
                }
                _ => vec![*id],
            };
            for node in nodes {
                env.store.destroy(master, node);
            }
        }
    }
}
