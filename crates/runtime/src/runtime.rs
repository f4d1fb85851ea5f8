//! Runtime facade
//!
//! [`Runtime`] owns the graph store, the registered sentinels and the shared
//! services (architype cache, actions, output capture, rng), and exposes the
//! master-level API: registering programs, creating graphs, running walkers
//! and reading or writing node context.

use indexmap::IndexMap;
use rand::rngs::StdRng;
use rand::SeedableRng;
use tracing::{debug, info, warn};

use jac_foundation::{ArchKind, ElementId, Value};
use jac_ir::{lower, SyntaxNode};
use jac_store::{Element, GraphStore, MasterBody, MemoryStore};
use jac_vm::compile_tree;

use crate::actions::ActionRegistry;
use crate::arch_cache::ArchCache;
use crate::config::RuntimeConfig;
use crate::env::Env;
use crate::error::{Error, Result};
use crate::interp::Interp;
use crate::output::OutputBuffer;
use crate::sentinel::{Sentinel, TestSummary};
use crate::walker::{RunReport, Walker};

/// Store global naming the sentinel any master may fall back to.
pub const GLOBAL_SENTINEL: &str = "GLOB_SENTINEL";

pub struct Runtime<S: GraphStore = MemoryStore> {
    store: S,
    sentinels: IndexMap<ElementId, Sentinel>,
    cache: ArchCache,
    actions: ActionRegistry,
    output: OutputBuffer,
    rng: StdRng,
    config: RuntimeConfig,
}

impl Runtime<MemoryStore> {
    /// Runtime over a fresh in-memory store.
    pub fn new(config: RuntimeConfig) -> Result<Self> {
        Self::with_store(MemoryStore::new(), config)
    }
}

impl<S: GraphStore + 'static> Runtime<S> {
    pub fn with_store(store: S, config: RuntimeConfig) -> Result<Self> {
        config.validate()?;
        let rng = match config.rng_seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        Ok(Self {
            store,
            sentinels: IndexMap::new(),
            cache: ArchCache::new(),
            actions: ActionRegistry::with_builtins(),
            output: OutputBuffer::new(),
            rng,
            config,
        })
    }

    pub fn config(&self) -> &RuntimeConfig {
        &self.config
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn store_mut(&mut self) -> &mut S {
        &mut self.store
    }

    pub fn actions_mut(&mut self) -> &mut ActionRegistry {
        &mut self.actions
    }

    pub fn output(&self) -> &OutputBuffer {
        &self.output
    }

    pub fn output_mut(&mut self) -> &mut OutputBuffer {
        &mut self.output
    }

    pub fn sentinel(&self, id: ElementId) -> Option<&Sentinel> {
        self.sentinels.get(&id)
    }

    fn env(&mut self, master: ElementId, sentinel: Option<ElementId>) -> Env<'_> {
        Env {
            store: &mut self.store,
            sentinels: &self.sentinels,
            cache: &mut self.cache,
            actions: &self.actions,
            output: &mut self.output,
            rng: &mut self.rng,
            config: &self.config,
            master,
            sentinel,
        }
    }

    // ------------------------------------------------------------------
    // Masters
    // ------------------------------------------------------------------

    pub fn create_master(&mut self, name: &str) -> ElementId {
        let master = Element::master(name);
        let id = master.id();
        self.store.save(id, master, true);
        info!(master = %id, name, "master created");
        id
    }

    fn master_body(&mut self, master: ElementId) -> Result<MasterBody> {
        self.store
            .get(master, master)
            .and_then(|m| m.as_master().cloned())
            .ok_or(Error::ElementNotFound(master))
    }

    fn update_master(&mut self, master: ElementId, f: impl FnOnce(&mut MasterBody)) -> Result<()> {
        let mut element = self
            .store
            .get(master, master)
            .ok_or(Error::ElementNotFound(master))?;
        let body = element
            .as_master_mut()
            .ok_or_else(|| Error::rt(format!("{} is not a master", master.urn())))?;
        f(body);
        element.touch();
        self.store.save(master, element, true);
        Ok(())
    }

    // ------------------------------------------------------------------
    // Sentinels
    // ------------------------------------------------------------------

    /// Compile `tree` into a new sentinel owned by `master` and make it the
    /// master's active sentinel.
    pub fn sentinel_register(&mut self, master: ElementId, name: &str, tree: &SyntaxNode) -> Result<ElementId> {
        let record = Element::sentinel(name, master);
        let id = record.id();
        if !self.store.save(master, record, true) {
            return Err(Error::rt(format!("Unable to create sentinel {name}")));
        }
        self.sentinels.insert(id, Sentinel::new(id, name, master));
        self.sentinel_set(master, id, tree)?;
        self.set_active_sentinel(master, id)?;
        Ok(id)
    }

    /// Replace the program of `sentinel` with `tree`. Returns whether the
    /// sentinel is active afterwards; compile errors stay on the sentinel.
    pub fn sentinel_set(&mut self, master: ElementId, sentinel: ElementId, tree: &SyntaxNode) -> Result<bool> {
        let mut target = self
            .sentinels
            .shift_remove(&sentinel)
            .ok_or(Error::SentinelNotFound(sentinel))?;
        let mut tree = tree.clone();
        if self.config.use_bytecode {
            let compiled = compile_tree(&mut tree, self.config.debug_info);
            debug!(sentinel = %sentinel, expressions = compiled, "bytecode attached");
        }
        let active = match lower(&tree) {
            Ok(program) => {
                let mut env = self.env(master, Some(sentinel));
                target.register(&program, &mut env)
            }
            Err(err) => {
                warn!(sentinel = %sentinel, "program rejected: {err}");
                target.errors = vec![err.to_string()];
                target.is_active = false;
                false
            }
        };
        self.sentinels.insert(sentinel, target);
        Ok(active)
    }

    /// Remove a sentinel, its architype records and anything cached for it.
    pub fn sentinel_delete(&mut self, master: ElementId, sentinel: ElementId) -> Result<()> {
        let removed = self
            .sentinels
            .shift_remove(&sentinel)
            .ok_or(Error::SentinelNotFound(sentinel))?;
        self.store.destroy(removed.master, sentinel);
        self.cache.invalidate_sentinel(sentinel);
        self.update_master(master, |body| {
            if body.active_sentinel == Some(sentinel) {
                body.active_sentinel = None;
            }
        })?;
        if self.global_sentinel() == Some(sentinel) {
            self.store.destroy_glob(GLOBAL_SENTINEL);
        }
        info!(sentinel = %sentinel, "sentinel deleted");
        Ok(())
    }

    pub fn set_active_sentinel(&mut self, master: ElementId, sentinel: ElementId) -> Result<()> {
        if !self.sentinels.contains_key(&sentinel) {
            return Err(Error::SentinelNotFound(sentinel));
        }
        self.update_master(master, |body| body.active_sentinel = Some(sentinel))
    }

    pub fn active_sentinel(&mut self, master: ElementId) -> Option<ElementId> {
        self.master_body(master).ok().and_then(|b| b.active_sentinel)
    }

    /// Publish `sentinel` as the global sentinel. Only super masters may.
    pub fn global_sentinel_set(&mut self, master: ElementId, sentinel: ElementId) -> Result<()> {
        if !self.store.is_super(master) {
            return Err(Error::rt("Only super masters can set the global sentinel"));
        }
        if !self.sentinels.contains_key(&sentinel) {
            return Err(Error::SentinelNotFound(sentinel));
        }
        self.store.save_glob(GLOBAL_SENTINEL, sentinel.urn());
        info!(sentinel = %sentinel, "global sentinel set");
        Ok(())
    }

    pub fn global_sentinel(&mut self) -> Option<ElementId> {
        self.store
            .get_glob(GLOBAL_SENTINEL)
            .and_then(|urn| ElementId::parse_ref(&urn))
    }

    /// Make the global sentinel `master`'s active one.
    pub fn sentinel_active_global(&mut self, master: ElementId) -> Result<ElementId> {
        let sentinel = self
            .global_sentinel()
            .ok_or_else(|| Error::rt("No global sentinel is set"))?;
        self.set_active_sentinel(master, sentinel)?;
        Ok(sentinel)
    }

    /// Active, registered sentinel of `master`.
    fn ready_sentinel(&mut self, master: ElementId) -> Result<ElementId> {
        let id = self
            .active_sentinel(master)
            .ok_or(Error::NoActiveSentinel(master))?;
        let sentinel = self.sentinels.get(&id).ok_or(Error::SentinelNotFound(id))?;
        if !sentinel.is_active {
            return Err(Error::InactiveSentinel(id));
        }
        Ok(id)
    }

    // ------------------------------------------------------------------
    // Graphs and walkers
    // ------------------------------------------------------------------

    /// Create a graph for `master`: a bare root, or the sub-graph of the
    /// named graph architype. The root becomes the master's default start.
    pub fn graph_create(&mut self, master: ElementId, graph: Option<&str>) -> Result<ElementId> {
        let root = {
            let mut env = self.env(master, None);
            let mut interp = Interp::new(env.reborrow());
            match graph {
                Some(name) => interp.spawn_graph(name)?,
                None => {
                    let node = interp.instantiate(ArchKind::Node, "root")?;
                    let id = node.id();
                    interp.save_element(node)?;
                    id
                }
            }
        };
        self.update_master(master, |body| {
            body.graphs.insert(root);
        })?;
        info!(master = %master, root = %root, graph = graph.unwrap_or("root"), "graph created");
        Ok(root)
    }

    /// Run walker `name` for `master` from `start`, or from the master's
    /// first graph. A walker that yielded on an earlier run resumes instead
    /// of a fresh one being spawned.
    pub fn walker_run(
        &mut self,
        master: ElementId,
        name: &str,
        start: Option<ElementId>,
        ctx: &IndexMap<String, Value>,
    ) -> Result<RunReport> {
        let sentinel = self.ready_sentinel(master)?;
        let body = self.master_body(master)?;
        let start = start
            .or_else(|| body.graphs.first().copied())
            .ok_or(Error::NoGraph(master))?;
        let resumed = body
            .yielded_walkers
            .get(name)
            .copied()
            .filter(|id| self.store.contains(*id));

        let (report, walker_id) = {
            let mut env = self.env(master, Some(sentinel));
            let mut walker = match resumed {
                Some(id) => Walker::load(env.reborrow(), id)?,
                None => {
                    let arch = env.arch(ArchKind::Walker, name)?;
                    Walker::spawn(env.reborrow(), arch)?
                }
            };
            let report = walker.run(Some(start), Some(ctx));
            (report, walker.id())
        };

        if report.yielded {
            self.update_master(master, |body| {
                body.yielded_walkers.insert(name.to_string(), walker_id);
            })?;
        } else {
            self.update_master(master, |body| {
                body.yielded_walkers.shift_remove(name);
            })?;
            self.store.destroy(master, walker_id);
        }
        let committed = self.store.commit();
        info!(
            master = %master,
            walker = name,
            success = report.success,
            yielded = report.yielded,
            reports = report.report.len(),
            committed,
            "walker run"
        );
        Ok(report)
    }

    /// Update declared has-vars of a node. Unknown keys are skipped with a
    /// warning. Returns the resulting context.
    pub fn set_node_context(
        &mut self,
        master: ElementId,
        node: ElementId,
        ctx: &IndexMap<String, Value>,
    ) -> Result<IndexMap<String, Value>> {
        let mut env = self.env(master, None);
        let mut interp = Interp::new(env.reborrow());
        let mut element = interp.element(node)?;
        let arch = interp.arch_for(&element)?;
        let lineage = interp.env.lineage(&arch);
        for (key, value) in ctx {
            if lineage.iter().any(|a| a.declares(key)) {
                element.context.insert(key.clone(), value.clone());
            } else {
                warn!(node = %node, key = %key, "not a has-var of {}, skipped", element.name);
            }
        }
        interp.save_element(element.clone())?;
        Ok(interp.visible_context(&element))
    }

    /// Context of a node with private has-vars left out.
    pub fn get_node_context(&mut self, master: ElementId, node: ElementId) -> Result<IndexMap<String, Value>> {
        let mut env = self.env(master, None);
        let mut interp = Interp::new(env.reborrow());
        let element = interp.element(node)?;
        Ok(interp.visible_context(&element))
    }

    /// Run the test cases of `master`'s active sentinel.
    pub fn run_tests(&mut self, master: ElementId, filter: Option<&str>) -> Result<TestSummary> {
        let id = self
            .active_sentinel(master)
            .ok_or(Error::NoActiveSentinel(master))?;
        let mut env = self.env(master, Some(id));
        let sentinels = env.sentinels;
        let sentinel = sentinels.get(&id).ok_or(Error::SentinelNotFound(id))?;
        Ok(sentinel.run_tests(&mut env, filter))
    }

    // ------------------------------------------------------------------
    // Store maintenance
    // ------------------------------------------------------------------

    pub fn flush_arch_cache(&mut self) -> usize {
        self.cache.flush()
    }

    pub fn commit(&mut self) -> usize {
        self.store.commit()
    }

    pub fn pending_count(&self) -> usize {
        self.store.pending_count()
    }

    pub fn object_distribution(&self) -> IndexMap<String, usize> {
        self.store.object_distribution()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use jac_ir::build::*;

    fn program_tree() -> SyntaxNode {
        program(vec![
            node_arch("person", &[], vec![has(vec![
                HasSpec::new("name"),
                HasSpec::new("secret").private(),
            ])]),
            walker_arch("greet", vec![report(string("hi"))]),
        ])
    }

    #[test]
    fn test_register_activates_sentinel() {
        let mut rt = Runtime::new(RuntimeConfig::default()).unwrap();
        let master = rt.create_master("alice");
        let sentinel = rt.sentinel_register(master, "main", &program_tree()).unwrap();
        assert_eq!(rt.active_sentinel(master), Some(sentinel));
        assert!(rt.sentinel(sentinel).unwrap().is_active);
    }

    #[test]
    fn test_walker_run_needs_sentinel_and_graph() {
        let mut rt = Runtime::new(RuntimeConfig::default()).unwrap();
        let master = rt.create_master("alice");
        let err = rt.walker_run(master, "greet", None, &IndexMap::new()).unwrap_err();
        assert!(matches!(err, Error::NoActiveSentinel(_)));

        rt.sentinel_register(master, "main", &program_tree()).unwrap();
        let err = rt.walker_run(master, "greet", None, &IndexMap::new()).unwrap_err();
        assert!(matches!(err, Error::NoGraph(_)));

        rt.graph_create(master, None).unwrap();
        let report = rt.walker_run(master, "greet", None, &IndexMap::new()).unwrap();
        assert!(report.success);
        assert_eq!(report.report, vec![serde_json::json!("hi")]);
        assert_eq!(rt.pending_count(), 0);
    }

    #[test]
    fn test_broken_program_leaves_sentinel_inactive() {
        let mut rt = Runtime::new(RuntimeConfig::default()).unwrap();
        let master = rt.create_master("alice");
        let tree = program(vec![
            walker_arch("w", vec![]),
            walker_arch("w", vec![]),
        ]);
        let sentinel = rt.sentinel_register(master, "dup", &tree).unwrap();
        let registered = rt.sentinel(sentinel).unwrap();
        assert!(!registered.is_active);
        assert!(registered.errors[0].contains("already defined"));
        rt.graph_create(master, None).unwrap();
        let err = rt.walker_run(master, "w", None, &IndexMap::new()).unwrap_err();
        assert!(matches!(err, Error::InactiveSentinel(_)));
    }

    #[test]
    fn test_node_context_hides_private_and_skips_unknown() {
        let mut rt = Runtime::new(RuntimeConfig::default()).unwrap();
        let master = rt.create_master("alice");
        rt.sentinel_register(master, "main", &program_tree()).unwrap();
        let node = {
            let mut env = rt.env(master, None);
            let mut interp = Interp::new(env.reborrow());
            let node = interp.instantiate(ArchKind::Node, "person").unwrap();
            let id = node.id();
            interp.save_element(node).unwrap();
            id
        };
        let ctx = IndexMap::from([
            ("name".to_string(), Value::str("Ann")),
            ("secret".to_string(), Value::Int(1)),
            ("bogus".to_string(), Value::Int(2)),
        ]);
        let visible = rt.set_node_context(master, node, &ctx).unwrap();
        assert_eq!(visible.get("name"), Some(&Value::str("Ann")));
        assert!(!visible.contains_key("secret"));
        assert!(!visible.contains_key("bogus"));
    }

    #[test]
    fn test_global_sentinel_needs_super_master() {
        let mut rt = Runtime::new(RuntimeConfig::default()).unwrap();
        let master = rt.create_master("alice");
        let sentinel = rt.sentinel_register(master, "main", &program_tree()).unwrap();
        assert!(rt.global_sentinel_set(master, sentinel).is_err());
        rt.store_mut().grant_super(master);
        rt.global_sentinel_set(master, sentinel).unwrap();

        let other = rt.create_master("bob");
        assert_eq!(rt.sentinel_active_global(other).unwrap(), sentinel);
        assert_eq!(rt.active_sentinel(other), Some(sentinel));
    }
}
