//! Integration test harness for Jac.
//!
//! Drives the full pipeline: parse tree → bytecode → lowering → sentinel
//! registration → walker runs against a fresh master and root graph.

use indexmap::IndexMap;

use jac_foundation::{ElementId, Value};
use jac_ir::build::program;
use jac_ir::SyntaxNode;
use jac_runtime::{RunReport, Runtime, RuntimeConfig};

/// A runtime with one master, one registered program and one root graph.
pub struct TestHarness {
    runtime: Runtime,
    master: ElementId,
    sentinel: ElementId,
    root: ElementId,
}

impl TestHarness {
    /// Register `elements` as a program under default config.
    ///
    /// # Panics
    ///
    /// Panics if the program does not register as an active sentinel.
    pub fn new(elements: Vec<SyntaxNode>) -> Self {
        Self::with_config(elements, RuntimeConfig::default())
    }

    pub fn with_config(elements: Vec<SyntaxNode>, config: RuntimeConfig) -> Self {
        let config = RuntimeConfig {
            rng_seed: config.rng_seed.or(Some(42)),
            ..config
        };
        let mut runtime = Runtime::new(config).expect("invalid test config");
        let master = runtime.create_master("tester");
        let sentinel = runtime
            .sentinel_register(master, "test", &program(elements))
            .expect("registration failed");
        let registered = runtime.sentinel(sentinel).expect("sentinel missing");
        assert!(
            registered.is_active,
            "program did not compile: {:?}",
            registered.errors
        );
        let root = runtime.graph_create(master, None).expect("graph creation failed");
        Self {
            runtime,
            master,
            sentinel,
            root,
        }
    }

    /// Run `walker` from the root with no context.
    ///
    /// # Panics
    ///
    /// Panics if the runtime refuses to start the walker.
    pub fn run(&mut self, walker: &str) -> RunReport {
        self.run_with(walker, Vec::new())
    }

    pub fn run_with(&mut self, walker: &str, ctx: Vec<(&str, Value)>) -> RunReport {
        let root = self.root;
        self.run_from(walker, root, ctx)
    }

    pub fn run_from(&mut self, walker: &str, start: ElementId, ctx: Vec<(&str, Value)>) -> RunReport {
        let ctx: IndexMap<String, Value> = ctx.into_iter().map(|(k, v)| (k.to_string(), v)).collect();
        self.runtime
            .walker_run(self.master, walker, Some(start), &ctx)
            .unwrap_or_else(|err| panic!("walker {walker} did not start: {err}"))
    }

    pub fn runtime(&mut self) -> &mut Runtime {
        &mut self.runtime
    }

    pub fn master(&self) -> ElementId {
        self.master
    }

    pub fn sentinel(&self) -> ElementId {
        self.sentinel
    }

    pub fn root(&self) -> ElementId {
        self.root
    }

    /// Element counts by kind.
    pub fn distribution(&self) -> IndexMap<String, usize> {
        self.runtime.object_distribution()
    }

    /// Captured `std.out`/`std.log` text so far.
    pub fn stdout(&self) -> &str {
        self.runtime.output().stdout()
    }
}

/// The `jid` of a reported element.
pub fn jid(report: &serde_json::Value) -> Option<ElementId> {
    report.get("jid")?.as_str().and_then(ElementId::parse_ref)
}
