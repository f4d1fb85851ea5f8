//! Tree-walking interpreter
//!
//! Executes lowered IR statements against the graph store. Expressions that
//! carry bytecode run on the VM with the interpreter as its
//! [`MachineContext`](jac_vm::MachineContext); everything else (graph
//! operators, spawns, built-ins) is evaluated here directly.
//!
//! Program faults are caught at the statement that raised them, recorded
//! as a located message and execution moves on to the next statement. Inside
//! a `try` body they unwind to the handler instead.

mod builtins;
mod dispatch;
mod expr;
mod scope;
mod spawn;
mod stmt;
mod traversal;

pub use scope::Scope;

use std::sync::Arc;

use indexmap::IndexMap;
use tracing::error;

use jac_foundation::{ElementId, SourceLoc, Value};
use jac_ir::{CtrlKind, Expr};
use jac_store::{Element, WalkerState};

use crate::actions::ActionArgs;
use crate::architype::Architype;
use crate::env::Env;
use crate::error::{Error, Result};

/// Why statement execution is halted for the rest of a step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Stop {
    /// `skip`: abandon the current node only.
    Skip,
    /// `disengage`: end the walk.
    Disengage,
}

/// What a run produced besides graph changes.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RunOutput {
    pub report: Vec<serde_json::Value>,
    pub status_code: Option<i64>,
    pub custom: Option<serde_json::Value>,
    pub file: Option<serde_json::Value>,
    pub errors: Vec<String>,
    pub stack_trace: Vec<String>,
}

impl RunOutput {
    /// Fold a nested walker's output into this one.
    pub fn merge(&mut self, other: RunOutput) {
        self.report.extend(other.report);
        self.errors.extend(other.errors);
        self.stack_trace.extend(other.stack_trace);
        if other.status_code.is_some() {
            self.status_code = other.status_code;
        }
        if other.custom.is_some() {
            self.custom = other.custom;
        }
        if other.file.is_some() {
            self.file = other.file;
        }
    }
}

pub struct Interp<'a> {
    pub(crate) env: Env<'a>,
    /// Working copy of the running walker, saved back by its owner.
    pub(crate) walker: Option<Element>,
    pub(crate) walker_arch: Option<Arc<Architype>>,
    /// Sentinel globals; writes stay local to this run.
    pub(crate) globals: IndexMap<String, Value>,
    pub(crate) out: RunOutput,
    /// Architype copies made for a foreign master, saved with their instance.
    arch_copies: IndexMap<ElementId, Element>,
    /// Elements created by `spawn` during this interpreter's life.
    pub(crate) spawned: Vec<ElementId>,
    scopes: Vec<Scope>,
    stopped: Option<Stop>,
    loop_ctrl: Option<CtrlKind>,
    try_depth: usize,
    loc: SourceLoc,
    rule: &'static str,
}

impl<'a> Interp<'a> {
    pub fn new(mut env: Env<'a>) -> Self {
        let globals = env
            .current_sentinel()
            .map(|s| s.global_vars.clone())
            .unwrap_or_default();
        Self {
            env,
            walker: None,
            walker_arch: None,
            globals,
            out: RunOutput::default(),
            arch_copies: IndexMap::new(),
            spawned: Vec::new(),
            scopes: vec![Scope::default()],
            stopped: None,
            loop_ctrl: None,
            try_depth: 0,
            loc: SourceLoc::default(),
            rule: "walker",
        }
    }

    /// Name used in error locations.
    pub(crate) fn name(&self) -> String {
        self.walker
            .as_ref()
            .map(|w| w.name.clone())
            .unwrap_or_else(|| "global".to_string())
    }

    pub(crate) fn walker_id(&self) -> Option<ElementId> {
        self.walker.as_ref().map(Element::id)
    }

    pub(crate) fn walker_state(&mut self) -> Result<&mut WalkerState> {
        self.walker
            .as_mut()
            .and_then(Element::as_walker_mut)
            .ok_or_else(|| Error::rt("walker actions are only valid inside a walker"))
    }

    pub(crate) fn stopped(&self) -> Option<Stop> {
        self.stopped
    }

    /// Resume after a `skip` once the step is over.
    pub(crate) fn clear_skip(&mut self) {
        if self.stopped == Some(Stop::Skip) {
            self.stopped = None;
        }
    }

    /// Forget everything left from a previous run.
    pub(crate) fn reset_run(&mut self) {
        self.out = RunOutput::default();
        self.scopes = vec![Scope::default()];
        self.stopped = None;
        self.loop_ctrl = None;
        self.try_depth = 0;
    }

    pub(crate) fn take_output(&mut self) -> RunOutput {
        std::mem::take(&mut self.out)
    }

    fn halted(&self) -> bool {
        self.stopped.is_some() || self.loop_ctrl.is_some()
    }

    pub(crate) fn scope(&self) -> &Scope {
        // the base scope is never popped
        &self.scopes[self.scopes.len() - 1]
    }

    pub(crate) fn scope_mut(&mut self) -> &mut Scope {
        let top = self.scopes.len() - 1;
        &mut self.scopes[top]
    }

    /// Run `f` inside `scope`, popping it whatever the outcome.
    pub(crate) fn with_scope<T>(
        &mut self,
        scope: Scope,
        f: impl FnOnce(&mut Self) -> Result<T>,
    ) -> Result<T> {
        self.scopes.push(scope);
        let result = f(self);
        if self.scopes.len() > 1 {
            self.scopes.pop();
        }
        result
    }

    /// Run `f` with faults propagating instead of being recorded.
    pub(crate) fn try_mode<T>(&mut self, f: impl FnOnce(&mut Self) -> Result<T>) -> Result<T> {
        self.try_depth += 1;
        let result = f(self);
        self.try_depth -= 1;
        result
    }

    /// The node the code is running on.
    pub(crate) fn here(&self) -> Result<ElementId> {
        self.scope()
            .locals
            .get("here")
            .and_then(Value::as_element)
            .ok_or_else(|| Error::rt("here is not set outside a walker"))
    }

    // ------------------------------------------------------------------
    // Elements
    // ------------------------------------------------------------------

    pub(crate) fn element(&mut self, id: ElementId) -> Result<Element> {
        if let Some(walker) = self.walker.as_ref().filter(|w| w.id() == id) {
            return Ok(walker.clone());
        }
        self.env
            .store
            .get(self.env.master, id)
            .ok_or(Error::ElementNotFound(id))
    }

    pub(crate) fn context_of(&mut self, id: ElementId) -> Result<IndexMap<String, Value>> {
        if let Some(walker) = self.walker.as_ref().filter(|w| w.id() == id) {
            return Ok(walker.context.clone());
        }
        Ok(self.element(id)?.context)
    }

    /// Write an element back. The running walker only updates its copy.
    pub(crate) fn save_element(&mut self, mut element: Element) -> Result<()> {
        element.touch();
        if let Some(walker) = self.walker.as_mut().filter(|w| w.id() == element.id()) {
            *walker = element;
            return Ok(());
        }
        if let Some(copy) = self.arch_copies.shift_remove(&element.id()) {
            self.env.store.save(self.env.master, copy, true);
        }
        let name = element.name.clone();
        if self.env.store.save(self.env.master, element, true) {
            Ok(())
        } else {
            Err(Error::rt(format!("Unable to write to {name}: access denied")))
        }
    }

    /// Architype of `element`. The running walker knows its own.
    pub(crate) fn arch_for(&mut self, element: &Element) -> Result<Arc<Architype>> {
        if let Some(arch) = self.walker_arch.as_ref() {
            if self.walker_id() == Some(element.id()) {
                return Ok(arch.clone());
            }
        }
        self.env.arch_of(element)
    }

    /// Whether `element`'s architype, or one of its supers, declares `var`.
    pub(crate) fn declares(&mut self, element: &Element, var: &str) -> Result<bool> {
        let arch = self.arch_for(element)?;
        Ok(self.env.lineage(&arch).iter().any(|a| a.declares(var)))
    }

    /// Context with private has-vars left out.
    pub(crate) fn visible_context(&mut self, element: &Element) -> IndexMap<String, Value> {
        let Ok(arch) = self.arch_for(element) else {
            return element.context.clone();
        };
        let lineage = self.env.lineage(&arch);
        element
            .context
            .iter()
            .filter(|(k, _)| !lineage.iter().any(|a| a.is_private(k)))
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect()
    }

    /// Whether `element` is an instance of `arch` or of something inheriting it.
    pub(crate) fn is_instance(&mut self, element: &Element, arch: &str) -> bool {
        if element.name == arch {
            return true;
        }
        let Some(kind) = element.arch_kind() else {
            return false;
        };
        self.env.family(kind, arch).contains(&element.name)
    }

    /// JSON form of a reported value; elements report their details.
    pub(crate) fn report_json(&mut self, value: &Value) -> serde_json::Value {
        match value {
            Value::Element(id) => match self.element(*id) {
                Ok(element) => {
                    let mut details = element.details();
                    details.insert(
                        "context".to_string(),
                        Value::Dict(self.visible_context(&element)),
                    );
                    Value::Dict(details).to_json()
                }
                Err(_) => serde_json::Value::String(id.urn()),
            },
            Value::List(items) => {
                serde_json::Value::Array(items.iter().map(|v| self.report_json(v)).collect())
            }
            Value::Dict(map) => serde_json::Value::Object(
                map.iter()
                    .map(|(k, v)| (k.clone(), self.report_json(v)))
                    .collect(),
            ),
            other => other.to_json(),
        }
    }

    // ------------------------------------------------------------------
    // Evaluation helpers
    // ------------------------------------------------------------------

    pub fn eval_value(&mut self, expr: &Expr) -> Result<Value> {
        Ok(self.eval(expr)?.value)
    }

    pub fn eval_ctx(&mut self, ctx: &[(String, Expr)]) -> Result<IndexMap<String, Value>> {
        let mut values = IndexMap::new();
        for (name, expr) in ctx {
            values.insert(name.clone(), self.eval_value(expr)?);
        }
        Ok(values)
    }

    pub(crate) fn call_action(&mut self, name: &str, args: &ActionArgs) -> Result<Value> {
        self.env.action_ctx().call(name, args)
    }

    // ------------------------------------------------------------------
    // Fault recording
    // ------------------------------------------------------------------

    fn locate(&self, msg: &str) -> String {
        format!(
            "{}:{} - line {}, col {} - rule {} - {}",
            self.loc.file,
            self.name(),
            self.loc.line,
            self.loc.col,
            self.rule,
            msg
        )
    }

    /// Record a program fault at the current location.
    pub(crate) fn record_error(&mut self, err: &Error) {
        let located = self.locate(&err.to_string());
        error!(walker = %self.name(), "{located}");
        self.out.errors.push(located);
    }

    /// Record `err` and carry on, unless it is a host error or a `try`
    /// handler wants it.
    pub(crate) fn recover(&mut self, err: Error) -> Result<()> {
        if err.is_recoverable() && self.try_depth == 0 {
            self.record_error(&err);
            Ok(())
        } else {
            Err(err)
        }
    }

    /// The dict bound by `try ... else with err`.
    fn error_dict(&self, err: &Error) -> Value {
        let msg = err.to_string();
        let mut dict = IndexMap::new();
        dict.insert("type".to_string(), Value::str(err.kind()));
        dict.insert("mod".to_string(), Value::str(&self.loc.file));
        dict.insert("msg".to_string(), Value::str(&msg));
        dict.insert("args".to_string(), Value::List(vec![Value::Str(msg)]));
        dict.insert("line".to_string(), Value::Int(self.loc.line as i64));
        dict.insert("col".to_string(), Value::Int(self.loc.col as i64));
        dict.insert("name".to_string(), Value::Str(self.name()));
        dict.insert("rule".to_string(), Value::str(self.rule));
        Value::Dict(dict)
    }
}
