//! Action libraries
//!
//! Actions are host functions callable from Jac (`std.log(x)`,
//! `rand.integer(1, 6)`) or bound to abilities (`can date.quantize_to_week`).
//! Capability modules register a constructor with the [`ActionRegistry`];
//! loading a module instantiates its action set under the module name, and
//! unloading removes it again.

mod date;
mod random;
mod stdlib;

use indexmap::IndexMap;
use rand::rngs::StdRng;
use tracing::{debug, warn};

use jac_foundation::{ElementId, Value};
use jac_store::GraphStore;

use crate::error::{Error, Result};
use crate::output::OutputBuffer;

/// Host function behind an action name.
pub type ActionFn = fn(&mut ActionContext<'_>, &ActionArgs) -> Result<Value>;

/// Builds the actions of a capability module.
pub type ModuleCtor = fn() -> Vec<(&'static str, ActionFn)>;

/// Positional and keyword arguments of an action call.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ActionArgs {
    pub args: Vec<Value>,
    pub kwargs: IndexMap<String, Value>,
}

impl ActionArgs {
    pub fn positional(args: Vec<Value>) -> Self {
        Self {
            args,
            kwargs: IndexMap::new(),
        }
    }

    /// Argument by keyword, falling back to position.
    pub fn get(&self, index: usize, key: &str) -> Option<&Value> {
        self.kwargs.get(key).or_else(|| self.args.get(index))
    }

    pub fn require(&self, index: usize, key: &str, action: &str) -> Result<&Value> {
        self.get(index, key).ok_or_else(|| Error::Action {
            action: action.to_string(),
            reason: format!("missing argument '{key}'"),
        })
    }

    pub fn str(&self, index: usize, key: &str, action: &str) -> Result<&str> {
        let value = self.require(index, key, action)?;
        value.as_str().ok_or_else(|| bad_arg(action, key, "str", value))
    }

    pub fn int(&self, index: usize, key: &str, action: &str) -> Result<i64> {
        let value = self.require(index, key, action)?;
        value.as_int().ok_or_else(|| bad_arg(action, key, "int", value))
    }

    pub fn float(&self, index: usize, key: &str, action: &str) -> Result<f64> {
        let value = self.require(index, key, action)?;
        value.as_f64().ok_or_else(|| bad_arg(action, key, "float", value))
    }

    pub fn list(&self, index: usize, key: &str, action: &str) -> Result<&Vec<Value>> {
        let value = self.require(index, key, action)?;
        value.as_list().ok_or_else(|| bad_arg(action, key, "list", value))
    }
}

fn bad_arg(action: &str, key: &str, expected: &str, got: &Value) -> Error {
    Error::Action {
        action: action.to_string(),
        reason: format!("argument '{key}' must be {expected}, got {}", got.type_name()),
    }
}

/// What an action may touch while it runs.
pub struct ActionContext<'a> {
    pub registry: &'a ActionRegistry,
    pub store: &'a mut dyn GraphStore,
    pub output: &'a mut OutputBuffer,
    pub rng: &'a mut StdRng,
    /// Master on whose behalf the program runs.
    pub master: ElementId,
}

impl ActionContext<'_> {
    /// Invoke a loaded action by its dotted name.
    pub fn call(&mut self, name: &str, args: &ActionArgs) -> Result<Value> {
        let action = self
            .registry
            .lookup(name)
            .ok_or_else(|| Error::ActionNotFound(name.to_string()))?;
        debug!(action = name, args = args.args.len(), "calling action");
        action(self, args)
    }
}

/// Registered capability modules and the action sets currently loaded.
#[derive(Default)]
pub struct ActionRegistry {
    modules: IndexMap<String, ModuleCtor>,
    loaded: IndexMap<String, IndexMap<&'static str, ActionFn>>,
}

impl ActionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with the `std`, `rand` and `date` modules registered and loaded.
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        registry.register_module("std", stdlib::actions);
        registry.register_module("rand", random::actions);
        registry.register_module("date", date::actions);
        for name in ["std", "rand", "date"] {
            registry.load(name);
        }
        registry
    }

    pub fn register_module(&mut self, name: &str, ctor: ModuleCtor) {
        self.modules.insert(name.to_string(), ctor);
    }

    /// Instantiate a registered module's actions. Returns false if unknown.
    pub fn load(&mut self, name: &str) -> bool {
        let Some(ctor) = self.modules.get(name) else {
            warn!(module = name, "no such action module");
            return false;
        };
        let actions: IndexMap<_, _> = ctor().into_iter().collect();
        debug!(module = name, actions = actions.len(), "action set loaded");
        self.loaded.insert(name.to_string(), actions);
        true
    }

    pub fn unload(&mut self, name: &str) -> bool {
        self.loaded.shift_remove(name).is_some()
    }

    /// Whether a set (`rand`) or a single action (`rand.integer`) is loaded.
    pub fn is_loaded(&self, name: &str) -> bool {
        self.loaded.contains_key(name) || self.lookup(name).is_some()
    }

    /// Dotted names of every loaded action.
    pub fn list_loaded(&self) -> Vec<String> {
        self.loaded
            .iter()
            .flat_map(|(set, actions)| actions.keys().map(move |a| format!("{set}.{a}")))
            .collect()
    }

    pub fn lookup(&self, name: &str) -> Option<ActionFn> {
        let (set, action) = name.split_once('.')?;
        self.loaded.get(set)?.get(action).copied()
    }
}

impl std::fmt::Debug for ActionRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ActionRegistry")
            .field("modules", &self.modules.keys().collect::<Vec<_>>())
            .field("loaded", &self.loaded.keys().collect::<Vec<_>>())
            .finish()
    }
}

/// Text form used when actions print values.
pub(crate) fn render(value: &Value) -> String {
    match value {
        Value::Str(s) => s.clone(),
        other => other.to_json().to_string(),
    }
}
