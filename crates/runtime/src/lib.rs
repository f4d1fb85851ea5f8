//! Jac Runtime
//!
//! Registers Jac programs as sentinels and runs their walkers over the
//! object graph.
//!
//! - [`sentinel`]: the architype registry built from a lowered program
//! - [`interp`]: statement and expression evaluation, traversal, ability dispatch
//! - [`walker`]: the per-walker step loop and run reports
//! - [`runtime`]: the master-level facade owning the store and services

pub mod actions;
pub mod arch_cache;
pub mod architype;
pub mod config;
pub mod env;
pub mod error;
pub mod interp;
pub mod output;
pub mod runtime;
pub mod sentinel;
pub mod walker;

pub use actions::{ActionArgs, ActionRegistry};
pub use architype::Architype;
pub use config::RuntimeConfig;
pub use env::Env;
pub use error::{Error, Result};
pub use interp::{Interp, RunOutput};
pub use output::OutputBuffer;
pub use runtime::{Runtime, GLOBAL_SENTINEL};
pub use sentinel::{Sentinel, TestDetail, TestSummary};
pub use walker::{RunReport, StepOutcome, Walker};
