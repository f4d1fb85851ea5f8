//! Walkers
//!
//! A [`Walker`] drives one walker element across the graph: it pops the next
//! node from its queue, runs the walker body there and repeats until the
//! queue drains, the walker disengages or yields, or the step limit is hit.
//!
//! Walker state lives on the element itself ([`WalkerState`]), so a yielded
//! walker is persisted like any other element and resumed with
//! [`Walker::load`].

use std::sync::Arc;

use indexmap::IndexMap;
use serde::Serialize;
use tracing::{debug, error, info};

use jac_foundation::{ArchKind, ElementId, Value};
use jac_ir::Block;
use jac_store::{Element, WalkerState};

use crate::architype::Architype;
use crate::env::Env;
use crate::error::{Error, Result};
use crate::interp::{Interp, RunOutput, Scope, Stop};

/// Result of one [`Walker::step`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepOutcome {
    /// Nothing was left to visit, or the walker disengaged.
    Disengaged,
    /// The step limit was reached before this step.
    TooManySteps,
    /// Stepped; this node is next.
    Next(ElementId),
    /// Stepped, and the queue is now empty.
    Final,
}

/// What a walker run hands back to its caller.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct RunReport {
    pub success: bool,
    pub report: Vec<serde_json::Value>,
    pub final_node: Option<String>,
    pub yielded: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status_code: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub report_custom: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub report_file: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub errors: Vec<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub stack_trace: Vec<String>,
}

pub struct Walker<'a> {
    interp: Interp<'a>,
    arch: Arc<Architype>,
    id: ElementId,
}

impl<'a> Walker<'a> {
    /// Instantiate `arch` as a new walker owned by the env's master.
    pub fn spawn(env: Env<'a>, arch: Arc<Architype>) -> Result<Self> {
        let mut interp = Interp::new(env);
        let element = interp.instantiate_arch(&arch)?;
        let id = element.id();
        interp.save_element(element.clone())?;
        debug!(walker = %arch.name, %id, "walker spawned");
        interp.walker = Some(element);
        interp.walker_arch = Some(arch.clone());
        Ok(Self { interp, arch, id })
    }

    /// Resume a persisted walker.
    pub fn load(mut env: Env<'a>, id: ElementId) -> Result<Self> {
        let element = env.store.get(env.master, id).ok_or(Error::ElementNotFound(id))?;
        if element.as_walker().is_none() {
            return Err(Error::rt(format!("{} is not a walker", id.urn())));
        }
        let arch = env.arch(ArchKind::Walker, &element.name)?;
        let mut interp = Interp::new(env);
        interp.walker = Some(element);
        interp.walker_arch = Some(arch.clone());
        Ok(Self { interp, arch, id })
    }

    pub fn id(&self) -> ElementId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.arch.name
    }

    fn element(&self) -> Result<&Element> {
        self.interp
            .walker
            .as_ref()
            .ok_or_else(|| Error::rt(format!("walker {} has no element loaded", self.id.urn())))
    }

    pub fn context(&self) -> Result<&IndexMap<String, Value>> {
        Ok(&self.element()?.context)
    }

    pub fn yielded(&self) -> bool {
        self.element().ok().and_then(Element::as_walker).is_some_and(|s| s.yielded)
    }

    /// Queue `start` and apply `ctx` to the walker context.
    ///
    /// A yielded walker with work left keeps its queue; resuming wins over
    /// re-priming.
    pub fn prime(&mut self, start: ElementId, ctx: Option<&IndexMap<String, Value>>) -> Result<()> {
        let state = self.interp.walker_state()?;
        if !(state.yielded && !state.next_node_ids.is_empty()) {
            state.queue_front(start, true);
        }
        if let Some(ctx) = ctx {
            let id = self.id();
            for (name, value) in ctx {
                self.interp.write_field(id, name, value.clone(), true)?;
            }
        }
        Ok(())
    }

    /// Visit the next queued node.
    pub fn step(&mut self) -> Result<StepOutcome> {
        let limit = self.interp.env.config.step_limit;
        let history_limit = self.interp.env.config.history_limit;
        let state = self.interp.walker_state()?;
        if state.current_step >= limit {
            let msg = format!("Walker {} walked too many steps - {limit}", self.arch.name);
            error!(walker = %self.arch.name, limit, "step limit reached");
            self.interp.out.errors.push(msg);
            return Ok(StepOutcome::TooManySteps);
        }
        let Some(node) = state.next_node_ids.pop_front() else {
            return Ok(StepOutcome::Disengaged);
        };
        state.current_node = Some(node);
        if state.history.len() < history_limit {
            state.history.push(node);
        }

        if self.interp.element(node).is_ok() {
            let arch = self.arch.clone();
            self.interp.walk_node(&arch, node)?;
        } else {
            debug!(walker = %self.arch.name, node = %node, "queued node is gone, skipping");
        }

        self.interp.clear_skip();
        let state = self.interp.walker_state()?;
        state.current_step += 1;
        if let Some(next) = state.next_node_ids.front().copied() {
            return Ok(StepOutcome::Next(next));
        }
        self.flush_destroyed()?;
        Ok(StepOutcome::Final)
    }

    /// Destroy nodes marked by `destroy` once they can no longer be visited.
    fn flush_destroyed(&mut self) -> Result<()> {
        let state = self.interp.walker_state()?;
        let doomed: Vec<ElementId> = state.destroy_node_ids.drain(..).collect();
        if doomed.is_empty() {
            return Ok(());
        }
        if state.current_node.is_some_and(|c| doomed.contains(&c)) {
            state.current_node = None;
        }
        let master = self.interp.env.master;
        for id in doomed {
            self.interp.env.store.destroy(master, id);
        }
        Ok(())
    }

    /// Step until the walk ends or the walker yields.
    pub(crate) fn walk(&mut self) -> Result<()> {
        self.interp.walker_state()?.yielded = false;
        loop {
            match self.step()? {
                StepOutcome::Next(_) if !self.yielded() => {
                    if self.interp.stopped() == Some(Stop::Disengage) {
                        break;
                    }
                }
                _ => break,
            }
        }
        Ok(())
    }

    /// Run the walker from `start` (or its current queue) and build the report.
    ///
    /// Host errors become a failed report; the walker is saved either way.
    pub fn run(&mut self, start: Option<ElementId>, ctx: Option<&IndexMap<String, Value>>) -> RunReport {
        self.interp.reset_run();
        let mut trace = Vec::new();
        let outcome = match start {
            Some(start) => self.prime(start, ctx),
            None => Ok(()),
        }
        .and_then(|()| self.walk());
        if let Err(err) = outcome {
            error!(walker = %self.arch.name, "walker run failed: {err}");
            trace.push(err.to_string());
        }
        self.save();

        let out = self.interp.take_output();
        let state = match self.element() {
            Ok(element) => element.as_walker().cloned().unwrap_or_default(),
            Err(err) => {
                trace.push(err.to_string());
                WalkerState::default()
            }
        };
        trace.extend(out.stack_trace);
        let report = RunReport {
            success: trace.is_empty() && out.errors.is_empty(),
            report: out.report,
            final_node: state.current_node.map(|id| id.urn()),
            yielded: state.yielded,
            status_code: out.status_code,
            report_custom: out.custom,
            report_file: out.file,
            errors: out.errors,
            stack_trace: trace,
        };
        info!(
            walker = %self.arch.name,
            steps = state.current_step,
            success = report.success,
            yielded = report.yielded,
            "walker run finished"
        );
        report
    }

    /// Run `block` in the walker's scope with faults propagating.
    pub fn run_block(&mut self, block: &Block) -> Result<()> {
        let id = self.id();
        let here = self.element()?.as_walker().and_then(|s| s.current_node);
        let mut scope = Scope::new(Some(id)).with_local("visitor", Value::Element(id));
        if let Some(here) = here {
            scope = scope.with_local("here", Value::Element(here));
        }
        self.interp.with_scope(scope, |interp| {
            interp.try_mode(|interp| interp.exec_block(block))
        })
    }

    /// Suspend; the queue is kept for the next run.
    pub fn yield_walk(&mut self) -> Result<()> {
        self.interp.walker_state()?.yielded = true;
        Ok(())
    }

    /// Reset queues, counters and context so the walker can be reused.
    pub fn clear_state(&mut self) -> Result<()> {
        self.interp.walker_state()?.clear();
        let arch = self.arch.clone();
        let fresh = self.interp.default_context(&arch)?;
        if let Some(element) = self.interp.walker.as_mut() {
            element.context = fresh;
        }
        self.interp.reset_run();
        Ok(())
    }

    /// Write the walker back to the store. Yielded walkers are queued for
    /// commit so whoever resumes them sees this state.
    pub fn save(&mut self) -> bool {
        let Ok(element) = self.element() else {
            return false;
        };
        let mut element = element.clone();
        element.touch();
        let all_caches = self.yielded();
        let master = self.interp.env.master;
        self.interp.env.store.save(master, element, all_caches)
    }

    /// Value of the walker's anchor variable, if it declares one.
    pub fn anchor_value(&self) -> Value {
        self.arch
            .anchor
            .as_ref()
            .and_then(|anchor| self.context().ok()?.get(anchor).cloned())
            .unwrap_or_default()
    }

    pub(crate) fn take_output(&mut self) -> RunOutput {
        self.interp.take_output()
    }
}
