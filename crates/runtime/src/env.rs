//! Borrowed runtime state shared by everything that executes Jac code.

use std::sync::Arc;

use indexmap::{IndexMap, IndexSet};
use rand::rngs::StdRng;

use jac_foundation::{ArchKind, ElementId};
use jac_store::{Element, GraphStore};

use crate::actions::{ActionContext, ActionRegistry};
use crate::arch_cache::ArchCache;
use crate::architype::Architype;
use crate::config::RuntimeConfig;
use crate::error::{Error, Result};
use crate::output::OutputBuffer;
use crate::sentinel::Sentinel;

/// Everything a running program may touch, borrowed from the [`Runtime`].
///
/// [`Runtime`]: crate::Runtime
pub struct Env<'a> {
    pub store: &'a mut dyn GraphStore,
    pub sentinels: &'a IndexMap<ElementId, Sentinel>,
    pub cache: &'a mut ArchCache,
    pub actions: &'a ActionRegistry,
    pub output: &'a mut OutputBuffer,
    pub rng: &'a mut StdRng,
    pub config: &'a RuntimeConfig,
    /// Master on whose behalf the program runs.
    pub master: ElementId,
    /// Sentinel the program was started under, if pinned.
    pub sentinel: Option<ElementId>,
}

impl<'a> Env<'a> {
    /// Shorter-lived copy for nested execution (spawned walkers).
    pub fn reborrow(&mut self) -> Env<'_> {
        Env {
            store: &mut *self.store,
            sentinels: self.sentinels,
            cache: &mut *self.cache,
            actions: self.actions,
            output: &mut *self.output,
            rng: &mut *self.rng,
            config: self.config,
            master: self.master,
            sentinel: self.sentinel,
        }
    }

    pub fn action_ctx(&mut self) -> ActionContext<'_> {
        ActionContext {
            registry: self.actions,
            store: &mut *self.store,
            output: &mut *self.output,
            rng: &mut *self.rng,
            master: self.master,
        }
    }

    /// Active sentinel of `master`, read from its store record.
    pub fn active_sentinel(&mut self, master: ElementId) -> Option<ElementId> {
        self.store
            .get(master, master)
            .and_then(|m| m.as_master().and_then(|body| body.active_sentinel))
    }

    /// The sentinel architypes resolve against first.
    pub fn context_sentinel(&mut self) -> Option<ElementId> {
        match self.sentinel {
            Some(id) => Some(id),
            None => self.active_sentinel(self.master),
        }
    }

    pub fn current_sentinel(&mut self) -> Option<&'a Sentinel> {
        let sentinels = self.sentinels;
        self.context_sentinel().and_then(|id| sentinels.get(&id))
    }

    /// Resolve an architype by kind and name.
    pub fn arch(&mut self, kind: ArchKind, name: &str) -> Result<Arc<Architype>> {
        self.resolve(kind, name, None)
    }

    /// Resolve the architype an element was instantiated from.
    ///
    /// Falls back to the active sentinel of the element's owner when the
    /// running context does not know the architype.
    pub fn arch_of(&mut self, element: &Element) -> Result<Arc<Architype>> {
        let kind = element.arch_kind().ok_or_else(|| {
            Error::rt(format!("{} has no architype", element.kind().as_str()))
        })?;
        let owner = (element.master != self.master).then_some(element.master);
        self.resolve(kind, &element.name, owner)
    }

    fn resolve(
        &mut self,
        kind: ArchKind,
        name: &str,
        owner: Option<ElementId>,
    ) -> Result<Arc<Architype>> {
        let context = self.context_sentinel();
        if let Some(ctx) = context {
            if let Some(hit) = self.cache.get(ctx, kind, name) {
                return Ok(hit);
            }
        }

        let mut candidates: Vec<ElementId> = context.into_iter().collect();
        if let Some(own) = self.active_sentinel(self.master) {
            candidates.push(own);
        }
        if let Some(other) = owner.and_then(|o| self.active_sentinel(o)) {
            candidates.push(other);
        }
        let found = candidates
            .iter()
            .filter_map(|id| self.sentinels.get(id))
            .find_map(|s| s.arch(kind, name));

        match found {
            Some(arch) => {
                if let Some(ctx) = context {
                    self.cache.insert(ctx, arch.clone());
                }
                Ok(arch)
            }
            None => Err(Error::ArchitypeNotFound {
                kind,
                name: name.to_string(),
            }),
        }
    }

    /// `arch` followed by its supers, depth first, each once.
    pub fn lineage(&self, arch: &Arc<Architype>) -> Vec<Arc<Architype>> {
        match self.sentinels.get(&arch.sentinel) {
            Some(sentinel) => sentinel.lineage(arch),
            None => vec![arch.clone()],
        }
    }

    /// Names of every architype of `kind` that is, or inherits from, `name`.
    pub fn family(&mut self, kind: ArchKind, name: &str) -> IndexSet<String> {
        match self.current_sentinel() {
            Some(sentinel) => sentinel.family(kind, name),
            None => IndexSet::from([name.to_string()]),
        }
    }

    /// Owner record for a fresh instance of `arch`.
    pub fn spawn_architype(&mut self, arch: &Architype) -> Result<Element> {
        let sentinel = self
            .sentinels
            .get(&arch.sentinel)
            .ok_or(Error::SentinelNotFound(arch.sentinel))?;
        sentinel
            .spawn_architype(&mut *self.store, arch.kind, &arch.name, self.master)
            .ok_or_else(|| Error::ArchitypeNotFound {
                kind: arch.kind,
                name: arch.name.clone(),
            })
    }
}
