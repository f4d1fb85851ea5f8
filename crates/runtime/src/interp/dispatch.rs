//! Ability dispatch: node-triggered abilities and explicit `x::name` calls.

use std::collections::HashSet;
use std::sync::Arc;

use jac_foundation::{ElementId, Value};
use jac_ir::{AbilityBody, AbilityDef, AbilityEvent, Expr};
use jac_vm::{MachineContext, Operand};

use super::{Interp, Scope};
use crate::actions::ActionArgs;
use crate::architype::Architype;
use crate::error::{Error, Result};

impl Interp<'_> {
    /// Fire `event` abilities of `node` for the running walker.
    ///
    /// Abilities closer to the node's own architype shadow same-named ones
    /// from its supers. Action bindings with presets always fire.
    pub(crate) fn trigger(&mut self, node: ElementId, event: AbilityEvent) -> Result<()> {
        let element = self.element(node)?;
        let arch = match self.arch_for(&element) {
            Ok(arch) => arch,
            Err(err) => return self.recover(err),
        };
        let walker = self.walker.as_ref().map(|w| w.name.clone());
        let mut done = HashSet::new();
        for layer in self.env.lineage(&arch) {
            for ability in layer.abilities(event) {
                let admitted = ability.access_list.is_empty()
                    || walker
                        .as_ref()
                        .is_some_and(|w| ability.access_list.contains(w));
                if !admitted {
                    continue;
                }
                let preset = matches!(
                    ability.body,
                    AbilityBody::Action {
                        preset: Some(_),
                        ..
                    }
                );
                if !preset && !done.insert(ability.name.clone()) {
                    continue;
                }
                if let Err(err) = self.invoke_ability(ability, node, node) {
                    self.recover(err)?;
                }
            }
        }
        Ok(())
    }

    /// Run `ability` with `has_obj` owning bare names and `here` bound.
    fn invoke_ability(&mut self, ability: &AbilityDef, has_obj: ElementId, here: ElementId) -> Result<()> {
        let mut scope = Scope::new(Some(has_obj)).with_local("here", Value::Element(here));
        if let Some(walker) = self.walker_id() {
            scope = scope.with_local("visitor", Value::Element(walker));
        }
        self.with_scope(scope, |interp| match &ability.body {
            AbilityBody::Code(block) => {
                interp.exec_block(block)?;
                interp.loop_ctrl = None;
                Ok(())
            }
            AbilityBody::Action { action, preset } => {
                let mut args = ActionArgs::default();
                if let Some(preset) = preset {
                    for arg in &preset.args {
                        args.args.push(interp.eval_value(arg)?);
                    }
                    for (key, arg) in &preset.kwargs {
                        args.kwargs.insert(key.clone(), interp.eval_value(arg)?);
                    }
                }
                let result = interp.call_action(action, &args)?;
                if let Some(output) = preset.as_ref().and_then(|p| p.output.as_ref()) {
                    let dest = match output.as_name() {
                        Some(name) => interp.lookup(name, true)?,
                        None => interp.eval(output)?,
                    };
                    interp.assign(dest, Operand::value(result))?;
                }
                Ok(())
            }
        })
    }

    /// `target::name(ctx)` or `::name`, optionally qualified as `target::arch::name`.
    ///
    /// Evaluates to the target.
    pub(crate) fn call_ability(
        &mut self,
        target: Option<&Expr>,
        arch: Option<&str>,
        name: &str,
        ctx: &[(String, Expr)],
    ) -> Result<Operand> {
        let target_id = match target {
            Some(expr) => {
                let value = self.eval_value(expr)?;
                value
                    .as_element()
                    .ok_or_else(|| Error::rt(format!("{value} has no abilities")))?
            }
            None => self
                .scope()
                .has_obj
                .ok_or_else(|| Error::rt(format!("No element to call ability {name} on")))?,
        };
        let element = self.element(target_id)?;
        let base = self.arch_for(&element)?;
        let lineage = self.env.lineage(&base);
        let search: Vec<Arc<Architype>> = match arch {
            Some(qualifier) => {
                let at = lineage.iter().position(|a| a.name == qualifier).ok_or_else(|| {
                    Error::rt(format!("{qualifier} is not a super arch of {}", base.name))
                })?;
                lineage[at..].to_vec()
            }
            None => lineage,
        };

        let values = self.eval_ctx(ctx)?;
        let force = element.as_walker().is_some();
        for (key, value) in values {
            self.write_field(target_id, &key, value, force)?;
        }

        let ability = search
            .iter()
            .find_map(|layer| layer.ability(name).cloned())
            .ok_or_else(|| {
                Error::rt(format!(
                    "Ability {name} not found in {}::{}",
                    base.kind,
                    arch.unwrap_or(&base.name)
                ))
            })?;
        let here = if element.as_node().is_some() {
            target_id
        } else {
            self.here().unwrap_or(target_id)
        };
        self.invoke_ability(&ability, target_id, here)?;
        Ok(Operand::value(Value::Element(target_id)))
    }
}
