//! Copy-on-write partial worlds
//!
//! A [`PartialWorld`] is a shared base layer plus an owned diff. Copying a
//! world clones the diff and bumps a reference count on the base, so
//! resampling can duplicate particles without copying every binding.

use openpf_types::{Value, Variable};
use std::collections::HashMap;
use std::sync::Arc;

/// What a partial world knows about one instantiated variable
#[derive(Debug, Clone, PartialEq)]
pub struct Binding {
    pub value: Value,
    /// Log-probability the selected distribution gave `value`
    pub log_prob: f64,
    /// Variables consulted during the most recent evaluation
    pub parents: Vec<Variable>,
    /// Set by evidence or decisions rather than sampled
    pub forced: bool,
}

impl Binding {
    pub fn sampled(value: Value, log_prob: f64, parents: Vec<Variable>) -> Self {
        Self {
            value,
            log_prob,
            parents,
            forced: false,
        }
    }

    pub fn forced(value: Value, log_prob: f64, parents: Vec<Variable>) -> Self {
        Self {
            value,
            log_prob,
            parents,
            forced: true,
        }
    }
}

/// Assignment of values to a finite set of basic variables
#[derive(Debug, Clone, Default)]
pub struct PartialWorld {
    base: Arc<HashMap<Variable, Binding>>,
    /// `None` marks a base binding that has been uninstantiated
    diff: HashMap<Variable, Option<Binding>>,
    changed_observables: Vec<Variable>,
}

impl PartialWorld {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn binding(&self, var: &Variable) -> Option<&Binding> {
        match self.diff.get(var) {
            Some(entry) => entry.as_ref(),
            None => self.base.get(var),
        }
    }

    pub fn get_value(&self, var: &Variable) -> Option<&Value> {
        self.binding(var).map(|b| &b.value)
    }

    pub fn is_instantiated(&self, var: &Variable) -> bool {
        self.binding(var).is_some()
    }

    pub fn set_binding(&mut self, var: Variable, binding: Binding) {
        self.diff.insert(var, Some(binding));
    }

    /// Force a value without sampling or scoring it. The variable no longer
    /// depends on anything, so any previous parents are dropped.
    pub fn set_value(&mut self, var: Variable, value: impl Into<Value>) {
        self.set_binding(var, Binding::forced(value.into(), 0.0, Vec::new()));
    }

    /// Remove `var`; returns whether it was instantiated
    pub fn uninstantiate(&mut self, var: &Variable) -> bool {
        if !self.is_instantiated(var) {
            return false;
        }
        if self.base.contains_key(var) {
            self.diff.insert(var.clone(), None);
        } else {
            self.diff.remove(var);
        }
        true
    }

    pub fn get_parents(&self, var: &Variable) -> &[Variable] {
        self.binding(var)
            .map(|b| b.parents.as_slice())
            .unwrap_or(&[])
    }

    /// Every parent from the most recent evaluation is still instantiated
    pub fn is_self_supporting(&self, var: &Variable) -> bool {
        self.binding(var).is_some_and(|b| {
            b.parents.iter().all(|p| self.is_instantiated(p))
        })
    }

    /// Every instantiated variable is self-supporting
    pub fn is_supported(&self) -> bool {
        self.instantiated_vars()
            .iter()
            .all(|v| self.is_self_supporting(v))
    }

    /// Instantiated variables in sorted order
    pub fn instantiated_vars(&self) -> Vec<Variable> {
        let mut vars: Vec<Variable> = self
            .base
            .keys()
            .filter(|v| !self.diff.contains_key(*v))
            .chain(
                self.diff
                    .iter()
                    .filter(|(_, b)| b.is_some())
                    .map(|(v, _)| v),
            )
            .cloned()
            .collect();
        vars.sort();
        vars
    }

    pub fn len(&self) -> usize {
        let hidden = self
            .diff
            .keys()
            .filter(|v| self.base.contains_key(*v))
            .count();
        let added = self.diff.values().filter(|b| b.is_some()).count();
        self.base.len() - hidden + added
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Fold the diff into the base; the base is cloned only if shared
    pub fn commit(&mut self) {
        if self.diff.is_empty() {
            return;
        }
        let base = Arc::make_mut(&mut self.base);
        for (var, entry) in self.diff.drain() {
            match entry {
                Some(binding) => {
                    base.insert(var, binding);
                }
                None => {
                    base.remove(&var);
                }
            }
        }
    }

    /// Commit, then return a world sharing the committed base
    pub fn fork(&mut self) -> PartialWorld {
        self.commit();
        self.clone()
    }

    /// Whether two worlds currently share their base layer
    pub fn shares_base_with(&self, other: &PartialWorld) -> bool {
        Arc::ptr_eq(&self.base, &other.base)
    }

    pub(crate) fn note_observable(&mut self, var: Variable) {
        if !self.changed_observables.contains(&var) {
            self.changed_observables.push(var);
        }
    }

    /// Observability indicators instantiated since the last clear
    pub fn changed_observables(&self) -> &[Variable] {
        &self.changed_observables
    }

    pub fn clear_changed_observables(&mut self) {
        self.changed_observables.clear();
    }

    pub fn largest_timestep(&self) -> Option<u32> {
        self.instantiated_vars()
            .iter()
            .filter_map(Variable::timestep)
            .max()
    }

    /// Drop every temporal binding strictly before `timestep`
    pub fn uninstantiate_before(&mut self, timestep: u32) -> usize {
        let stale: Vec<Variable> = self
            .instantiated_vars()
            .into_iter()
            .filter(|v| v.timestep().is_some_and(|t| t < timestep))
            .collect();
        for var in &stale {
            self.uninstantiate(var);
        }
        self.changed_observables
            .retain(|v| v.timestep().map_or(true, |t| t >= timestep));
        stale.len()
    }
}
