//! Lazy evaluation against a partial world
//!
//! An [`EvalContext`] borrows a world, the model, and a random source for the
//! duration of one operation. Variables are instantiated on demand: when a
//! dependency model reads another variable through [`EvalContext::value_of`],
//! that variable is instantiated first and recorded as a parent of whatever
//! is being evaluated further up the stack.

use crate::distrib::Distribution;
use crate::error::{WorldError, WorldResult};
use crate::model::Model;
use crate::world::{Binding, PartialWorld};
use openpf_types::{Evidence, EvidenceKind, Value, Variable};
use rand::RngCore;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

/// Values an evaluation must adopt instead of sampling
#[derive(Debug, Clone, Default)]
pub struct ForcedValues {
    values: HashMap<Variable, (Value, EvidenceKind)>,
}

impl ForcedValues {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every assignment of `evidence`
    pub fn from_evidence(evidence: &Evidence) -> Self {
        Self::from_evidence_filtered(evidence, |_| true)
    }

    /// Assignments of `evidence` accepted by `keep`
    pub fn from_evidence_filtered(
        evidence: &Evidence,
        keep: impl Fn(&openpf_types::Assignment) -> bool,
    ) -> Self {
        let values = evidence
            .iter()
            .filter(|a| keep(a))
            .map(|a| (a.var.clone(), (a.value.clone(), a.kind)))
            .collect();
        Self { values }
    }

    pub fn insert(&mut self, var: Variable, value: Value, kind: EvidenceKind) {
        self.values.insert(var, (value, kind));
    }

    pub fn get(&self, var: &Variable) -> Option<&(Value, EvidenceKind)> {
        self.values.get(var)
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

/// Evaluation state for one operation on one world
pub struct EvalContext<'a> {
    world: &'a mut PartialWorld,
    model: &'a dyn Model,
    rng: &'a mut dyn RngCore,
    forced: Option<&'a ForcedValues>,
    /// Parent accumulators, one per variable under evaluation
    frames: Vec<Vec<Variable>>,
    /// Variables currently being instantiated, outermost first
    responsible: Vec<Variable>,
    evidence_log_weight: f64,
    /// Observations already scored while being adopted
    adopted: HashSet<Variable>,
}

impl<'a> EvalContext<'a> {
    pub fn new(world: &'a mut PartialWorld, model: &'a dyn Model, rng: &'a mut dyn RngCore) -> Self {
        Self {
            world,
            model,
            rng,
            forced: None,
            frames: Vec::new(),
            responsible: Vec::new(),
            evidence_log_weight: 0.0,
            adopted: HashSet::new(),
        }
    }

    /// Adopt `forced` values whenever the variables they name get instantiated
    pub fn with_forced(mut self, forced: &'a ForcedValues) -> Self {
        self.forced = Some(forced);
        self
    }

    pub fn world(&self) -> &PartialWorld {
        &*self.world
    }

    pub fn model(&self) -> &dyn Model {
        self.model
    }

    /// Log-weight contributed by observations so far
    pub fn evidence_log_weight(&self) -> f64 {
        self.evidence_log_weight
    }

    pub fn get_value(&self, var: &Variable) -> Option<&Value> {
        self.world.get_value(var)
    }

    /// Read `var` as a dependency of the variable currently being evaluated
    pub fn value_of(&mut self, var: &Variable) -> WorldResult<Value> {
        if let Some(frame) = self.frames.last_mut() {
            if !frame.contains(var) {
                frame.push(var.clone());
            }
        }
        self.ensure_instantiated(var)
    }

    /// Make sure `var` has a value, adopting a forced value or sampling one
    pub fn ensure_instantiated(&mut self, var: &Variable) -> WorldResult<Value> {
        if let Some(value) = self.world.get_value(var) {
            return Ok(value.clone());
        }
        if self.responsible.contains(var) {
            let mut chain = self.responsible.clone();
            chain.push(var.clone());
            return Err(WorldError::DependencyCycle {
                var: var.clone(),
                chain,
            });
        }

        let forced = self.forced.and_then(|f| f.get(var)).cloned();
        if let Some((value, EvidenceKind::Decision)) = &forced {
            self.decide(var, value.clone());
            return Ok(value.clone());
        }

        let (distrib, parents) = self.evaluate_distribution(var)?;
        let binding = match forced {
            Some((value, _)) => {
                let log_prob = distrib.log_prob(&value);
                self.evidence_log_weight += log_prob;
                self.adopted.insert(var.clone());
                tracing::trace!(var = %var, log_prob, "adopted observed value");
                Binding::forced(value, log_prob, parents)
            }
            None => {
                let value = distrib.sample(&mut *self.rng);
                let log_prob = distrib.log_prob(&value);
                Binding::sampled(value, log_prob, parents)
            }
        };
        let value = binding.value.clone();
        self.bind(var, binding);
        Ok(value)
    }

    /// Distribution of `var` under the current world, with the parents read
    /// while selecting it
    pub fn evaluate_distribution(
        &mut self,
        var: &Variable,
    ) -> WorldResult<(Arc<dyn Distribution>, Vec<Variable>)> {
        let model = self.model;
        let dm = model
            .dependency_model(&var.generator)
            .ok_or_else(|| WorldError::UnsupportedVariable { var: var.clone() })?;

        self.responsible.push(var.clone());
        self.frames.push(Vec::new());
        let selected = dm.select(self, var);
        let parents = self.frames.pop().unwrap_or_default();
        self.responsible.pop();

        let distrib = selected?;
        distrib
            .validate()
            .map_err(|reason| WorldError::invalid_distribution(var, reason))?;
        Ok((distrib, parents))
    }

    /// Score and force an observed value; returns its log-probability.
    ///
    /// An observation adopted earlier in this context has already been
    /// scored and contributes nothing further.
    pub fn observe(&mut self, var: &Variable, value: Value) -> WorldResult<f64> {
        if self.adopted.contains(var) && self.world.get_value(var) == Some(&value) {
            return Ok(0.0);
        }
        let log_prob = self.assign(var, value)?;
        self.evidence_log_weight += log_prob;
        self.adopted.insert(var.clone());
        Ok(log_prob)
    }

    /// Force a value and record its log-probability without scoring it
    pub fn assign(&mut self, var: &Variable, value: Value) -> WorldResult<f64> {
        let (distrib, parents) = self.evaluate_distribution(var)?;
        let log_prob = distrib.log_prob(&value);
        self.bind(var, Binding::forced(value, log_prob, parents));
        Ok(log_prob)
    }

    /// Apply a decision; weight-neutral
    pub fn decide(&mut self, var: &Variable, value: Value) {
        self.bind(var, Binding::forced(value, 0.0, Vec::new()));
    }

    fn bind(&mut self, var: &Variable, binding: Binding) {
        self.world.set_binding(var.clone(), binding);
        if self.model.observed_by(var).is_some() {
            self.world.note_observable(var.clone());
        }
    }
}
