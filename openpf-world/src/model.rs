//! Dependency models
//!
//! A dependency model is an ordered list of clauses. Each clause may carry a
//! guard; the first clause whose guard holds supplies the distribution. Every
//! variable a guard or a distribution selector reads through the
//! [`EvalContext`] becomes a parent of the variable being instantiated, for
//! that evaluation only.

use crate::context::EvalContext;
use crate::distrib::{self, Distribution};
use crate::error::WorldResult;
use openpf_types::{GeneratorId, Variable};
use std::collections::{BTreeSet, HashMap};
use std::fmt;
use std::sync::Arc;

/// Guard of a clause
pub type GuardFn = dyn Fn(&mut EvalContext<'_>, &Variable) -> WorldResult<bool> + Send + Sync;

/// Distribution selector of a clause
pub type DistribFn =
    dyn Fn(&mut EvalContext<'_>, &Variable) -> WorldResult<Arc<dyn Distribution>> + Send + Sync;

/// One guarded alternative of a dependency model
#[derive(Clone)]
pub struct Clause {
    guard: Option<Arc<GuardFn>>,
    distrib: Arc<DistribFn>,
}

impl Clause {
    /// A clause that applies when `guard` evaluates to true
    pub fn when<G, D>(guard: G, distrib: D) -> Self
    where
        G: Fn(&mut EvalContext<'_>, &Variable) -> WorldResult<bool> + Send + Sync + 'static,
        D: Fn(&mut EvalContext<'_>, &Variable) -> WorldResult<Arc<dyn Distribution>>
            + Send
            + Sync
            + 'static,
    {
        Self {
            guard: Some(Arc::new(guard)),
            distrib: Arc::new(distrib),
        }
    }

    /// A clause that always applies
    pub fn otherwise<D>(distrib: D) -> Self
    where
        D: Fn(&mut EvalContext<'_>, &Variable) -> WorldResult<Arc<dyn Distribution>>
            + Send
            + Sync
            + 'static,
    {
        Self {
            guard: None,
            distrib: Arc::new(distrib),
        }
    }

    /// A clause with no guard and a fixed distribution
    pub fn fixed(distrib: Arc<dyn Distribution>) -> Self {
        Self::otherwise(move |_, _| Ok(distrib.clone()))
    }

    fn applies(&self, ctx: &mut EvalContext<'_>, var: &Variable) -> WorldResult<bool> {
        match &self.guard {
            Some(guard) => guard(ctx, var),
            None => Ok(true),
        }
    }
}

impl fmt::Debug for Clause {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Clause")
            .field("guarded", &self.guard.is_some())
            .finish()
    }
}

/// Ordered clauses for one generator
#[derive(Debug, Clone, Default)]
pub struct DependencyModel {
    clauses: Vec<Clause>,
}

impl DependencyModel {
    pub fn new(clauses: Vec<Clause>) -> Self {
        Self { clauses }
    }

    /// Single unguarded clause with a fixed distribution
    pub fn fixed(distrib: Arc<dyn Distribution>) -> Self {
        Self::new(vec![Clause::fixed(distrib)])
    }

    /// Single unguarded clause
    pub fn from_fn<D>(distrib: D) -> Self
    where
        D: Fn(&mut EvalContext<'_>, &Variable) -> WorldResult<Arc<dyn Distribution>>
            + Send
            + Sync
            + 'static,
    {
        Self::new(vec![Clause::otherwise(distrib)])
    }

    pub fn push(mut self, clause: Clause) -> Self {
        self.clauses.push(clause);
        self
    }

    pub fn clauses(&self) -> &[Clause] {
        &self.clauses
    }

    /// Distribution of the first clause whose guard holds.
    ///
    /// When no clause applies the variable is `Null` with probability one.
    pub fn select(
        &self,
        ctx: &mut EvalContext<'_>,
        var: &Variable,
    ) -> WorldResult<Arc<dyn Distribution>> {
        for clause in &self.clauses {
            if clause.applies(ctx, var)? {
                return (clause.distrib)(ctx, var);
            }
        }
        Ok(distrib::point(openpf_types::Value::Null))
    }
}

/// Source of dependency models and observability structure
pub trait Model: Send + Sync {
    /// Dependency model for variables produced by `generator`
    fn dependency_model(&self, generator: &GeneratorId) -> Option<&DependencyModel>;

    /// If `var` is an observability indicator, the variable it refers to
    fn observed_by(&self, var: &Variable) -> Option<Variable>;

    /// Indicators a round at `timestep` must classify
    fn observables_at(&self, _timestep: u32) -> Vec<Variable> {
        Vec::new()
    }

    /// Whether `generator` is a decision function
    fn is_decision(&self, _generator: &GeneratorId) -> bool {
        false
    }
}

type ReferenceFn = dyn Fn(&Variable) -> Variable + Send + Sync;
type ObservablesFn = dyn Fn(u32) -> Vec<Variable> + Send + Sync;

/// Hash-map backed [`Model`]
pub struct StaticModel {
    models: HashMap<GeneratorId, DependencyModel>,
    indicators: HashMap<GeneratorId, Arc<ReferenceFn>>,
    decisions: BTreeSet<GeneratorId>,
    observables: Option<Arc<ObservablesFn>>,
}

impl StaticModel {
    pub fn builder() -> ModelBuilder {
        ModelBuilder::default()
    }
}

impl fmt::Debug for StaticModel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut generators: Vec<_> = self.models.keys().map(GeneratorId::as_str).collect();
        generators.sort_unstable();
        f.debug_struct("StaticModel")
            .field("generators", &generators)
            .field("decisions", &self.decisions)
            .finish()
    }
}

impl Model for StaticModel {
    fn dependency_model(&self, generator: &GeneratorId) -> Option<&DependencyModel> {
        self.models.get(generator)
    }

    fn observed_by(&self, var: &Variable) -> Option<Variable> {
        self.indicators.get(&var.generator).map(|refers| refers(var))
    }

    fn observables_at(&self, timestep: u32) -> Vec<Variable> {
        self.observables
            .as_ref()
            .map(|f| f(timestep))
            .unwrap_or_default()
    }

    fn is_decision(&self, generator: &GeneratorId) -> bool {
        self.decisions.contains(generator)
    }
}

/// Builder for [`StaticModel`]
#[derive(Default)]
pub struct ModelBuilder {
    models: HashMap<GeneratorId, DependencyModel>,
    indicators: HashMap<GeneratorId, Arc<ReferenceFn>>,
    decisions: BTreeSet<GeneratorId>,
    observables: Option<Arc<ObservablesFn>>,
}

impl ModelBuilder {
    /// Register a random function or number statement
    pub fn random(mut self, generator: impl Into<GeneratorId>, model: DependencyModel) -> Self {
        self.models.insert(generator.into(), model);
        self
    }

    /// Register an observability indicator generator.
    ///
    /// `refers` maps an indicator variable to the variable whose value is
    /// observed when the indicator is true.
    pub fn observable<R>(
        mut self,
        indicator: impl Into<GeneratorId>,
        refers: R,
        model: DependencyModel,
    ) -> Self
    where
        R: Fn(&Variable) -> Variable + Send + Sync + 'static,
    {
        let indicator = indicator.into();
        self.indicators.insert(indicator.clone(), Arc::new(refers));
        self.models.insert(indicator, model);
        self
    }

    /// Register a decision function. Decision variables are only ever forced.
    pub fn decision(mut self, generator: impl Into<GeneratorId>) -> Self {
        self.decisions.insert(generator.into());
        self
    }

    /// Enumerate the indicators each round must classify
    pub fn declare_observables<F>(mut self, observables: F) -> Self
    where
        F: Fn(u32) -> Vec<Variable> + Send + Sync + 'static,
    {
        self.observables = Some(Arc::new(observables));
        self
    }

    pub fn build(self) -> StaticModel {
        StaticModel {
            models: self.models,
            indicators: self.indicators,
            decisions: self.decisions,
            observables: self.observables,
        }
    }
}
