//! Particles: one weighted partial world each

use crate::config::{FilterConfig, SamplerKind};
use crate::error::{FilterError, FilterResult};
use crate::signature::{ObservabilitySignature, ObservationFacts, SignatureId};
use openpf_types::{Evidence, EvidenceKind, GeneratorId, Value};
use openpf_world::{EvalContext, ForcedValues, Model, PartialWorld, Query};
use rand::rngs::StdRng;
use rand::SeedableRng;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

/// Which sampler absorbs observations of each generator
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SamplingPolicy {
    default: SamplerKind,
    overrides: HashMap<GeneratorId, SamplerKind>,
}

impl SamplingPolicy {
    pub fn new(default: SamplerKind) -> Self {
        Self {
            default,
            overrides: HashMap::new(),
        }
    }

    pub fn from_config(config: &FilterConfig) -> Self {
        Self {
            default: config.sampler,
            overrides: config
                .samplers
                .iter()
                .map(|(g, s)| (GeneratorId::new(g.as_str()), *s))
                .collect(),
        }
    }

    pub fn with_override(mut self, generator: impl Into<GeneratorId>, sampler: SamplerKind) -> Self {
        self.overrides.insert(generator.into(), sampler);
        self
    }

    pub fn sampler_for(&self, generator: &GeneratorId) -> SamplerKind {
        self.overrides.get(generator).copied().unwrap_or(self.default)
    }
}

/// A weighted partial world advancing through time
#[derive(Clone)]
pub struct Particle {
    world: PartialWorld,
    weight: f64,
    timestep: u32,
    timeslices_in_memory: u32,
    signature: SignatureId,
    rng: StdRng,
    model: Arc<dyn Model>,
    sampling: Arc<SamplingPolicy>,
}

impl Particle {
    pub fn new(
        model: Arc<dyn Model>,
        sampling: Arc<SamplingPolicy>,
        timeslices_in_memory: u32,
        signature: SignatureId,
        seed: u64,
    ) -> Self {
        Self {
            world: PartialWorld::new(),
            weight: 1.0,
            timestep: 0,
            timeslices_in_memory,
            signature,
            rng: StdRng::seed_from_u64(seed),
            model,
            sampling,
        }
    }

    /// Apply evidence in order.
    ///
    /// Observations under likelihood weighting multiply the weight by the
    /// probability of the forced value. Under rejection the variable is
    /// sampled first and the weight drops to zero on a mismatch. Decisions
    /// never touch the weight.
    ///
    /// Decisions must target decision generators and observations must not.
    /// A mismatch is rejected before the world or weight changes.
    pub fn take(&mut self, evidence: &Evidence) -> FilterResult<()> {
        self.check_evidence_kinds(evidence)?;
        let sampling = Arc::clone(&self.sampling);
        let forced = ForcedValues::from_evidence_filtered(evidence, |a| {
            a.kind == EvidenceKind::Decision
                || sampling.sampler_for(&a.var.generator) == SamplerKind::LikelihoodWeighting
        });

        let mut rejected = false;
        let mut ctx = EvalContext::new(&mut self.world, self.model.as_ref(), &mut self.rng)
            .with_forced(&forced);
        for assignment in evidence {
            let var = &assignment.var;
            match assignment.kind {
                EvidenceKind::Decision => ctx.decide(var, assignment.value.clone()),
                EvidenceKind::Observation => match sampling.sampler_for(&var.generator) {
                    SamplerKind::LikelihoodWeighting => {
                        ctx.observe(var, assignment.value.clone())?;
                    }
                    SamplerKind::Rejection => {
                        let sampled = ctx.ensure_instantiated(var)?;
                        if sampled != assignment.value {
                            rejected = true;
                        }
                        ctx.assign(var, assignment.value.clone())?;
                    }
                },
            }
        }
        let log_weight = ctx.evidence_log_weight();

        if rejected {
            self.weight = 0.0;
        } else {
            self.weight *= log_weight.exp();
        }
        Ok(())
    }

    fn check_evidence_kinds(&self, evidence: &Evidence) -> FilterResult<()> {
        for assignment in evidence {
            let expected = if self.model.is_decision(&assignment.var.generator) {
                EvidenceKind::Decision
            } else {
                EvidenceKind::Observation
            };
            if assignment.kind != expected {
                return Err(FilterError::InvalidEvidenceKind {
                    var: assignment.var.clone(),
                    expected,
                    found: assignment.kind,
                });
            }
        }
        Ok(())
    }

    /// Values of the query expressions in this particle's world
    pub fn evaluate(&mut self, queries: &[Query]) -> FilterResult<Vec<Value>> {
        let mut ctx = EvalContext::new(&mut self.world, self.model.as_ref(), &mut self.rng);
        let mut values = Vec::with_capacity(queries.len());
        for query in queries {
            values.push(query.expression().evaluate(&mut ctx)?);
        }
        Ok(values)
    }

    /// Add this particle's answers to the query histograms
    pub fn answer(&mut self, queries: &mut [Query]) -> FilterResult<()> {
        let values = self.evaluate(queries)?;
        for (query, value) in queries.iter_mut().zip(values) {
            query.record(value, self.weight);
        }
        Ok(())
    }

    pub fn advance_timestep(&mut self) {
        self.timestep += 1;
    }

    pub fn retract_timestep(&mut self) {
        self.timestep = self.timestep.saturating_sub(1);
    }

    /// Drop time slices older than the in-memory window
    pub fn uninstantiate_previous_timeslices(&mut self) -> usize {
        match self.timestep.checked_sub(self.timeslices_in_memory) {
            Some(horizon) if horizon > 0 => self.world.uninstantiate_before(horizon),
            _ => 0,
        }
    }

    /// Deep copy sharing the committed part of the world
    pub fn copy(&mut self) -> Particle {
        Particle {
            world: self.world.fork(),
            ..self.clone()
        }
    }

    pub fn reseed(&mut self, seed: u64) {
        self.rng = StdRng::seed_from_u64(seed);
    }

    /// Make sure the indicators of `round` are instantiated, then classify
    /// the indicators that changed since the last round boundary
    pub fn classify_observability(&mut self, round: u32) -> FilterResult<ObservationFacts> {
        let model = Arc::clone(&self.model);
        let declared = model.observables_at(round);
        let current = self.timestep;

        let mut ctx = EvalContext::new(&mut self.world, model.as_ref(), &mut self.rng);
        for indicator in &declared {
            ctx.ensure_instantiated(indicator)?;
        }

        let changed = ctx.world().changed_observables().to_vec();
        let mut facts = ObservationFacts::default();
        for indicator in changed {
            if indicator.timestep().is_some_and(|t| t > current) {
                continue;
            }
            let Some(referenced) = model.observed_by(&indicator) else {
                continue;
            };
            let shown = ctx.ensure_instantiated(&indicator)?;
            if shown.as_bool() == Some(true) {
                if !facts.observed.contains_key(&referenced) {
                    let value = ctx.ensure_instantiated(&referenced)?;
                    facts.observed.insert(referenced, value);
                    facts.observable.insert(indicator);
                }
            } else {
                facts.unobservable.insert(indicator);
            }
        }
        Ok(facts)
    }

    /// Forget every variable `signature` talks about so it can be re-forced
    pub fn uninstantiate_observables(&mut self, signature: &ObservabilitySignature) {
        for var in signature.facts().variables() {
            self.world.uninstantiate(var);
        }
    }

    pub fn weight(&self) -> f64 {
        self.weight
    }

    pub fn set_weight(&mut self, weight: f64) {
        self.weight = weight;
    }

    pub fn reset_weight(&mut self) {
        self.weight = 1.0;
    }

    pub fn timestep(&self) -> u32 {
        self.timestep
    }

    pub fn signature(&self) -> SignatureId {
        self.signature
    }

    pub fn set_signature(&mut self, signature: SignatureId) {
        self.signature = signature;
    }

    pub fn world(&self) -> &PartialWorld {
        &self.world
    }

    pub fn world_mut(&mut self) -> &mut PartialWorld {
        &mut self.world
    }

    pub fn model(&self) -> &Arc<dyn Model> {
        &self.model
    }
}

impl fmt::Debug for Particle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Particle")
            .field("weight", &self.weight)
            .field("timestep", &self.timestep)
            .field("signature", &self.signature)
            .field("instantiated", &self.world.len())
            .finish()
    }
}
