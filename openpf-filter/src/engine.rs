//! The particle filter engine
//!
//! [`ParticleFilter`] drives a [`Population`] through rounds:
//!
//! ```text
//! Init -> { BeforeEvidence -> TakeEvidence -> AnswerQueries -> AfterQueries }* -> Terminated
//! ```
//!
//! The acquisition strategy chosen at construction decides what `take`
//! accepts and what happens at the end of each round.

use crate::config::{FilterConfig, StrategyKind};
use crate::error::{FilterError, FilterResult};
use crate::metrics::FilterMetrics;
use crate::particle::{Particle, SamplingPolicy};
use crate::population::{PartitionStats, Population};
use crate::signature::{SignatureId, SignatureRegistry};
use crate::strategy::{self, AcquisitionStrategy};
use openpf_types::Evidence;
use openpf_world::{Model, Query};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::fmt;
use std::sync::Arc;

/// Where the filter is in its round cycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RoundPhase {
    Init,
    BeforeEvidence,
    TakeEvidence,
    AnswerQueries,
    AfterQueries,
    Terminated,
}

/// Builder for [`ParticleFilter`]
pub struct ParticleFilterBuilder {
    model: Arc<dyn Model>,
    config: FilterConfig,
    registry: Option<Arc<SignatureRegistry>>,
    metrics: Option<Arc<FilterMetrics>>,
    initial_evidence: Option<Evidence>,
}

impl ParticleFilterBuilder {
    pub fn config(mut self, config: FilterConfig) -> Self {
        self.config = config;
        self
    }

    /// Share an existing signature registry
    pub fn registry(mut self, registry: Arc<SignatureRegistry>) -> Self {
        self.registry = Some(registry);
        self
    }

    pub fn metrics(mut self, metrics: Arc<FilterMetrics>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    /// Evidence every particle takes right after construction
    pub fn initial_evidence(mut self, evidence: Evidence) -> Self {
        self.initial_evidence = Some(evidence);
        self
    }

    pub fn build(self) -> FilterResult<ParticleFilter> {
        let config = self.config;
        config.validate()?;

        let registry = self.registry.unwrap_or_default();
        let metrics = self.metrics.unwrap_or_default();
        let mut rng = match config.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };

        let prototype = Particle::new(
            Arc::clone(&self.model),
            Arc::new(SamplingPolicy::from_config(&config)),
            config.timeslices_in_memory,
            registry.root(),
            rng.gen(),
        );
        let population = Population::new(
            prototype,
            config.num_particles,
            registry,
            rng,
            config.resampling,
            Arc::clone(&metrics),
        );
        tracing::info!(
            particles = config.num_particles,
            strategy = ?config.strategy,
            resampling = ?config.resampling,
            "initialized particle population"
        );

        let mut filter = ParticleFilter {
            population,
            strategy: strategy::for_kind(config.strategy, config.closed_world),
            config,
            phase: RoundPhase::Init,
            metrics,
        };
        if let Some(evidence) = self.initial_evidence {
            filter.population.take(&evidence)?;
        }
        Ok(filter)
    }
}

/// Sequential Monte Carlo filter over partial worlds
pub struct ParticleFilter {
    population: Population,
    strategy: Box<dyn AcquisitionStrategy>,
    config: FilterConfig,
    phase: RoundPhase,
    metrics: Arc<FilterMetrics>,
}

impl ParticleFilter {
    pub fn builder(model: Arc<dyn Model>) -> ParticleFilterBuilder {
        ParticleFilterBuilder {
            model,
            config: FilterConfig::default(),
            registry: None,
            metrics: None,
            initial_evidence: None,
        }
    }

    pub fn new(model: Arc<dyn Model>, config: FilterConfig) -> FilterResult<Self> {
        Self::builder(model).config(config).build()
    }

    fn ensure_live(&self) -> FilterResult<()> {
        if self.phase == RoundPhase::Terminated {
            Err(FilterError::Terminated)
        } else {
            Ok(())
        }
    }

    /// Start a round: forget which indicators changed last round
    pub fn before_taking_evidence(&mut self) -> FilterResult<()> {
        self.ensure_live()?;
        self.population.before_taking_evidence();
        self.phase = RoundPhase::BeforeEvidence;
        Ok(())
    }

    /// Pass evidence through the strategy and on to every particle
    pub fn take(&mut self, evidence: &Evidence) -> FilterResult<()> {
        self.ensure_live()?;
        let prepared = self.strategy.prepare_evidence(&mut self.population, evidence)?;
        self.population.take(&prepared)?;
        self.phase = RoundPhase::TakeEvidence;
        Ok(())
    }

    pub fn answer(&mut self, queries: &mut [Query]) -> FilterResult<()> {
        self.ensure_live()?;
        self.population.answer(queries)?;
        self.phase = RoundPhase::AnswerQueries;
        Ok(())
    }

    /// Close the round: advance time, run the strategy's hooks, then drop
    /// history and prune signatures if configured
    pub fn after_answering_queries(&mut self) -> FilterResult<()> {
        self.ensure_live()?;
        self.population.advance_timesteps();
        self.strategy.after_advance(&mut self.population)?;
        self.strategy.maintain(&mut self.population)?;

        if self.config.drop_history {
            let dropped = self.population.drop_history();
            tracing::debug!(dropped, "dropped old time slices");
        }
        if self.config.prune_signatures {
            self.population
                .registry()
                .drop_history(self.population.timestep(), self.config.signature_window);
        }
        self.phase = RoundPhase::AfterQueries;
        Ok(())
    }

    /// Apply decision-only evidence to every particle
    pub fn take_decision(&mut self, evidence: &Evidence) -> FilterResult<()> {
        self.ensure_live()?;
        self.population.take_decision(evidence)
    }

    pub fn answer_with_partition(&mut self, queries: &mut [Query], id: SignatureId) -> FilterResult<()> {
        self.ensure_live()?;
        self.population.answer_with_partition(queries, id)?;
        self.phase = RoundPhase::AnswerQueries;
        Ok(())
    }

    pub fn take_with_partition(&mut self, evidence: &Evidence, id: SignatureId) -> FilterResult<()> {
        self.ensure_live()?;
        self.population.take_with_partition(evidence, id)
    }

    pub fn resample(&mut self) -> FilterResult<()> {
        self.ensure_live()?;
        self.population.resample()
    }

    pub fn repartition(&mut self) -> FilterResult<()> {
        self.ensure_live()?;
        self.population.repartition()
    }

    pub fn sample_particle(&mut self) -> FilterResult<&Particle> {
        self.ensure_live()?;
        self.population.sample_particle()
    }

    pub fn terminate(&mut self) {
        self.phase = RoundPhase::Terminated;
    }

    /// Independent copy of the whole filter, sharing only the registry and
    /// metrics
    pub fn fork(&mut self) -> ParticleFilter {
        ParticleFilter {
            population: self.population.fork(),
            strategy: self.strategy.clone(),
            config: self.config.clone(),
            phase: self.phase,
            metrics: Arc::clone(&self.metrics),
        }
    }

    pub fn phase(&self) -> RoundPhase {
        self.phase
    }

    pub fn strategy_kind(&self) -> StrategyKind {
        self.strategy.kind()
    }

    pub fn timestep(&self) -> u32 {
        self.population.timestep()
    }

    pub fn partition_ids(&self) -> Vec<SignatureId> {
        self.population.partition_ids()
    }

    pub fn partition_stats(&self) -> PartitionStats {
        self.population.partition_stats()
    }

    pub fn effective_sample_size(&self) -> f64 {
        self.population.effective_sample_size()
    }

    pub fn population(&self) -> &Population {
        &self.population
    }

    pub fn population_mut(&mut self) -> &mut Population {
        &mut self.population
    }

    pub fn config(&self) -> &FilterConfig {
        &self.config
    }

    pub fn metrics(&self) -> &Arc<FilterMetrics> {
        &self.metrics
    }
}

impl fmt::Debug for ParticleFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ParticleFilter")
            .field("strategy", &self.strategy)
            .field("phase", &self.phase)
            .field("particles", &self.population.len())
            .field("timestep", &self.population.timestep())
            .finish()
    }
}
