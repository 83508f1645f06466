//! Evidence-acquisition strategies
//!
//! One engine serves all three filters. A strategy decides what evidence
//! `take` accepts, whether observations are sampled from the population
//! after each round, and whether the population is resampled or
//! repartitioned.

use crate::config::StrategyKind;
use crate::error::FilterResult;
use crate::population::{ensure_decisions, Population};
use openpf_types::Evidence;
use std::fmt;

/// Round hooks that differ between filter variants
pub trait AcquisitionStrategy: fmt::Debug + Send + Sync {
    fn kind(&self) -> StrategyKind;

    /// Validate, and possibly complete, evidence passed to `take`
    fn prepare_evidence(&self, population: &mut Population, evidence: &Evidence) -> FilterResult<Evidence>;

    /// Runs right after every particle advanced its timestep
    fn after_advance(&self, _population: &mut Population) -> FilterResult<()> {
        Ok(())
    }

    /// Resample or repartition
    fn maintain(&self, population: &mut Population) -> FilterResult<()>;

    fn boxed_clone(&self) -> Box<dyn AcquisitionStrategy>;
}

impl Clone for Box<dyn AcquisitionStrategy> {
    fn clone(&self) -> Self {
        self.boxed_clone()
    }
}

/// Build the strategy for `kind`
pub fn for_kind(kind: StrategyKind, closed_world: bool) -> Box<dyn AcquisitionStrategy> {
    match kind {
        StrategyKind::External => Box::new(ExternalEvidence { closed_world }),
        StrategyKind::SelfSampling => Box::new(SelfSampledEvidence),
        StrategyKind::Partitioned => Box::new(PartitionedEvidence),
    }
}

fn decisions_only(evidence: &Evidence) -> FilterResult<Evidence> {
    ensure_decisions(evidence)?;
    Ok(evidence.clone())
}

/// Observations arrive from outside; the population is resampled
#[derive(Debug, Clone, Copy, Default)]
pub struct ExternalEvidence {
    /// Add false observations for every indicator the evidence leaves out
    pub closed_world: bool,
}

impl AcquisitionStrategy for ExternalEvidence {
    fn kind(&self) -> StrategyKind {
        StrategyKind::External
    }

    fn prepare_evidence(&self, population: &mut Population, evidence: &Evidence) -> FilterResult<Evidence> {
        if self.closed_world {
            let round = population.timestep();
            population.complete_closed_world(evidence, round)
        } else {
            Ok(evidence.clone())
        }
    }

    fn maintain(&self, population: &mut Population) -> FilterResult<()> {
        population.resample()
    }

    fn boxed_clone(&self) -> Box<dyn AcquisitionStrategy> {
        Box::new(*self)
    }
}

/// Observations are sampled from the population's own predictions
#[derive(Debug, Clone, Copy, Default)]
pub struct SelfSampledEvidence;

impl AcquisitionStrategy for SelfSampledEvidence {
    fn kind(&self) -> StrategyKind {
        StrategyKind::SelfSampling
    }

    fn prepare_evidence(&self, _population: &mut Population, evidence: &Evidence) -> FilterResult<Evidence> {
        decisions_only(evidence)
    }

    fn after_advance(&self, population: &mut Population) -> FilterResult<()> {
        population.retake_observability().map(|_| ())
    }

    fn maintain(&self, population: &mut Population) -> FilterResult<()> {
        population.resample()
    }

    fn boxed_clone(&self) -> Box<dyn AcquisitionStrategy> {
        Box::new(*self)
    }
}

/// Particles are bucketed by observation history and never resampled
#[derive(Debug, Clone, Copy, Default)]
pub struct PartitionedEvidence;

impl AcquisitionStrategy for PartitionedEvidence {
    fn kind(&self) -> StrategyKind {
        StrategyKind::Partitioned
    }

    fn prepare_evidence(&self, _population: &mut Population, evidence: &Evidence) -> FilterResult<Evidence> {
        decisions_only(evidence)
    }

    fn maintain(&self, population: &mut Population) -> FilterResult<()> {
        population.repartition()
    }

    fn boxed_clone(&self) -> Box<dyn AcquisitionStrategy> {
        Box::new(*self)
    }
}
