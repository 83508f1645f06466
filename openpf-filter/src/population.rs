//! The particle population
//!
//! A [`Population`] owns the particles and the partition of particle indices
//! by observability signature. Everything here is strategy-agnostic; the
//! strategies in [`crate::strategy`] decide which of these operations run at
//! the end of a round.

use crate::config::ResamplingScheme;
use crate::error::{FilterError, FilterResult};
use crate::metrics::{FilterMetrics, Phase};
use crate::particle::Particle;
use crate::resample;
use crate::signature::{SignatureId, SignatureRegistry};
use openpf_types::{Evidence, EvidenceKind, Value};
use openpf_world::Query;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::collections::BTreeMap;
use std::sync::Arc;

/// Bucket statistics for the current partitioning
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PartitionStats {
    pub buckets: usize,
    pub min_size: usize,
    pub max_size: usize,
    pub largest: Option<SignatureId>,
}

/// Weighted particles plus their signature partition
pub struct Population {
    particles: Vec<Particle>,
    partitions: BTreeMap<SignatureId, Vec<usize>>,
    registry: Arc<SignatureRegistry>,
    rng: StdRng,
    scheme: ResamplingScheme,
    metrics: Arc<FilterMetrics>,
}

impl Population {
    /// `n` copies of `prototype`, each with its own random stream
    pub fn new(
        mut prototype: Particle,
        n: usize,
        registry: Arc<SignatureRegistry>,
        mut rng: StdRng,
        scheme: ResamplingScheme,
        metrics: Arc<FilterMetrics>,
    ) -> Self {
        prototype.set_signature(registry.root());
        let particles = (0..n)
            .map(|_| {
                let mut p = prototype.copy();
                p.reseed(rng.gen());
                p
            })
            .collect();
        let mut population = Self {
            particles,
            partitions: BTreeMap::new(),
            registry,
            rng,
            scheme,
            metrics,
        };
        population.regroup();
        population
    }

    fn try_for_each_particle<F>(&mut self, f: F) -> FilterResult<()>
    where
        F: Fn(&mut Particle) -> FilterResult<()> + Send + Sync,
    {
        #[cfg(feature = "parallel")]
        {
            use rayon::prelude::*;
            self.particles.par_iter_mut().try_for_each(f)
        }
        #[cfg(not(feature = "parallel"))]
        {
            self.particles.iter_mut().try_for_each(f)
        }
    }

    /// Query values for the particles at `indices`
    fn evaluate_at(&mut self, indices: &[usize], queries: &[Query]) -> FilterResult<Vec<Vec<Value>>> {
        #[cfg(feature = "parallel")]
        {
            use rayon::prelude::*;
            let wanted: std::collections::HashSet<usize> = indices.iter().copied().collect();
            self.particles
                .par_iter_mut()
                .enumerate()
                .filter(|(i, _)| wanted.contains(i))
                .map(|(_, p)| p.evaluate(queries))
                .collect()
        }
        #[cfg(not(feature = "parallel"))]
        {
            indices
                .iter()
                .map(|&i| self.particles[i].evaluate(queries))
                .collect()
        }
    }

    /// Rebuild the partition map from each particle's signature
    pub fn regroup(&mut self) {
        let mut partitions: BTreeMap<SignatureId, Vec<usize>> = BTreeMap::new();
        for (i, p) in self.particles.iter().enumerate() {
            partitions.entry(p.signature()).or_default().push(i);
        }
        self.partitions = partitions;
    }

    /// Reset changed-observable tracking on every world
    pub fn before_taking_evidence(&mut self) {
        for p in &mut self.particles {
            p.world_mut().clear_changed_observables();
        }
    }

    /// Apply `evidence` to every particle
    pub fn take(&mut self, evidence: &Evidence) -> FilterResult<()> {
        let _timer = self.metrics.time(Phase::Take);
        self.try_for_each_particle(|p| p.take(evidence))
    }

    /// Zero the histograms, then add every particle's weighted answers
    pub fn answer(&mut self, queries: &mut [Query]) -> FilterResult<()> {
        let _timer = self.metrics.time(Phase::Answer);
        let indices: Vec<usize> = (0..self.particles.len()).collect();
        self.answer_at(&indices, queries)
    }

    fn answer_at(&mut self, indices: &[usize], queries: &mut [Query]) -> FilterResult<()> {
        for q in queries.iter_mut() {
            q.zero_out();
        }
        let answers = self.evaluate_at(indices, queries)?;
        for (&i, values) in indices.iter().zip(answers) {
            let weight = self.particles[i].weight();
            for (q, value) in queries.iter_mut().zip(values) {
                q.record(value, weight);
            }
        }
        Ok(())
    }

    pub fn advance_timesteps(&mut self) {
        for p in &mut self.particles {
            p.advance_timestep();
        }
    }

    pub fn weights(&self) -> Vec<f64> {
        self.particles.iter().map(Particle::weight).collect()
    }

    pub fn total_weight(&self) -> f64 {
        self.particles.iter().map(Particle::weight).sum()
    }

    pub fn effective_sample_size(&self) -> f64 {
        resample::effective_sample_size(&self.weights())
    }

    /// Redraw the population proportionally to weight.
    ///
    /// The first draw of a particle keeps it; later draws copy and reseed it.
    /// All weights are reset to 1.
    pub fn resample(&mut self) -> FilterResult<()> {
        let _timer = self.metrics.time(Phase::Resample);
        let n = self.particles.len();
        let weights = self.weights();
        let ess = resample::effective_sample_size(&weights);
        let indices = match resample::draw_indices(&weights, n, self.scheme, &mut self.rng) {
            Ok(indices) => indices,
            Err(err) => {
                self.metrics.record_degenerate();
                tracing::warn!(particles = n, "all particles have zero weight");
                return Err(err);
            }
        };

        let mut used = vec![false; n];
        let mut slots: Vec<Option<Particle>> = Vec::with_capacity(n);
        let mut copies = 0u64;
        for &i in &indices {
            if used[i] {
                let mut copy = self.particles[i].copy();
                copy.reseed(self.rng.gen());
                slots.push(Some(copy));
                copies += 1;
            } else {
                used[i] = true;
                slots.push(None);
            }
        }

        let mut originals: Vec<Option<Particle>> =
            std::mem::take(&mut self.particles).into_iter().map(Some).collect();
        for (slot, &i) in slots.iter_mut().zip(&indices) {
            if slot.is_none() {
                *slot = originals[i].take();
            }
        }
        self.particles = slots.into_iter().flatten().collect();
        for p in &mut self.particles {
            p.reset_weight();
        }
        self.regroup();
        self.metrics.record_copies(copies);

        let survivors = used.iter().filter(|&&u| u).count();
        tracing::debug!(ess, survivors, particles = n, "resampled population");
        Ok(())
    }

    /// Index of one particle drawn proportionally to weight
    pub fn sample_index(&mut self) -> FilterResult<usize> {
        resample::sample_index(&self.weights(), &mut self.rng)
    }

    pub fn sample_particle(&mut self) -> FilterResult<&Particle> {
        let i = self.sample_index()?;
        Ok(&self.particles[i])
    }

    /// Apply decision-only evidence to every particle
    pub fn take_decision(&mut self, evidence: &Evidence) -> FilterResult<()> {
        ensure_decisions(evidence)?;
        self.take(evidence)
    }

    /// Move every particle to its successor signature and regroup
    pub fn repartition(&mut self) -> FilterResult<()> {
        let _timer = self.metrics.time(Phase::Repartition);
        self.update_signatures()?;
        let stats = self.partition_stats();
        tracing::debug!(
            buckets = stats.buckets,
            min = stats.min_size,
            max = stats.max_size,
            "repartitioned population"
        );
        Ok(())
    }

    /// Advance every particle's signature
    pub fn update_signatures(&mut self) -> FilterResult<()> {
        let registry = Arc::clone(&self.registry);
        self.try_for_each_particle(|p| registry.update(p).map(|_| ()))?;
        self.regroup();
        Ok(())
    }

    /// Zero the histograms and answer from one bucket only
    pub fn answer_with_partition(&mut self, queries: &mut [Query], id: SignatureId) -> FilterResult<()> {
        let indices = self
            .partitions
            .get(&id)
            .cloned()
            .ok_or(FilterError::UnknownPartition(id))?;
        let _timer = self.metrics.time(Phase::Answer);
        self.answer_at(&indices, queries)
    }

    /// Apply decision-only evidence to one bucket
    pub fn take_with_partition(&mut self, evidence: &Evidence, id: SignatureId) -> FilterResult<()> {
        ensure_decisions(evidence)?;
        let indices = self
            .partitions
            .get(&id)
            .cloned()
            .ok_or(FilterError::UnknownPartition(id))?;
        let _timer = self.metrics.time(Phase::TakeWithPartition);
        for i in indices {
            self.particles[i].take(evidence)?;
        }
        Ok(())
    }

    /// Sample an observation history from the population itself and make
    /// every particle condition on it
    pub fn retake_observability(&mut self) -> FilterResult<SignatureId> {
        let _timer = self.metrics.time(Phase::Retake);
        self.update_signatures()?;

        let chosen = match self.sample_index() {
            Ok(i) => self.particles[i].signature(),
            Err(err) => {
                self.metrics.record_degenerate();
                tracing::warn!(particles = self.particles.len(), "all particles have zero weight");
                return Err(err);
            }
        };
        let signature = self.registry.get_by_id(chosen)?;
        let evidence = signature.evidence();
        tracing::debug!(signature = %signature, "sampled observation history");

        let sig = Arc::clone(&signature);
        self.try_for_each_particle(|p| {
            p.uninstantiate_observables(&sig);
            p.take(evidence)?;
            p.set_signature(sig.id());
            Ok(())
        })?;
        self.regroup();
        Ok(chosen)
    }

    /// Complete `evidence` under the closed-world assumption.
    ///
    /// A copy of the first particle takes the evidence and classifies the
    /// indicators of `round`. Indicators whose referenced variable the
    /// evidence observes are added as true; the rest as false.
    pub fn complete_closed_world(&mut self, evidence: &Evidence, round: u32) -> FilterResult<Evidence> {
        let Some(first) = self.particles.first_mut() else {
            return Ok(evidence.clone());
        };
        let mut representative = first.copy();
        representative.world_mut().clear_changed_observables();
        representative.take(evidence)?;
        let facts = representative.classify_observability(round)?;

        let model = Arc::clone(representative.model());
        let mut completed = evidence.clone();
        for indicator in facts.observable.iter().chain(facts.unobservable.iter()) {
            if evidence.contains(indicator) {
                continue;
            }
            let shown = model
                .observed_by(indicator)
                .is_some_and(|referenced| evidence.contains(&referenced));
            completed.observe(indicator.clone(), shown);
        }
        Ok(completed)
    }

    /// Drop time slices outside every particle's window
    pub fn drop_history(&mut self) -> usize {
        self.particles
            .iter_mut()
            .map(Particle::uninstantiate_previous_timeslices)
            .sum()
    }

    pub fn partition_stats(&self) -> PartitionStats {
        let mut stats = PartitionStats {
            buckets: self.partitions.len(),
            min_size: 0,
            max_size: 0,
            largest: None,
        };
        for (id, members) in &self.partitions {
            if stats.largest.is_none() || members.len() > stats.max_size {
                stats.max_size = members.len();
                stats.largest = Some(*id);
            }
            if stats.min_size == 0 || members.len() < stats.min_size {
                stats.min_size = members.len();
            }
        }
        stats
    }

    /// Deep copy with its own particles; the registry stays shared
    pub fn fork(&mut self) -> Population {
        let mut rng = StdRng::seed_from_u64(self.rng.gen());
        let particles = self
            .particles
            .iter_mut()
            .map(|p| {
                let mut copy = p.copy();
                copy.reseed(rng.gen());
                copy
            })
            .collect();
        Population {
            particles,
            partitions: self.partitions.clone(),
            registry: Arc::clone(&self.registry),
            rng,
            scheme: self.scheme,
            metrics: Arc::clone(&self.metrics),
        }
    }

    pub fn particles(&self) -> &[Particle] {
        &self.particles
    }

    pub fn particles_mut(&mut self) -> &mut [Particle] {
        &mut self.particles
    }

    pub fn partitions(&self) -> &BTreeMap<SignatureId, Vec<usize>> {
        &self.partitions
    }

    pub fn partition_ids(&self) -> Vec<SignatureId> {
        self.partitions.keys().copied().collect()
    }

    pub fn registry(&self) -> &Arc<SignatureRegistry> {
        &self.registry
    }

    /// Timestep of the population (all particles move in lockstep)
    pub fn timestep(&self) -> u32 {
        self.particles.first().map_or(0, Particle::timestep)
    }

    pub fn len(&self) -> usize {
        self.particles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.particles.is_empty()
    }
}

pub(crate) fn ensure_decisions(evidence: &Evidence) -> FilterResult<()> {
    match evidence.first_not_of(EvidenceKind::Decision) {
        Some(a) => Err(FilterError::InvalidEvidenceKind {
            var: a.var.clone(),
            expected: EvidenceKind::Decision,
            found: a.kind,
        }),
        None => Ok(()),
    }
}
