//! Online runner
//!
//! Drives a [`ParticleFilter`] round by round: evidence and queries come
//! from an [`EvidenceSource`], histograms go to a [`ResultSink`], and an
//! optional [`DecisionPolicy`] picks an action after each round's queries.

use crate::config::StrategyKind;
use crate::engine::ParticleFilter;
use crate::error::FilterResult;
use crate::signature::SignatureId;
use openpf_types::{Evidence, Histogram};
use openpf_world::Query;
use parking_lot::Mutex;
use std::collections::{BTreeMap, VecDeque};
use std::sync::Arc;

/// Evidence and queries for one round
#[derive(Debug, Clone, Default)]
pub struct Round {
    pub evidence: Evidence,
    pub queries: Vec<Query>,
}

impl Round {
    pub fn new(evidence: Evidence, queries: Vec<Query>) -> Self {
        Self { evidence, queries }
    }
}

/// Latest histogram per query name
pub type QueryResults = BTreeMap<String, Histogram>;

pub trait EvidenceSource {
    /// Next round, or `None` once the source is exhausted
    fn next_round(&mut self, timestep: u32) -> FilterResult<Option<Round>>;
}

/// Rounds queued up front
#[derive(Debug, Default)]
pub struct QueuedRounds {
    rounds: VecDeque<Round>,
}

impl QueuedRounds {
    pub fn new(rounds: impl IntoIterator<Item = Round>) -> Self {
        Self {
            rounds: rounds.into_iter().collect(),
        }
    }
}

impl EvidenceSource for QueuedRounds {
    fn next_round(&mut self, _timestep: u32) -> FilterResult<Option<Round>> {
        Ok(self.rounds.pop_front())
    }
}

pub trait ResultSink: Send + Sync {
    /// `partition` is set when the filter answers per observation history
    fn report(&self, timestep: u32, partition: Option<SignatureId>, query: &Query) -> FilterResult<()>;
}

/// One reported histogram
#[derive(Debug, Clone, PartialEq)]
pub struct Report {
    pub timestep: u32,
    pub partition: Option<SignatureId>,
    pub query: String,
    pub histogram: Histogram,
}

/// Sink that keeps every report in memory
#[derive(Debug, Default)]
pub struct MemorySink {
    reports: Mutex<Vec<Report>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn reports(&self) -> Vec<Report> {
        self.reports.lock().clone()
    }

    pub fn len(&self) -> usize {
        self.reports.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.reports.lock().is_empty()
    }
}

impl ResultSink for MemorySink {
    fn report(&self, timestep: u32, partition: Option<SignatureId>, query: &Query) -> FilterResult<()> {
        self.reports.lock().push(Report {
            timestep,
            partition,
            query: query.name().to_string(),
            histogram: query.histogram().clone(),
        });
        Ok(())
    }
}

/// Chooses an action from the latest query results
pub trait DecisionPolicy {
    /// Decision text, or `None` to take no action this round
    fn decide(&mut self, results: &QueryResults) -> FilterResult<Option<String>>;
}

/// Turns decision text into decision evidence
pub trait EvidenceTranslator {
    fn translate(&self, text: &str, timestep: u32) -> FilterResult<Evidence>;
}

/// Summary of a completed run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RunSummary {
    pub rounds: u32,
    pub decisions: u32,
}

/// Runs a filter for up to a fixed number of rounds
pub struct Runner<S> {
    filter: ParticleFilter,
    source: S,
    sink: Arc<dyn ResultSink>,
    policy: Option<(Box<dyn DecisionPolicy>, Box<dyn EvidenceTranslator>)>,
    max_rounds: u32,
}

impl<S: EvidenceSource> Runner<S> {
    pub fn new(filter: ParticleFilter, source: S, sink: Arc<dyn ResultSink>, max_rounds: u32) -> Self {
        Self {
            filter,
            source,
            sink,
            policy: None,
            max_rounds,
        }
    }

    /// Decide after every round and feed the decision back as evidence
    pub fn with_policy(
        mut self,
        policy: impl DecisionPolicy + 'static,
        translator: impl EvidenceTranslator + 'static,
    ) -> Self {
        self.policy = Some((Box::new(policy), Box::new(translator)));
        self
    }

    pub fn filter(&self) -> &ParticleFilter {
        &self.filter
    }

    /// Run until the source is exhausted or `max_rounds` rounds are done,
    /// then terminate the filter
    pub fn run(&mut self) -> FilterResult<RunSummary> {
        let mut summary = RunSummary {
            rounds: 0,
            decisions: 0,
        };
        while summary.rounds < self.max_rounds {
            let timestep = self.filter.timestep();
            self.filter.before_taking_evidence()?;
            let Some(mut round) = self.source.next_round(timestep)? else {
                break;
            };
            self.filter.take(&round.evidence)?;

            if self.filter.strategy_kind() == StrategyKind::Partitioned {
                for id in self.filter.partition_ids() {
                    self.filter.answer_with_partition(&mut round.queries, id)?;
                    self.report(timestep, Some(id), &round.queries)?;
                    if let Some(evidence) = self.decide(&round.queries, timestep)? {
                        self.filter.take_with_partition(&evidence, id)?;
                        summary.decisions += 1;
                    }
                }
            } else {
                self.filter.answer(&mut round.queries)?;
                self.report(timestep, None, &round.queries)?;
                if let Some(evidence) = self.decide(&round.queries, timestep)? {
                    self.filter.take_decision(&evidence)?;
                    summary.decisions += 1;
                }
            }

            self.filter.after_answering_queries()?;
            summary.rounds += 1;
            tracing::debug!(timestep, ess = self.filter.effective_sample_size(), "finished round");
        }
        self.filter.terminate();
        Ok(summary)
    }

    fn report(&self, timestep: u32, partition: Option<SignatureId>, queries: &[Query]) -> FilterResult<()> {
        for query in queries {
            self.sink.report(timestep, partition, query)?;
        }
        Ok(())
    }

    fn decide(&mut self, queries: &[Query], timestep: u32) -> FilterResult<Option<Evidence>> {
        let Some((policy, translator)) = self.policy.as_mut() else {
            return Ok(None);
        };
        let results: QueryResults = queries
            .iter()
            .map(|q| (q.name().to_string(), q.histogram().clone()))
            .collect();
        match policy.decide(&results)? {
            Some(text) => translator.translate(&text, timestep).map(Some),
            None => Ok(None),
        }
    }
}
