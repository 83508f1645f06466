//! Particle filtering for open-universe temporal models
//!
//! This crate runs sequential Monte Carlo inference over partial worlds from
//! `openpf-world`. The main pieces are:
//!
//! - **Particles**: a partial world, a weight, a timestep and its own random
//!   stream
//! - **Population**: broadcast of evidence and queries, resampling, and the
//!   partition of particles by observability signature
//! - **Strategies**: external evidence, self-sampled evidence, or
//!   partitioned filtering without resampling
//! - **Signature registry**: content-addressed interning of observation
//!   histories
//! - **Runner**: an online loop over an evidence source with an optional
//!   decision policy
//!
//! # Example
//!
//! ```
//! use openpf_filter::prelude::*;
//! use std::sync::Arc;
//!
//! let model = StaticModel::builder()
//!     .random("Rain", DependencyModel::fixed(bernoulli(0.2)))
//!     .build();
//! let config = FilterConfig { num_particles: 100, seed: Some(7), ..FilterConfig::default() };
//! let mut pf = ParticleFilter::new(Arc::new(model), config).unwrap();
//!
//! let rain = Variable::temporal("Rain", vec![], 0);
//! let mut queries = vec![Query::variable(rain)];
//! pf.before_taking_evidence().unwrap();
//! pf.take(&Evidence::new()).unwrap();
//! pf.answer(&mut queries).unwrap();
//! pf.after_answering_queries().unwrap();
//! assert!(queries[0].histogram().total_weight() > 0.0);
//! ```

pub mod config;
pub mod engine;
pub mod error;
pub mod metrics;
pub mod particle;
pub mod population;
pub mod resample;
pub mod runner;
pub mod signature;
pub mod strategy;

pub use config::{ConfigError, FilterConfig, ResamplingScheme, SamplerKind, StrategyKind};
pub use engine::{ParticleFilter, ParticleFilterBuilder, RoundPhase};
pub use error::{FilterError, FilterResult};
pub use metrics::{FilterMetrics, MetricsSnapshot, Phase};
pub use particle::{Particle, SamplingPolicy};
pub use population::{PartitionStats, Population};
pub use runner::{
    DecisionPolicy, EvidenceSource, EvidenceTranslator, MemorySink, QueryResults, QueuedRounds,
    Report, ResultSink, Round, RunSummary, Runner,
};
pub use signature::{ObservabilitySignature, ObservationFacts, SignatureId, SignatureRegistry};
pub use strategy::{
    AcquisitionStrategy, ExternalEvidence, PartitionedEvidence, SelfSampledEvidence,
};

/// Prelude for convenient imports
pub mod prelude {
    pub use crate::{
        FilterConfig, FilterError, FilterResult, ParticleFilter, ResamplingScheme, SamplerKind,
        SignatureId, SignatureRegistry, StrategyKind,
    };
    pub use openpf_world::prelude::*;
}
