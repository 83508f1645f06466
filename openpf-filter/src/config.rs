//! Filter configuration
//!
//! Configuration can be deserialized from YAML or JSON, or read from a flat
//! string property map of the kind command-line front ends produce.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::str::FromStr;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to parse YAML: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("Failed to parse JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Invalid value {value:?} for property {key}")]
    InvalidProperty { key: String, value: String },

    #[error("Conflicting values for {first} ({first_value}) and {second} ({second_value})")]
    Conflict {
        first: &'static str,
        first_value: usize,
        second: &'static str,
        second_value: usize,
    },

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// How evidence reaches the population
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StrategyKind {
    /// Observations come from an external source
    #[default]
    External,
    /// Observations are sampled from the population itself
    SelfSampling,
    /// Particles are bucketed by observability signature, never resampled
    Partitioned,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResamplingScheme {
    #[default]
    Multinomial,
    Systematic,
}

/// How a particle absorbs an observation
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SamplerKind {
    /// Force the value and multiply the weight by its probability
    #[default]
    LikelihoodWeighting,
    /// Sample the variable and zero the weight on mismatch
    Rejection,
}

macro_rules! impl_from_str {
    ($ty:ty, $($text:literal => $variant:expr),+ $(,)?) => {
        impl FromStr for $ty {
            type Err = String;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s.trim().to_ascii_lowercase().replace('-', "_").as_str() {
                    $($text => Ok($variant),)+
                    other => Err(other.to_string()),
                }
            }
        }
    };
}

impl_from_str!(StrategyKind,
    "external" => StrategyKind::External,
    "self_sampling" => StrategyKind::SelfSampling,
    "partitioned" => StrategyKind::Partitioned,
);

impl_from_str!(ResamplingScheme,
    "multinomial" => ResamplingScheme::Multinomial,
    "systematic" => ResamplingScheme::Systematic,
);

impl_from_str!(SamplerKind,
    "likelihood_weighting" => SamplerKind::LikelihoodWeighting,
    "lw" => SamplerKind::LikelihoodWeighting,
    "rejection" => SamplerKind::Rejection,
);

/// Particle filter settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FilterConfig {
    #[serde(default = "default_num_particles", alias = "num_samples")]
    pub num_particles: usize,

    /// Rejuvenation moves per round; accepted for compatibility
    #[serde(default = "default_num_moves")]
    pub num_moves: usize,

    #[serde(default)]
    pub strategy: StrategyKind,

    #[serde(default)]
    pub resampling: ResamplingScheme,

    #[serde(default)]
    pub sampler: SamplerKind,

    /// Per-generator sampler overrides
    #[serde(default)]
    pub samplers: BTreeMap<String, SamplerKind>,

    /// Drop time slices that fell out of the window after each round
    #[serde(default)]
    pub drop_history: bool,

    #[serde(default = "default_window")]
    pub timeslices_in_memory: u32,

    #[serde(default)]
    pub prune_signatures: bool,

    #[serde(default = "default_window")]
    pub signature_window: u32,

    /// Complete external evidence with the closed-world assumption
    #[serde(default)]
    pub closed_world: bool,

    #[serde(default)]
    pub seed: Option<u64>,
}

fn default_num_particles() -> usize {
    1000
}

fn default_num_moves() -> usize {
    1
}

fn default_window() -> u32 {
    2
}

impl Default for FilterConfig {
    fn default() -> Self {
        Self {
            num_particles: default_num_particles(),
            num_moves: default_num_moves(),
            strategy: StrategyKind::default(),
            resampling: ResamplingScheme::default(),
            sampler: SamplerKind::default(),
            samplers: BTreeMap::new(),
            drop_history: false,
            timeslices_in_memory: default_window(),
            prune_signatures: false,
            signature_window: default_window(),
            closed_world: false,
            seed: None,
        }
    }
}

impl FilterConfig {
    pub fn from_yaml_str(text: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_yaml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_json_str(text: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    /// Read a flat property map.
    ///
    /// `num_particles` and `num_samples` are synonyms; both may be given only
    /// if they agree. `sampler.<Generator>` keys set per-generator samplers.
    /// Unknown keys are ignored.
    pub fn from_properties<'a, I>(properties: I) -> Result<Self, ConfigError>
    where
        I: IntoIterator<Item = (&'a str, &'a str)>,
    {
        let mut config = Self::default();
        let mut particles: Option<usize> = None;
        let mut samples: Option<usize> = None;

        for (key, value) in properties {
            match key {
                "num_particles" | "numParticles" => particles = Some(parse(key, value)?),
                "num_samples" | "numSamples" => samples = Some(parse(key, value)?),
                "num_moves" | "numMoves" => config.num_moves = parse(key, value)?,
                "strategy" => config.strategy = parse(key, value)?,
                "resampling" => config.resampling = parse(key, value)?,
                "sampler" => config.sampler = parse(key, value)?,
                "drop_history" => config.drop_history = parse(key, value)?,
                "timeslices_in_memory" => config.timeslices_in_memory = parse(key, value)?,
                "prune_signatures" => config.prune_signatures = parse(key, value)?,
                "signature_window" => config.signature_window = parse(key, value)?,
                "closed_world" => config.closed_world = parse(key, value)?,
                "seed" => config.seed = Some(parse(key, value)?),
                _ => match key.strip_prefix("sampler.") {
                    Some(generator) => {
                        config
                            .samplers
                            .insert(generator.to_string(), parse(key, value)?);
                    }
                    None => tracing::debug!(key, "ignoring unknown filter property"),
                },
            }
        }

        config.num_particles = match (particles, samples) {
            (Some(p), Some(s)) if p != s => {
                return Err(ConfigError::Conflict {
                    first: "num_particles",
                    first_value: p,
                    second: "num_samples",
                    second_value: s,
                })
            }
            (Some(n), _) | (None, Some(n)) => n,
            (None, None) => default_num_particles(),
        };

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.num_particles == 0 {
            return Err(ConfigError::Invalid("num_particles must be positive".into()));
        }
        if self.num_moves == 0 {
            return Err(ConfigError::Invalid("num_moves must be positive".into()));
        }
        if self.timeslices_in_memory == 0 {
            return Err(ConfigError::Invalid(
                "timeslices_in_memory must be positive".into(),
            ));
        }
        if self.signature_window == 0 {
            return Err(ConfigError::Invalid("signature_window must be positive".into()));
        }
        Ok(())
    }
}

fn parse<T: FromStr>(key: &str, value: &str) -> Result<T, ConfigError> {
    value.trim().parse().map_err(|_| ConfigError::InvalidProperty {
        key: key.to_string(),
        value: value.to_string(),
    })
}
