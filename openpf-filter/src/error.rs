//! Error types for the particle filter

use crate::config::ConfigError;
use crate::signature::SignatureId;
use openpf_types::{EvidenceKind, Variable};
use openpf_world::WorldError;
use thiserror::Error;

/// Errors raised by particles, populations and runners
#[derive(Debug, Error)]
pub enum FilterError {
    #[error(transparent)]
    World(#[from] WorldError),

    #[error("All particles have zero weight")]
    DegenerateWeights,

    #[error("Expected {expected} evidence, got {found} for {var}")]
    InvalidEvidenceKind {
        var: Variable,
        expected: EvidenceKind,
        found: EvidenceKind,
    },

    #[error("No partition for signature {0}")]
    UnknownPartition(SignatureId),

    #[error("Unknown observability signature {0}")]
    UnknownSignature(SignatureId),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("Could not translate decision {text:?}: {reason}")]
    Translation { text: String, reason: String },

    #[error("Filter has been terminated")]
    Terminated,
}

impl FilterError {
    pub fn config(reason: impl Into<String>) -> Self {
        Self::Config(ConfigError::Invalid(reason.into()))
    }

    pub fn translation(text: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Translation {
            text: text.into(),
            reason: reason.into(),
        }
    }

    pub const fn is_degenerate(&self) -> bool {
        matches!(self, Self::DegenerateWeights)
    }

    pub const fn is_invalid_evidence(&self) -> bool {
        matches!(self, Self::InvalidEvidenceKind { .. })
    }

    pub const fn is_terminated(&self) -> bool {
        matches!(self, Self::Terminated)
    }

    pub fn is_unsupported_variable(&self) -> bool {
        matches!(self, Self::World(e) if e.is_unsupported_variable())
    }
}

/// Result type using FilterError
pub type FilterResult<T> = std::result::Result<T, FilterError>;
