//! Errors raised while instantiating variables

use openpf_types::Variable;
use thiserror::Error;

/// Errors that can occur while evaluating a partial world
#[derive(Debug, Error)]
pub enum WorldError {
    #[error("No dependency model for variable {var}")]
    UnsupportedVariable { var: Variable },

    #[error("Cycle in context-specific dependency graph while instantiating {var}: {}", format_chain(.chain))]
    DependencyCycle { var: Variable, chain: Vec<Variable> },

    #[error("Invalid distribution for {var}: {reason}")]
    InvalidDistribution { var: Variable, reason: String },
}

impl WorldError {
    pub fn invalid_distribution(var: &Variable, reason: impl Into<String>) -> Self {
        Self::InvalidDistribution {
            var: var.clone(),
            reason: reason.into(),
        }
    }

    pub const fn is_unsupported_variable(&self) -> bool {
        matches!(self, Self::UnsupportedVariable { .. })
    }

    pub const fn is_cycle(&self) -> bool {
        matches!(self, Self::DependencyCycle { .. })
    }

    pub const fn is_invalid_distribution(&self) -> bool {
        matches!(self, Self::InvalidDistribution { .. })
    }
}

fn format_chain(chain: &[Variable]) -> String {
    chain
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(" -> ")
}

/// Result type using WorldError
pub type WorldResult<T> = std::result::Result<T, WorldError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cycle_message_lists_chain() {
        let a = Variable::constant("A");
        let b = Variable::constant("B");
        let err = WorldError::DependencyCycle {
            var: a.clone(),
            chain: vec![a, b],
        };
        assert!(err.is_cycle());
        assert!(err.to_string().contains("A -> B"));
    }

    #[test]
    fn test_unsupported_message() {
        let err = WorldError::UnsupportedVariable {
            var: Variable::temporal("Ghost", vec![], 1),
        };
        assert!(err.is_unsupported_variable());
        assert_eq!(err.to_string(), "No dependency model for variable Ghost(@1)");
    }
}
