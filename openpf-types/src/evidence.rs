//! Evidence: forced assignments to variables
//!
//! Observations are probability weighted; decisions are externally
//! controlled actions and never change a particle's weight.

use crate::value::Value;
use crate::variable::Variable;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Whether an assignment is observed or decided
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EvidenceKind {
    Observation,
    Decision,
}

impl fmt::Display for EvidenceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EvidenceKind::Observation => write!(f, "observation"),
            EvidenceKind::Decision => write!(f, "decision"),
        }
    }
}

/// One forced assignment
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Assignment {
    pub var: Variable,
    pub value: Value,
    pub kind: EvidenceKind,
}

impl fmt::Display for Assignment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.kind {
            EvidenceKind::Observation => write!(f, "obs {} = {};", self.var, self.value),
            EvidenceKind::Decision => write!(f, "decide {} = {};", self.var, self.value),
        }
    }
}

/// An ordered set of forced assignments
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Evidence {
    assignments: Vec<Assignment>,
}

impl Evidence {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an observation; a later assignment to the same variable replaces it
    pub fn observe(&mut self, var: Variable, value: impl Into<Value>) -> &mut Self {
        self.push(Assignment {
            var,
            value: value.into(),
            kind: EvidenceKind::Observation,
        })
    }

    /// Add a decision; a later assignment to the same variable replaces it
    pub fn decide(&mut self, var: Variable, value: impl Into<Value>) -> &mut Self {
        self.push(Assignment {
            var,
            value: value.into(),
            kind: EvidenceKind::Decision,
        })
    }

    /// Builder-style observation
    pub fn with_observation(mut self, var: Variable, value: impl Into<Value>) -> Self {
        self.observe(var, value);
        self
    }

    /// Builder-style decision
    pub fn with_decision(mut self, var: Variable, value: impl Into<Value>) -> Self {
        self.decide(var, value);
        self
    }

    pub fn push(&mut self, assignment: Assignment) -> &mut Self {
        if let Some(existing) = self.assignments.iter_mut().find(|a| a.var == assignment.var) {
            *existing = assignment;
        } else {
            self.assignments.push(assignment);
        }
        self
    }

    pub fn iter(&self) -> impl Iterator<Item = &Assignment> {
        self.assignments.iter()
    }

    pub fn observations(&self) -> impl Iterator<Item = &Assignment> {
        self.assignments
            .iter()
            .filter(|a| a.kind == EvidenceKind::Observation)
    }

    pub fn decisions(&self) -> impl Iterator<Item = &Assignment> {
        self.assignments
            .iter()
            .filter(|a| a.kind == EvidenceKind::Decision)
    }

    pub fn get(&self, var: &Variable) -> Option<&Assignment> {
        self.assignments.iter().find(|a| &a.var == var)
    }

    pub fn contains(&self, var: &Variable) -> bool {
        self.get(var).is_some()
    }

    pub fn len(&self) -> usize {
        self.assignments.len()
    }

    pub fn is_empty(&self) -> bool {
        self.assignments.is_empty()
    }

    /// True if every assignment is a decision (vacuously true when empty)
    pub fn is_decision_only(&self) -> bool {
        self.assignments
            .iter()
            .all(|a| a.kind == EvidenceKind::Decision)
    }

    /// The first assignment that is not of the given kind
    pub fn first_not_of(&self, kind: EvidenceKind) -> Option<&Assignment> {
        self.assignments.iter().find(|a| a.kind != kind)
    }
}

impl fmt::Display for Evidence {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, a) in self.assignments.iter().enumerate() {
            if i > 0 {
                write!(f, " ")?;
            }
            write!(f, "{a}")?;
        }
        Ok(())
    }
}

impl<'a> IntoIterator for &'a Evidence {
    type Item = &'a Assignment;
    type IntoIter = std::slice::Iter<'a, Assignment>;

    fn into_iter(self) -> Self::IntoIter {
        self.assignments.iter()
    }
}
