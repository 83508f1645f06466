//! Shared types for openpf
//!
//! This crate provides the plain data the rest of the workspace passes
//! around: values, variable identities, evidence and weighted histograms.

pub mod evidence;
pub mod histogram;
pub mod value;
pub mod variable;

pub use evidence::{Assignment, Evidence, EvidenceKind};
pub use histogram::Histogram;
pub use value::{ObjectRef, Value};
pub use variable::{GeneratorId, Variable};
