//! Weighted histograms used to accumulate query answers

use crate::value::Value;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Map from value to accumulated weight
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Histogram {
    weights: BTreeMap<Value, f64>,
    total: f64,
}

impl Histogram {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add `weight` to the bucket for `value`
    pub fn add(&mut self, value: Value, weight: f64) {
        *self.weights.entry(value).or_insert(0.0) += weight;
        self.total += weight;
    }

    /// Forget everything accumulated so far
    pub fn zero_out(&mut self) {
        self.weights.clear();
        self.total = 0.0;
    }

    pub fn total_weight(&self) -> f64 {
        self.total
    }

    pub fn weight(&self, value: &Value) -> f64 {
        self.weights.get(value).copied().unwrap_or(0.0)
    }

    /// Normalized weight of `value`; zero for an empty histogram
    pub fn probability(&self, value: &Value) -> f64 {
        if self.total > 0.0 {
            self.weight(value) / self.total
        } else {
            0.0
        }
    }

    /// Entries in value order
    pub fn entries(&self) -> impl Iterator<Item = (&Value, f64)> {
        self.weights.iter().map(|(v, w)| (v, *w))
    }

    /// The value with the largest weight (smallest value on ties)
    pub fn mode(&self) -> Option<&Value> {
        let mut best: Option<(&Value, f64)> = None;
        for (v, w) in self.entries() {
            if best.map_or(true, |(_, bw)| w > bw) {
                best = Some((v, w));
            }
        }
        best.map(|(v, _)| v)
    }

    pub fn len(&self) -> usize {
        self.weights.len()
    }

    pub fn is_empty(&self) -> bool {
        self.weights.is_empty()
    }
}

impl fmt::Display for Histogram {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, (v, _)) in self.entries().enumerate() {
            if i > 0 {
                write!(f, "\t")?;
            }
            write!(f, "[{}:{:.9}]", v, self.probability(v))?;
        }
        Ok(())
    }
}
