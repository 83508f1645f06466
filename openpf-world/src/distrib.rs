//! Distribution leaves
//!
//! The core treats distributions as opaque: it only samples from them and
//! asks for the probability of a value. A few finite leaves are provided so
//! models can be written without an external distribution library.

use openpf_types::Value;
use rand::{Rng, RngCore};
use std::fmt;
use std::sync::Arc;

/// A conditional probability distribution with its arguments already bound
pub trait Distribution: fmt::Debug + Send + Sync {
    /// Draw a value
    fn sample(&self, rng: &mut dyn RngCore) -> Value;

    /// Probability (or density) of `value`
    fn prob(&self, value: &Value) -> f64;

    fn log_prob(&self, value: &Value) -> f64 {
        self.prob(value).ln()
    }

    /// Reports parameters that do not describe a probability distribution
    fn validate(&self) -> Result<(), String> {
        Ok(())
    }
}

/// Finite distribution over explicit values
#[derive(Debug, Clone, PartialEq)]
pub struct Categorical {
    outcomes: Vec<(Value, f64)>,
    problem: Option<String>,
}

impl Categorical {
    /// Builds a categorical from unnormalized weights.
    ///
    /// Zero weights are dropped. Negative or non-finite weights, or a table
    /// with no positive weight, leave the distribution invalid.
    pub fn new(weights: impl IntoIterator<Item = (Value, f64)>) -> Self {
        let mut problem = None;
        let mut kept: Vec<(Value, f64)> = Vec::new();
        for (value, w) in weights {
            if !w.is_finite() || w < 0.0 {
                problem.get_or_insert_with(|| format!("weight {w} for {value}"));
            } else if w > 0.0 {
                kept.push((value, w));
            }
        }
        let total: f64 = kept.iter().map(|(_, w)| w).sum();
        if problem.is_none() && !(total.is_finite() && total > 0.0) {
            problem = Some("no outcome has positive weight".to_string());
        }
        if problem.is_some() {
            kept.clear();
        }
        let outcomes = kept.into_iter().map(|(v, w)| (v, w / total)).collect();
        Self { outcomes, problem }
    }

    pub fn outcomes(&self) -> &[(Value, f64)] {
        &self.outcomes
    }
}

impl Distribution for Categorical {
    fn sample(&self, rng: &mut dyn RngCore) -> Value {
        let u: f64 = rng.gen();
        let mut cumsum = 0.0;
        for (value, p) in &self.outcomes {
            cumsum += p;
            if u < cumsum {
                return value.clone();
            }
        }
        // Rounding can leave u just above the final cumulative sum
        self.outcomes
            .last()
            .map(|(v, _)| v.clone())
            .unwrap_or(Value::Null)
    }

    fn prob(&self, value: &Value) -> f64 {
        self.outcomes
            .iter()
            .filter(|(v, _)| v == value)
            .map(|(_, p)| *p)
            .sum()
    }

    fn validate(&self) -> Result<(), String> {
        match &self.problem {
            Some(problem) => Err(problem.clone()),
            None => Ok(()),
        }
    }
}

/// Boolean distribution that is true with probability `p`
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Bernoulli {
    p: f64,
}

impl Bernoulli {
    /// `p` outside `[0, 1]` (or NaN) is kept as given and rejected by
    /// [`Distribution::validate`]
    pub fn new(p: f64) -> Self {
        Self { p }
    }
}

impl Distribution for Bernoulli {
    fn sample(&self, rng: &mut dyn RngCore) -> Value {
        Value::Bool(rng.gen::<f64>() < self.p)
    }

    fn prob(&self, value: &Value) -> f64 {
        match value.as_bool() {
            Some(true) => self.p,
            Some(false) => 1.0 - self.p,
            None => 0.0,
        }
    }

    fn validate(&self) -> Result<(), String> {
        if (0.0..=1.0).contains(&self.p) {
            Ok(())
        } else {
            Err(format!("bernoulli parameter {} is not a probability", self.p))
        }
    }
}

/// All mass on a single value
#[derive(Debug, Clone, PartialEq)]
pub struct PointMass {
    value: Value,
}

impl PointMass {
    pub fn new(value: impl Into<Value>) -> Self {
        Self {
            value: value.into(),
        }
    }
}

impl Distribution for PointMass {
    fn sample(&self, _rng: &mut dyn RngCore) -> Value {
        self.value.clone()
    }

    fn prob(&self, value: &Value) -> f64 {
        if *value == self.value {
            1.0
        } else {
            0.0
        }
    }
}

pub fn categorical(weights: impl IntoIterator<Item = (Value, f64)>) -> Arc<dyn Distribution> {
    Arc::new(Categorical::new(weights))
}

pub fn bernoulli(p: f64) -> Arc<dyn Distribution> {
    Arc::new(Bernoulli::new(p))
}

pub fn point(value: impl Into<Value>) -> Arc<dyn Distribution> {
    Arc::new(PointMass::new(value))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn test_categorical_normalizes() {
        let d = Categorical::new([(Value::Int(0), 1.0), (Value::Int(1), 3.0), (Value::Int(2), 0.0)]);
        assert_eq!(d.outcomes().len(), 2);
        assert!((d.prob(&Value::Int(1)) - 0.75).abs() < 1e-12);
        assert_eq!(d.prob(&Value::Int(2)), 0.0);
        assert_eq!(d.log_prob(&Value::Int(2)), f64::NEG_INFINITY);
    }

    #[test]
    fn test_categorical_sampling_frequencies() {
        let d = Categorical::new([(Value::Bool(true), 0.2), (Value::Bool(false), 0.8)]);
        let mut rng = StdRng::seed_from_u64(7);
        let n = 20_000;
        let hits = (0..n)
            .filter(|_| d.sample(&mut rng) == Value::Bool(true))
            .count();
        let freq = hits as f64 / n as f64;
        assert!((freq - 0.2).abs() < 0.02, "frequency {freq}");
    }

    #[test]
    fn test_bernoulli_and_point() {
        let b = Bernoulli::new(0.3);
        assert!((b.prob(&Value::Bool(false)) - 0.7).abs() < 1e-12);
        assert_eq!(b.prob(&Value::Int(1)), 0.0);

        let p = PointMass::new(true);
        let mut rng = StdRng::seed_from_u64(1);
        assert_eq!(p.sample(&mut rng), Value::Bool(true));
        assert_eq!(p.prob(&Value::Bool(false)), 0.0);
        assert!(b.validate().is_ok());
        assert!(p.validate().is_ok());
    }

    #[test]
    fn test_bad_parameters_fail_validation() {
        let negative = Categorical::new([(Value::Int(1), 2.0), (Value::Int(2), -1.0)]);
        assert!(negative.validate().unwrap_err().contains("-1"));
        assert!(negative.outcomes().is_empty());

        let nan = Categorical::new([(Value::Int(1), f64::NAN)]);
        assert!(nan.validate().is_err());

        let empty = Categorical::new([(Value::Int(1), 0.0)]);
        assert_eq!(
            empty.validate().unwrap_err(),
            "no outcome has positive weight"
        );

        let huge = Categorical::new([(Value::Int(1), f64::MAX), (Value::Int(2), f64::MAX)]);
        assert!(huge.validate().is_err());

        assert!(Bernoulli::new(f64::NAN).validate().is_err());
        assert!(Bernoulli::new(1.5).validate().is_err());
        assert!(Bernoulli::new(-0.1).validate().is_err());
        assert!(Bernoulli::new(1.0).validate().is_ok());
    }
}
