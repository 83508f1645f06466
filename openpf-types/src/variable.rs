//! Basic random variables
//!
//! A variable is identified by the generator that produces it (a random
//! function or a number statement) and the tuple of arguments it is applied
//! to. Temporal variables carry their timestep as the last argument.

use crate::value::Value;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Generator identifier (random function, number statement, decision function)
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct GeneratorId(pub String);

impl GeneratorId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for GeneratorId {
    fn from(id: &str) -> Self {
        GeneratorId(id.to_string())
    }
}

impl fmt::Display for GeneratorId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A basic random variable: `generator(args...)`
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Variable {
    pub generator: GeneratorId,
    pub args: Vec<Value>,
}

impl Variable {
    pub fn new(generator: impl Into<GeneratorId>, args: Vec<Value>) -> Self {
        Self {
            generator: generator.into(),
            args,
        }
    }

    /// A variable with no arguments, e.g. a number statement `#Ball`
    pub fn constant(generator: impl Into<GeneratorId>) -> Self {
        Self::new(generator, Vec::new())
    }

    /// A temporal variable; `timestep` becomes the last argument
    pub fn temporal(generator: impl Into<GeneratorId>, mut args: Vec<Value>, timestep: u32) -> Self {
        args.push(Value::Timestep(timestep));
        Self::new(generator, args)
    }

    /// Timestep of a temporal variable
    pub fn timestep(&self) -> Option<u32> {
        self.args.last().and_then(Value::as_timestep)
    }

    pub fn is_temporal(&self) -> bool {
        self.timestep().is_some()
    }

    /// Same generator and leading arguments at another timestep.
    ///
    /// Returns `None` for atemporal variables.
    pub fn at_timestep(&self, timestep: u32) -> Option<Variable> {
        self.timestep()?;
        let mut args = self.args.clone();
        if let Some(last) = args.last_mut() {
            *last = Value::Timestep(timestep);
        }
        Some(Variable {
            generator: self.generator.clone(),
            args,
        })
    }

    /// The variable one step back in time, if there is one
    pub fn previous(&self) -> Option<Variable> {
        let t = self.timestep()?;
        t.checked_sub(1).and_then(|p| self.at_timestep(p))
    }
}

impl fmt::Display for Variable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.args.is_empty() {
            return write!(f, "{}", self.generator);
        }
        write!(f, "{}(", self.generator)?;
        for (i, arg) in self.args.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{arg}")?;
        }
        write!(f, ")")
    }
}
