//! Values a random variable can take
//!
//! Values are totally ordered and hashable so they can key histograms and
//! world maps. Reals use the IEEE total order, so `-0.0 != 0.0` and every
//! NaN payload is its own value.

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash, Hasher};

/// Reference to an object of some type, e.g. the third `Aircraft`
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ObjectRef {
    pub ty: String,
    pub index: u32,
}

impl ObjectRef {
    pub fn new(ty: impl Into<String>, index: u32) -> Self {
        Self {
            ty: ty.into(),
            index,
        }
    }
}

impl fmt::Display for ObjectRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}[{}]", self.ty, self.index)
    }
}

/// A value in a possible world
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum Value {
    /// The value of a variable none of whose clauses apply
    Null,
    Bool(bool),
    Int(i64),
    Real(f64),
    Str(String),
    Object(ObjectRef),
    Timestep(u32),
}

impl Value {
    pub fn str(s: impl Into<String>) -> Self {
        Value::Str(s.into())
    }

    pub fn object(ty: impl Into<String>, index: u32) -> Self {
        Value::Object(ObjectRef::new(ty, index))
    }

    pub const fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    pub const fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub const fn as_int(&self) -> Option<i64> {
        match self {
            Value::Int(i) => Some(*i),
            _ => None,
        }
    }

    /// Numeric view of the value; ints and timesteps widen to `f64`
    pub fn as_real(&self) -> Option<f64> {
        match self {
            Value::Real(r) => Some(*r),
            Value::Int(i) => Some(*i as f64),
            Value::Timestep(t) => Some(f64::from(*t)),
            _ => None,
        }
    }

    pub const fn as_timestep(&self) -> Option<u32> {
        match self {
            Value::Timestep(t) => Some(*t),
            _ => None,
        }
    }

    pub fn as_object(&self) -> Option<&ObjectRef> {
        match self {
            Value::Object(o) => Some(o),
            _ => None,
        }
    }

    fn rank(&self) -> u8 {
        match self {
            Value::Null => 0,
            Value::Bool(_) => 1,
            Value::Int(_) => 2,
            Value::Real(_) => 3,
            Value::Str(_) => 4,
            Value::Object(_) => 5,
            Value::Timestep(_) => 6,
        }
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Value {}

impl PartialOrd for Value {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Value {
    fn cmp(&self, other: &Self) -> Ordering {
        match (self, other) {
            (Value::Null, Value::Null) => Ordering::Equal,
            (Value::Bool(a), Value::Bool(b)) => a.cmp(b),
            (Value::Int(a), Value::Int(b)) => a.cmp(b),
            (Value::Real(a), Value::Real(b)) => a.total_cmp(b),
            (Value::Str(a), Value::Str(b)) => a.cmp(b),
            (Value::Object(a), Value::Object(b)) => a.cmp(b),
            (Value::Timestep(a), Value::Timestep(b)) => a.cmp(b),
            _ => self.rank().cmp(&other.rank()),
        }
    }
}

impl Hash for Value {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.rank().hash(state);
        match self {
            Value::Null => {}
            Value::Bool(b) => b.hash(state),
            Value::Int(i) => i.hash(state),
            Value::Real(r) => r.to_bits().hash(state),
            Value::Str(s) => s.hash(state),
            Value::Object(o) => o.hash(state),
            Value::Timestep(t) => t.hash(state),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => write!(f, "null"),
            Value::Bool(b) => write!(f, "{b}"),
            Value::Int(i) => write!(f, "{i}"),
            Value::Real(r) => write!(f, "{r}"),
            Value::Str(s) => write!(f, "{s:?}"),
            Value::Object(o) => write!(f, "{o}"),
            Value::Timestep(t) => write!(f, "@{t}"),
        }
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<i64> for Value {
    fn from(i: i64) -> Self {
        Value::Int(i)
    }
}

impl From<f64> for Value {
    fn from(r: f64) -> Self {
        Value::Real(r)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Str(s.to_string())
    }
}

impl From<ObjectRef> for Value {
    fn from(o: ObjectRef) -> Self {
        Value::Object(o)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_reals_hash_by_bits() {
        let mut set = HashSet::new();
        set.insert(Value::Real(0.5));
        set.insert(Value::Real(0.5));
        set.insert(Value::Real(f64::NAN));
        set.insert(Value::Real(f64::NAN));
        assert_eq!(set.len(), 2);
    }

    #[test]
    fn test_cross_variant_ordering() {
        assert!(Value::Null < Value::Bool(false));
        assert!(Value::Int(100) < Value::Real(-1.0));
        assert!(Value::Timestep(0) > Value::object("Ball", 9));
        assert_ne!(Value::Int(1), Value::Real(1.0));
    }

    #[test]
    fn test_numeric_view() {
        assert_eq!(Value::Int(3).as_real(), Some(3.0));
        assert_eq!(Value::Timestep(2).as_real(), Some(2.0));
        assert_eq!(Value::str("x").as_real(), None);
    }

    #[test]
    fn test_display() {
        assert_eq!(Value::object("Aircraft", 2).to_string(), "Aircraft[2]");
        assert_eq!(Value::Timestep(4).to_string(), "@4");
        assert_eq!(Value::str("a").to_string(), "\"a\"");
    }

    #[test]
    fn test_serde_tagging() {
        let json = serde_json::to_string(&Value::Bool(true)).unwrap();
        assert_eq!(json, r#"{"type":"bool","value":true}"#);
        let back: Value = serde_json::from_str(&json).unwrap();
        assert_eq!(back, Value::Bool(true));
    }
}
