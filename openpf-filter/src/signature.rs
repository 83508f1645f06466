//! Observability signatures
//!
//! A signature records what a particle would have observed in one timestep:
//! the values of referenced variables whose indicators came out true, and the
//! indicators that came out false. Particles with the same observation
//! history share a signature, which lets the partitioned filter answer
//! queries per history bucket.
//!
//! Signatures are interned in a [`SignatureRegistry`] keyed by a blake3
//! digest of `(parent, timestep, facts)`, so equal classifications always
//! map to the same [`SignatureId`].

use crate::error::{FilterError, FilterResult};
use crate::particle::Particle;
use blake3::Hasher;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use once_cell::sync::OnceCell;
use openpf_types::{Evidence, Value, Variable};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Interned signature identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SignatureId(pub u64);

impl fmt::Display for SignatureId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Observation facts learned in one timestep
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ObservationFacts {
    /// Referenced variable -> observed value
    pub observed: BTreeMap<Variable, Value>,
    /// Indicators known to be true
    pub observable: BTreeSet<Variable>,
    /// Indicators known to be false
    pub unobservable: BTreeSet<Variable>,
}

impl ObservationFacts {
    pub fn is_empty(&self) -> bool {
        self.observed.is_empty() && self.observable.is_empty() && self.unobservable.is_empty()
    }

    /// Every variable these facts mention
    pub fn variables(&self) -> impl Iterator<Item = &Variable> {
        self.observed
            .keys()
            .chain(self.observable.iter())
            .chain(self.unobservable.iter())
    }

    /// Closed-world evidence: observed values, true for observable
    /// indicators, false for the rest
    pub fn to_evidence(&self) -> Evidence {
        let mut evidence = Evidence::new();
        for (var, value) in &self.observed {
            evidence.observe(var.clone(), value.clone());
        }
        for var in &self.observable {
            evidence.observe(var.clone(), true);
        }
        for var in &self.unobservable {
            evidence.observe(var.clone(), false);
        }
        evidence
    }
}

/// An interned, immutable observability signature
#[derive(Debug)]
pub struct ObservabilitySignature {
    id: SignatureId,
    parent: Option<SignatureId>,
    timestep: Option<u32>,
    facts: ObservationFacts,
    evidence: OnceCell<Evidence>,
}

impl ObservabilitySignature {
    pub fn id(&self) -> SignatureId {
        self.id
    }

    pub fn parent(&self) -> Option<SignatureId> {
        self.parent
    }

    /// Timestep the facts belong to; `None` for the root
    pub fn timestep(&self) -> Option<u32> {
        self.timestep
    }

    pub fn facts(&self) -> &ObservationFacts {
        &self.facts
    }

    pub fn is_root(&self) -> bool {
        self.parent.is_none()
    }

    /// Materialized evidence, built on first use
    pub fn evidence(&self) -> &Evidence {
        self.evidence.get_or_init(|| self.facts.to_evidence())
    }
}

impl fmt::Display for ObservabilitySignature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.id)?;
        if let Some(parent) = self.parent {
            write!(f, " <- {parent}")?;
        }
        if let Some(t) = self.timestep {
            write!(f, " @{t}")?;
        }
        if !self.facts.is_empty() {
            write!(f, " {{{}}}", self.evidence())?;
        }
        Ok(())
    }
}

fn content_key(parent: Option<SignatureId>, timestep: Option<u32>, facts: &ObservationFacts) -> [u8; 32] {
    let mut hasher = Hasher::new();
    hasher.update(&parent.map_or(u64::MAX, |p| p.0).to_le_bytes());
    hasher.update(&timestep.map_or(u64::MAX, u64::from).to_le_bytes());
    hasher.update(&(facts.observed.len() as u64).to_le_bytes());
    for (var, value) in &facts.observed {
        encode_variable(&mut hasher, var);
        encode_value(&mut hasher, value);
    }
    hasher.update(&(facts.observable.len() as u64).to_le_bytes());
    for var in &facts.observable {
        encode_variable(&mut hasher, var);
    }
    hasher.update(&(facts.unobservable.len() as u64).to_le_bytes());
    for var in &facts.unobservable {
        encode_variable(&mut hasher, var);
    }
    *hasher.finalize().as_bytes()
}

fn encode_str(hasher: &mut Hasher, text: &str) {
    hasher.update(&(text.len() as u64).to_le_bytes());
    hasher.update(text.as_bytes());
}

fn encode_variable(hasher: &mut Hasher, var: &Variable) {
    encode_str(hasher, var.generator.as_str());
    hasher.update(&(var.args.len() as u64).to_le_bytes());
    for arg in &var.args {
        encode_value(hasher, arg);
    }
}

/// One tag byte, then a fixed-width or length-prefixed payload. Reals are
/// hashed by bit pattern, matching `Value`'s equality.
fn encode_value(hasher: &mut Hasher, value: &Value) {
    match value {
        Value::Null => {
            hasher.update(&[0]);
        }
        Value::Bool(b) => {
            hasher.update(&[1, u8::from(*b)]);
        }
        Value::Int(i) => {
            hasher.update(&[2]);
            hasher.update(&i.to_le_bytes());
        }
        Value::Real(r) => {
            hasher.update(&[3]);
            hasher.update(&r.to_bits().to_le_bytes());
        }
        Value::Str(text) => {
            hasher.update(&[4]);
            encode_str(hasher, text);
        }
        Value::Object(object) => {
            hasher.update(&[5]);
            encode_str(hasher, &object.ty);
            hasher.update(&object.index.to_le_bytes());
        }
        Value::Timestep(t) => {
            hasher.update(&[6]);
            hasher.update(&t.to_le_bytes());
        }
    }
}

/// Shared intern table for observability signatures
#[derive(Debug)]
pub struct SignatureRegistry {
    by_content: DashMap<[u8; 32], SignatureId>,
    by_id: DashMap<SignatureId, Arc<ObservabilitySignature>>,
    next_id: AtomicU64,
    root: SignatureId,
}

impl SignatureRegistry {
    pub fn new() -> Self {
        let registry = Self {
            by_content: DashMap::new(),
            by_id: DashMap::new(),
            next_id: AtomicU64::new(0),
            root: SignatureId(0),
        };
        let root = registry.intern(None, None, ObservationFacts::default());
        debug_assert_eq!(root, registry.root);
        registry
    }

    /// The empty signature every population starts from
    pub fn root(&self) -> SignatureId {
        self.root
    }

    fn intern(
        &self,
        parent: Option<SignatureId>,
        timestep: Option<u32>,
        facts: ObservationFacts,
    ) -> SignatureId {
        let key = content_key(parent, timestep, &facts);
        if let Some(id) = self.by_content.get(&key) {
            return *id;
        }
        match self.by_content.entry(key) {
            Entry::Occupied(entry) => *entry.get(),
            Entry::Vacant(entry) => {
                let id = SignatureId(self.next_id.fetch_add(1, Ordering::Relaxed));
                self.by_id.insert(
                    id,
                    Arc::new(ObservabilitySignature {
                        id,
                        parent,
                        timestep,
                        facts,
                        evidence: OnceCell::new(),
                    }),
                );
                entry.insert(id);
                tracing::trace!(signature = %id, "interned observability signature");
                id
            }
        }
    }

    /// Successor of `signature` given what `particle` observed in the round
    /// it just finished
    pub fn spawn_child(
        &self,
        signature: SignatureId,
        particle: &mut Particle,
    ) -> FilterResult<SignatureId> {
        if !self.by_id.contains_key(&signature) {
            return Err(FilterError::UnknownSignature(signature));
        }
        let round = particle.timestep().saturating_sub(1);
        let facts = particle.classify_observability(round)?;
        Ok(self.intern(Some(signature), Some(particle.timestep()), facts))
    }

    /// Classify `particle` and move it to the resulting signature
    pub fn update(&self, particle: &mut Particle) -> FilterResult<SignatureId> {
        let id = self.spawn_child(particle.signature(), particle)?;
        particle.set_signature(id);
        Ok(id)
    }

    pub fn get_by_id(&self, id: SignatureId) -> FilterResult<Arc<ObservabilitySignature>> {
        self.by_id
            .get(&id)
            .map(|entry| Arc::clone(entry.value()))
            .ok_or(FilterError::UnknownSignature(id))
    }

    /// Id under which an equal signature is interned
    pub fn get_id(&self, signature: &ObservabilitySignature) -> Option<SignatureId> {
        let key = content_key(signature.parent, signature.timestep, &signature.facts);
        self.by_content.get(&key).map(|id| *id)
    }

    pub fn materialize_evidence(&self, id: SignatureId) -> FilterResult<Evidence> {
        Ok(self.get_by_id(id)?.evidence().clone())
    }

    /// Forget signatures older than `window` timesteps; the root is kept.
    /// Returns how many were removed.
    pub fn drop_history(&self, current_timestep: u32, window: u32) -> usize {
        let Some(horizon) = current_timestep.checked_sub(window) else {
            return 0;
        };
        let stale: Vec<Arc<ObservabilitySignature>> = self
            .by_id
            .iter()
            .filter(|entry| {
                let sig = entry.value();
                !sig.is_root() && sig.timestep.is_some_and(|t| t < horizon)
            })
            .map(|entry| Arc::clone(entry.value()))
            .collect();

        for sig in &stale {
            self.by_id.remove(&sig.id);
            self.by_content
                .remove(&content_key(sig.parent, sig.timestep, &sig.facts));
        }
        if !stale.is_empty() {
            tracing::debug!(
                removed = stale.len(),
                remaining = self.by_id.len(),
                horizon,
                "pruned observability signatures"
            );
        }
        stale.len()
    }

    pub fn len(&self) -> usize {
        self.by_id.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_id.is_empty()
    }
}

impl Default for SignatureRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn facts(value: i64) -> ObservationFacts {
        let mut facts = ObservationFacts::default();
        facts
            .observed
            .insert(Variable::temporal("Blip", vec![], 1), Value::Int(value));
        facts
            .observable
            .insert(Variable::temporal("BlipSeen", vec![], 1));
        facts
    }

    #[test]
    fn test_real_payloads_intern_apart() {
        let registry = SignatureRegistry::new();
        let real = |r: f64| {
            let mut facts = ObservationFacts::default();
            facts
                .observed
                .insert(Variable::temporal("Range", vec![], 1), Value::Real(r));
            registry.intern(Some(registry.root()), Some(1), facts)
        };
        let quiet = real(f64::NAN);
        let payload = real(f64::from_bits(0x7ff8_0000_0000_0001));
        assert_ne!(quiet, payload);
        assert_eq!(quiet, real(f64::NAN));
        assert_ne!(real(0.0), real(-0.0));

        let mut int = ObservationFacts::default();
        int.observed
            .insert(Variable::temporal("Range", vec![], 1), Value::Int(1));
        let mut text = ObservationFacts::default();
        text.observed
            .insert(Variable::temporal("Range", vec![], 1), Value::str("1"));
        assert_ne!(
            registry.intern(Some(registry.root()), Some(1), int),
            registry.intern(Some(registry.root()), Some(1), text)
        );
    }

    #[test]
    fn test_root_is_empty() {
        let registry = SignatureRegistry::new();
        let root = registry.get_by_id(registry.root()).unwrap();
        assert!(root.is_root());
        assert!(root.evidence().is_empty());
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_equal_facts_intern_once() {
        let registry = SignatureRegistry::new();
        let a = registry.intern(Some(registry.root()), Some(1), facts(3));
        let b = registry.intern(Some(registry.root()), Some(1), facts(3));
        let c = registry.intern(Some(registry.root()), Some(1), facts(4));
        assert_eq!(a, b);
        assert_ne!(a, c);

        let sig = registry.get_by_id(a).unwrap();
        assert_eq!(registry.get_id(&sig), Some(a));
        // Same facts under another parent are a different history
        let d = registry.intern(Some(c), Some(1), facts(3));
        assert_ne!(a, d);
    }

    #[test]
    fn test_materialized_evidence() {
        let registry = SignatureRegistry::new();
        let mut f = facts(3);
        f.unobservable
            .insert(Variable::temporal("BlipSeen", vec![Value::Int(2)], 1));
        let id = registry.intern(Some(registry.root()), Some(1), f);
        let evidence = registry.materialize_evidence(id).unwrap();
        insta::assert_snapshot!(
            evidence.to_string(),
            @"obs Blip(@1) = 3; obs BlipSeen(@1) = true; obs BlipSeen(2, @1) = false;"
        );
    }

    #[test]
    fn test_drop_history_keeps_root_and_recent() {
        let registry = SignatureRegistry::new();
        let old = registry.intern(Some(registry.root()), Some(1), facts(1));
        let recent = registry.intern(Some(old), Some(4), facts(1));

        assert_eq!(registry.drop_history(1, 2), 0);
        assert_eq!(registry.drop_history(5, 2), 1);
        assert!(registry.get_by_id(old).is_err());
        assert!(registry.get_by_id(recent).is_ok());
        assert!(registry.get_by_id(registry.root()).is_ok());
    }

    #[test]
    fn test_unknown_signature() {
        let registry = SignatureRegistry::new();
        let err = registry.get_by_id(SignatureId(42)).unwrap_err();
        assert!(matches!(err, FilterError::UnknownSignature(SignatureId(42))));
    }
}
