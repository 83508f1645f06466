//! End-to-end tests for the particle filter

use openpf_filter::prelude::*;
use openpf_filter::{
    FilterMetrics, MemorySink, Particle, QueuedRounds, Round, Runner, SamplingPolicy,
};
use proptest::prelude::*;
use std::collections::BTreeSet;
use std::sync::Arc;

fn state(t: u32) -> Variable {
    Variable::temporal("State", vec![], t)
}

fn obs(t: u32) -> Variable {
    Variable::temporal("Obs", vec![], t)
}

fn seen(t: u32) -> Variable {
    Variable::temporal("Seen", vec![], t)
}

fn blip(t: u32) -> Variable {
    Variable::temporal("Blip", vec![], t)
}

/// Two-state chain: prior A 0.6, A switches with 0.1, B switches with 0.3.
/// `noise` is the probability the observation reports the other state.
fn hmm(noise: f64) -> Arc<dyn Model> {
    let model = StaticModel::builder()
        .random(
            "State",
            DependencyModel::from_fn(|ctx, var| match var.previous() {
                None => Ok(categorical([(Value::str("A"), 0.6), (Value::str("B"), 0.4)])),
                Some(prev) => {
                    let p = ctx.value_of(&prev)?;
                    if p == Value::str("A") {
                        Ok(categorical([(Value::str("A"), 0.9), (Value::str("B"), 0.1)]))
                    } else {
                        Ok(categorical([(Value::str("B"), 0.7), (Value::str("A"), 0.3)]))
                    }
                }
            }),
        )
        .random(
            "Obs",
            DependencyModel::from_fn(move |ctx, var| {
                let t = var.timestep().unwrap_or(0);
                let s = ctx.value_of(&state(t))?;
                let other = if s == Value::str("A") { "B" } else { "A" };
                Ok(categorical([(s, 1.0 - noise), (Value::str(other), noise)]))
            }),
        )
        .build();
    Arc::new(model)
}

/// Each timestep an indicator `Seen` decides whether `Blip` is observed
fn radar() -> Arc<dyn Model> {
    let model = StaticModel::builder()
        .observable(
            "Seen",
            |v: &Variable| Variable::new("Blip", v.args.clone()),
            DependencyModel::fixed(bernoulli(0.5)),
        )
        .random(
            "Blip",
            DependencyModel::fixed(categorical([(Value::Int(1), 0.5), (Value::Int(2), 0.5)])),
        )
        .declare_observables(|t| vec![seen(t)])
        .decision("Steer")
        .build();
    Arc::new(model)
}

fn config(n: usize, strategy: StrategyKind) -> FilterConfig {
    FilterConfig {
        num_particles: n,
        strategy,
        seed: Some(2024),
        ..FilterConfig::default()
    }
}

fn trace_evidence(trace: &[&str], t: u32) -> Evidence {
    let value = Value::str(trace[t as usize]);
    Evidence::new()
        .with_observation(state(t), value.clone())
        .with_observation(obs(t), value)
}

#[test]
fn test_noise_free_trace_weight_is_exact_product() {
    let trace = ["A", "A", "B"];
    let mut particle = Particle::new(hmm(0.0), Arc::new(SamplingPolicy::default()), 2, SignatureId(0), 0);
    for t in 0..3 {
        particle.take(&trace_evidence(&trace, t)).unwrap();
        particle.advance_timestep();
    }
    // prior(A) * stay(A) * switch(A)
    let expected = 0.6 * 0.9 * 0.1;
    assert!((particle.weight() - expected).abs() < 1e-12, "weight {}", particle.weight());
}

#[test]
fn test_noise_free_trace_through_engine_rounds() {
    let trace = ["B", "B", "A"];
    let mut pf = ParticleFilter::new(hmm(0.0), config(1, StrategyKind::External)).unwrap();
    let mut product = 1.0;
    for t in 0..3 {
        pf.before_taking_evidence().unwrap();
        pf.take(&trace_evidence(&trace, t)).unwrap();
        pf.answer(&mut [Query::variable(state(t))]).unwrap();
        product *= pf.population().total_weight();
        pf.after_answering_queries().unwrap();
    }
    assert!((product - 0.4 * 0.7 * 0.3).abs() < 1e-12);
}

#[test]
fn test_zero_probability_evidence_fails_at_resample() {
    let mut pf = ParticleFilter::new(hmm(0.0), config(1, StrategyKind::External)).unwrap();
    pf.before_taking_evidence().unwrap();
    pf.take(&Evidence::new().with_observation(obs(0), Value::str("C")))
        .unwrap();
    pf.answer(&mut [Query::variable(state(0))]).unwrap();
    assert_eq!(pf.population().total_weight(), 0.0);

    let err = pf.after_answering_queries().unwrap_err();
    assert!(err.is_degenerate());
}

#[test]
fn test_posterior_tracks_observations() {
    let mut pf = ParticleFilter::new(hmm(0.2), config(2000, StrategyKind::External)).unwrap();
    let mut queries = vec![Query::variable(state(0))];
    pf.before_taking_evidence().unwrap();
    pf.take(&Evidence::new().with_observation(obs(0), Value::str("B")))
        .unwrap();
    pf.answer(&mut queries).unwrap();

    // P(B | obs B) = 0.4 * 0.8 / (0.4 * 0.8 + 0.6 * 0.2) = 0.727...
    let p = queries[0].probability(&Value::str("B"));
    assert!((p - 0.32 / 0.44).abs() < 0.05, "posterior {p}");
}

#[test]
fn test_resampling_frequencies_follow_weights() {
    let hot = Variable::constant("Hot");
    let trials = 40;
    let mut fraction = 0.0;
    for trial in 0..trials {
        let mut pf = ParticleFilter::new(
            hmm(0.0),
            FilterConfig {
                seed: Some(trial),
                ..config(100, StrategyKind::External)
            },
        )
        .unwrap();
        for (i, p) in pf.population_mut().particles_mut().iter_mut().enumerate() {
            let is_hot = i < 20;
            p.world_mut().set_value(hot.clone(), is_hot);
            p.set_weight(if is_hot { 4.0 } else { 1.0 });
        }
        pf.resample().unwrap();
        let hits = pf
            .population()
            .particles()
            .iter()
            .filter(|p| p.world().get_value(&hot) == Some(&Value::Bool(true)))
            .count();
        fraction += hits as f64 / 100.0;
    }
    // 4 * 20 / (4 * 20 + 1 * 80)
    assert!((fraction / trials as f64 - 0.5).abs() < 0.03);
}

#[test]
fn test_resampled_duplicates_are_independent() {
    let mut pf = ParticleFilter::new(radar(), config(2, StrategyKind::External)).unwrap();
    let marker = Variable::constant("Marker");
    {
        let particles = pf.population_mut().particles_mut();
        particles[0].world_mut().set_value(marker.clone(), 1i64);
        particles[1].world_mut().set_value(marker.clone(), 2i64);
        particles[1].set_weight(0.0);
    }
    pf.resample().unwrap();

    let particles = pf.population_mut().particles_mut();
    for p in particles.iter() {
        assert_eq!(p.world().get_value(&marker), Some(&Value::Int(1)));
        assert_eq!(p.weight(), 1.0);
    }

    particles[1].world_mut().set_value(marker.clone(), 3i64);
    assert_eq!(particles[0].world().get_value(&marker), Some(&Value::Int(1)));

    let draws: Vec<Query> = (0..64)
        .map(|i| Query::variable(Variable::new("Blip", vec![Value::Int(i)])))
        .collect();
    let first = particles[0].evaluate(&draws).unwrap();
    let second = particles[1].evaluate(&draws).unwrap();
    assert_ne!(first, second);
}

fn hidden(t: u32) -> Variable {
    Variable::temporal("Hidden", vec![], t)
}

fn reading(t: u32) -> Variable {
    Variable::temporal("Reading", vec![], t)
}

/// A fair hidden coin per timestep, always observed through a noiseless
/// reading
fn sensor() -> Arc<dyn Model> {
    let model = StaticModel::builder()
        .random("Hidden", DependencyModel::fixed(bernoulli(0.5)))
        .random(
            "Reading",
            DependencyModel::from_fn(|ctx, var| {
                let h = ctx.value_of(&Variable::new("Hidden", var.args.clone()))?;
                Ok(point(h))
            }),
        )
        .observable(
            "Seen",
            |v: &Variable| Variable::new("Reading", v.args.clone()),
            DependencyModel::fixed(point(true)),
        )
        .declare_observables(|t| vec![seen(t)])
        .build();
    Arc::new(model)
}

#[test]
fn test_self_sampled_readings_fix_hidden_state() {
    let mut pf = ParticleFilter::new(sensor(), config(40, StrategyKind::SelfSampling)).unwrap();
    for t in 0..4 {
        pf.before_taking_evidence().unwrap();
        pf.take(&Evidence::new()).unwrap();
        pf.answer(&mut [Query::variable(hidden(t))]).unwrap();
        pf.after_answering_queries().unwrap();

        let ids = pf.partition_ids();
        assert_eq!(ids.len(), 1);
        let signature = pf.population().registry().get_by_id(ids[0]).unwrap();
        let sampled = signature.facts().observed[&reading(t)].clone();

        for p in pf.population().particles() {
            assert_eq!(p.world().get_value(&reading(t)), Some(&sampled));
            assert_eq!(p.world().get_value(&hidden(t)), Some(&sampled));
        }
        for earlier in 0..t {
            let values: BTreeSet<Option<Value>> = pf
                .population()
                .particles()
                .iter()
                .map(|p| p.world().get_value(&hidden(earlier)).cloned())
                .collect();
            assert_eq!(values.len(), 1);
        }
    }
}

/// Run one partitioned round and return the filter
fn partitioned_round(n: usize) -> ParticleFilter {
    let mut pf = ParticleFilter::new(radar(), config(n, StrategyKind::Partitioned)).unwrap();
    pf.before_taking_evidence().unwrap();
    pf.take(&Evidence::new()).unwrap();
    pf.answer(&mut [Query::variable(seen(0))]).unwrap();
    pf.after_answering_queries().unwrap();
    pf
}

#[test]
fn test_partition_is_complete_after_repartition() {
    let pf = partitioned_round(60);
    let mut members: Vec<usize> = pf
        .population()
        .partitions()
        .values()
        .flatten()
        .copied()
        .collect();
    members.sort_unstable();
    assert_eq!(members, (0..60).collect::<Vec<_>>());

    // false, (true, 1), (true, 2)
    assert_eq!(pf.partition_stats().buckets, 3);
    for (id, indices) in pf.population().partitions() {
        for &i in indices {
            assert_eq!(pf.population().particles()[i].signature(), *id);
        }
    }
}

#[test]
fn test_identical_classifications_share_signature() {
    let pf = partitioned_round(40);
    let registry = pf.population().registry();
    let particles = pf.population().particles();
    for a in particles {
        for b in particles {
            let fa = registry.get_by_id(a.signature()).unwrap();
            let fb = registry.get_by_id(b.signature()).unwrap();
            assert_eq!(fa.facts() == fb.facts(), a.signature() == b.signature());
        }
    }
}

#[test]
fn test_answer_with_partition_is_bucket_local() {
    let mut pf = partitioned_round(60);
    for id in pf.partition_ids() {
        let facts = pf.population().registry().get_by_id(id).unwrap().facts().clone();
        let mut queries = vec![Query::variable(seen(0))];
        pf.answer_with_partition(&mut queries, id).unwrap();
        let expected = Value::Bool(!facts.observable.is_empty());
        assert_eq!(queries[0].probability(&expected), 1.0);
    }
}

#[test]
fn test_partitioned_take_accepts_only_decisions() {
    let mut pf = partitioned_round(10);
    let id = pf.partition_ids()[0];

    let err = pf
        .take_with_partition(&Evidence::new().with_observation(blip(1), 1i64), id)
        .unwrap_err();
    assert!(err.is_invalid_evidence());
    let err = pf
        .take(&Evidence::new().with_observation(blip(1), 1i64))
        .unwrap_err();
    assert!(err.is_invalid_evidence());

    let steer = Variable::temporal("Steer", vec![], 1);
    pf.take_with_partition(&Evidence::new().with_decision(steer.clone(), true), id)
        .unwrap();
    for &i in &pf.population().partitions()[&id] {
        assert_eq!(
            pf.population().particles()[i].world().get_value(&steer),
            Some(&Value::Bool(true))
        );
    }
}

#[test]
fn test_self_sampling_aligns_population() {
    let mut pf = ParticleFilter::new(radar(), config(30, StrategyKind::SelfSampling)).unwrap();
    for t in 0..2 {
        pf.before_taking_evidence().unwrap();
        pf.take(&Evidence::new()).unwrap();
        pf.answer(&mut [Query::variable(seen(t))]).unwrap();
        pf.after_answering_queries().unwrap();

        assert_eq!(pf.partition_stats().buckets, 1);
        let shown: BTreeSet<Option<Value>> = pf
            .population()
            .particles()
            .iter()
            .map(|p| p.world().get_value(&seen(t)).cloned())
            .collect();
        assert_eq!(shown.len(), 1);
    }
    assert!(pf
        .take(&Evidence::new().with_observation(seen(2), true))
        .unwrap_err()
        .is_invalid_evidence());
}

#[test]
fn test_closed_world_completion() {
    let cfg = FilterConfig {
        closed_world: true,
        ..config(5, StrategyKind::External)
    };
    let mut pf = ParticleFilter::new(radar(), cfg.clone()).unwrap();
    pf.before_taking_evidence().unwrap();
    pf.take(&Evidence::new().with_observation(blip(0), 2i64)).unwrap();
    for p in pf.population().particles() {
        assert_eq!(p.world().get_value(&seen(0)), Some(&Value::Bool(true)));
    }

    let mut pf = ParticleFilter::new(radar(), cfg).unwrap();
    pf.before_taking_evidence().unwrap();
    pf.take(&Evidence::new()).unwrap();
    for p in pf.population().particles() {
        assert_eq!(p.world().get_value(&seen(0)), Some(&Value::Bool(false)));
    }
}

#[test]
fn test_partitioned_runner_reports_per_bucket() {
    let pf = ParticleFilter::new(radar(), config(30, StrategyKind::Partitioned)).unwrap();
    let rounds = (0..3).map(|t| Round::new(Evidence::new(), vec![Query::variable(seen(t))]));
    let sink = Arc::new(MemorySink::new());
    let mut runner = Runner::new(pf, QueuedRounds::new(rounds), sink.clone(), 3);
    let summary = runner.run().unwrap();
    assert_eq!(summary.rounds, 3);

    let reports = sink.reports();
    // Round 0 runs before any repartition, so only the root bucket exists
    let first: Vec<_> = reports.iter().filter(|r| r.timestep == 0).collect();
    assert_eq!(first.len(), 1);
    assert_eq!(first[0].partition, Some(SignatureId(0)));

    let later: Vec<_> = reports.iter().filter(|r| r.timestep == 2).collect();
    assert!(later.len() > 1);
    let total: f64 = later.iter().map(|r| r.histogram.total_weight()).sum();
    assert!((total - 30.0).abs() < 1e-9);
}

#[test]
fn test_signature_pruning() {
    let registry = Arc::new(SignatureRegistry::new());
    let mut pf = ParticleFilter::builder(radar())
        .config(FilterConfig {
            prune_signatures: true,
            signature_window: 1,
            drop_history: true,
            ..config(20, StrategyKind::Partitioned)
        })
        .registry(Arc::clone(&registry))
        .metrics(Arc::new(FilterMetrics::new()))
        .build()
        .unwrap();
    for t in 0..5 {
        pf.before_taking_evidence().unwrap();
        pf.take(&Evidence::new()).unwrap();
        pf.answer(&mut [Query::variable(seen(t))]).unwrap();
        pf.after_answering_queries().unwrap();
    }
    // Every live particle still resolves its signature
    for p in pf.population().particles() {
        assert!(registry.get_by_id(p.signature()).is_ok());
        assert!(!p.world().is_instantiated(&seen(0)));
    }
    // Only the root and the last two rounds' signatures survive
    assert!(registry.len() <= 1 + 2 * 3);
    assert_eq!(pf.metrics().calls(openpf_filter::Phase::Repartition), 5);
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    #[test]
    fn prop_possible_evidence_keeps_positive_weight(
        trace in prop::collection::vec(any::<bool>(), 1..5),
    ) {
        let mut pf = ParticleFilter::new(hmm(0.2), config(20, StrategyKind::External)).unwrap();
        for (t, &is_a) in trace.iter().enumerate() {
            let value = Value::str(if is_a { "A" } else { "B" });
            pf.before_taking_evidence().unwrap();
            pf.take(&Evidence::new().with_observation(obs(t as u32), value)).unwrap();
            prop_assert!(pf.population().total_weight() > 0.0);
            pf.answer(&mut [Query::variable(state(t as u32))]).unwrap();
            pf.after_answering_queries().unwrap();
        }
    }

    #[test]
    fn prop_resample_preserves_size(n in 1usize..60, seed in any::<u64>()) {
        let mut pf = ParticleFilter::new(
            hmm(0.2),
            FilterConfig { seed: Some(seed), ..config(n, StrategyKind::External) },
        ).unwrap();
        pf.take(&Evidence::new().with_observation(obs(0), Value::str("A"))).unwrap();
        pf.resample().unwrap();
        prop_assert_eq!(pf.population().len(), n);
        prop_assert!(pf.population().particles().iter().all(|p| p.weight() == 1.0));
    }

    #[test]
    fn prop_advance_then_retract_is_noop(steps in 0u32..10, seed in any::<u64>()) {
        let mut particle = Particle::new(hmm(0.2), Arc::new(SamplingPolicy::default()), 2, SignatureId(0), seed);
        particle.take(&Evidence::new().with_observation(obs(1), Value::str("A"))).unwrap();
        let before = particle.world().instantiated_vars();
        let timestep = particle.timestep();
        for _ in 0..steps {
            particle.advance_timestep();
        }
        for _ in 0..steps {
            particle.retract_timestep();
        }
        prop_assert_eq!(particle.timestep(), timestep);
        prop_assert_eq!(particle.world().instantiated_vars(), before);
    }
}
