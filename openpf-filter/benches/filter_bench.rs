//! Benchmarks for filtering rounds

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use openpf_filter::prelude::*;
use openpf_filter::resample;
use rand::rngs::StdRng;
use rand::SeedableRng;
use std::sync::Arc;

/// Noisy two-state chain with an observability indicator per step
fn chain_model() -> Arc<dyn Model> {
    let model = StaticModel::builder()
        .random(
            "State",
            DependencyModel::from_fn(|ctx, var| match var.previous() {
                None => Ok(bernoulli(0.5)),
                Some(prev) => {
                    let p = ctx.value_of(&prev)?;
                    Ok(bernoulli(if p == Value::Bool(true) { 0.9 } else { 0.2 }))
                }
            }),
        )
        .random(
            "Reading",
            DependencyModel::from_fn(|ctx, var| {
                let t = var.timestep().unwrap_or(0);
                let s = ctx.value_of(&Variable::temporal("State", vec![], t))?;
                Ok(bernoulli(if s == Value::Bool(true) { 0.8 } else { 0.1 }))
            }),
        )
        .observable(
            "Seen",
            |v: &Variable| Variable::new("Reading", v.args.clone()),
            DependencyModel::fixed(bernoulli(0.7)),
        )
        .declare_observables(|t| vec![Variable::temporal("Seen", vec![], t)])
        .build();
    Arc::new(model)
}

fn run_rounds(pf: &mut ParticleFilter, rounds: u32, observe: bool) {
    for t in 0..rounds {
        let evidence = if observe {
            Evidence::new().with_observation(Variable::temporal("Reading", vec![], t), t % 3 == 0)
        } else {
            Evidence::new()
        };
        let mut queries = vec![Query::variable(Variable::temporal("State", vec![], t))];
        pf.before_taking_evidence().unwrap();
        pf.take(&evidence).unwrap();
        if pf.strategy_kind() == StrategyKind::Partitioned {
            for id in pf.partition_ids() {
                pf.answer_with_partition(&mut queries, id).unwrap();
            }
        } else {
            pf.answer(&mut queries).unwrap();
        }
        pf.after_answering_queries().unwrap();
        black_box(&queries);
    }
}

fn config(n: usize, strategy: StrategyKind) -> FilterConfig {
    FilterConfig {
        num_particles: n,
        strategy,
        seed: Some(11),
        drop_history: true,
        ..FilterConfig::default()
    }
}

fn bench_external_rounds(c: &mut Criterion) {
    let mut group = c.benchmark_group("external_rounds");

    for n in [100, 1000].iter() {
        group.bench_with_input(BenchmarkId::from_parameter(n), n, |b, &n| {
            b.iter(|| {
                let mut pf = ParticleFilter::new(chain_model(), config(n, StrategyKind::External)).unwrap();
                run_rounds(&mut pf, 10, true);
            })
        });
    }

    group.finish();
}

fn bench_strategies(c: &mut Criterion) {
    c.bench_function("self_sampling_rounds", |b| {
        b.iter(|| {
            let mut pf = ParticleFilter::new(chain_model(), config(200, StrategyKind::SelfSampling)).unwrap();
            run_rounds(&mut pf, 10, false);
        })
    });

    c.bench_function("partitioned_rounds", |b| {
        b.iter(|| {
            let mut pf = ParticleFilter::new(chain_model(), config(200, StrategyKind::Partitioned)).unwrap();
            run_rounds(&mut pf, 10, false);
        })
    });
}

fn bench_resampling(c: &mut Criterion) {
    let weights: Vec<f64> = (0..1000).map(|i| 1.0 + (i % 17) as f64).collect();
    let mut rng = StdRng::seed_from_u64(3);

    c.bench_function("draw_indices_multinomial", |b| {
        b.iter(|| {
            let indices =
                resample::draw_indices(black_box(&weights), 1000, ResamplingScheme::Multinomial, &mut rng);
            black_box(indices)
        })
    });

    c.bench_function("draw_indices_systematic", |b| {
        b.iter(|| {
            let indices =
                resample::draw_indices(black_box(&weights), 1000, ResamplingScheme::Systematic, &mut rng);
            black_box(indices)
        })
    });
}

criterion_group!(benches, bench_external_rounds, bench_strategies, bench_resampling);
criterion_main!(benches);
