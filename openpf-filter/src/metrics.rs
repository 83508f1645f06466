//! Filter metrics
//!
//! Call counts and cumulative time per population phase, plus a few
//! counters for resampling behavior.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Population phases that are timed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Phase {
    Take,
    Answer,
    Resample,
    Repartition,
    Retake,
    TakeWithPartition,
}

impl Phase {
    pub const ALL: [Phase; 6] = [
        Phase::Take,
        Phase::Answer,
        Phase::Resample,
        Phase::Repartition,
        Phase::Retake,
        Phase::TakeWithPartition,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Phase::Take => "take",
            Phase::Answer => "answer",
            Phase::Resample => "resample",
            Phase::Repartition => "repartition",
            Phase::Retake => "retake",
            Phase::TakeWithPartition => "take_with_partition",
        }
    }

    fn index(self) -> usize {
        self as usize
    }
}

#[derive(Debug, Default)]
struct PhaseCounters {
    calls: AtomicU64,
    total_time_ns: AtomicU64,
}

/// Counters shared by a filter and its population
#[derive(Debug, Default)]
pub struct FilterMetrics {
    phases: [PhaseCounters; 6],
    /// Particles deep-copied because they were selected more than once
    copies: AtomicU64,
    /// Resampling attempts that found no positive weight
    degenerate: AtomicU64,
}

impl FilterMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&self, phase: Phase, duration: Duration) {
        let counters = &self.phases[phase.index()];
        counters.calls.fetch_add(1, Ordering::Relaxed);
        counters
            .total_time_ns
            .fetch_add(duration.as_nanos() as u64, Ordering::Relaxed);
    }

    /// Start timing `phase`; the time is recorded when the guard drops
    pub fn time(self: &Arc<Self>, phase: Phase) -> PhaseTimer {
        PhaseTimer {
            metrics: Arc::clone(self),
            phase,
            start: Instant::now(),
        }
    }

    pub fn record_copies(&self, n: u64) {
        self.copies.fetch_add(n, Ordering::Relaxed);
    }

    pub fn record_degenerate(&self) {
        self.degenerate.fetch_add(1, Ordering::Relaxed);
    }

    pub fn calls(&self, phase: Phase) -> u64 {
        self.phases[phase.index()].calls.load(Ordering::Relaxed)
    }

    pub fn reset(&self) {
        for counters in &self.phases {
            counters.calls.store(0, Ordering::Relaxed);
            counters.total_time_ns.store(0, Ordering::Relaxed);
        }
        self.copies.store(0, Ordering::Relaxed);
        self.degenerate.store(0, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            phases: Phase::ALL
                .iter()
                .map(|&phase| {
                    let counters = &self.phases[phase.index()];
                    PhaseSnapshot {
                        phase,
                        calls: counters.calls.load(Ordering::Relaxed),
                        total_time_ns: counters.total_time_ns.load(Ordering::Relaxed),
                    }
                })
                .collect(),
            copies: self.copies.load(Ordering::Relaxed),
            degenerate: self.degenerate.load(Ordering::Relaxed),
        }
    }
}

/// Records elapsed time for a phase on drop
pub struct PhaseTimer {
    metrics: Arc<FilterMetrics>,
    phase: Phase,
    start: Instant,
}

impl Drop for PhaseTimer {
    fn drop(&mut self) {
        self.metrics.record(self.phase, self.start.elapsed());
    }
}

#[derive(Debug, Clone)]
pub struct PhaseSnapshot {
    pub phase: Phase,
    pub calls: u64,
    pub total_time_ns: u64,
}

impl PhaseSnapshot {
    pub fn avg_time(&self) -> Duration {
        if self.calls == 0 {
            Duration::ZERO
        } else {
            Duration::from_nanos(self.total_time_ns / self.calls)
        }
    }
}

/// A point-in-time copy of [`FilterMetrics`]
#[derive(Debug, Clone)]
pub struct MetricsSnapshot {
    pub phases: Vec<PhaseSnapshot>,
    pub copies: u64,
    pub degenerate: u64,
}

impl MetricsSnapshot {
    pub fn phase(&self, phase: Phase) -> Option<&PhaseSnapshot> {
        self.phases.iter().find(|p| p.phase == phase)
    }
}

impl fmt::Display for MetricsSnapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for p in self.phases.iter().filter(|p| p.calls > 0) {
            writeln!(
                f,
                "{}: {} calls | Avg: {:.2}ms | Total: {:.2}ms",
                p.phase.name(),
                p.calls,
                p.avg_time().as_secs_f64() * 1000.0,
                Duration::from_nanos(p.total_time_ns).as_secs_f64() * 1000.0
            )?;
        }
        writeln!(f, "copies: {} | degenerate: {}", self.copies, self.degenerate)
    }
}
