// fastslam_core/src/metrics.rs

//! Injectable instrumentation for the engine. A collector is handed to the
//! engine at construction and lives exactly as long as the engine holds it.

use serde::Serialize;
use std::fmt::Debug;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

/// Event counters the engine reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Counter {
    Steps,
    AssociationTests,
    LandmarksCreated,
    LandmarksUpdated,
    ObservationsDropped,
    SingularInnovations,
    FailedParticles,
    Resamples,
    DegenerateWeights,
}

impl Counter {
    pub const ALL: [Counter; 9] = [
        Counter::Steps,
        Counter::AssociationTests,
        Counter::LandmarksCreated,
        Counter::LandmarksUpdated,
        Counter::ObservationsDropped,
        Counter::SingularInnovations,
        Counter::FailedParticles,
        Counter::Resamples,
        Counter::DegenerateWeights,
    ];

    fn slot(self) -> usize {
        self as usize
    }
}

/// Timed sections of a step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Timer {
    ParticleUpdates,
    Resampling,
    Step,
}

impl Timer {
    pub const ALL: [Timer; 3] = [Timer::ParticleUpdates, Timer::Resampling, Timer::Step];

    fn slot(self) -> usize {
        self as usize
    }
}

/// The contract for anything that wants to observe the engine.
/// Called concurrently from worker threads, so implementations must be `Sync`.
pub trait MetricsCollector: Debug + Send + Sync {
    fn increment(&self, counter: Counter, by: u64);

    fn record_duration(&self, timer: Timer, elapsed: Duration);
}

/// Discards everything. The default collector.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopMetrics;

impl MetricsCollector for NoopMetrics {
    fn increment(&self, _counter: Counter, _by: u64) {}

    fn record_duration(&self, _timer: Timer, _elapsed: Duration) {}
}

/// Lock-free totals kept in memory.
#[derive(Debug, Default)]
pub struct InMemoryMetrics {
    counters: [AtomicU64; Counter::ALL.len()],
    timer_nanos: [AtomicU64; Timer::ALL.len()],
    timer_calls: [AtomicU64; Timer::ALL.len()],
}

impl InMemoryMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn count(&self, counter: Counter) -> u64 {
        self.counters[counter.slot()].load(Ordering::Relaxed)
    }

    pub fn total_time(&self, timer: Timer) -> Duration {
        Duration::from_nanos(self.timer_nanos[timer.slot()].load(Ordering::Relaxed))
    }

    /// Clears every counter and timer.
    pub fn reset(&self) {
        for c in &self.counters {
            c.store(0, Ordering::Relaxed);
        }
        for t in self.timer_nanos.iter().chain(&self.timer_calls) {
            t.store(0, Ordering::Relaxed);
        }
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        let timers = Timer::ALL
            .iter()
            .map(|&timer| {
                let calls = self.timer_calls[timer.slot()].load(Ordering::Relaxed);
                let total = self.total_time(timer);
                TimerSnapshot {
                    name: format!("{timer:?}"),
                    calls,
                    total_ms: total.as_secs_f64() * 1e3,
                    mean_ms: if calls == 0 {
                        0.0
                    } else {
                        total.as_secs_f64() * 1e3 / calls as f64
                    },
                }
            })
            .collect();

        MetricsSnapshot {
            counters: Counter::ALL
                .iter()
                .map(|&c| (format!("{c:?}"), self.count(c)))
                .collect(),
            timers,
        }
    }
}

impl MetricsCollector for InMemoryMetrics {
    fn increment(&self, counter: Counter, by: u64) {
        self.counters[counter.slot()].fetch_add(by, Ordering::Relaxed);
    }

    fn record_duration(&self, timer: Timer, elapsed: Duration) {
        let nanos = u64::try_from(elapsed.as_nanos()).unwrap_or(u64::MAX);
        self.timer_nanos[timer.slot()].fetch_add(nanos, Ordering::Relaxed);
        self.timer_calls[timer.slot()].fetch_add(1, Ordering::Relaxed);
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct TimerSnapshot {
    pub name: String,
    pub calls: u64,
    pub total_ms: f64,
    pub mean_ms: f64,
}

/// A serializable copy of an `InMemoryMetrics` at one instant.
#[derive(Debug, Clone, Serialize)]
pub struct MetricsSnapshot {
    pub counters: Vec<(String, u64)>,
    pub timers: Vec<TimerSnapshot>,
}
