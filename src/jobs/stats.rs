use crate::common::{Error, Result};
use hdrhistogram::Histogram;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

/// Highest trackable job lifetime, one hour.
const MAX_TRACKED_MICROS: u64 = 3_600_000_000;

/// Counters and lifetime distribution of the jobs that passed through a registry.
#[derive(Debug)]
pub struct JobStats {
    created: AtomicU64,
    completed: AtomicU64,
    failed: AtomicU64,
    killed: AtomicU64,
    lifetimes: Mutex<Histogram<u64>>,
}

/// A point-in-time copy of [`JobStats`].
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct JobStatsSnapshot {
    pub created: u64,
    pub completed: u64,
    pub failed: u64,
    pub killed: u64,
    pub p50_micros: u64,
    pub p99_micros: u64,
    pub max_micros: u64,
}

impl JobStatsSnapshot {
    /// Jobs created but not yet removed.
    pub fn active(&self) -> u64 {
        self.created
            .saturating_sub(self.completed + self.failed + self.killed)
    }
}

impl JobStats {
    pub fn new() -> Result<Self> {
        let histogram = Histogram::new_with_bounds(1, MAX_TRACKED_MICROS, 3)
            .map_err(|e| Error::Internal(format!("can't create job histogram: {e}")))?;
        Ok(Self {
            created: AtomicU64::new(0),
            completed: AtomicU64::new(0),
            failed: AtomicU64::new(0),
            killed: AtomicU64::new(0),
            lifetimes: Mutex::new(histogram),
        })
    }

    pub fn record_created(&self) {
        self.created.fetch_add(1, Ordering::Relaxed);
    }

    /// Records the removal of a job that lived for `age`.
    pub fn record_finished(&self, outcome: &Result<()>, age: Duration) {
        let counter = match outcome {
            Ok(()) => &self.completed,
            Err(e) if e.is_cancellation() => &self.killed,
            Err(_) => &self.failed,
        };
        counter.fetch_add(1, Ordering::Relaxed);
        let micros = u64::try_from(age.as_micros()).unwrap_or(u64::MAX);
        self.lifetimes
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .saturating_record(micros);
    }

    pub fn snapshot(&self) -> JobStatsSnapshot {
        let lifetimes = self.lifetimes.lock().unwrap_or_else(PoisonError::into_inner);
        let (p50_micros, p99_micros, max_micros) = match lifetimes.is_empty() {
            true => (0, 0, 0),
            false => (
                lifetimes.value_at_quantile(0.5),
                lifetimes.value_at_quantile(0.99),
                lifetimes.max(),
            ),
        };
        JobStatsSnapshot {
            created: self.created.load(Ordering::Relaxed),
            completed: self.completed.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
            killed: self.killed.load(Ordering::Relaxed),
            p50_micros,
            p99_micros,
            max_micros,
        }
    }
}
