//! Shared health state for the /health endpoint. Updated by the tracker and
//! leaderboard scheduler loops, read by the API.

use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};

#[derive(Default)]
pub struct HealthState {
    /// Unix seconds of the last completed tracker cycle (0 = none yet).
    pub last_tracker_cycle_at: AtomicI64,
    pub tracker_cycles_total: AtomicU64,
    pub tracker_errors_total: AtomicU64,
    /// Unix seconds of the last leaderboard build attempt (0 = none yet).
    pub last_leaderboard_run_at: AtomicI64,
}

impl HealthState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_tracker_cycle(&self, at: i64, errors: usize) {
        self.last_tracker_cycle_at.store(at, Ordering::Relaxed);
        self.tracker_cycles_total.fetch_add(1, Ordering::Relaxed);
        self.tracker_errors_total.fetch_add(errors as u64, Ordering::Relaxed);
    }

    pub fn record_leaderboard_run(&self, at: i64) {
        self.last_leaderboard_run_at.store(at, Ordering::Relaxed);
    }

    pub fn last_tracker_cycle_at(&self) -> i64 {
        self.last_tracker_cycle_at.load(Ordering::Relaxed)
    }

    pub fn tracker_cycles_total(&self) -> u64 {
        self.tracker_cycles_total.load(Ordering::Relaxed)
    }

    pub fn tracker_errors_total(&self) -> u64 {
        self.tracker_errors_total.load(Ordering::Relaxed)
    }

    pub fn last_leaderboard_run_at(&self) -> i64 {
        self.last_leaderboard_run_at.load(Ordering::Relaxed)
    }
}
