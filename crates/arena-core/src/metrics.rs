//! Global atomic counters for arena observability.
//!
//! Counters are incremented silently at the call site. Call
//! [`Metrics::flush`] to emit current values as a single
//! `tracing::info!` event (e.g. when a tournament is finalized).

use std::sync::atomic::{AtomicU64, Ordering};

/// Global metrics singleton.
pub static METRICS: Metrics = Metrics::new();

/// Lightweight atomic counters, no allocations, no locking.
pub struct Metrics {
    steps_emitted: AtomicU64,
    progress_dropped: AtomicU64,
    store_write_failures: AtomicU64,
    validations_run: AtomicU64,
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

impl Metrics {
    pub const fn new() -> Self {
        Self {
            steps_emitted: AtomicU64::new(0),
            progress_dropped: AtomicU64::new(0),
            store_write_failures: AtomicU64::new(0),
            validations_run: AtomicU64::new(0),
        }
    }

    /// Increment the steps-emitted counter by one.
    pub fn inc_steps_emitted(&self) {
        self.steps_emitted.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(metric = "steps_emitted", "counter incremented");
    }

    /// Increment the progress-dropped counter by one.
    pub fn inc_progress_dropped(&self) {
        self.progress_dropped.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(metric = "progress_dropped", "counter incremented");
    }

    /// Increment the store-write-failures counter by one.
    pub fn inc_store_write_failures(&self) {
        self.store_write_failures.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(metric = "store_write_failures", "counter incremented");
    }

    /// Increment the validations-run counter by one.
    pub fn inc_validations(&self) {
        self.validations_run.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(metric = "validations_run", "counter incremented");
    }

    /// Emit all current counter values as a single `info!` event.
    pub fn flush(&self) {
        tracing::info!(
            metric = "flush",
            steps_emitted = self.steps_emitted(),
            progress_dropped = self.progress_dropped(),
            store_write_failures = self.store_write_failures(),
            validations_run = self.validations_run(),
        );
    }

    pub fn steps_emitted(&self) -> u64 {
        self.steps_emitted.load(Ordering::Relaxed)
    }

    pub fn progress_dropped(&self) -> u64 {
        self.progress_dropped.load(Ordering::Relaxed)
    }

    pub fn store_write_failures(&self) -> u64 {
        self.store_write_failures.load(Ordering::Relaxed)
    }

    pub fn validations_run(&self) -> u64 {
        self.validations_run.load(Ordering::Relaxed)
    }

    /// Reset all counters to zero (useful in tests).
    pub fn reset(&self) {
        self.steps_emitted.store(0, Ordering::Relaxed);
        self.progress_dropped.store(0, Ordering::Relaxed);
        self.store_write_failures.store(0, Ordering::Relaxed);
        self.validations_run.store(0, Ordering::Relaxed);
    }
}
