//! Global atomic counters for vmig observability.
//!
//! Counters are incremented silently at the call site. Call
//! [`Metrics::flush`] to emit current values as a single
//! `tracing::info!` event (e.g. at the end of a run).

use std::sync::atomic::{AtomicU64, Ordering};

/// Global metrics singleton.
pub static METRICS: Metrics = Metrics::new();

/// Lightweight atomic counters, no allocations and no locking.
pub struct Metrics {
    invocations: AtomicU64,
    invocation_failures: AtomicU64,
    items_migrated: AtomicU64,
    items_failed: AtomicU64,
    items_skipped: AtomicU64,
    runs_completed: AtomicU64,
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

impl Metrics {
    pub const fn new() -> Self {
        Self {
            invocations: AtomicU64::new(0),
            invocation_failures: AtomicU64::new(0),
            items_migrated: AtomicU64::new(0),
            items_failed: AtomicU64::new(0),
            items_skipped: AtomicU64::new(0),
            runs_completed: AtomicU64::new(0),
        }
    }

    /// One operation invocation started.
    pub fn inc_invocations(&self) {
        self.invocations.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(metric = "invocations", "counter incremented");
    }

    /// One invocation failed at the transport level.
    pub fn inc_invocation_failures(&self) {
        self.invocation_failures.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(metric = "invocation_failures", "counter incremented");
    }

    pub fn inc_items_migrated(&self) {
        self.items_migrated.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(metric = "items_migrated", "counter incremented");
    }

    pub fn inc_items_failed(&self) {
        self.items_failed.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(metric = "items_failed", "counter incremented");
    }

    pub fn inc_items_skipped(&self) {
        self.items_skipped.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(metric = "items_skipped", "counter incremented");
    }

    pub fn inc_runs_completed(&self) {
        self.runs_completed.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(metric = "runs_completed", "counter incremented");
    }

    /// Emit all current counter values as a single `info!` event.
    ///
    /// Call this at natural boundaries (end of a run, end of a CLI command)
    /// rather than on every increment.
    pub fn flush(&self) {
        tracing::info!(
            metric = "flush",
            invocations = self.invocations(),
            invocation_failures = self.invocation_failures(),
            items_migrated = self.items_migrated(),
            items_failed = self.items_failed(),
            items_skipped = self.items_skipped(),
            runs_completed = self.runs_completed(),
        );
    }

    pub fn invocations(&self) -> u64 {
        self.invocations.load(Ordering::Relaxed)
    }

    pub fn invocation_failures(&self) -> u64 {
        self.invocation_failures.load(Ordering::Relaxed)
    }

    pub fn items_migrated(&self) -> u64 {
        self.items_migrated.load(Ordering::Relaxed)
    }

    pub fn items_failed(&self) -> u64 {
        self.items_failed.load(Ordering::Relaxed)
    }

    pub fn items_skipped(&self) -> u64 {
        self.items_skipped.load(Ordering::Relaxed)
    }

    pub fn runs_completed(&self) -> u64 {
        self.runs_completed.load(Ordering::Relaxed)
    }

    /// Reset all counters to zero (useful in tests).
    pub fn reset(&self) {
        self.invocations.store(0, Ordering::Relaxed);
        self.invocation_failures.store(0, Ordering::Relaxed);
        self.items_migrated.store(0, Ordering::Relaxed);
        self.items_failed.store(0, Ordering::Relaxed);
        self.items_skipped.store(0, Ordering::Relaxed);
        self.runs_completed.store(0, Ordering::Relaxed);
    }
}
