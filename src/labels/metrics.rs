//! Lookup metrics for the label resolver.
//!
//! Counts how lookups were answered so an operator can see how much of a
//! site is still untranslated.

use serde::Serialize;
use std::sync::atomic::{AtomicUsize, Ordering};

/// Counters shared by one resolver and everything cloned from it.
#[derive(Debug, Default)]
pub struct LabelMetrics {
    /// Lookups answered with a stored translation in the requested language
    hits: AtomicUsize,

    /// Lookups where the requested language had no translation
    misses: AtomicUsize,

    /// Misses answered with the default-language translation
    fallbacks: AtomicUsize,

    /// Labels inserted by auto-registration
    registrations: AtomicUsize,

    /// Persistence failures swallowed on the read path
    failed_writes: AtomicUsize,
}

impl LabelMetrics {
    /// Create a zeroed set of counters
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a lookup answered in the requested language
    pub fn record_hit(&self) {
        self.hits.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a lookup with no translation in the requested language
    pub fn record_miss(&self) {
        self.misses.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a miss answered with the default-language translation
    pub fn record_fallback(&self) {
        self.fallbacks.fetch_add(1, Ordering::Relaxed);
    }

    /// Record an auto-registered label
    pub fn record_registration(&self) {
        self.registrations.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a persistence failure swallowed during lookup
    pub fn record_failed_write(&self) {
        self.failed_writes.fetch_add(1, Ordering::Relaxed);
    }

    /// Get the current hit count
    pub fn hits(&self) -> usize {
        self.hits.load(Ordering::Relaxed)
    }

    /// Get the current miss count
    pub fn misses(&self) -> usize {
        self.misses.load(Ordering::Relaxed)
    }

    /// Get the current fallback count
    pub fn fallbacks(&self) -> usize {
        self.fallbacks.load(Ordering::Relaxed)
    }

    /// Get the current registration count
    pub fn registrations(&self) -> usize {
        self.registrations.load(Ordering::Relaxed)
    }

    /// Get the current failed write count
    pub fn failed_writes(&self) -> usize {
        self.failed_writes.load(Ordering::Relaxed)
    }

    /// Snapshot of the counters.
    pub fn report(&self) -> MetricsReport {
        let hits = self.hits();
        let misses = self.misses();
        let total = hits + misses;
        let hit_rate = if total > 0 {
            (hits as f64 / total as f64) * 100.0
        } else {
            0.0
        };

        MetricsReport {
            hits,
            misses,
            hit_rate,
            fallbacks: self.fallbacks(),
            registrations: self.registrations(),
            failed_writes: self.failed_writes(),
        }
    }
}

/// Serializable snapshot of [`LabelMetrics`].
#[derive(Debug, Clone, Serialize)]
pub struct MetricsReport {
    pub hits: usize,
    pub misses: usize,

    /// Hit rate as a percentage (0-100)
    pub hit_rate: f64,

    pub fallbacks: usize,
    pub registrations: usize,
    pub failed_writes: usize,
}
