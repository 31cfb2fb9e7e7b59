//! Refresh counters.

use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;

/// Point-in-time copy of the cache counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CacheStats {
    pub fetches_started: u64,
    pub fetches_applied: u64,
    pub fetches_failed: u64,
    /// Responses dropped because the hint moved on or interest ended, plus
    /// queued jobs skipped for the same reasons before fetching.
    pub responses_discarded: u64,
}

#[derive(Debug, Default)]
pub(crate) struct StatsCounters {
    started: AtomicU64,
    applied: AtomicU64,
    failed: AtomicU64,
    discarded: AtomicU64,
}

impl StatsCounters {
    pub(crate) fn record_started(&self) {
        let _ = self.started.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_applied(&self) {
        let _ = self.applied.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_failed(&self) {
        let _ = self.failed.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_discarded(&self) {
        let _ = self.discarded.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn snapshot(&self) -> CacheStats {
        CacheStats {
            fetches_started: self.started.load(Ordering::Relaxed),
            fetches_applied: self.applied.load(Ordering::Relaxed),
            fetches_failed: self.failed.load(Ordering::Relaxed),
            responses_discarded: self.discarded.load(Ordering::Relaxed),
        }
    }
}
