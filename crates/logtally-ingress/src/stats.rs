//! Ingestion counters shared by the HTTP handlers and the aggregator.
//!
//! All counters are plain atomics so handlers never contend on a lock.
//! [`IngestStats`] also implements [`FlushObserver`] so the aggregation loop
//! can report flushes and failed publishes into the same place.

use std::sync::atomic::{AtomicU64, Ordering};

use logtally_core::FlushObserver;
use serde::Serialize;

/// Running ingestion counters.
#[derive(Debug, Default)]
pub struct IngestStats {
    logs_received: AtomicU64,
    logs_processed: AtomicU64,
    logs_dropped: AtomicU64,
    flushes: AtomicU64,
    publish_failures: AtomicU64,
}

/// Point-in-time copy of [`IngestStats`], served by `GET /api/stats`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StatsSnapshot {
    /// Log records seen in export requests.
    pub logs_received: u64,
    /// Log records accepted into the aggregation queue.
    pub logs_processed: u64,
    /// Log records rejected because the queue was full.
    pub logs_dropped: u64,
    /// Snapshots published successfully.
    pub flushes: u64,
    /// Publish attempts that failed.
    pub publish_failures: u64,
    /// Messages waiting in the aggregation queue.
    pub queue_length: usize,
    /// Aggregator lifecycle state.
    pub engine: &'static str,
}

impl IngestStats {
    /// Create zeroed counters.
    pub fn new() -> Self {
        Self::default()
    }

    /// Count `n` records received.
    pub fn add_received(&self, n: u64) {
        self.logs_received.fetch_add(n, Ordering::Relaxed);
    }

    /// Count `n` records accepted.
    pub fn add_processed(&self, n: u64) {
        self.logs_processed.fetch_add(n, Ordering::Relaxed);
    }

    /// Count `n` records dropped.
    pub fn add_dropped(&self, n: u64) {
        self.logs_dropped.fetch_add(n, Ordering::Relaxed);
    }

    /// Take a consistent-enough copy for reporting.
    pub fn snapshot(&self, queue_length: usize, engine: &'static str) -> StatsSnapshot {
        StatsSnapshot {
            logs_received: self.logs_received.load(Ordering::Relaxed),
            logs_processed: self.logs_processed.load(Ordering::Relaxed),
            logs_dropped: self.logs_dropped.load(Ordering::Relaxed),
            flushes: self.flushes.load(Ordering::Relaxed),
            publish_failures: self.publish_failures.load(Ordering::Relaxed),
            queue_length,
            engine,
        }
    }
}

impl FlushObserver for IngestStats {
    fn on_flush(&self) {
        self.flushes.fetch_add(1, Ordering::Relaxed);
    }

    fn on_publish_failed(&self) {
        self.publish_failures.fetch_add(1, Ordering::Relaxed);
    }
}
