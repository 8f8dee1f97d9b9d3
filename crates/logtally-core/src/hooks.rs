//! Observational callbacks invoked from the aggregation loop.
//!
//! The owner of a [`WindowedAggregator`](crate::aggregator::WindowedAggregator)
//! may install a [`FlushObserver`] to feed its own metrics. Callbacks run
//! synchronously on the loop task: they must be cheap and must not block,
//! since any delay stalls draining of the ingestion queue.

/// Callbacks fired after each publish attempt.
///
/// Both methods default to no-ops so implementors only override what they
/// record.
pub trait FlushObserver: Send + Sync {
    /// A snapshot was published successfully.
    fn on_flush(&self) {}

    /// A snapshot publish attempt failed; the counts carry over.
    fn on_publish_failed(&self) {}
}

/// An observer that records nothing.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoOpObserver;

impl FlushObserver for NoOpObserver {}
