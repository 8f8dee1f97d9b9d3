//! Shared application state for the ingress server.

use std::sync::Arc;

use logtally_core::WindowedAggregator;

use crate::adapter::IngressAdapter;
use crate::stats::IngestStats;

/// State handed to every request handler.
#[derive(Debug, Clone)]
pub struct AppState {
    /// The aggregation engine fed by this server.
    pub aggregator: Arc<WindowedAggregator>,
    /// Request-to-batch translation.
    pub adapter: IngressAdapter,
    /// Ingestion counters, also installed as the aggregator's flush observer.
    pub stats: Arc<IngestStats>,
}

impl AppState {
    /// Build state around an aggregator and the stats it reports into.
    ///
    /// `stats` should be the same instance passed to
    /// [`WindowedAggregator::with_observer`] so flush counters line up.
    pub fn new(aggregator: Arc<WindowedAggregator>, stats: Arc<IngestStats>) -> Self {
        let adapter = IngressAdapter::new(Arc::clone(&aggregator), Arc::clone(&stats));
        Self {
            aggregator,
            adapter,
            stats,
        }
    }
}
