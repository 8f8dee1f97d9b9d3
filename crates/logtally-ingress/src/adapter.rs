//! OTLP export request to grouping-key translation.
//!
//! [`IngressAdapter`] walks every log record of an
//! [`ExportLogsServiceRequest`], resolves the configured attribute through
//! the record, scope and resource layers, and submits the whole request to
//! the aggregator as one batch. Records whose attribute resolves nowhere are
//! counted under [`UNKNOWN_VALUE`].

use std::sync::Arc;

use logtally_core::{UNKNOWN_VALUE, WindowedAggregator, resolve};
use logtally_types::{ExportLogsPartialSuccess, ExportLogsServiceRequest, ExportLogsServiceResponse};
use tracing::{debug, warn};

use crate::stats::IngestStats;

/// Message returned to clients whose records were rejected.
pub const QUEUE_FULL_MESSAGE: &str = "aggregation queue full; log records dropped";

/// Result of handing one export request to the aggregator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExportOutcome {
    /// Records present in the request.
    pub received: u64,
    /// Records accepted into the aggregation queue.
    pub processed: u64,
    /// Records rejected and reported as drops.
    pub dropped: u64,
}

impl ExportOutcome {
    /// OTLP response body for this outcome. `partialSuccess` is only present
    /// when records were rejected.
    pub fn to_response(&self) -> ExportLogsServiceResponse {
        let partial_success = (self.dropped > 0).then(|| ExportLogsPartialSuccess {
            rejected_log_records: self.dropped,
            error_message: QUEUE_FULL_MESSAGE.to_owned(),
        });
        ExportLogsServiceResponse { partial_success }
    }
}

/// Feeds decoded export requests into a [`WindowedAggregator`].
#[derive(Debug, Clone)]
pub struct IngressAdapter {
    aggregator: Arc<WindowedAggregator>,
    stats: Arc<IngestStats>,
}

impl IngressAdapter {
    /// Create an adapter for `aggregator`, recording into `stats`.
    pub const fn new(aggregator: Arc<WindowedAggregator>, stats: Arc<IngestStats>) -> Self {
        Self { aggregator, stats }
    }

    /// Resolve the grouping key of every record in `request`, in order.
    pub fn grouping_keys(&self, request: &ExportLogsServiceRequest) -> Vec<String> {
        let key = self.aggregator.attribute_key();
        let mut keys = Vec::with_capacity(request.record_count());
        for resource_logs in &request.resource_logs {
            let resource_attrs = resource_logs.resource_attributes();
            for scope_logs in &resource_logs.scope_logs {
                let scope_attrs = scope_logs.scope_attributes();
                for record in &scope_logs.log_records {
                    let value = resolve(key, &record.attributes, scope_attrs, resource_attrs)
                        .unwrap_or_else(|| UNKNOWN_VALUE.to_owned());
                    keys.push(value);
                }
            }
        }
        keys
    }

    /// Submit every record of `request` as a single batch.
    ///
    /// The batch is all-or-nothing: if the queue cannot take it, every
    /// record is reported to the aggregator as dropped.
    pub fn export(&self, request: &ExportLogsServiceRequest) -> ExportOutcome {
        let keys = self.grouping_keys(request);
        let received = u64::try_from(keys.len()).unwrap_or(u64::MAX);
        self.stats.add_received(received);

        if keys.is_empty() {
            return ExportOutcome {
                received,
                processed: 0,
                dropped: 0,
            };
        }

        if self.aggregator.enqueue_batch(keys) {
            self.stats.add_processed(received);
            debug!(records = received, "export accepted");
            ExportOutcome {
                received,
                processed: received,
                dropped: 0,
            }
        } else {
            self.aggregator.record_drop(received);
            self.stats.add_dropped(received);
            warn!(
                records = received,
                queue_length = self.aggregator.queue_length(),
                state = self.aggregator.state().as_str(),
                "export rejected; records dropped"
            );
            ExportOutcome {
                received,
                processed: 0,
                dropped: received,
            }
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::time::Duration;

    use logtally_core::{AggregatorConfig, LogPublisher};
    use logtally_types::{KeyValue, LogRecord, Resource, ResourceLogs, ScopeLogs};

    use super::*;

    fn adapter(capacity: usize) -> (IngressAdapter, Arc<WindowedAggregator>, Arc<IngestStats>) {
        let aggregator = Arc::new(
            WindowedAggregator::new(
                AggregatorConfig {
                    window: Duration::from_secs(10),
                    queue_capacity: capacity,
                    attribute_key: String::from("foo"),
                },
                Box::new(LogPublisher),
            )
            .unwrap(),
        );
        let stats = Arc::new(IngestStats::new());
        (
            IngressAdapter::new(Arc::clone(&aggregator), Arc::clone(&stats)),
            aggregator,
            stats,
        )
    }

    fn record(attrs: Vec<KeyValue>) -> LogRecord {
        LogRecord {
            attributes: attrs,
            ..LogRecord::default()
        }
    }

    fn request() -> ExportLogsServiceRequest {
        ExportLogsServiceRequest {
            resource_logs: vec![ResourceLogs {
                resource: Some(Resource {
                    attributes: vec![KeyValue::new("foo", "from-resource")],
                }),
                scope_logs: vec![ScopeLogs {
                    scope: None,
                    log_records: vec![
                        record(vec![KeyValue::new("foo", "bar")]),
                        record(vec![]),
                        record(vec![KeyValue::new("foo", 7_i64)]),
                    ],
                }],
            }],
        }
    }

    #[test]
    fn keys_follow_layer_precedence() {
        let (adapter, _, _) = adapter(4);
        assert_eq!(
            adapter.grouping_keys(&request()),
            vec!["bar", "from-resource", "7"]
        );
    }

    #[test]
    fn unresolved_records_become_unknown() {
        let (adapter, _, _) = adapter(4);
        let req = ExportLogsServiceRequest {
            resource_logs: vec![ResourceLogs {
                resource: None,
                scope_logs: vec![ScopeLogs {
                    scope: None,
                    log_records: vec![record(vec![KeyValue::new("other", "x")])],
                }],
            }],
        };
        assert_eq!(adapter.grouping_keys(&req), vec![UNKNOWN_VALUE]);
    }

    #[tokio::test]
    async fn accepted_export_reports_no_partial_success() {
        let (adapter, aggregator, stats) = adapter(4);
        let outcome = adapter.export(&request());
        assert_eq!(
            outcome,
            ExportOutcome {
                received: 3,
                processed: 3,
                dropped: 0
            }
        );
        assert!(outcome.to_response().partial_success.is_none());
        assert_eq!(aggregator.queue_length(), 1);
        assert_eq!(stats.snapshot(0, "idle").logs_processed, 3);
    }

    #[tokio::test]
    async fn rejected_export_records_drops() {
        let (adapter, aggregator, stats) = adapter(0);
        let outcome = adapter.export(&request());
        assert_eq!(outcome.dropped, 3);
        assert_eq!(outcome.processed, 0);
        assert_eq!(aggregator.dropped_pending(), 3);
        assert_eq!(stats.snapshot(0, "idle").logs_dropped, 3);

        let partial = outcome.to_response().partial_success.unwrap();
        assert_eq!(partial.rejected_log_records, 3);
        assert_eq!(partial.error_message, QUEUE_FULL_MESSAGE);
    }

    #[tokio::test]
    async fn empty_request_is_a_no_op() {
        let (adapter, aggregator, _) = adapter(0);
        let outcome = adapter.export(&ExportLogsServiceRequest::default());
        assert_eq!(outcome.received, 0);
        assert_eq!(outcome.dropped, 0);
        assert_eq!(aggregator.dropped_pending(), 0);
    }
}
