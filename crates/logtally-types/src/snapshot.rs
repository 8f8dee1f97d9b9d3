//! The finalized result of one aggregation window.
//!
//! A [`Snapshot`] is built by the aggregation loop at a window boundary and
//! handed to a publisher by reference. It is never mutated afterwards. The
//! serialized form is one self-contained JSON object per window:
//!
//! ```json
//! {"window_start":1000,"window_end":2000,"attribute_key":"foo",
//!  "counts":{"bar":2,"baz":1},"total":3,"dropped":0}
//! ```

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Aggregate counts for one window `[window_start, window_end)`.
///
/// Timestamps are milliseconds since the Unix epoch. `counts` is keyed by
/// the resolved grouping value; `total` is the number of events counted in
/// the window and `dropped` the number of events that never reached the
/// counting state because the ingestion queue was full.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Snapshot {
    /// Inclusive window start (ms since epoch).
    pub window_start: i64,
    /// Exclusive window end (ms since epoch).
    pub window_end: i64,
    /// Name of the attribute the counts are grouped by.
    pub attribute_key: String,
    /// Occurrences per grouping value.
    pub counts: BTreeMap<String, u64>,
    /// Number of events counted in the window.
    pub total: u64,
    /// Number of events dropped before they could be counted.
    pub dropped: u64,
}

impl Snapshot {
    /// Count recorded for `key`, or zero if the key never occurred.
    pub fn count(&self, key: &str) -> u64 {
        self.counts.get(key).copied().unwrap_or(0)
    }
}
