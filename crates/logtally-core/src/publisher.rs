//! Snapshot publishers.
//!
//! The aggregation loop hands every finalized, non-empty window to a
//! [`SnapshotPublisher`]. A publisher may be slow or fail; the engine logs
//! the failure, keeps the unpublished counts and retries them merged into
//! the next window. The engine adds no timeout around `publish`.
//!
//! Two publishers ship with the crate:
//!
//! - [`JsonLinesPublisher`] -- one compact JSON object per line to any
//!   [`Write`] target (stdout or an append-mode file).
//! - [`LogPublisher`] -- one structured `tracing` event per snapshot.

use std::fs::{File, OpenOptions};
use std::io::{self, Write};
use std::path::Path;

use futures::future::BoxFuture;
use logtally_types::Snapshot;
use tracing::info;

/// Errors a publisher may report for a single snapshot.
#[derive(Debug, thiserror::Error)]
pub enum PublishError {
    /// Writing to the underlying sink failed.
    #[error("failed to write snapshot: {source}")]
    Io {
        /// The underlying I/O error.
        #[from]
        source: io::Error,
    },

    /// The snapshot could not be serialized.
    #[error("failed to serialize snapshot: {source}")]
    Serialize {
        /// The underlying serialization error.
        #[from]
        source: serde_json::Error,
    },

    /// The sink refused the snapshot.
    #[error("snapshot rejected: {message}")]
    Rejected {
        /// Description of the rejection.
        message: String,
    },
}

/// A destination for finalized window snapshots.
///
/// Called only from the aggregator's single loop task, so implementations
/// get exclusive access through `&mut self`. The trait is object safe; the
/// engine stores a `Box<dyn SnapshotPublisher>`.
pub trait SnapshotPublisher: Send {
    /// Short name used in log fields.
    fn name(&self) -> &'static str;

    /// Publish one snapshot.
    ///
    /// # Errors
    ///
    /// Returns [`PublishError`] if the snapshot could not be delivered. The
    /// engine treats every error as retryable.
    fn publish<'a>(&'a mut self, snapshot: &'a Snapshot) -> BoxFuture<'a, Result<(), PublishError>>;
}

/// Writes each snapshot as a single JSON line.
#[derive(Debug)]
pub struct JsonLinesPublisher<W> {
    writer: W,
}

impl<W: Write + Send> JsonLinesPublisher<W> {
    /// Wrap an arbitrary writer.
    pub const fn new(writer: W) -> Self {
        Self { writer }
    }

    /// Consume the publisher and return the writer.
    pub fn into_inner(self) -> W {
        self.writer
    }

    fn write_snapshot(&mut self, snapshot: &Snapshot) -> Result<(), PublishError> {
        let mut line = serde_json::to_vec(snapshot)?;
        line.push(b'\n');
        self.writer.write_all(&line)?;
        self.writer.flush()?;
        Ok(())
    }
}

impl JsonLinesPublisher<io::Stdout> {
    /// Publish to the process's standard output.
    pub fn stdout() -> Self {
        Self::new(io::stdout())
    }
}

impl JsonLinesPublisher<File> {
    /// Publish to `path`, creating it if needed and appending otherwise.
    ///
    /// # Errors
    ///
    /// Returns [`PublishError::Io`] if the file cannot be opened.
    pub fn append_file(path: &Path) -> Result<Self, PublishError> {
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        Ok(Self::new(file))
    }
}

impl<W: Write + Send> SnapshotPublisher for JsonLinesPublisher<W> {
    fn name(&self) -> &'static str {
        "json-lines"
    }

    fn publish<'a>(&'a mut self, snapshot: &'a Snapshot) -> BoxFuture<'a, Result<(), PublishError>> {
        Box::pin(async move { self.write_snapshot(snapshot) })
    }
}

/// Emits each snapshot as an `info`-level structured log event.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogPublisher;

impl SnapshotPublisher for LogPublisher {
    fn name(&self) -> &'static str {
        "log"
    }

    fn publish<'a>(&'a mut self, snapshot: &'a Snapshot) -> BoxFuture<'a, Result<(), PublishError>> {
        Box::pin(async move {
            let counts = serde_json::to_string(&snapshot.counts)?;
            info!(
                target: "logtally::snapshot",
                window_start = snapshot.window_start,
                window_end = snapshot.window_end,
                attribute_key = %snapshot.attribute_key,
                total = snapshot.total,
                dropped = snapshot.dropped,
                counts = %counts,
                "window snapshot"
            );
            Ok(())
        })
    }
}
