//! Windowed aggregation engine.
//!
//! [`WindowedAggregator`] counts grouping keys over fixed wall-clock windows
//! and hands one [`Snapshot`] per window to a [`SnapshotPublisher`].
//!
//! # Architecture
//!
//! ```text
//! producers --try_send--> bounded queue --> loop task --publish--> publisher
//!     |                                        ^
//!     +--record_drop--> AtomicU64 -------------+ (swapped at each flush)
//! ```
//!
//! - **Ingestion** (`enqueue`, `enqueue_batch`) never blocks and never
//!   errors: a full queue returns `false` and the event is gone. Callers
//!   report such drops with [`record_drop`](WindowedAggregator::record_drop).
//! - **Counting state** (`counts`, `total`) is owned by the loop task and
//!   touched nowhere else, so it needs no lock.
//! - **Flush** happens on every window tick. A failed publish keeps the
//!   counts and merges them into the next window; the drop counter is
//!   cleared at every attempt regardless.
//! - **Stop** cancels the loop, which drains what was already accepted,
//!   flushes once more, and exits. The caller waits at most its deadline.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU8, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use chrono::Utc;
use logtally_types::Snapshot;
use serde::Serialize;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::config::ConfigError;
use crate::hooks::{FlushObserver, NoOpObserver};
use crate::publisher::SnapshotPublisher;

/// Largest accepted queue capacity, bounded by the channel's permit count.
pub const MAX_QUEUE_CAPACITY: usize = tokio::sync::Semaphore::MAX_PERMITS;

/// Engine-facing configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AggregatorConfig {
    /// Window length. Must be greater than zero.
    pub window: Duration,
    /// Ingestion queue capacity in messages. Zero rejects every enqueue.
    pub queue_capacity: usize,
    /// Grouping attribute name, copied into every snapshot.
    pub attribute_key: String,
}

/// Lifecycle state of the engine.
///
/// `Idle -> Running -> Draining -> Stopped`. There is no way back from
/// `Stopped`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EngineState {
    /// Constructed, loop not started.
    Idle,
    /// Loop is counting and flushing on every tick.
    Running,
    /// Cancellation observed; the final flush is in progress.
    Draining,
    /// Loop has exited.
    Stopped,
}

impl EngineState {
    /// Lowercase name for logs and JSON.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Running => "running",
            Self::Draining => "draining",
            Self::Stopped => "stopped",
        }
    }

    const fn to_u8(self) -> u8 {
        match self {
            Self::Idle => 0,
            Self::Running => 1,
            Self::Draining => 2,
            Self::Stopped => 3,
        }
    }

    const fn from_u8(raw: u8) -> Self {
        match raw {
            0 => Self::Idle,
            1 => Self::Running,
            2 => Self::Draining,
            _ => Self::Stopped,
        }
    }
}

/// How a call to [`WindowedAggregator::stop`] ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopOutcome {
    /// The loop finished its final flush within the deadline.
    Completed,
    /// The deadline elapsed first; the loop may still be flushing.
    TimedOut,
    /// Nothing was running (never started, or already stopped).
    NotRunning,
}

/// One queue slot. A batch occupies a single slot so it is accepted or
/// rejected as a unit.
#[derive(Debug)]
enum Ingest {
    One(String),
    Batch(Vec<String>),
}

/// State shared between the handle and the loop task.
#[derive(Debug)]
struct Shared {
    /// Drops reported by producers since the last flush attempt.
    dropped: AtomicU64,
    /// Current [`EngineState`] as `u8`.
    state: AtomicU8,
}

impl Shared {
    fn set_state(&self, state: EngineState) {
        self.state.store(state.to_u8(), Ordering::Release);
    }

    fn state(&self) -> EngineState {
        EngineState::from_u8(self.state.load(Ordering::Acquire))
    }
}

/// Resources parked until the loop is started.
struct IdleParts {
    rx: Option<mpsc::Receiver<Ingest>>,
    publisher: Box<dyn SnapshotPublisher>,
}

enum Lifecycle {
    Idle(IdleParts),
    Running {
        token: CancellationToken,
        handle: JoinHandle<()>,
    },
    Stopped,
}

/// Windowed counting engine with a non-blocking ingestion API.
///
/// All methods take `&self`; share the aggregator behind an [`Arc`] to feed
/// it from many tasks.
pub struct WindowedAggregator {
    config: AggregatorConfig,
    /// `None` when the configured capacity is zero.
    tx: Option<mpsc::Sender<Ingest>>,
    shared: Arc<Shared>,
    observer: Arc<dyn FlushObserver>,
    lifecycle: Mutex<Lifecycle>,
}

impl std::fmt::Debug for WindowedAggregator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WindowedAggregator")
            .field("config", &self.config)
            .field("state", &self.shared.state())
            .field("queue_length", &self.queue_length())
            .field("dropped_pending", &self.dropped_pending())
            .finish_non_exhaustive()
    }
}

impl WindowedAggregator {
    /// Create an idle aggregator.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] if the window is zero or the queue
    /// capacity exceeds [`MAX_QUEUE_CAPACITY`].
    pub fn new(
        config: AggregatorConfig,
        publisher: Box<dyn SnapshotPublisher>,
    ) -> Result<Self, ConfigError> {
        if config.window.is_zero() {
            return Err(ConfigError::Invalid {
                field: "aggregation.window_ms",
                message: String::from("must be greater than zero"),
            });
        }
        if config.queue_capacity > MAX_QUEUE_CAPACITY {
            return Err(ConfigError::Invalid {
                field: "aggregation.max_queue",
                message: format!("must not exceed {MAX_QUEUE_CAPACITY}"),
            });
        }

        let (tx, rx) = if config.queue_capacity == 0 {
            (None, None)
        } else {
            let (tx, rx) = mpsc::channel(config.queue_capacity);
            (Some(tx), Some(rx))
        };

        Ok(Self {
            config,
            tx,
            shared: Arc::new(Shared {
                dropped: AtomicU64::new(0),
                state: AtomicU8::new(EngineState::Idle.to_u8()),
            }),
            observer: Arc::new(NoOpObserver),
            lifecycle: Mutex::new(Lifecycle::Idle(IdleParts { rx, publisher })),
        })
    }

    /// Install flush callbacks. Takes effect at the next start.
    #[must_use]
    pub fn with_observer(mut self, observer: Arc<dyn FlushObserver>) -> Self {
        self.observer = observer;
        self
    }

    // -----------------------------------------------------------------------
    // Ingestion
    // -----------------------------------------------------------------------

    /// Offer one key. Returns `false` without waiting if the queue is full
    /// or the engine has stopped.
    pub fn enqueue(&self, key: impl Into<String>) -> bool {
        self.try_push(Ingest::One(key.into()))
    }

    /// Offer a batch of keys as one unit: all accepted or none.
    ///
    /// The empty batch is always accepted.
    pub fn enqueue_batch(&self, keys: Vec<String>) -> bool {
        if keys.is_empty() {
            return true;
        }
        self.try_push(Ingest::Batch(keys))
    }

    fn try_push(&self, item: Ingest) -> bool {
        self.tx
            .as_ref()
            .is_some_and(|tx| tx.try_send(item).is_ok())
    }

    /// Report `n` events the caller had to drop; they appear in the next
    /// snapshot's `dropped` field.
    pub fn record_drop(&self, n: u64) {
        if n > 0 {
            self.shared.dropped.fetch_add(n, Ordering::AcqRel);
        }
    }

    /// Messages currently waiting in the queue. Racy; informational only.
    ///
    /// A batch counts as one message.
    pub fn queue_length(&self) -> usize {
        self.tx
            .as_ref()
            .map_or(0, |tx| tx.max_capacity().saturating_sub(tx.capacity()))
    }

    /// Drops recorded since the last flush attempt.
    pub fn dropped_pending(&self) -> u64 {
        self.shared.dropped.load(Ordering::Acquire)
    }

    // -----------------------------------------------------------------------
    // Accessors
    // -----------------------------------------------------------------------

    /// Current lifecycle state.
    pub fn state(&self) -> EngineState {
        self.shared.state()
    }

    /// Grouping attribute name.
    pub fn attribute_key(&self) -> &str {
        &self.config.attribute_key
    }

    // -----------------------------------------------------------------------
    // Lifecycle
    // -----------------------------------------------------------------------

    /// Start the processing loop on the current Tokio runtime.
    ///
    /// A no-op unless the engine is [`EngineState::Idle`].
    pub fn start(&self) {
        self.start_with_parent(&CancellationToken::new());
    }

    /// Start the loop so that it also stops when `parent` is cancelled.
    ///
    /// A no-op unless the engine is [`EngineState::Idle`].
    pub fn start_with_parent(&self, parent: &CancellationToken) {
        let mut lifecycle = self.lock_lifecycle();
        let current = std::mem::replace(&mut *lifecycle, Lifecycle::Stopped);
        *lifecycle = match current {
            Lifecycle::Idle(parts) => {
                let token = parent.child_token();
                self.shared.set_state(EngineState::Running);
                let window_loop = WindowLoop {
                    rx: parts.rx,
                    publisher: parts.publisher,
                    observer: Arc::clone(&self.observer),
                    shared: Arc::clone(&self.shared),
                    window: self.config.window,
                    attribute_key: self.config.attribute_key.clone(),
                    counts: AggregationState::default(),
                    window_start: now_millis(),
                };
                let handle = tokio::spawn(window_loop.run(token.clone()));
                info!(
                    attribute_key = %self.config.attribute_key,
                    window_ms = self.config.window.as_millis(),
                    queue_capacity = self.config.queue_capacity,
                    "aggregator started"
                );
                Lifecycle::Running { token, handle }
            }
            other => {
                debug!(state = self.state().as_str(), "aggregator start ignored");
                other
            }
        };
    }

    /// Request cancellation and wait for the final flush, at most `deadline`.
    ///
    /// Never hangs: if the loop is wedged (for example in a publisher that
    /// does not return) the call returns [`StopOutcome::TimedOut`] and the
    /// loop is left to finish in the background. Stopping an idle engine
    /// discards it without a flush; stopping a stopped engine does nothing.
    pub async fn stop(&self, deadline: Duration) -> StopOutcome {
        let running = {
            let mut lifecycle = self.lock_lifecycle();
            match std::mem::replace(&mut *lifecycle, Lifecycle::Stopped) {
                Lifecycle::Running { token, handle } => Some((token, handle)),
                Lifecycle::Idle(_) => {
                    self.shared.set_state(EngineState::Stopped);
                    None
                }
                Lifecycle::Stopped => None,
            }
        };

        let Some((token, handle)) = running else {
            return StopOutcome::NotRunning;
        };

        token.cancel();
        match tokio::time::timeout(deadline, handle).await {
            Ok(Ok(())) => StopOutcome::Completed,
            Ok(Err(e)) => {
                error!(error = %e, "aggregation loop terminated abnormally");
                self.shared.set_state(EngineState::Stopped);
                StopOutcome::Completed
            }
            Err(_) => {
                warn!(
                    deadline_ms = deadline.as_millis(),
                    "aggregator stop deadline elapsed before final flush completed"
                );
                StopOutcome::TimedOut
            }
        }
    }

    fn lock_lifecycle(&self) -> MutexGuard<'_, Lifecycle> {
        self.lifecycle
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }
}

impl Drop for WindowedAggregator {
    fn drop(&mut self) {
        let lifecycle = self
            .lifecycle
            .get_mut()
            .unwrap_or_else(PoisonError::into_inner);
        if let Lifecycle::Running { token, .. } = lifecycle {
            token.cancel();
        }
    }
}

// ---------------------------------------------------------------------------
// Processing loop
// ---------------------------------------------------------------------------

/// Counting state for the open window. Only the loop task touches it.
///
/// `total` always equals the sum of `counts` between messages.
#[derive(Debug, Default)]
struct AggregationState {
    counts: HashMap<String, u64>,
    total: u64,
}

impl AggregationState {
    fn record(&mut self, key: String) {
        self.total = self.total.saturating_add(1);
        let count = self.counts.entry(key).or_insert(0);
        *count = count.saturating_add(1);
    }

    fn apply(&mut self, item: Ingest) {
        match item {
            Ingest::One(key) => self.record(key),
            Ingest::Batch(keys) => {
                for key in keys {
                    self.record(key);
                }
            }
        }
    }

    fn is_empty(&self) -> bool {
        self.counts.is_empty() && self.total == 0
    }

    fn reset(&mut self) {
        self.counts.clear();
        self.total = 0;
    }
}

/// Everything the loop task owns.
struct WindowLoop {
    rx: Option<mpsc::Receiver<Ingest>>,
    publisher: Box<dyn SnapshotPublisher>,
    observer: Arc<dyn FlushObserver>,
    shared: Arc<Shared>,
    window: Duration,
    attribute_key: String,
    counts: AggregationState,
    window_start: i64,
}

impl WindowLoop {
    async fn run(mut self, token: CancellationToken) {
        let mut ticker = tokio::time::interval(self.window);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // First tick one full window from now, not immediately.
        ticker.reset();

        loop {
            tokio::select! {
                biased;

                () = token.cancelled() => break,

                // Ahead of the queue so a busy producer cannot starve the timer.
                _ = ticker.tick() => {
                    let window_end = now_millis();
                    self.flush(window_end).await;
                }

                item = next_item(self.rx.as_mut()) => match item {
                    Some(item) => self.counts.apply(item),
                    None => {
                        debug!("ingestion queue closed");
                        break;
                    }
                },
            }
        }

        self.shared.set_state(EngineState::Draining);
        let drained = self.drain_accepted();
        let window_end = now_millis();
        self.flush(window_end).await;
        self.shared.set_state(EngineState::Stopped);
        info!(drained, "aggregator stopped");
    }

    /// Close the queue and count everything already accepted.
    fn drain_accepted(&mut self) -> usize {
        let Some(rx) = self.rx.as_mut() else {
            return 0;
        };
        rx.close();
        let mut drained: usize = 0;
        while let Ok(item) = rx.try_recv() {
            self.counts.apply(item);
            drained = drained.saturating_add(1);
        }
        drained
    }

    /// Finalize `[window_start, window_end)` and try to publish it.
    async fn flush(&mut self, window_end: i64) {
        if self.counts.is_empty() && self.shared.dropped.load(Ordering::Acquire) == 0 {
            self.window_start = window_end;
            return;
        }

        let dropped = self.shared.dropped.swap(0, Ordering::AcqRel);
        let snapshot = Snapshot {
            window_start: self.window_start,
            window_end,
            attribute_key: self.attribute_key.clone(),
            counts: self
                .counts
                .counts
                .iter()
                .map(|(key, count)| (key.clone(), *count))
                .collect(),
            total: self.counts.total,
            dropped,
        };

        match self.publisher.publish(&snapshot).await {
            Ok(()) => {
                debug!(
                    attribute_key = %self.attribute_key,
                    window_start = snapshot.window_start,
                    window_end = snapshot.window_end,
                    keys = snapshot.counts.len(),
                    total = snapshot.total,
                    dropped = snapshot.dropped,
                    "snapshot published"
                );
                self.observer.on_flush();
                self.counts.reset();
                self.window_start = window_end;
            }
            Err(e) => {
                error!(
                    error = %e,
                    attribute_key = %self.attribute_key,
                    window_start = snapshot.window_start,
                    window_end = snapshot.window_end,
                    total = snapshot.total,
                    dropped = snapshot.dropped,
                    publisher = self.publisher.name(),
                    "failed to publish snapshot; counts carried into next window"
                );
                self.observer.on_publish_failed();
            }
        }
    }
}

/// Next queued item, or pending forever when there is no queue.
async fn next_item(rx: Option<&mut mpsc::Receiver<Ingest>>) -> Option<Ingest> {
    match rx {
        Some(rx) => rx.recv().await,
        None => std::future::pending().await,
    }
}

fn now_millis() -> i64 {
    Utc::now().timestamp_millis()
}
