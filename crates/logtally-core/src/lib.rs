//! Windowed aggregation engine for the Logtally log aggregation service.
//!
//! This crate owns the counting core that every ingress feeds into:
//! attribute resolution, the single-writer aggregation loop with its
//! bounded ingestion queue, and the publishers that receive each finalized
//! window.
//!
//! # Modules
//!
//! - [`aggregator`] -- [`WindowedAggregator`]: non-blocking ingestion API,
//!   window timer, retry-without-loss flush and bounded-deadline stop.
//! - [`config`] -- Configuration loading from `logtally.yaml` plus
//!   environment overrides into strongly-typed structs.
//! - [`hooks`] -- [`FlushObserver`] callbacks invoked from the loop.
//! - [`publisher`] -- [`SnapshotPublisher`] trait, JSON lines and log
//!   publishers.
//! - [`resolver`] -- Layered attribute lookup and canonical value coercion.
//!
//! [`WindowedAggregator`]: aggregator::WindowedAggregator
//! [`FlushObserver`]: hooks::FlushObserver
//! [`SnapshotPublisher`]: publisher::SnapshotPublisher

pub mod aggregator;
pub mod config;
pub mod hooks;
pub mod publisher;
pub mod resolver;

pub use aggregator::{AggregatorConfig, EngineState, StopOutcome, WindowedAggregator};
pub use hooks::{FlushObserver, NoOpObserver};
pub use publisher::{JsonLinesPublisher, LogPublisher, PublishError, SnapshotPublisher};
pub use resolver::{UNKNOWN_VALUE, canonical_string, resolve};
