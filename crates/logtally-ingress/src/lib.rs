//! OTLP/HTTP JSON log ingress for Logtally.
//!
//! This crate provides an Axum HTTP server that exposes:
//!
//! - **`POST /v1/logs`** accepting OTLP JSON export requests, resolving
//!   each record's grouping key and feeding the
//!   [`WindowedAggregator`](logtally_core::WindowedAggregator) one batch
//!   per request
//! - **`GET /healthz`** and **`GET /api/stats`** for liveness and counters
//!
//! # Architecture
//!
//! Handlers never block on the aggregator: a full queue turns into an OTLP
//! partial-success response and a drop count in the next snapshot.

pub mod adapter;
pub mod error;
pub mod handlers;
pub mod router;
pub mod server;
pub mod state;
pub mod stats;

pub use adapter::{ExportOutcome, IngressAdapter};
pub use error::IngressError;
pub use router::build_router;
pub use server::{ServerError, bind, serve};
pub use state::AppState;
pub use stats::{IngestStats, StatsSnapshot};
