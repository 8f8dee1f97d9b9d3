//! Shared type definitions for the Logtally log aggregation service.
//!
//! This crate is the single source of truth for the data that crosses
//! crate boundaries: the finalized window [`Snapshot`] handed to publishers
//! and the OTLP/JSON log export model decoded by the ingress.
//!
//! # Modules
//!
//! - [`snapshot`] -- The immutable per-window aggregation result
//! - [`otlp`] -- OTLP/JSON attribute values, log export requests and responses

pub mod otlp;
pub mod snapshot;

// Re-export all public types at crate root for convenience.
pub use otlp::{
    AnyValue, ExportLogsPartialSuccess, ExportLogsServiceRequest, ExportLogsServiceResponse,
    InstrumentationScope, KeyValue, LogRecord, Resource, ResourceLogs, ScopeLogs, UnixNanos,
};
pub use snapshot::Snapshot;
