//! Error types for the Logtally binary.

/// Top-level error for the Logtally binary.
///
/// Each variant wraps a specific subsystem error so `main` can propagate
/// with `?`.
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    /// Configuration loading or validation failed.
    #[error("config error: {source}")]
    Config {
        /// The underlying config error.
        #[from]
        source: logtally_core::config::ConfigError,
    },

    /// The snapshot output could not be opened.
    #[error("output error: {source}")]
    Output {
        /// The underlying publisher error.
        #[from]
        source: logtally_core::PublishError,
    },

    /// The ingress server failed to bind or serve.
    #[error("server error: {source}")]
    Server {
        /// The underlying server error.
        #[from]
        source: logtally_ingress::ServerError,
    },

    /// The logging subscriber could not be installed.
    #[error("telemetry error: {message}")]
    Telemetry {
        /// Description of the failure.
        message: String,
    },

    /// The ingress server task panicked or was cancelled.
    #[error("task error: {message}")]
    Task {
        /// Description of the failure.
        message: String,
    },
}
