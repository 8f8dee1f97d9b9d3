//! Logtally binary.
//!
//! Wires the OTLP/HTTP ingress to the windowed aggregator and runs both
//! until `Ctrl-C` or `SIGTERM`.
//!
//! # Startup Sequence
//!
//! 1. Load configuration (`LOGTALLY_CONFIG`, default `logtally.yaml`)
//! 2. Initialize structured logging (tracing) from the `logging` section
//! 3. Validate configuration
//! 4. Build the snapshot publisher (JSON lines to stdout or a file, or logs)
//! 5. Construct the aggregator with the stats observer and start it
//! 6. Bind the listener and spawn the HTTP server
//! 7. Wait for a shutdown signal or server exit
//! 8. Stop the HTTP server, then the aggregator, each bounded by
//!    `server.graceful_timeout_ms`

mod error;
mod telemetry;

use std::sync::Arc;
use std::time::Duration;

use logtally_core::config::{LogtallyConfig, OutputConfig, OutputFormat};
use logtally_core::{
    JsonLinesPublisher, LogPublisher, PublishError, SnapshotPublisher, StopOutcome,
    WindowedAggregator,
};
use logtally_ingress::{AppState, IngestStats, ServerError, build_router};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::error::AppError;

/// Application entry point.
///
/// # Errors
///
/// Returns an error if configuration is invalid, the output cannot be
/// opened, the listener cannot bind, or the server fails while serving.
#[tokio::main]
async fn main() -> Result<(), AppError> {
    // 1. Load configuration.
    let config = LogtallyConfig::load()?;

    // 2. Initialize structured logging.
    telemetry::init(&config.logging)?;
    info!("logtally starting");

    // 3. Validate before anything is started.
    config.validate()?;
    info!(
        attribute_key = %config.aggregation.attribute_key,
        window_ms = config.aggregation.window_ms,
        max_queue = config.aggregation.max_queue,
        listen_addr = %config.server.listen_addr,
        output_format = ?config.output.format,
        "Configuration loaded"
    );

    // 4. Snapshot publisher.
    let publisher = build_publisher(&config.output)?;
    info!(publisher = publisher.name(), "Snapshot publisher ready");

    // 5. Aggregator, observed by the ingress stats.
    let root = CancellationToken::new();
    let stats = Arc::new(IngestStats::new());
    let aggregator = Arc::new(
        WindowedAggregator::new(config.aggregation.to_aggregator_config(), publisher)?
            .with_observer(stats.clone()),
    );
    aggregator.start();

    // 6. HTTP ingress.
    let listener = match logtally_ingress::bind(&config.server.listen_addr).await {
        Ok(listener) => listener,
        Err(e) => {
            aggregator.stop(config.server.graceful_timeout()).await;
            return Err(e.into());
        }
    };
    let router = build_router(
        Arc::new(AppState::new(Arc::clone(&aggregator), stats)),
        config.server.max_body_bytes,
    );
    let mut server = tokio::spawn(logtally_ingress::serve(listener, router, root.clone()));

    // 7. Run until signalled or the server exits on its own.
    let mut server_result: Result<(), AppError> = Ok(());
    let mut server_running = true;
    tokio::select! {
        signal = shutdown_signal() => match signal {
            Ok(()) => info!("shutdown signal received"),
            Err(e) => error!(error = %e, "failed to listen for shutdown signals; stopping"),
        },
        joined = &mut server => {
            server_running = false;
            server_result = flatten_server_exit(joined);
            if let Err(e) = &server_result {
                error!(error = %e, "ingress server exited unexpectedly");
            }
        }
    }

    // 8. Bounded shutdown.
    let graceful = config.server.graceful_timeout();
    let server = server_running.then_some(server);
    if shutdown(&root, server, &aggregator, graceful).await == StopOutcome::TimedOut {
        warn!(
            timeout_ms = config.server.graceful_timeout_ms,
            "aggregator did not finish its final flush in time"
        );
    }

    info!(
        queue_length = aggregator.queue_length(),
        dropped_pending = aggregator.dropped_pending(),
        "logtally shutdown complete"
    );

    server_result
}

/// Stop the HTTP server, then the aggregator.
///
/// The aggregator runs under its own token, so requests still in flight
/// during the server's graceful stop are counted in the final flush.
async fn shutdown(
    root: &CancellationToken,
    server: Option<JoinHandle<Result<(), ServerError>>>,
    aggregator: &WindowedAggregator,
    graceful: Duration,
) -> StopOutcome {
    root.cancel();
    if let Some(handle) = server {
        stop_server(handle, graceful).await;
    }
    aggregator.stop(graceful).await
}

/// Select the publisher named by the output config.
fn build_publisher(output: &OutputConfig) -> Result<Box<dyn SnapshotPublisher>, PublishError> {
    Ok(match (output.format, &output.file) {
        (OutputFormat::Log, _) => Box::new(LogPublisher),
        (OutputFormat::Json, Some(path)) => {
            info!(path = %path.display(), "Appending snapshots to file");
            Box::new(JsonLinesPublisher::append_file(path)?)
        }
        (OutputFormat::Json, None) => Box::new(JsonLinesPublisher::stdout()),
    })
}

/// Wait up to `graceful` for in-flight requests, then abort the server.
async fn stop_server(mut handle: JoinHandle<Result<(), ServerError>>, graceful: Duration) {
    match tokio::time::timeout(graceful, &mut handle).await {
        Ok(joined) => {
            if let Err(e) = flatten_server_exit(joined) {
                error!(error = %e, "ingress server failed during shutdown");
            }
        }
        Err(_) => {
            warn!(
                timeout_ms = graceful.as_millis(),
                "ingress server did not stop in time; aborting"
            );
            handle.abort();
        }
    }
}

fn flatten_server_exit(
    joined: Result<Result<(), ServerError>, tokio::task::JoinError>,
) -> Result<(), AppError> {
    match joined {
        Ok(result) => result.map_err(AppError::from),
        Err(e) => Err(AppError::Task {
            message: format!("ingress server task failed: {e}"),
        }),
    }
}

/// Resolve on `Ctrl-C`, or on `SIGTERM` where available.
async fn shutdown_signal() -> Result<(), std::io::Error> {
    let ctrl_c = tokio::signal::ctrl_c();

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{SignalKind, signal};
        signal(SignalKind::terminate())?.recv().await;
        Ok::<(), std::io::Error>(())
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<Result<(), std::io::Error>>();

    tokio::select! {
        result = ctrl_c => result,
        result = terminate => result,
    }
}
