//! Error types for CLI utilities.

use metrics_exporter_prometheus::BuildError;
use std::io;
use thiserror::Error;

/// Error type for prometheus server initialization.
#[derive(Debug, Error)]
pub enum PrometheusError {
    /// Failed to bind to the specified address.
    #[error("failed to bind to address: {0}")]
    Bind(#[from] io::Error),
    /// Failed to build or install the exporter.
    #[error("failed to install prometheus exporter: {0}")]
    Build(#[from] BuildError),
}

/// Errors that can occur in CLI operations.
#[derive(Error, Debug)]
pub enum CliError {
    /// The log filter directive could not be parsed.
    #[error("invalid log filter: {0}")]
    LogFilter(#[from] tracing_subscriber::filter::FromEnvError),

    /// A global tracing subscriber was already installed.
    #[error("failed to install tracing subscriber: {0}")]
    TracingInit(#[from] tracing_subscriber::util::TryInitError),

    /// Error initializing metrics.
    #[error("Failed to initialize metrics: {0}")]
    MetricsInitialization(#[from] PrometheusError),
}

/// Type alias for CLI results.
pub type CliResult<T> = Result<T, CliError>;
