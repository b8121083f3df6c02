//! Process-level helpers shared by chainview binaries: logging, metrics export and backtraces.

pub mod backtrace;

mod error;
pub use error::{CliError, CliResult, PrometheusError};

pub mod log;
pub use log::{init_tracing_subscriber, init_tracing_subscriber_with};

pub mod metrics_args;

mod prometheus;
pub use prometheus::init_prometheus_server;
