//! Logging arguments and tracing subscriber setup.

use crate::CliResult;
use clap::{ArgAction, Args};
use tracing_subscriber::{
    EnvFilter, fmt,
    filter::LevelFilter,
    prelude::*,
};

/// Logging arguments.
#[derive(Args, Default, Clone, Debug)]
pub struct LogArgs {
    /// Verbosity level: unset for `info`, `-v` for `debug`, `-vv` for `trace`.
    #[arg(long = "verbosity", short = 'v', global = true, action = ArgAction::Count)]
    pub v: u8,

    /// Emit logs as JSON lines.
    #[arg(long = "log.json", env = "CHAINVIEW_LOG_JSON", global = true)]
    pub json: bool,
}

/// Maps a `-v` count to the default log level.
pub const fn verbosity_level(verbosity: u8) -> LevelFilter {
    match verbosity {
        0 => LevelFilter::INFO,
        1 => LevelFilter::DEBUG,
        _ => LevelFilter::TRACE,
    }
}

/// Installs the global tracing subscriber.
///
/// Without an explicit `filter`, directives are read from `RUST_LOG` and default to the level
/// selected by `verbosity`.
pub fn init_tracing_subscriber(verbosity: u8, filter: Option<EnvFilter>) -> CliResult<()> {
    init_tracing_subscriber_with(verbosity, false, filter)
}

/// Same as [`init_tracing_subscriber`], optionally formatting events as JSON.
pub fn init_tracing_subscriber_with(
    verbosity: u8,
    json: bool,
    filter: Option<EnvFilter>,
) -> CliResult<()> {
    let filter = match filter {
        Some(filter) => filter,
        None => EnvFilter::builder()
            .with_default_directive(verbosity_level(verbosity).into())
            .from_env()?,
    };

    let registry = tracing_subscriber::registry().with(filter);
    if json {
        registry.with(fmt::layer().json()).try_init()?;
    } else {
        registry.with(fmt::layer()).try_init()?;
    }
    Ok(())
}
