//! Contains the chainview CLI.

use crate::flags::{GlobalArgs, ServiceArgs};
use anyhow::{Context, Result};
use chainview_cli::init_tracing_subscriber_with;
use chainview_core::{ChainviewService, Config, upstream::WsUpstreamClient};
use chainview_storage::{LedgerReader, RichListStore, StatisticsSource};
use clap::Parser;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// Chain-tip synchronizer and derived-state cache of the chainview explorer.
#[derive(Parser, Clone, Debug)]
#[command(author, version, about, long_about = None)]
pub(crate) struct Cli {
    /// Global arguments for the CLI.
    #[command(flatten)]
    pub(crate) global: GlobalArgs,
    /// Service arguments.
    #[command(flatten)]
    pub(crate) service: ServiceArgs,
}

impl Cli {
    /// Runs the CLI.
    pub(crate) fn run(self) -> Result<()> {
        // Initialize the telemetry stack.
        Self::init_stack(&self.global)?;

        let config = self.service.config()?;
        let ledger = self.service.ledger()?;
        Self::run_until_ctrl_c(Self::start(config, ledger))
    }

    /// Initialize the tracing stack and Prometheus metrics recorder.
    pub(crate) fn init_stack(global: &GlobalArgs) -> Result<()> {
        init_tracing_subscriber_with(global.log_args.v, global.log_args.json, None)?;
        global.metrics.init_metrics()?;
        Ok(())
    }

    /// Starts the service and runs it until a shutdown signal arrives.
    pub(crate) async fn start<L>(config: Config, ledger: Arc<L>) -> Result<()>
    where
        L: LedgerReader + RichListStore + StatisticsSource + 'static,
    {
        info!(
            target: "chainview",
            upstream = %config.upstream_url,
            maturity_window = config.maturity_window,
            "Starting chainview"
        );
        let client = Arc::new(WsUpstreamClient::new(config.upstream_url.clone()));
        let service =
            ChainviewService::new(config, ledger, client).context("failed to build service")?;

        let cancel = CancellationToken::new();
        let signal = cancel.clone();
        tokio::spawn(async move {
            shutdown_signal().await;
            signal.cancel();
        });

        service.run(cancel).await.context("service stopped with an error")
    }

    /// Run until ctrl-c is pressed.
    pub(crate) fn run_until_ctrl_c<F>(fut: F) -> Result<()>
    where
        F: std::future::Future<Output = Result<()>>,
    {
        let rt = Self::tokio_runtime().context("failed to build tokio runtime")?;
        rt.block_on(fut)
    }

    /// Creates a new default tokio multi-thread [Runtime](tokio::runtime::Runtime) with all
    /// features enabled.
    pub(crate) fn tokio_runtime() -> Result<tokio::runtime::Runtime, std::io::Error> {
        tokio::runtime::Builder::new_multi_thread().enable_all().build()
    }
}

/// Waits for SIGINT or, on unix, SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            warn!(target: "chainview", %err, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(err) => {
                warn!(target: "chainview", %err, "Failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!(target: "chainview", "Received SIGINT (Ctrl+C)"),
        _ = terminate => info!(target: "chainview", "Received SIGTERM"),
    }
}
