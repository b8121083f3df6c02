//! Flags of the chainview binary.

use anyhow::{Context, ensure};
use chainview_cli::{log::LogArgs, metrics_args::MetricsArgs};
use chainview_core::Config;
use chainview_storage::MemoryLedger;
use clap::{Args, Parser};
use std::{fs::File, num::NonZeroUsize, path::PathBuf, sync::Arc, time::Duration};

/// Global arguments for the CLI.
#[derive(Parser, Default, Clone, Debug)]
pub(crate) struct GlobalArgs {
    /// Logging arguments.
    #[command(flatten)]
    pub(crate) log_args: LogArgs,
    /// Prometheus CLI arguments.
    #[command(flatten)]
    pub(crate) metrics: MetricsArgs,
}

/// Service arguments. Unset flags keep the value from `--config`, or the default.
#[derive(Args, Default, Clone, Debug)]
pub(crate) struct ServiceArgs {
    /// Path to a JSON configuration file.
    #[arg(long = "config", env = "CHAINVIEW_CONFIG")]
    pub(crate) config: Option<PathBuf>,
    /// WebSocket url of the upstream node event feed.
    #[arg(long = "upstream.url", env = "CHAINVIEW_UPSTREAM_URL")]
    pub(crate) upstream_url: Option<String>,
    /// Logical blocks kept in the block cache.
    #[arg(long = "cache.blocks", env = "CHAINVIEW_CACHE_BLOCKS")]
    pub(crate) block_cache_capacity: Option<NonZeroUsize>,
    /// Transactions kept in the transaction cache.
    #[arg(long = "cache.transactions", env = "CHAINVIEW_CACHE_TRANSACTIONS")]
    pub(crate) transaction_cache_capacity: Option<NonZeroUsize>,
    /// Addresses kept in the balance cache.
    #[arg(long = "cache.balances", env = "CHAINVIEW_CACHE_BALANCES")]
    pub(crate) balance_cache_capacity: Option<NonZeroUsize>,
    /// Blocks a coinstake output needs before it matures.
    #[arg(long = "maturity-window", env = "CHAINVIEW_MATURITY_WINDOW")]
    pub(crate) maturity_window: Option<u32>,
    /// Seconds between slow statistics refreshes.
    #[arg(long = "refresh.interval", env = "CHAINVIEW_REFRESH_INTERVAL")]
    pub(crate) refresh_interval: Option<u64>,
    /// Workers consuming refresh jobs.
    #[arg(long = "refresh.workers", env = "CHAINVIEW_REFRESH_WORKERS")]
    pub(crate) refresh_workers: Option<usize>,
    /// Notifications buffered per subscriber before dropping.
    #[arg(long = "subscriber.buffer", env = "CHAINVIEW_SUBSCRIBER_BUFFER")]
    pub(crate) subscriber_buffer: Option<usize>,
    /// Upstream events buffered ahead of the synchronizer.
    #[arg(long = "upstream.buffer", env = "CHAINVIEW_UPSTREAM_BUFFER")]
    pub(crate) event_buffer: Option<usize>,
    /// Run over an empty in-memory ledger.
    ///
    /// No persistent ledger backend ships with this binary: every read misses and every block
    /// touches nothing. Required until one does.
    #[arg(long = "dev", env = "CHAINVIEW_DEV")]
    pub(crate) dev: bool,
}

impl ServiceArgs {
    /// Builds the ledger the service reads from.
    pub(crate) fn ledger(&self) -> anyhow::Result<Arc<MemoryLedger>> {
        ensure!(
            self.dev,
            "no ledger backend is configured; pass --dev to run over an empty in-memory ledger"
        );
        tracing::warn!(target: "chainview", "Running over an empty in-memory ledger");
        Ok(Arc::new(MemoryLedger::new()))
    }

    /// Builds the service [`Config`] from the config file and the flag overrides.
    pub(crate) fn config(&self) -> anyhow::Result<Config> {
        let mut config = match &self.config {
            Some(path) => {
                tracing::debug!(target: "chainview", ?path, "Loading config file");
                let file = File::open(path)
                    .with_context(|| format!("failed to open config file {}", path.display()))?;
                serde_json::from_reader(file)
                    .with_context(|| format!("failed to parse config file {}", path.display()))?
            }
            None => Config::default(),
        };

        if let Some(url) = &self.upstream_url {
            config.upstream_url = url.clone();
        }
        if let Some(capacity) = self.block_cache_capacity {
            config.block_cache_capacity = capacity;
        }
        if let Some(capacity) = self.transaction_cache_capacity {
            config.transaction_cache_capacity = capacity;
        }
        if let Some(capacity) = self.balance_cache_capacity {
            config.balance_cache_capacity = capacity;
        }
        if let Some(window) = self.maturity_window {
            config.maturity_window = window;
        }
        if let Some(secs) = self.refresh_interval {
            config.refresh_interval = Duration::from_secs(secs);
        }
        if let Some(workers) = self.refresh_workers {
            config.refresh_workers = workers;
        }
        if let Some(buffer) = self.subscriber_buffer {
            config.subscriber_buffer = buffer;
        }
        if let Some(buffer) = self.event_buffer {
            config.event_buffer = buffer;
        }

        config.validate().context("invalid configuration")?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use std::io::Write;

    #[derive(Parser, Debug)]
    struct TestCli {
        #[command(flatten)]
        service: ServiceArgs,
    }

    fn parse(args: &[&str]) -> ServiceArgs {
        TestCli::try_parse_from(std::iter::once("chainview").chain(args.iter().copied()))
            .unwrap()
            .service
    }

    #[test]
    fn test_defaults_without_flags() {
        let config = parse(&[]).config().unwrap();
        assert_eq!(config, Config::default());
    }

    #[test]
    fn test_flags_override_defaults() {
        let config = parse(&[
            "--upstream.url",
            "ws://node:3001",
            "--cache.blocks",
            "20",
            "--maturity-window",
            "500",
            "--refresh.interval",
            "30",
        ])
        .config()
        .unwrap();
        assert_eq!(config.upstream_url, "ws://node:3001");
        assert_eq!(config.block_cache_capacity.get(), 20);
        assert_eq!(config.maturity_window, 500);
        assert_eq!(config.refresh_interval, Duration::from_secs(30));
        assert_eq!(config.transaction_cache_capacity, Config::default().transaction_cache_capacity);
    }

    #[rstest]
    #[case::zero_capacity(&["--cache.blocks", "0"])]
    #[case::not_a_number(&["--refresh.workers", "many"])]
    fn test_rejects_malformed_flags(#[case] args: &[&str]) {
        let args = std::iter::once("chainview").chain(args.iter().copied());
        assert!(TestCli::try_parse_from(args).is_err());
    }

    #[rstest]
    #[case::zero_workers(&["--refresh.workers", "0"])]
    #[case::zero_interval(&["--refresh.interval", "0"])]
    #[case::empty_upstream(&["--upstream.url", ""])]
    fn test_rejects_invalid_config(#[case] args: &[&str]) {
        assert!(parse(args).config().is_err());
    }

    #[test]
    fn test_flags_override_config_file() {
        let path = std::env::temp_dir()
            .join(format!("chainview-flags-{}.json", std::process::id()));
        let mut file = File::create(&path).unwrap();
        file.write_all(br#"{"upstream_url": "ws://file:3001", "maturity_window": 100}"#).unwrap();

        let path_arg = path.to_str().unwrap();
        let config = parse(&["--config", path_arg, "--maturity-window", "300"]).config().unwrap();
        std::fs::remove_file(&path).unwrap();

        assert_eq!(config.upstream_url, "ws://file:3001");
        assert_eq!(config.maturity_window, 300);
    }

    #[test]
    fn test_ledger_requires_dev_flag() {
        let err = parse(&[]).ledger().unwrap_err();
        assert!(err.to_string().contains("--dev"));

        let ledger = parse(&["--dev"]).ledger().unwrap();
        assert!(ledger.rich_list().is_empty());
    }

    #[test]
    fn test_missing_config_file() {
        let err = parse(&["--config", "/nonexistent/chainview.json"]).config().unwrap_err();
        assert!(err.to_string().contains("failed to open config file"));
    }
}
