//! Prometheus metrics arguments.

use crate::{CliResult, init_prometheus_server};
use clap::Args;
use std::net::{IpAddr, Ipv4Addr};

/// Prometheus metrics arguments.
#[derive(Args, Clone, Debug)]
pub struct MetricsArgs {
    /// Serve Prometheus metrics.
    #[arg(long = "metrics.enabled", env = "CHAINVIEW_METRICS_ENABLED", default_value_t = false)]
    pub enabled: bool,

    /// Address the metrics server listens on.
    #[arg(long = "metrics.addr", env = "CHAINVIEW_METRICS_ADDR", default_value = "0.0.0.0")]
    pub addr: IpAddr,

    /// Port the metrics server listens on.
    #[arg(long = "metrics.port", env = "CHAINVIEW_METRICS_PORT", default_value_t = 9090)]
    pub port: u16,
}

impl Default for MetricsArgs {
    fn default() -> Self {
        Self { enabled: false, addr: IpAddr::V4(Ipv4Addr::UNSPECIFIED), port: 9090 }
    }
}

impl MetricsArgs {
    /// Starts the exporter when metrics are enabled.
    pub fn init_metrics(&self) -> CliResult<()> {
        if self.enabled {
            init_prometheus_server(self.addr, self.port)?;
        }
        Ok(())
    }
}
