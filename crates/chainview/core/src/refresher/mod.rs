//! Periodic recomputation of slow chain-wide aggregates.

mod job;
pub use job::RefreshJob;

mod metric_cache;
pub use metric_cache::MetricCache;

mod worker;
pub use worker::{RefreshError, RefreshOutcome, RefreshTrigger, StatisticsRefresher, run_schedule};
