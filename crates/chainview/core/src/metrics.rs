//! Metric names and recording helpers.

#[derive(Debug, Clone)]
pub(crate) struct Metrics;

impl Metrics {
    pub(crate) const TIP_UPDATES_TOTAL: &'static str = "chainview_tip_updates_total";
    pub(crate) const TIP_HEIGHT: &'static str = "chainview_tip_height";
    pub(crate) const STALE_EVENTS_TOTAL: &'static str = "chainview_stale_events_total";
    pub(crate) const MALFORMED_EVENTS_TOTAL: &'static str = "chainview_malformed_events_total";
    pub(crate) const REORGS_TOTAL: &'static str = "chainview_reorgs_total";
    pub(crate) const REORG_DEPTH: &'static str = "chainview_reorg_depth";
    pub(crate) const INVALIDATED_BLOCKS_TOTAL: &'static str = "chainview_invalidated_blocks_total";
    pub(crate) const INVALIDATION_MISSES_TOTAL: &'static str =
        "chainview_invalidation_misses_total";
    pub(crate) const CACHE_HITS_TOTAL: &'static str = "chainview_cache_hits_total";
    pub(crate) const CACHE_MISSES_TOTAL: &'static str = "chainview_cache_misses_total";
    pub(crate) const CACHE_STALE_TOTAL: &'static str = "chainview_cache_stale_total";
    pub(crate) const BROADCAST_DELIVERED_TOTAL: &'static str =
        "chainview_broadcast_delivered_total";
    pub(crate) const BROADCAST_DROPPED_TOTAL: &'static str = "chainview_broadcast_dropped_total";
    pub(crate) const REFRESH_SUCCESS_TOTAL: &'static str = "chainview_refresh_success_total";
    pub(crate) const REFRESH_ERROR_TOTAL: &'static str = "chainview_refresh_error_total";
    pub(crate) const HANDLER_ERROR_TOTAL: &'static str = "chainview_handler_error_total";
    pub(crate) const UPSTREAM_RECONNECTS_TOTAL: &'static str =
        "chainview_upstream_reconnects_total";

    pub(crate) const CACHE_BLOCK: &'static str = "block";
    pub(crate) const CACHE_TRANSACTION: &'static str = "transaction";
    pub(crate) const CACHE_BALANCE: &'static str = "balance";

    /// Describes and zeroes every metric.
    pub(crate) fn init() {
        Self::describe();
        Self::zero();
    }

    fn describe() {
        metrics::describe_counter!(
            Self::TIP_UPDATES_TOTAL,
            metrics::Unit::Count,
            "Number of times the current tip was replaced",
        );
        metrics::describe_gauge!(Self::TIP_HEIGHT, "Height of the current tip");
        metrics::describe_counter!(
            Self::STALE_EVENTS_TOTAL,
            metrics::Unit::Count,
            "Upstream events dropped because they did not advance the tip",
        );
        metrics::describe_counter!(
            Self::MALFORMED_EVENTS_TOTAL,
            metrics::Unit::Count,
            "Upstream events dropped because their payload could not be decoded",
        );
        metrics::describe_counter!(
            Self::REORGS_TOTAL,
            metrics::Unit::Count,
            "Number of processed reorgs",
        );
        metrics::describe_histogram!(
            Self::REORG_DEPTH,
            metrics::Unit::Count,
            "Number of heights retired by a reorg",
        );
        metrics::describe_counter!(
            Self::INVALIDATED_BLOCKS_TOTAL,
            metrics::Unit::Count,
            "Block cache entries evicted by reorg invalidation",
        );
        metrics::describe_counter!(
            Self::INVALIDATION_MISSES_TOTAL,
            metrics::Unit::Count,
            "Retired heights that had no block cache entry",
        );
        metrics::describe_counter!(
            Self::CACHE_HITS_TOTAL,
            metrics::Unit::Count,
            "Derived-state cache hits",
        );
        metrics::describe_counter!(
            Self::CACHE_MISSES_TOTAL,
            metrics::Unit::Count,
            "Derived-state cache misses",
        );
        metrics::describe_counter!(
            Self::CACHE_STALE_TOTAL,
            metrics::Unit::Count,
            "Cache entries evicted on read because the ledger disagreed with them",
        );
        metrics::describe_counter!(
            Self::BROADCAST_DELIVERED_TOTAL,
            metrics::Unit::Count,
            "Notifications queued to subscribers",
        );
        metrics::describe_counter!(
            Self::BROADCAST_DROPPED_TOTAL,
            metrics::Unit::Count,
            "Notifications dropped because a subscriber queue was full",
        );
        metrics::describe_counter!(
            Self::REFRESH_SUCCESS_TOTAL,
            metrics::Unit::Count,
            "Successful statistics refresh jobs",
        );
        metrics::describe_counter!(
            Self::REFRESH_ERROR_TOTAL,
            metrics::Unit::Count,
            "Failed statistics refresh jobs",
        );
        metrics::describe_counter!(
            Self::HANDLER_ERROR_TOTAL,
            metrics::Unit::Count,
            "Chain event handlers that returned an error",
        );
        metrics::describe_counter!(
            Self::UPSTREAM_RECONNECTS_TOTAL,
            metrics::Unit::Count,
            "Upstream subscriptions re-established after a failure",
        );
    }

    fn zero() {
        metrics::counter!(Self::TIP_UPDATES_TOTAL).increment(0);
        metrics::gauge!(Self::TIP_HEIGHT).set(0.0);
        metrics::counter!(Self::STALE_EVENTS_TOTAL).increment(0);
        metrics::counter!(Self::MALFORMED_EVENTS_TOTAL).increment(0);
        metrics::counter!(Self::REORGS_TOTAL).increment(0);
        metrics::histogram!(Self::REORG_DEPTH).record(0);
        metrics::counter!(Self::INVALIDATED_BLOCKS_TOTAL).increment(0);
        metrics::counter!(Self::INVALIDATION_MISSES_TOTAL).increment(0);
        for cache in [Self::CACHE_BLOCK, Self::CACHE_TRANSACTION, Self::CACHE_BALANCE] {
            metrics::counter!(Self::CACHE_HITS_TOTAL, "cache" => cache).increment(0);
            metrics::counter!(Self::CACHE_MISSES_TOTAL, "cache" => cache).increment(0);
        }
        metrics::counter!(Self::CACHE_STALE_TOTAL).increment(0);
        metrics::counter!(Self::BROADCAST_DELIVERED_TOTAL).increment(0);
        metrics::counter!(Self::BROADCAST_DROPPED_TOTAL).increment(0);
        metrics::counter!(Self::UPSTREAM_RECONNECTS_TOTAL).increment(0);
    }

    pub(crate) fn record_cache_lookup(cache: &'static str, hit: bool) {
        if hit {
            metrics::counter!(Self::CACHE_HITS_TOTAL, "cache" => cache).increment(1);
        } else {
            metrics::counter!(Self::CACHE_MISSES_TOTAL, "cache" => cache).increment(1);
        }
    }

    pub(crate) fn record_tip(height: u32) {
        metrics::counter!(Self::TIP_UPDATES_TOTAL).increment(1);
        metrics::gauge!(Self::TIP_HEIGHT).set(f64::from(height));
    }

    pub(crate) fn record_reorg(depth: u32, evicted: usize, missed: u32) {
        metrics::counter!(Self::REORGS_TOTAL).increment(1);
        metrics::histogram!(Self::REORG_DEPTH).record(f64::from(depth));
        metrics::counter!(Self::INVALIDATED_BLOCKS_TOTAL).increment(evicted as u64);
        metrics::counter!(Self::INVALIDATION_MISSES_TOTAL).increment(u64::from(missed));
    }

    pub(crate) fn record_refresh(job: &'static str, success: bool) {
        if success {
            metrics::counter!(Self::REFRESH_SUCCESS_TOTAL, "job" => job).increment(1);
        } else {
            metrics::counter!(Self::REFRESH_ERROR_TOTAL, "job" => job).increment(1);
        }
    }
}
