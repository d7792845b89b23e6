use std::time::Duration;

use crate::core::{error::CrawlError, sink::BlockStatus};

/// Categorizes block fetch failures for metrics reporting.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BlockFetchFailureReason {
    NotFound,
    Rpc,
    Timeout,
    Decode,
}

impl BlockFetchFailureReason {
    pub fn from_error(err: &CrawlError) -> Self {
        match err {
            CrawlError::NotFound(_) => Self::NotFound,
            CrawlError::Timeout(_) => Self::Timeout,
            CrawlError::Decode { .. } => Self::Decode,
            _ => Self::Rpc,
        }
    }

    fn label(self) -> &'static str {
        match self {
            BlockFetchFailureReason::NotFound => "not_found",
            BlockFetchFailureReason::Rpc => "rpc_error",
            BlockFetchFailureReason::Timeout => "timeout",
            BlockFetchFailureReason::Decode => "decode",
        }
    }
}

/// Abstraction over crawler runtime metrics, allowing a no-op implementation when disabled.
pub trait CrawlerMetrics: Send + Sync {
    fn record_block_fetch_success(&self);
    fn record_block_fetch_failure(&self, reason: BlockFetchFailureReason);
    fn record_block_accepted(&self, number: u64);
    fn record_reorg(&self, depth: u64);
    fn record_blocks_dropped(&self, count: u64);
    fn record_publish_failure(&self, status: BlockStatus);
    fn record_sync_gap(&self, gap: u64);
    fn record_tick(&self, duration: Duration, scheduled: u64);
}

#[derive(Default)]
pub struct NoopCrawlerMetrics;

impl NoopCrawlerMetrics {
    pub fn new() -> Self {
        Self
    }
}

impl CrawlerMetrics for NoopCrawlerMetrics {
    fn record_block_fetch_success(&self) {}

    fn record_block_fetch_failure(&self, _reason: BlockFetchFailureReason) {}

    fn record_block_accepted(&self, _number: u64) {}

    fn record_reorg(&self, _depth: u64) {}

    fn record_blocks_dropped(&self, _count: u64) {}

    fn record_publish_failure(&self, _status: BlockStatus) {}

    fn record_sync_gap(&self, _gap: u64) {}

    fn record_tick(&self, _duration: Duration, _scheduled: u64) {}
}

pub struct PrometheusCrawlerMetrics {
    chain: String,
}

impl PrometheusCrawlerMetrics {
    pub fn new(chain: impl Into<String>) -> Self {
        Self {
            chain: chain.into(),
        }
    }
}

impl CrawlerMetrics for PrometheusCrawlerMetrics {
    fn record_block_fetch_success(&self) {
        let chain = self.chain.clone();
        metrics::counter!(
            "spider_block_fetch_success_total",
            1,
            "chain" => chain
        );
    }

    fn record_block_fetch_failure(&self, reason: BlockFetchFailureReason) {
        let chain = self.chain.clone();
        metrics::counter!(
            "spider_block_fetch_failure_total",
            1,
            "chain" => chain,
            "reason" => reason.label()
        );
    }

    fn record_block_accepted(&self, number: u64) {
        let chain = self.chain.clone();
        metrics::counter!(
            "spider_blocks_accepted_total",
            1,
            "chain" => chain.clone()
        );
        metrics::gauge!(
            "spider_head_block",
            number as f64,
            "chain" => chain
        );
    }

    fn record_reorg(&self, depth: u64) {
        let chain = self.chain.clone();
        metrics::counter!(
            "spider_reorgs_total",
            1,
            "chain" => chain.clone()
        );
        metrics::gauge!(
            "spider_last_reorg_depth",
            depth as f64,
            "chain" => chain
        );
    }

    fn record_blocks_dropped(&self, count: u64) {
        if count == 0 {
            return;
        }
        let chain = self.chain.clone();
        metrics::counter!(
            "spider_blocks_dropped_total",
            count,
            "chain" => chain
        );
    }

    fn record_publish_failure(&self, status: BlockStatus) {
        let chain = self.chain.clone();
        metrics::counter!(
            "spider_publish_failure_total",
            1,
            "chain" => chain,
            "status" => status.as_str()
        );
    }

    fn record_sync_gap(&self, gap: u64) {
        let chain = self.chain.clone();
        metrics::gauge!(
            "spider_sync_gap_blocks",
            gap as f64,
            "chain" => chain
        );
    }

    fn record_tick(&self, duration: Duration, scheduled: u64) {
        let chain = self.chain.clone();
        metrics::histogram!(
            "spider_tick_seconds",
            duration.as_secs_f64(),
            "chain" => chain.clone()
        );
        if scheduled > 0 {
            metrics::counter!(
                "spider_blocks_scheduled_total",
                scheduled,
                "chain" => chain
            );
        }
    }
}
