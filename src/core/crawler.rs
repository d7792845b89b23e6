use async_trait::async_trait;
use serde::Serialize;
use tokio::sync::broadcast;

use crate::core::{error::CrawlError, table::CrawlerState};

/// Summary of a resolved reorg.
#[derive(Serialize, Debug, Clone, PartialEq, Eq)]
pub struct ReorgReport {
    /// Height of the common ancestor
    pub common_ancestor: u64,
    pub dropped: u64,
    pub added: u64,
    pub publish_failures: u64,
}

/// Result of one crawl tick.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TickOutcome {
    /// A previous tick was still running.
    Skipped,
    /// The remote head is not ahead of the local head.
    UpToDate { head: u64 },
    /// New blocks were processed. When a reorg was resolved the batch stopped
    /// early and the rest of the range is picked up by the next tick.
    Advanced {
        accepted: u64,
        head: u64,
        publish_failures: u64,
        reorg: Option<ReorgReport>,
    },
}

#[async_trait]
pub trait Crawler: Send + Sync {
    /// Restore state or seed the cache with the start block.
    async fn init(&self) -> Result<CrawlerState, CrawlError>;

    async fn tick(&self) -> Result<TickOutcome, CrawlError>;

    /// Tick on an interval until shutdown or a fatal error.
    async fn run(&self, shutdown: broadcast::Receiver<()>) -> Result<(), CrawlError>;
}
