use std::sync::Arc;

use tracing::error;

use crate::{
    config::CrawlerConfig,
    core::{
        error::CrawlError,
        sink::{BlockSink, BlockStatus},
        source::BlockSource,
        state::StateStore,
        table::Block,
    },
    utils::{
        metrics::CrawlerMetrics,
        retry::{RetryConfig, retry_async},
    },
};

/// Handles shared by the crawler, its checker and every sync task.
#[derive(Clone)]
pub struct CrawlerContext {
    pub config: Arc<CrawlerConfig>,
    pub source: Arc<dyn BlockSource>,
    pub sink: Arc<dyn BlockSink>,
    pub state: Arc<dyn StateStore>,
    pub metrics: Arc<dyn CrawlerMetrics>,
}

impl CrawlerContext {
    pub fn new(
        config: Arc<CrawlerConfig>,
        source: Arc<dyn BlockSource>,
        sink: Arc<dyn BlockSink>,
        state: Arc<dyn StateStore>,
        metrics: Arc<dyn CrawlerMetrics>,
    ) -> Self {
        Self {
            config,
            source,
            sink,
            state,
            metrics,
        }
    }

    pub fn chain_name(&self) -> &str {
        &self.config.chain_name
    }

    /// Publish with retries. The final failure is logged, counted and returned;
    /// callers decide whether to keep going.
    pub async fn publish(&self, status: BlockStatus, block: &Block) -> Result<(), CrawlError> {
        let label = format!("publish {} block {}", status, block.number);
        let retry = RetryConfig::with_retries(
            self.config.publish_retries,
            self.config.publish_retry_delay(),
        );

        retry_async(&label, || self.sink.publish(status, block), retry)
            .await
            .map_err(|err| {
                error!(
                    number = block.number,
                    hash = %block.hash,
                    %status,
                    error = %err,
                    "Failed to publish block"
                );
                self.metrics.record_publish_failure(status);
                match err {
                    CrawlError::Publish { .. } => err,
                    other => CrawlError::Publish {
                        status,
                        number: block.number,
                        reason: other.to_string(),
                    },
                }
            })
    }
}
