use async_trait::async_trait;

use crate::core::{
    error::CrawlError,
    table::{Block, BlockHeader},
};

/// Remote chain the crawler follows.
///
/// A missing block is reported as [`CrawlError::NotFound`].
#[async_trait]
pub trait BlockSource: Send + Sync {
    async fn latest_height(&self) -> Result<u64, CrawlError>;

    async fn block_by_height(&self, number: u64) -> Result<Block, CrawlError>;

    async fn block_by_hash(&self, hash: &str) -> Result<Block, CrawlError>;

    /// Identity of the block at `number`. Sources that can skip transaction
    /// bodies and receipts should override this.
    async fn header_by_height(&self, number: u64) -> Result<BlockHeader, CrawlError> {
        self.block_by_height(number).await.map(|block| block.header())
    }
}
