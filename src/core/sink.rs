use std::fmt;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::core::{error::CrawlError, table::Block};

/// What happened to a block from the point of view of downstream consumers.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BlockStatus {
    /// Block joined the canonical chain
    Accepted,
    /// Block was removed by a reorg
    Dropped,
}

impl BlockStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            BlockStatus::Accepted => "accepted",
            BlockStatus::Dropped => "dropped",
        }
    }
}

impl fmt::Display for BlockStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Entry of the ordered downstream event feed.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct BlockMessage {
    pub seq: u64,
    pub status: BlockStatus,
    pub number: u64,
    pub hash: String,
    pub parent_hash: String,
    pub published_at: DateTime<Utc>,
}

/// Downstream publisher for accepted and dropped blocks.
///
/// Called from ordered sections only, so calls for one crawler never overlap.
#[async_trait]
pub trait BlockSink: Send + Sync {
    async fn publish(&self, status: BlockStatus, block: &Block) -> Result<(), CrawlError>;
}
