use std::sync::Arc;

use anyhow::{Context, Result};

use crate::{
    core::{
        sink::BlockMessage,
        storage::KVStorage,
        table::{Block, BlockIndex, CrawlerState},
    },
    storage::{
        manager::{BlockDataStorage, BlockIndexStorage, CrawlerStateStorage, EventLogStorage},
        rocksdb::RocksDBStorage,
    },
};

/// Read-only view of a crawler database, safe to open next to a running crawler.
pub struct ApiStorage {
    db: Arc<RocksDBStorage>,
    state: CrawlerStateStorage,
    block_index: BlockIndexStorage,
    block_data: BlockDataStorage,
    events: EventLogStorage,
    chain: String,
}

impl ApiStorage {
    pub fn open_readonly(path: &str, chain: impl Into<String>) -> Result<Self> {
        let db = Arc::new(
            RocksDBStorage::open_read_only(path)
                .with_context(|| format!("Failed to open RocksDB at {path}"))?,
        );
        let chain = chain.into();
        Ok(Self {
            state: CrawlerStateStorage {
                storage: db.clone(),
                chain: chain.clone(),
            },
            block_index: BlockIndexStorage {
                storage: db.clone(),
                chain: chain.clone(),
            },
            block_data: BlockDataStorage {
                storage: db.clone(),
                chain: chain.clone(),
            },
            events: EventLogStorage {
                storage: db.clone(),
                chain: chain.clone(),
            },
            db,
            chain,
        })
    }

    pub fn read_raw(&self, key: &str) -> Result<Option<String>> {
        self.db.read(key)
    }

    pub fn read_state(&self) -> Result<Option<CrawlerState>> {
        self.state.get()
    }

    /// Active index entry at `number` together with the stored block, if any.
    pub fn read_block(&self, number: u64) -> Result<Option<(BlockIndex, Option<Block>)>> {
        let Some(index) = self.block_index.get_active(number)? else {
            return Ok(None);
        };
        let block = self.block_data.get(&index.block_hash)?;
        Ok(Some((index, block)))
    }

    pub fn read_events(&self, from: u64, limit: usize) -> Result<Vec<BlockMessage>> {
        self.events.page(from, limit)
    }

    pub fn chain(&self) -> &str {
        &self.chain
    }
}
