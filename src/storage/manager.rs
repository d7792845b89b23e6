use std::sync::{
    Arc,
    atomic::{AtomicU64, Ordering},
};

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::Utc;
use tracing::{debug, warn};

use crate::core::{
    error::CrawlError,
    sink::{BlockMessage, BlockSink, BlockStatus},
    state::StateStore,
    storage::KVStorage,
    table::{Block, BlockIndex, BlockIndexHistory, CrawlerState},
};
use crate::storage::schema::keys;

use super::rocksdb::RocksDBStorage;

pub struct CrawlerStateStorage {
    pub storage: Arc<RocksDBStorage>,
    pub chain: String,
}

impl CrawlerStateStorage {
    pub fn get(&self) -> Result<Option<CrawlerState>> {
        let key = keys::state_key(&self.chain);
        self.storage
            .read_json::<CrawlerState>(&key)
            .with_context(|| format!("Failed to read crawler state for chain: {}", self.chain))
    }

    pub fn update(&self, state: &CrawlerState) -> Result<()> {
        let key = keys::state_key(&self.chain);
        self.storage.write_json(&key, state)
    }

}

impl StateStore for CrawlerStateStorage {
    fn load(&self) -> Result<Option<CrawlerState>, CrawlError> {
        self.get()
            .map_err(|err| CrawlError::Persistence(format!("{err:#}")))
    }

    fn save(&self, state: &CrawlerState) -> Result<(), CrawlError> {
        self.update(state)
            .map_err(|err| CrawlError::Persistence(format!("{err:#}")))
    }
}

pub struct BlockIndexStorage {
    pub storage: Arc<RocksDBStorage>,
    pub chain: String,
}

impl BlockIndexStorage {
    pub fn get_active(&self, block_number: u64) -> Result<Option<BlockIndex>> {
        let key = keys::block_index_active_key(&self.chain, block_number);
        self.storage.read_json(&key)
    }

    pub fn get_history_list(&self, block_number: u64) -> Result<Vec<BlockIndexHistory>> {
        let prefix = keys::block_index_history_prefix(&self.chain, block_number);
        self.storage
            .scan_prefix(&prefix, None)?
            .into_iter()
            .map(|(key, value)| {
                serde_json::from_str::<BlockIndexHistory>(&value)
                    .with_context(|| format!("Failed to parse block index history: {}", key))
            })
            .collect()
    }
}

pub struct BlockDataStorage {
    pub storage: Arc<RocksDBStorage>,
    pub chain: String,
}

impl BlockDataStorage {
    pub fn get(&self, block_hash: &str) -> Result<Option<Block>> {
        let key = keys::block_key(&self.chain, block_hash);
        self.storage.read_json::<Block>(&key)
    }
}

pub struct EventLogStorage {
    pub storage: Arc<RocksDBStorage>,
    pub chain: String,
}

impl EventLogStorage {
    /// Events with `seq >= from`, in publish order.
    pub fn page(&self, from: u64, limit: usize) -> Result<Vec<BlockMessage>> {
        let start = keys::event_key(&self.chain, from);
        let prefix = keys::event_prefix(&self.chain);
        self.storage
            .scan_from(&start, &prefix, Some(limit))?
            .into_iter()
            .map(|(key, value)| {
                serde_json::from_str::<BlockMessage>(&value)
                    .with_context(|| format!("Failed to parse event: {}", key))
            })
            .collect()
    }

    /// Sequence number the next event will get.
    pub fn next_seq(&self) -> Result<u64> {
        let prefix = keys::event_prefix(&self.chain);
        match self.storage.last_with_prefix(&prefix)? {
            Some((key, _)) => keys::event_seq(&self.chain, &key)
                .map(|seq| seq + 1)
                .with_context(|| format!("Malformed event key: {}", key)),
            None => Ok(0),
        }
    }
}

/// RocksDB-backed downstream feed and state store for one chain.
pub struct CrawlerStorageManager {
    pub storage: Arc<RocksDBStorage>,
    pub state: Arc<CrawlerStateStorage>,
    pub block_index: Arc<BlockIndexStorage>,
    pub block_data: Arc<BlockDataStorage>,
    pub events: Arc<EventLogStorage>,
    chain: String,
    next_seq: AtomicU64,
}

impl CrawlerStorageManager {
    pub fn new(storage: Arc<RocksDBStorage>, chain: String) -> Result<Self> {
        let events = Arc::new(EventLogStorage {
            storage: storage.clone(),
            chain: chain.clone(),
        });
        let next_seq = events.next_seq()?;
        debug!(chain = %chain, next_seq, "Recovered event sequence");

        Ok(Self {
            state: Arc::new(CrawlerStateStorage {
                storage: storage.clone(),
                chain: chain.clone(),
            }),
            block_index: Arc::new(BlockIndexStorage {
                storage: storage.clone(),
                chain: chain.clone(),
            }),
            block_data: Arc::new(BlockDataStorage {
                storage: storage.clone(),
                chain: chain.clone(),
            }),
            events,
            storage,
            chain,
            next_seq: AtomicU64::new(next_seq),
        })
    }

    pub fn chain(&self) -> &str {
        &self.chain
    }

    fn message(&self, seq: u64, status: BlockStatus, block: &Block) -> BlockMessage {
        BlockMessage {
            seq,
            status,
            number: block.number,
            hash: block.hash.clone(),
            parent_hash: block.parent_hash.clone(),
            published_at: Utc::now(),
        }
    }

    /// Store block data, point the active index at it and append an accepted event.
    pub fn write_accepted(&self, block: &Block) -> Result<BlockMessage> {
        let seq = self.next_seq.load(Ordering::SeqCst);
        let message = self.message(seq, BlockStatus::Accepted, block);
        let index = BlockIndex {
            block_hash: block.hash.clone(),
            parent_hash: block.parent_hash.clone(),
            created_at: message.published_at,
        };

        let writes = vec![
            (
                keys::block_key(&self.chain, &block.hash),
                serde_json::to_string(block)?,
            ),
            (
                keys::block_index_active_key(&self.chain, block.number),
                serde_json::to_string(&index)?,
            ),
            (
                keys::event_key(&self.chain, seq),
                serde_json::to_string(&message)?,
            ),
        ];
        self.storage.batch_write(writes)?;
        self.next_seq.store(seq + 1, Ordering::SeqCst);
        Ok(message)
    }

    /// Retire the active index entry of a dropped block and append a dropped event.
    /// Block data stays for forensic reads.
    pub fn write_dropped(&self, block: &Block) -> Result<BlockMessage> {
        let seq = self.next_seq.load(Ordering::SeqCst);
        let message = self.message(seq, BlockStatus::Dropped, block);

        let mut writes = Vec::new();
        let mut deletes = Vec::new();

        match self.block_index.get_active(block.number)? {
            Some(active) if active.block_hash == block.hash => {
                let history = BlockIndexHistory {
                    block_hash: active.block_hash,
                    parent_hash: active.parent_hash,
                    created_at: active.created_at,
                    is_active: false,
                    version: seq,
                    replaced_at: Some(message.published_at),
                };
                writes.push((
                    keys::block_index_history_key(&self.chain, block.number, history.version),
                    serde_json::to_string(&history)?,
                ));
                deletes.push(keys::block_index_active_key(&self.chain, block.number));
            }
            Some(active) => {
                warn!(
                    number = block.number,
                    dropped = %block.hash,
                    active = %active.block_hash,
                    "Active index already points elsewhere, leaving it"
                );
            }
            None => {}
        }

        writes.push((
            keys::event_key(&self.chain, seq),
            serde_json::to_string(&message)?,
        ));
        self.storage.batch_write_delete(writes, deletes)?;
        self.next_seq.store(seq + 1, Ordering::SeqCst);
        Ok(message)
    }
}

#[async_trait]
impl BlockSink for CrawlerStorageManager {
    async fn publish(&self, status: BlockStatus, block: &Block) -> Result<(), CrawlError> {
        let written = match status {
            BlockStatus::Accepted => self.write_accepted(block),
            BlockStatus::Dropped => self.write_dropped(block),
        };
        written
            .map(|message| {
                debug!(seq = message.seq, status = %status, number = block.number, "Event stored");
            })
            .map_err(|err| CrawlError::Publish {
                status,
                number: block.number,
                reason: format!("{err:#}"),
            })
    }
}
