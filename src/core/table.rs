use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One chain block as accepted by the crawler.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Block {
    pub number: u64,
    pub hash: String,
    /// Back-reference to the previous block, used for linkage checks only
    pub parent_hash: String,
    pub timestamp: u64,
    pub miner: String,
    pub gas_used: u64,
    pub gas_limit: u64,
    /// Decimal wei, absent before London
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_fee_per_gas: Option<String>,
    #[serde(default)]
    pub difficulty: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total_difficulty: Option<String>,
    #[serde(default)]
    pub state_root: String,
    #[serde(default)]
    pub transactions_root: String,
    #[serde(default)]
    pub receipts_root: String,
    #[serde(default)]
    pub extra_data: String,
    #[serde(default)]
    pub uncles: Vec<String>,
    #[serde(default)]
    pub transactions: Vec<Transaction>,
    #[serde(default)]
    pub logs: Vec<Log>,
}

impl Block {
    pub fn txn_count(&self) -> usize {
        self.transactions.len()
    }

    pub fn log_count(&self) -> usize {
        self.logs.len()
    }

    pub fn header(&self) -> BlockHeader {
        BlockHeader {
            number: self.number,
            hash: self.hash.clone(),
            parent_hash: self.parent_hash.clone(),
        }
    }
}

/// Minimal identity of a block, enough for linkage checks.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct BlockHeader {
    pub number: u64,
    pub hash: String,
    pub parent_hash: String,
}

/// Transaction merged with its receipt.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Transaction {
    pub hash: String,
    pub index: u64,
    pub from: String,
    /// None for contract creation
    pub to: Option<String>,
    /// Decimal wei
    pub value: String,
    pub nonce: u64,
    pub gas: u64,
    #[serde(default)]
    pub gas_price: Option<u64>,
    #[serde(default)]
    pub max_fee_per_gas: Option<u64>,
    #[serde(default)]
    pub max_priority_fee_per_gas: Option<u64>,
    #[serde(default)]
    pub tx_type: Option<u64>,
    // receipt fields
    pub status: Option<u64>,
    pub gas_used: u64,
    pub cumulative_gas_used: u64,
    #[serde(default)]
    pub effective_gas_price: Option<u64>,
    #[serde(default)]
    pub created_contract: Option<String>,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Log {
    pub address: String,
    pub topics: Vec<String>,
    pub data: String,
    pub index: u64,
    pub transaction_hash: String,
    pub transaction_index: u64,
}

/// Crawler status enumeration for type-safe status management
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
pub enum CrawlerStatus {
    /// Initialized, no tick completed yet
    Idle,
    /// Behind the remote head
    Syncing,
    /// Caught up with the remote head
    Synced,
    /// Last tick resolved a reorg
    ReorgDetected,
    /// Last tick ended with an error
    Error,
}

impl CrawlerStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            CrawlerStatus::Idle => "idle",
            CrawlerStatus::Syncing => "syncing",
            CrawlerStatus::Synced => "synced",
            CrawlerStatus::ReorgDetected => "reorg_detected",
            CrawlerStatus::Error => "error",
        }
    }
}

/// Persisted crawler state, one record per chain.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct CrawlerState {
    /// Chain name (e.g. "ethereum", "bsc")
    pub chain: String,

    /// Chain id the state was built against
    #[serde(default)]
    pub chain_id: Option<u64>,

    /// Most recently accepted block
    pub head: Block,

    /// Head-first snapshot of the block cache
    #[serde(default)]
    pub cache: Vec<Block>,

    pub status: CrawlerStatus,

    #[serde(default)]
    pub reorg_count: u64,

    /// Height of the common ancestor of the latest reorg
    #[serde(default)]
    pub last_reorg_block: Option<u64>,

    pub updated_at: DateTime<Utc>,

    /// Data version number, for future schema compatibility upgrade
    pub version: u32,
}

impl CrawlerState {
    pub fn new(chain: impl Into<String>, chain_id: Option<u64>, head: Block, version: u32) -> Self {
        Self {
            chain: chain.into(),
            chain_id,
            cache: vec![head.clone()],
            head,
            status: CrawlerStatus::Idle,
            reorg_count: 0,
            last_reorg_block: None,
            updated_at: Utc::now(),
            version,
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct BlockIndex {
    pub block_hash: String,
    pub parent_hash: String, // parent block hash, for rollback verification
    pub created_at: DateTime<Utc>,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct BlockIndexHistory {
    pub block_hash: String,
    pub parent_hash: String,
    pub created_at: DateTime<Utc>,
    pub is_active: bool,
    pub version: u64,                       // event seq of the drop
    pub replaced_at: Option<DateTime<Utc>>, // replaced at
}
