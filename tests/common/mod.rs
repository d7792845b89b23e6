#![allow(dead_code)]

use std::{
    collections::{BTreeMap, HashSet},
    sync::{
        Arc, Mutex,
        atomic::{AtomicBool, AtomicU64, Ordering},
    },
    time::Duration,
};

use async_trait::async_trait;
use rand::Rng;
use rs_block_spider::{
    chains::evm::{context::CrawlerContext, crawler::EvmCrawler, import_log::ImportLogger},
    config::CrawlerConfig,
    core::{
        error::CrawlError,
        sink::{BlockSink, BlockStatus},
        source::BlockSource,
        state::StateStore,
        table::{Block, CrawlerState},
    },
    utils::metrics::NoopCrawlerMetrics,
};

pub fn block(number: u64, hash: &str, parent: &str) -> Block {
    Block {
        number,
        hash: hash.to_string(),
        parent_hash: parent.to_string(),
        timestamp: 1_700_000_000 + number * 12,
        miner: "0x0000000000000000000000000000000000000000".to_string(),
        gas_used: 0,
        gas_limit: 30_000_000,
        base_fee_per_gas: None,
        difficulty: "0".to_string(),
        total_difficulty: None,
        state_root: String::new(),
        transactions_root: String::new(),
        receipts_root: String::new(),
        extra_data: String::new(),
        uncles: Vec::new(),
        transactions: Vec::new(),
        logs: Vec::new(),
    }
}

pub fn hash_of(tag: &str, number: u64) -> String {
    format!("0x{tag}{number}")
}

/// Remote chain held in memory. Reads sleep a random few milliseconds so
/// concurrent fetches finish out of order.
#[derive(Default)]
pub struct MockSource {
    chain: Mutex<BTreeMap<u64, Block>>,
    failing: Mutex<HashSet<u64>>,
    latest_delay: Mutex<Duration>,
    pub fetches: AtomicU64,
}

impl MockSource {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn insert(&self, block: Block) {
        self.chain.lock().unwrap().insert(block.number, block);
    }

    /// Append linked blocks `from..=to` tagged `tag`, parented on whatever sits at `from - 1`.
    pub fn extend(&self, from: u64, to: u64, tag: &str) {
        let mut chain = self.chain.lock().unwrap();
        for n in from..=to {
            let parent = chain
                .get(&(n.wrapping_sub(1)))
                .map(|b| b.hash.clone())
                .unwrap_or_else(|| "0xgenesis".to_string());
            chain.insert(n, block(n, &hash_of(tag, n), &parent));
        }
    }

    /// Drop every block above `height`.
    pub fn truncate(&self, height: u64) {
        self.chain.lock().unwrap().retain(|n, _| *n <= height);
    }

    pub fn hash_at(&self, number: u64) -> Option<String> {
        self.chain.lock().unwrap().get(&number).map(|b| b.hash.clone())
    }

    pub fn fail_at(&self, number: u64) {
        self.failing.lock().unwrap().insert(number);
    }

    pub fn heal(&self) {
        self.failing.lock().unwrap().clear();
    }

    pub fn set_latest_delay(&self, delay: Duration) {
        *self.latest_delay.lock().unwrap() = delay;
    }

    async fn jitter() {
        let ms = rand::rng().random_range(0..5);
        tokio::time::sleep(Duration::from_millis(ms)).await;
    }
}

#[async_trait]
impl BlockSource for MockSource {
    async fn latest_height(&self) -> Result<u64, CrawlError> {
        let delay = *self.latest_delay.lock().unwrap();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        self.chain
            .lock()
            .unwrap()
            .keys()
            .next_back()
            .copied()
            .ok_or_else(|| CrawlError::fetch("latest block number", "empty chain"))
    }

    async fn block_by_height(&self, number: u64) -> Result<Block, CrawlError> {
        Self::jitter().await;
        self.fetches.fetch_add(1, Ordering::Relaxed);
        if self.failing.lock().unwrap().contains(&number) {
            return Err(CrawlError::fetch(number, "connection reset"));
        }
        self.chain
            .lock()
            .unwrap()
            .get(&number)
            .cloned()
            .ok_or_else(|| CrawlError::NotFound(number.to_string()))
    }

    async fn block_by_hash(&self, hash: &str) -> Result<Block, CrawlError> {
        Self::jitter().await;
        self.chain
            .lock()
            .unwrap()
            .values()
            .find(|b| b.hash == hash)
            .cloned()
            .ok_or_else(|| CrawlError::NotFound(hash.to_string()))
    }
}

/// Sink that records every publish, optionally failing all of them.
#[derive(Default)]
pub struct RecordingSink {
    published: Mutex<Vec<(BlockStatus, u64, String)>>,
    failing: AtomicBool,
    pub attempts: AtomicU64,
}

impl RecordingSink {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    pub fn published(&self) -> Vec<(BlockStatus, u64, String)> {
        self.published.lock().unwrap().clone()
    }

    pub fn accepted_numbers(&self) -> Vec<u64> {
        self.published()
            .into_iter()
            .filter(|(status, _, _)| *status == BlockStatus::Accepted)
            .map(|(_, n, _)| n)
            .collect()
    }
}

#[async_trait]
impl BlockSink for RecordingSink {
    async fn publish(&self, status: BlockStatus, block: &Block) -> Result<(), CrawlError> {
        self.attempts.fetch_add(1, Ordering::Relaxed);
        if self.failing.load(Ordering::SeqCst) {
            return Err(CrawlError::Publish {
                status,
                number: block.number,
                reason: "sink unavailable".to_string(),
            });
        }
        self.published
            .lock()
            .unwrap()
            .push((status, block.number, block.hash.clone()));
        Ok(())
    }
}

#[derive(Default)]
pub struct MemoryStateStore {
    state: Mutex<Option<CrawlerState>>,
    pub saves: AtomicU64,
}

impl MemoryStateStore {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn with_state(state: CrawlerState) -> Arc<Self> {
        Arc::new(Self {
            state: Mutex::new(Some(state)),
            saves: AtomicU64::new(0),
        })
    }

    pub fn current(&self) -> Option<CrawlerState> {
        self.state.lock().unwrap().clone()
    }
}

impl StateStore for MemoryStateStore {
    fn load(&self) -> Result<Option<CrawlerState>, CrawlError> {
        Ok(self.current())
    }

    fn save(&self, state: &CrawlerState) -> Result<(), CrawlError> {
        self.saves.fetch_add(1, Ordering::Relaxed);
        *self.state.lock().unwrap() = Some(state.clone());
        Ok(())
    }
}

pub fn test_config() -> CrawlerConfig {
    let mut config = CrawlerConfig::new("test-chain");
    config.routines = 4;
    config.cache_limit = 32;
    config.tick_interval_millis = 10;
    config.publish_retries = 0;
    config.publish_retry_delay_millis = 1;
    config
}

pub struct Harness {
    pub crawler: EvmCrawler,
    pub source: Arc<MockSource>,
    pub sink: Arc<RecordingSink>,
    pub state: Arc<MemoryStateStore>,
    pub imports: ImportLogger,
}

impl Harness {
    pub fn new(config: CrawlerConfig, source: Arc<MockSource>) -> Self {
        Self::with_state(config, source, MemoryStateStore::new())
    }

    pub fn with_state(
        config: CrawlerConfig,
        source: Arc<MockSource>,
        state: Arc<MemoryStateStore>,
    ) -> Self {
        let sink = RecordingSink::new();
        let ctx = CrawlerContext::new(
            Arc::new(config),
            source.clone(),
            sink.clone(),
            state.clone(),
            Arc::new(NoopCrawlerMetrics::new()),
        );
        let imports = ImportLogger::start("test-chain");
        let crawler = EvmCrawler::new(ctx, imports.handle());
        Self {
            crawler,
            source,
            sink,
            state,
            imports,
        }
    }

    pub async fn cached_numbers(&self) -> Vec<u64> {
        self.crawler
            .cache_snapshot()
            .await
            .iter()
            .map(|b| b.number)
            .collect()
    }

    pub async fn cached_hashes(&self) -> Vec<String> {
        self.crawler
            .cache_snapshot()
            .await
            .into_iter()
            .map(|b| b.hash)
            .collect()
    }
}
