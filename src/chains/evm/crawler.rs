use std::sync::{
    Arc, Mutex as StdMutex, OnceLock, PoisonError,
    atomic::{AtomicBool, AtomicU64, Ordering},
};

use async_trait::async_trait;
use chrono::Utc;
use tokio::{
    sync::{Mutex, broadcast},
    time::{Instant, MissedTickBehavior, interval},
};
use tracing::{debug, error, info, warn};

use crate::{
    chains::evm::{checker::EvmChecker, context::CrawlerContext, import_log::ImportLogHandle},
    core::{
        cache::BlockCache,
        crawler::{Crawler, ReorgReport, TickOutcome},
        error::{CrawlError, EmptyCacheError},
        sink::BlockStatus,
        synchronizer::{Synchronizer, TaskHandle},
        table::{Block, CrawlerState, CrawlerStatus},
    },
    storage::schema::SCHEMA_VERSION,
    utils::metrics::BlockFetchFailureReason,
};

/// What [`EvmCrawler::process_block`] did with a block.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Processed {
    /// Linked to the head and pushed.
    Accepted,
    /// Did not link; the reorg was resolved and the batch aborted.
    Reorged(ReorgReport),
}

#[derive(Debug, Clone, Copy)]
struct Progress {
    status: CrawlerStatus,
    chain_id: Option<u64>,
    reorg_count: u64,
    last_reorg_block: Option<u64>,
}

/// Results collected from the tasks of one batch.
#[derive(Default)]
struct TickContext {
    accepted: AtomicU64,
    publish_failures: AtomicU64,
    error: OnceLock<CrawlError>,
    reorg: OnceLock<ReorgReport>,
}

impl TickContext {
    fn fail(&self, err: CrawlError) {
        // only the first failure of a batch is reported
        let _ = self.error.set(err);
    }
}

/// Clears the syncing flag when the tick ends, however it ends.
struct SyncingGuard<'a>(&'a AtomicBool);

impl<'a> SyncingGuard<'a> {
    fn acquire(flag: &'a AtomicBool) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| Self(flag))
    }
}

impl Drop for SyncingGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

/// Follows an EVM chain: fetches new heights concurrently, links them to the
/// cached head in order and resolves reorgs when they do not link.
#[derive(Clone)]
pub struct EvmCrawler {
    ctx: CrawlerContext,
    checker: Arc<EvmChecker>,
    cache: Arc<Mutex<BlockCache<Block>>>,
    syncing: Arc<AtomicBool>,
    progress: Arc<StdMutex<Progress>>,
    imports: ImportLogHandle,
}

impl EvmCrawler {
    pub fn new(ctx: CrawlerContext, imports: ImportLogHandle) -> Self {
        let cache = BlockCache::new(Some(ctx.config.cache_limit));
        let progress = Progress {
            status: CrawlerStatus::Idle,
            chain_id: ctx.config.chain_id,
            reorg_count: 0,
            last_reorg_block: None,
        };
        Self {
            checker: Arc::new(EvmChecker::new(ctx.clone())),
            ctx,
            cache: Arc::new(Mutex::new(cache)),
            syncing: Arc::new(AtomicBool::new(false)),
            progress: Arc::new(StdMutex::new(progress)),
            imports,
        }
    }

    fn progress(&self) -> std::sync::MutexGuard<'_, Progress> {
        self.progress.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn set_status(&self, status: CrawlerStatus) {
        self.progress().status = status;
    }

    /// Head-first copy of the cached blocks.
    pub async fn cache_snapshot(&self) -> Vec<Block> {
        self.cache.lock().await.snapshot()
    }

    pub fn status(&self) -> CrawlerStatus {
        self.progress().status
    }

    fn build_state(&self, cache: &BlockCache<Block>) -> Option<CrawlerState> {
        let head = cache.peek().ok()?.clone();
        let progress = *self.progress();
        Some(CrawlerState {
            chain: self.ctx.chain_name().to_string(),
            chain_id: progress.chain_id,
            head,
            cache: cache.snapshot(),
            status: progress.status,
            reorg_count: progress.reorg_count,
            last_reorg_block: progress.last_reorg_block,
            updated_at: Utc::now(),
            version: SCHEMA_VERSION,
        })
    }

    /// Best-effort save; a failure is logged and the next tick tries again.
    async fn persist(&self) {
        let state = {
            let cache = self.cache.lock().await;
            self.build_state(&cache)
        };
        let Some(state) = state else {
            return;
        };
        if let Err(err) = self.ctx.state.save(&state) {
            warn!(error = %err, "⚠️ Failed to save crawler state");
        }
    }

    async fn local_head(&self) -> Result<u64, CrawlError> {
        let mut cache = self.cache.lock().await;
        if let Ok(head) = cache.peek() {
            return Ok(head.number);
        }

        // only reachable when ticking without init
        match self.ctx.state.load()? {
            Some(state) => {
                let number = state.head.number;
                warn!(number, "Block cache empty, reseeding from saved head");
                cache.push(state.head);
                Ok(number)
            }
            None => Err(EmptyCacheError.into()),
        }
    }

    /// Link `block` to the cached head. A block that links is published as
    /// accepted and pushed; one that does not triggers reorg resolution and
    /// aborts the rest of the batch.
    ///
    /// A [`CrawlError::Publish`] means the block was still accepted into the
    /// cache; only the downstream write failed.
    pub async fn process_block(
        &self,
        cache: &mut BlockCache<Block>,
        block: Block,
        task: &TaskHandle,
    ) -> Result<Processed, CrawlError> {
        let links = match cache.peek() {
            Ok(parent) => parent.hash == block.parent_hash,
            Err(_) => {
                warn!(number = block.number, "Block cache empty, accepting block without linkage check");
                true
            }
        };

        if !links {
            warn!(
                number = block.number,
                hash = %block.hash,
                parent_hash = %block.parent_hash,
                "🔄 Reorg detected"
            );
            let result = self.checker.resolve_reorg(cache).await;
            task.abort();
            return result.map(Processed::Reorged);
        }

        let published = self.ctx.publish(BlockStatus::Accepted, &block).await;
        self.ctx.metrics.record_block_accepted(block.number);
        self.imports
            .record(block.number, block.txn_count(), block.log_count());
        debug!(number = block.number, hash = %block.hash, "✅ Accepted block");
        cache.push(block);

        published.map(|_| Processed::Accepted)
    }

    async fn sync_block(&self, number: u64, task: TaskHandle, tick: &TickContext) {
        let block = match self.ctx.source.block_by_height(number).await {
            Ok(block) => {
                self.ctx.metrics.record_block_fetch_success();
                block
            }
            Err(err) => {
                self.ctx
                    .metrics
                    .record_block_fetch_failure(BlockFetchFailureReason::from_error(&err));
                warn!(number, error = %err, "❌ Fetch block failed, aborting batch");
                tick.fail(err);
                task.abort();
                return;
            }
        };

        if task.barrier().await {
            return;
        }

        let mut cache = self.cache.lock().await;
        match self.process_block(&mut cache, block, &task).await {
            Ok(Processed::Accepted) => {
                tick.accepted.fetch_add(1, Ordering::Relaxed);
            }
            Ok(Processed::Reorged(report)) => {
                let _ = tick.reorg.set(report);
            }
            Err(CrawlError::Publish { .. }) => {
                tick.accepted.fetch_add(1, Ordering::Relaxed);
                tick.publish_failures.fetch_add(1, Ordering::Relaxed);
            }
            Err(err) => {
                error!(number, error = %err, "❌ Failed to process block");
                tick.fail(err);
                task.abort();
            }
        }
    }

    async fn sync_range(&self, from: u64, to: u64, started: Instant) -> Result<TickOutcome, CrawlError> {
        let mut sync = Synchronizer::new(self.ctx.config.routines)?;
        let tick = Arc::new(TickContext::default());

        for number in from..=to {
            let crawler = self.clone();
            let tick = Arc::clone(&tick);
            let queued = sync
                .submit(move |task| async move {
                    crawler.sync_block(number, task, &tick).await;
                })
                .await;
            if !queued {
                debug!(number, "Batch aborted, not scheduling remaining heights");
                break;
            }
        }

        let scheduled = sync.submitted();
        let aborted = sync.finish().await;
        self.ctx.metrics.record_tick(started.elapsed(), scheduled);
        debug!(scheduled, aborted, "Batch finished");

        let reorg = tick.reorg.get().cloned();
        let error = tick.error.get().cloned();

        if let Some(report) = &reorg {
            let mut progress = self.progress();
            progress.reorg_count += 1;
            progress.last_reorg_block = Some(report.common_ancestor);
        }

        if let Some(err) = &error
            && err.is_fatal()
        {
            self.set_status(CrawlerStatus::Error);
            return Err(err.clone());
        }

        let head = self.cache.lock().await.peek()?.number;
        let status = match (&error, &reorg) {
            (Some(_), _) => CrawlerStatus::Error,
            (None, Some(_)) => CrawlerStatus::ReorgDetected,
            (None, None) if head >= to => CrawlerStatus::Synced,
            (None, None) => CrawlerStatus::Syncing,
        };
        self.set_status(status);
        self.persist().await;

        if let Some(err) = error {
            return Err(err);
        }

        Ok(TickOutcome::Advanced {
            accepted: tick.accepted.load(Ordering::Relaxed),
            head,
            publish_failures: tick.publish_failures.load(Ordering::Relaxed),
            reorg,
        })
    }

    fn log_outcome(&self, outcome: &TickOutcome) {
        match outcome {
            TickOutcome::Skipped => debug!("Previous tick still running"),
            TickOutcome::UpToDate { head } => debug!(head, "Already caught up"),
            TickOutcome::Advanced {
                accepted,
                head,
                publish_failures,
                reorg,
            } => {
                info!(accepted, head, publish_failures, "✅ Tick finished");
                if let Some(report) = reorg {
                    info!(
                        common_ancestor = report.common_ancestor,
                        dropped = report.dropped,
                        added = report.added,
                        "🔄 Reorg resolved"
                    );
                }
            }
        }
    }

    async fn print_final_status(&self) {
        info!("📊 Final crawler status:");
        info!("  └─ Chain: {}", self.ctx.chain_name());
        let head = self.cache.lock().await.peek().map(|b| b.number).ok();
        if let Some(head) = head {
            info!("  └─ Head block: {}", head);
        }
        let progress = *self.progress();
        info!("  └─ Status: {}", progress.status.as_str());
        info!("  └─ Reorgs: {}", progress.reorg_count);
        if let Some(block) = progress.last_reorg_block {
            info!("  └─ Last reorg at: {}", block);
        }
    }
}

#[async_trait]
impl Crawler for EvmCrawler {
    async fn init(&self) -> Result<CrawlerState, CrawlError> {
        let chain = self.ctx.chain_name().to_string();

        if let Some(state) = self.ctx.state.load()? {
            if let (Some(expected), Some(stored)) = (self.ctx.config.chain_id, state.chain_id)
                && expected != stored
            {
                return Err(CrawlError::Config(format!(
                    "stored state for {chain} belongs to chain id {stored}, configured chain id is {expected}"
                )));
            }

            let mut cache = self.cache.lock().await;
            if state.cache.is_empty() {
                cache.push(state.head.clone());
            } else {
                for block in state.cache.iter().rev() {
                    cache.push(block.clone());
                }
            }
            {
                let mut progress = self.progress();
                progress.chain_id = self.ctx.config.chain_id.or(state.chain_id);
                progress.reorg_count = state.reorg_count;
                progress.last_reorg_block = state.last_reorg_block;
            }
            info!(
                chain = %chain,
                head = state.head.number,
                cached = cache.count(),
                "✅ Restored crawler state"
            );
            return Ok(state);
        }

        let start = match self.ctx.config.start_block {
            Some(start) => start,
            None => self.ctx.source.latest_height().await?,
        };
        let head = self.ctx.source.block_by_height(start).await?;
        let state = CrawlerState::new(chain.clone(), self.ctx.config.chain_id, head.clone(), SCHEMA_VERSION);

        self.cache.lock().await.push(head);
        self.ctx.state.save(&state)?;
        info!(chain = %chain, head = start, "✅ Initial state created");
        Ok(state)
    }

    async fn tick(&self) -> Result<TickOutcome, CrawlError> {
        let Some(_guard) = SyncingGuard::acquire(&self.syncing) else {
            debug!("Previous tick still running, skipping");
            return Ok(TickOutcome::Skipped);
        };
        let started = Instant::now();

        let local = self.local_head().await?;
        let remote = match self.ctx.source.latest_height().await {
            Ok(remote) => remote,
            Err(err) => {
                self.set_status(CrawlerStatus::Error);
                return Err(err);
            }
        };
        self.ctx.metrics.record_sync_gap(remote.saturating_sub(local));

        if remote <= local {
            self.set_status(CrawlerStatus::Synced);
            self.ctx.metrics.record_tick(started.elapsed(), 0);
            return Ok(TickOutcome::UpToDate { head: local });
        }

        self.set_status(CrawlerStatus::Syncing);
        debug!(from = local + 1, to = remote, "Syncing new blocks");
        self.sync_range(local + 1, remote, started).await
    }

    async fn run(&self, mut shutdown: broadcast::Receiver<()>) -> Result<(), CrawlError> {
        info!(chain = self.ctx.chain_name(), "🔄 Crawler loop started");
        let mut ticker = interval(self.ctx.config.tick_interval());
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = shutdown.recv() => {
                    info!("🛑 Shutdown signal received, stopping crawler gracefully...");
                    break;
                }
                _ = ticker.tick() => {
                    match self.tick().await {
                        Ok(outcome) => self.log_outcome(&outcome),
                        Err(err) if err.is_fatal() => {
                            error!(error = %err, "❌ Fatal crawl error, stopping");
                            error!("Reset the local chain state from a trusted checkpoint or fix the configuration before restarting");
                            self.print_final_status().await;
                            return Err(err);
                        }
                        Err(err) => {
                            warn!(error = %err, "⚠️ Tick failed, retrying on next tick");
                        }
                    }
                }
            }
        }

        self.print_final_status().await;
        info!("👋 Crawler stopped gracefully");
        Ok(())
    }
}
