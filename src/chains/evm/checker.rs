use std::collections::HashSet;

use tracing::{info, warn};

use crate::{
    chains::evm::context::CrawlerContext,
    core::{
        cache::BlockCache, crawler::ReorgReport, error::CrawlError, sink::BlockStatus, table::Block,
    },
};

/// Finds the common ancestor with the remote chain and replays the winning side.
pub struct EvmChecker {
    context: CrawlerContext,
}

impl EvmChecker {
    pub fn new(context: CrawlerContext) -> Self {
        Self { context }
    }

    /// Walk the cache backwards until a retained block matches the remote chain,
    /// then publish the losing blocks as dropped and the remote blocks as accepted.
    ///
    /// On error every popped block is pushed back, leaving the cache as found.
    /// Publish failures during replay are counted in the report, not returned.
    pub async fn resolve_reorg(&self, cache: &mut BlockCache<Block>) -> Result<ReorgReport, CrawlError> {
        let from = cache.peek()?.number;
        let max_depth = self.context.config.max_reorg_depth;

        // head-first, in the order they were popped
        let mut popped: Vec<Block> = Vec::new();
        let mut dropped: Vec<Block> = Vec::new();
        let mut sidechain: Vec<Block> = Vec::new();
        let mut seen: HashSet<u64> = HashSet::new();

        let ancestor = loop {
            let local = match cache.pop() {
                Ok(block) => block,
                Err(_) => {
                    let searched = popped.len() as u64;
                    restore(cache, popped);
                    return Err(CrawlError::NoCommonAncestor { from, searched });
                }
            };

            let remote = match self.context.source.header_by_height(local.number).await {
                Ok(header) => header,
                Err(err) => {
                    cache.push(local);
                    restore(cache, popped);
                    return Err(err);
                }
            };

            if remote.hash == local.hash {
                break local;
            }

            if seen.insert(local.number) {
                let block = match self.context.source.block_by_hash(&remote.hash).await {
                    Ok(block) => block,
                    Err(err) => {
                        cache.push(local);
                        restore(cache, popped);
                        return Err(err);
                    }
                };
                dropped.push(local.clone());
                sidechain.push(block);
            }
            popped.push(local);

            if let Some(max) = max_depth
                && popped.len() as u64 > max
            {
                let searched = popped.len() as u64;
                restore(cache, popped);
                warn!(from, max_depth = max, "Reorg deeper than the configured bound");
                return Err(CrawlError::NoCommonAncestor { from, searched });
            }
        };

        let common_ancestor = ancestor.number;
        warn!(
            number = ancestor.number,
            hash = %ancestor.hash,
            depth = dropped.len(),
            "Common ancestor found"
        );
        cache.push(ancestor);

        let mut report = ReorgReport {
            common_ancestor,
            dropped: 0,
            added: 0,
            publish_failures: 0,
        };

        for block in dropped.iter().rev() {
            warn!(number = block.number, hash = %block.hash, "Dropping local block");
            if self.context.publish(BlockStatus::Dropped, block).await.is_err() {
                report.publish_failures += 1;
            }
            report.dropped += 1;
        }

        for block in sidechain.into_iter().rev() {
            info!(number = block.number, hash = %block.hash, "Adding remote block");
            if self.context.publish(BlockStatus::Accepted, &block).await.is_err() {
                report.publish_failures += 1;
            }
            self.context.metrics.record_block_accepted(block.number);
            cache.push(block);
            report.added += 1;
        }

        self.context.metrics.record_reorg(report.dropped);
        self.context.metrics.record_blocks_dropped(report.dropped);
        Ok(report)
    }
}

/// Push popped blocks back, oldest first, so the original head ends on top.
fn restore(cache: &mut BlockCache<Block>, popped: Vec<Block>) {
    for block in popped.into_iter().rev() {
        cache.push(block);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        config::CrawlerConfig,
        core::{
            sink::BlockSink, source::BlockSource, state::StateStore, table::CrawlerState,
        },
        utils::metrics::NoopCrawlerMetrics,
    };
    use async_trait::async_trait;
    use std::{collections::HashMap, sync::{Arc, Mutex}};

    fn block(number: u64, hash: &str, parent: &str) -> Block {
        Block {
            number,
            hash: hash.to_string(),
            parent_hash: parent.to_string(),
            timestamp: number * 12,
            miner: "0x0".to_string(),
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

    #[derive(Default)]
    struct Remote {
        by_height: HashMap<u64, Block>,
    }

    #[async_trait]
    impl BlockSource for Remote {
        async fn latest_height(&self) -> Result<u64, CrawlError> {
            Ok(self.by_height.keys().copied().max().unwrap_or(0))
        }

        async fn block_by_height(&self, number: u64) -> Result<Block, CrawlError> {
            self.by_height
                .get(&number)
                .cloned()
                .ok_or_else(|| CrawlError::NotFound(number.to_string()))
        }

        async fn block_by_hash(&self, hash: &str) -> Result<Block, CrawlError> {
            self.by_height
                .values()
                .find(|b| b.hash == hash)
                .cloned()
                .ok_or_else(|| CrawlError::NotFound(hash.to_string()))
        }
    }

    #[derive(Default)]
    struct Journal(Mutex<Vec<(BlockStatus, String)>>);

    #[async_trait]
    impl BlockSink for Journal {
        async fn publish(&self, status: BlockStatus, block: &Block) -> Result<(), CrawlError> {
            self.0.lock().unwrap().push((status, block.hash.clone()));
            Ok(())
        }
    }

    struct NoState;

    impl StateStore for NoState {
        fn load(&self) -> Result<Option<CrawlerState>, CrawlError> {
            Ok(None)
        }
        fn save(&self, _state: &CrawlerState) -> Result<(), CrawlError> {
            Ok(())
        }
    }

    fn checker(remote: Remote, sink: Arc<Journal>, max_depth: Option<u64>) -> EvmChecker {
        let mut config = CrawlerConfig::new("test");
        config.max_reorg_depth = max_depth;
        config.publish_retries = 0;
        EvmChecker::new(CrawlerContext::new(
            Arc::new(config),
            Arc::new(remote),
            sink,
            Arc::new(NoState),
            Arc::new(NoopCrawlerMetrics::new()),
        ))
    }

    fn local_cache() -> BlockCache<Block> {
        let mut cache = BlockCache::new(Some(16));
        cache.push(block(97, "h97", "h96"));
        cache.push(block(98, "hC", "h97"));
        cache.push(block(99, "hB", "hC"));
        cache.push(block(100, "hA", "hB"));
        cache
    }

    fn hashes(cache: &BlockCache<Block>) -> Vec<String> {
        cache.iter().map(|b| b.hash.clone()).collect()
    }

    #[tokio::test]
    async fn single_block_reorg() {
        let mut remote = Remote::default();
        remote.by_height.insert(99, block(99, "hB", "hC"));
        remote.by_height.insert(100, block(100, "hX", "hB"));
        let sink = Arc::new(Journal::default());

        let mut cache = local_cache();
        let report = checker(remote, sink.clone(), None)
            .resolve_reorg(&mut cache)
            .await
            .unwrap();

        assert_eq!(report.common_ancestor, 99);
        assert_eq!((report.dropped, report.added, report.publish_failures), (1, 1, 0));
        assert_eq!(hashes(&cache), vec!["hX", "hB", "hC", "h97"]);
        assert_eq!(
            *sink.0.lock().unwrap(),
            vec![
                (BlockStatus::Dropped, "hA".to_string()),
                (BlockStatus::Accepted, "hX".to_string()),
            ]
        );
    }

    #[tokio::test]
    async fn deep_reorg_replays_oldest_first() {
        let mut remote = Remote::default();
        remote.by_height.insert(98, block(98, "hC", "h97"));
        remote.by_height.insert(99, block(99, "hY", "hC"));
        remote.by_height.insert(100, block(100, "hX", "hY"));
        let sink = Arc::new(Journal::default());

        let mut cache = local_cache();
        let report = checker(remote, sink.clone(), None)
            .resolve_reorg(&mut cache)
            .await
            .unwrap();

        assert_eq!(report.common_ancestor, 98);
        assert_eq!(hashes(&cache), vec!["hX", "hY", "hC", "h97"]);
        let published: Vec<_> = sink.0.lock().unwrap().iter().map(|(s, h)| (*s, h.clone())).collect();
        assert_eq!(
            published,
            vec![
                (BlockStatus::Dropped, "hB".to_string()),
                (BlockStatus::Dropped, "hA".to_string()),
                (BlockStatus::Accepted, "hY".to_string()),
                (BlockStatus::Accepted, "hX".to_string()),
            ]
        );
    }

    #[tokio::test]
    async fn exhausted_cache_is_fatal_and_restored() {
        let mut remote = Remote::default();
        for n in 97..=100 {
            remote.by_height.insert(n, block(n, &format!("fork{n}"), "x"));
        }
        let sink = Arc::new(Journal::default());

        let mut cache = local_cache();
        let before = hashes(&cache);
        let err = checker(remote, sink.clone(), None)
            .resolve_reorg(&mut cache)
            .await
            .unwrap_err();

        assert!(matches!(err, CrawlError::NoCommonAncestor { from: 100, searched: 4 }));
        assert!(err.is_fatal());
        assert_eq!(hashes(&cache), before);
        assert!(sink.0.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn depth_bound_stops_the_walk() {
        let mut remote = Remote::default();
        remote.by_height.insert(97, block(97, "h97", "h96"));
        for n in 98..=100 {
            remote.by_height.insert(n, block(n, &format!("fork{n}"), "x"));
        }
        let sink = Arc::new(Journal::default());

        let mut cache = local_cache();
        let before = hashes(&cache);
        let err = checker(remote, sink, Some(2))
            .resolve_reorg(&mut cache)
            .await
            .unwrap_err();

        assert!(matches!(err, CrawlError::NoCommonAncestor { searched: 3, .. }));
        assert_eq!(hashes(&cache), before);
    }

    #[tokio::test]
    async fn fetch_error_leaves_cache_untouched() {
        let mut remote = Remote::default();
        remote.by_height.insert(100, block(100, "hX", "hB"));
        let sink = Arc::new(Journal::default());

        let mut cache = local_cache();
        let before = hashes(&cache);
        let err = checker(remote, sink, None)
            .resolve_reorg(&mut cache)
            .await
            .unwrap_err();

        assert!(matches!(err, CrawlError::NotFound(_)));
        assert_eq!(hashes(&cache), before);
    }
}
