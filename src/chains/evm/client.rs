use std::{
    future::Future,
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
    time::Duration,
};

use alloy::{
    providers::{Provider, ProviderBuilder, RootProvider},
    transports::http::{Client, Http},
};
use anyhow::Result;
use async_trait::async_trait;
use tokio::time::timeout;
use tracing::{debug, warn};

use crate::{
    core::{
        error::CrawlError,
        source::BlockSource,
        table::{Block, BlockHeader},
        types::{RawBlock, RawHeader, RawReceipt},
    },
    utils::hex::encode_u64,
};

fn is_method_not_found(err: &impl std::fmt::Display) -> bool {
    let msg = err.to_string();
    msg.contains("-32601") || msg.to_lowercase().contains("method not found")
}

/// JSON-RPC block source over an alloy HTTP provider.
pub struct EvmClient {
    pub provider: Arc<RootProvider<Http<Client>>>,
    timeout: Duration,
    block_receipts: AtomicBool,
}

impl EvmClient {
    pub fn new(rpc_url: &str, timeout: Duration) -> Result<Self> {
        let provider = Arc::new(ProviderBuilder::new().on_http(rpc_url.parse()?));
        Ok(Self {
            provider,
            timeout,
            block_receipts: AtomicBool::new(true),
        })
    }

    async fn timed<T, F>(&self, target: String, fut: F) -> Result<T, CrawlError>
    where
        F: Future<Output = Result<T, CrawlError>>,
    {
        timeout(self.timeout, fut)
            .await
            .map_err(|_| CrawlError::Timeout(target))?
    }

    /// `web3_clientVersion`, used as the startup connectivity check.
    pub async fn client_version(&self) -> Result<String, CrawlError> {
        self.timed("client version".to_string(), async {
            self.provider
                .get_client_version()
                .await
                .map_err(|e| CrawlError::fetch("client version", e))
        })
        .await
    }

    pub async fn chain_id(&self) -> Result<u64, CrawlError> {
        self.timed("chain id".to_string(), async {
            self.provider
                .get_chain_id()
                .await
                .map_err(|e| CrawlError::fetch("chain id", e))
        })
        .await
    }

    async fn block_receipts(&self, block: &RawBlock) -> Result<Vec<RawReceipt>, CrawlError> {
        if block.transactions.is_empty() {
            return Ok(Vec::new());
        }

        if self.block_receipts.load(Ordering::Relaxed) {
            let result: Result<Option<Vec<RawReceipt>>, _> = self
                .provider
                .raw_request("eth_getBlockReceipts".into(), (block.hash.clone(),))
                .await;
            match result {
                Ok(Some(receipts)) => return Ok(receipts),
                Ok(None) => return Err(CrawlError::NotFound(block.hash.clone())),
                Err(e) if is_method_not_found(&e) => {
                    warn!("⚠️ eth_getBlockReceipts not supported by this node, falling back to per-transaction receipts");
                    self.block_receipts.store(false, Ordering::Relaxed);
                }
                Err(e) => return Err(CrawlError::fetch(format!("receipts of {}", block.hash), e)),
            }
        }

        let mut receipts = Vec::with_capacity(block.transactions.len());
        for tx in &block.transactions {
            let receipt: Option<RawReceipt> = self
                .provider
                .raw_request("eth_getTransactionReceipt".into(), (tx.hash.clone(),))
                .await
                .map_err(|e| CrawlError::fetch(format!("receipt of {}", tx.hash), e))?;
            match receipt {
                Some(receipt) => receipts.push(receipt),
                None => return Err(CrawlError::NotFound(format!("receipt {}", tx.hash))),
            }
        }
        Ok(receipts)
    }

    async fn fetch_full(&self, method: &'static str, target: String, id: String) -> Result<Block, CrawlError> {
        let raw: Option<RawBlock> = self
            .provider
            .raw_request(method.into(), (id, true))
            .await
            .map_err(|e| CrawlError::fetch(&target, e))?;
        let raw = raw.ok_or_else(|| CrawlError::NotFound(target.clone()))?;

        let receipts = self.block_receipts(&raw).await?;
        debug!(
            "🖨️ Fetched block {} with {} transactions",
            target,
            raw.transactions.len()
        );
        raw.decode(receipts)
    }
}

#[async_trait]
impl BlockSource for EvmClient {
    async fn latest_height(&self) -> Result<u64, CrawlError> {
        self.timed("latest block number".to_string(), async {
            self.provider
                .get_block_number()
                .await
                .map_err(|e| CrawlError::fetch("latest block number", e))
        })
        .await
    }

    async fn block_by_height(&self, number: u64) -> Result<Block, CrawlError> {
        let target = number.to_string();
        self.timed(
            target.clone(),
            self.fetch_full("eth_getBlockByNumber", target, encode_u64(number)),
        )
        .await
    }

    async fn block_by_hash(&self, hash: &str) -> Result<Block, CrawlError> {
        self.timed(
            hash.to_string(),
            self.fetch_full("eth_getBlockByHash", hash.to_string(), hash.to_string()),
        )
        .await
    }

    async fn header_by_height(&self, number: u64) -> Result<BlockHeader, CrawlError> {
        let target = number.to_string();
        self.timed(target.clone(), async {
            let raw: Option<RawHeader> = self
                .provider
                .raw_request("eth_getBlockByNumber".into(), (encode_u64(number), false))
                .await
                .map_err(|e| CrawlError::fetch(&target, e))?;
            raw.ok_or_else(|| CrawlError::NotFound(target.clone()))?
                .decode()
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn detects_method_not_found() {
        assert!(is_method_not_found(
            &"server returned an error response: error code -32601: the method eth_getBlockReceipts does not exist"
        ));
        assert!(is_method_not_found(&"Method not found"));
        assert!(!is_method_not_found(&"error code -32000: header not found"));
    }

    #[test]
    fn rejects_invalid_url() {
        assert!(EvmClient::new("not a url", Duration::from_secs(1)).is_err());
    }
}
