use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::{
    core::{
        error::CrawlError,
        table::{Block, BlockHeader, Log, Transaction},
    },
    utils::hex::{HexError, decode_opt_u64, decode_u64, decode_u256_decimal},
};

/// `eth_getBlockByNumber(.., true)` payload.
#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct RawBlock {
    pub hash: String,
    pub number: String,
    pub parent_hash: String,
    pub timestamp: String,
    pub miner: String,
    pub gas_used: String,
    pub gas_limit: String,
    #[serde(default)]
    pub base_fee_per_gas: Option<String>,
    #[serde(default)]
    pub difficulty: Option<String>,
    #[serde(default)]
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
    pub transactions: Vec<RawTransaction>,
}

/// `eth_getBlockByNumber(.., false)` payload, only the fields linkage checks need.
#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct RawHeader {
    pub hash: String,
    pub number: String,
    pub parent_hash: String,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct RawTransaction {
    pub hash: String,
    pub from: String,
    #[serde(default)]
    pub to: Option<String>,
    pub value: String,
    pub nonce: String,
    pub gas: String,
    #[serde(default)]
    pub gas_price: Option<String>,
    #[serde(default)]
    pub max_fee_per_gas: Option<String>,
    #[serde(default)]
    pub max_priority_fee_per_gas: Option<String>,
    #[serde(default)]
    pub transaction_index: Option<String>,
    #[serde(default, rename = "type")]
    pub tx_type: Option<String>,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct RawReceipt {
    pub transaction_hash: String,
    #[serde(default)]
    pub status: Option<String>,
    pub gas_used: String,
    pub cumulative_gas_used: String,
    #[serde(default)]
    pub effective_gas_price: Option<String>,
    #[serde(default)]
    pub contract_address: Option<String>,
    #[serde(default)]
    pub logs: Vec<RawLog>,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct RawLog {
    pub address: String,
    pub topics: Vec<String>,
    pub data: String,
    pub log_index: String,
    pub transaction_hash: String,
    pub transaction_index: String,
}

impl RawHeader {
    pub fn decode(self) -> Result<BlockHeader, CrawlError> {
        let number = decode_u64(&self.number).map_err(|e| CrawlError::decode(&self.hash, e))?;
        Ok(BlockHeader {
            number,
            hash: self.hash,
            parent_hash: self.parent_hash,
        })
    }
}

impl RawBlock {
    /// Convert into a [`Block`], merging every transaction with its receipt.
    ///
    /// Receipts are matched by transaction hash; logs follow receipt order.
    pub fn decode(self, receipts: Vec<RawReceipt>) -> Result<Block, CrawlError> {
        let target = self.hash.clone();
        self.decode_inner(receipts)
            .map_err(|reason| CrawlError::decode(target, reason))
    }

    fn decode_inner(self, receipts: Vec<RawReceipt>) -> Result<Block, DecodeFailure> {
        let mut by_hash: HashMap<String, RawReceipt> = receipts
            .into_iter()
            .map(|r| (r.transaction_hash.to_lowercase(), r))
            .collect();

        let mut transactions = Vec::with_capacity(self.transactions.len());
        let mut logs = Vec::new();

        for (position, raw) in self.transactions.into_iter().enumerate() {
            let receipt = by_hash
                .remove(&raw.hash.to_lowercase())
                .ok_or_else(|| DecodeFailure::MissingReceipt(raw.hash.clone()))?;

            let index = match raw.transaction_index.as_deref() {
                Some(index) => decode_u64(index)?,
                None => position as u64,
            };

            for log in receipt.logs {
                logs.push(Log {
                    index: decode_u64(&log.log_index)?,
                    transaction_index: decode_u64(&log.transaction_index)?,
                    address: log.address,
                    topics: log.topics,
                    data: log.data,
                    transaction_hash: log.transaction_hash,
                });
            }

            transactions.push(Transaction {
                index,
                from: raw.from,
                to: raw.to,
                value: decode_u256_decimal(&raw.value)?,
                nonce: decode_u64(&raw.nonce)?,
                gas: decode_u64(&raw.gas)?,
                gas_price: decode_opt_u64(raw.gas_price.as_deref())?,
                max_fee_per_gas: decode_opt_u64(raw.max_fee_per_gas.as_deref())?,
                max_priority_fee_per_gas: decode_opt_u64(raw.max_priority_fee_per_gas.as_deref())?,
                tx_type: decode_opt_u64(raw.tx_type.as_deref())?,
                status: decode_opt_u64(receipt.status.as_deref())?,
                gas_used: decode_u64(&receipt.gas_used)?,
                cumulative_gas_used: decode_u64(&receipt.cumulative_gas_used)?,
                effective_gas_price: decode_opt_u64(receipt.effective_gas_price.as_deref())?,
                created_contract: receipt.contract_address,
                hash: raw.hash,
            });
        }

        Ok(Block {
            number: decode_u64(&self.number)?,
            timestamp: decode_u64(&self.timestamp)?,
            gas_used: decode_u64(&self.gas_used)?,
            gas_limit: decode_u64(&self.gas_limit)?,
            base_fee_per_gas: self
                .base_fee_per_gas
                .as_deref()
                .map(decode_u256_decimal)
                .transpose()?,
            difficulty: self
                .difficulty
                .as_deref()
                .map(decode_u256_decimal)
                .transpose()?
                .unwrap_or_else(|| "0".to_string()),
            total_difficulty: self
                .total_difficulty
                .as_deref()
                .map(decode_u256_decimal)
                .transpose()?,
            hash: self.hash,
            parent_hash: self.parent_hash,
            miner: self.miner,
            state_root: self.state_root,
            transactions_root: self.transactions_root,
            receipts_root: self.receipts_root,
            extra_data: self.extra_data,
            uncles: self.uncles,
            transactions,
            logs,
        })
    }
}

#[derive(Debug, thiserror::Error)]
enum DecodeFailure {
    #[error("missing receipt for transaction {0}")]
    MissingReceipt(String),
    #[error(transparent)]
    Hex(#[from] HexError),
}
