use thiserror::Error;

use crate::core::sink::BlockStatus;

/// Returned by cache reads on zero elements.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("block cache is empty")]
pub struct EmptyCacheError;

/// Errors raised while building a synchronizer.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SyncError {
    #[error("cannot start sync with 0 max routines, should be at least 1")]
    ZeroConcurrency,
}

/// Errors that can occur while crawling.
#[derive(Debug, Clone, Error)]
pub enum CrawlError {
    #[error(transparent)]
    EmptyCache(#[from] EmptyCacheError),

    #[error("block {0} not found on remote node")]
    NotFound(String),

    #[error("failed to fetch {target}: {reason}")]
    Fetch { target: String, reason: String },

    #[error("timed out fetching {0}")]
    Timeout(String),

    #[error("failed to decode block {target}: {reason}")]
    Decode { target: String, reason: String },

    #[error(
        "no common ancestor within {searched} retained blocks (search started at block {from}); \
         reset local chain state from a trusted checkpoint"
    )]
    NoCommonAncestor { from: u64, searched: u64 },

    #[error("failed to publish {status} block {number}: {reason}")]
    Publish {
        status: BlockStatus,
        number: u64,
        reason: String,
    },

    #[error("persistence error: {0}")]
    Persistence(String),

    #[error("config error: {0}")]
    Config(String),
}

impl CrawlError {
    /// Returns `true` when the process should stop instead of retrying on the next tick.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::NoCommonAncestor { .. } | Self::Config(_))
    }

    pub fn fetch(target: impl ToString, reason: impl ToString) -> Self {
        Self::Fetch {
            target: target.to_string(),
            reason: reason.to_string(),
        }
    }

    pub fn decode(target: impl ToString, reason: impl ToString) -> Self {
        Self::Decode {
            target: target.to_string(),
            reason: reason.to_string(),
        }
    }
}

impl From<SyncError> for CrawlError {
    fn from(err: SyncError) -> Self {
        Self::Config(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_ancestor_and_config_errors_are_fatal() {
        assert!(CrawlError::NoCommonAncestor { from: 10, searched: 3 }.is_fatal());
        assert!(CrawlError::from(SyncError::ZeroConcurrency).is_fatal());
        assert!(!CrawlError::from(EmptyCacheError).is_fatal());
        assert!(!CrawlError::fetch("block 5", "connection refused").is_fatal());
        assert!(!CrawlError::Timeout("block 5".to_string()).is_fatal());
        assert!(!CrawlError::Persistence("disk full".to_string()).is_fatal());
    }

    #[test]
    fn ancestor_error_carries_operator_hint() {
        let msg = CrawlError::NoCommonAncestor { from: 100, searched: 64 }.to_string();
        assert!(msg.contains("trusted checkpoint"), "got: {msg}");
        assert!(msg.contains("100"));
    }
}
