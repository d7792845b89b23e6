// Key naming conventions and prefix constants
pub mod keys {
    pub const STATE_PREFIX: &str = "state";
    pub const BLOCK_PREFIX: &str = "block";
    pub const BLOCK_INDEX_ACTIVE_PREFIX: &str = "block_index:active";
    pub const BLOCK_INDEX_HISTORY_PREFIX: &str = "block_index:history";
    pub const EVENT_PREFIX: &str = "event";

    // example: ethereum:state
    pub fn state_key(chain: &str) -> String {
        format!("{}:{}", chain, STATE_PREFIX)
    }

    // example: ethereum:block:0x1234567890abcdef
    pub fn block_key(chain: &str, block_hash: &str) -> String {
        format!("{}:{}:{}", chain, BLOCK_PREFIX, block_hash)
    }

    // example: ethereum:block_index:active:1000000
    pub fn block_index_active_key(chain: &str, block_number: u64) -> String {
        format!("{}:{}:{}", chain, BLOCK_INDEX_ACTIVE_PREFIX, block_number)
    }

    // example: ethereum:block_index:history:1000000:00000000000000000042
    // version is the seq of the dropped event, padded like event keys
    pub fn block_index_history_key(chain: &str, block_number: u64, version: u64) -> String {
        format!("{}{:020}", block_index_history_prefix(chain, block_number), version)
    }

    // trailing separator keeps height 10 from matching height 100
    pub fn block_index_history_prefix(chain: &str, block_number: u64) -> String {
        format!("{}:{}:{}:", chain, BLOCK_INDEX_HISTORY_PREFIX, block_number)
    }

    // example: ethereum:event:00000000000000000042
    // zero padded so lexical order is publish order
    pub fn event_key(chain: &str, seq: u64) -> String {
        format!("{}{:020}", event_prefix(chain), seq)
    }

    pub fn event_prefix(chain: &str) -> String {
        format!("{}:{}:", chain, EVENT_PREFIX)
    }

    /// Sequence number encoded in an event key.
    pub fn event_seq(chain: &str, key: &str) -> Option<u64> {
        key.strip_prefix(&event_prefix(chain))?.parse().ok()
    }
}

// Data version management
pub const SCHEMA_VERSION: u32 = 1;
