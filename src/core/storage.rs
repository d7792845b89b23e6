use anyhow::Result;
use serde::{Serialize, de::DeserializeOwned};

pub trait KVStorage: Send + Sync {
    // Basic string operations
    fn write(&self, key: &str, value: &str) -> Result<()>;
    fn read(&self, key: &str) -> Result<Option<String>>;
    fn delete(&self, key: &str) -> Result<()>;
    fn exists(&self, key: &str) -> Result<bool>;

    // JSON serialization/deserialization
    fn write_json<T: Serialize>(&self, key: &str, value: &T) -> Result<()>;
    fn read_json<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>>;

    // Batch operations, applied atomically
    fn batch_write(&self, pairs: Vec<(String, String)>) -> Result<()>;
    fn batch_write_delete(&self, pairs: Vec<(String, String)>, deletes: Vec<String>) -> Result<()>;

    // Range queries
    fn scan_prefix(&self, prefix: &str, limit: Option<usize>) -> Result<Vec<(String, String)>> {
        self.scan_from(prefix, prefix, limit)
    }

    /// Ascending scan starting at `start`, stopping at the first key outside `prefix`.
    fn scan_from(
        &self,
        start: &str,
        prefix: &str,
        limit: Option<usize>,
    ) -> Result<Vec<(String, String)>>;

    /// Greatest key under `prefix`.
    fn last_with_prefix(&self, prefix: &str) -> Result<Option<(String, String)>>;
}
