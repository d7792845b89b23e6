use std::sync::Arc;

use anyhow::{Context, Result};
use rocksdb::{DB, Direction, IteratorMode, Options, WriteBatch};
use serde::{Serialize, de::DeserializeOwned};

use crate::core::storage::KVStorage;

#[derive(Clone)]
pub struct RocksDBStorage {
    db: Arc<DB>,
}

impl RocksDBStorage {
    pub fn new(path: &str) -> Result<Self> {
        let mut opts = Options::default();
        opts.create_if_missing(true);

        // Small, steady write stream: a few keys per block plus one state record per tick
        opts.set_write_buffer_size(64 * 1024 * 1024);
        opts.set_max_write_buffer_number(3);
        opts.set_target_file_size_base(128 * 1024 * 1024);

        opts.set_compression_type(rocksdb::DBCompressionType::Lz4);
        opts.set_max_background_jobs(4);

        // WAL bounds
        opts.set_max_total_wal_size(512 * 1024 * 1024);
        opts.set_wal_bytes_per_sync(4 * 1024 * 1024);
        opts.set_bytes_per_sync(4 * 1024 * 1024);

        opts.set_paranoid_checks(true);

        let db = DB::open(&opts, path)
            .with_context(|| format!("Failed to open RocksDB at path: {}", path))?;
        Ok(Self { db: Arc::new(db) })
    }

    /// Open an existing database without taking the writer lock.
    pub fn open_read_only(path: &str) -> Result<Self> {
        let opts = Options::default();
        let db = DB::open_for_read_only(&opts, path, false)
            .with_context(|| format!("Failed to open RocksDB read-only at path: {}", path))?;
        Ok(Self { db: Arc::new(db) })
    }

    /// Flush database to ensure all data is written to disk
    pub fn flush(&self) -> Result<()> {
        self.db
            .flush()
            .with_context(|| "Failed to flush database to disk")
    }

    fn decode_entry(key: &[u8], value: &[u8]) -> Result<(String, String)> {
        let key_str = String::from_utf8(key.to_vec()).context("Failed to parse key as UTF-8")?;
        let value_str =
            String::from_utf8(value.to_vec()).context("Failed to parse value as UTF-8")?;
        Ok((key_str, value_str))
    }
}

impl KVStorage for RocksDBStorage {
    fn write(&self, key: &str, value: &str) -> Result<()> {
        self.db
            .put(key.as_bytes(), value.as_bytes())
            .with_context(|| format!("Failed to write key: {}", key))
    }

    fn read(&self, key: &str) -> Result<Option<String>> {
        match self.db.get(key.as_bytes())? {
            Some(value) => {
                let s = String::from_utf8(value)
                    .with_context(|| format!("Failed to parse value for key: {}", key))?;
                Ok(Some(s))
            }
            None => Ok(None),
        }
    }

    fn delete(&self, key: &str) -> Result<()> {
        self.db
            .delete(key.as_bytes())
            .with_context(|| format!("Failed to delete key: {}", key))
    }

    fn exists(&self, key: &str) -> Result<bool> {
        Ok(self.db.get_pinned(key.as_bytes())?.is_some())
    }

    fn write_json<T: Serialize>(&self, key: &str, value: &T) -> Result<()> {
        let json = serde_json::to_string(value)
            .with_context(|| format!("Failed to serialize value for key: {}", key))?;
        self.write(key, &json)
    }

    fn read_json<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>> {
        match self.read(key)? {
            Some(json) => {
                let value = serde_json::from_str(&json)
                    .with_context(|| format!("Failed to deserialize value for key: {}", key))?;
                Ok(Some(value))
            }
            None => Ok(None),
        }
    }

    fn batch_write(&self, pairs: Vec<(String, String)>) -> Result<()> {
        self.batch_write_delete(pairs, Vec::new())
    }

    fn batch_write_delete(&self, pairs: Vec<(String, String)>, deletes: Vec<String>) -> Result<()> {
        let mut batch = WriteBatch::default();
        for (key, value) in pairs {
            batch.put(key.as_bytes(), value.as_bytes());
        }
        for key in deletes {
            batch.delete(key.as_bytes());
        }
        self.db
            .write(batch)
            .context("Failed to execute batch write")
    }

    fn scan_from(
        &self,
        start: &str,
        prefix: &str,
        limit: Option<usize>,
    ) -> Result<Vec<(String, String)>> {
        let mut results = Vec::new();
        let prefix_bytes = prefix.as_bytes();

        let iter = self
            .db
            .iterator(IteratorMode::From(start.as_bytes(), Direction::Forward));

        for item in iter {
            let (key, value) = item.context("Failed to read from iterator")?;
            if !key.starts_with(prefix_bytes) {
                break;
            }

            results.push(Self::decode_entry(&key, &value)?);

            if let Some(limit) = limit
                && results.len() >= limit
            {
                break;
            }
        }

        Ok(results)
    }

    fn last_with_prefix(&self, prefix: &str) -> Result<Option<(String, String)>> {
        // seek just past every key that starts with `prefix`
        let mut upper = prefix.as_bytes().to_vec();
        upper.push(0xff);

        let mut iter = self
            .db
            .iterator(IteratorMode::From(upper.as_slice(), Direction::Reverse));

        match iter.next() {
            Some(item) => {
                let (key, value) = item.context("Failed to read from iterator")?;
                if key.starts_with(prefix.as_bytes()) {
                    Ok(Some(Self::decode_entry(&key, &value)?))
                } else {
                    Ok(None)
                }
            }
            None => Ok(None),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;
    use tempfile::TempDir;

    #[derive(Serialize, Deserialize, Debug, PartialEq, Clone)]
    struct Checkpoint {
        number: u64,
        hash: String,
    }

    fn open(temp: &TempDir) -> RocksDBStorage {
        RocksDBStorage::new(temp.path().join("db").to_str().unwrap()).unwrap()
    }

    #[test]
    fn write_read_delete() {
        let temp = TempDir::new().unwrap();
        let storage = open(&temp);

        assert_eq!(storage.read("missing").unwrap(), None);
        assert!(!storage.exists("k").unwrap());

        storage.write("k", "v").unwrap();
        assert_eq!(storage.read("k").unwrap().as_deref(), Some("v"));
        assert!(storage.exists("k").unwrap());

        storage.delete("k").unwrap();
        assert_eq!(storage.read("k").unwrap(), None);
    }

    #[test]
    fn json_values_survive_storage() {
        let temp = TempDir::new().unwrap();
        let storage = open(&temp);
        let checkpoint = Checkpoint {
            number: 42,
            hash: "0xabc".to_string(),
        };

        storage.write_json("eth:state", &checkpoint).unwrap();
        let loaded: Option<Checkpoint> = storage.read_json("eth:state").unwrap();
        assert_eq!(loaded, Some(checkpoint));

        storage.write("eth:broken", "{not json").unwrap();
        assert!(storage.read_json::<Checkpoint>("eth:broken").is_err());
    }

    #[test]
    fn batch_write_delete_is_applied_together() {
        let temp = TempDir::new().unwrap();
        let storage = open(&temp);
        storage.write("old", "1").unwrap();

        storage
            .batch_write_delete(
                vec![
                    ("a".to_string(), "1".to_string()),
                    ("b".to_string(), "2".to_string()),
                ],
                vec!["old".to_string()],
            )
            .unwrap();

        assert_eq!(storage.read("a").unwrap().as_deref(), Some("1"));
        assert_eq!(storage.read("b").unwrap().as_deref(), Some("2"));
        assert_eq!(storage.read("old").unwrap(), None);
    }

    #[test]
    fn scans_stay_inside_prefix() {
        let temp = TempDir::new().unwrap();
        let storage = open(&temp);
        for seq in 0..5u64 {
            storage
                .write(&format!("eth:event:{seq:020}"), &seq.to_string())
                .unwrap();
        }
        storage.write("eth:state", "{}").unwrap();
        storage.write("eth:block:0x1", "{}").unwrap();

        let all = storage.scan_prefix("eth:event:", None).unwrap();
        assert_eq!(all.len(), 5);

        let page = storage
            .scan_from(&format!("eth:event:{:020}", 3), "eth:event:", Some(10))
            .unwrap();
        let values: Vec<&str> = page.iter().map(|(_, v)| v.as_str()).collect();
        assert_eq!(values, vec!["3", "4"]);

        let limited = storage.scan_prefix("eth:event:", Some(2)).unwrap();
        assert_eq!(limited.len(), 2);

        assert!(storage.scan_prefix("btc:", None).unwrap().is_empty());
    }

    #[test]
    fn last_with_prefix_finds_greatest_key() {
        let temp = TempDir::new().unwrap();
        let storage = open(&temp);
        assert_eq!(storage.last_with_prefix("eth:event:").unwrap(), None);

        for seq in [1u64, 7, 12] {
            storage
                .write(&format!("eth:event:{seq:020}"), &seq.to_string())
                .unwrap();
        }
        // neighbours on both sides must not leak into the result
        storage.write("eth:block:0x1", "{}").unwrap();
        storage.write("eth:state", "{}").unwrap();

        let (key, value) = storage.last_with_prefix("eth:event:").unwrap().unwrap();
        assert_eq!(key, format!("eth:event:{:020}", 12));
        assert_eq!(value, "12");
    }

    #[test]
    fn read_only_handle_sees_written_data() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("db");
        {
            let storage = RocksDBStorage::new(path.to_str().unwrap()).unwrap();
            storage.write("eth:state", "{\"chain\":\"eth\"}").unwrap();
            storage.flush().unwrap();
        }

        let reader = RocksDBStorage::open_read_only(path.to_str().unwrap()).unwrap();
        assert_eq!(
            reader.read("eth:state").unwrap().as_deref(),
            Some("{\"chain\":\"eth\"}")
        );
    }
}
