//! Document stores: RocksDB for deployments, an in-memory map for tests and dev runs

use crate::common::traits::{Collection, DocumentStore};
use crate::config::{CompressionType, StorageConfig};
use crate::errors::{BingoResult, StorageError};
use rocksdb::{Direction, IteratorMode, Options, DB};
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock};
use tracing::info;

#[derive(Clone)]
pub struct RocksStore {
    db: Arc<DB>,
}

impl RocksStore {
    pub fn open<P: AsRef<Path>>(path: P, config: &StorageConfig) -> BingoResult<Self> {
        let path = path.as_ref();
        if config.clear_on_start && path.exists() {
            info!(path = %path.display(), "Clearing database on start");
            DB::destroy(&Options::default(), path)
                .map_err(|e| StorageError::DatabaseOpenFailed(e.to_string()))?;
        }

        let mut opts = Options::default();
        opts.create_if_missing(true);
        opts.set_write_buffer_size(config.write_buffer_size_mb * 1024 * 1024);
        opts.set_compression_type(match config.compression_type {
            CompressionType::None => rocksdb::DBCompressionType::None,
            CompressionType::Snappy => rocksdb::DBCompressionType::Snappy,
            CompressionType::Lz4 => rocksdb::DBCompressionType::Lz4,
            CompressionType::Zstd => rocksdb::DBCompressionType::Zstd,
        });

        let db = DB::open(&opts, path).map_err(|e| StorageError::DatabaseOpenFailed(e.to_string()))?;
        Ok(Self { db: Arc::new(db) })
    }

    /// Open with default tuning, creating the directory if needed
    pub fn open_default<P: AsRef<Path>>(path: P) -> BingoResult<Self> {
        Self::open(path, &StorageConfig::default())
    }
}

impl DocumentStore for RocksStore {
    fn get(&self, collection: Collection, id: &str) -> BingoResult<Option<Vec<u8>>> {
        self.db
            .get(collection.key(id))
            .map_err(|e| StorageError::ReadFailed(e.to_string()).into())
    }

    fn put(&self, collection: Collection, id: &str, document: &[u8]) -> BingoResult<()> {
        self.db.put(collection.key(id), document)?;
        Ok(())
    }

    fn delete(&self, collection: Collection, id: &str) -> BingoResult<()> {
        self.db.delete(collection.key(id))?;
        Ok(())
    }

    fn scan(&self, collection: Collection) -> BingoResult<Vec<(String, Vec<u8>)>> {
        let prefix = collection.prefix().as_bytes();
        let mut rows = Vec::new();
        for item in self.db.iterator(IteratorMode::From(prefix, Direction::Forward)) {
            let (key, value) = item.map_err(|e| StorageError::ReadFailed(e.to_string()))?;
            if !key.starts_with(prefix) {
                break;
            }
            let id = String::from_utf8_lossy(&key[prefix.len()..]).into_owned();
            rows.push((id, value.into_vec()));
        }
        Ok(rows)
    }
}

/// Ordered in-memory store. Writes can be made to fail for fault-injection tests.
#[derive(Default)]
pub struct MemoryStore {
    documents: RwLock<BTreeMap<Vec<u8>, Vec<u8>>>,
    fail_writes: AtomicBool,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    pub fn len(&self) -> usize {
        self.documents.read().map(|d| d.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn check_writable(&self) -> Result<(), StorageError> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(StorageError::WriteFailed("writes disabled".to_string()));
        }
        Ok(())
    }
}

fn poisoned() -> StorageError {
    StorageError::ReadFailed("memory store lock poisoned".to_string())
}

impl DocumentStore for MemoryStore {
    fn get(&self, collection: Collection, id: &str) -> BingoResult<Option<Vec<u8>>> {
        let documents = self.documents.read().map_err(|_| poisoned())?;
        Ok(documents.get(&collection.key(id)).cloned())
    }

    fn put(&self, collection: Collection, id: &str, document: &[u8]) -> BingoResult<()> {
        self.check_writable()?;
        let mut documents = self.documents.write().map_err(|_| poisoned())?;
        documents.insert(collection.key(id), document.to_vec());
        Ok(())
    }

    fn delete(&self, collection: Collection, id: &str) -> BingoResult<()> {
        self.check_writable()?;
        let mut documents = self.documents.write().map_err(|_| poisoned())?;
        documents.remove(&collection.key(id));
        Ok(())
    }

    fn scan(&self, collection: Collection) -> BingoResult<Vec<(String, Vec<u8>)>> {
        let prefix = collection.prefix().as_bytes();
        let documents = self.documents.read().map_err(|_| poisoned())?;
        Ok(documents
            .range(prefix.to_vec()..)
            .take_while(|(key, _)| key.starts_with(prefix))
            .map(|(key, value)| {
                (
                    String::from_utf8_lossy(&key[prefix.len()..]).into_owned(),
                    value.clone(),
                )
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn exercise(store: &dyn DocumentStore) {
        store.put(Collection::Games, "b", b"2").unwrap();
        store.put(Collection::Games, "a", b"1").unwrap();
        store.put(Collection::Rooms, "gold", b"room").unwrap();
        store.put(Collection::Users, "7", b"user").unwrap();

        assert_eq!(store.get(Collection::Games, "a").unwrap(), Some(b"1".to_vec()));
        assert_eq!(store.get(Collection::Games, "gold").unwrap(), None);

        let games = store.scan(Collection::Games).unwrap();
        assert_eq!(
            games,
            vec![("a".to_string(), b"1".to_vec()), ("b".to_string(), b"2".to_vec())]
        );

        store.delete(Collection::Games, "a").unwrap();
        assert_eq!(store.scan(Collection::Games).unwrap().len(), 1);
        assert_eq!(store.scan(Collection::Rooms).unwrap().len(), 1);
    }

    #[test]
    fn test_memory_store_collections() {
        exercise(&MemoryStore::new());
    }

    #[test]
    fn test_rocks_store_collections() {
        let dir = TempDir::new().unwrap();
        let store = RocksStore::open_default(dir.path()).unwrap();
        exercise(&store);
    }

    #[test]
    fn test_rocks_store_survives_reopen() {
        let dir = TempDir::new().unwrap();
        {
            let store = RocksStore::open_default(dir.path()).unwrap();
            store.put(Collection::Users, "1", b"alice").unwrap();
        }
        let store = RocksStore::open_default(dir.path()).unwrap();
        assert_eq!(store.get(Collection::Users, "1").unwrap(), Some(b"alice".to_vec()));
    }

    #[test]
    fn test_clear_on_start_wipes_documents() {
        let dir = TempDir::new().unwrap();
        {
            let store = RocksStore::open_default(dir.path()).unwrap();
            store.put(Collection::Users, "1", b"alice").unwrap();
        }
        let config = StorageConfig {
            clear_on_start: true,
            ..Default::default()
        };
        let store = RocksStore::open(dir.path(), &config).unwrap();
        assert!(store.scan(Collection::Users).unwrap().is_empty());
    }

    #[test]
    fn test_failing_writes() {
        let store = MemoryStore::new();
        store.put(Collection::Users, "1", b"x").unwrap();
        store.set_fail_writes(true);
        assert!(store.put(Collection::Users, "2", b"y").is_err());
        assert!(store.delete(Collection::Users, "1").is_err());
        assert_eq!(store.len(), 1);
    }
}
