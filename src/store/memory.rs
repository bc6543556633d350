//! In-memory partition store (default, thread-safe, async).
//!
//! Uses DashMap for lock-free concurrent access with per-key sharding.
//! Suitable for tests, demos, and single-process deployments; durable
//! deployments plug in their own [`PartitionStore`].

use super::PartitionStore;
use crate::error::Result;
use dashmap::DashMap;
use std::sync::Arc;

/// Thread-safe in-memory partition store.
///
/// Each partition is its own DashMap, created lazily on first write.
///
/// # Example
///
/// ```no_run
/// use offline_cache::store::{MemoryStore, PartitionStore};
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let store = MemoryStore::new();
///
///     store.put("dynamic-v1", "GET /api/clients", b"payload".to_vec()).await?;
///     let value = store.get("dynamic-v1", "GET /api/clients").await?;
///     assert!(value.is_some());
///
///     Ok(())
/// }
/// ```
#[derive(Clone, Default)]
pub struct MemoryStore {
    partitions: Arc<DashMap<String, Arc<DashMap<String, Vec<u8>>>>>,
}

impl MemoryStore {
    /// Create a new empty in-memory store.
    pub fn new() -> Self {
        MemoryStore {
            partitions: Arc::new(DashMap::new()),
        }
    }

    /// Number of entries in a partition (0 if absent).
    pub async fn len(&self, partition: &str) -> usize {
        self.partitions
            .get(partition)
            .map(|p| p.len())
            .unwrap_or(0)
    }

    /// Whether a partition is absent or empty.
    pub async fn is_empty(&self, partition: &str) -> bool {
        self.len(partition).await == 0
    }

    fn partition(&self, name: &str) -> Arc<DashMap<String, Vec<u8>>> {
        self.partitions
            .entry(name.to_string())
            .or_insert_with(|| Arc::new(DashMap::new()))
            .clone()
    }
}

impl PartitionStore for MemoryStore {
    async fn get(&self, partition: &str, key: &str) -> Result<Option<Vec<u8>>> {
        let value = self
            .partitions
            .get(partition)
            .and_then(|p| p.get(key).map(|e| e.clone()));

        match &value {
            Some(_) => debug!("✓ Memory GET {}/{} -> HIT", partition, key),
            None => debug!("✓ Memory GET {}/{} -> MISS", partition, key),
        }

        Ok(value)
    }

    async fn put(&self, partition: &str, key: &str, value: Vec<u8>) -> Result<()> {
        self.partition(partition).insert(key.to_string(), value);
        debug!("✓ Memory PUT {}/{}", partition, key);
        Ok(())
    }

    async fn delete(&self, partition: &str, key: &str) -> Result<()> {
        if let Some(p) = self.partitions.get(partition) {
            p.remove(key);
        }
        debug!("✓ Memory DELETE {}/{}", partition, key);
        Ok(())
    }

    async fn keys(&self, partition: &str) -> Result<Vec<String>> {
        let keys = self
            .partitions
            .get(partition)
            .map(|p| p.iter().map(|e| e.key().clone()).collect())
            .unwrap_or_default();
        Ok(keys)
    }

    async fn list_partitions(&self) -> Result<Vec<String>> {
        Ok(self.partitions.iter().map(|e| e.key().clone()).collect())
    }

    async fn delete_partition(&self, partition: &str) -> Result<()> {
        self.partitions.remove(partition);
        debug!("✓ Memory DELETE PARTITION {}", partition);
        Ok(())
    }
}
