//! Durable partition store implementations.

use crate::error::Result;
use std::future::Future;

pub mod memory;

pub use memory::MemoryStore;

/// Trait for durable partition storage.
///
/// A partition is a named key→bytes mapping. The interception engine is the
/// only writer; foreground code never opens a partition directly.
///
/// Implementations: in-memory (default), file-backed log, embedded KV store.
///
/// **IMPORTANT:** All methods use `&self` to allow concurrent access.
/// Implementations should use interior mutability (DashMap, RwLock, or
/// external storage).
///
/// Methods return `impl Future + Send` rather than plain `async fn` because
/// strategies write to the store from spawned revalidation tasks.
/// Implementations can still be written with `async fn`.
///
/// Writes must be atomic full replacements: a failed `put` leaves the
/// previous entry intact rather than corrupting the partition.
pub trait PartitionStore: Send + Sync + Clone + 'static {
    /// Retrieve an entry from a partition.
    ///
    /// # Returns
    /// - `Ok(Some(bytes))` - Entry found
    /// - `Ok(None)` - Miss (key or partition absent)
    ///
    /// # Errors
    /// Returns `Err` if the underlying storage fails.
    fn get(
        &self,
        partition: &str,
        key: &str,
    ) -> impl Future<Output = Result<Option<Vec<u8>>>> + Send;

    /// Store an entry in a partition, creating the partition if needed.
    ///
    /// # Errors
    /// Returns `Err` if the underlying storage fails.
    fn put(
        &self,
        partition: &str,
        key: &str,
        value: Vec<u8>,
    ) -> impl Future<Output = Result<()>> + Send;

    /// Remove an entry from a partition.
    ///
    /// # Errors
    /// Returns `Err` if the underlying storage fails.
    fn delete(&self, partition: &str, key: &str) -> impl Future<Output = Result<()>> + Send;

    /// List the keys of a partition.
    ///
    /// # Errors
    /// Returns `Err` if the underlying storage fails.
    fn keys(&self, partition: &str) -> impl Future<Output = Result<Vec<String>>> + Send;

    /// Enumerate all partition names.
    ///
    /// # Errors
    /// Returns `Err` if the underlying storage fails.
    fn list_partitions(&self) -> impl Future<Output = Result<Vec<String>>> + Send;

    /// Delete an entire partition and its entries.
    ///
    /// Deleting an absent partition is a no-op.
    ///
    /// # Errors
    /// Returns `Err` if the underlying storage fails.
    fn delete_partition(&self, partition: &str) -> impl Future<Output = Result<()>> + Send;

    /// Check whether an entry exists (optional optimization).
    ///
    /// # Errors
    /// Returns `Err` if the underlying storage fails.
    fn exists(&self, partition: &str, key: &str) -> impl Future<Output = Result<bool>> + Send {
        async move { Ok(self.get(partition, key).await?.is_some()) }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_store_exists_default() {
        let store = MemoryStore::new();
        store
            .put("dynamic-v1", "GET /api/clients", vec![1, 2, 3])
            .await
            .expect("Failed to put");

        assert!(store
            .exists("dynamic-v1", "GET /api/clients")
            .await
            .expect("Failed to check exists"));
        assert!(!store
            .exists("dynamic-v1", "GET /api/reports")
            .await
            .expect("Failed to check exists"));
    }
}
