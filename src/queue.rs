//! Durable pending-operation queue for offline writes.
//!
//! Writes issued while offline are persisted as [`PendingOp`] records and
//! replayed when connectivity returns. Replay is strictly in enqueue order
//! and each operation is removed only after a confirmed success, which
//! yields at-least-once delivery: endpoints must be idempotent or tolerate
//! duplicate delivery.

use crate::entry::now_millis;
use crate::error::{Error, Result};
use crate::fetch::Fetcher;
use crate::request::{Method, Request};
use crate::serialization::{deserialize_from_cache, serialize_for_cache};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::Mutex;

/// A deferred write operation.
///
/// Never partially applied: replay is all-or-nothing per operation.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PendingOp {
    /// Monotonically increasing id; also the replay order.
    pub id: u64,
    /// Target endpoint URL.
    pub endpoint: String,
    /// HTTP method of the deferred write.
    pub method: Method,
    /// Serialized request payload.
    pub payload: Vec<u8>,
    /// Unix timestamp (milliseconds) at which the operation was enqueued.
    pub created_at: u64,
}

impl PendingOp {
    /// Reconstruct the outbound request for replay.
    pub fn to_request(&self) -> Request {
        Request::new(self.method, self.endpoint.clone()).with_body(self.payload.clone())
    }
}

/// Trait for durable pending-operation storage.
///
/// Deliberately minimal (`put/get/delete/list`) so the queue's logic stays
/// storage-agnostic: a file-backed log, embedded KV store, or in-memory
/// stub all satisfy it.
pub trait OpStore: Send + Sync + Clone + 'static {
    /// Persist an operation.
    ///
    /// # Errors
    /// Returns `Err` if the underlying storage fails.
    fn put(&self, op: &PendingOp) -> impl Future<Output = Result<()>> + Send;

    /// Load an operation by id.
    ///
    /// # Errors
    /// Returns `Err` if the underlying storage fails.
    fn get(&self, id: u64) -> impl Future<Output = Result<Option<PendingOp>>> + Send;

    /// Remove an operation by id.
    ///
    /// # Errors
    /// Returns `Err` if the underlying storage fails.
    fn delete(&self, id: u64) -> impl Future<Output = Result<()>> + Send;

    /// List all persisted operations, sorted by id ascending.
    ///
    /// # Errors
    /// Returns `Err` if the underlying storage fails.
    fn list(&self) -> impl Future<Output = Result<Vec<PendingOp>>> + Send;
}

/// In-memory operation store (tests, demos).
///
/// Operations are kept envelope-encoded, same as a durable store would.
#[derive(Clone, Default)]
pub struct MemoryOpStore {
    ops: Arc<DashMap<u64, Vec<u8>>>,
}

impl MemoryOpStore {
    pub fn new() -> Self {
        MemoryOpStore {
            ops: Arc::new(DashMap::new()),
        }
    }
}

impl OpStore for MemoryOpStore {
    async fn put(&self, op: &PendingOp) -> Result<()> {
        let bytes = serialize_for_cache(op)?;
        self.ops.insert(op.id, bytes);
        debug!("✓ OpStore PUT op {}", op.id);
        Ok(())
    }

    async fn get(&self, id: u64) -> Result<Option<PendingOp>> {
        match self.ops.get(&id) {
            Some(bytes) => Ok(Some(deserialize_from_cache(&bytes)?)),
            None => Ok(None),
        }
    }

    async fn delete(&self, id: u64) -> Result<()> {
        self.ops.remove(&id);
        debug!("✓ OpStore DELETE op {}", id);
        Ok(())
    }

    async fn list(&self) -> Result<Vec<PendingOp>> {
        let mut ops = Vec::with_capacity(self.ops.len());
        for entry in self.ops.iter() {
            ops.push(deserialize_from_cache::<PendingOp>(entry.value())?);
        }
        ops.sort_by_key(|op| op.id);
        Ok(ops)
    }
}

/// Outcome of a drain pass.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct DrainReport {
    /// Operations confirmed delivered and removed this pass.
    pub replayed: usize,
    /// Operations still queued after this pass.
    pub remaining: usize,
    /// Id of the operation whose replay failed, halting the drain.
    pub halted_at: Option<u64>,
    /// Whether this call found another drain already in flight and did
    /// nothing.
    pub coalesced: bool,
}

/// Durable queue of deferred writes.
///
/// # Example
///
/// ```ignore
/// let queue = PendingQueue::open(MemoryOpStore::new()).await?;
/// queue.enqueue("/api/clients", Method::Post, payload).await?;
/// // ... later, on a reconnect signal:
/// let report = queue.drain(&fetcher).await?;
/// ```
pub struct PendingQueue<S: OpStore> {
    store: S,
    next_id: AtomicU64,
    // Coalesces concurrent drains: at most one in flight.
    drain_lock: Mutex<()>,
}

impl<S: OpStore> PendingQueue<S> {
    /// Open a queue over the given store.
    ///
    /// The id counter resumes past the highest persisted id, so ids stay
    /// monotonic across restarts.
    ///
    /// # Errors
    /// Returns `Err` if the store cannot be listed.
    pub async fn open(store: S) -> Result<Self> {
        let ops = store.list().await?;
        let next_id = ops.last().map(|op| op.id + 1).unwrap_or(1);

        if !ops.is_empty() {
            info!(
                "Pending queue opened with {} undelivered operation(s)",
                ops.len()
            );
        }

        Ok(PendingQueue {
            store,
            next_id: AtomicU64::new(next_id),
            drain_lock: Mutex::new(()),
        })
    }

    /// Persist a deferred write and assign it the next id.
    ///
    /// # Errors
    /// Returns `Err` if the operation cannot be persisted.
    pub async fn enqueue(
        &self,
        endpoint: impl Into<String>,
        method: Method,
        payload: Vec<u8>,
    ) -> Result<PendingOp> {
        let op = PendingOp {
            id: self.next_id.fetch_add(1, Ordering::SeqCst),
            endpoint: endpoint.into(),
            method,
            payload,
            created_at: now_millis(),
        };

        self.store.put(&op).await?;
        info!("Deferred {} {} as pending op {}", op.method, op.endpoint, op.id);
        Ok(op)
    }

    /// Replay queued operations strictly in enqueue order.
    ///
    /// Each operation is removed only after the endpoint confirms success
    /// (a 2xx response). The first failure halts the drain and leaves the
    /// remainder queued for the next reconnect signal. Concurrent drain
    /// calls are coalesced: the second call returns immediately with
    /// `coalesced: true`.
    ///
    /// # Errors
    /// Returns `Err` only for store failures; replay failures are reported
    /// through [`DrainReport::halted_at`].
    pub async fn drain<F: Fetcher>(&self, fetcher: &F) -> Result<DrainReport> {
        let _guard = match self.drain_lock.try_lock() {
            Ok(guard) => guard,
            Err(_) => {
                debug!("Drain already in flight, coalescing");
                return Ok(DrainReport {
                    coalesced: true,
                    ..DrainReport::default()
                });
            }
        };

        let ops = self.store.list().await?;
        let total = ops.len();
        let mut report = DrainReport::default();

        for op in ops {
            let delivered = match fetcher.fetch(&op.to_request()).await {
                Ok(response) => response.is_success(),
                Err(e) => {
                    debug!("Replay of op {} failed: {}", op.id, e);
                    false
                }
            };

            if !delivered {
                warn!(
                    "Drain halted at op {} ({} {}); {} operation(s) left queued",
                    op.id,
                    op.method,
                    op.endpoint,
                    total - report.replayed
                );
                report.halted_at = Some(op.id);
                break;
            }

            // Confirmed success: only now is the operation removed.
            self.store.delete(op.id).await?;
            report.replayed += 1;
        }

        report.remaining = total - report.replayed;
        if report.halted_at.is_none() && report.replayed > 0 {
            info!("✓ Drained {} pending operation(s)", report.replayed);
        }
        Ok(report)
    }

    /// Number of operations currently queued.
    ///
    /// # Errors
    /// Returns `Err` if the store cannot be listed.
    pub async fn len(&self) -> Result<usize> {
        Ok(self.store.list().await?.len())
    }

    /// Whether the queue is empty.
    ///
    /// # Errors
    /// Returns `Err` if the store cannot be listed.
    pub async fn is_empty(&self) -> Result<bool> {
        Ok(self.len().await? == 0)
    }

    /// Store reference (for advanced use).
    pub fn store(&self) -> &S {
        &self.store
    }
}

impl<S: OpStore> PendingQueue<S> {
    /// Snapshot of queued operations in replay order.
    ///
    /// # Errors
    /// Returns `Err` if the store cannot be listed.
    pub async fn snapshot(&self) -> Result<Vec<PendingOp>> {
        self.store.list().await
    }
}
