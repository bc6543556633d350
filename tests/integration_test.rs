//! Integration tests for offline-cache
//!
//! These tests verify end-to-end offline behavior across the interception
//! engine, the pending-operation queue, the foreground coordinator, and the
//! signal wiring between them.

use offline_cache::coordinator::{Coordinator, QueryKey, ReadState};
use offline_cache::engine::{CacheEngine, EngineConfig, EngineState};
use offline_cache::entry::CachedResponse;
use offline_cache::error::{Error, Result};
use offline_cache::fetch::Fetcher;
use offline_cache::invalidation::{InvalidationMap, MutationEvent};
use offline_cache::queue::{MemoryOpStore, PendingQueue};
use offline_cache::request::{Method, Request};
use offline_cache::signal::{Signal, SignalBus};
use offline_cache::store::{MemoryStore, PartitionStore};
use offline_cache::strategy::{RouteTable, Strategy};

use dashmap::DashMap;
use futures::FutureExt;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;

/// Scripted network: URL → canned response, with an offline toggle and a
/// log of delivered write requests.
#[derive(Clone, Default)]
struct FakeNetwork {
    responses: Arc<DashMap<String, CachedResponse>>,
    offline: Arc<AtomicBool>,
    calls: Arc<AtomicUsize>,
    writes: Arc<Mutex<Vec<String>>>,
}

impl FakeNetwork {
    fn new() -> Self {
        Self::default()
    }

    fn respond(&self, url: &str, response: CachedResponse) {
        self.responses.insert(url.to_string(), response);
    }

    fn respond_json(&self, url: &str, body: &[u8]) {
        self.respond(url, CachedResponse::ok_json(body.to_vec()));
    }

    fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl Fetcher for FakeNetwork {
    async fn fetch(&self, request: &Request) -> Result<CachedResponse> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.offline.load(Ordering::SeqCst) {
            return Err(Error::Offline);
        }
        if !request.method.is_cacheable() {
            self.writes
                .lock()
                .await
                .push(format!("{} {}", request.method, request.url));
            return Ok(CachedResponse::new(201, vec![]));
        }
        match self.responses.get(&request.url) {
            Some(response) => Ok(response.clone()),
            None => Ok(CachedResponse::new(404, vec![])),
        }
    }
}

fn standard_routes() -> RouteTable {
    RouteTable::new()
        .route("/assets/", Strategy::CacheFirst)
        .route("/api/dashboard/", Strategy::StaleWhileRevalidate)
        .route("/api/", Strategy::NetworkFirst)
}

async fn active_engine(
    network: FakeNetwork,
    store: MemoryStore,
    config: EngineConfig,
) -> CacheEngine<MemoryStore, FakeNetwork, MemoryOpStore> {
    let queue = PendingQueue::open(MemoryOpStore::new())
        .await
        .expect("Failed to open queue");
    let engine = CacheEngine::new(store, network, queue, standard_routes(), config);
    engine.install().await.expect("Failed to install");
    engine.activate().await.expect("Failed to activate");
    engine
}

/// Test 1: End-to-End Offline Session
///
/// Verifies the complete offline round trip:
/// - Online reads populate the dynamic partition
/// - Offline reads of cached endpoints are served from cache
/// - Offline reads of uncached endpoints get the synthesized 503
/// - Deferred offline writes are queued and acknowledged with 202
/// - Reconnecting drains the queue in enqueue order
#[tokio::test]
async fn test_end_to_end_offline_session() {
    let network = FakeNetwork::new();
    network.respond_json("/api/clients", br#"[{"id":"c1"}]"#);
    network.respond_json("/index.html", b"<html>");

    let config = EngineConfig::new(1).with_manifest(vec!["/index.html".into()]);
    let engine = active_engine(network.clone(), MemoryStore::new(), config).await;

    // Online: the read goes to the network and lands in the cache.
    let online = engine
        .handle(&Request::get("/api/clients"))
        .await
        .expect("Failed to handle");
    assert_eq!(online.status, 200);

    // Connectivity is lost.
    network.set_offline(true);

    // Cached endpoint: served from the dynamic partition.
    let cached = engine
        .handle(&Request::get("/api/clients"))
        .await
        .expect("Failed to handle");
    assert_eq!(cached.body, online.body);

    // Precached asset: served from the static partition.
    let asset = engine
        .handle(&Request::get("/index.html"))
        .await
        .expect("Failed to handle");
    assert_eq!(asset.body, b"<html>");

    // Never-seen endpoint: synthesized offline response, not an error.
    let missing = engine
        .handle(&Request::get("/api/reports"))
        .await
        .expect("Failed to handle");
    assert!(missing.is_offline_fallback());

    // Two deferred writes while offline, both acknowledged with 202.
    for body in [&b"one"[..], &b"two"[..]] {
        let ack = engine
            .handle(
                &Request::new(Method::Post, "/api/clients")
                    .with_body(body.to_vec())
                    .deferred(),
            )
            .await
            .expect("Failed to handle");
        assert_eq!(ack.status, 202);
    }
    assert_eq!(engine.queue().len().await.expect("Failed to count"), 2);

    // Reconnect: both writes replay, in order, and the queue empties.
    network.set_offline(false);
    let report = engine.drain_pending().await.expect("Failed to drain");
    assert_eq!(report.replayed, 2);
    assert_eq!(report.remaining, 0);
    assert!(engine.queue().is_empty().await.expect("Failed to check"));
    assert_eq!(
        *network.writes.lock().await,
        vec!["POST /api/clients", "POST /api/clients"]
    );
}

/// Test 2: Version Upgrade
///
/// A new engine version installs alongside the active one, and activating
/// it atomically evicts every partition of the old version.
#[tokio::test]
async fn test_version_upgrade_evicts_old_partitions() {
    let network = FakeNetwork::new();
    network.respond_json("/index.html", b"v1");
    let store = MemoryStore::new();

    let v1 = active_engine(
        network.clone(),
        store.clone(),
        EngineConfig::new(1).with_manifest(vec!["/index.html".into()]),
    )
    .await;

    // v1 serves traffic and fills its dynamic partition.
    network.respond_json("/api/clients", b"[]");
    v1.handle(&Request::get("/api/clients"))
        .await
        .expect("Failed to handle");
    assert!(!store.is_empty("dynamic-v1").await);

    // v2 installs while v1 is still active; v1 partitions survive install.
    network.respond_json("/index.html", b"v2");
    let queue = PendingQueue::open(MemoryOpStore::new())
        .await
        .expect("Failed to open queue");
    let v2 = CacheEngine::new(
        store.clone(),
        network.clone(),
        queue,
        standard_routes(),
        EngineConfig::new(2).with_manifest(vec!["/index.html".into()]),
    );
    v2.install().await.expect("Failed to install");
    assert_eq!(v2.state(), EngineState::Waiting);
    assert!(!store.is_empty("dynamic-v1").await);

    // Promotion: v1 retires, every v1 partition is gone, v2 serves.
    v1.retire();
    v2.activate().await.expect("Failed to activate");

    let mut partitions = store.list_partitions().await.expect("Failed to list");
    partitions.sort();
    assert_eq!(partitions, vec!["static-v2"]);
    assert_eq!(v1.state(), EngineState::Redundant);
    assert_eq!(v2.state(), EngineState::Active);

    let asset = v2
        .handle(&Request::get("/index.html"))
        .await
        .expect("Failed to handle");
    assert_eq!(asset.body, b"v2");
}

/// Test 3: Interrupted Drain
///
/// A drain halted mid-way (connectivity lost again) leaves the remainder
/// queued; reopening the queue over the same store resumes exactly where
/// it left off, preserving order and losing nothing.
#[tokio::test]
async fn test_interrupted_drain_resumes_after_restart() {
    /// Succeeds for `allow` replays, then reports offline.
    #[derive(Clone)]
    struct DroppingNetwork {
        allow: Arc<AtomicUsize>,
        delivered: Arc<Mutex<Vec<u64>>>,
    }

    impl Fetcher for DroppingNetwork {
        async fn fetch(&self, request: &Request) -> Result<CachedResponse> {
            if self.allow.load(Ordering::SeqCst) == 0 {
                return Err(Error::Offline);
            }
            self.allow.fetch_sub(1, Ordering::SeqCst);
            let id: u64 = request
                .body
                .as_ref()
                .and_then(|b| std::str::from_utf8(b).ok())
                .and_then(|s| s.parse().ok())
                .expect("test ops carry numeric bodies");
            self.delivered.lock().await.push(id);
            Ok(CachedResponse::new(200, vec![]))
        }
    }

    let op_store = MemoryOpStore::new();
    let queue = PendingQueue::open(op_store.clone())
        .await
        .expect("Failed to open queue");
    for n in 1..=3u64 {
        queue
            .enqueue("/api/clients", Method::Post, n.to_string().into_bytes())
            .await
            .expect("Failed to enqueue");
    }

    let network = DroppingNetwork {
        allow: Arc::new(AtomicUsize::new(1)),
        delivered: Arc::new(Mutex::new(Vec::new())),
    };

    // First drain delivers op 1, then connectivity drops.
    let report = queue.drain(&network).await.expect("Failed to drain");
    assert_eq!(report.replayed, 1);
    assert_eq!(report.remaining, 2);
    assert!(report.halted_at.is_some());

    // Process restart: a fresh queue over the same store.
    drop(queue);
    let queue = PendingQueue::open(op_store).await.expect("Failed to open");
    assert_eq!(queue.len().await.expect("Failed to count"), 2);

    // Connectivity returns; the remainder replays in the original order.
    network.allow.store(usize::MAX, Ordering::SeqCst);
    let report = queue.drain(&network).await.expect("Failed to drain");
    assert_eq!(report.replayed, 2);
    assert_eq!(*network.delivered.lock().await, vec![1, 2, 3]);
}

/// Test 4: Coordinator Reads Through the Engine
///
/// The foreground coordinator's fetch closure goes through the engine, so
/// foreground reads inherit offline fallback for free: with the network
/// gone, a read of a previously cached endpoint still yields data.
#[tokio::test]
async fn test_coordinator_reads_through_engine_while_offline() {
    let network = FakeNetwork::new();
    network.respond_json("/api/clients", br#"[{"id":"c1"}]"#);
    let engine = active_engine(network.clone(), MemoryStore::new(), EngineConfig::new(1)).await;

    let coordinator: Coordinator<serde_json::Value> =
        Coordinator::new(InvalidationMap::standard());

    let read_clients = {
        let engine = engine.clone();
        move || {
            let engine = engine.clone();
            async move {
                let response = engine.handle(&Request::get("/api/clients")).await?;
                response.body_json()
            }
            .boxed()
        }
    };

    // Warm read while online.
    let state = coordinator
        .read(
            QueryKey::new("clients"),
            read_clients.clone(),
            Duration::ZERO,
        )
        .await;
    assert!(state.is_fresh());

    // Offline: the stale foreground entry refreshes through the engine,
    // which serves its cached copy, so the data survives.
    network.set_offline(true);
    let state = coordinator
        .read(QueryKey::new("clients"), read_clients, Duration::ZERO)
        .await;
    let value = state.into_value().expect("value must survive offline");
    assert_eq!(value[0]["id"], "c1");
}

/// Test 5: Concurrent Foreground Reads
///
/// Two components read the same key at the same moment: exactly one
/// network fetch happens and both observe its result.
#[tokio::test]
async fn test_concurrent_foreground_reads_share_one_fetch() {
    let network = FakeNetwork::new();
    network.respond_json("/api/trend?client=A&window=5000", br#"{"points":[1,2]}"#);
    let engine = active_engine(network.clone(), MemoryStore::new(), EngineConfig::new(1)).await;

    let coordinator: Coordinator<serde_json::Value> =
        Coordinator::new(InvalidationMap::standard());
    let key = QueryKey::new("trend")
        .with_param("client", "A")
        .with_param("window", "5000");

    let fetcher = {
        let engine = engine.clone();
        move || {
            let engine = engine.clone();
            async move {
                let response = engine
                    .handle(&Request::get("/api/trend?client=A&window=5000"))
                    .await?;
                response.body_json()
            }
            .boxed()
        }
    };

    let mut readers = Vec::new();
    for _ in 0..4 {
        let coordinator = coordinator.clone();
        let key = key.clone();
        let fetcher = fetcher.clone();
        readers.push(tokio::spawn(async move {
            coordinator.read(key, fetcher, Duration::from_secs(60)).await
        }));
    }

    for reader in readers {
        let state = reader.await.expect("Task failed");
        let value = state.into_value().expect("read must yield data");
        assert_eq!(value["points"][0], 1);
    }

    // One interception, one network call.
    assert_eq!(network.call_count(), 1);
}

/// Test 6: Deletion Invalidation
///
/// After a delete event, the by-id key reads as absent and the collection
/// key refetches, so no component can observe the deleted entity.
#[tokio::test]
async fn test_delete_event_prevents_stale_reads() {
    let coordinator: Coordinator<String> = Coordinator::new(InvalidationMap::standard());
    let calls = Arc::new(AtomicUsize::new(0));

    let fetch = |value: &'static str, calls: Arc<AtomicUsize>| {
        move || {
            calls.fetch_add(1, Ordering::SeqCst);
            async move { Ok(value.to_string()) }.boxed()
        }
    };

    let by_id = QueryKey::new("clients").with_param("id", "c9");
    let collection = QueryKey::new("clients");
    coordinator
        .read(
            by_id.clone(),
            fetch("client c9", calls.clone()),
            Duration::from_secs(60),
        )
        .await;
    coordinator
        .read(
            collection.clone(),
            fetch("all clients", calls.clone()),
            Duration::from_secs(60),
        )
        .await;
    assert_eq!(calls.load(Ordering::SeqCst), 2);

    coordinator.invalidate(&MutationEvent::EntityDeleted {
        entity: "clients".to_string(),
        id: "c9".to_string(),
    });

    // Both keys are gone; nothing can serve the deleted entity.
    assert!(!coordinator.contains(&by_id));
    assert!(!coordinator.contains(&collection));

    // Repeating the event is a no-op.
    coordinator.invalidate(&MutationEvent::EntityDeleted {
        entity: "clients".to_string(),
        id: "c9".to_string(),
    });
    assert!(coordinator.is_empty());
}

/// Test 7: Reconnect Signal Wiring
///
/// A reconnect signal drains the pending queue and refreshes stale
/// foreground keys; a visibility signal refreshes but never drains.
#[tokio::test]
async fn test_reconnect_signal_drains_and_refreshes() {
    let network = FakeNetwork::new();
    network.set_offline(true);
    let engine = active_engine(network.clone(), MemoryStore::new(), EngineConfig::new(1)).await;

    // One deferred write queued while offline.
    engine
        .handle(
            &Request::new(Method::Post, "/api/clients")
                .with_body(b"payload".to_vec())
                .deferred(),
        )
        .await
        .expect("Failed to handle");
    assert_eq!(engine.queue().len().await.expect("Failed to count"), 1);

    let coordinator: Coordinator<String> = Coordinator::new(InvalidationMap::standard());
    let refreshes = Arc::new(AtomicUsize::new(0));
    {
        let refreshes = refreshes.clone();
        coordinator
            .read(
                QueryKey::new("clients"),
                move || {
                    refreshes.fetch_add(1, Ordering::SeqCst);
                    async move { Ok("clients".to_string()) }.boxed()
                },
                Duration::ZERO,
            )
            .await;
    }
    let baseline = refreshes.load(Ordering::SeqCst);

    let bus = SignalBus::new();
    let handler = {
        let engine = engine.clone();
        let coordinator = coordinator.clone();
        bus.spawn_handler(move |signal| {
            let engine = engine.clone();
            let coordinator = coordinator.clone();
            async move {
                if signal == Signal::Reconnect {
                    if let Err(e) = engine.drain_pending().await {
                        eprintln!("drain failed: {}", e);
                    }
                }
                coordinator.refresh_stale();
            }
        })
    };

    network.set_offline(false);
    bus.emit(Signal::Reconnect);
    tokio::time::sleep(Duration::from_millis(50)).await;

    assert!(engine.queue().is_empty().await.expect("Failed to check"));
    assert!(refreshes.load(Ordering::SeqCst) > baseline);

    // Visibility refreshes stale keys but leaves the queue alone.
    network.set_offline(true);
    engine
        .handle(
            &Request::new(Method::Post, "/api/clients")
                .with_body(b"late".to_vec())
                .deferred(),
        )
        .await
        .expect("Failed to handle");

    let before_visible = refreshes.load(Ordering::SeqCst);
    bus.emit(Signal::BecameVisible);
    tokio::time::sleep(Duration::from_millis(50)).await;

    assert_eq!(engine.queue().len().await.expect("Failed to count"), 1);
    assert!(refreshes.load(Ordering::SeqCst) >= before_visible);

    handler.abort();
}

/// Test 8: Offline First Load
///
/// With nothing cached and no network, the foreground read surfaces an
/// explicit error state instead of hanging or panicking.
#[tokio::test]
async fn test_offline_first_load_yields_error_state() {
    let coordinator: Coordinator<String> = Coordinator::new(InvalidationMap::standard());

    let state = coordinator
        .read(
            QueryKey::new("reports"),
            || async { Err(Error::Offline) }.boxed(),
            Duration::from_secs(5),
        )
        .await;

    assert!(matches!(state, ReadState::Error(Error::Offline)));
}
