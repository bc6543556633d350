//! Offline write replay example: deferred operations, the reconnect
//! signal, and foreground refresh.

use offline_cache::coordinator::{Coordinator, QueryKey, ReadState};
use offline_cache::engine::{CacheEngine, EngineConfig};
use offline_cache::entry::CachedResponse;
use offline_cache::error::{Error, Result};
use offline_cache::fetch::Fetcher;
use offline_cache::invalidation::InvalidationMap;
use offline_cache::queue::{MemoryOpStore, PendingQueue};
use offline_cache::request::{Method, Request};
use offline_cache::signal::{Signal, SignalBus};
use offline_cache::store::MemoryStore;
use offline_cache::strategy::RouteTable;

use futures::FutureExt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;

/// Mock backend that records the writes it receives.
#[derive(Clone)]
struct MockBackend {
    offline: Arc<AtomicBool>,
    received: Arc<Mutex<Vec<String>>>,
}

impl MockBackend {
    fn new() -> Self {
        MockBackend {
            offline: Arc::new(AtomicBool::new(false)),
            received: Arc::new(Mutex::new(Vec::new())),
        }
    }
}

impl Fetcher for MockBackend {
    async fn fetch(&self, request: &Request) -> Result<CachedResponse> {
        if self.offline.load(Ordering::SeqCst) {
            return Err(Error::Offline);
        }
        if !request.method.is_cacheable() {
            let payload = request
                .body
                .as_ref()
                .map(|b| String::from_utf8_lossy(b).to_string())
                .unwrap_or_default();
            println!("  [backend] {} {} <- {}", request.method, request.url, payload);
            self.received.lock().await.push(payload);
            return Ok(CachedResponse::new(201, vec![]));
        }
        Ok(CachedResponse::ok_json(br#"[{"id":"c1"}]"#.to_vec()))
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::Builder::from_default_env()
        .filter_level(log::LevelFilter::Info)
        .try_init()
        .ok();

    println!("\n=== offline-cache - Offline Replay Example ===\n");

    let backend = MockBackend::new();
    let queue = PendingQueue::open(MemoryOpStore::new()).await?;
    let engine = CacheEngine::new(
        MemoryStore::new(),
        backend.clone(),
        queue,
        RouteTable::new(),
        EngineConfig::new(1),
    );
    engine.install().await?;
    engine.activate().await?;

    // Foreground coordinator reading through the engine.
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

    // 1. Warm read while online
    println!("1. Foreground read while online:");
    let state = coordinator
        .read(QueryKey::new("clients"), read_clients.clone(), Duration::ZERO)
        .await;
    if let ReadState::Fresh(value) = &state {
        println!("   ✓ clients -> {}\n", value);
    }

    // 2. Connectivity drops; writes are deferred
    println!("2. Writing while offline:");
    backend.offline.store(true, Ordering::SeqCst);

    for name in ["acme", "globex"] {
        let ack = engine
            .handle(
                &Request::new(Method::Post, "/api/clients")
                    .with_body(format!(r#"{{"name":"{}"}}"#, name).into_bytes())
                    .deferred(),
            )
            .await?;
        println!("   ✓ POST /api/clients deferred -> {}", ack.status);
    }
    println!("   Queue depth: {}\n", engine.queue().len().await?);

    // 3. Reconnect signal: drain the queue, refresh stale foreground keys
    println!("3. Wiring the reconnect signal...");
    let bus = SignalBus::new();
    let handler = {
        let engine = engine.clone();
        let coordinator = coordinator.clone();
        bus.spawn_handler(move |signal| {
            let engine = engine.clone();
            let coordinator = coordinator.clone();
            async move {
                if signal == Signal::Reconnect {
                    match engine.drain_pending().await {
                        Ok(report) => println!(
                            "   ✓ Drained {} operation(s), {} remaining",
                            report.replayed, report.remaining
                        ),
                        Err(e) => eprintln!("   ✗ Drain failed: {}", e),
                    }
                }
                coordinator.refresh_stale();
            }
        })
    };

    backend.offline.store(false, Ordering::SeqCst);
    bus.emit(Signal::Reconnect);
    tokio::time::sleep(Duration::from_millis(100)).await;

    println!(
        "   Backend received {} write(s), queue depth now {}\n",
        backend.received.lock().await.len(),
        engine.queue().len().await?
    );

    handler.abort();
    println!("=== Done ===\n");
    Ok(())
}
