//! Basic usage example: engine lifecycle and the three strategies.

use offline_cache::engine::{CacheEngine, EngineConfig};
use offline_cache::entry::CachedResponse;
use offline_cache::error::{Error, Result};
use offline_cache::fetch::Fetcher;
use offline_cache::queue::{MemoryOpStore, PendingQueue};
use offline_cache::request::Request;
use offline_cache::store::MemoryStore;
use offline_cache::strategy::{RouteTable, Strategy};

use dashmap::DashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Mock network that simulates a backend with an on/off switch.
#[derive(Clone)]
struct MockNetwork {
    responses: Arc<DashMap<String, Vec<u8>>>,
    offline: Arc<AtomicBool>,
}

impl MockNetwork {
    fn new() -> Self {
        let responses = DashMap::new();
        responses.insert("/index.html".to_string(), b"<html>dashboard</html>".to_vec());
        responses.insert("/assets/app.js".to_string(), b"console.log('app')".to_vec());
        responses.insert(
            "/api/clients".to_string(),
            br#"[{"id":"c1","name":"Acme Corp"}]"#.to_vec(),
        );
        responses.insert(
            "/api/dashboard/summary".to_string(),
            br#"{"active_clients":12,"open_reports":3}"#.to_vec(),
        );

        MockNetwork {
            responses: Arc::new(responses),
            offline: Arc::new(AtomicBool::new(false)),
        }
    }

    fn go_offline(&self) {
        self.offline.store(true, Ordering::SeqCst);
        println!("  [network] connection lost");
    }
}

impl Fetcher for MockNetwork {
    async fn fetch(&self, request: &Request) -> Result<CachedResponse> {
        if self.offline.load(Ordering::SeqCst) {
            return Err(Error::Offline);
        }
        println!("  [network] {} {}", request.method, request.url);
        match self.responses.get(&request.url) {
            Some(body) => Ok(CachedResponse::ok_json(body.clone())),
            None => Ok(CachedResponse::new(404, vec![])),
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    env_logger::Builder::from_default_env()
        .filter_level(log::LevelFilter::Debug)
        .try_init()
        .ok();

    println!("\n=== offline-cache - Basic Example ===\n");

    // 1. Route table: which strategy governs which URL prefix
    println!("1. Configuring routes...");
    let routes = RouteTable::new()
        .route("/assets/", Strategy::CacheFirst)
        .route("/api/dashboard/", Strategy::StaleWhileRevalidate)
        .route("/api/", Strategy::NetworkFirst);
    println!("   ✓ {} routes configured\n", routes.len());

    // 2. Engine lifecycle: install precaches, activate promotes
    println!("2. Installing engine v1...");
    let network = MockNetwork::new();
    let queue = PendingQueue::open(MemoryOpStore::new()).await?;
    let config = EngineConfig::new(1)
        .with_manifest(vec!["/index.html".into(), "/assets/app.js".into()]);
    let engine = CacheEngine::new(MemoryStore::new(), network.clone(), queue, routes, config);

    engine.install().await?;
    engine.activate().await?;
    println!("   ✓ Engine state: {}\n", engine.state());

    // 3. Online reads populate the dynamic partition
    println!("3. Reading while online:");
    let clients = engine.handle(&Request::get("/api/clients")).await?;
    println!("   ✓ /api/clients -> {} ({} bytes)", clients.status, clients.body.len());
    let summary = engine.handle(&Request::get("/api/dashboard/summary")).await?;
    println!("   ✓ /api/dashboard/summary -> {}\n", summary.status);

    // 4. Offline: cached endpoints keep working
    println!("4. Reading while offline:");
    network.go_offline();

    let clients = engine.handle(&Request::get("/api/clients")).await?;
    println!(
        "   ✓ /api/clients served from cache -> {} ({} bytes)",
        clients.status,
        clients.body.len()
    );

    let asset = engine.handle(&Request::get("/assets/app.js")).await?;
    println!("   ✓ /assets/app.js served from precache -> {}", asset.status);

    // 5. Never-cached endpoint: a synthesized offline response, not a crash
    let missing = engine.handle(&Request::get("/api/reports")).await?;
    println!(
        "   ✓ /api/reports (never cached) -> {} offline fallback: {}\n",
        missing.status,
        missing.is_offline_fallback()
    );

    println!("=== Done ===\n");
    Ok(())
}
