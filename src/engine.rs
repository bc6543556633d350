//! Interception cache engine.
//!
//! The engine runs in its own background execution context, observes every
//! outbound request in its scope, and serves or updates the durable cache
//! partitions according to the route strategy table. It shares no memory
//! with foreground code; the partitions and the pending-operation queue are
//! its only durable surface.
//!
//! # Lifecycle
//!
//! ```text
//! Installing ──install()──▶ Waiting ──activate()──▶ Activating ──▶ Active ──retire()──▶ Redundant
//!      │                                                 (all stale partitions deleted)
//!      └── any precache failure ──▶ Redundant (this version never serves)
//! ```
//!
//! A new engine version may sit in `Waiting` while an old one is still
//! `Active`; `activate()` is the explicit skip-signal that promotes it.

use crate::entry::CachedResponse;
use crate::error::{Error, Result};
use crate::fetch::Fetcher;
use crate::partition::PartitionSet;
use crate::queue::{DrainReport, OpStore, PendingQueue};
use crate::request::Request;
use crate::store::PartitionStore;
use crate::strategy::{RouteTable, Strategy};
use std::fmt;
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Engine lifecycle state.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EngineState {
    /// Precaching the critical-asset manifest into the static partition.
    Installing,
    /// Precache complete; waiting for promotion.
    Waiting,
    /// Evicting partitions from older versions.
    Activating,
    /// Intercepting requests.
    Active,
    /// Replaced by a newer version (or failed to install); serves nothing.
    Redundant,
}

impl fmt::Display for EngineState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            EngineState::Installing => "installing",
            EngineState::Waiting => "waiting",
            EngineState::Activating => "activating",
            EngineState::Active => "active",
            EngineState::Redundant => "redundant",
        };
        write!(f, "{}", s)
    }
}

/// Engine configuration.
///
/// # Example
///
/// ```
/// use offline_cache::engine::EngineConfig;
/// use std::time::Duration;
///
/// let config = EngineConfig::new(2)
///     .with_manifest(vec!["/index.html".into(), "/app.js".into()])
///     .with_network_timeout(Duration::from_secs(3))
///     .treat_http_error_as_failure(true);
/// ```
#[derive(Clone, Debug)]
pub struct EngineConfig {
    /// Cache version; bumping it evicts all older-versioned partitions
    /// during activation.
    pub cache_version: u32,
    /// URLs precached into the static partition during install.
    pub precache_manifest: Vec<String>,
    /// Bounded wait for network-first fetches.
    pub network_timeout: Duration,
    /// Whether a non-2xx response counts as a failure for network-first
    /// fallback purposes.
    pub treat_http_error_as_failure: bool,
}

impl EngineConfig {
    /// Create a configuration for the given cache version.
    pub fn new(cache_version: u32) -> Self {
        EngineConfig {
            cache_version,
            precache_manifest: Vec::new(),
            network_timeout: Duration::from_secs(5),
            treat_http_error_as_failure: false,
        }
    }

    /// Set the precache manifest.
    pub fn with_manifest(mut self, manifest: Vec<String>) -> Self {
        self.precache_manifest = manifest;
        self
    }

    /// Set the bounded wait for network-first fetches.
    pub fn with_network_timeout(mut self, timeout: Duration) -> Self {
        self.network_timeout = timeout;
        self
    }

    /// Treat non-2xx responses as failures for fallback purposes.
    pub fn treat_http_error_as_failure(mut self, yes: bool) -> Self {
        self.treat_http_error_as_failure = yes;
        self
    }
}

/// Background request-interception engine.
///
/// Owns the versioned cache partitions, applies the route strategy table,
/// and runs the pending-operation queue for offline writes. Cheap to clone;
/// clones share all state.
///
/// # Example
///
/// ```ignore
/// let engine = CacheEngine::new(store, fetcher, queue, routes, EngineConfig::new(2));
/// engine.install().await?;
/// engine.activate().await?;
///
/// let response = engine.handle(&Request::get("/api/clients")).await?;
/// ```
#[derive(Clone)]
pub struct CacheEngine<S: PartitionStore, F: Fetcher, Q: OpStore> {
    store: S,
    fetcher: F,
    queue: Arc<PendingQueue<Q>>,
    routes: Arc<RouteTable>,
    partitions: PartitionSet,
    config: Arc<EngineConfig>,
    state: Arc<Mutex<EngineState>>,
}

impl<S: PartitionStore, F: Fetcher, Q: OpStore> CacheEngine<S, F, Q> {
    /// Create an engine in the `Installing` state.
    pub fn new(
        store: S,
        fetcher: F,
        queue: PendingQueue<Q>,
        routes: RouteTable,
        config: EngineConfig,
    ) -> Self {
        let partitions = PartitionSet::new(config.cache_version);
        CacheEngine {
            store,
            fetcher,
            queue: Arc::new(queue),
            routes: Arc::new(routes),
            partitions,
            config: Arc::new(config),
            state: Arc::new(Mutex::new(EngineState::Installing)),
        }
    }

    /// Current lifecycle state.
    pub fn state(&self) -> EngineState {
        *self.state.lock().expect("engine state lock poisoned")
    }

    fn set_state(&self, next: EngineState) {
        let mut state = self.state.lock().expect("engine state lock poisoned");
        debug!("Engine v{}: {} -> {}", self.partitions.version(), state, next);
        *state = next;
    }

    /// Precache the manifest into the static partition.
    ///
    /// Any precache fetch failure is fatal to this engine version: the
    /// state becomes `Redundant` and the engine never activates, leaving
    /// the previous version (if any) serving traffic.
    ///
    /// # Errors
    /// - `Error::ConfigError`: called outside the `Installing` state
    /// - `Error::PrecacheFailed`: a manifest fetch failed or returned non-2xx
    pub async fn install(&self) -> Result<()> {
        if self.state() != EngineState::Installing {
            return Err(Error::ConfigError(format!(
                "install called in state {}",
                self.state()
            )));
        }

        let partition = self.partitions.static_partition();
        info!(
            "Engine v{}: precaching {} asset(s) into {}",
            self.partitions.version(),
            self.config.precache_manifest.len(),
            partition
        );

        for url in &self.config.precache_manifest {
            let request = Request::get(url.clone());
            let result = match self.fetcher.fetch(&request).await {
                Ok(response) if response.is_success() => {
                    let bytes = response.to_cache_bytes()?;
                    self.store.put(&partition, &request.entry_key(), bytes).await
                }
                Ok(response) => Err(Error::PrecacheFailed(format!(
                    "{} returned status {}",
                    url, response.status
                ))),
                Err(e) => Err(Error::PrecacheFailed(format!("{}: {}", url, e))),
            };

            if let Err(e) = result {
                warn!(
                    "Engine v{}: install failed, version is dead: {}",
                    self.partitions.version(),
                    e
                );
                self.set_state(EngineState::Redundant);
                return Err(match e {
                    e @ Error::PrecacheFailed(_) => e,
                    other => Error::PrecacheFailed(other.to_string()),
                });
            }
        }

        self.set_state(EngineState::Waiting);
        Ok(())
    }

    /// Promote this engine version: evict stale partitions and go active.
    ///
    /// This is the explicit skip-signal. All deletions settle before the
    /// state becomes `Active`.
    ///
    /// # Errors
    /// - `Error::ConfigError`: called outside the `Waiting` state
    /// - `Error::StorageError`: partition enumeration or deletion failed
    pub async fn activate(&self) -> Result<()> {
        if self.state() != EngineState::Waiting {
            return Err(Error::ConfigError(format!(
                "activate called in state {}",
                self.state()
            )));
        }
        self.set_state(EngineState::Activating);

        for name in self.store.list_partitions().await? {
            if self.partitions.is_stale(&name) {
                info!(
                    "Engine v{}: evicting stale partition {}",
                    self.partitions.version(),
                    name
                );
                self.store.delete_partition(&name).await?;
            }
        }

        self.set_state(EngineState::Active);
        Ok(())
    }

    /// Mark this engine version as replaced.
    pub fn retire(&self) {
        self.set_state(EngineState::Redundant);
    }

    /// Handle an intercepted request.
    ///
    /// Only GETs participate in caching; other methods pass through to the
    /// network and, if they fail offline with `defer_offline` set, are
    /// queued and acknowledged with a synthesized 202. When the engine is
    /// not `Active` it does not intercept at all: the request goes straight
    /// to the network.
    ///
    /// Never returns a bare network failure for a cache-eligible request:
    /// the worst case is the synthesized 503 offline response.
    ///
    /// # Errors
    /// Returns `Err` for storage failures, serialization failures, and
    /// network failures on non-deferrable non-GET requests.
    pub async fn handle(&self, request: &Request) -> Result<CachedResponse> {
        if self.state() != EngineState::Active {
            return self.fetcher.fetch(request).await;
        }

        if !request.method.is_cacheable() {
            return self.handle_write(request).await;
        }

        let strategy = self.routes.match_url(&request.url);
        debug!(
            "» {} {} (strategy: {})",
            request.method, request.url, strategy
        );

        match strategy {
            Strategy::CacheFirst => self.cache_first(request).await,
            Strategy::NetworkFirst => self.network_first(request).await,
            Strategy::StaleWhileRevalidate => self.stale_while_revalidate(request).await,
        }
    }

    /// Replay queued offline writes through this engine's fetcher.
    ///
    /// Wire this to the reconnect signal.
    ///
    /// # Errors
    /// Returns `Err` if the queue store fails.
    pub async fn drain_pending(&self) -> Result<DrainReport> {
        self.queue.drain(&self.fetcher).await
    }

    /// The pending-operation queue.
    pub fn queue(&self) -> &PendingQueue<Q> {
        &self.queue
    }

    /// Store reference (for advanced use).
    pub fn store(&self) -> &S {
        &self.store
    }

    // ------------------------------------------------------------------
    // Write path
    // ------------------------------------------------------------------

    async fn handle_write(&self, request: &Request) -> Result<CachedResponse> {
        match self.fetcher.fetch(request).await {
            Ok(response) => Ok(response),
            Err(e) if e.is_network_failure() && request.defer_offline => {
                let op = self
                    .queue
                    .enqueue(
                        request.url.clone(),
                        request.method,
                        request.body.clone().unwrap_or_default(),
                    )
                    .await?;
                Ok(CachedResponse::queued(op.id))
            }
            Err(e) => Err(e),
        }
    }

    // ------------------------------------------------------------------
    // Strategy dispatch
    // ------------------------------------------------------------------

    /// CacheFirst: serve cached immediately, refresh in the background.
    async fn cache_first(&self, request: &Request) -> Result<CachedResponse> {
        if let Some(cached) = self.lookup(request).await? {
            debug!("✓ Cache hit (CacheFirst), refreshing in background");
            self.spawn_revalidate(request.clone());
            return Ok(cached);
        }

        match self.fetcher.fetch(request).await {
            Ok(response) => {
                self.store_response(request, &response).await;
                Ok(response)
            }
            Err(e) if e.is_network_failure() => {
                debug!("✗ CacheFirst miss with network failure: {}", e);
                Ok(CachedResponse::offline(&e.to_string()))
            }
            Err(e) => Err(e),
        }
    }

    /// NetworkFirst: bounded network wait, cached fallback, offline 503 last.
    async fn network_first(&self, request: &Request) -> Result<CachedResponse> {
        let fetch = self.fetcher.fetch(request);
        let failure = match tokio::time::timeout(self.config.network_timeout, fetch).await {
            Ok(Ok(response)) => {
                if response.is_success() {
                    self.store_response(request, &response).await;
                    return Ok(response);
                }
                if !self.config.treat_http_error_as_failure {
                    // Pass HTTP errors through; they are answers, not outages.
                    return Ok(response);
                }
                Error::Network(format!("http status {}", response.status))
            }
            Ok(Err(e)) if e.is_network_failure() => e,
            Ok(Err(e)) => return Err(e),
            Err(_) => Error::Timeout(format!(
                "network-first wait exceeded {:?}",
                self.config.network_timeout
            )),
        };

        match self.lookup(request).await? {
            Some(cached) => {
                debug!("✓ NetworkFirst fell back to cache: {}", failure);
                Ok(cached)
            }
            None => {
                debug!("✗ NetworkFirst with no fallback: {}", failure);
                Ok(CachedResponse::offline(&failure.to_string()))
            }
        }
    }

    /// StaleWhileRevalidate: never block the caller on the network when a
    /// cached entry exists. Exactly one fetch starts per call: revalidation
    /// on a hit, the awaited first load on a miss.
    async fn stale_while_revalidate(&self, request: &Request) -> Result<CachedResponse> {
        if let Some(response) = self.lookup(request).await? {
            debug!("✓ Cache hit (StaleWhileRevalidate), returned without waiting");
            self.spawn_revalidate(request.clone());
            return Ok(response);
        }

        // First load: await the network once.
        match self.fetcher.fetch(request).await {
            Ok(response) => {
                self.store_response(request, &response).await;
                Ok(response)
            }
            Err(e) if e.is_network_failure() => {
                debug!("✗ StaleWhileRevalidate first load failed: {}", e);
                Ok(CachedResponse::offline(&e.to_string()))
            }
            Err(e) => Err(e),
        }
    }

    // ------------------------------------------------------------------
    // Partition access
    // ------------------------------------------------------------------

    /// Look up a request in the static partition, then the dynamic one.
    ///
    /// Undecodable entries (corruption, schema change) are evicted and
    /// treated as misses.
    async fn lookup(&self, request: &Request) -> Result<Option<CachedResponse>> {
        let key = request.entry_key();
        for partition in [
            self.partitions.static_partition(),
            self.partitions.dynamic_partition(),
        ] {
            if let Some(bytes) = self.store.get(&partition, &key).await? {
                match CachedResponse::from_cache_bytes(&bytes) {
                    Ok(response) => return Ok(Some(response)),
                    Err(e) => {
                        warn!("Evicting undecodable entry {}/{}: {}", partition, key, e);
                        self.store.delete(&partition, &key).await?;
                    }
                }
            }
        }
        Ok(None)
    }

    /// Store a successful response in the dynamic partition.
    ///
    /// Write failures are logged and swallowed: the old entry (if any) is
    /// retained and the caller still gets the fresh response.
    async fn store_response(&self, request: &Request, response: &CachedResponse) {
        if !response.is_success() {
            return;
        }

        let key = request.entry_key();
        let partition = self.partitions.dynamic_partition();
        match response.to_cache_bytes() {
            Ok(bytes) => {
                if let Err(e) = self.store.put(&partition, &key, bytes).await {
                    warn!("Cache write failed for {}/{}: {}", partition, key, e);
                }
            }
            Err(e) => warn!("Cache encode failed for {}: {}", key, e),
        }
    }

    /// Refresh an entry from the network in a spawned task, ignoring
    /// failures.
    fn spawn_revalidate(&self, request: Request) {
        let engine = self.clone();
        tokio::spawn(async move {
            match engine.fetcher.fetch(&request).await {
                Ok(response) => engine.store_response(&request, &response).await,
                Err(e) => debug!(
                    "Background revalidation failed for {}: {}",
                    request.entry_key(),
                    e
                ),
            }
        });
    }
}
