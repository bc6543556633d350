//! Foreground cache coordinator.
//!
//! The coordinator owns an in-memory keyed response cache used by UI
//! data-fetching code, the declarative invalidation map, and the
//! timer/event-driven refresh triggers. It runs in the foreground execution
//! context and shares no memory with the interception engine; the two meet
//! only through request interception.
//!
//! # The read contract
//!
//! [`Coordinator::read`] never fails in the exception sense: callers inspect
//! the returned [`ReadState`] discriminator instead of catching errors.
//! Within one key, fetches are serialized: at most one is in flight, and
//! concurrent callers attach to it instead of duplicating the network call.
//! That attach rule is the sole de-duplication mechanism between
//! timer-driven refresh and event-driven invalidation.

use crate::error::Error;
use crate::invalidation::{Action, InvalidationMap, MutationEvent};
use dashmap::DashMap;
use futures::future::{BoxFuture, Shared};
use futures::FutureExt;
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::broadcast;
use tokio::task::JoinHandle;

/// Default inactivity window after which unsubscribed keys are collected.
const DEFAULT_GC_WINDOW: Duration = Duration::from_secs(300);

/// Capacity of the update-notification channel.
const UPDATE_CHANNEL_CAPACITY: usize = 256;

/// Structured identifier for a foreground cache entry: an entity family
/// plus ordered query parameters.
///
/// # Example
///
/// ```
/// use offline_cache::coordinator::QueryKey;
///
/// let key = QueryKey::new("clients").with_param("id", "c9");
/// assert_eq!(key.entity(), "clients");
/// assert_eq!(key.param("id"), Some("c9"));
/// assert_eq!(key.to_string(), "clients?id=c9");
/// ```
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct QueryKey {
    entity: String,
    // Sorted by name so parameter order does not change identity.
    params: Vec<(String, String)>,
}

impl QueryKey {
    /// A key for an entity family with no parameters (a collection key).
    pub fn new(entity: impl Into<String>) -> Self {
        QueryKey {
            entity: entity.into(),
            params: Vec::new(),
        }
    }

    /// Add (or replace) a query parameter.
    pub fn with_param(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        let name = name.into();
        let value = value.into();
        match self.params.binary_search_by(|(n, _)| n.as_str().cmp(&name)) {
            Ok(i) => self.params[i].1 = value,
            Err(i) => self.params.insert(i, (name, value)),
        }
        self
    }

    /// The entity family.
    pub fn entity(&self) -> &str {
        &self.entity
    }

    /// Look up a parameter by name.
    pub fn param(&self, name: &str) -> Option<&str> {
        self.params
            .binary_search_by(|(n, _)| n.as_str().cmp(name))
            .ok()
            .map(|i| self.params[i].1.as_str())
    }
}

impl fmt::Display for QueryKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.entity)?;
        for (i, (name, value)) in self.params.iter().enumerate() {
            let sep = if i == 0 { '?' } else { '&' };
            write!(f, "{}{}={}", sep, name, value)?;
        }
        Ok(())
    }
}

/// Result of a [`Coordinator::read`].
///
/// `read` never "throws": the discriminator is the whole contract.
#[derive(Clone, Debug)]
pub enum ReadState<V> {
    /// The cached value is within its staleness threshold.
    Fresh(V),
    /// A previous value is returned while a refresh runs in the background.
    Stale {
        value: V,
        /// Whether a refresh is currently in flight for this key.
        refreshing: bool,
    },
    /// No value exists and the fetch failed; there was no fallback.
    Error(Error),
}

impl<V> ReadState<V> {
    /// The carried value, if any.
    pub fn value(&self) -> Option<&V> {
        match self {
            ReadState::Fresh(v) | ReadState::Stale { value: v, .. } => Some(v),
            ReadState::Error(_) => None,
        }
    }

    /// Consume into the carried value, if any.
    pub fn into_value(self) -> Option<V> {
        match self {
            ReadState::Fresh(v) | ReadState::Stale { value: v, .. } => Some(v),
            ReadState::Error(_) => None,
        }
    }

    pub fn is_fresh(&self) -> bool {
        matches!(self, ReadState::Fresh(_))
    }

    pub fn is_refreshing(&self) -> bool {
        matches!(self, ReadState::Stale { refreshing: true, .. })
    }
}

type SharedFetch<V> = Shared<BoxFuture<'static, std::result::Result<V, Error>>>;
type FetchFn<V> = Arc<dyn Fn() -> BoxFuture<'static, std::result::Result<V, Error>> + Send + Sync>;

/// Per-key cache state: value, fetch timestamp, staleness threshold,
/// in-flight marker, retained fetcher, GC bookkeeping.
struct Slot<V> {
    value: Option<(V, Instant)>,
    stale_after: Duration,
    inflight: Option<SharedFetch<V>>,
    fetch: Option<FetchFn<V>>,
    last_used: Instant,
    subscribers: usize,
}

impl<V> Slot<V> {
    fn new() -> Self {
        Slot {
            value: None,
            stale_after: Duration::ZERO,
            inflight: None,
            fetch: None,
            last_used: Instant::now(),
            subscribers: 0,
        }
    }

    fn is_stale(&self) -> bool {
        match &self.value {
            Some((_, at)) => at.elapsed() > self.stale_after,
            None => true,
        }
    }
}

/// In-memory keyed response cache with declarative invalidation.
///
/// Explicitly constructed and dependency-injected: tests instantiate
/// isolated copies instead of sharing module-level state. Cheap to clone;
/// clones share all state.
///
/// # Example
///
/// ```ignore
/// let coordinator: Coordinator<serde_json::Value> =
///     Coordinator::new(InvalidationMap::standard());
///
/// let state = coordinator
///     .read(QueryKey::new("clients"), || fetch_clients(), Duration::from_secs(5))
///     .await;
///
/// match state {
///     ReadState::Fresh(clients) => render(clients),
///     ReadState::Stale { value, .. } => render_with_spinner(value),
///     ReadState::Error(e) => render_offline_notice(e),
/// }
/// ```
pub struct Coordinator<V> {
    slots: Arc<DashMap<QueryKey, Slot<V>>>,
    rules: Arc<InvalidationMap>,
    gc_window: Duration,
    updates: broadcast::Sender<QueryKey>,
}

impl<V> Clone for Coordinator<V> {
    fn clone(&self) -> Self {
        Coordinator {
            slots: self.slots.clone(),
            rules: self.rules.clone(),
            gc_window: self.gc_window,
            updates: self.updates.clone(),
        }
    }
}

impl<V> Default for Coordinator<V>
where
    V: Clone + Send + Sync + 'static,
{
    fn default() -> Self {
        Coordinator::new(InvalidationMap::standard())
    }
}

impl<V> Coordinator<V>
where
    V: Clone + Send + Sync + 'static,
{
    /// Create a coordinator with the given invalidation map.
    pub fn new(rules: InvalidationMap) -> Self {
        let (updates, _) = broadcast::channel(UPDATE_CHANNEL_CAPACITY);
        Coordinator {
            slots: Arc::new(DashMap::new()),
            rules: Arc::new(rules),
            gc_window: DEFAULT_GC_WINDOW,
            updates,
        }
    }

    /// Set the inactivity window for [`Coordinator::collect_idle`].
    pub fn with_gc_window(mut self, window: Duration) -> Self {
        self.gc_window = window;
        self
    }

    /// Read a key, fetching through `fetcher` when needed.
    ///
    /// - fresh entry → returned synchronously as [`ReadState::Fresh`]
    /// - stale entry → previous value returned as [`ReadState::Stale`] with
    ///   `refreshing: true`; the refresh runs in the background
    /// - absent entry → the (possibly shared) fetch is awaited once
    ///
    /// If a fetch for the key is already in flight the caller attaches to
    /// it; the fetcher is invoked exactly once per in-flight fetch. The
    /// fetcher is retained for background refresh of this key.
    pub async fn read<F, Fut>(&self, key: QueryKey, fetcher: F, stale_time: Duration) -> ReadState<V>
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = crate::error::Result<V>> + Send + 'static,
    {
        let fetch_fn: FetchFn<V> = Arc::new(move || fetcher().boxed());

        enum Plan<V> {
            Fresh(V),
            Refreshing(V),
            Await(SharedFetch<V>),
        }

        // All slot mutation happens under the entry lock; the network is
        // only awaited after the lock is released.
        let plan = {
            let mut slot = self.slots.entry(key.clone()).or_insert_with(Slot::new);
            slot.last_used = Instant::now();
            slot.stale_after = stale_time;
            slot.fetch = Some(fetch_fn);

            match &slot.value {
                Some((v, at)) if at.elapsed() <= stale_time => {
                    debug!("✓ Read {} -> fresh", key);
                    Plan::Fresh(v.clone())
                }
                Some((v, _)) => {
                    let previous = v.clone();
                    self.ensure_inflight(&key, &mut slot);
                    debug!("✓ Read {} -> stale, refresh underway", key);
                    Plan::Refreshing(previous)
                }
                None => {
                    let shared = self.ensure_inflight(&key, &mut slot);
                    debug!("Read {} -> absent, awaiting fetch", key);
                    Plan::Await(shared)
                }
            }
        };

        match plan {
            Plan::Fresh(value) => ReadState::Fresh(value),
            Plan::Refreshing(value) => ReadState::Stale {
                value,
                refreshing: true,
            },
            Plan::Await(shared) => match shared.await {
                Ok(value) => ReadState::Fresh(value),
                Err(e) => ReadState::Error(e),
            },
        }
    }

    /// Apply the invalidation rule for `event` to every matching key.
    ///
    /// Idempotent per key set: repeating a call with identical arguments
    /// leaves the cache in the same state as one call. Events with no
    /// configured rule are logged and ignored, since new event kinds must be
    /// addable without breaking older coordinators.
    pub fn invalidate(&self, event: &MutationEvent) {
        let rule = match self.rules.rule_for(event.kind()) {
            Some(rule) => rule,
            None => {
                warn!("No invalidation rule for event {}; ignoring", event.kind());
                return;
            }
        };

        let affected: Vec<QueryKey> = self
            .slots
            .iter()
            .filter(|entry| rule.matches(entry.key(), event))
            .map(|entry| entry.key().clone())
            .collect();

        debug!(
            "Invalidation for {} affects {} key(s)",
            event.kind(),
            affected.len()
        );

        for key in affected {
            match rule.action {
                Action::Remove => {
                    self.slots.remove(&key);
                }
                Action::InvalidateOnly => {
                    if let Some(mut slot) = self.slots.get_mut(&key) {
                        slot.value = None;
                    }
                }
                Action::InvalidateAndRefetch => {
                    if let Some(mut slot) = self.slots.get_mut(&key) {
                        slot.value = None;
                        if slot.fetch.is_some() {
                            self.ensure_inflight(&key, &mut slot);
                        }
                    }
                }
            }
        }
    }

    /// Start a background refresh for every stale key with a retained
    /// fetcher.
    ///
    /// Wired to the `reconnect` and `became-visible` signals. Keys that are
    /// still fresh are never refetched.
    pub fn refresh_stale(&self) {
        self.refresh_where(|_| true);
    }

    /// Start a background refresh for stale keys of one entity family.
    pub fn refresh_family(&self, family: &str) {
        self.refresh_where(|key| key.entity() == family);
    }

    fn refresh_where(&self, include: impl Fn(&QueryKey) -> bool) {
        let candidates: Vec<QueryKey> = self
            .slots
            .iter()
            .filter(|entry| include(entry.key()) && entry.value().is_stale())
            .map(|entry| entry.key().clone())
            .collect();

        for key in candidates {
            if let Some(mut slot) = self.slots.get_mut(&key) {
                if slot.is_stale() && slot.fetch.is_some() {
                    self.ensure_inflight(&key, &mut slot);
                }
            }
        }
    }

    /// Spawn a periodic refresh timer for one entity family.
    ///
    /// Each data category gets its own interval. The timer refreshes only
    /// keys that are stale when it fires. The returned guard stops the
    /// timer when dropped.
    pub fn spawn_periodic_refresh(
        &self,
        family: impl Into<String>,
        interval: Duration,
    ) -> RefreshTimer {
        let coordinator = self.clone();
        let family = family.into();
        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            // The first tick fires immediately; skip it.
            ticker.tick().await;
            loop {
                ticker.tick().await;
                coordinator.refresh_family(&family);
            }
        });
        RefreshTimer { handle }
    }

    /// Register interest in a key, pinning it against garbage collection.
    ///
    /// The subscription also receives update notifications for the key.
    pub fn subscribe(&self, key: &QueryKey) -> Subscription<V> {
        self.slots
            .entry(key.clone())
            .or_insert_with(Slot::new)
            .subscribers += 1;

        Subscription {
            slots: self.slots.clone(),
            key: key.clone(),
            receiver: self.updates.subscribe(),
        }
    }

    /// Drop entries that have no subscribers, no in-flight fetch, and have
    /// not been read within the inactivity window.
    ///
    /// Returns the number of collected entries. An in-flight fetch is
    /// abandoned only when its result is no longer referenced by any key,
    /// never actively cancelled.
    pub fn collect_idle(&self) -> usize {
        let window = self.gc_window;
        let before = self.slots.len();
        self.slots.retain(|_, slot| {
            slot.subscribers > 0 || slot.inflight.is_some() || slot.last_used.elapsed() <= window
        });
        let collected = before - self.slots.len();
        if collected > 0 {
            debug!("Collected {} idle cache key(s)", collected);
        }
        collected
    }

    /// The cached value for a key, ignoring staleness (inspection only).
    pub fn peek(&self, key: &QueryKey) -> Option<V> {
        self.slots
            .get(key)
            .and_then(|slot| slot.value.as_ref().map(|(v, _)| v.clone()))
    }

    /// Whether a key currently exists (cached or in flight).
    pub fn contains(&self, key: &QueryKey) -> bool {
        self.slots.contains_key(key)
    }

    /// Number of tracked keys.
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    /// Whether no keys are tracked.
    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Attach to the key's in-flight fetch, starting one if none exists.
    ///
    /// Must be called with the slot's entry lock held; the spawned driver
    /// only touches the map after the fetch resolves.
    fn ensure_inflight(&self, key: &QueryKey, slot: &mut Slot<V>) -> SharedFetch<V> {
        if let Some(shared) = &slot.inflight {
            return shared.clone();
        }

        let fetch = slot
            .fetch
            .clone()
            .expect("ensure_inflight requires a retained fetcher");
        let shared = fetch().shared();
        slot.inflight = Some(shared.clone());

        let coordinator = self.clone();
        let key = key.clone();
        let driver = shared.clone();
        tokio::spawn(async move {
            coordinator.apply_fetch_result(key, driver).await;
        });

        shared
    }

    /// Store a completed fetch result and clear the in-flight marker.
    ///
    /// A failed refresh retains the previous value: cache-layer failures
    /// are recovered locally wherever a fallback exists.
    async fn apply_fetch_result(&self, key: QueryKey, shared: SharedFetch<V>) {
        let result = shared.await;

        let Some(mut slot) = self.slots.get_mut(&key) else {
            // Key was removed while the fetch was in flight; the result is
            // abandoned.
            return;
        };
        slot.inflight = None;

        match result {
            Ok(value) => {
                slot.value = Some((value, Instant::now()));
                drop(slot);
                let _ = self.updates.send(key);
            }
            Err(e) => {
                debug!("Refresh failed for {}: {}", key, e);
            }
        }
    }
}

/// Guard for a periodic refresh timer; aborts the timer on drop.
pub struct RefreshTimer {
    handle: JoinHandle<()>,
}

impl RefreshTimer {
    /// Stop the timer.
    pub fn stop(self) {}
}

impl Drop for RefreshTimer {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

/// Subscriber handle for one key.
///
/// Keeps the key pinned against garbage collection and yields update
/// notifications. Unsubscribes on drop.
pub struct Subscription<V> {
    slots: Arc<DashMap<QueryKey, Slot<V>>>,
    key: QueryKey,
    receiver: broadcast::Receiver<QueryKey>,
}

impl<V> Subscription<V> {
    /// Wait for the next completed refresh of this key.
    ///
    /// Returns `false` if the coordinator was dropped.
    pub async fn changed(&mut self) -> bool {
        loop {
            match self.receiver.recv().await {
                Ok(updated) if updated == self.key => return true,
                Ok(_) => continue,
                Err(broadcast::error::RecvError::Lagged(_)) => continue,
                Err(broadcast::error::RecvError::Closed) => return false,
            }
        }
    }

    /// Explicitly unsubscribe (same as dropping).
    pub fn unsubscribe(self) {}
}

impl<V> Drop for Subscription<V> {
    fn drop(&mut self) {
        if let Some(mut slot) = self.slots.get_mut(&self.key) {
            slot.subscribers = slot.subscribers.saturating_sub(1);
        }
    }
}
