//! Caching strategies and the route strategy table.
//!
//! Every intercepted GET request is matched against a [`RouteTable`] that
//! maps URL prefixes to one of three strategies. The table is static for
//! the engine's lifetime and is loaded once at construction.
//!
//! # The Three Strategies
//!
//! | Strategy | Cache Hit | Cache Miss | Guarantee |
//! |----------|-----------|-----------|-----------|
//! | **CacheFirst** | Return cached, refresh in background | Fetch, store, return | Low latency; staleness bounded by one refresh cycle |
//! | **NetworkFirst** | Only as fallback | Fetch with bounded wait | Freshness when online; graceful offline degradation |
//! | **StaleWhileRevalidate** | Return cached immediately, revalidate in background | Await network once | Fastest perceived latency after first load |
//!
//! # Matching
//!
//! Patterns are matched longest-prefix-first, so `/api/reports/` can carry a
//! different strategy than `/api/`. Exactly one strategy applies per
//! request; unmatched requests default to `NetworkFirst`.
//!
//! ```
//! use offline_cache::strategy::{RouteTable, Strategy};
//!
//! let routes = RouteTable::new()
//!     .route("/assets/", Strategy::CacheFirst)
//!     .route("/api/", Strategy::NetworkFirst)
//!     .route("/api/dashboard/", Strategy::StaleWhileRevalidate);
//!
//! assert_eq!(routes.match_url("/api/dashboard/summary"), Strategy::StaleWhileRevalidate);
//! assert_eq!(routes.match_url("/api/clients"), Strategy::NetworkFirst);
//! assert_eq!(routes.match_url("/health"), Strategy::NetworkFirst); // default
//! ```

use std::fmt;

/// Strategy governing whether a cached or freshly-fetched value is preferred.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum Strategy {
    /// **CacheFirst**: return the cached entry immediately if present and
    /// refresh the partition from the network asynchronously, ignoring
    /// refresh failures. On a miss, fetch, store on success, return.
    ///
    /// Use when: low latency beats freshness (immutable or slow-moving
    /// assets). Tolerates a stale response for up to one refresh cycle.
    CacheFirst,

    /// **NetworkFirst**: attempt the network with a bounded wait; on
    /// success store and return it; on failure fall back to the cached
    /// entry, else synthesize an offline response.
    ///
    /// Use when: freshness matters and offline service is a degraded mode.
    /// This is the default for unmatched routes.
    #[default]
    NetworkFirst,

    /// **StaleWhileRevalidate**: start a network fetch unconditionally; if
    /// a cached entry exists return it without waiting, storing whatever
    /// the network returns for next time. Await the network only when no
    /// cached entry exists.
    ///
    /// Use when: perceived latency matters most; consistency lag is
    /// bounded by the time between consecutive requests to the same key.
    StaleWhileRevalidate,
}

impl fmt::Display for Strategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Strategy::CacheFirst => write!(f, "CacheFirst"),
            Strategy::NetworkFirst => write!(f, "NetworkFirst"),
            Strategy::StaleWhileRevalidate => write!(f, "StaleWhileRevalidate"),
        }
    }
}

/// Static table mapping URL prefixes to strategies.
///
/// Longest-prefix-first matching; exactly one strategy per request.
#[derive(Clone, Debug, Default)]
pub struct RouteTable {
    // Sorted by descending prefix length so the first match wins.
    entries: Vec<(String, Strategy)>,
}

impl RouteTable {
    /// Create an empty table (everything resolves to the default strategy).
    pub fn new() -> Self {
        RouteTable {
            entries: Vec::new(),
        }
    }

    /// Add a prefix → strategy entry.
    pub fn route(mut self, prefix: impl Into<String>, strategy: Strategy) -> Self {
        let prefix = prefix.into();
        let at = self
            .entries
            .partition_point(|(p, _)| p.len() >= prefix.len());
        self.entries.insert(at, (prefix, strategy));
        self
    }

    /// Resolve the strategy for a URL.
    ///
    /// Unmatched URLs default to [`Strategy::NetworkFirst`].
    pub fn match_url(&self, url: &str) -> Strategy {
        self.entries
            .iter()
            .find(|(prefix, _)| url.starts_with(prefix.as_str()))
            .map(|(_, strategy)| *strategy)
            .unwrap_or_default()
    }

    /// Number of configured routes.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the table has no routes.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_strategy_display() {
        assert_eq!(Strategy::CacheFirst.to_string(), "CacheFirst");
        assert_eq!(Strategy::NetworkFirst.to_string(), "NetworkFirst");
        assert_eq!(
            Strategy::StaleWhileRevalidate.to_string(),
            "StaleWhileRevalidate"
        );
    }

    #[test]
    fn test_strategy_default() {
        assert_eq!(Strategy::default(), Strategy::NetworkFirst);
    }

    #[test]
    fn test_empty_table_defaults_to_network_first() {
        let table = RouteTable::new();
        assert_eq!(table.match_url("/anything"), Strategy::NetworkFirst);
        assert!(table.is_empty());
    }

    #[test]
    fn test_longest_prefix_wins() {
        let table = RouteTable::new()
            .route("/api/", Strategy::NetworkFirst)
            .route("/api/dashboard/", Strategy::StaleWhileRevalidate);

        assert_eq!(
            table.match_url("/api/dashboard/summary"),
            Strategy::StaleWhileRevalidate
        );
        assert_eq!(table.match_url("/api/clients"), Strategy::NetworkFirst);
    }

    #[test]
    fn test_longest_prefix_wins_regardless_of_insertion_order() {
        let table = RouteTable::new()
            .route("/api/dashboard/", Strategy::StaleWhileRevalidate)
            .route("/api/", Strategy::NetworkFirst)
            .route("/", Strategy::CacheFirst);

        assert_eq!(
            table.match_url("/api/dashboard/summary"),
            Strategy::StaleWhileRevalidate
        );
        assert_eq!(table.match_url("/api/clients"), Strategy::NetworkFirst);
        assert_eq!(table.match_url("/index.html"), Strategy::CacheFirst);
    }

    #[test]
    fn test_exactly_one_strategy_per_request() {
        let table = RouteTable::new()
            .route("/assets/", Strategy::CacheFirst)
            .route("/assets/", Strategy::NetworkFirst);

        // duplicate prefixes: the earlier insertion at equal length wins,
        // and matching is still deterministic
        let first = table.match_url("/assets/app.js");
        let second = table.match_url("/assets/app.js");
        assert_eq!(first, second);
    }
}
