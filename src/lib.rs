//! # offline-cache
//!
//! An offline-first caching layer for request/response applications: a
//! background interception engine with versioned cache partitions, a
//! persistent pending-operation queue for offline writes, and a foreground
//! cache coordinator with declarative invalidation.
//!
//! ## Features
//!
//! - **Interception engine:** GET requests flow through a per-route
//!   strategy table ([`Strategy::CacheFirst`], [`Strategy::NetworkFirst`],
//!   [`Strategy::StaleWhileRevalidate`]) backed by versioned partitions
//! - **Versioned partitions:** activating a new cache version atomically
//!   retires every stale partition, so no mixed-version state survives
//! - **Pending-operation queue:** opted-in writes made while offline are
//!   queued and replayed in order, at least once, on reconnect
//! - **Foreground coordinator:** keyed response cache with stale-while-
//!   refresh reads, in-flight de-duplication, and a declarative
//!   event → invalidation map
//! - **Backend agnostic:** storage is a pair of small traits
//!   ([`PartitionStore`], [`queue::OpStore`]) with in-memory
//!   implementations included
//!
//! ## Quick Start
//!
//! ```ignore
//! use offline_cache::{
//!     CacheEngine, EngineConfig, Request,
//!     store::MemoryStore,
//!     queue::{MemoryOpStore, PendingQueue},
//!     strategy::{RouteTable, Strategy},
//! };
//!
//! let routes = RouteTable::new()
//!     .route("/assets/", Strategy::CacheFirst)
//!     .route("/api/dashboard/", Strategy::StaleWhileRevalidate)
//!     .route("/api/", Strategy::NetworkFirst);
//!
//! let config = EngineConfig::new(3)
//!     .with_manifest(vec!["/index.html".into(), "/assets/app.js".into()]);
//!
//! let queue = PendingQueue::open(MemoryOpStore::new()).await?;
//! let engine = CacheEngine::new(MemoryStore::new(), fetcher, queue, routes, config);
//!
//! // Lifecycle: install precaches, activate retires stale versions.
//! engine.install().await?;
//! engine.activate().await?;
//!
//! // Every request goes through the engine from here on.
//! let response = engine.handle(&Request::get("/api/clients")).await?;
//! ```
//!
//! The foreground half lives in [`coordinator`] and shares no memory with
//! the engine; see [`Coordinator::read`] for the read contract.

#[macro_use]
extern crate log;

pub mod coordinator;
pub mod engine;
pub mod entry;
pub mod error;
pub mod fetch;
pub mod invalidation;
pub mod partition;
pub mod queue;
pub mod request;
pub mod serialization;
pub mod signal;
pub mod store;
pub mod strategy;

// Re-exports for convenience
pub use coordinator::{Coordinator, QueryKey, ReadState};
pub use engine::{CacheEngine, EngineConfig, EngineState};
pub use entry::CachedResponse;
pub use error::{Error, Result};
pub use fetch::Fetcher;
pub use invalidation::{InvalidationMap, MutationEvent};
pub use queue::{PendingOp, PendingQueue};
pub use request::{Method, Request};
pub use signal::{Signal, SignalBus};
pub use store::PartitionStore;
pub use strategy::{RouteTable, Strategy};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
