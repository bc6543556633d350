//! Postcard-based serialization with versioned envelopes.
//!
//! Everything this crate persists through a store (cached responses and
//! pending operations) goes through this module. Entries are wrapped in a
//! versioned envelope so that corruption is detected and schema changes
//! force eviction instead of silent misreads.
//!
//! # Format
//!
//! ```text
//! ┌─────────────────┬─────────────────┬──────────────────────────┐
//! │  magic: [u8; 4] │ version: u32    │  postcard payload        │
//! └─────────────────┴─────────────────┴──────────────────────────┘
//!   "OFFC"
//! ```
//!
//! # Example
//!
//! ```rust
//! use offline_cache::serialization::{serialize_for_cache, deserialize_from_cache};
//! use serde::{Serialize, Deserialize};
//!
//! #[derive(Serialize, Deserialize, PartialEq, Debug)]
//! struct Snapshot {
//!     revision: u64,
//!     payload: String,
//! }
//!
//! # fn main() -> offline_cache::Result<()> {
//! let snapshot = Snapshot { revision: 7, payload: "trend data".to_string() };
//!
//! let bytes = serialize_for_cache(&snapshot)?;
//! let decoded: Snapshot = deserialize_from_cache(&bytes)?;
//! assert_eq!(snapshot, decoded);
//! # Ok(())
//! # }
//! ```

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};

/// Magic header for offline-cache entries: b"OFFC"
///
/// Any persisted entry without this signature is rejected during
/// deserialization.
pub const CACHE_MAGIC: [u8; 4] = *b"OFFC";

/// Current schema version.
///
/// **CRITICAL:** Increment when making breaking changes to persisted types
/// (cached response layout, pending-operation layout). Entries written with
/// an older version are evicted and recomputed, never migrated in place.
pub const CURRENT_SCHEMA_VERSION: u32 = 1;

/// Versioned envelope for persisted entries.
///
/// - **Corruption detection:** invalid magic → reject entry
/// - **Schema evolution:** version mismatch → evict and recompute
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct CacheEnvelope<T> {
    /// Magic header: must be b"OFFC"
    pub magic: [u8; 4],
    /// Schema version: must match CURRENT_SCHEMA_VERSION
    pub version: u32,
    /// The actual persisted data
    pub payload: T,
}

impl<T> CacheEnvelope<T> {
    /// Wrap a payload in an envelope stamped with the current magic/version.
    pub fn new(payload: T) -> Self {
        CacheEnvelope {
            magic: CACHE_MAGIC,
            version: CURRENT_SCHEMA_VERSION,
            payload,
        }
    }
}

/// Serialize a value into an enveloped postcard byte vector.
///
/// # Errors
///
/// Returns `Error::SerializationError` if postcard encoding fails.
pub fn serialize_for_cache<T: Serialize>(value: &T) -> Result<Vec<u8>> {
    let envelope = CacheEnvelope {
        magic: CACHE_MAGIC,
        version: CURRENT_SCHEMA_VERSION,
        payload: value,
    };

    postcard::to_allocvec(&envelope).map_err(|e| Error::SerializationError(e.to_string()))
}

/// Deserialize a value from an enveloped postcard byte vector.
///
/// Validates magic and schema version before decoding the payload.
///
/// # Errors
///
/// - `Error::InvalidCacheEntry`: bad magic or undecodable envelope
/// - `Error::VersionMismatch`: entry written under a different schema version
pub fn deserialize_from_cache<T: for<'de> Deserialize<'de>>(bytes: &[u8]) -> Result<T> {
    let envelope: CacheEnvelope<T> = postcard::from_bytes(bytes)
        .map_err(|e| Error::InvalidCacheEntry(format!("envelope decode failed: {}", e)))?;

    if envelope.magic != CACHE_MAGIC {
        return Err(Error::InvalidCacheEntry(format!(
            "bad magic: {:?}",
            envelope.magic
        )));
    }

    if envelope.version != CURRENT_SCHEMA_VERSION {
        return Err(Error::VersionMismatch {
            expected: CURRENT_SCHEMA_VERSION,
            found: envelope.version,
        });
    }

    Ok(envelope.payload)
}
