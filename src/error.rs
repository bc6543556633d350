//! Error types for the offline caching framework.

use std::fmt;

/// Result type for cache operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Error types for the offline caching framework.
///
/// All operations return `Result<T>` where `Result` is defined as
/// `std::result::Result<T, Error>`. `Error` is `Clone` because in-flight
/// fetch results are shared between every caller attached to the same key.
#[derive(Debug, Clone, PartialEq)]
pub enum Error {
    /// Serialization failed when converting a value to cache bytes.
    SerializationError(String),

    /// Deserialization failed when converting cache bytes back to a value.
    ///
    /// This indicates corrupted or malformed data in a partition.
    ///
    /// **Recovery:** Evict the entry and refetch from the network.
    DeserializationError(String),

    /// The network fetch failed (connection refused, DNS, reset, etc.).
    ///
    /// Strategies treat this as an opportunity to fall back to a cached
    /// entry; only the complete absence of a fallback surfaces an error.
    Network(String),

    /// The host is offline; no network attempt can succeed.
    ///
    /// Distinct from [`Error::Network`] so deferred-write handling can
    /// decide to queue instead of retrying.
    Offline,

    /// Durable store error (partition or pending-operation storage).
    ///
    /// A failed partition write is a no-op: the previous entry is retained.
    StorageError(String),

    /// A network fetch exceeded the configured bounded wait.
    ///
    /// Raised by the network-first strategy; handled like any other
    /// network failure (cached fallback, then synthesized offline response).
    Timeout(String),

    /// A precache fetch failed during install.
    ///
    /// Fatal to this engine version: it never reaches `Active`, leaving
    /// the previous version (if any) serving traffic.
    PrecacheFailed(String),

    /// Configuration error during construction.
    ConfigError(String),

    /// Invalid cache entry: corrupted envelope or bad magic.
    ///
    /// Returned when the magic header is not `b"OFFC"` or the envelope
    /// cannot be decoded.
    ///
    /// **Recovery:** Evict the entry and refetch.
    InvalidCacheEntry(String),

    /// Schema version mismatch between code and a persisted entry.
    ///
    /// Expected during deployments after `CURRENT_SCHEMA_VERSION` changes;
    /// the entry is evicted and recomputed on next access.
    VersionMismatch {
        /// Expected schema version (from compiled code)
        expected: u32,
        /// Found schema version (from the persisted entry)
        found: u32,
    },

    /// Feature not implemented for this store or configuration.
    NotImplemented(String),

    /// Generic error with custom message.
    Other(String),
}

impl Error {
    /// Whether this error represents a network-level failure that cache
    /// fallback or queueing should absorb.
    pub fn is_network_failure(&self) -> bool {
        matches!(self, Error::Network(_) | Error::Offline | Error::Timeout(_))
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::SerializationError(msg) => write!(f, "Serialization error: {}", msg),
            Error::DeserializationError(msg) => write!(f, "Deserialization error: {}", msg),
            Error::Network(msg) => write!(f, "Network error: {}", msg),
            Error::Offline => write!(f, "Offline"),
            Error::StorageError(msg) => write!(f, "Storage error: {}", msg),
            Error::Timeout(msg) => write!(f, "Timeout: {}", msg),
            Error::PrecacheFailed(msg) => write!(f, "Precache failed: {}", msg),
            Error::ConfigError(msg) => write!(f, "Config error: {}", msg),
            Error::InvalidCacheEntry(msg) => write!(f, "Invalid cache entry: {}", msg),
            Error::VersionMismatch { expected, found } => {
                write!(
                    f,
                    "Cache version mismatch: expected {}, found {}",
                    expected, found
                )
            }
            Error::NotImplemented(msg) => write!(f, "Not implemented: {}", msg),
            Error::Other(msg) => write!(f, "Error: {}", msg),
        }
    }
}

impl std::error::Error for Error {}

// ============================================================================
// Conversions from other error types
// ============================================================================

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        if e.is_io() {
            Error::StorageError(e.to_string())
        } else if e.is_syntax() {
            Error::DeserializationError(e.to_string())
        } else {
            Error::SerializationError(e.to_string())
        }
    }
}

impl From<std::io::Error> for Error {
    fn from(e: std::io::Error) -> Self {
        Error::StorageError(e.to_string())
    }
}

impl From<String> for Error {
    fn from(e: String) -> Self {
        Error::Other(e)
    }
}

impl From<&str> for Error {
    fn from(e: &str) -> Self {
        Error::Other(e.to_string())
    }
}
