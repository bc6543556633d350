//! Cached response payloads.
//!
//! A [`CachedResponse`] is the value side of a cache entry: status, headers,
//! body, and the timestamp at which it was captured from the network.
//! Entries are never mutated in place; every successful fetch writes a full
//! replacement.

use crate::error::Result;
use crate::serialization::{deserialize_from_cache, serialize_for_cache};
use serde::{Deserialize, Serialize};
use std::time::{SystemTime, UNIX_EPOCH};

/// A response captured from the network, or synthesized by the engine.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CachedResponse {
    /// HTTP status code.
    pub status: u16,
    /// Response headers, in arrival order.
    pub headers: Vec<(String, String)>,
    /// Response body bytes.
    pub body: Vec<u8>,
    /// Unix timestamp (milliseconds) at which this response was captured.
    pub captured_at: u64,
}

impl CachedResponse {
    /// Create a response captured now.
    pub fn new(status: u16, body: Vec<u8>) -> Self {
        CachedResponse {
            status,
            headers: Vec::new(),
            body,
            captured_at: now_millis(),
        }
    }

    /// Shorthand for a 200 response with a JSON content-type header.
    pub fn ok_json(body: Vec<u8>) -> Self {
        CachedResponse::new(200, body)
            .with_header("content-type", "application/json")
    }

    /// Append a header.
    pub fn with_header(mut self, name: &str, value: &str) -> Self {
        self.headers.push((name.to_string(), value.to_string()));
        self
    }

    /// Whether the status is in the 2xx range.
    ///
    /// Only successful responses are ever written to a partition.
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// Parse the body as JSON.
    pub fn body_json(&self) -> Result<serde_json::Value> {
        Ok(serde_json::from_slice(&self.body)?)
    }

    /// Synthesized offline response: status 503 with a structured body.
    ///
    /// Returned when a network fetch fails and no cached fallback exists.
    /// Callers must treat this as a first-class "no data, unknown freshness"
    /// case, not a generic failure.
    pub fn offline(reason: &str) -> Self {
        let body = serde_json::json!({
            "error": reason,
            "offline": true,
            "timestamp": now_millis(),
        });

        CachedResponse::new(503, body.to_string().into_bytes())
            .with_header("content-type", "application/json")
    }

    /// Synthesized acknowledgment for a deferred write: status 202.
    ///
    /// Returned when an offline non-GET request was appended to the
    /// pending-operation queue instead of surfacing an error.
    pub fn queued(op_id: u64) -> Self {
        let body = serde_json::json!({
            "queued": true,
            "id": op_id,
            "timestamp": now_millis(),
        });

        CachedResponse::new(202, body.to_string().into_bytes())
            .with_header("content-type", "application/json")
    }

    /// Whether this is a synthesized offline response.
    pub fn is_offline_fallback(&self) -> bool {
        self.status == 503
            && self
                .body_json()
                .map(|v| v["offline"].as_bool().unwrap_or(false))
                .unwrap_or(false)
    }

    /// Encode for partition storage (enveloped postcard).
    pub fn to_cache_bytes(&self) -> Result<Vec<u8>> {
        serialize_for_cache(self)
    }

    /// Decode from partition storage.
    pub fn from_cache_bytes(bytes: &[u8]) -> Result<Self> {
        deserialize_from_cache(bytes)
    }
}

/// Current Unix time in milliseconds.
pub(crate) fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}
