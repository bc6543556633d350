//! Request descriptors and cache-key utilities.
//!
//! A cache entry's identity is its method plus a normalized URL. URL
//! normalization keeps logically identical requests from occupying separate
//! entries: fragments are stripped, query pairs are sorted, and trailing
//! slashes are dropped on non-root paths.

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// HTTP method of an intercepted request.
///
/// Only `Get` participates in caching; all other methods pass through to
/// the network (and may be queued as pending operations when offline).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Method {
    Get,
    Post,
    Put,
    Patch,
    Delete,
}

impl Method {
    /// Whether requests with this method are cache-eligible.
    pub fn is_cacheable(&self) -> bool {
        matches!(self, Method::Get)
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Method::Get => "GET",
            Method::Post => "POST",
            Method::Put => "PUT",
            Method::Patch => "PATCH",
            Method::Delete => "DELETE",
        };
        write!(f, "{}", s)
    }
}

impl FromStr for Method {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_uppercase().as_str() {
            "GET" => Ok(Method::Get),
            "POST" => Ok(Method::Post),
            "PUT" => Ok(Method::Put),
            "PATCH" => Ok(Method::Patch),
            "DELETE" => Ok(Method::Delete),
            other => Err(Error::ConfigError(format!("unknown method: {}", other))),
        }
    }
}

/// An outbound request observed by the interception engine.
///
/// # Example
///
/// ```
/// use offline_cache::request::{Method, Request};
///
/// let read = Request::get("/api/clients?page=2");
/// assert_eq!(read.method, Method::Get);
///
/// // A write that opts into deferred-write semantics when offline:
/// let write = Request::new(Method::Post, "/api/clients")
///     .with_body(br#"{"name":"acme"}"#.to_vec())
///     .deferred();
/// assert!(write.defer_offline);
/// ```
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Request {
    pub method: Method,
    pub url: String,
    pub body: Option<Vec<u8>>,
    /// Caller opt-in: if this (non-GET) request fails while offline, append
    /// it to the pending-operation queue instead of surfacing the error.
    pub defer_offline: bool,
}

impl Request {
    /// Create a request with the given method and URL.
    pub fn new(method: Method, url: impl Into<String>) -> Self {
        Request {
            method,
            url: url.into(),
            body: None,
            defer_offline: false,
        }
    }

    /// Shorthand for a GET request.
    pub fn get(url: impl Into<String>) -> Self {
        Request::new(Method::Get, url)
    }

    /// Attach a serialized payload.
    pub fn with_body(mut self, body: Vec<u8>) -> Self {
        self.body = Some(body);
        self
    }

    /// Opt into deferred-write semantics for offline failures.
    pub fn deferred(mut self) -> Self {
        self.defer_offline = true;
        self
    }

    /// The cache key identifying this request.
    pub fn entry_key(&self) -> String {
        entry_key(self.method, &self.url)
    }
}

/// Build the cache key for a method/URL pair: `"{METHOD} {normalized_url}"`.
pub fn entry_key(method: Method, url: &str) -> String {
    format!("{} {}", method, normalize_url(url))
}

/// Normalize a URL for use in a cache key.
///
/// - strips the fragment
/// - sorts query pairs so parameter order does not change identity
/// - drops a trailing slash on non-root paths
pub fn normalize_url(url: &str) -> String {
    let without_fragment = match url.split_once('#') {
        Some((head, _)) => head,
        None => url,
    };

    let (path, query) = match without_fragment.split_once('?') {
        Some((p, q)) => (p, Some(q)),
        None => (without_fragment, None),
    };

    let path = if path.len() > 1 && path.ends_with('/') {
        &path[..path.len() - 1]
    } else {
        path
    };

    match query {
        Some(q) if !q.is_empty() => {
            let mut pairs: Vec<&str> = q.split('&').filter(|p| !p.is_empty()).collect();
            pairs.sort_unstable();
            format!("{}?{}", path, pairs.join("&"))
        }
        _ => path.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_method_display_and_parse() {
        assert_eq!(Method::Get.to_string(), "GET");
        assert_eq!("post".parse::<Method>().expect("Failed to parse"), Method::Post);
        assert!("TRACE".parse::<Method>().is_err());
    }

    #[test]
    fn test_only_get_is_cacheable() {
        assert!(Method::Get.is_cacheable());
        assert!(!Method::Post.is_cacheable());
        assert!(!Method::Delete.is_cacheable());
    }

    #[test]
    fn test_normalize_strips_fragment() {
        assert_eq!(normalize_url("/api/clients#section"), "/api/clients");
    }

    #[test]
    fn test_normalize_sorts_query_pairs() {
        assert_eq!(
            normalize_url("/api/clients?page=2&filter=active"),
            "/api/clients?filter=active&page=2"
        );
    }

    #[test]
    fn test_normalize_trailing_slash() {
        assert_eq!(normalize_url("/api/clients/"), "/api/clients");
        assert_eq!(normalize_url("/"), "/");
    }

    #[test]
    fn test_entry_key_identity() {
        let a = Request::get("/api/clients?b=2&a=1").entry_key();
        let b = Request::get("/api/clients?a=1&b=2#frag").entry_key();
        assert_eq!(a, b);
        assert_eq!(a, "GET /api/clients?a=1&b=2");
    }

    #[test]
    fn test_entry_key_distinguishes_methods() {
        let get = entry_key(Method::Get, "/api/clients");
        let post = entry_key(Method::Post, "/api/clients");
        assert_ne!(get, post);
    }

    #[test]
    fn test_request_builder() {
        let req = Request::new(Method::Put, "/api/clients/9")
            .with_body(vec![1, 2, 3])
            .deferred();

        assert_eq!(req.method, Method::Put);
        assert_eq!(req.body, Some(vec![1, 2, 3]));
        assert!(req.defer_offline);
    }
}
