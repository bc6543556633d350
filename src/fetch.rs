//! The network seam.
//!
//! [`Fetcher`] abstracts the outbound network boundary, decoupling the
//! engine and the pending-operation queue from any specific HTTP client.
//! Production code implements it over its client of choice; tests use
//! scripted in-memory fetchers.
//!
//! The network fetch is the engine's only suspension point besides store
//! I/O; everything else in a `handle` call is synchronous.

use crate::entry::CachedResponse;
use crate::error::Result;
use crate::request::Request;
use std::future::Future;

/// Trait for issuing network requests.
///
/// Methods return `impl Future + Send` so strategies can revalidate from
/// spawned tasks; implementations can still be written with `async fn`.
///
/// # Failure contract
///
/// - Unreachable network → `Err(Error::Network(..))` or `Err(Error::Offline)`
/// - HTTP error statuses are **not** fetch errors: return the response and
///   let the strategy decide (see `EngineConfig::treat_http_error_as_failure`)
///
/// # Example
///
/// ```ignore
/// #[derive(Clone)]
/// struct HttpFetcher { client: reqwest::Client }
///
/// impl Fetcher for HttpFetcher {
///     async fn fetch(&self, request: &Request) -> Result<CachedResponse> {
///         // translate Request -> client call -> CachedResponse
///     }
/// }
/// ```
pub trait Fetcher: Send + Sync + Clone + 'static {
    /// Issue the request and capture the response.
    ///
    /// # Errors
    /// Returns `Err` only for network-level failures, never for HTTP error
    /// statuses.
    fn fetch(&self, request: &Request) -> impl Future<Output = Result<CachedResponse>> + Send;
}
