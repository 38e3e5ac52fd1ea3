//! Strategy engine: resolves a read request to a response under the active
//! strategy, opportunistically refreshing the runtime bucket.
//!
//! resolve() never raises to its caller. Network failure with no cache entry
//! degrades to a synthetic 503; storage failures degrade to "not cached".

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

use crate::cache::CacheStore;
use crate::config::{Strategy, StrategyConfig};
use crate::net::Fetcher;
use crate::request::{Request, Response};

pub struct FetchStrategyEngine {
  store: Arc<CacheStore>,
  fetcher: Arc<dyn Fetcher>,
  static_bucket: String,
  runtime_bucket: String,
  /// Normalized URLs of install-time static assets. These always resolve
  /// cache-first regardless of the configured strategy.
  static_manifest: HashSet<String>,
}

impl FetchStrategyEngine {
  pub fn new(
    store: Arc<CacheStore>,
    fetcher: Arc<dyn Fetcher>,
    static_bucket: impl Into<String>,
    runtime_bucket: impl Into<String>,
    static_manifest: &[String],
  ) -> Self {
    let static_manifest = static_manifest
      .iter()
      .map(|url| Request::get(url.clone()).normalized_url())
      .collect();

    Self {
      store,
      fetcher,
      static_bucket: static_bucket.into(),
      runtime_bucket: runtime_bucket.into(),
      static_manifest,
    }
  }

  fn is_static_asset(&self, request: &Request) -> bool {
    self.static_manifest.contains(&request.normalized_url())
  }

  /// Resolve a request under the given config. The strategy is captured at
  /// dispatch time: config changes do not affect in-flight resolutions.
  pub async fn resolve(&self, request: &Request, config: &StrategyConfig) -> Response {
    if !request.method.is_cacheable() {
      // Writes bypass the cache entirely
      return match self.fetcher.fetch(request).await {
        Ok(resp) => resp,
        Err(e) => {
          debug!(url = %request.url, error = %e, "Passthrough fetch failed");
          Response::service_unavailable()
        }
      };
    }

    if self.is_static_asset(request) {
      // Hard override, not a default: static assets are always cache-first
      return self.cache_first(request, &self.static_bucket, config).await;
    }

    match config.strategy {
      Strategy::CacheFirst => self.cache_first(request, &self.runtime_bucket, config).await,
      Strategy::NetworkFirst => self.network_first(request, config).await,
      Strategy::StaleWhileRevalidate => self.stale_while_revalidate(request, config).await,
    }
  }

  async fn cache_first(&self, request: &Request, bucket: &str, config: &StrategyConfig) -> Response {
    if let Some(hit) = self.lookup(bucket, request) {
      return hit;
    }

    match self.fetcher.fetch(request).await {
      Ok(resp) => {
        self.store_response(bucket, request, &resp, config);
        resp
      }
      Err(e) => {
        debug!(url = %request.url, error = %e, "Network failed with no cache entry");
        Response::service_unavailable()
      }
    }
  }

  async fn network_first(&self, request: &Request, config: &StrategyConfig) -> Response {
    let timeout = Duration::from_millis(config.network_timeout_ms);

    // Only an actual successful network response wins the race; a timeout,
    // transport error, or error status all fall through to cache.
    match tokio::time::timeout(timeout, self.fetcher.fetch(request)).await {
      Ok(Ok(resp)) if resp.is_success() => {
        self.store_response(&self.runtime_bucket, request, &resp, config);
        return resp;
      }
      Ok(Ok(resp)) => {
        debug!(url = %request.url, status = resp.status, "Network answered with error status, trying cache");
      }
      Ok(Err(e)) => {
        debug!(url = %request.url, error = %e, "Network failed, trying cache");
      }
      Err(_) => {
        debug!(url = %request.url, timeout_ms = config.network_timeout_ms, "Network timed out, trying cache");
      }
    }

    match self.lookup(&self.runtime_bucket, request) {
      Some(hit) => hit,
      None => Response::service_unavailable(),
    }
  }

  async fn stale_while_revalidate(&self, request: &Request, config: &StrategyConfig) -> Response {
    if let Some(hit) = self.lookup(&self.runtime_bucket, request) {
      // Serve stale immediately; the refresh result is not awaited and its
      // errors are swallowed after logging.
      self.spawn_revalidate(request.clone(), config.clone());
      return hit;
    }

    match self.fetcher.fetch(request).await {
      Ok(resp) => {
        self.store_response(&self.runtime_bucket, request, &resp, config);
        resp
      }
      Err(e) => {
        debug!(url = %request.url, error = %e, "Network failed with no cache entry");
        Response::service_unavailable()
      }
    }
  }

  fn spawn_revalidate(&self, request: Request, config: StrategyConfig) {
    let store = Arc::clone(&self.store);
    let fetcher = Arc::clone(&self.fetcher);
    let bucket = self.runtime_bucket.clone();

    tokio::spawn(async move {
      match fetcher.fetch(&request).await {
        Ok(resp) if resp.is_storable() => {
          if let Err(e) = store.put(&bucket, &request, &resp) {
            warn!(url = %request.url, error = %e, "Background refresh not cached");
          } else if let Err(e) = store.evict_oldest(&bucket, config.max_entries) {
            warn!(bucket, error = %e, "Eviction failed after background refresh");
          }
        }
        Ok(resp) => {
          debug!(url = %request.url, status = resp.status, "Background refresh returned error status");
        }
        Err(e) => {
          debug!(url = %request.url, error = %e, "Background refresh failed");
        }
      }
    });
  }

  fn lookup(&self, bucket: &str, request: &Request) -> Option<Response> {
    match self.store.match_request(bucket, request) {
      Ok(hit) => hit,
      Err(e) => {
        warn!(bucket, url = %request.url, error = %e, "Cache lookup failed");
        None
      }
    }
  }

  /// Store a successful response, then enforce the runtime entry limit.
  /// Storage failure is non-fatal: the response is still returned.
  fn store_response(
    &self,
    bucket: &str,
    request: &Request,
    response: &Response,
    config: &StrategyConfig,
  ) {
    if !response.is_storable() {
      return;
    }

    if let Err(e) = self.store.put(bucket, request, response) {
      warn!(bucket, url = %request.url, error = %e, "Response not cached");
      return;
    }

    if bucket == self.runtime_bucket {
      if let Err(e) = self.store.evict_oldest(bucket, config.max_entries) {
        warn!(bucket, error = %e, "Eviction failed after write");
      }
    }
  }
}
