//! Normalized request/response model shared by the cache and strategy layers.
//!
//! Requests are identified by method + normalized URL; the cache key is a
//! SHA256 hex digest of that pair so bucket keys stay fixed-length.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use url::Url;

/// HTTP method subset the engine cares about.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Method {
  Get,
  Post,
  Put,
  Delete,
}

impl Method {
  /// Only GET requests are ever cached.
  pub fn is_cacheable(&self) -> bool {
    matches!(self, Method::Get)
  }

  pub fn as_str(&self) -> &'static str {
    match self {
      Method::Get => "GET",
      Method::Post => "POST",
      Method::Put => "PUT",
      Method::Delete => "DELETE",
    }
  }
}

/// A read/write request as seen by the interceptor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Request {
  pub method: Method,
  pub url: String,
}

impl Request {
  pub fn new(method: Method, url: impl Into<String>) -> Self {
    Self {
      method,
      url: url.into(),
    }
  }

  pub fn get(url: impl Into<String>) -> Self {
    Self::new(Method::Get, url)
  }

  /// Normalize the URL for keying: lowercased scheme/host, no fragment.
  /// Unparseable URLs (relative paths like "/index.html") are used trimmed.
  pub fn normalized_url(&self) -> String {
    match Url::parse(self.url.trim()) {
      Ok(mut parsed) => {
        parsed.set_fragment(None);
        parsed.to_string()
      }
      Err(_) => self.url.trim().to_string(),
    }
  }

  /// Stable cache key: SHA256 hash of "METHOD url" for fixed-length keys.
  pub fn cache_key(&self) -> String {
    let input = format!("{} {}", self.method.as_str(), self.normalized_url());
    let mut hasher = Sha256::new();
    hasher.update(input.as_bytes());
    hex::encode(hasher.finalize())
  }
}

/// A stored or fetched response: status line, headers, and raw body.
///
/// Opaque cross-origin responses carry status 0 and are stored as-is
/// without content inspection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Response {
  pub status: u16,
  pub headers: Vec<(String, String)>,
  pub body: Vec<u8>,
}

impl Response {
  pub fn new(status: u16, headers: Vec<(String, String)>, body: Vec<u8>) -> Self {
    Self {
      status,
      headers,
      body,
    }
  }

  pub fn ok(body: impl Into<Vec<u8>>) -> Self {
    Self::new(200, Vec::new(), body.into())
  }

  /// Synthetic 503 returned when both network and cache come up empty.
  /// The strategy engine never raises to its caller for GET resolution.
  pub fn service_unavailable() -> Self {
    Self::new(
      503,
      vec![("content-type".to_string(), "text/plain".to_string())],
      b"service unavailable".to_vec(),
    )
  }

  pub fn is_success(&self) -> bool {
    (200..300).contains(&self.status)
  }

  pub fn is_opaque(&self) -> bool {
    self.status == 0
  }

  /// Whether this response may be written to a cache bucket.
  pub fn is_storable(&self) -> bool {
    self.is_success() || self.is_opaque()
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn cache_key_is_stable_across_equivalent_urls() {
    let a = Request::get("HTTPS://Example.com/data#frag");
    let b = Request::get("https://example.com/data");
    assert_eq!(a.cache_key(), b.cache_key());
  }

  #[test]
  fn cache_key_distinguishes_methods() {
    let get = Request::get("https://example.com/data");
    let post = Request::new(Method::Post, "https://example.com/data");
    assert_ne!(get.cache_key(), post.cache_key());
  }

  #[test]
  fn relative_paths_key_without_parsing() {
    let req = Request::get("  /index.html ");
    assert_eq!(req.normalized_url(), "/index.html");
  }

  #[test]
  fn only_get_is_cacheable() {
    assert!(Method::Get.is_cacheable());
    assert!(!Method::Post.is_cacheable());
    assert!(!Method::Put.is_cacheable());
    assert!(!Method::Delete.is_cacheable());
  }

  #[test]
  fn synthetic_503_is_not_storable() {
    let resp = Response::service_unavailable();
    assert_eq!(resp.status, 503);
    assert!(!resp.is_storable());
  }

  #[test]
  fn opaque_responses_are_storable() {
    let resp = Response::new(0, Vec::new(), Vec::new());
    assert!(resp.is_storable());
    assert!(!resp.is_success());
  }
}
