//! Network fetch capability.
//!
//! The strategy engine and lifecycle manager talk to the network only
//! through the Fetcher trait, so tests inject a programmable fake and the
//! production path uses reqwest.

use async_trait::async_trait;
use color_eyre::{eyre::eyre, Result};
use std::time::Duration;

use crate::error::NetworkError;
use crate::request::{Method, Request, Response};

/// Capability to fetch a request over the network.
#[async_trait]
pub trait Fetcher: Send + Sync {
  async fn fetch(&self, request: &Request) -> Result<Response, NetworkError>;
}

/// reqwest-backed fetcher.
pub struct HttpFetcher {
  client: reqwest::Client,
}

impl HttpFetcher {
  pub fn new() -> Result<Self> {
    let client = reqwest::Client::builder()
      .connect_timeout(Duration::from_secs(10))
      .build()
      .map_err(|e| eyre!("Failed to build HTTP client: {}", e))?;

    Ok(Self { client })
  }
}

#[async_trait]
impl Fetcher for HttpFetcher {
  async fn fetch(&self, request: &Request) -> Result<Response, NetworkError> {
    let builder = match request.method {
      Method::Get => self.client.get(&request.url),
      Method::Post => self.client.post(&request.url),
      Method::Put => self.client.put(&request.url),
      Method::Delete => self.client.delete(&request.url),
    };

    let resp = builder.send().await?;
    let status = resp.status().as_u16();
    let headers = resp
      .headers()
      .iter()
      .map(|(name, value)| {
        (
          name.as_str().to_string(),
          value.to_str().unwrap_or_default().to_string(),
        )
      })
      .collect();
    let body = resp.bytes().await?.to_vec();

    Ok(Response::new(status, headers, body))
  }
}
